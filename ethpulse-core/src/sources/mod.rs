//! Source adapters.
//!
//! Each adapter owns one upstream (or one upstream with a fallback), anchors
//! within that upstream's history on the target date, and reports values with
//! a source label per key. Expected failures (empty upstream, malformed body,
//! timeouts) come back as `Ok` with the declared keys unresolved and a
//! diagnostic; `Err` is reserved for failures the orchestrator must isolate.

pub mod coingecko;
pub mod coinglass;
pub mod defillama;
pub mod farside;
pub mod farside_table;
pub mod fred;
pub mod gdelt;
pub mod price;
pub mod sentiment;

use crate::align::AlignedSeries;
use crate::field::FieldValue;
use crate::net::{FetchError, Fetcher};
use crate::staleness::day_start;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Text-rendering proxy used when a page is behind a bot challenge.
pub const DEFAULT_TEXT_PROXY: &str = "https://r.jina.ai/";

/// Suffix on labels of values that are only available as of "now".
pub const LATEST_SUFFIX: &str = "(latest)";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("upstream returned no data: {0}")]
    Empty(String),

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

/// Inputs shared by every adapter invocation in one run.
pub struct FetchContext<'a> {
    /// Requested snapshot date; `None` means "latest".
    pub target: Option<NaiveDate>,
    pub fetcher: &'a dyn Fetcher,
    /// Wall-clock time of the run.
    pub now: DateTime<Utc>,
}

impl FetchContext<'_> {
    /// True when the target lies strictly before today (UTC), so "current"
    /// values would not describe the requested date.
    pub fn is_historical(&self) -> bool {
        self.target
            .is_some_and(|target| target < self.now.date_naive())
    }
}

/// Adapter metadata alongside the values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMetadata {
    /// Per-key observation time, when the adapter knows it.
    pub observed_at: BTreeMap<String, DateTime<Utc>>,
    /// Human-readable notes, unprefixed (the orchestrator tags them).
    pub diagnostics: Vec<String>,
}

/// Everything one adapter resolved in one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceOutput {
    pub data: BTreeMap<String, FieldValue>,
    pub sources: BTreeMap<String, String>,
    pub missing: BTreeSet<String>,
    /// Named numeric series (newest first) consumed by derivations.
    pub series: BTreeMap<String, Vec<f64>>,
    pub metadata: SourceMetadata,
}

impl SourceOutput {
    /// Output with every key unresolved.
    pub fn unresolved(keys: &[&str]) -> Self {
        Self {
            missing: keys.iter().map(|k| k.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Unresolved output carrying the reason as a diagnostic.
    pub fn failed(keys: &[&str], reason: impl std::fmt::Display) -> Self {
        let mut out = Self::unresolved(keys);
        out.diagnostic(reason.to_string());
        out
    }

    pub fn set(&mut self, key: &str, value: impl Into<FieldValue>, label: impl Into<String>) {
        self.missing.remove(key);
        self.data.insert(key.to_string(), value.into());
        self.sources.insert(key.to_string(), label.into());
    }

    pub fn observed(&mut self, key: &str, at: DateTime<Utc>) {
        self.metadata.observed_at.insert(key.to_string(), at);
    }

    /// Set a value observed on `date` (stamped at 00:00 UTC).
    pub fn set_on(
        &mut self,
        key: &str,
        value: impl Into<FieldValue>,
        label: impl Into<String>,
        date: NaiveDate,
    ) {
        self.set(key, value, label);
        self.observed(key, day_start(date));
    }

    pub fn diagnostic(&mut self, message: impl Into<String>) {
        self.metadata.diagnostics.push(message.into());
    }

    /// Mark every declared key that was not set as missing.
    pub fn finish(mut self, declared: &[&str]) -> Self {
        for key in declared {
            if !self.data.contains_key(*key) {
                self.missing.insert(key.to_string());
            }
        }
        self
    }

    /// Fold another output into this one; `other` wins on conflicts.
    pub fn absorb(&mut self, other: SourceOutput) {
        for key in other.data.keys() {
            self.missing.remove(key);
        }
        self.data.extend(other.data);
        self.sources.extend(other.sources);
        self.series.extend(other.series);
        self.metadata.observed_at.extend(other.metadata.observed_at);
        self.metadata.diagnostics.extend(other.metadata.diagnostics);
        for key in other.missing {
            if !self.data.contains_key(&key) {
                self.missing.insert(key);
            }
        }
    }
}

/// One upstream data source.
pub trait SourceAdapter: Send + Sync {
    /// Stable adapter name used to tag diagnostics, e.g. `FRED(macro)`.
    fn name(&self) -> &str;

    /// Keys this adapter attempts to resolve.
    fn declared_keys(&self) -> &[&'static str];

    fn fetch(&self, ctx: &FetchContext<'_>) -> Result<SourceOutput, SourceError>;
}

/// Credentials and endpoints the adapters need.
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub fred_api_key: Option<String>,
    pub coinglass_api_key: Option<String>,
    pub text_proxy_base: String,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            fred_api_key: None,
            coinglass_api_key: None,
            text_proxy_base: DEFAULT_TEXT_PROXY.to_string(),
        }
    }
}

/// Every adapter, in invocation order. Later adapters overwrite earlier ones
/// on shared keys.
pub fn default_adapters(settings: &AdapterSettings) -> Vec<Box<dyn SourceAdapter>> {
    vec![
        Box::new(fred::FredAdapter::new(settings.fred_api_key.clone())),
        Box::new(defillama::StablecoinAdapter::all()),
        Box::new(defillama::StablecoinAdapter::ethereum()),
        Box::new(farside::FarsideAdapter::new(settings.text_proxy_base.clone())),
        Box::new(coingecko::MarketAdapter),
        Box::new(coinglass::LiquidationAdapter::new(
            settings.coinglass_api_key.clone(),
        )),
        Box::new(defillama::CexAdapter),
        Box::new(price::KlinesAdapter),
        Box::new(defillama::RwaAdapter),
        Box::new(defillama::FeesAdapter),
        Box::new(sentiment::FearGreedAdapter),
        Box::new(gdelt::DistributionAdapter),
    ]
}

/// Label for a value that only reflects the current state of an upstream.
pub fn latest_label(label: &str) -> String {
    format!("{label} {LATEST_SUFFIX}")
}

/// Diagnostic for current-only upstreams asked for a past date.
pub fn note_historical_unsupported(ctx: &FetchContext<'_>, out: &mut SourceOutput) {
    if let (true, Some(target)) = (ctx.is_historical(), ctx.target) {
        out.diagnostic(format!(
            "historical lookup unsupported for {target}; using latest values"
        ));
    }
}

/// Diagnostic when no observation exists on or before the target.
pub fn note_degraded_anchor<T>(
    ctx: &FetchContext<'_>,
    series: &AlignedSeries<T>,
    anchor: usize,
    what: &str,
    out: &mut SourceOutput,
) {
    if series.is_degraded_anchor(anchor, ctx.target) {
        if let (Some(target), Some(point)) = (ctx.target, series.points().get(anchor)) {
            out.diagnostic(format!(
                "{what}: no observation on or before {target}; anchored on oldest ({})",
                point.date
            ));
        }
    }
}

/// Percentage change from `previous` to `latest`; zero when `previous` is 0.
pub fn percent_change(latest: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        0.0
    } else {
        (latest - previous) / previous * 100.0
    }
}

/// UTC calendar date of a unix timestamp in seconds.
pub fn date_from_secs(secs: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive())
}

/// UTC calendar date of a unix timestamp in milliseconds.
pub fn date_from_millis(millis: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.date_naive())
}

/// Upstream numbers arrive as JSON numbers, numeric strings, or null.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Loose {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl Loose {
    fn into_f64(self) -> Option<f64> {
        match self {
            Loose::Number(v) => Some(v),
            Loose::Text(s) => s.trim().parse().ok(),
            Loose::Other(_) => None,
        }
    }
}

pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Loose>::deserialize(deserializer)?.and_then(Loose::into_f64))
}

pub(crate) fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_f64(deserializer)?.map(|v| v as i64))
}
