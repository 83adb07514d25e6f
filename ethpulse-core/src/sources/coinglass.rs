//! Aggregated futures liquidations.
//!
//! The open API serves daily history; the public liquidations page only
//! states the current 24h total in prose and is used when the API fails.

use super::{
    date_from_millis, latest_label, lenient_f64, lenient_i64, note_degraded_anchor,
    note_historical_unsupported, FetchContext, SourceAdapter, SourceError, SourceOutput,
};
use crate::align::{AlignedSeries, Observation};
use crate::net::{fetch_json, HttpRequest};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::debug;

const API_URL: &str = "https://open-api-v4.coinglass.com/api/futures/liquidation/aggregated-history\
     ?symbol=BTC&interval=1d";
const WEB_URL: &str = "https://www.coinglass.com/liquidations";
const API_KEY_HEADER: &str = "CG-API-KEY";
const KEYS: [&str; 1] = ["liquidationUsd"];

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    data: Vec<HistoryPoint>,
}

#[derive(Debug, Deserialize)]
struct HistoryPoint {
    #[serde(default, deserialize_with = "lenient_i64")]
    time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    aggregated_long_liquidation_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    aggregated_short_liquidation_usd: Option<f64>,
}

impl HistoryResponse {
    fn is_ok(&self) -> bool {
        match &self.code {
            Some(serde_json::Value::String(code)) => code == "0",
            Some(serde_json::Value::Number(code)) => code.as_i64() == Some(0),
            _ => false,
        }
    }
}

/// Parse money amounts such as `12.5M`, `850K`, `1.2B` or `1,234`.
pub fn parse_money(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', "");
    let (number, multiplier) = match cleaned.chars().last()?.to_ascii_uppercase() {
        'K' => (&cleaned[..cleaned.len() - 1], 1e3),
        'M' => (&cleaned[..cleaned.len() - 1], 1e6),
        'B' => (&cleaned[..cleaned.len() - 1], 1e9),
        _ => (cleaned.as_str(), 1.0),
    };
    number.trim().parse::<f64>().ok().map(|v| v * multiplier)
}

fn headline_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)total liquidations comes in at \$([\d,]+(?:\.\d+)?[KMB]?)")
            .expect("valid liquidation regex")
    })
}

/// Extract the 24h liquidation total from the liquidations page prose.
pub fn parse_liquidation_headline(html: &str) -> Option<f64> {
    let caps = headline_pattern().captures(html)?;
    parse_money(&caps[1])
}

pub struct LiquidationAdapter {
    api_key: Option<String>,
}

impl LiquidationAdapter {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    fn from_api(&self, ctx: &FetchContext<'_>, out: &mut SourceOutput) -> bool {
        let mut request = HttpRequest::get(API_URL);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key.as_str());
        }
        let resp: HistoryResponse = match fetch_json(ctx.fetcher, &request) {
            Ok(resp) => resp,
            Err(e) => {
                debug!(error = %e, "liquidation API failed");
                return false;
            }
        };
        if !resp.is_ok() {
            return false;
        }

        let series: AlignedSeries<f64> = resp
            .data
            .iter()
            .filter_map(|p| {
                let date = date_from_millis(p.time?)?;
                let total = p.aggregated_long_liquidation_usd.unwrap_or(0.0)
                    + p.aggregated_short_liquidation_usd.unwrap_or(0.0);
                Some(Observation::new(date, total))
            })
            .collect();
        let Some(a) = series.anchor(ctx.target) else {
            return false;
        };
        note_degraded_anchor(ctx, &series, a, "liquidation history", out);
        let point = &series.points()[a];
        out.set_on(
            "liquidationUsd",
            point.value,
            "Coinglass open-api: aggregated-history",
            point.date,
        );
        true
    }
}

impl SourceAdapter for LiquidationAdapter {
    fn name(&self) -> &str {
        "Coinglass(liquidation)"
    }

    fn declared_keys(&self) -> &[&'static str] {
        &KEYS
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Result<SourceOutput, SourceError> {
        let mut out = SourceOutput::default();
        if self.from_api(ctx, &mut out) {
            return Ok(out.finish(&KEYS));
        }

        let html = match ctx.fetcher.get_text(WEB_URL) {
            Ok(html) => html,
            Err(e) => {
                out.diagnostic(e.to_string());
                return Ok(out.finish(&KEYS));
            }
        };
        match parse_liquidation_headline(&html) {
            Some(total) => {
                note_historical_unsupported(ctx, &mut out);
                out.set(
                    "liquidationUsd",
                    total,
                    latest_label("Coinglass web: /liquidations"),
                );
            }
            None => out.diagnostic("liquidation total not found on web page"),
        }
        Ok(out.finish(&KEYS))
    }
}
