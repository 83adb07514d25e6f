//! Field timestamps and final snapshot assembly.
//!
//! Every resolved key leaves assembly with a source label and three
//! timestamps: when the value was observed upstream, when this run fetched
//! it, and when a source last confirmed it.

use crate::merge::FieldSet;
use chrono::{DateTime, NaiveDate, Utc};
use ethpulse_core::field::{is_internal, REQUIRED_FIELDS};
use ethpulse_core::snapshot::{ProxyProbe, Snapshot};
use ethpulse_core::sources::LATEST_SUFFIX;
use ethpulse_core::staleness::{day_start, reference_time};
use std::collections::BTreeMap;

/// Label prefixes of upstreams that publish fixed dated series.
pub const DATED_SERIES_PREFIXES: [&str; 1] = ["FRED:"];

/// The two instants a run is judged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeline {
    pub target: Option<NaiveDate>,
    pub generated_at: DateTime<Utc>,
}

impl Timeline {
    pub fn new(target: Option<NaiveDate>, generated_at: DateTime<Utc>) -> Self {
        Self {
            target,
            generated_at,
        }
    }

    /// Staleness reference: target day 00:00 UTC, or generation time.
    pub fn reference(&self) -> DateTime<Utc> {
        reference_time(self.target, self.generated_at)
    }

    /// Observation time implied by a source label when the adapter supplied
    /// none.
    pub fn label_observed_at(&self, label: &str) -> DateTime<Utc> {
        if label.ends_with(LATEST_SUFFIX) {
            return self.generated_at;
        }
        match self.target {
            Some(target) if DATED_SERIES_PREFIXES.iter().any(|p| label.starts_with(p)) => {
                day_start(target)
            }
            _ => self.generated_at,
        }
    }
}

/// Turn the merged, derived and backfilled fields into a snapshot.
///
/// Internal auxiliaries and raw series are dropped; `missing` is exactly the
/// required keys left without a value.
pub fn assemble(fields: FieldSet, timeline: &Timeline, proxy_trace: Vec<ProxyProbe>) -> Snapshot {
    let FieldSet {
        data,
        mut sources,
        mut observed_at,
        mut updated_at,
        errors,
        ..
    } = fields;

    let mut snapshot = Snapshot {
        generated_at: timeline.generated_at,
        target_date: timeline.target,
        data: BTreeMap::new(),
        sources: BTreeMap::new(),
        field_observed_at: BTreeMap::new(),
        field_fetched_at: BTreeMap::new(),
        field_updated_at: BTreeMap::new(),
        missing: Default::default(),
        errors,
        proxy_trace,
    };

    for (key, value) in data {
        if is_internal(&key) {
            continue;
        }
        let label = sources.remove(&key).unwrap_or_else(|| "unattributed".to_string());
        let observed = observed_at
            .remove(&key)
            .unwrap_or_else(|| timeline.label_observed_at(&label));
        let updated = updated_at.remove(&key).unwrap_or(observed);

        snapshot.sources.insert(key.clone(), label);
        snapshot.field_observed_at.insert(key.clone(), observed);
        snapshot.field_fetched_at.insert(key.clone(), timeline.generated_at);
        snapshot.field_updated_at.insert(key.clone(), updated);
        snapshot.data.insert(key, value);
    }

    snapshot.missing = REQUIRED_FIELDS
        .iter()
        .filter(|key| !snapshot.data.contains_key(**key))
        .map(|key| key.to_string())
        .collect();
    snapshot
}
