//! Working set of fields while a snapshot is being assembled.

use crate::provenance::Timeline;
use chrono::{DateTime, Utc};
use ethpulse_core::field::FieldValue;
use ethpulse_core::sources::SourceOutput;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Values, labels and timestamps accumulated across adapters.
///
/// Every key in `data` has a label in `sources` and a time in
/// `observed_at`. `updated_at` only carries entries that differ from the
/// observation time (backfilled keys).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSet {
    pub data: BTreeMap<String, FieldValue>,
    pub sources: BTreeMap<String, String>,
    pub observed_at: BTreeMap<String, DateTime<Utc>>,
    pub updated_at: BTreeMap<String, DateTime<Utc>>,
    pub series: BTreeMap<String, Vec<f64>>,
    pub series_observed_at: BTreeMap<String, DateTime<Utc>>,
    /// Diagnostics in the order they were raised.
    pub errors: Vec<String>,
}

impl FieldSet {
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(FieldValue::as_f64)
    }

    /// Set a key with fresh provenance, replacing whatever was there.
    pub fn insert(
        &mut self,
        key: &str,
        value: impl Into<FieldValue>,
        label: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) {
        self.data.insert(key.to_string(), value.into());
        self.sources.insert(key.to_string(), label.into());
        self.observed_at.insert(key.to_string(), observed_at);
        self.updated_at.remove(key);
    }

    pub fn diagnostic(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Record that an adapter produced nothing usable.
    pub fn fail(&mut self, adapter: &str, reason: impl fmt::Display) {
        warn!(adapter, %reason, "adapter failed");
        self.errors.push(format!("{adapter}: {reason}"));
    }

    /// Fold one adapter's output in. A later adapter replaces an earlier
    /// one's value for the same key together with its label and times.
    pub fn merge(&mut self, adapter: &str, output: SourceOutput, timeline: &Timeline) {
        let SourceOutput {
            data,
            mut sources,
            series,
            metadata,
            ..
        } = output;

        let series_observed = metadata
            .observed_at
            .values()
            .min()
            .copied()
            .or_else(|| sources.values().next().map(|l| timeline.label_observed_at(l)))
            .unwrap_or(timeline.generated_at);

        for message in metadata.diagnostics {
            self.errors.push(format!("{adapter}: {message}"));
        }

        for (key, value) in data {
            if matches!(value, FieldValue::Number(v) if !v.is_finite()) {
                self.errors
                    .push(format!("{adapter}: {key} is not a finite number; dropped"));
                continue;
            }
            let label = sources.remove(&key).unwrap_or_else(|| adapter.to_string());
            let observed = metadata
                .observed_at
                .get(&key)
                .copied()
                .unwrap_or_else(|| timeline.label_observed_at(&label));
            self.insert(&key, value, label, observed);
        }

        for (name, values) in series {
            self.series_observed_at.insert(name.clone(), series_observed);
            self.series.insert(name, values);
        }
    }
}
