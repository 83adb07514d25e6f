//! The snapshot record: the builder's only externally visible artifact.

use crate::field::{FieldValue, REQUIRED_FIELDS};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Outcome of probing one egress path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyProbe {
    pub proxy: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A point-in-time, fully attributed indicator snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_date: Option<NaiveDate>,
    #[serde(default)]
    pub data: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub sources: BTreeMap<String, String>,
    #[serde(default)]
    pub field_observed_at: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub field_fetched_at: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub field_updated_at: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub missing: BTreeSet<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub proxy_trace: Vec<ProxyProbe>,
}

impl Snapshot {
    /// Best-known observation time for a key: observed, then updated, then
    /// the snapshot's own generation time.
    pub fn observed_at(&self, key: &str) -> Option<DateTime<Utc>> {
        if !self.data.contains_key(key) {
            return None;
        }
        self.field_observed_at
            .get(key)
            .or_else(|| self.field_updated_at.get(key))
            .copied()
            .or(Some(self.generated_at))
    }

    /// Number of required keys resolved.
    pub fn resolved_required(&self) -> usize {
        REQUIRED_FIELDS
            .iter()
            .filter(|key| self.data.contains_key(**key))
            .count()
    }

    /// Provenance invariant violations, one message per offending key.
    ///
    /// Empty for every snapshot the builder assembles.
    pub fn provenance_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        for key in self.data.keys() {
            if !self.sources.contains_key(key) {
                violations.push(format!("{key}: no source label"));
            }
            if !self.field_observed_at.contains_key(key) {
                violations.push(format!("{key}: no observedAt"));
            }
            if !self.field_fetched_at.contains_key(key) {
                violations.push(format!("{key}: no fetchedAt"));
            }
            if !self.field_updated_at.contains_key(key) {
                violations.push(format!("{key}: no updatedAt"));
            }
            if self.missing.contains(key) {
                violations.push(format!("{key}: both resolved and missing"));
            }
        }
        violations
    }
}
