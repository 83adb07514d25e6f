//! Staleness-governed backfill from the previous snapshot.

use crate::merge::FieldSet;
use crate::provenance::Timeline;
use ethpulse_core::field::{half_life_days, REQUIRED_FIELDS};
use ethpulse_core::snapshot::Snapshot;
use ethpulse_core::staleness::{age_days, is_backfill_eligible, FieldState};
use tracing::{debug, info};

/// Label used when the previous snapshot carried a value without one.
const UNLABELLED_PREVIOUS: &str = "previous snapshot";

/// Keys touched by one backfill pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub backfilled: Vec<String>,
    /// Keys with a previous value too old (or dated after the reference).
    pub blocked: Vec<String>,
}

/// Fill required keys still missing after this run's fetches from
/// `previous`, when the previous observation is within twice the key's
/// half-life of the reference time.
///
/// A backfilled key keeps the previous label, observation time and update
/// time; keys resolved in this run are never touched. Emits at most one
/// diagnostic for backfilled keys and one for blocked keys.
pub fn backfill(fields: &mut FieldSet, previous: &Snapshot, timeline: &Timeline) -> BackfillReport {
    let reference = timeline.reference();
    let mut report = BackfillReport::default();

    for key in REQUIRED_FIELDS {
        let state = if fields.contains(key) {
            FieldState::Fresh
        } else {
            FieldState::Missing
        };
        if state == FieldState::Fresh {
            continue;
        }
        let (Some(value), Some(observed)) = (previous.data.get(key), previous.observed_at(key))
        else {
            continue;
        };

        let age = age_days(reference, observed);
        let half_life = half_life_days(key);
        if !is_backfill_eligible(age, half_life) {
            debug!(key, age, half_life, "previous value outside half-life cutoff");
            report.blocked.push(key.to_string());
            continue;
        }

        let label = previous
            .sources
            .get(key)
            .cloned()
            .unwrap_or_else(|| UNLABELLED_PREVIOUS.to_string());
        let updated = previous.field_updated_at.get(key).copied().unwrap_or(observed);
        fields.insert(key, *value, label, observed);
        fields.updated_at.insert(key.to_string(), updated);
        report.backfilled.push(key.to_string());
    }

    if !report.backfilled.is_empty() {
        info!(count = report.backfilled.len(), "backfilled from previous snapshot");
        fields.diagnostic(format!(
            "backfilled from previous snapshot: {}",
            report.backfilled.join(", ")
        ));
    }
    if !report.blocked.is_empty() {
        fields.diagnostic(format!(
            "previous values beyond half-life cutoff, left missing: {}",
            report.blocked.join(", ")
        ));
    }
    report
}
