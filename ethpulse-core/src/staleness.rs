//! Staleness policy: when may a previous value stand in for a missing one.

use crate::field::half_life_days;
use chrono::{DateTime, NaiveDate, Utc};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Cutoff multiplier applied to a field's half-life.
pub const CUTOFF_HALF_LIVES: f64 = 2.0;

/// Resolution state of a field during assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    Fresh,
    Missing,
}

/// Age in fractional days between `reference` and `observed`.
///
/// Negative when the observation is dated after the reference.
pub fn age_days(reference: DateTime<Utc>, observed: DateTime<Utc>) -> f64 {
    let delta = reference.signed_duration_since(observed);
    delta.num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY
}

/// Staleness cutoff for a key, in days.
pub fn cutoff_days(key: &str) -> f64 {
    half_life_days(key) * CUTOFF_HALF_LIVES
}

/// Inclusive eligibility test: `0 <= age <= 2 * half_life`.
///
/// A negative age means the value was observed after the snapshot's
/// reference time and would leak future information into a historical
/// snapshot.
pub fn is_backfill_eligible(age_days: f64, half_life_days: f64) -> bool {
    age_days >= 0.0 && age_days <= half_life_days * CUTOFF_HALF_LIVES
}

/// The reference instant a snapshot is judged against: the target date at
/// 00:00 UTC, or the generation time for a "latest" snapshot.
pub fn reference_time(target: Option<NaiveDate>, generated_at: DateTime<Utc>) -> DateTime<Utc> {
    target.map(day_start).unwrap_or(generated_at)
}

/// 00:00:00 UTC on `date`.
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}
