//! Point-in-time alignment of dated series.
//!
//! Sources publish on different calendars (FRED skips weekends, ETF flows
//! skip US holidays, crypto trades daily). Every series-backed adapter
//! normalizes its history to newest-first and anchors on the latest
//! observation dated on or before the target date.

use chrono::NaiveDate;

/// One dated value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation<T> {
    pub date: NaiveDate,
    pub value: T,
}

impl<T> Observation<T> {
    pub fn new(date: NaiveDate, value: T) -> Self {
        Self { date, value }
    }
}

/// Observations sorted descending by date (index 0 is the newest).
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSeries<T> {
    points: Vec<Observation<T>>,
}

impl<T> AlignedSeries<T> {
    /// Normalize observations in any order to descending by date.
    ///
    /// Duplicate dates keep their relative input order.
    pub fn new(mut points: Vec<Observation<T>>) -> Self {
        points.sort_by(|a, b| b.date.cmp(&a.date));
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Observation<T>] {
        &self.points
    }

    /// Index of the first observation dated on or before `target`.
    ///
    /// No target anchors on the newest point. When every observation is
    /// after the target the oldest index is returned as a degraded anchor;
    /// callers can detect it with [`AlignedSeries::is_degraded_anchor`].
    pub fn anchor(&self, target: Option<NaiveDate>) -> Option<usize> {
        if self.points.is_empty() {
            return None;
        }
        let Some(target) = target else {
            return Some(0);
        };
        let idx = self
            .points
            .iter()
            .position(|p| p.date <= target)
            .unwrap_or(self.points.len() - 1);
        Some(idx)
    }

    /// True when the anchor is dated after the target (no observation on or
    /// before it exists).
    pub fn is_degraded_anchor(&self, anchor: usize, target: Option<NaiveDate>) -> bool {
        match (self.points.get(anchor), target) {
            (Some(p), Some(t)) => p.date > t,
            _ => false,
        }
    }

    /// Observation `offset` steps older than the anchor.
    pub fn at(&self, anchor: usize, offset: usize) -> Option<&Observation<T>> {
        self.points.get(anchor.checked_add(offset)?)
    }

    /// Up to `n` observations starting at the anchor, newest first.
    pub fn window(&self, anchor: usize, n: usize) -> &[Observation<T>] {
        let start = anchor.min(self.points.len());
        let end = start.saturating_add(n).min(self.points.len());
        &self.points[start..end]
    }
}

impl<T: Copy> AlignedSeries<T> {
    /// Values in the window, newest first.
    pub fn values(&self, anchor: usize, n: usize) -> Vec<T> {
        self.window(anchor, n).iter().map(|p| p.value).collect()
    }
}

impl<T> FromIterator<Observation<T>> for AlignedSeries<T> {
    fn from_iter<I: IntoIterator<Item = Observation<T>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn series() -> AlignedSeries<f64> {
        // Deliberately ascending input
        AlignedSeries::new(vec![
            Observation::new(d("2026-02-02"), 2.0),
            Observation::new(d("2026-02-04"), 1.0),
            Observation::new(d("2026-02-06"), 0.0),
        ])
    }

    #[test]
    fn normalizes_to_descending() {
        let s = series();
        let dates: Vec<_> = s.points().iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![d("2026-02-06"), d("2026-02-04"), d("2026-02-02")]);
    }

    #[test]
    fn anchor_between_points_picks_older() {
        let s = series();
        assert_eq!(s.anchor(Some(d("2026-02-05"))), Some(1));
        assert_eq!(s.anchor(Some(d("2026-02-04"))), Some(1));
        assert_eq!(s.anchor(Some(d("2026-02-10"))), Some(0));
    }

    #[test]
    fn anchor_before_everything_degrades_to_oldest() {
        let s = series();
        assert_eq!(s.anchor(Some(d("2026-01-01"))), Some(2));
        assert!(s.is_degraded_anchor(2, Some(d("2026-01-01"))));
        assert!(!s.is_degraded_anchor(1, Some(d("2026-02-05"))));
    }

    #[test]
    fn no_target_anchors_newest() {
        assert_eq!(series().anchor(None), Some(0));
    }

    #[test]
    fn empty_series_has_no_anchor() {
        let s: AlignedSeries<f64> = AlignedSeries::new(vec![]);
        assert_eq!(s.anchor(None), None);
        assert_eq!(s.anchor(Some(d("2026-02-05"))), None);
    }

    #[test]
    fn window_and_offsets() {
        let s = series();
        assert_eq!(s.values(1, 5), vec![1.0, 2.0]);
        assert_eq!(s.at(0, 2).map(|p| p.value), Some(2.0));
        assert!(s.at(1, 2).is_none());
        assert!(s.window(7, 3).is_empty());
    }

    proptest! {
        #[test]
        fn anchor_is_latest_on_or_before_target(
            offsets in proptest::collection::vec(0i64..400, 1..40),
            target_offset in 0i64..400,
        ) {
            let base = d("2025-01-01");
            let s: AlignedSeries<i64> = offsets
                .iter()
                .map(|o| Observation::new(base + chrono::Duration::days(*o), *o))
                .collect();
            let target = base + chrono::Duration::days(target_offset);
            let idx = s.anchor(Some(target)).unwrap();
            let anchored = s.points()[idx].date;

            if anchored <= target {
                // Nothing newer than the anchor is also on or before the target
                for p in &s.points()[..idx] {
                    prop_assert!(p.date > target);
                }
            } else {
                prop_assert_eq!(idx, s.len() - 1);
                prop_assert!(s.points().iter().all(|p| p.date > target));
            }
        }

        #[test]
        fn points_are_sorted_descending(
            offsets in proptest::collection::vec(0i64..400, 0..40),
        ) {
            let base = d("2025-01-01");
            let s: AlignedSeries<()> = offsets
                .iter()
                .map(|o| Observation::new(base + chrono::Duration::days(*o), ()))
                .collect();
            for pair in s.points().windows(2) {
                prop_assert!(pair[0].date >= pair[1].date);
            }
        }
    }
}
