//! End-to-end snapshot builds against canned upstreams and scripted adapters.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use ethpulse_core::field::{FieldValue, CLOSE_SERIES, REQUIRED_FIELDS};
use ethpulse_core::net::StaticFetcher;
use ethpulse_core::snapshot::Snapshot;
use ethpulse_core::sources::sentiment::FearGreedAdapter;
use ethpulse_core::sources::{
    default_adapters, AdapterSettings, FetchContext, SourceAdapter, SourceError, SourceOutput,
};
use ethpulse_runner::SnapshotBuilder;
use std::collections::BTreeMap;

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn generated_at() -> DateTime<Utc> {
    ts("2026-02-10T06:00:00Z")
}

/// Previous snapshot holding one value.
fn previous_with(key: &str, value: f64, observed: DateTime<Utc>) -> Snapshot {
    Snapshot {
        generated_at: observed,
        target_date: None,
        data: BTreeMap::from([(key.to_string(), FieldValue::Number(value))]),
        sources: BTreeMap::from([(key.to_string(), "DefiLlama: stablecoincharts/all".to_string())]),
        field_observed_at: BTreeMap::from([(key.to_string(), observed)]),
        field_fetched_at: BTreeMap::from([(key.to_string(), observed)]),
        field_updated_at: BTreeMap::from([(key.to_string(), observed)]),
        missing: Default::default(),
        errors: vec![],
        proxy_trace: vec![],
    }
}

enum Behaviour {
    Resolve(Vec<(&'static str, f64)>),
    Closes(usize),
    Fail,
    Panic,
}

struct Scripted {
    name: &'static str,
    keys: &'static [&'static str],
    behaviour: Behaviour,
}

impl SourceAdapter for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn declared_keys(&self) -> &[&'static str] {
        self.keys
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Result<SourceOutput, SourceError> {
        let day = ctx.target.unwrap_or_else(|| ctx.now.date_naive());
        match &self.behaviour {
            Behaviour::Resolve(values) => {
                let mut out = SourceOutput::default();
                for (key, value) in values {
                    out.set_on(key, *value, format!("{}: {key}", self.name), day);
                }
                Ok(out.finish(self.keys))
            }
            Behaviour::Closes(n) => {
                let mut out = SourceOutput::default();
                let closes: Vec<f64> = (0..*n).map(|i| 3000.0 - 10.0 * i as f64).collect();
                out.set_on("ethSpotPrice", closes[0], "Scripted candles", day);
                out.series.insert(CLOSE_SERIES.to_string(), closes);
                Ok(out.finish(self.keys))
            }
            Behaviour::Fail => Err(SourceError::Malformed("unexpected layout".into())),
            Behaviour::Panic => panic!("index out of bounds"),
        }
    }
}

fn builder(adapters: Vec<Box<dyn SourceAdapter>>) -> SnapshotBuilder {
    SnapshotBuilder::new(Box::new(StaticFetcher::new()), adapters)
}

fn assert_invariants(snap: &Snapshot) {
    assert!(snap.provenance_violations().is_empty(), "{:?}", snap.provenance_violations());
    for key in REQUIRED_FIELDS {
        assert_ne!(
            snap.data.contains_key(key),
            snap.missing.contains(key),
            "{key} must be exactly one of resolved or missing"
        );
    }
}

#[test]
fn recent_previous_value_is_backfilled_when_fetch_fails() {
    let builder = SnapshotBuilder::new(
        Box::new(StaticFetcher::new()),
        default_adapters(&AdapterSettings::default()),
    );
    let previous = previous_with("stablecoin30d", 1.23, ts("2026-02-07T00:00:00Z"));

    let snap = builder.build_at(Some(date("2026-02-08")), generated_at(), Some(&previous));

    assert_invariants(&snap);
    assert_eq!(snap.data["stablecoin30d"], FieldValue::Number(1.23));
    assert!(!snap.missing.contains("stablecoin30d"));
    assert_eq!(snap.field_observed_at["stablecoin30d"], ts("2026-02-07T00:00:00Z"));
    assert_eq!(snap.field_fetched_at["stablecoin30d"], generated_at());
    let backfill_notes: Vec<&String> = snap
        .errors
        .iter()
        .filter(|e| e.starts_with("backfilled from previous snapshot"))
        .collect();
    assert_eq!(backfill_notes.len(), 1);
    assert!(backfill_notes[0].contains("stablecoin30d"));
}

#[test]
fn old_previous_value_stays_missing() {
    let builder = SnapshotBuilder::new(
        Box::new(StaticFetcher::new()),
        default_adapters(&AdapterSettings::default()),
    );
    let previous = previous_with("stablecoin30d", 1.23, ts("2025-12-01T00:00:00Z"));

    let snap = builder.build_at(Some(date("2026-02-08")), generated_at(), Some(&previous));

    assert_invariants(&snap);
    assert!(!snap.data.contains_key("stablecoin30d"));
    assert!(snap.missing.contains("stablecoin30d"));
    assert!(!snap.errors.iter().any(|e| e.starts_with("backfilled")));
    assert_eq!(
        snap.errors
            .iter()
            .filter(|e| e.contains("beyond half-life cutoff") && e.contains("stablecoin30d"))
            .count(),
        1
    );
}

#[test]
fn failing_adapters_are_isolated() {
    let builder = builder(vec![
        Box::new(Scripted {
            name: "Exploding",
            keys: &["etf1d"],
            behaviour: Behaviour::Panic,
        }),
        Box::new(Scripted {
            name: "Broken",
            keys: &["ism"],
            behaviour: Behaviour::Fail,
        }),
        Box::new(Scripted {
            name: "Healthy",
            keys: &["dxy5d", "current2y"],
            behaviour: Behaviour::Resolve(vec![("dxy5d", 0.4), ("current2y", 4.1)]),
        }),
    ]);

    let snap = builder.build_at(Some(date("2026-02-08")), generated_at(), None);

    assert_invariants(&snap);
    let tagged = |name: &str| snap.errors.iter().filter(|e| e.starts_with(name)).count();
    assert_eq!(tagged("Exploding: "), 1);
    assert_eq!(tagged("Broken: "), 1);
    assert_eq!(tagged("Healthy: "), 0);
    assert!(snap.errors.iter().any(|e| e == "Broken: malformed response: unexpected layout"));
    assert!(snap.missing.contains("etf1d"));
    assert!(snap.missing.contains("ism"));
    assert_eq!(snap.data["dxy5d"], FieldValue::Number(0.4));
    assert_eq!(snap.field_observed_at["dxy5d"], ts("2026-02-08T00:00:00Z"));
}

#[test]
fn fresh_values_are_not_overwritten_by_backfill() {
    let builder = builder(vec![Box::new(Scripted {
        name: "Stable",
        keys: &["stablecoin30d"],
        behaviour: Behaviour::Resolve(vec![("stablecoin30d", 2.5)]),
    })]);
    let previous = previous_with("stablecoin30d", 1.23, ts("2026-02-07T00:00:00Z"));

    let snap = builder.build_at(Some(date("2026-02-08")), generated_at(), Some(&previous));

    assert_eq!(snap.data["stablecoin30d"], FieldValue::Number(2.5));
    assert_eq!(snap.sources["stablecoin30d"], "Stable: stablecoin30d");
    assert!(!snap.errors.iter().any(|e| e.starts_with("backfilled")));
}

#[test]
fn tridomain_needs_ten_closes() {
    let short = builder(vec![Box::new(Scripted {
        name: "Candles",
        keys: &["ethSpotPrice"],
        behaviour: Behaviour::Closes(9),
    })])
    .build_at(None, generated_at(), None);
    for key in ["topo", "spectral", "roughPath", "deltaES"] {
        assert!(short.missing.contains(key), "{key}");
    }
    assert!(!short.data.contains_key(CLOSE_SERIES));

    let long = builder(vec![Box::new(Scripted {
        name: "Candles",
        keys: &["ethSpotPrice"],
        behaviour: Behaviour::Closes(30),
    })])
    .build_at(None, generated_at(), None);
    assert_invariants(&long);
    for key in ["topo", "spectral", "roughPath", "deltaES"] {
        let value = long.data[key].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&value), "{key} = {value}");
        assert!(long.sources[key].starts_with("Derived: "));
    }
}

#[test]
fn internal_inputs_feed_derivations_and_are_stripped() {
    let body = format!(
        r#"{{"data":[{{"value":"50","timestamp":"{}"}}]}}"#,
        ts("2026-02-10T00:00:00Z").timestamp()
    );
    let fetcher = StaticFetcher::new().with("https://api.alternative.me/fng/", body);
    let builder = SnapshotBuilder::new(Box::new(fetcher), vec![Box::new(FearGreedAdapter)]);

    let snap = builder.build_at(None, generated_at(), None);

    assert_invariants(&snap);
    assert!(!snap.data.contains_key("fearGreed"));
    let threshold = snap.data["sentimentThreshold"].as_f64().unwrap();
    assert!((threshold - 0.6).abs() < 1e-12);
    assert_eq!(snap.field_observed_at["sentimentThreshold"], ts("2026-02-10T00:00:00Z"));
    assert_eq!(snap.proxy_trace[0].proxy, "static");
}

#[test]
fn later_adapter_wins_shared_keys() {
    let builder = builder(vec![
        Box::new(Scripted {
            name: "Market",
            keys: &["trendMomentum", "divergence"],
            behaviour: Behaviour::Resolve(vec![("trendMomentum", 0.48), ("divergence", 0.015)]),
        }),
        Box::new(Scripted {
            name: "Klines",
            keys: &["trendMomentum", "divergence"],
            behaviour: Behaviour::Resolve(vec![("trendMomentum", 0.05), ("divergence", 0.01)]),
        }),
    ]);
    let snap = builder.build_at(Some(date("2026-02-09")), generated_at(), None);
    assert_eq!(snap.data["trendMomentum"], FieldValue::Number(0.05));
    assert_eq!(snap.sources["divergence"], "Klines: divergence");
    let cognitive = snap.data["cognitivePotential"].as_f64().unwrap();
    assert!((cognitive - (0.5 + 1.2 * 0.05 - 2.0 * 0.01)).abs() < 1e-12);
}

#[test]
fn historical_build_with_stale_everything_leaves_all_missing() {
    let builder = SnapshotBuilder::new(
        Box::new(StaticFetcher::offline()),
        default_adapters(&AdapterSettings::default()),
    );
    let mut previous = previous_with("ism", 50.2, ts("2026-02-08T00:00:00Z") - Duration::days(91));
    previous.data.insert("etf1d".into(), FieldValue::Number(3.0));
    previous.field_observed_at.insert("etf1d".into(), ts("2026-01-01T00:00:00Z"));

    let snap = builder.build_at(Some(date("2026-02-08")), generated_at(), Some(&previous));

    assert_invariants(&snap);
    assert!(snap.data.is_empty());
    assert_eq!(snap.missing.len(), REQUIRED_FIELDS.len());
    assert!(!snap.proxy_trace[0].ok);
}
