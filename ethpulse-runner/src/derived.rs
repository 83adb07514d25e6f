//! Derived indicator wiring.
//!
//! Runs after every adapter has been merged and before backfill, so each
//! derived key is computed only from raw values resolved in this run. A
//! derived key is observed as of its oldest input.

use crate::merge::FieldSet;
use chrono::{DateTime, Utc};
use ethpulse_core::derive::{self, compute_tridomain};
use ethpulse_core::field::{FieldValue, CLOSE_SERIES};
use ethpulse_core::staleness::{age_days, cutoff_days};
use tracing::debug;

pub const TRIDOMAIN_KEYS: [&str; 4] = ["topo", "spectral", "roughPath", "deltaES"];

/// Compute every derived key whose inputs are present.
pub fn apply(fields: &mut FieldSet) {
    apply_tridomain(fields);

    if let (Some(trend), Some(divergence)) =
        (fields.number("trendMomentum"), fields.number("divergence"))
    {
        put(
            fields,
            "cognitivePotential",
            derive::cognitive_potential(trend, divergence),
            "Derived: trendMomentum/divergence",
            &["trendMomentum", "divergence"],
        );
    }

    if let (Some(stable), Some(etf), Some(rrp)) = (
        fields.number("stablecoin30d"),
        fields.number("etf10d"),
        fields.number("rrpChange"),
    ) {
        put(
            fields,
            "liquidityPotential",
            derive::liquidity_potential(stable, etf, rrp),
            "Derived: stablecoin/ETF/RRP",
            &["stablecoin30d", "etf10d", "rrpChange"],
        );
    }

    if let (Some(elasticity), Some(float)) =
        (fields.number("mcapElasticity"), fields.number("floatDensity"))
    {
        put(
            fields,
            "onchainReflexivity",
            derive::onchain_reflexivity(elasticity, float),
            "Derived: elasticity/float",
            &["mcapElasticity", "floatDensity"],
        );
    }

    if let Some(fear_greed) = fields.number("fearGreed") {
        put(
            fields,
            "sentimentThreshold",
            derive::sentiment_threshold(fear_greed),
            "Derived: Alternative.me FNG",
            &["fearGreed"],
        );
    }

    apply_stablecoin_structure(fields);

    if let (Some(fee7d), Some(fee30d)) = (fields.number("fee7d"), fields.number("fee30d")) {
        let inputs = ["fee7d", "fee30d"];
        put(
            fields,
            "lstcScore",
            derive::lstc_score(fee7d, fee30d),
            "Derived: ETH fees (DefiLlama)",
            &inputs,
        );
        put(
            fields,
            "netIssuanceHigh",
            derive::net_issuance_high(fee7d, fee30d),
            "Derived: low fees imply high net issuance",
            &inputs,
        );
    }
}

fn apply_tridomain(fields: &mut FieldSet) {
    let Some(closes) = fields.series.get(CLOSE_SERIES) else {
        return;
    };
    let Some(metrics) = compute_tridomain(closes) else {
        debug!(closes = closes.len(), "tri-domain metrics withheld");
        return;
    };
    let observed = fields
        .series_observed_at
        .get(CLOSE_SERIES)
        .copied()
        .unwrap_or_default();

    let values = [
        ("topo", metrics.topo, "Derived: price structure (daily candles)"),
        ("spectral", metrics.spectral, "Derived: price cycle ratio (daily candles)"),
        ("roughPath", metrics.rough_path, "Derived: tail risk ES (daily candles)"),
        ("deltaES", metrics.delta_es, "Derived: tail risk ES (daily candles)"),
    ];
    for (key, value, label) in values {
        fields.insert(key, value, label, observed);
    }
}

fn apply_stablecoin_structure(fields: &mut FieldSet) {
    let (Some(total_now), Some(total_ago), Some(eth_now), Some(eth_ago)) = (
        fields.number("totalStableNow"),
        fields.number("totalStableAgo"),
        fields.number("ethStableNow"),
        fields.number("ethStableAgo"),
    ) else {
        return;
    };
    let share_now = derive::stable_share(eth_now, total_now);
    let share_ago = derive::stable_share(eth_ago, total_ago);

    put(
        fields,
        "mappingRatioDown",
        derive::mapping_ratio_down(share_now, share_ago),
        "Derived: ETH stablecoin share 30d",
        &["totalStableNow", "totalStableAgo", "ethStableNow", "ethStableAgo"],
    );

    if let Some(rwa_share) = fields.number("rwaShareEth") {
        put(
            fields,
            "rsdScore",
            derive::rsd_score(share_now, rwa_share),
            "Derived: stablecoin share + RWA share (DefiLlama)",
            &["totalStableNow", "ethStableNow", "rwaShareEth"],
        );
    }
}

/// Insert a derived key observed at its oldest input, flagging inputs whose
/// observation times spread wider than the key's staleness cutoff.
fn put(
    fields: &mut FieldSet,
    key: &str,
    value: impl Into<FieldValue>,
    label: &str,
    inputs: &[&str],
) {
    let times: Vec<DateTime<Utc>> = inputs
        .iter()
        .filter_map(|input| fields.observed_at.get(*input).copied())
        .collect();
    let (Some(oldest), Some(newest)) = (times.iter().min().copied(), times.iter().max().copied())
    else {
        return;
    };

    let spread = age_days(newest, oldest);
    let cutoff = cutoff_days(key);
    if spread > cutoff {
        fields.diagnostic(format!(
            "{key}: inputs observed {spread:.1} days apart (cutoff {cutoff} days)"
        ));
    }
    fields.insert(key, value, label, oldest);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn at() -> DateTime<Utc> {
        ts("2026-02-08T00:00:00Z")
    }

    #[test]
    fn potentials_from_present_inputs() {
        let mut fields = FieldSet::default();
        fields.insert("trendMomentum", 0.1, "Bitfinex: tETHUSD 1D candles", at());
        fields.insert("divergence", 0.05, "Bitfinex: tETHUSD 1D candles", at());
        fields.insert("fearGreed", 50.0, "Alternative.me: FNG", at());
        apply(&mut fields);

        let cognitive = fields.number("cognitivePotential").unwrap();
        assert!((cognitive - 0.52).abs() < 1e-12);
        assert!((fields.number("sentimentThreshold").unwrap() - 0.6).abs() < 1e-12);
        assert!(!fields.contains("liquidityPotential"));
        assert!(!fields.contains("onchainReflexivity"));
        assert!(fields.errors.is_empty());
    }

    #[test]
    fn derived_is_observed_at_oldest_input_and_flags_spread() {
        let mut fields = FieldSet::default();
        fields.insert("mcapElasticity", 20.0, "CoinGecko (latest)", at());
        fields.insert("floatDensity", 1.0, "CoinGecko (latest)", at() - Duration::days(3));
        apply(&mut fields);
        assert_eq!(fields.observed_at["onchainReflexivity"], at() - Duration::days(3));
        assert!(fields.errors.is_empty());

        let mut fields = FieldSet::default();
        fields.insert("stablecoin30d", 1.0, "DefiLlama", at());
        fields.insert("etf10d", 100.0, "Farside", at());
        fields.insert("rrpChange", -5.0, "FRED: RRPONTSYD", at() - Duration::days(30));
        apply(&mut fields);
        assert!(fields.contains("liquidityPotential"));
        assert_eq!(fields.errors.len(), 1);
        assert!(fields.errors[0]
            .starts_with("liquidityPotential: inputs observed 30.0 days apart"));
    }

    #[test]
    fn tridomain_withheld_with_short_series() {
        let mut fields = FieldSet::default();
        fields.series.insert(CLOSE_SERIES.into(), vec![100.0; 9]);
        apply(&mut fields);
        for key in TRIDOMAIN_KEYS {
            assert!(!fields.contains(key), "{key}");
        }

        fields
            .series
            .insert(CLOSE_SERIES.into(), (0..12).map(|i| 100.0 - i as f64).collect());
        fields.series_observed_at.insert(CLOSE_SERIES.into(), at());
        apply(&mut fields);
        for key in TRIDOMAIN_KEYS {
            assert_eq!(fields.observed_at[key], at(), "{key}");
        }
    }

    #[test]
    fn stablecoin_structure_needs_all_four_balances() {
        let mut fields = FieldSet::default();
        fields.insert("totalStableNow", 200.0, "DefiLlama", at());
        fields.insert("totalStableAgo", 200.0, "DefiLlama", at());
        fields.insert("ethStableNow", 100.0, "DefiLlama", at());
        apply(&mut fields);
        assert!(!fields.contains("mappingRatioDown"));

        fields.insert("ethStableAgo", 110.0, "DefiLlama", at());
        apply(&mut fields);
        assert_eq!(fields.data["mappingRatioDown"], FieldValue::Bool(true));
        assert!(!fields.contains("rsdScore"));

        fields.insert("rwaShareEth", 0.5, "DefiLlama: /protocols (latest)", at());
        apply(&mut fields);
        assert!((fields.number("rsdScore").unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn fee_scores() {
        let mut fields = FieldSet::default();
        fields.insert("fee7d", 10.0, "DefiLlama", at());
        fields.insert("fee30d", 80.0, "DefiLlama", at());
        apply(&mut fields);
        assert!((fields.number("lstcScore").unwrap() - 5.0).abs() < 1e-12);
        assert_eq!(fields.data["netIssuanceHigh"], FieldValue::Bool(true));
    }
}
