//! Derived indicator math.
//!
//! Pure functions over already-resolved raw values. Every coefficient here is
//! a dashboard policy constant; changing one changes what the dashboard reads.
//! Close series are newest-first (index 0 is the most recent close).

/// Minimum closes needed before any tri-domain metric is produced.
pub const MIN_TRIDOMAIN_CLOSES: usize = 10;

const TOPO_RETURN_SCALE: f64 = 0.2;
const TOPO_VOL_SCALE: f64 = 0.1;
const SPECTRAL_EPSILON: f64 = 1e-6;
const SHORT_RETURN_LOOKBACK: usize = 7;
const ES_TAIL_FRACTION: f64 = 0.1;
const ES_SCALE: f64 = 0.1;

const COGNITIVE_BASE: f64 = 0.5;
const COGNITIVE_TREND_WEIGHT: f64 = 1.2;
const COGNITIVE_DIVERGENCE_WEIGHT: f64 = 2.0;

const LIQUIDITY_BASE: f64 = 0.5;
const LIQUIDITY_STABLE_SCALE: f64 = 10.0;
const LIQUIDITY_ETF_SCALE: f64 = 500.0;
const LIQUIDITY_WEIGHT: f64 = 0.2;
const LIQUIDITY_RRP_PENALTY: f64 = 0.1;

const REFLEXIVITY_ELASTICITY_SCALE: f64 = 50.0;
const REFLEXIVITY_ELASTICITY_WEIGHT: f64 = 0.3;
const REFLEXIVITY_FLOAT_WEIGHT: f64 = 0.2;

const SENTIMENT_BASE: f64 = 0.4;
const SENTIMENT_SCALE: f64 = 250.0;
const SENTIMENT_FLOOR: f64 = 0.3;
const SENTIMENT_CEILING: f64 = 0.8;

const STRUCTURAL_SCALE: f64 = 10.0;
const WEEKS_PER_MONTH: f64 = 4.0;
const NET_ISSUANCE_FEE_RATIO: f64 = 0.6;

/// Clamp `value` into `[low, high]`.
pub fn clamp(value: f64, low: f64, high: f64) -> f64 {
    low.max(high.min(value))
}

/// Clamp into the unit interval.
pub fn unit(value: f64) -> f64 {
    clamp(value, 0.0, 1.0)
}

/// Price-structure metrics computed from one close series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriDomain {
    pub topo: f64,
    pub spectral: f64,
    pub rough_path: f64,
    pub delta_es: f64,
}

/// Single-step returns, newest first. Zero denominators are skipped.
pub fn step_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|pair| pair[1] != 0.0)
        .map(|pair| (pair[0] - pair[1]) / pair[1])
        .collect()
}

/// Sample standard deviation (divisor n-1, at least 1).
pub fn sample_volatility(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0).max(1.0);
    var.sqrt()
}

/// Expected shortfall: mean magnitude of the worst `max(1, floor(n * 0.1))`
/// returns.
pub fn expected_shortfall(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let k = ((returns.len() as f64 * ES_TAIL_FRACTION) as usize).max(1);
    let worst = &sorted[..k];
    (worst.iter().sum::<f64>() / k as f64).abs()
}

/// Tri-domain price-structure metrics from newest-first closes.
///
/// Returns `None` (withholding all four metrics) with fewer than
/// [`MIN_TRIDOMAIN_CLOSES`] closes or when no usable return exists.
pub fn compute_tridomain(closes: &[f64]) -> Option<TriDomain> {
    if closes.len() < MIN_TRIDOMAIN_CLOSES {
        return None;
    }
    let returns = step_returns(closes);
    if returns.is_empty() {
        return None;
    }

    let last = closes.len() - 1;
    let long_return = ratio_return(closes[0], closes[last]);
    let short_return = ratio_return(closes[0], closes[SHORT_RETURN_LOOKBACK.min(last)]);
    let vol = sample_volatility(&returns);

    let topo = unit(long_return.abs() / TOPO_RETURN_SCALE) * (1.0 - unit(vol / TOPO_VOL_SCALE));
    let spectral = unit(short_return.abs() / (long_return.abs() + SPECTRAL_EPSILON));
    let delta_es = unit(expected_shortfall(&returns) / ES_SCALE);
    let rough_path = unit(1.0 - delta_es);

    Some(TriDomain {
        topo,
        spectral,
        rough_path,
        delta_es,
    })
}

fn ratio_return(latest: f64, base: f64) -> f64 {
    if base == 0.0 {
        0.0
    } else {
        latest / base - 1.0
    }
}

pub fn cognitive_potential(trend_momentum: f64, divergence: f64) -> f64 {
    unit(
        COGNITIVE_BASE + COGNITIVE_TREND_WEIGHT * trend_momentum
            - COGNITIVE_DIVERGENCE_WEIGHT * divergence,
    )
}

pub fn liquidity_potential(stablecoin30d: f64, etf10d: f64, rrp_change: f64) -> f64 {
    let stable_norm = clamp(stablecoin30d / LIQUIDITY_STABLE_SCALE, -1.0, 1.0);
    let etf_norm = clamp(etf10d / LIQUIDITY_ETF_SCALE, -1.0, 1.0);
    let rrp_penalty = if rrp_change > 0.0 {
        LIQUIDITY_RRP_PENALTY
    } else {
        0.0
    };
    unit(
        LIQUIDITY_BASE + LIQUIDITY_WEIGHT * stable_norm + LIQUIDITY_WEIGHT * etf_norm
            - rrp_penalty,
    )
}

pub fn onchain_reflexivity(mcap_elasticity: f64, float_density: f64) -> f64 {
    let elasticity_norm = clamp(mcap_elasticity / REFLEXIVITY_ELASTICITY_SCALE, 0.0, 2.0);
    unit(
        1.0 - REFLEXIVITY_ELASTICITY_WEIGHT * elasticity_norm
            + REFLEXIVITY_FLOAT_WEIGHT * (1.0 - float_density),
    )
}

pub fn sentiment_threshold(fear_greed: f64) -> f64 {
    clamp(
        SENTIMENT_BASE + fear_greed / SENTIMENT_SCALE,
        SENTIMENT_FLOOR,
        SENTIMENT_CEILING,
    )
}

/// Ethereum's share of a stablecoin total; zero totals count as 1.
pub fn stable_share(eth: f64, total: f64) -> f64 {
    let total = if total == 0.0 { 1.0 } else { total };
    eth / total
}

pub fn rsd_score(eth_share_now: f64, rwa_share_eth: f64) -> f64 {
    clamp(
        (eth_share_now + rwa_share_eth) / 2.0 * STRUCTURAL_SCALE,
        0.0,
        STRUCTURAL_SCALE,
    )
}

pub fn mapping_ratio_down(eth_share_now: f64, eth_share_ago: f64) -> bool {
    eth_share_now - eth_share_ago < 0.0
}

fn weekly_fee_average(fee30d: f64) -> f64 {
    fee30d / WEEKS_PER_MONTH
}

pub fn lstc_score(fee7d: f64, fee30d: f64) -> f64 {
    let weekly = weekly_fee_average(fee30d);
    let ratio = if weekly == 0.0 { 0.0 } else { fee7d / weekly };
    unit(ratio) * STRUCTURAL_SCALE
}

pub fn net_issuance_high(fee7d: f64, fee30d: f64) -> bool {
    fee7d < NET_ISSUANCE_FEE_RATIO * weekly_fee_average(fee30d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn tridomain_withheld_below_ten_closes() {
        let closes: Vec<f64> = (0..9).map(|i| 100.0 + i as f64).collect();
        assert!(compute_tridomain(&closes).is_none());
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        assert!(compute_tridomain(&closes).is_some());
    }

    #[test]
    fn tridomain_withheld_when_every_denominator_is_zero() {
        let closes = vec![0.0; 12];
        assert!(compute_tridomain(&closes).is_none());
    }

    #[test]
    fn flat_series_has_no_structure() {
        let closes = vec![100.0; 15];
        let td = compute_tridomain(&closes).unwrap();
        assert!(approx(td.topo, 0.0));
        assert!(approx(td.spectral, 0.0));
        assert!(approx(td.delta_es, 0.0));
        assert!(approx(td.rough_path, 1.0));
    }

    #[test]
    fn steady_uptrend_scores_topo() {
        // Newest first: 130 down to 100 in equal steps
        let closes: Vec<f64> = (0..=30).rev().map(|i| 100.0 + i as f64).collect();
        let td = compute_tridomain(&closes).unwrap();
        // long return 30%, saturates the return term; low volatility
        assert!(td.topo > 0.9, "topo = {}", td.topo);
        // No negative returns, so the tail is a small positive step
        assert!(td.delta_es < 0.1);
    }

    #[test]
    fn expected_shortfall_uses_worst_tenth() {
        let returns = vec![-0.05, 0.01, 0.02, 0.03, 0.01, 0.0, 0.01, 0.02, 0.01, 0.02, -0.2];
        // 11 returns -> floor(1.1) = 1 worst return
        assert!(approx(expected_shortfall(&returns), 0.2));
    }

    #[test]
    fn sample_volatility_uses_n_minus_one() {
        let returns = vec![1.0, 3.0];
        assert!(approx(sample_volatility(&returns), 2f64.sqrt()));
        assert!(approx(sample_volatility(&[0.5]), 0.0));
    }

    #[test]
    fn potentials_match_policy() {
        assert!(approx(cognitive_potential(0.1, 0.02), 0.58));
        assert!(approx(liquidity_potential(5.0, 250.0, 0.0), 0.7));
        assert!(approx(liquidity_potential(5.0, 250.0, 1.0), 0.6));
        assert!(approx(onchain_reflexivity(25.0, 0.9), 0.87));
        assert!(approx(sentiment_threshold(50.0), 0.6));
        assert!(approx(sentiment_threshold(0.0), 0.4));
        assert!(approx(sentiment_threshold(100.0), 0.8));
    }

    #[test]
    fn structural_scores() {
        assert!(approx(rsd_score(0.5, 0.7), 6.0));
        assert!(mapping_ratio_down(0.4, 0.5));
        assert!(!mapping_ratio_down(0.5, 0.5));
        assert!(approx(lstc_score(50.0, 400.0), 5.0));
        assert!(approx(lstc_score(200.0, 400.0), 10.0));
        assert!(approx(lstc_score(10.0, 0.0), 0.0));
        assert!(net_issuance_high(50.0, 400.0));
        assert!(!net_issuance_high(70.0, 400.0));
        assert!(approx(stable_share(5.0, 0.0), 5.0));
    }

    proptest! {
        #[test]
        fn clamp_stays_in_bounds(v in -1e6f64..1e6, low in -10f64..0.0, high in 0f64..10.0) {
            let c = clamp(v, low, high);
            prop_assert!(c >= low && c <= high);
        }

        #[test]
        fn tridomain_metrics_are_unit_bounded(
            closes in proptest::collection::vec(1f64..10_000.0, 10..60),
        ) {
            let td = compute_tridomain(&closes).unwrap();
            for v in [td.topo, td.spectral, td.rough_path, td.delta_es] {
                prop_assert!((0.0..=1.0).contains(&v));
            }
        }

        #[test]
        fn potentials_are_unit_bounded(
            a in -100f64..100.0,
            b in -1000f64..1000.0,
            c in -10f64..10.0,
        ) {
            prop_assert!((0.0..=1.0).contains(&cognitive_potential(a, c)));
            prop_assert!((0.0..=1.0).contains(&liquidity_potential(a, b, c)));
            prop_assert!((0.0..=1.0).contains(&onchain_reflexivity(b, c)));
            prop_assert!((0.3..=0.8).contains(&sentiment_threshold(b)));
        }
    }
}
