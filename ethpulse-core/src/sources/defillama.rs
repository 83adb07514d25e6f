//! DefiLlama adapters: stablecoin supply (all chains and Ethereum), CEX
//! flows, RWA protocol shares, and Ethereum fees.

use super::{
    date_from_secs, latest_label, lenient_f64, lenient_i64, note_degraded_anchor,
    note_historical_unsupported, percent_change, FetchContext, SourceAdapter, SourceError,
    SourceOutput,
};
use crate::align::{AlignedSeries, Observation};
use crate::net::{fetch_json, HttpRequest};
use serde::Deserialize;
use std::collections::HashMap;

/// Points in the stablecoin window: the anchor and 34 days before it.
pub const STABLECOIN_WINDOW: usize = 35;
const FEE_WEEK_DAYS: usize = 7;
const FEE_MONTH_DAYS: usize = 30;
const RWA_CATEGORY: &str = "RWA";

const ALL_STABLE_KEYS: [&str; 3] = ["stablecoin30d", "totalStableNow", "totalStableAgo"];
const ETH_STABLE_KEYS: [&str; 2] = ["ethStableNow", "ethStableAgo"];

#[derive(Debug, Deserialize)]
struct StablecoinPoint {
    #[serde(default, deserialize_with = "lenient_i64")]
    date: Option<i64>,
    #[serde(rename = "totalCirculatingUSD", default)]
    total: Option<PeggedTotals>,
}

#[derive(Debug, Deserialize)]
struct PeggedTotals {
    #[serde(rename = "peggedUSD", default, deserialize_with = "lenient_f64")]
    pegged_usd: Option<f64>,
}

/// Parse a `stablecoincharts/*` body into dated USD supply observations.
pub fn parse_stablecoin_chart(body: &str) -> Result<Vec<Observation<f64>>, SourceError> {
    let points: Vec<StablecoinPoint> =
        serde_json::from_str(body).map_err(|e| SourceError::Malformed(e.to_string()))?;
    Ok(points
        .into_iter()
        .filter_map(|p| {
            let date = date_from_secs(p.date?)?;
            let value = p.total?.pegged_usd?;
            Some(Observation::new(date, value))
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StablecoinScope {
    All,
    Ethereum,
}

/// Stablecoin circulating supply, all chains or Ethereum only.
pub struct StablecoinAdapter {
    scope: StablecoinScope,
}

impl StablecoinAdapter {
    pub fn all() -> Self {
        Self {
            scope: StablecoinScope::All,
        }
    }

    pub fn ethereum() -> Self {
        Self {
            scope: StablecoinScope::Ethereum,
        }
    }

    fn url(&self) -> &'static str {
        match self.scope {
            StablecoinScope::All => "https://stablecoins.llama.fi/stablecoincharts/all",
            StablecoinScope::Ethereum => "https://stablecoins.llama.fi/stablecoincharts/ethereum",
        }
    }

    fn label(&self) -> &'static str {
        match self.scope {
            StablecoinScope::All => "DefiLlama: stablecoincharts/all",
            StablecoinScope::Ethereum => "DefiLlama: stablecoincharts/ethereum",
        }
    }
}

impl SourceAdapter for StablecoinAdapter {
    fn name(&self) -> &str {
        match self.scope {
            StablecoinScope::All => "DefiLlama(stablecoin)",
            StablecoinScope::Ethereum => "DefiLlama(stablecoin_eth)",
        }
    }

    fn declared_keys(&self) -> &[&'static str] {
        match self.scope {
            StablecoinScope::All => &ALL_STABLE_KEYS,
            StablecoinScope::Ethereum => &ETH_STABLE_KEYS,
        }
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Result<SourceOutput, SourceError> {
        let keys = self.declared_keys();
        let body = match ctx.fetcher.get_text(self.url()) {
            Ok(body) => body,
            Err(e) => return Ok(SourceOutput::failed(keys, e)),
        };
        let points = match parse_stablecoin_chart(&body) {
            Ok(points) => points,
            Err(e) => return Ok(SourceOutput::failed(keys, e)),
        };

        let series = AlignedSeries::new(points);
        let Some(a) = series.anchor(ctx.target) else {
            return Ok(SourceOutput::failed(keys, "empty stablecoin chart"));
        };
        let mut out = SourceOutput::default();
        note_degraded_anchor(ctx, &series, a, "stablecoin chart", &mut out);

        let (Some(now), Some(ago)) = (series.at(a, 0), series.at(a, STABLECOIN_WINDOW - 1)) else {
            out.diagnostic(format!(
                "stablecoin chart has {} points from anchor, need {STABLECOIN_WINDOW}",
                series.len() - a
            ));
            return Ok(out.finish(keys));
        };
        let day = now.date;
        let label = self.label();
        match self.scope {
            StablecoinScope::All => {
                out.set_on("stablecoin30d", percent_change(now.value, ago.value), label, day);
                out.set_on("totalStableNow", now.value, label, day);
                out.set_on("totalStableAgo", ago.value, label, day);
            }
            StablecoinScope::Ethereum => {
                out.set_on("ethStableNow", now.value, label, day);
                out.set_on("ethStableAgo", ago.value, label, day);
            }
        }
        Ok(out.finish(keys))
    }
}

#[derive(Debug, Deserialize)]
struct CexResponse {
    #[serde(default)]
    cexs: Vec<CexEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CexEntry {
    #[serde(rename = "inflows_1m", default, deserialize_with = "lenient_f64")]
    inflows_1m: Option<f64>,
    #[serde(rename = "inflows_1w", default, deserialize_with = "lenient_f64")]
    inflows_1w: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    current_tvl: Option<f64>,
}

/// Aggregate exchange flows across every listed CEX. Current values only.
pub struct CexAdapter;

const CEX_KEYS: [&str; 3] = ["exchBalanceTrend", "exchStableDelta", "cexTvl"];

impl SourceAdapter for CexAdapter {
    fn name(&self) -> &str {
        "DefiLlama(CEX)"
    }

    fn declared_keys(&self) -> &[&'static str] {
        &CEX_KEYS
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Result<SourceOutput, SourceError> {
        let resp: CexResponse =
            match fetch_json(ctx.fetcher, &HttpRequest::get("https://api.llama.fi/cexs")) {
                Ok(resp) => resp,
                Err(e) => return Ok(SourceOutput::failed(&CEX_KEYS, e)),
            };
        if resp.cexs.is_empty() {
            return Ok(SourceOutput::failed(&CEX_KEYS, "no exchanges listed"));
        }

        let (mut inflow_1m, mut inflow_1w, mut tvl) = (0.0, 0.0, 0.0);
        for cex in &resp.cexs {
            inflow_1m += cex.inflows_1m.unwrap_or(0.0);
            inflow_1w += cex.inflows_1w.unwrap_or(0.0);
            tvl += cex.current_tvl.unwrap_or(0.0);
        }

        let mut out = SourceOutput::default();
        note_historical_unsupported(ctx, &mut out);
        out.set(
            "exchBalanceTrend",
            inflow_1m,
            latest_label("DefiLlama: /cexs inflows_1m (sum)"),
        );
        out.set(
            "exchStableDelta",
            inflow_1w,
            latest_label("DefiLlama: /cexs inflows_1w (sum)"),
        );
        out.set("cexTvl", tvl, latest_label("DefiLlama: /cexs currentTvl (sum)"));
        Ok(out.finish(&CEX_KEYS))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Protocol {
    #[serde(default)]
    category: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    tvl: Option<f64>,
    #[serde(default)]
    chain_tvls: HashMap<String, serde_json::Value>,
}

/// Ethereum's share of real-world-asset protocol TVL. Current values only.
pub struct RwaAdapter;

impl SourceAdapter for RwaAdapter {
    fn name(&self) -> &str {
        "DefiLlama(RWA)"
    }

    fn declared_keys(&self) -> &[&'static str] {
        &["rwaShareEth"]
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Result<SourceOutput, SourceError> {
        let keys = self.declared_keys();
        let protocols: Vec<Protocol> =
            match fetch_json(ctx.fetcher, &HttpRequest::get("https://api.llama.fi/protocols")) {
                Ok(protocols) => protocols,
                Err(e) => return Ok(SourceOutput::failed(keys, e)),
            };

        let (mut total, mut ethereum) = (0.0, 0.0);
        for protocol in protocols
            .iter()
            .filter(|p| p.category.as_deref() == Some(RWA_CATEGORY))
        {
            total += protocol.tvl.unwrap_or(0.0);
            ethereum += protocol
                .chain_tvls
                .get("Ethereum")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0);
        }
        if total <= 0.0 {
            return Ok(SourceOutput::failed(keys, "no RWA TVL reported"));
        }

        let mut out = SourceOutput::default();
        note_historical_unsupported(ctx, &mut out);
        out.set(
            "rwaShareEth",
            ethereum / total,
            latest_label("DefiLlama: protocols (RWA)"),
        );
        Ok(out.finish(keys))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeesSummary {
    #[serde(default, deserialize_with = "lenient_f64")]
    total7d: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    total30d: Option<f64>,
    #[serde(default)]
    total_data_chart: Vec<(i64, f64)>,
}

/// Ethereum fee totals over 7 and 30 days.
pub struct FeesAdapter;

const FEES_URL: &str = "https://api.llama.fi/summary/fees/ethereum?dataType=dailyFees";

impl SourceAdapter for FeesAdapter {
    fn name(&self) -> &str {
        "DefiLlama(Fees)"
    }

    fn declared_keys(&self) -> &[&'static str] {
        &["fee7d", "fee30d"]
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Result<SourceOutput, SourceError> {
        let keys = self.declared_keys();
        let summary: FeesSummary = match fetch_json(ctx.fetcher, &HttpRequest::get(FEES_URL)) {
            Ok(summary) => summary,
            Err(e) => return Ok(SourceOutput::failed(keys, e)),
        };
        let mut out = SourceOutput::default();

        if ctx.target.is_none() {
            if let (Some(week), Some(month)) = (summary.total7d, summary.total30d) {
                let label = latest_label("DefiLlama: fees/ethereum");
                out.set("fee7d", week, label.clone());
                out.set("fee30d", month, label);
                return Ok(out.finish(keys));
            }
        }

        let series: AlignedSeries<f64> = summary
            .total_data_chart
            .iter()
            .filter_map(|(secs, value)| Some(Observation::new(date_from_secs(*secs)?, *value)))
            .collect();
        let Some(a) = series.anchor(ctx.target) else {
            out.diagnostic("fee chart empty");
            return Ok(out.finish(keys));
        };
        note_degraded_anchor(ctx, &series, a, "fee chart", &mut out);

        let day = series.points()[a].date;
        let label = "DefiLlama: fees/ethereum daily chart";
        let week = series.values(a, FEE_WEEK_DAYS);
        let month = series.values(a, FEE_MONTH_DAYS);
        if week.len() == FEE_WEEK_DAYS {
            out.set_on("fee7d", week.iter().sum::<f64>(), label, day);
        }
        if month.len() == FEE_MONTH_DAYS {
            out.set_on("fee30d", month.iter().sum::<f64>(), label, day);
        } else {
            out.diagnostic(format!(
                "fee chart has {} days from anchor, need {FEE_MONTH_DAYS}",
                month.len()
            ));
        }
        Ok(out.finish(keys))
    }
}
