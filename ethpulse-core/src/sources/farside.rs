//! Spot ETF net flows from the Farside flow tables.
//!
//! Tries the Ethereum page, then the Bitcoin page. Each page is fetched
//! directly and, when the body is a bot challenge or has no rows, through the
//! text-rendering proxy. When both succeed their anchored totals are
//! cross-checked.

use super::farside_table::{is_bot_challenge, parse_flow_table, FlowRow};
use super::{note_degraded_anchor, FetchContext, SourceAdapter, SourceError, SourceOutput};
use crate::align::{AlignedSeries, Observation};
use tracing::debug;

/// Tolerance (US$m) before two totals count as disagreeing.
pub const MISMATCH_TOLERANCE: f64 = 0.1;
/// A prior-day total at or below this (US$m) is an extreme outflow.
pub const EXTREME_OUTFLOW_USD_M: f64 = -180.0;

const PAGES: [(&str, &str); 2] = [
    ("https://farside.co.uk/ethereum-etf-flow/", "Farside: ethereum-etf-flow"),
    ("https://farside.co.uk/bitcoin-etf-flow/", "Farside: bitcoin-etf-flow"),
];

const KEYS: [&str; 4] = ["etf1d", "etf5d", "etf10d", "prevEtfExtremeOutflow"];

pub struct FarsideAdapter {
    text_proxy_base: String,
}

struct PageRows {
    rows: AlignedSeries<FlowRow>,
    label: String,
}

fn to_series(rows: Vec<FlowRow>) -> AlignedSeries<FlowRow> {
    rows.into_iter().map(|r| Observation::new(r.date, r)).collect()
}

impl FarsideAdapter {
    pub fn new(text_proxy_base: impl Into<String>) -> Self {
        Self {
            text_proxy_base: text_proxy_base.into(),
        }
    }

    fn fetch_body(ctx: &FetchContext<'_>, url: &str) -> String {
        match ctx.fetcher.get_text(url) {
            Ok(body) => body,
            Err(e) => {
                debug!(url, error = %e, "flow page fetch failed");
                String::new()
            }
        }
    }

    fn check_components(
        ctx: &FetchContext<'_>,
        rows: &AlignedSeries<FlowRow>,
        label: &str,
        out: &mut SourceOutput,
    ) {
        let Some(row) = rows.anchor(ctx.target).and_then(|a| rows.at(a, 0)) else {
            return;
        };
        let mismatch = row.value.component_mismatch();
        if mismatch > MISMATCH_TOLERANCE {
            out.diagnostic(format!("{label} total mismatch vs components: {mismatch:.2}"));
        }
    }

    /// Direct fetch with text-proxy fallback and cross-validation.
    fn fetch_page(
        &self,
        ctx: &FetchContext<'_>,
        url: &str,
        label: &str,
        out: &mut SourceOutput,
    ) -> Option<PageRows> {
        let direct_text = Self::fetch_body(ctx, url);
        let blocked = is_bot_challenge(&direct_text);
        let direct = if blocked {
            AlignedSeries::new(Vec::new())
        } else {
            to_series(parse_flow_table(&direct_text))
        };
        let proxied_url = format!("{}{url}", self.text_proxy_base);

        if direct.is_empty() {
            if blocked {
                out.diagnostic(format!("{label} direct blocked, falling back to text proxy"));
            }
            let proxied = to_series(parse_flow_table(&Self::fetch_body(ctx, &proxied_url)));
            if proxied.is_empty() {
                return None;
            }
            Self::check_components(ctx, &proxied, label, out);
            return Some(PageRows {
                rows: proxied,
                label: format!("{label} (text proxy)"),
            });
        }

        let proxied = to_series(parse_flow_table(&Self::fetch_body(ctx, &proxied_url)));
        if let (Some(da), Some(pa)) = (direct.anchor(ctx.target), proxied.anchor(ctx.target)) {
            let (d, p) = (&direct.points()[da], &proxied.points()[pa]);
            if d.date == p.date {
                let delta = (d.value.total - p.value.total).abs();
                if delta > MISMATCH_TOLERANCE {
                    out.diagnostic(format!("{label} direct vs text proxy mismatch: {delta:.2}"));
                }
            }
        }
        Self::check_components(ctx, &direct, label, out);
        Some(PageRows {
            rows: direct,
            label: label.to_string(),
        })
    }
}

impl SourceAdapter for FarsideAdapter {
    fn name(&self) -> &str {
        "Farside(ETF)"
    }

    fn declared_keys(&self) -> &[&'static str] {
        &KEYS
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Result<SourceOutput, SourceError> {
        let mut out = SourceOutput::default();
        let page = PAGES
            .iter()
            .find_map(|(url, label)| self.fetch_page(ctx, url, label, &mut out));
        let Some(PageRows { rows, label }) = page else {
            out.diagnostic("no flow rows from any page");
            return Ok(out.finish(&KEYS));
        };
        let Some(a) = rows.anchor(ctx.target) else {
            return Ok(out.finish(&KEYS));
        };
        note_degraded_anchor(ctx, &rows, a, "flow table", &mut out);

        let day = rows.points()[a].date;
        let totals: Vec<f64> = rows.window(a, 10).iter().map(|r| r.value.total).collect();
        out.set_on("etf1d", totals[0], label.as_str(), day);
        if totals.len() >= 5 {
            out.set_on("etf5d", totals[..5].iter().sum::<f64>(), label.as_str(), day);
        }
        if totals.len() >= 10 {
            out.set_on("etf10d", totals.iter().sum::<f64>(), label.as_str(), day);
        }
        if let Some(prior) = rows.at(a, 1) {
            out.set_on(
                "prevEtfExtremeOutflow",
                prior.value.total <= EXTREME_OUTFLOW_USD_M,
                format!("Derived: prior day ETF extreme ({label})"),
                day,
            );
        }
        Ok(out.finish(&KEYS))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::DEFAULT_TEXT_PROXY;
    use super::*;
    use crate::net::StaticFetcher;

    const ETH_URL: &str = "https://farside.co.uk/ethereum-etf-flow/";
    const BTC_URL: &str = "https://farside.co.uk/bitcoin-etf-flow/";

    /// Markdown table with one row per day from 2026-01-26 through 2026-02-09,
    /// totals 1.0, 2.0, ... in date order.
    fn markdown(days: usize, skew: f64) -> String {
        let start = date("2026-01-26");
        let mut body = String::from("| Date | ETHA | Total |\n| --- | --- | --- |\n");
        for i in 0..days {
            let day = start + chrono::Duration::days(i as i64);
            let total = (i + 1) as f64;
            body.push_str(&format!(
                "| {} | {} | {} |\n",
                day.format("%d %b %Y"),
                total,
                total + skew
            ));
        }
        body
    }

    fn proxied(url: &str) -> String {
        format!("{DEFAULT_TEXT_PROXY}{url}")
    }

    #[test]
    fn sums_from_anchor() {
        let fetcher = StaticFetcher::new()
            .with(ETH_URL, markdown(15, 0.0))
            .with(proxied(ETH_URL), markdown(15, 0.0));
        let out = FarsideAdapter::new(DEFAULT_TEXT_PROXY)
            .fetch(&ctx(&fetcher, Some("2026-02-06")))
            .unwrap();

        // 2026-02-06 is day index 11 -> total 12
        assert_eq!(num(&out, "etf1d"), 12.0);
        assert_eq!(num(&out, "etf5d"), 12.0 + 11.0 + 10.0 + 9.0 + 8.0);
        assert_eq!(num(&out, "etf10d"), (3..=12).sum::<i32>() as f64);
        assert!(!flag(&out, "prevEtfExtremeOutflow"));
        assert_eq!(out.sources["etf1d"], "Farside: ethereum-etf-flow");
        assert!(out.metadata.diagnostics.is_empty(), "{:?}", out.metadata.diagnostics);
    }

    #[test]
    fn blocked_page_falls_back_to_text_proxy() {
        let fetcher = StaticFetcher::new()
            .with(ETH_URL, "<title>Just a moment...</title>")
            .with(proxied(ETH_URL), markdown(6, 0.5));
        let out = FarsideAdapter::new(DEFAULT_TEXT_PROXY)
            .fetch(&ctx(&fetcher, None))
            .unwrap();

        assert_eq!(num(&out, "etf1d"), 6.5);
        assert_eq!(out.sources["etf1d"], "Farside: ethereum-etf-flow (text proxy)");
        assert!(out.missing.contains("etf10d"));
        let diags = &out.metadata.diagnostics;
        assert!(diags.iter().any(|d| d.contains("direct blocked")));
        assert!(diags.iter().any(|d| d.contains("total mismatch vs components: 0.50")));
    }

    #[test]
    fn direct_and_proxy_disagreement_is_reported() {
        let fetcher = StaticFetcher::new()
            .with(ETH_URL, markdown(12, 0.0))
            .with(proxied(ETH_URL), markdown(12, 3.0));
        let out = FarsideAdapter::new(DEFAULT_TEXT_PROXY)
            .fetch(&ctx(&fetcher, None))
            .unwrap();
        // Direct values win
        assert_eq!(num(&out, "etf1d"), 12.0);
        assert!(out
            .metadata
            .diagnostics
            .iter()
            .any(|d| d == "Farside: ethereum-etf-flow direct vs text proxy mismatch: 3.00"));
    }

    #[test]
    fn bitcoin_page_is_the_fallback() {
        let fetcher = StaticFetcher::new().with(BTC_URL, markdown(3, 0.0));
        let out = FarsideAdapter::new(DEFAULT_TEXT_PROXY)
            .fetch(&ctx(&fetcher, None))
            .unwrap();
        assert_eq!(out.sources["etf1d"], "Farside: bitcoin-etf-flow");
        assert_eq!(num(&out, "etf1d"), 3.0);
    }

    #[test]
    fn extreme_prior_outflow() {
        let body = "| Date | A | Total |\n\
                    | 05 Feb 2026 | (200.0) | (200.0) |\n\
                    | 06 Feb 2026 | 5.0 | 5.0 |\n";
        let fetcher = StaticFetcher::new().with(ETH_URL, body);
        let out = FarsideAdapter::new(DEFAULT_TEXT_PROXY)
            .fetch(&ctx(&fetcher, None))
            .unwrap();
        assert!(flag(&out, "prevEtfExtremeOutflow"));
    }

    #[test]
    fn nothing_parseable_leaves_keys_missing() {
        let fetcher = StaticFetcher::new();
        let out = FarsideAdapter::new(DEFAULT_TEXT_PROXY)
            .fetch(&ctx(&fetcher, None))
            .unwrap();
        assert_eq!(out.missing.len(), 4);
        assert!(out.data.is_empty());
    }
}
