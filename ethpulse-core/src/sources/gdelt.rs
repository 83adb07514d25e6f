//! Distribution gate: how many large distributors appear in crypto ETF news.

use super::{FetchContext, SourceAdapter, SourceError, SourceOutput};
use crate::net::{fetch_json, HttpRequest};
use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use std::collections::BTreeSet;

const DOC_API: &str = "https://api.gdeltproject.org/api/v2/doc/doc";
const QUERY: &str = "crypto%20ETF%20OR%20crypto%20ETP%20OR%20crypto%20ETNs";
const WINDOW_DAYS: i64 = 30;
const LABEL: &str = "GDELT: crypto ETF/ETP news (30d)";

/// Distributor names matched case-insensitively against article titles.
pub const INSTITUTIONS: [&str; 14] = [
    "Vanguard",
    "Bank of America",
    "BofA",
    "Morgan Stanley",
    "Fidelity",
    "Charles Schwab",
    "Schwab",
    "BlackRock",
    "JPMorgan",
    "Goldman",
    "UBS",
    "Citi",
    "Citigroup",
    "TD Ameritrade",
];

#[derive(Debug, Deserialize)]
struct ArticleList {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    title: Option<String>,
}

/// Distinct institution names mentioned across the titles.
pub fn count_institutions<'a>(titles: impl IntoIterator<Item = &'a str>) -> usize {
    let mut found = BTreeSet::new();
    for title in titles {
        let lowered = title.to_lowercase();
        for name in INSTITUTIONS {
            if lowered.contains(&name.to_lowercase()) {
                found.insert(name);
            }
        }
    }
    found.len()
}

pub struct DistributionAdapter;

impl DistributionAdapter {
    fn url(end: NaiveDate) -> String {
        let start = end - Duration::days(WINDOW_DAYS);
        format!(
            "{DOC_API}?query={QUERY}&mode=ArtList&format=json&maxrecords=100&sort=HybridRel\
             &startdatetime={}000000&enddatetime={}235959",
            start.format("%Y%m%d"),
            end.format("%Y%m%d")
        )
    }
}

impl SourceAdapter for DistributionAdapter {
    fn name(&self) -> &str {
        "GDELT(Distribution)"
    }

    fn declared_keys(&self) -> &[&'static str] {
        &["distributionGateCount"]
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Result<SourceOutput, SourceError> {
        let keys = self.declared_keys();
        let end = ctx.target.unwrap_or_else(|| ctx.now.date_naive());
        let list: ArticleList = match fetch_json(ctx.fetcher, &HttpRequest::get(Self::url(end))) {
            Ok(list) => list,
            Err(e) => return Ok(SourceOutput::failed(keys, e)),
        };

        let count = count_institutions(list.articles.iter().filter_map(|a| a.title.as_deref()));
        let mut out = SourceOutput::default();
        out.set_on("distributionGateCount", count, LABEL, end);
        Ok(out.finish(keys))
    }
}
