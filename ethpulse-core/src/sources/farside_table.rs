//! Flow-table parsing: raw page text to dated rows.
//!
//! Handles the HTML table served by the flow-table site and the
//! pipe-delimited markdown produced by the text-rendering proxy. Kept free
//! of I/O so both paths can be tested against captured bodies.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

/// Markers of an interstitial bot challenge instead of real content.
const CHALLENGE_MARKERS: [&str; 3] = ["just a moment", "cf-browser-verification", "cloudflare"];

/// One dated row of a flow table (US$m).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowRow {
    pub date: NaiveDate,
    /// The published total column.
    pub total: f64,
    /// Sum of the per-issuer columns.
    pub components: f64,
}

impl FlowRow {
    /// Absolute gap between the published total and its components.
    pub fn component_mismatch(&self) -> f64 {
        (self.total - self.components).abs()
    }
}

/// True for empty bodies and bot-challenge interstitials.
pub fn is_bot_challenge(text: &str) -> bool {
    if text.trim().is_empty() {
        return true;
    }
    let lowered = text.to_lowercase();
    CHALLENGE_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Parse a cell as US$m. `-` placeholders are zero, `(x)` is negative.
pub fn parse_flow_value(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() || matches!(cleaned.as_str(), "-" | "\u{2014}" | "\u{2013}") {
        return Some(0.0);
    }
    if let Some(inner) = cleaned.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        return inner.trim().parse::<f64>().ok().map(|v| -v);
    }
    cleaned.parse().ok()
}

/// Parse `YYYY-MM-DD` or `DD Mon YYYY`.
pub fn parse_flow_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d %b %Y"))
        .ok()
}

fn row_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("valid row regex"))
}

fn cell_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)<t[dh][^>]*>(.*?)</t[dh]>").expect("valid cell regex"))
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid tag regex"))
}

fn clean_cell(raw: &str) -> String {
    tag_pattern()
        .replace_all(raw, "")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// A row is a date cell followed by at least one issuer column and a total.
fn row_from_cells(cells: &[String]) -> Option<FlowRow> {
    let (first, rest) = cells.split_first()?;
    let date = parse_flow_date(first)?;
    let values: Vec<f64> = rest
        .iter()
        .map(|c| parse_flow_value(c))
        .collect::<Option<Vec<_>>>()?;
    let (total, components) = values.split_last()?;
    if components.is_empty() {
        return None;
    }
    Some(FlowRow {
        date,
        total: *total,
        components: components.iter().sum(),
    })
}

fn parse_pipe_rows(text: &str) -> Vec<FlowRow> {
    text.lines()
        .filter(|line| line.trim_start().starts_with('|'))
        .filter_map(|line| {
            let cells: Vec<String> = line
                .split('|')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
            row_from_cells(&cells)
        })
        .collect()
}

fn parse_html_rows(text: &str) -> Vec<FlowRow> {
    row_pattern()
        .captures_iter(text)
        .filter_map(|row| {
            let cells: Vec<String> = cell_pattern()
                .captures_iter(&row[1])
                .map(|cell| clean_cell(&cell[1]))
                .collect();
            row_from_cells(&cells)
        })
        .collect()
}

/// Parse every dated row out of a page body, in page order.
///
/// Summary rows (Total, Average, Maximum, Minimum) have no date and are
/// skipped.
pub fn parse_flow_table(text: &str) -> Vec<FlowRow> {
    let pipe = parse_pipe_rows(text);
    if !pipe.is_empty() {
        return pipe;
    }
    parse_html_rows(text)
}
