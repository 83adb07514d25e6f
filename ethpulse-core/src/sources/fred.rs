//! FRED macro series.
//!
//! Uses the observations API (with `observation_end` for historical targets)
//! when an API key is configured, and the public `fredgraph.csv` export
//! otherwise or when the API fails.

use super::{
    lenient_f64, note_degraded_anchor, percent_change, FetchContext, SourceAdapter, SourceError,
    SourceOutput,
};
use crate::align::{AlignedSeries, Observation};
use crate::net::{fetch_json, HttpRequest};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

const API_BASE: &str = "https://api.stlouisfed.org/fred/series/observations";
const CSV_BASE: &str = "https://fred.stlouisfed.org/graph/fredgraph.csv";

/// Offset (in observations) for week-over-week changes.
const WEEK_OFFSET: usize = 5;
/// Offset for the pre-meeting reference value.
const PRE_MEETING_OFFSET: usize = 2;
const DXY_RISING_DAYS: usize = 3;

const KEYS: [&str; 13] = [
    "dxy5d",
    "dxy3dUp",
    "us2yWeekBp",
    "fciUpWeeks",
    "policyWindow",
    "preMeeting2y",
    "current2y",
    "preMeetingDxy",
    "currentDxy",
    "rrpChange",
    "tgaChange",
    "srfChange",
    "ism",
];

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<ApiObservation>,
}

#[derive(Debug, Deserialize)]
struct ApiObservation {
    date: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    value: Option<f64>,
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Parse a FRED observations API body. Missing values (".") are dropped.
pub fn parse_observations_json(body: &str) -> Result<Vec<Observation<f64>>, SourceError> {
    let resp: ObservationsResponse =
        serde_json::from_str(body).map_err(|e| SourceError::Malformed(e.to_string()))?;
    Ok(resp
        .observations
        .into_iter()
        .filter_map(|o| Some(Observation::new(parse_date(&o.date)?, o.value?)))
        .collect())
}

/// Parse a `fredgraph.csv` export (`DATE,<ID>` or `observation_date,<ID>`).
pub fn parse_fredgraph_csv(body: &str) -> Result<Vec<Observation<f64>>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let mut points = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| SourceError::Malformed(e.to_string()))?;
        let (Some(date), Some(value)) = (record.get(0), record.get(1)) else {
            continue;
        };
        let (Some(date), Ok(value)) = (parse_date(date), value.parse::<f64>()) else {
            continue;
        };
        points.push(Observation::new(date, value));
    }
    Ok(points)
}

pub struct FredAdapter {
    api_key: Option<String>,
}

impl FredAdapter {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    fn api_url(
        &self,
        key: &str,
        series_id: &str,
        limit: usize,
        target: Option<NaiveDate>,
    ) -> String {
        let mut url = format!(
            "{API_BASE}?series_id={series_id}&api_key={key}&file_type=json&sort_order=desc&limit={limit}"
        );
        if let Some(target) = target {
            url.push_str(&format!("&observation_end={target}"));
        }
        url
    }

    /// Load one series anchored on the target, API first then CSV.
    fn load(
        &self,
        ctx: &FetchContext<'_>,
        series_id: &str,
        limit: usize,
        out: &mut SourceOutput,
    ) -> Option<(AlignedSeries<f64>, usize)> {
        let mut points = Vec::new();

        if let Some(key) = &self.api_key {
            let url = self.api_url(key, series_id, limit, ctx.target);
            match ctx.fetcher.get(&HttpRequest::get(url)) {
                Ok(body) => match parse_observations_json(&body) {
                    Ok(parsed) => points = parsed,
                    Err(e) => debug!(series_id, error = %e, "FRED API body unusable"),
                },
                Err(e) => debug!(series_id, error = %e, "FRED API failed"),
            }
        }

        if points.is_empty() {
            let url = format!("{CSV_BASE}?id={series_id}");
            match ctx.fetcher.get_text(&url) {
                Ok(body) => match parse_fredgraph_csv(&body) {
                    Ok(parsed) => points = parsed,
                    Err(e) => out.diagnostic(format!("{series_id} csv: {e}")),
                },
                Err(e) => out.diagnostic(format!("{series_id}: {e}")),
            }
        }

        let series = AlignedSeries::new(points);
        let anchor = series.anchor(ctx.target)?;
        note_degraded_anchor(ctx, &series, anchor, series_id, out);
        Some((series, anchor))
    }
}

fn value_at(series: &AlignedSeries<f64>, anchor: usize, offset: usize) -> Option<f64> {
    series.at(anchor, offset).map(|p| p.value)
}

/// True when each of the last `count` steps is a strict rise.
fn consecutive_rises(values: &[f64], count: usize) -> Option<bool> {
    if values.len() < count + 1 {
        return None;
    }
    Some((0..count).all(|i| values[i] > values[i + 1]))
}

impl SourceAdapter for FredAdapter {
    fn name(&self) -> &str {
        "FRED(macro)"
    }

    fn declared_keys(&self) -> &[&'static str] {
        &KEYS
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Result<SourceOutput, SourceError> {
        let mut out = SourceOutput::default();

        if let Some((dxy, a)) = self.load(ctx, "DTWEXBGS", 7, &mut out) {
            let day = dxy.points()[a].date;
            let label = "FRED: DTWEXBGS";
            let week = (value_at(&dxy, a, 0), value_at(&dxy, a, WEEK_OFFSET));
            if let (Some(now), Some(week_ago)) = week {
                out.set_on("dxy5d", percent_change(now, week_ago), label, day);
            }
            let recent = dxy.values(a, DXY_RISING_DAYS + 1);
            if let Some(up) = consecutive_rises(&recent, DXY_RISING_DAYS) {
                out.set_on("dxy3dUp", up, label, day);
            }
            if let Some(now) = value_at(&dxy, a, 0) {
                out.set_on("currentDxy", now, label, day);
            }
            if let Some(pre) = value_at(&dxy, a, PRE_MEETING_OFFSET) {
                out.set_on("preMeetingDxy", pre, "FRED: DTWEXBGS (t-2)", day);
            }
        }

        if let Some((dgs2, a)) = self.load(ctx, "DGS2", 7, &mut out) {
            let day = dgs2.points()[a].date;
            if let Some(now) = value_at(&dgs2, a, 0) {
                out.set_on("current2y", now, "FRED: DGS2", day);
                if let Some(week_ago) = value_at(&dgs2, a, WEEK_OFFSET) {
                    out.set_on("us2yWeekBp", (now - week_ago) * 100.0, "FRED: DGS2", day);
                }
            }
            if let Some(pre) = value_at(&dgs2, a, PRE_MEETING_OFFSET) {
                out.set_on("preMeeting2y", pre, "FRED: DGS2 (t-2)", day);
            }
        }

        if let Some((nfci, a)) = self.load(ctx, "NFCI", 6, &mut out) {
            let v = nfci.values(a, 3);
            if v.len() == 3 {
                let weeks = match (v[0] > v[1], v[1] > v[2]) {
                    (true, true) => 2usize,
                    (true, false) => 1,
                    _ => 0,
                };
                out.set_on("fciUpWeeks", weeks, "FRED: NFCI", nfci.points()[a].date);
            }
        }

        if let Some((dff, a)) = self.load(ctx, "DFF", 7, &mut out) {
            let v = dff.values(a, 3);
            if v.len() == 3 {
                let changed = v[0] != v[1] || v[1] != v[2];
                out.set_on(
                    "policyWindow",
                    changed,
                    "FRED: DFF recent change",
                    dff.points()[a].date,
                );
            }
        }

        for (series_id, key) in [
            ("RRPONTSYD", "rrpChange"),
            ("WTREGEN", "tgaChange"),
            ("SRFTRD", "srfChange"),
        ] {
            if let Some((series, a)) = self.load(ctx, series_id, 7, &mut out) {
                if let (Some(now), Some(week_ago)) =
                    (value_at(&series, a, 0), value_at(&series, a, WEEK_OFFSET))
                {
                    out.set_on(
                        key,
                        now - week_ago,
                        format!("FRED: {series_id}"),
                        series.points()[a].date,
                    );
                }
            }
        }

        if let Some((ism, a)) = self.load(ctx, "NAPM", 3, &mut out) {
            out.set_on("ism", ism.points()[a].value, "FRED: NAPM", ism.points()[a].date);
        }

        Ok(out.finish(&KEYS))
    }
}
