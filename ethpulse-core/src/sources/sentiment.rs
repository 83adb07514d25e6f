//! Crypto Fear & Greed index from alternative.me.

use super::{
    date_from_secs, lenient_f64, lenient_i64, note_degraded_anchor, FetchContext, SourceAdapter,
    SourceError, SourceOutput,
};
use crate::align::{AlignedSeries, Observation};
use crate::net::{fetch_json, HttpRequest};
use serde::Deserialize;

const FNG_URL: &str = "https://api.alternative.me/fng/";
/// Extra history requested beyond the target so a missed day still anchors.
const HISTORY_SLACK_DAYS: i64 = 2;

#[derive(Debug, Deserialize)]
struct FngResponse {
    #[serde(default)]
    data: Vec<FngPoint>,
}

#[derive(Debug, Deserialize)]
struct FngPoint {
    #[serde(default, deserialize_with = "lenient_f64")]
    value: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    timestamp: Option<i64>,
}

pub struct FearGreedAdapter;

impl FearGreedAdapter {
    /// History depth needed to reach back to the target.
    fn limit(ctx: &FetchContext<'_>) -> i64 {
        match ctx.target {
            Some(target) => (ctx.now.date_naive() - target).num_days().max(0) + HISTORY_SLACK_DAYS,
            None => 1,
        }
    }
}

impl SourceAdapter for FearGreedAdapter {
    fn name(&self) -> &str {
        "AltMe(FNG)"
    }

    fn declared_keys(&self) -> &[&'static str] {
        &["fearGreed"]
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Result<SourceOutput, SourceError> {
        let keys = self.declared_keys();
        let url = format!("{FNG_URL}?limit={}&format=json", Self::limit(ctx));
        let resp: FngResponse = match fetch_json(ctx.fetcher, &HttpRequest::get(url)) {
            Ok(resp) => resp,
            Err(e) => return Ok(SourceOutput::failed(keys, e)),
        };

        let series: AlignedSeries<f64> = resp
            .data
            .iter()
            .filter_map(|p| Some(Observation::new(date_from_secs(p.timestamp?)?, p.value?)))
            .collect();
        let Some(a) = series.anchor(ctx.target) else {
            return Ok(SourceOutput::failed(keys, "no index values returned"));
        };

        let mut out = SourceOutput::default();
        note_degraded_anchor(ctx, &series, a, "fear & greed", &mut out);
        let point = &series.points()[a];
        out.set_on("fearGreed", point.value, "Alternative.me: FNG", point.date);
        Ok(out.finish(keys))
    }
}
