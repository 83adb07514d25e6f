//! Daily ETH candles and the price-structure signals computed from them.
//!
//! Bitfinex serves daily candles up to any end time; CoinGecko OHLC is the
//! fallback and only covers the recent past.

use super::{
    date_from_millis, latest_label, note_degraded_anchor, note_historical_unsupported,
    FetchContext, SourceAdapter, SourceError, SourceOutput,
};
use crate::align::{AlignedSeries, Observation};
use crate::field::CLOSE_SERIES;
use crate::net::{fetch_json, HttpRequest};
use crate::staleness::day_start;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Candles kept from the anchor backwards.
pub const CANDLE_WINDOW: usize = 30;
const TREND_LOOKBACK: usize = 7;
const LONG_WICK_RATIO: f64 = 0.4;
const REVERSAL_VOLUME_MULTIPLE: f64 = 1.5;
const CONFIRM_VOLUME_MULTIPLE: f64 = 1.2;
/// Close must sit above this fraction of the day's range for a short failure.
const SHORT_FAILURE_CLOSE_FRACTION: f64 = 0.6;
const CROWDING_BASE: f64 = 50.0;
const CROWDING_SCALE: f64 = 500.0;
const CROWDING_CAP: f64 = 100.0;

const BITFINEX_URL: &str = "https://api-pub.bitfinex.com/v2/candles/trade:1D:tETHUSD/hist";
const COINGECKO_OHLC_URL: &str =
    "https://api.coingecko.com/api/v3/coins/ethereum/ohlc?vs_currency=usd&days=30";
const COINGECKO_CHART_URL: &str =
    "https://api.coingecko.com/api/v3/coins/ethereum/market_chart?vs_currency=usd&days=30";

const KEYS: [&str; 8] = [
    "trendMomentum",
    "divergence",
    "crowdingIndex",
    "longWicks",
    "reverseFishing",
    "shortFailure",
    "volumeConfirm",
    "ethSpotPrice",
];

/// One daily candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// `None` when the upstream carries no volume for the day.
    pub volume: Option<f64>,
}

/// Signals derived from newest-first daily candles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleSignals {
    pub trend_momentum: Option<f64>,
    pub divergence: Option<f64>,
    pub crowding_index: Option<f64>,
    pub long_wicks: Option<bool>,
    pub reverse_fishing: Option<bool>,
    pub short_failure: Option<bool>,
    pub volume_confirm: Option<bool>,
    pub spot: Option<f64>,
}

/// Compute price-structure signals from newest-first candles.
pub fn candle_signals(candles: &[Candle]) -> CandleSignals {
    let Some(latest) = candles.first() else {
        return CandleSignals::default();
    };
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let range = (latest.high - latest.low).max(1.0);

    let trend_momentum = (closes.len() > TREND_LOOKBACK + 1 && closes[TREND_LOOKBACK] != 0.0)
        .then(|| (closes[0] - closes[TREND_LOOKBACK]) / closes[TREND_LOOKBACK]);
    let divergence = (closes.len() > 2 && closes[1] != 0.0)
        .then(|| ((closes[0] - closes[1]) / closes[1]).abs());
    let crowding_index =
        trend_momentum.map(|t| CROWDING_CAP.min(CROWDING_BASE + t.abs() * CROWDING_SCALE));

    let upper_wick = latest.high - latest.open.max(latest.close);
    let long_wicks = Some(upper_wick / range > LONG_WICK_RATIO);
    let short_failure = Some(
        latest.close > latest.open
            && (latest.close - latest.low) / range > SHORT_FAILURE_CLOSE_FRACTION,
    );

    // Volume signals compare today against the mean of the prior days
    let prior: Option<Vec<f64>> = candles[1..].iter().map(|c| c.volume).collect();
    let (reverse_fishing, volume_confirm) = match (latest.volume, prior) {
        (Some(today), Some(prior)) if !prior.is_empty() => {
            let average = prior.iter().sum::<f64>() / prior.len() as f64;
            (
                Some(latest.close < latest.open && today > average * REVERSAL_VOLUME_MULTIPLE),
                Some(today >= average * CONFIRM_VOLUME_MULTIPLE),
            )
        }
        _ => (None, None),
    };

    CandleSignals {
        trend_momentum,
        divergence,
        crowding_index,
        long_wicks,
        reverse_fishing,
        short_failure,
        volume_confirm,
        spot: Some(latest.close),
    }
}

/// Parse Bitfinex `[MTS, OPEN, CLOSE, HIGH, LOW, VOLUME]` rows.
pub fn parse_bitfinex(body: &str) -> Result<Vec<Observation<Candle>>, SourceError> {
    let rows: Vec<Vec<f64>> =
        serde_json::from_str(body).map_err(|e| SourceError::Malformed(e.to_string()))?;
    Ok(rows
        .iter()
        .filter(|r| r.len() >= 6)
        .filter_map(|r| {
            let date = date_from_millis(r[0] as i64)?;
            Some(Observation::new(
                date,
                Candle {
                    open: r[1],
                    close: r[2],
                    high: r[3],
                    low: r[4],
                    volume: Some(r[5]),
                },
            ))
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    #[serde(default)]
    total_volumes: Vec<(f64, f64)>,
}

/// Fold intraday `[ms, open, high, low, close]` OHLC rows into daily candles,
/// attaching the last reported volume of each day when available.
pub fn daily_from_ohlc(
    rows: &[Vec<f64>],
    volumes: &[(f64, f64)],
) -> Vec<Observation<Candle>> {
    let mut daily: BTreeMap<NaiveDate, Candle> = BTreeMap::new();
    let mut ordered: Vec<&Vec<f64>> = rows.iter().filter(|r| r.len() >= 5).collect();
    ordered.sort_by(|a, b| a[0].total_cmp(&b[0]));

    for r in ordered {
        let Some(date) = date_from_millis(r[0] as i64) else {
            continue;
        };
        daily
            .entry(date)
            .and_modify(|c| {
                c.high = c.high.max(r[2]);
                c.low = c.low.min(r[3]);
                c.close = r[4];
            })
            .or_insert(Candle {
                open: r[1],
                high: r[2],
                low: r[3],
                close: r[4],
                volume: None,
            });
    }

    let mut day_volume: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for (ms, volume) in volumes {
        if let Some(date) = date_from_millis(*ms as i64) {
            let entry = day_volume.entry(date).or_insert((*ms, *volume));
            if *ms >= entry.0 {
                *entry = (*ms, *volume);
            }
        }
    }

    daily
        .into_iter()
        .map(|(date, mut candle)| {
            candle.volume = day_volume.get(&date).map(|(_, v)| *v);
            Observation::new(date, candle)
        })
        .collect()
}

pub struct KlinesAdapter;

impl KlinesAdapter {
    fn bitfinex_url(target: Option<NaiveDate>) -> String {
        let mut url = format!("{BITFINEX_URL}?limit={CANDLE_WINDOW}&sort=-1");
        if let Some(next_day) = target.and_then(|t| t.succ_opt()) {
            let end = day_start(next_day).timestamp_millis() - 1;
            url.push_str(&format!("&end={end}"));
        }
        url
    }

    fn from_bitfinex(ctx: &FetchContext<'_>) -> Option<AlignedSeries<Candle>> {
        let body = match ctx.fetcher.get_text(&Self::bitfinex_url(ctx.target)) {
            Ok(body) => body,
            Err(e) => {
                debug!(error = %e, "Bitfinex candles failed");
                return None;
            }
        };
        let series = AlignedSeries::new(parse_bitfinex(&body).ok()?);
        (!series.is_empty()).then_some(series)
    }

    fn from_coingecko(ctx: &FetchContext<'_>) -> Option<AlignedSeries<Candle>> {
        let rows: Vec<Vec<f64>> =
            match fetch_json(ctx.fetcher, &HttpRequest::get(COINGECKO_OHLC_URL)) {
                Ok(rows) => rows,
                Err(e) => {
                    debug!(error = %e, "CoinGecko OHLC failed");
                    return None;
                }
            };
        let volumes = fetch_json::<MarketChart>(ctx.fetcher, &HttpRequest::get(COINGECKO_CHART_URL))
            .map(|c| c.total_volumes)
            .unwrap_or_default();
        let series = AlignedSeries::new(daily_from_ohlc(&rows, &volumes));
        (!series.is_empty()).then_some(series)
    }
}

impl SourceAdapter for KlinesAdapter {
    fn name(&self) -> &str {
        "Price(klines)"
    }

    fn declared_keys(&self) -> &[&'static str] {
        &KEYS
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Result<SourceOutput, SourceError> {
        let mut out = SourceOutput::default();
        let (series, label, historical) = if let Some(series) = Self::from_bitfinex(ctx) {
            (series, "Bitfinex: tETHUSD 1D candles".to_string(), true)
        } else if let Some(series) = Self::from_coingecko(ctx) {
            note_historical_unsupported(ctx, &mut out);
            (series, latest_label("CoinGecko: ohlc (30d)"), false)
        } else {
            out.diagnostic("no candles from Bitfinex or CoinGecko");
            return Ok(out.finish(&KEYS));
        };

        // Current-only candles always anchor on the newest day
        let target = if historical { ctx.target } else { None };
        let Some(a) = series.anchor(target) else {
            return Ok(out.finish(&KEYS));
        };
        if historical {
            note_degraded_anchor(ctx, &series, a, "candles", &mut out);
        }
        let day = series.points()[a].date;
        let candles = series.values(a, CANDLE_WINDOW);
        let signals = candle_signals(&candles);

        let mut put = |key: &str, value: Option<crate::field::FieldValue>| {
            if let Some(value) = value {
                if historical {
                    out.set_on(key, value, label.as_str(), day);
                } else {
                    out.set(key, value, label.as_str());
                }
            }
        };
        put("trendMomentum", signals.trend_momentum.map(Into::into));
        put("divergence", signals.divergence.map(Into::into));
        put("crowdingIndex", signals.crowding_index.map(Into::into));
        put("longWicks", signals.long_wicks.map(Into::into));
        put("reverseFishing", signals.reverse_fishing.map(Into::into));
        put("shortFailure", signals.short_failure.map(Into::into));
        put("volumeConfirm", signals.volume_confirm.map(Into::into));
        put("ethSpotPrice", signals.spot.map(Into::into));

        out.series
            .insert(CLOSE_SERIES.to_string(), candles.iter().map(|c| c.close).collect());
        Ok(out.finish(&KEYS))
    }
}
