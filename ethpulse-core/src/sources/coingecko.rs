//! CoinGecko market snapshot for ETH. Current values only.

use super::{
    latest_label, lenient_f64, note_historical_unsupported, FetchContext, SourceAdapter,
    SourceError, SourceOutput,
};
use crate::net::{fetch_json, HttpRequest};
use serde::Deserialize;
use std::collections::HashMap;

const MARKET_URL: &str = "https://api.coingecko.com/api/v3/coins/ethereum\
     ?localization=false&tickers=false&market_data=true&community_data=false\
     &developer_data=false&sparkline=false";

const KEYS: [&str; 5] = [
    "mcapGrowth",
    "mcapElasticity",
    "floatDensity",
    "trendMomentum",
    "divergence",
];

#[derive(Debug, Deserialize)]
struct CoinResponse {
    market_data: Option<MarketData>,
}

#[derive(Debug, Deserialize)]
struct MarketData {
    #[serde(default)]
    market_cap: HashMap<String, f64>,
    #[serde(default)]
    total_volume: HashMap<String, f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    market_cap_change_percentage_24h: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    price_change_percentage_7d: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    price_change_percentage_24h: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    circulating_supply: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    total_supply: Option<f64>,
}

pub struct MarketAdapter;

impl SourceAdapter for MarketAdapter {
    fn name(&self) -> &str {
        "CoinGecko(market)"
    }

    fn declared_keys(&self) -> &[&'static str] {
        &KEYS
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Result<SourceOutput, SourceError> {
        let resp: CoinResponse = match fetch_json(ctx.fetcher, &HttpRequest::get(MARKET_URL)) {
            Ok(resp) => resp,
            Err(e) => return Ok(SourceOutput::failed(&KEYS, e)),
        };
        let Some(market) = resp.market_data else {
            return Ok(SourceOutput::failed(&KEYS, "response has no market_data"));
        };

        let mut out = SourceOutput::default();
        note_historical_unsupported(ctx, &mut out);

        if let Some(change) = market.market_cap_change_percentage_24h {
            out.set(
                "mcapGrowth",
                change / 100.0,
                latest_label("CoinGecko: market_cap_change_percentage_24h"),
            );
        }

        let cap = market.market_cap.get("usd").copied();
        let volume = market.total_volume.get("usd").copied();
        if let (Some(cap), Some(volume)) = (cap, volume) {
            if volume > 0.0 {
                out.set(
                    "mcapElasticity",
                    cap / volume,
                    latest_label("CoinGecko: market_cap / volume_24h"),
                );
            }
        }

        if let Some(circulating) = market.circulating_supply {
            let total = market
                .total_supply
                .filter(|t| *t > 0.0)
                .unwrap_or(circulating);
            if total > 0.0 {
                out.set(
                    "floatDensity",
                    circulating / total,
                    latest_label("CoinGecko: circulating / total_supply"),
                );
            }
        }

        if let Some(week) = market.price_change_percentage_7d {
            out.set(
                "trendMomentum",
                (week / 100.0 + 1.0) / 2.0,
                latest_label("CoinGecko: price_change_percentage_7d"),
            );
        }
        if let Some(day) = market.price_change_percentage_24h {
            out.set(
                "divergence",
                (day / 100.0).abs(),
                latest_label("CoinGecko: price_change_percentage_24h"),
            );
        }

        Ok(out.finish(&KEYS))
    }
}
