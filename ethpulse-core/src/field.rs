//! Field catalogue and half-life policy.
//!
//! Every indicator in a snapshot is addressed by a stable string key. The
//! 45 required keys are the dashboard contract; auxiliary keys are inputs to
//! derivations and are stripped before a snapshot is assembled, except for
//! the published auxiliaries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The 45 keys every snapshot tries to resolve.
pub const REQUIRED_FIELDS: [&str; 45] = [
    "dxy5d",
    "dxy3dUp",
    "us2yWeekBp",
    "fciUpWeeks",
    "etf10d",
    "etf5d",
    "etf1d",
    "prevEtfExtremeOutflow",
    "stablecoin30d",
    "exchStableDelta",
    "policyWindow",
    "preMeeting2y",
    "current2y",
    "preMeetingDxy",
    "currentDxy",
    "crowdingIndex",
    "liquidationUsd",
    "longWicks",
    "reverseFishing",
    "shortFailure",
    "exchBalanceTrend",
    "floatDensity",
    "mcapElasticity",
    "mcapGrowth",
    "volumeConfirm",
    "rsdScore",
    "lstcScore",
    "mappingRatioDown",
    "netIssuanceHigh",
    "cognitivePotential",
    "liquidityPotential",
    "onchainReflexivity",
    "sentimentThreshold",
    "topo",
    "spectral",
    "roughPath",
    "deltaES",
    "trendMomentum",
    "divergence",
    "distributionGateCount",
    "rrpChange",
    "tgaChange",
    "srfChange",
    "ism",
    "ethSpotPrice",
];

/// Auxiliary keys that are published alongside the required ones.
pub const PUBLISHED_AUXILIARY_FIELDS: [&str; 1] = ["cexTvl"];

/// Auxiliary keys consumed by derivations and never published.
pub const INTERNAL_FIELDS: [&str; 8] = [
    "totalStableNow",
    "totalStableAgo",
    "ethStableNow",
    "ethStableAgo",
    "rwaShareEth",
    "fee7d",
    "fee30d",
    "fearGreed",
];

/// Series key for descending daily closes produced by the klines adapter.
pub const CLOSE_SERIES: &str = "closeSeries";

/// Half-life applied to keys without an explicit policy entry.
pub const DEFAULT_HALF_LIFE_DAYS: f64 = 7.0;

/// Half-life policy per key, in days.
///
/// Policy, not measurement: the values encode how long a cached value stays
/// usable for the dashboard and must not change between runs.
pub fn half_life_days(key: &str) -> f64 {
    match key {
        "dxy5d" | "dxy3dUp" | "us2yWeekBp" | "policyWindow" | "preMeeting2y" | "current2y"
        | "preMeetingDxy" | "currentDxy" | "rrpChange" | "srfChange" => 5.0,
        "fciUpWeeks" => 14.0,
        "tgaChange" => 10.0,
        "ism" => 45.0,
        "etf10d" | "etf5d" | "etf1d" | "prevEtfExtremeOutflow" => 3.0,
        "stablecoin30d" => 10.0,
        "exchStableDelta" | "exchBalanceTrend" | "cexTvl" => 7.0,
        "crowdingIndex" | "longWicks" | "reverseFishing" | "shortFailure" | "volumeConfirm"
        | "trendMomentum" | "divergence" => 3.0,
        "topo" | "spectral" | "roughPath" | "deltaES" => 3.0,
        "liquidationUsd" => 2.0,
        "ethSpotPrice" => 1.0,
        "rsdScore" | "lstcScore" | "mappingRatioDown" | "netIssuanceHigh" => 14.0,
        "distributionGateCount" => 14.0,
        _ => DEFAULT_HALF_LIFE_DAYS,
    }
}

pub fn is_required(key: &str) -> bool {
    REQUIRED_FIELDS.contains(&key)
}

pub fn is_internal(key: &str) -> bool {
    INTERNAL_FIELDS.contains(&key)
}

/// A resolved indicator value. Absent values are never represented; the key
/// is simply left out of the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            FieldValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            FieldValue::Number(_) => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<usize> for FieldValue {
    fn from(n: usize) -> Self {
        FieldValue::Number(n as f64)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Number(v) => write!(f, "{v}"),
        }
    }
}
