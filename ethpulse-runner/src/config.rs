//! Run configuration: output locations, egress settings and credentials.
//!
//! Loaded from an optional TOML file, then overridden from the environment.

use ethpulse_core::net::egress::{DEFAULT_PROBE_URL, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
use ethpulse_core::net::EgressConfig;
use ethpulse_core::sources::{AdapterSettings, DEFAULT_TEXT_PROXY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variables holding proxy URLs, in priority order.
pub const PROXY_ENV_VARS: [&str; 5] = [
    "PROXY_PRIMARY",
    "PROXY_FALLBACK",
    "HTTPS_PROXY",
    "HTTP_PROXY",
    "ALL_PROXY",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub network: NetworkConfig,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where `build` writes the snapshot JSON.
    pub snapshot_path: PathBuf,
    /// Last-known-good snapshot read for backfill and rewritten on "latest"
    /// refreshes.
    pub last_known_good_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("data/snapshot.json"),
            last_known_good_path: PathBuf::from("data/last_known_good.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
    /// Proxy URLs tried after the direct path, in order.
    pub proxies: Vec<String>,
    /// Resolve hosts over DNS-over-HTTPS on the direct path.
    pub doh: bool,
    pub probe_url: String,
    pub user_agent: String,
    pub text_proxy_base: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            proxies: Vec::new(),
            doh: false,
            probe_url: DEFAULT_PROBE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            text_proxy_base: DEFAULT_TEXT_PROXY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub fred_api_key: Option<String>,
    pub coinglass_api_key: Option<String>,
}

impl Config {
    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load a config file. No environment overrides are applied.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the file when given (defaults otherwise), then apply the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// API keys from the environment replace configured ones. Proxy variables
    /// are appended after configured proxies; duplicates are dropped keeping
    /// the first occurrence.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("FRED_API_KEY") {
            self.credentials.fred_api_key = Some(key);
        }
        if let Some(key) = non_empty("COINGLASS_API_KEY") {
            self.credentials.coinglass_api_key = Some(key);
        }

        let from_env = PROXY_ENV_VARS.iter().filter_map(|name| non_empty(name));
        let mut proxies: Vec<String> = Vec::new();
        for proxy in self.network.proxies.drain(..).chain(from_env) {
            let proxy = proxy.trim().to_string();
            if !proxy.is_empty() && !proxies.contains(&proxy) {
                proxies.push(proxy);
            }
        }
        self.network.proxies = proxies;
    }

    pub fn to_egress(&self) -> EgressConfig {
        EgressConfig {
            timeout: Duration::from_secs(self.network.timeout_secs.max(1)),
            proxies: self.network.proxies.clone(),
            user_agent: self.network.user_agent.clone(),
            probe_url: self.network.probe_url.clone(),
            doh: self.network.doh,
        }
    }

    pub fn adapter_settings(&self) -> AdapterSettings {
        AdapterSettings {
            fred_api_key: self.credentials.fred_api_key.clone(),
            coinglass_api_key: self.credentials.coinglass_api_key.clone(),
            text_proxy_base: self.network.text_proxy_base.clone(),
        }
    }
}
