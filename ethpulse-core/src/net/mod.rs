//! Network egress.
//!
//! Adapters never touch an HTTP client directly; they go through the
//! [`Fetcher`] trait so the same adapter runs against the live network
//! ([`HttpFetcher`]) or canned bodies ([`StaticFetcher`]).

pub mod circuit_breaker;
pub mod dns;
pub mod egress;
pub mod fixture;

pub use circuit_breaker::CircuitBreaker;
pub use dns::DnsCache;
pub use egress::{EgressConfig, HttpFetcher};
pub use fixture::StaticFetcher;

use crate::snapshot::ProxyProbe;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors from a single logical request (all egress paths included).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("empty body from {url}")]
    EmptyBody { url: String },

    #[error("all egress paths failed for {url}: {}", .attempts.join("; "))]
    Exhausted { url: String, attempts: Vec<String> },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("no response available for {url}")]
    Unavailable { url: String },

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// A GET request with optional extra headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Something that can turn a request into a non-empty response body.
pub trait Fetcher: Send + Sync {
    /// Fetch the body of a successful (2xx, non-empty) response.
    fn get(&self, request: &HttpRequest) -> Result<String, FetchError>;

    /// Probe every egress path once and report reachability.
    fn probe(&self) -> Vec<ProxyProbe>;

    fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.get(&HttpRequest::get(url))
    }
}

/// Fetch and decode a JSON body.
pub fn fetch_json<T: DeserializeOwned>(
    fetcher: &dyn Fetcher,
    request: &HttpRequest,
) -> Result<T, FetchError> {
    let body = fetcher.get(request)?;
    serde_json::from_str(&body).map_err(|e| FetchError::Decode {
        url: request.url.clone(),
        message: e.to_string(),
    })
}
