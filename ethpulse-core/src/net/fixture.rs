//! Canned-response fetcher for offline runs and tests.

use super::{FetchError, Fetcher, HttpRequest};
use crate::snapshot::ProxyProbe;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone)]
enum Canned {
    Body(String),
    Status(u16),
}

/// Serves bodies by URL prefix. The longest matching prefix wins; requests
/// with no match fail with [`FetchError::Unavailable`].
#[derive(Debug, Default)]
pub struct StaticFetcher {
    responses: Vec<(String, Canned)>,
    requested: Mutex<Vec<String>>,
    label: Option<String>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fetcher with no responses at all: every request fails. Used when the
    /// network is disabled.
    pub fn offline() -> Self {
        Self {
            label: Some("offline".to_string()),
            ..Self::default()
        }
    }

    pub fn with(mut self, url_prefix: impl Into<String>, body: impl Into<String>) -> Self {
        self.responses
            .push((url_prefix.into(), Canned::Body(body.into())));
        self
    }

    pub fn with_status(mut self, url_prefix: impl Into<String>, status: u16) -> Self {
        self.responses.push((url_prefix.into(), Canned::Status(status)));
        self
    }

    /// URLs requested so far, in order.
    pub fn requested(&self) -> Vec<String> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lookup(&self, url: &str) -> Option<&Canned> {
        self.responses
            .iter()
            .filter(|(prefix, _)| url.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, canned)| canned)
    }
}

impl Fetcher for StaticFetcher {
    fn get(&self, request: &HttpRequest) -> Result<String, FetchError> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.url.clone());

        match self.lookup(&request.url) {
            Some(Canned::Body(body)) if !body.trim().is_empty() => Ok(body.clone()),
            Some(Canned::Body(_)) => Err(FetchError::EmptyBody {
                url: request.url.clone(),
            }),
            Some(Canned::Status(status)) => Err(FetchError::Status {
                url: request.url.clone(),
                status: *status,
            }),
            None => Err(FetchError::Unavailable {
                url: request.url.clone(),
            }),
        }
    }

    fn probe(&self) -> Vec<ProxyProbe> {
        match &self.label {
            Some(label) => vec![ProxyProbe {
                proxy: label.clone(),
                ok: false,
                status: None,
                error: Some("network disabled".to_string()),
            }],
            None => vec![ProxyProbe {
                proxy: "static".to_string(),
                ok: true,
                status: Some(200),
                error: None,
            }],
        }
    }
}
