//! Live HTTP egress over an ordered list of paths.
//!
//! Each request walks the paths in order (direct first, then configured
//! proxies) and returns the first non-empty 2xx body. There are no retries
//! beyond that walk. Each path carries its own per-host circuit breaker,
//! fed by transport failures only: an HTTP error status means the path
//! works and the upstream refused.

use super::circuit_breaker::CircuitBreaker;
use super::dns::DnsCache;
use super::{FetchError, Fetcher, HttpRequest};
use crate::snapshot::ProxyProbe;
use reqwest::blocking::Client;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

pub const DIRECT: &str = "direct";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(6);
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; ethpulse/0.1)";
pub const DEFAULT_PROBE_URL: &str = "https://api.coingecko.com/api/v3/ping";

/// Egress settings for one run.
#[derive(Debug, Clone)]
pub struct EgressConfig {
    pub timeout: Duration,
    /// Proxy URLs tried after the direct path, in order.
    pub proxies: Vec<String>,
    pub user_agent: String,
    pub probe_url: String,
    /// Resolve hosts over DNS-over-HTTPS for the direct path.
    pub doh: bool,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            proxies: Vec::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            probe_url: DEFAULT_PROBE_URL.to_string(),
            doh: false,
        }
    }
}

struct Route {
    label: String,
    client: Client,
    breaker: CircuitBreaker,
    direct: bool,
}

/// [`Fetcher`] backed by blocking reqwest clients.
pub struct HttpFetcher {
    routes: Vec<Route>,
    config: EgressConfig,
    dns: Option<DnsCache>,
    pinned: Mutex<HashMap<String, Client>>,
}

impl HttpFetcher {
    pub fn new(config: EgressConfig) -> Result<Self, FetchError> {
        let mut routes = vec![Route {
            label: DIRECT.to_string(),
            client: base_builder(&config).no_proxy().build().map_err(client_error)?,
            breaker: CircuitBreaker::default(),
            direct: true,
        }];

        for proxy_url in &config.proxies {
            let proxy = match reqwest::Proxy::all(proxy_url) {
                Ok(proxy) => proxy,
                Err(e) => {
                    warn!(proxy = %proxy_url, error = %e, "skipping unusable proxy");
                    continue;
                }
            };
            routes.push(Route {
                label: proxy_url.clone(),
                client: base_builder(&config).proxy(proxy).build().map_err(client_error)?,
                breaker: CircuitBreaker::default(),
                direct: false,
            });
        }

        let dns = config.doh.then(|| DnsCache::new(config.timeout));
        Ok(Self {
            routes,
            config,
            dns,
            pinned: Mutex::new(HashMap::new()),
        })
    }

    pub fn route_labels(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.label.as_str()).collect()
    }

    /// Client for a route, pinned to a DoH-resolved address on the direct path.
    fn client_for(&self, route: &Route, url: &str) -> Client {
        let (Some(dns), true) = (&self.dns, route.direct) else {
            return route.client.clone();
        };
        let Ok(parsed) = reqwest::Url::parse(url) else {
            return route.client.clone();
        };
        let (Some(host), Some(port)) = (parsed.host_str(), parsed.port_or_known_default()) else {
            return route.client.clone();
        };

        let mut pinned = self.pinned.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = pinned.get(host) {
            return client.clone();
        }
        let Some(ip) = dns.resolve(host) else {
            return route.client.clone();
        };
        match base_builder(&self.config)
            .no_proxy()
            .resolve(host, SocketAddr::new(ip, port))
            .build()
        {
            Ok(client) => {
                pinned.insert(host.to_string(), client.clone());
                client
            }
            Err(_) => route.client.clone(),
        }
    }

    fn send(client: &Client, request: &HttpRequest) -> Result<String, FetchError> {
        let mut builder = client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let resp = builder.send().map_err(|e| FetchError::Network {
            url: request.url.clone(),
            message: e.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = resp.text().map_err(|e| FetchError::Network {
            url: request.url.clone(),
            message: e.to_string(),
        })?;
        if body.trim().is_empty() {
            return Err(FetchError::EmptyBody {
                url: request.url.clone(),
            });
        }
        Ok(body)
    }
}

fn base_builder(config: &EgressConfig) -> reqwest::blocking::ClientBuilder {
    Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.timeout)
        .user_agent(config.user_agent.clone())
}

fn client_error(e: reqwest::Error) -> FetchError {
    FetchError::Client(e.to_string())
}

/// Breaker key for a URL: `host:port`, or the raw URL when it does not parse.
fn host_key(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return url.to_string();
    };
    match (parsed.host_str(), parsed.port_or_known_default()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => url.to_string(),
    }
}

impl Fetcher for HttpFetcher {
    fn get(&self, request: &HttpRequest) -> Result<String, FetchError> {
        let host = host_key(&request.url);
        let mut attempts = Vec::new();
        for route in &self.routes {
            if !route.breaker.is_allowed(&host) {
                attempts.push(format!("{}: circuit open", route.label));
                continue;
            }
            let client = self.client_for(route, &request.url);
            match Self::send(&client, request) {
                Ok(body) => {
                    route.breaker.record_success(&host);
                    debug!(url = %request.url, path = %route.label, bytes = body.len(), "fetched");
                    return Ok(body);
                }
                Err(e) => {
                    if matches!(e, FetchError::Network { .. })
                        && route.breaker.record_failure(&host)
                    {
                        warn!(host = %host, path = %route.label, "circuit open for rest of run");
                    }
                    debug!(
                        url = %request.url,
                        path = %route.label,
                        error = %e,
                        "egress path failed"
                    );
                    attempts.push(format!("{}: {e}", route.label));
                }
            }
        }
        Err(FetchError::Exhausted {
            url: request.url.clone(),
            attempts,
        })
    }

    fn probe(&self) -> Vec<ProxyProbe> {
        let request = HttpRequest::get(self.config.probe_url.clone());
        self.routes
            .iter()
            .map(|route| match Self::send(&route.client, &request) {
                Ok(_) => ProxyProbe {
                    proxy: route.label.clone(),
                    ok: true,
                    status: Some(200),
                    error: None,
                },
                Err(FetchError::Status { status, .. }) => ProxyProbe {
                    proxy: route.label.clone(),
                    ok: false,
                    status: Some(status),
                    error: Some(format!("HTTP {status}")),
                },
                Err(e) => ProxyProbe {
                    proxy: route.label.clone(),
                    ok: false,
                    status: None,
                    error: Some(e.to_string()),
                },
            })
            .collect()
    }
}
