//! DNS-over-HTTPS resolution cache.
//!
//! Some networks poison or drop DNS for exchange and data hosts. When enabled,
//! hostnames are resolved through public DoH resolvers (reached by pinned IP,
//! so resolving the resolver never touches local DNS) and the answer is pinned
//! on the direct egress client. One cache lives for one run.

use serde::Deserialize;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Public DoH resolvers, tried in order.
pub const DOH_RESOLVERS: [(&str, Ipv4Addr); 2] = [
    ("dns.google", Ipv4Addr::new(8, 8, 8, 8)),
    ("cloudflare-dns.com", Ipv4Addr::new(1, 1, 1, 1)),
];

const DNS_RECORD_TYPE_A: u16 = 1;

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    #[serde(default)]
    data: String,
}

/// Extract the first A record from a DoH JSON answer.
pub fn parse_doh_answer(body: &str) -> Option<Ipv4Addr> {
    let response: DohResponse = serde_json::from_str(body).ok()?;
    response
        .answer
        .iter()
        .filter(|a| a.record_type == DNS_RECORD_TYPE_A)
        .find_map(|a| a.data.parse().ok())
}

/// Per-run host -> address cache. Failed lookups are cached too, so a host is
/// resolved at most once per run.
#[derive(Debug)]
pub struct DnsCache {
    entries: Mutex<HashMap<String, Option<IpAddr>>>,
    timeout: Duration,
}

impl DnsCache {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Seed an entry without a network lookup.
    pub fn insert(&self, host: &str, addr: Option<IpAddr>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host.to_string(), addr);
    }

    pub fn cached(&self, host: &str) -> Option<Option<IpAddr>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .copied()
    }

    /// Resolve `host`, consulting the cache first.
    pub fn resolve(&self, host: &str) -> Option<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Some(ip);
        }
        if let Some(hit) = self.cached(host) {
            return hit;
        }
        let addr = self.lookup(host).map(IpAddr::V4);
        debug!(host, ?addr, "DoH lookup");
        self.insert(host, addr);
        addr
    }

    fn lookup(&self, host: &str) -> Option<Ipv4Addr> {
        for (resolver_host, resolver_ip) in DOH_RESOLVERS {
            let client = match reqwest::blocking::Client::builder()
                .timeout(self.timeout)
                .no_proxy()
                .resolve(resolver_host, SocketAddr::new(IpAddr::V4(resolver_ip), 443))
                .build()
            {
                Ok(client) => client,
                Err(_) => continue,
            };
            let url = format!("https://{resolver_host}/resolve?name={host}&type=A");
            let body = match client
                .get(&url)
                .header("accept", "application/dns-json")
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.text())
            {
                Ok(body) => body,
                Err(_) => continue,
            };
            if let Some(ip) = parse_doh_answer(&body) {
                return Some(ip);
            }
        }
        None
    }
}
