//! Snapshot builds over the real HTTP egress against a local upstream.

use chrono::Utc;
use ethpulse_core::field::{FieldValue, REQUIRED_FIELDS};
use ethpulse_core::net::{fetch_json, EgressConfig, HttpFetcher, HttpRequest};
use ethpulse_core::sources::{FetchContext, SourceAdapter, SourceError, SourceOutput};
use ethpulse_runner::SnapshotBuilder;
use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

/// Serves fixed responses by exact path, one request per connection.
fn upstream(routes: Vec<(&'static str, u16, String)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let Ok(reader) = stream.try_clone() else { continue };
            let mut reader = BufReader::new(reader);
            let mut request_line = String::new();
            if reader.read_line(&mut request_line).is_err() {
                continue;
            }
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) if line == "\r\n" => break,
                    Ok(_) => {}
                }
            }
            let path = request_line.split_whitespace().nth(1).unwrap_or("/");
            let (status, body) = routes
                .iter()
                .find(|(p, _, _)| *p == path)
                .map(|(_, status, body)| (*status, body.as_str()))
                .unwrap_or((404, ""));
            let _ = write!(
                stream,
                "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
        }
    });
    format!("http://{addr}")
}

#[derive(Deserialize)]
struct Reading {
    value: f64,
}

/// Fetches `{"value": ..}` from one URL into one key.
struct Endpoint {
    name: &'static str,
    keys: &'static [&'static str],
    url: String,
}

impl SourceAdapter for Endpoint {
    fn name(&self) -> &str {
        self.name
    }

    fn declared_keys(&self) -> &[&'static str] {
        self.keys
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Result<SourceOutput, SourceError> {
        let reading: Reading = fetch_json(ctx.fetcher, &HttpRequest::get(self.url.clone()))?;
        let day = ctx.target.unwrap_or_else(|| ctx.now.date_naive());
        let mut out = SourceOutput::default();
        out.set_on(self.keys[0], reading.value, format!("{}: {}", self.name, self.url), day);
        Ok(out.finish(self.keys))
    }
}

fn endpoint(
    base: &str,
    name: &'static str,
    keys: &'static [&'static str],
    path: &str,
) -> Box<dyn SourceAdapter> {
    Box::new(Endpoint {
        name,
        keys,
        url: format!("{base}{path}"),
    })
}

#[test]
fn refused_endpoint_does_not_block_healthy_ones_on_the_same_host() {
    let base = upstream(vec![
        ("/ping", 200, "pong".to_string()),
        ("/etf", 429, "slow down".to_string()),
        ("/dxy", 200, r#"{"value":0.4}"#.to_string()),
        ("/rates", 200, r#"{"value":4.1}"#.to_string()),
        ("/ism", 200, r#"{"value":50.2}"#.to_string()),
    ]);
    let fetcher = HttpFetcher::new(EgressConfig {
        timeout: Duration::from_secs(2),
        probe_url: format!("{base}/ping"),
        ..EgressConfig::default()
    })
    .unwrap();

    // The refused endpoint runs several times before any healthy one.
    let builder = SnapshotBuilder::new(
        Box::new(fetcher),
        vec![
            endpoint(&base, "Limited(1d)", &["etf1d"], "/etf"),
            endpoint(&base, "Limited(5d)", &["etf5d"], "/etf"),
            endpoint(&base, "Limited(10d)", &["etf10d"], "/etf"),
            endpoint(&base, "Dollar", &["dxy5d"], "/dxy"),
            endpoint(&base, "Rates", &["current2y"], "/rates"),
            endpoint(&base, "Survey", &["ism"], "/ism"),
        ],
    );

    let snap = builder.build_at(None, Utc::now(), None);

    assert_eq!(snap.data["dxy5d"], FieldValue::Number(0.4));
    assert_eq!(snap.data["current2y"], FieldValue::Number(4.1));
    assert_eq!(snap.data["ism"], FieldValue::Number(50.2));
    for key in ["etf1d", "etf5d", "etf10d"] {
        assert!(snap.missing.contains(key), "{key}");
        assert!(!snap.data.contains_key(key), "{key}");
    }

    for name in ["Limited(1d): ", "Limited(5d): ", "Limited(10d): "] {
        let tagged: Vec<&String> = snap.errors.iter().filter(|e| e.starts_with(name)).collect();
        assert_eq!(tagged.len(), 1, "{name} {tagged:?}");
        assert!(tagged[0].contains("HTTP 429"), "{}", tagged[0]);
    }
    assert!(!snap.errors.iter().any(|e| e.contains("circuit open")), "{:?}", snap.errors);
    for name in ["Dollar: ", "Rates: ", "Survey: "] {
        assert!(!snap.errors.iter().any(|e| e.starts_with(name)), "{name}");
    }

    assert!(snap.provenance_violations().is_empty());
    for key in REQUIRED_FIELDS {
        assert_ne!(snap.data.contains_key(key), snap.missing.contains(key), "{key}");
    }
    assert_eq!(snap.proxy_trace.len(), 1);
    assert!(snap.proxy_trace[0].ok);
}
