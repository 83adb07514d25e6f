//! Per-path, per-host circuit breaker.
//!
//! Only transport failures (connect errors, timeouts) count. After
//! [`DEFAULT_FAILURE_THRESHOLD`] consecutive transport failures to one host,
//! that host is skipped on this path for the rest of the run. Other hosts on
//! the same path are unaffected.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Consecutive transport failures before a host is skipped on a path.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

#[derive(Debug)]
pub struct CircuitBreaker {
    failures: Mutex<HashMap<String, u32>>,
    failure_threshold: u32,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            failure_threshold: failure_threshold.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, u32>> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// False once `host` has reached the failure threshold.
    pub fn is_allowed(&self, host: &str) -> bool {
        self.lock().get(host).copied().unwrap_or(0) < self.failure_threshold
    }

    pub fn record_success(&self, host: &str) {
        if let Some(count) = self.lock().get_mut(host) {
            // An open host is never retried, so this only resets a partial run.
            *count = 0;
        }
    }

    /// Returns true when this failure opened the host.
    pub fn record_failure(&self, host: &str) -> bool {
        let mut failures = self.lock();
        let count = failures.entry(host.to_string()).or_insert(0);
        *count += 1;
        *count == self.failure_threshold
    }

    /// Hosts currently skipped, sorted.
    #[cfg(test)]
    pub(crate) fn open_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, count)| **count >= self.failure_threshold)
            .map(|(host, _)| host.clone())
            .collect();
        hosts.sort();
        hosts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_opens_at_threshold_and_stays_open() {
        let cb = CircuitBreaker::default();
        for _ in 0..2 {
            cb.record_failure("api.llama.fi:443");
        }
        assert!(cb.is_allowed("api.llama.fi:443"));
        assert!(cb.record_failure("api.llama.fi:443"));
        assert!(!cb.record_failure("api.llama.fi:443"));
        assert!(!cb.is_allowed("api.llama.fi:443"));
        assert_eq!(cb.open_hosts(), vec!["api.llama.fi:443"]);
    }

    #[test]
    fn hosts_are_independent() {
        let cb = CircuitBreaker::new(1);
        cb.record_failure("farside.co.uk:443");
        assert!(!cb.is_allowed("farside.co.uk:443"));
        assert!(cb.is_allowed("api.bitfinex.com:443"));
    }

    #[test]
    fn success_resets_partial_count() {
        let cb = CircuitBreaker::default();
        cb.record_failure("api.alternative.me:443");
        cb.record_failure("api.alternative.me:443");
        cb.record_success("api.alternative.me:443");
        cb.record_failure("api.alternative.me:443");
        assert!(cb.is_allowed("api.alternative.me:443"));
        assert!(cb.open_hosts().is_empty());
    }
}
