//! Reachability probes for the DNS failover engine.
//!
//! Three probe kinds are supported:
//! - ICMP echo (system `ping`) against a hostname or IP
//! - TCP connect against `host:port`
//! - HTTP GET against a full URL, 2xx/3xx counting as reachable
//!
//! Every probe is bounded by the timeout passed to [`ProbeChecker::check`]
//! and reports its outcome as a [`ProbeResult`] rather than an error.
//!
//! # Example
//!
//! ```no_run
//! use probe::{ProbeKind, ProbeSet};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let probes = ProbeSet::standard()?;
//! let result = probes
//!     .check(ProbeKind::Tcp, "192.168.1.100:443", Duration::from_secs(5))
//!     .await;
//! println!("{} {}", result.target, result.status);
//! # Ok(())
//! # }
//! ```

pub mod checkers;
pub mod types;

pub use checkers::{HttpChecker, PingChecker, ProbeChecker, ProbeError, TcpChecker};
pub use types::{ProbeKind, ProbeResult, ProbeStatus, UnknownProbeKind};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Registry of checkers, one per [`ProbeKind`]
#[derive(Clone, Default)]
pub struct ProbeSet {
    checkers: HashMap<ProbeKind, Arc<dyn ProbeChecker>>,
}

impl ProbeSet {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the ping, TCP and HTTP checkers
    pub fn standard() -> Result<Self, ProbeError> {
        let mut set = Self::new();
        set.insert(Arc::new(PingChecker::new()));
        set.insert(Arc::new(TcpChecker::new()));
        set.insert(Arc::new(HttpChecker::new()?));
        Ok(set)
    }

    /// Register a checker under its own kind, replacing any previous one
    pub fn insert(&mut self, checker: Arc<dyn ProbeChecker>) {
        self.checkers.insert(checker.kind(), checker);
    }

    pub fn get(&self, kind: ProbeKind) -> Option<Arc<dyn ProbeChecker>> {
        self.checkers.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<ProbeKind> {
        let mut kinds: Vec<_> = self.checkers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Probe `target` with the checker registered for `kind`
    pub async fn check(&self, kind: ProbeKind, target: &str, timeout: Duration) -> ProbeResult {
        match self.checkers.get(&kind) {
            Some(checker) => checker.check(target, timeout).await,
            None => ProbeResult::error(
                kind,
                target,
                Duration::ZERO,
                format!("no {} checker registered", kind),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_status_display() {
        assert_eq!(ProbeStatus::Healthy.to_string(), "HEALTHY");
        assert_eq!(ProbeStatus::Unhealthy.to_string(), "UNHEALTHY");
        assert_eq!(ProbeStatus::Timeout.to_string(), "TIMEOUT");
        assert_eq!(ProbeStatus::Error.to_string(), "ERROR");
    }

    #[test]
    fn test_probe_kind_parse() {
        assert_eq!("PING".parse::<ProbeKind>(), Ok(ProbeKind::Ping));
        assert_eq!("icmp".parse::<ProbeKind>(), Ok(ProbeKind::Ping));
        assert_eq!("tcp".parse::<ProbeKind>(), Ok(ProbeKind::Tcp));
        assert_eq!("https".parse::<ProbeKind>(), Ok(ProbeKind::Http));
        assert!("dns".parse::<ProbeKind>().is_err());
        assert_eq!(ProbeKind::Http.as_str(), "http");
        assert_eq!(ProbeKind::Http.to_string(), "HTTP");
    }

    #[test]
    fn test_probe_result() {
        let result = ProbeResult::healthy(ProbeKind::Ping, "1.1.1.1", Duration::from_millis(12));
        assert!(result.is_healthy());
        assert_eq!(result.latency, Some(Duration::from_millis(12)));
        assert_eq!(result.error_text(), "unknown");

        let result =
            ProbeResult::unhealthy(ProbeKind::Tcp, "a:1", Duration::from_millis(5), "refused");
        assert!(!result.is_healthy());
        assert_eq!(result.latency, None);
        assert_eq!(result.error_text(), "refused");

        let result = ProbeResult::timeout(ProbeKind::Http, "http://a", Duration::from_secs(5));
        assert_eq!(result.status, ProbeStatus::Timeout);
        assert!(result.error_text().contains("timed out"));
    }

    #[test]
    fn test_standard_set_covers_all_kinds() {
        let set = ProbeSet::standard().unwrap();
        assert_eq!(set.kinds(), ProbeKind::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_missing_checker_reports_error() {
        let mut set = ProbeSet::new();
        set.insert(Arc::new(TcpChecker::new()));

        let result = set
            .check(ProbeKind::Http, "http://localhost", Duration::from_secs(1))
            .await;

        assert_eq!(result.status, ProbeStatus::Error);
        assert!(result.error_text().contains("no HTTP checker"));
    }
}
