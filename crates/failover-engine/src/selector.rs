//! Failover candidate selection.

use crate::config::FailoverCandidate;
use crate::error::SelectError;
use probe::ProbeChecker;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeout used for each candidate probe, independent of the monitor timeout
pub const CANDIDATE_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Candidates ordered by descending weight. Equal weights keep their order.
pub fn rank(candidates: &[FailoverCandidate]) -> Vec<&FailoverCandidate> {
    let mut ranked: Vec<_> = candidates.iter().collect();
    ranked.sort_by(|a, b| b.weight.cmp(&a.weight));
    ranked
}

/// Picks the first reachable failover candidate
pub struct FailoverSelector {
    checker: Arc<dyn ProbeChecker>,
    timeout: Duration,
}

impl FailoverSelector {
    pub fn new(checker: Arc<dyn ProbeChecker>) -> Self {
        Self {
            checker,
            timeout: CANDIDATE_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Highest-weight candidate that answers a probe
    pub async fn select_best(&self, candidates: &[FailoverCandidate]) -> Result<String, SelectError> {
        self.select(candidates, None).await
    }

    /// Like [`select_best`](Self::select_best), never returning `exclude`
    pub async fn select_excluding(
        &self,
        candidates: &[FailoverCandidate],
        exclude: &str,
    ) -> Result<String, SelectError> {
        self.select(candidates, Some(exclude)).await
    }

    async fn select(
        &self,
        candidates: &[FailoverCandidate],
        exclude: Option<&str>,
    ) -> Result<String, SelectError> {
        let ranked: Vec<_> = rank(candidates)
            .into_iter()
            .filter(|c| Some(c.address.as_str()) != exclude)
            .collect();

        if ranked.is_empty() {
            return Err(SelectError::NoCandidates);
        }

        let mut attempted = Vec::with_capacity(ranked.len());
        for candidate in ranked {
            debug!(address = %candidate.address, weight = candidate.weight, "Probing failover candidate");
            let result = self.checker.check(&candidate.address, self.timeout).await;
            if result.is_healthy() {
                info!(address = %candidate.address, weight = candidate.weight, "Selected failover candidate");
                return Ok(candidate.address.clone());
            }
            warn!(address = %candidate.address, error = %result.error_text(), "Failover candidate unreachable");
            attempted.push(candidate.address.clone());
        }

        Err(SelectError::Exhausted { attempted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use probe::{ProbeKind, ProbeResult};
    use std::collections::HashSet;

    /// Healthy only for the listed addresses, recording probe order
    struct RecordingChecker {
        healthy: HashSet<String>,
        probed: Mutex<Vec<String>>,
    }

    impl RecordingChecker {
        fn new(healthy: &[&str]) -> Self {
            Self {
                healthy: healthy.iter().map(|s| s.to_string()).collect(),
                probed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ProbeChecker for RecordingChecker {
        async fn check(&self, target: &str, timeout: Duration) -> ProbeResult {
            assert_eq!(timeout, CANDIDATE_PROBE_TIMEOUT);
            self.probed.lock().push(target.to_string());
            if self.healthy.contains(target) {
                ProbeResult::healthy(ProbeKind::Ping, target, Duration::from_millis(1))
            } else {
                ProbeResult::unhealthy(ProbeKind::Ping, target, Duration::ZERO, "no reply")
            }
        }

        fn kind(&self) -> ProbeKind {
            ProbeKind::Ping
        }
    }

    fn candidates() -> Vec<FailoverCandidate> {
        vec![
            FailoverCandidate::new("A", 50),
            FailoverCandidate::new("B", 100),
            FailoverCandidate::new("C", 100),
        ]
    }

    #[test]
    fn test_rank_is_stable_descending() {
        let list = candidates();
        let ranked: Vec<_> = rank(&list).iter().map(|c| c.address.as_str()).collect();
        assert_eq!(ranked, vec!["B", "C", "A"]);
    }

    #[tokio::test]
    async fn test_heavier_candidates_probed_first() {
        let checker = Arc::new(RecordingChecker::new(&["C", "A"]));
        let selector = FailoverSelector::new(checker.clone());

        let selected = selector.select_best(&candidates()).await.unwrap();

        assert_eq!(selected, "C");
        assert_eq!(*checker.probed.lock(), vec!["B", "C"]);
    }

    #[tokio::test]
    async fn test_exhaustion_names_all_candidates() {
        let checker = Arc::new(RecordingChecker::new(&[]));
        let selector = FailoverSelector::new(checker.clone());

        let err = selector.select_best(&candidates()).await.unwrap_err();

        assert_eq!(
            err,
            SelectError::Exhausted {
                attempted: vec!["B".into(), "C".into(), "A".into()]
            }
        );
        assert_eq!(checker.probed.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_select_excluding_skips_current() {
        let checker = Arc::new(RecordingChecker::new(&["B", "C", "A"]));
        let selector = FailoverSelector::new(checker.clone());

        let selected = selector.select_excluding(&candidates(), "B").await.unwrap();

        assert_eq!(selected, "C");
        assert_eq!(*checker.probed.lock(), vec!["C"]);
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let checker = Arc::new(RecordingChecker::new(&["A"]));
        let selector = FailoverSelector::new(checker);

        assert_eq!(selector.select_best(&[]).await, Err(SelectError::NoCandidates));

        let only = vec![FailoverCandidate::new("A", 1)];
        assert_eq!(
            selector.select_excluding(&only, "A").await,
            Err(SelectError::NoCandidates)
        );
    }
}
