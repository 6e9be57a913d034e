//! Test doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use failover_engine::alert::DeliveryRequest;
use failover_engine::{DeliveryError, DnsError, DnsProvider, NotificationTransport};
use parking_lot::Mutex;
use probe::{ProbeChecker, ProbeKind, ProbeResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Checker whose outcome per target is set by the test
pub struct ScriptedChecker {
    kind: ProbeKind,
    default_healthy: bool,
    outcomes: Mutex<HashMap<String, bool>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedChecker {
    pub fn healthy(kind: ProbeKind) -> Arc<Self> {
        Arc::new(Self::new(kind, true))
    }

    pub fn failing(kind: ProbeKind) -> Arc<Self> {
        Arc::new(Self::new(kind, false))
    }

    fn new(kind: ProbeKind, default_healthy: bool) -> Self {
        Self {
            kind,
            default_healthy,
            outcomes: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_healthy(&self, target: &str, healthy: bool) {
        self.outcomes.lock().insert(target.to_string(), healthy);
    }

    pub fn calls(&self, target: &str) -> usize {
        self.calls.lock().get(target).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl ProbeChecker for ScriptedChecker {
    async fn check(&self, target: &str, _timeout: Duration) -> ProbeResult {
        *self.calls.lock().entry(target.to_string()).or_default() += 1;
        let healthy = self
            .outcomes
            .lock()
            .get(target)
            .copied()
            .unwrap_or(self.default_healthy);

        if healthy {
            ProbeResult::healthy(self.kind, target, Duration::from_millis(5))
        } else {
            ProbeResult::unhealthy(self.kind, target, Duration::from_millis(5), "connection refused")
        }
    }

    fn kind(&self) -> ProbeKind {
        self.kind
    }
}

/// Failing checker that holds the check of one target until released
pub struct GatedChecker {
    kind: ProbeKind,
    gated: String,
    entered: Notify,
    release: Notify,
}

impl GatedChecker {
    pub fn new(kind: ProbeKind, gated: &str) -> Arc<Self> {
        Arc::new(Self {
            kind,
            gated: gated.to_string(),
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    /// Wait until the gated target's check has started
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl ProbeChecker for GatedChecker {
    async fn check(&self, target: &str, _timeout: Duration) -> ProbeResult {
        if target == self.gated {
            self.entered.notify_one();
            self.release.notified().await;
        }
        ProbeResult::unhealthy(self.kind, target, Duration::from_millis(5), "connection refused")
    }

    fn kind(&self) -> ProbeKind {
        self.kind
    }
}

/// Transport that records every request and answers with a fixed status
pub struct RecordingTransport {
    status: u16,
    requests: Mutex<Vec<DeliveryRequest>>,
}

impl RecordingTransport {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            status: 200,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            status,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<DeliveryRequest> {
        self.requests.lock().clone()
    }

    /// Bodies of every request, decoded as JSON
    pub fn bodies(&self) -> Vec<serde_json::Value> {
        self.requests
            .lock()
            .iter()
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn deliver(&self, request: DeliveryRequest) -> Result<u16, DeliveryError> {
        self.requests.lock().push(request);
        if (200..300).contains(&self.status) {
            Ok(self.status)
        } else {
            Err(DeliveryError::Status(self.status))
        }
    }
}

/// In-memory DNS zone
#[derive(Default)]
pub struct FakeDns {
    records: Mutex<HashMap<String, String>>,
    updates: Mutex<Vec<(String, String)>>,
}

impl FakeDns {
    pub fn with_record(domain: &str, address: &str) -> Arc<Self> {
        let dns = Self::default();
        dns.records.lock().insert(domain.to_string(), address.to_string());
        Arc::new(dns)
    }

    pub fn record(&self, domain: &str) -> Option<String> {
        self.records.lock().get(domain).cloned()
    }

    pub fn updates(&self) -> Vec<(String, String)> {
        self.updates.lock().clone()
    }
}

#[async_trait]
impl DnsProvider for FakeDns {
    async fn get_current_target(&self, domain: &str) -> Result<String, DnsError> {
        self.record(domain)
            .ok_or_else(|| DnsError::RecordNotFound(domain.to_string()))
    }

    async fn update_record(&self, domain: &str, address: &str) -> Result<(), DnsError> {
        self.records.lock().insert(domain.to_string(), address.to_string());
        self.updates.lock().push((domain.to_string(), address.to_string()));
        Ok(())
    }
}
