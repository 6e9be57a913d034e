//! Remote monitoring configuration.
//!
//! A remote document replaces the per-kind monitoring settings at runtime:
//!
//! ```json
//! {
//!   "ping": {"frequency": 30, "failcount": 3, "timeout": 5, "retry": 3,
//!            "remote_update_freq": 60,
//!            "domains": ["www.example.com"],
//!            "failover": [{"address": "192.0.2.10", "weight": 100}]},
//!   "tcp":  {"frequency": 30, "failcount": 3, "domains": ["db.example.com:5432"]},
//!   "http": {"frequency": 60, "failcount": 2, "domains": []}
//! }
//! ```

use crate::config::{
    FailoverCandidate, MIN_FREQUENCY_SECS, MonitorConfig, ProbeSettings, TIMEOUT_RANGE_SECS,
};
use crate::error::RemoteConfigError;
use async_trait::async_trait;
use probe::checkers::split_host_port;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Timeout for HTTP fetches
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for one probe kind, seconds and counts as plain integers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteProbeConfig {
    pub frequency: u64,
    pub failcount: u32,
    pub timeout: u64,
    pub retry: u32,
    pub domains: Vec<String>,
    pub failover: Vec<FailoverCandidate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemotePingConfig {
    #[serde(flatten)]
    pub probe: RemoteProbeConfig,
    /// Seconds between remote refreshes
    pub remote_update_freq: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub ping: RemotePingConfig,
    pub tcp: RemoteProbeConfig,
    pub http: RemoteProbeConfig,
}

fn check_probe(name: &str, probe: &RemoteProbeConfig) -> Result<(), RemoteConfigError> {
    if probe.frequency < MIN_FREQUENCY_SECS {
        return Err(RemoteConfigError::Invalid(format!(
            "{}.frequency must be at least {} seconds (got {})",
            name, MIN_FREQUENCY_SECS, probe.frequency
        )));
    }
    // zero picks the default
    if probe.timeout != 0 && !TIMEOUT_RANGE_SECS.contains(&probe.timeout) {
        return Err(RemoteConfigError::Invalid(format!(
            "{}.timeout must be {} to {} seconds (got {})",
            name,
            TIMEOUT_RANGE_SECS.start(),
            TIMEOUT_RANGE_SECS.end(),
            probe.timeout
        )));
    }
    if probe.failcount < 1 {
        return Err(RemoteConfigError::Invalid(format!(
            "{}.failcount must be at least 1",
            name
        )));
    }
    Ok(())
}

fn probe_defaults(probe: &mut RemoteProbeConfig) {
    if probe.timeout == 0 {
        probe.timeout = 5;
    }
    if probe.retry == 0 {
        probe.retry = 3;
    }
}

fn apply_probe(dst: &mut ProbeSettings, src: &RemoteProbeConfig) {
    dst.enabled = !src.domains.is_empty();
    dst.targets = src.domains.clone();
    dst.failover = src.failover.clone();
    if dst.enabled {
        dst.frequency = Duration::from_secs(src.frequency);
        dst.failure_threshold = src.failcount;
        dst.timeout = Duration::from_secs(src.timeout);
    }
}

impl RemoteConfig {
    /// Parse, validate and fill defaults
    pub fn from_json(body: &[u8]) -> Result<Self, RemoteConfigError> {
        let mut config: RemoteConfig = serde_json::from_slice(body)?;
        config.validate()?;
        config.set_defaults();
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RemoteConfigError> {
        check_probe("ping", &self.ping.probe)?;
        if self.ping.probe.domains.is_empty() {
            return Err(RemoteConfigError::Invalid("ping.domains must not be empty".into()));
        }
        if self.ping.probe.failover.is_empty() {
            return Err(RemoteConfigError::Invalid("ping.failover must not be empty".into()));
        }
        if !self.tcp.domains.is_empty() {
            check_probe("tcp", &self.tcp)?;
        }
        if let Some(bad) = self.tcp.domains.iter().find(|d| split_host_port(d).is_none()) {
            return Err(RemoteConfigError::Invalid(format!(
                "tcp.domains entry {:?} is not host:port",
                bad
            )));
        }
        if !self.http.domains.is_empty() {
            check_probe("http", &self.http)?;
        }
        if let Some(bad) = self
            .http
            .domains
            .iter()
            .find(|d| !d.starts_with("http://") && !d.starts_with("https://"))
        {
            return Err(RemoteConfigError::Invalid(format!(
                "http.domains entry {:?} has no http(s) scheme",
                bad
            )));
        }
        Ok(())
    }

    pub fn set_defaults(&mut self) {
        probe_defaults(&mut self.ping.probe);
        if self.ping.remote_update_freq == 0 {
            self.ping.remote_update_freq = 60;
        }
        probe_defaults(&mut self.tcp);
        probe_defaults(&mut self.http);
    }

    /// Refresh interval requested by the document
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.ping.remote_update_freq.max(10))
    }

    /// Copy targets, thresholds and timing onto `monitor`. Kinds listing no
    /// domains are disabled. The ping retry count becomes the DNS retry count.
    pub fn apply_to(&self, monitor: &mut MonitorConfig) {
        apply_probe(&mut monitor.ping, &self.ping.probe);
        apply_probe(&mut monitor.tcp, &self.tcp);
        apply_probe(&mut monitor.http, &self.http);
        monitor.dns_retry = self.ping.probe.retry.max(1);
    }
}

/// Remote configuration source
#[async_trait]
pub trait RemoteConfigFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<RemoteConfig, RemoteConfigError>;
}

/// Fetches `http://`, `https://` and `file://` documents
pub struct HttpRemoteFetcher {
    client: reqwest::Client,
}

impl HttpRemoteFetcher {
    pub fn new() -> Result<Self, RemoteConfigError> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self { client })
    }

    async fn fetch_http(&self, url: &str) -> Result<Vec<u8>, RemoteConfigError> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(RemoteConfigError::Status(status));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl RemoteConfigFetcher for HttpRemoteFetcher {
    async fn fetch(&self, url: &str) -> Result<RemoteConfig, RemoteConfigError> {
        let body = if url.starts_with("http://") || url.starts_with("https://") {
            self.fetch_http(url).await?
        } else if let Some(path) = url.strip_prefix("file://") {
            tokio::fs::read(Path::new(path)).await?
        } else {
            let scheme = url.split_once("://").map(|(s, _)| s).unwrap_or(url);
            return Err(RemoteConfigError::UnsupportedScheme(scheme.to_string()));
        };

        debug!(url = %url, bytes = body.len(), "Fetched remote config");
        let config = RemoteConfig::from_json(&body)?;
        info!(
            url = %url,
            ping_targets = config.ping.probe.domains.len(),
            tcp_targets = config.tcp.domains.len(),
            http_targets = config.http.domains.len(),
            "Remote config loaded"
        );
        Ok(config)
    }
}
