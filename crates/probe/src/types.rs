//! Probe types and structures.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Probe kind, a capability tag for the protocol used to reach a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// ICMP echo against a hostname or IP
    Ping,
    /// TCP connect against `host:port`
    Tcp,
    /// HTTP GET against a full URL
    Http,
}

impl ProbeKind {
    pub const ALL: [ProbeKind; 3] = [ProbeKind::Ping, ProbeKind::Tcp, ProbeKind::Http];

    /// Lowercase name, used for metric labels and config keys
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Ping => "ping",
            ProbeKind::Tcp => "tcp",
            ProbeKind::Http => "http",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Ping => write!(f, "PING"),
            ProbeKind::Tcp => write!(f, "TCP"),
            ProbeKind::Http => write!(f, "HTTP"),
        }
    }
}

/// Error returned when parsing an unknown probe kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown probe kind: {0}")]
pub struct UnknownProbeKind(pub String);

impl FromStr for ProbeKind {
    type Err = UnknownProbeKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ping" | "icmp" => Ok(ProbeKind::Ping),
            "tcp" => Ok(ProbeKind::Tcp),
            "http" | "https" => Ok(ProbeKind::Http),
            _ => Err(UnknownProbeKind(s.to_string())),
        }
    }
}

/// Probe status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeStatus {
    /// Target answered
    Healthy,
    /// Target answered negatively or refused
    Unhealthy,
    /// Probe timed out
    Timeout,
    /// Probe could not be carried out
    Error,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Healthy => write!(f, "HEALTHY"),
            ProbeStatus::Unhealthy => write!(f, "UNHEALTHY"),
            ProbeStatus::Timeout => write!(f, "TIMEOUT"),
            ProbeStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Result of a single probe
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Kind of probe that produced this result
    pub kind: ProbeKind,

    /// Probed target
    pub target: String,

    /// Outcome
    pub status: ProbeStatus,

    /// Round-trip latency, only set on success
    pub latency: Option<Duration>,

    /// Wall time spent on the probe
    pub elapsed: Duration,

    /// Error description for failed probes
    pub message: Option<String>,

    /// Response code (HTTP probes)
    pub response_code: Option<u16>,
}

impl ProbeResult {
    fn new(kind: ProbeKind, target: &str, status: ProbeStatus, elapsed: Duration) -> Self {
        Self {
            kind,
            target: target.to_string(),
            status,
            latency: None,
            elapsed,
            message: None,
            response_code: None,
        }
    }

    /// Create a healthy result
    pub fn healthy(kind: ProbeKind, target: &str, latency: Duration) -> Self {
        let mut result = Self::new(kind, target, ProbeStatus::Healthy, latency);
        result.latency = Some(latency);
        result
    }

    /// Create an unhealthy result
    pub fn unhealthy(
        kind: ProbeKind,
        target: &str,
        elapsed: Duration,
        message: impl Into<String>,
    ) -> Self {
        let mut result = Self::new(kind, target, ProbeStatus::Unhealthy, elapsed);
        result.message = Some(message.into());
        result
    }

    /// Create a timeout result
    pub fn timeout(kind: ProbeKind, target: &str, elapsed: Duration) -> Self {
        let mut result = Self::new(kind, target, ProbeStatus::Timeout, elapsed);
        result.message = Some(format!("probe timed out after {:?}", elapsed));
        result
    }

    /// Create an error result
    pub fn error(
        kind: ProbeKind,
        target: &str,
        elapsed: Duration,
        message: impl Into<String>,
    ) -> Self {
        let mut result = Self::new(kind, target, ProbeStatus::Error, elapsed);
        result.message = Some(message.into());
        result
    }

    pub fn with_response_code(mut self, code: u16) -> Self {
        self.response_code = Some(code);
        self
    }

    /// Check if the probe succeeded
    pub fn is_healthy(&self) -> bool {
        self.status == ProbeStatus::Healthy
    }

    /// Error text for failed probes, `"unknown"` when none was recorded
    pub fn error_text(&self) -> &str {
        self.message.as_deref().unwrap_or("unknown")
    }
}
