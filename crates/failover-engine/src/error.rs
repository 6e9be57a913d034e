//! Error types for the failover engine.

use thiserror::Error;

/// Probe scheduler lifecycle errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("scheduler is not running")]
    NotRunning,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Failover candidate selection errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("no failover candidates configured")]
    NoCandidates,

    #[error("no reachable failover candidate ({} attempted: {})", .attempted.len(), .attempted.join(", "))]
    Exhausted { attempted: Vec<String> },
}

/// DNS provider errors
#[derive(Debug, Error)]
pub enum DnsError {
    #[error("DNS API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("DNS API error: {0}")]
    Api(String),

    #[error("zone not found for {0}")]
    ZoneNotFound(String),

    #[error("DNS record not found: {0}")]
    RecordNotFound(String),

    #[error("DNS API token is not active (status: {0})")]
    InactiveToken(String),

    #[error("DNS request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// DNS switch errors
#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("failed to read current record for {domain}: {source}")]
    Lookup {
        domain: String,
        #[source]
        source: DnsError,
    },

    #[error("{domain} already points to {address}")]
    AlreadyCurrent { domain: String, address: String },

    #[error("failed to update {domain} after {attempts} attempts: {source}")]
    UpdateFailed {
        domain: String,
        attempts: u32,
        #[source]
        source: DnsError,
    },

    #[error(transparent)]
    Select(#[from] SelectError),
}

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response status: {0}")]
    Status(u16),

    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Remote configuration errors
#[derive(Debug, Error)]
pub enum RemoteConfigError {
    #[error("failed to fetch remote config: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("remote config request returned status {0}")]
    Status(u16),

    #[error("failed to read remote config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse remote config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid remote config: {0}")]
    Invalid(String),

    #[error("unsupported remote config scheme: {0}")]
    UnsupportedScheme(String),
}

/// Scheduled task errors
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("invalid cron expression {expression:?}: {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("task not found: {0}")]
    NotFound(String),

    #[error("invalid task: {0}")]
    Invalid(String),

    #[error("task store error: {0}")]
    Store(#[from] common::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_names_every_candidate() {
        let err = SelectError::Exhausted {
            attempted: vec!["b".into(), "c".into(), "a".into()],
        };
        assert_eq!(
            err.to_string(),
            "no reachable failover candidate (3 attempted: b, c, a)"
        );
    }

    #[test]
    fn test_switch_error_display() {
        let err = SwitchError::AlreadyCurrent {
            domain: "www.example.com".into(),
            address: "10.0.0.1".into(),
        };
        assert_eq!(err.to_string(), "www.example.com already points to 10.0.0.1");

        let err = SwitchError::UpdateFailed {
            domain: "www.example.com".into(),
            attempts: 3,
            source: DnsError::Api("rate limited".into()),
        };
        assert_eq!(
            err.to_string(),
            "failed to update www.example.com after 3 attempts: DNS API error: rate limited"
        );
    }

    #[test]
    fn test_invalid_cron_display() {
        let err = TaskError::InvalidCron {
            expression: "* *".into(),
            reason: "too few fields".into(),
        };
        assert!(err.to_string().contains("\"* *\""));
    }
}
