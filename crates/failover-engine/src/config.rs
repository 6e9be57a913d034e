//! Configuration loading and validation for the failover daemon

use probe::ProbeKind;
use probe::checkers::split_host_port;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "DNS_FAILOVER_CONFIG";

/// Floor used when no probe kind is enabled
pub const DEFAULT_MIN_FREQUENCY: Duration = Duration::from_secs(30);

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Remediation taken when a target crosses its failure threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationMode {
    /// Switch the DNS record to a failover candidate, then hold a cooldown
    #[default]
    DnsFailover,
    /// Send a webhook alert, then hold a silence window
    Alert,
}

impl std::fmt::Display for RemediationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemediationMode::DnsFailover => write!(f, "dns_failover"),
            RemediationMode::Alert => write!(f, "alert"),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mode: RemediationMode,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub dns: DnsSettings,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub status: StatusSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.monitor.validate()?;
        self.dns.validate()?;
        self.remote.validate()?;
        Ok(())
    }
}

/// A weighted alternate address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverCandidate {
    pub address: String,
    #[serde(default)]
    pub weight: i32,
}

impl FailoverCandidate {
    pub fn new(address: impl Into<String>, weight: i32) -> Self {
        Self {
            address: address.into(),
            weight,
        }
    }
}

/// Per-kind probe settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ProbeSettings {
    pub enabled: bool,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_frequency")]
    pub frequency: Duration,

    #[validate(range(min = 1))]
    pub failure_threshold: u32,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_timeout")]
    pub timeout: Duration,

    pub targets: Vec<String>,

    pub failover: Vec<FailoverCandidate>,
}

impl ProbeSettings {
    /// Enabled with at least one target
    pub fn is_active(&self) -> bool {
        self.enabled && !self.targets.is_empty()
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            frequency: Duration::from_secs(30),
            failure_threshold: 3,
            timeout: Duration::from_secs(5),
            targets: Vec::new(),
            failover: Vec::new(),
        }
    }
}

/// Webhook delivery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct WebhookSettings {
    /// Empty means alerts are logged and skipped
    pub url: String,

    #[validate(custom = "validate_method")]
    pub method: String,

    pub headers: BTreeMap<String, String>,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_timeout")]
    pub timeout: Duration,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: "POST".to_string(),
            headers: BTreeMap::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// The live monitoring configuration. This is the part that remote config
/// and persisted config replace at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub ping: ProbeSettings,
    pub tcp: ProbeSettings,
    pub http: ProbeSettings,
    pub webhook: WebhookSettings,

    /// DNS update attempts per switch
    pub dns_retry: u32,

    /// Escalation is suppressed this long after an alert
    #[serde(with = "humantime_serde")]
    pub silence_period: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ping: ProbeSettings {
                enabled: true,
                ..ProbeSettings::default()
            },
            tcp: ProbeSettings::default(),
            http: ProbeSettings {
                timeout: Duration::from_secs(10),
                ..ProbeSettings::default()
            },
            webhook: WebhookSettings::default(),
            dns_retry: 3,
            silence_period: Duration::from_secs(60),
        }
    }
}

impl MonitorConfig {
    pub fn probe(&self, kind: ProbeKind) -> &ProbeSettings {
        match kind {
            ProbeKind::Ping => &self.ping,
            ProbeKind::Tcp => &self.tcp,
            ProbeKind::Http => &self.http,
        }
    }

    pub fn probe_mut(&mut self, kind: ProbeKind) -> &mut ProbeSettings {
        match kind {
            ProbeKind::Ping => &mut self.ping,
            ProbeKind::Tcp => &mut self.tcp,
            ProbeKind::Http => &mut self.http,
        }
    }

    /// Smallest frequency among enabled kinds, [`DEFAULT_MIN_FREQUENCY`] if none
    pub fn min_frequency(&self) -> Duration {
        ProbeKind::ALL
            .iter()
            .map(|kind| self.probe(*kind))
            .filter(|settings| settings.enabled)
            .map(|settings| settings.frequency)
            .min()
            .unwrap_or(DEFAULT_MIN_FREQUENCY)
    }

    /// Every target of every enabled kind
    pub fn monitored_targets(&self) -> Vec<String> {
        ProbeKind::ALL
            .iter()
            .map(|kind| self.probe(*kind))
            .filter(|settings| settings.enabled)
            .flat_map(|settings| settings.targets.iter().cloned())
            .collect()
    }
}

impl Validate for MonitorConfig {
    fn validate(&self) -> Result<(), ValidationErrors> {
        for kind in ProbeKind::ALL {
            self.probe(kind).validate()?;
        }
        self.webhook.validate()?;

        let mut errors = ValidationErrors::new();
        if self.dns_retry < 1 {
            errors.add("dns_retry", ValidationError::new("dns_retry_too_small"));
        }
        for target in &self.tcp.targets {
            if let Err(e) = validate_tcp_target(target) {
                errors.add("tcp", e);
            }
        }
        for target in &self.http.targets {
            if let Err(e) = validate_http_target(target) {
                errors.add("http", e);
            }
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// DNS provider settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DnsSettings {
    /// Cloudflare API token
    pub api_token: String,

    #[validate(length(min = 1))]
    pub api_base: String,

    /// Further switches of a target are suppressed this long after one succeeds
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_timeout")]
    pub request_timeout: Duration,
}

impl Default for DnsSettings {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            api_base: crate::cloudflare::DEFAULT_API_BASE.to_string(),
            cooldown: Duration::from_secs(600),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Remote configuration source
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RemoteSettings {
    pub url: Option<String>,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_frequency")]
    pub update_interval: Duration,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            url: None,
            update_interval: Duration::from_secs(300),
        }
    }
}

/// Persistence settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Directory holding `config.json` and `tasks.json`. Absent means in-memory only.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// Status server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSettings {
    pub enabled: bool,
    pub listen: String,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "127.0.0.1:9190".to_string(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
    pub buffer_size: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: None,
            format: None,
            buffer_size: common::logging::DEFAULT_BUFFER_SIZE,
        }
    }
}

/// OpenTelemetry export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,
    pub service_name: String,
    pub otlp_endpoint: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "dns-failover".to_string(),
            otlp_endpoint: "http://localhost:4317".to_string(),
        }
    }
}

// Custom validators

/// Shortest probe frequency, in seconds
pub const MIN_FREQUENCY_SECS: u64 = 10;
/// Accepted probe timeouts, in seconds
pub const TIMEOUT_RANGE_SECS: RangeInclusive<u64> = 1..=60;

fn validate_frequency(frequency: &Duration) -> Result<(), ValidationError> {
    if frequency.as_secs() < MIN_FREQUENCY_SECS {
        return Err(ValidationError::new("frequency_too_small"));
    }
    Ok(())
}

fn validate_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    let secs = timeout.as_secs();
    if !TIMEOUT_RANGE_SECS.contains(&secs) {
        return Err(ValidationError::new("timeout_out_of_range"));
    }
    Ok(())
}

fn validate_method(method: &str) -> Result<(), ValidationError> {
    match method.to_ascii_uppercase().as_str() {
        "GET" | "POST" | "PUT" | "PATCH" => Ok(()),
        _ => Err(ValidationError::new("unsupported_method")),
    }
}

fn validate_tcp_target(target: &str) -> Result<(), ValidationError> {
    if split_host_port(target).is_none() {
        return Err(ValidationError::new("tcp_target_not_host_port"));
    }
    Ok(())
}

fn validate_http_target(target: &str) -> Result<(), ValidationError> {
    if !target.starts_with("http://") && !target.starts_with("https://") {
        return Err(ValidationError::new("http_target_missing_scheme"));
    }
    Ok(())
}

// Configuration loading implementation

impl Config {
    /// Load configuration from default search paths
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
            paths.push(PathBuf::from(explicit));
        }

        paths.push(PathBuf::from("/etc/dns-failover/config.yaml"));

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./dns-failover.yaml"));

        paths.into_iter().find(|p: &PathBuf| p.exists() && p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/dns-failover/config.yaml"))
    }
}
