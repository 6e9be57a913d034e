//! DNS failover decision engine.
//!
//! Probes a set of targets on a fixed interval, tracks consecutive failures
//! per target and, once a target crosses its failure threshold, either
//! switches its DNS record to the best reachable failover candidate or sends
//! a webhook alert.
//!
//! # Components
//!
//! - **ProbeScheduler**: tick loop fanning out one probe per target, with
//!   remote-config refresh and target reconciliation
//! - **HealthStateStore**: failure counters, silence windows and cooldowns
//! - **FailoverSelector / DnsSwitcher**: candidate ranking and DNS updates
//!   through a [`DnsProvider`] (Cloudflare in production)
//! - **AlertDispatcher**: down and recovery webhooks
//! - **TaskRunner**: cron-scheduled one-off checks
//! - **StatusServer**: metrics, health snapshot, tasks and recent logs over HTTP

pub mod alert;
pub mod cloudflare;
pub mod config;
pub mod error;
pub mod http_server;
pub mod metrics;
pub mod remote;
pub mod runner;
pub mod scheduler;
pub mod selector;
pub mod server;
pub mod state;
pub mod store;
pub mod switcher;
pub mod task;
pub mod telemetry;
pub mod trigger;

pub use alert::{AlertDispatcher, DeliveryOutcome, HttpTransport, NotificationTransport};
pub use config::{Config, ConfigError, MonitorConfig, RemediationMode};
pub use error::{
    DeliveryError, DnsError, RemoteConfigError, SchedulerError, SelectError, SwitchError,
    TaskError,
};
pub use http_server::StatusServer;
pub use metrics::MetricsRegistry;
pub use runner::TaskRunner;
pub use scheduler::ProbeScheduler;
pub use selector::FailoverSelector;
pub use server::FailoverDaemon;
pub use state::{HealthState, HealthStateStore, TargetStatus};
pub use switcher::{DnsProvider, DnsSwitcher};
pub use telemetry::{TelemetryGuard, setup_tracing_with_otel};
