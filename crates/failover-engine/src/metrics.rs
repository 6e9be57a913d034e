//! Prometheus metrics for the failover engine.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use probe::{ProbeKind, ProbeStatus};
use std::time::Duration;

/// Labels for probe result metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProbeLabels {
    /// Probe kind (ping, tcp, http)
    pub kind: String,
    /// Result (healthy, unhealthy, timeout, error)
    pub result: String,
}

/// Labels for per-kind metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct KindLabels {
    pub kind: String,
}

/// Labels for remediation metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RemediationLabels {
    /// Action (dns_switch, alert_down, alert_recovery)
    pub action: String,
    /// Outcome (success, failure, skipped)
    pub outcome: String,
}

/// Labels for config update metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SourceLabels {
    /// Source (remote, local)
    pub source: String,
}

/// Labels for error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub error_type: String,
}

fn status_label(status: ProbeStatus) -> &'static str {
    match status {
        ProbeStatus::Healthy => "healthy",
        ProbeStatus::Unhealthy => "unhealthy",
        ProbeStatus::Timeout => "timeout",
        ProbeStatus::Error => "error",
    }
}

/// Metrics registry with all engine metrics
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    probes_total: Family<ProbeLabels, Counter>,
    probe_latency_seconds: Family<KindLabels, Histogram>,
    targets_monitored: Gauge,
    targets_down: Gauge,
    remediations_total: Family<RemediationLabels, Counter>,
    tick_duration_seconds: Histogram,
    config_updates_total: Family<SourceLabels, Counter>,
    task_runs_total: Family<ProbeLabels, Counter>,
    errors_total: Family<ErrorLabels, Counter>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let probes_total = Family::<ProbeLabels, Counter>::default();
        registry.register(
            "dns_failover_probes",
            "Probes performed by kind and result",
            probes_total.clone(),
        );

        let probe_latency_seconds = Family::<KindLabels, Histogram>::new_with_constructor(|| {
            // 1ms to ~16s
            Histogram::new(exponential_buckets(0.001, 2.0, 15))
        });
        registry.register(
            "dns_failover_probe_latency_seconds",
            "Probe latency in seconds",
            probe_latency_seconds.clone(),
        );

        let targets_monitored = Gauge::default();
        registry.register(
            "dns_failover_targets_monitored",
            "Number of monitored targets",
            targets_monitored.clone(),
        );

        let targets_down = Gauge::default();
        registry.register(
            "dns_failover_targets_down",
            "Number of targets currently flagged down",
            targets_down.clone(),
        );

        let remediations_total = Family::<RemediationLabels, Counter>::default();
        registry.register(
            "dns_failover_remediations",
            "Remediation actions by action and outcome",
            remediations_total.clone(),
        );

        let tick_duration_seconds = Histogram::new(exponential_buckets(0.01, 2.0, 12));
        registry.register(
            "dns_failover_tick_duration_seconds",
            "Duration of a full probe cycle",
            tick_duration_seconds.clone(),
        );

        let config_updates_total = Family::<SourceLabels, Counter>::default();
        registry.register(
            "dns_failover_config_updates",
            "Configuration updates applied by source",
            config_updates_total.clone(),
        );

        let task_runs_total = Family::<ProbeLabels, Counter>::default();
        registry.register(
            "dns_failover_task_runs",
            "Scheduled task executions by kind and result",
            task_runs_total.clone(),
        );

        let errors_total = Family::<ErrorLabels, Counter>::default();
        registry.register(
            "dns_failover_errors",
            "Errors by type",
            errors_total.clone(),
        );

        Self {
            registry,
            probes_total,
            probe_latency_seconds,
            targets_monitored,
            targets_down,
            remediations_total,
            tick_duration_seconds,
            config_updates_total,
            task_runs_total,
            errors_total,
        }
    }

    /// Record a probe result
    pub fn record_probe(&self, kind: ProbeKind, status: ProbeStatus, latency: Duration) {
        self.probes_total
            .get_or_create(&ProbeLabels {
                kind: kind.as_str().to_string(),
                result: status_label(status).to_string(),
            })
            .inc();

        self.probe_latency_seconds
            .get_or_create(&KindLabels {
                kind: kind.as_str().to_string(),
            })
            .observe(latency.as_secs_f64());
    }

    pub fn set_target_counts(&self, monitored: usize, down: usize) {
        self.targets_monitored.set(monitored as i64);
        self.targets_down.set(down as i64);
    }

    pub fn record_remediation(&self, action: &str, outcome: &str) {
        self.remediations_total
            .get_or_create(&RemediationLabels {
                action: action.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
    }

    pub fn record_tick(&self, duration: Duration) {
        self.tick_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_config_update(&self, source: &str) {
        self.config_updates_total
            .get_or_create(&SourceLabels {
                source: source.to_string(),
            })
            .inc();
    }

    pub fn record_task_run(&self, kind: ProbeKind, success: bool) {
        self.task_runs_total
            .get_or_create(&ProbeLabels {
                kind: kind.as_str().to_string(),
                result: if success { "available" } else { "unavailable" }.to_string(),
            })
            .inc();
    }

    /// Record error by type
    pub fn record_error(&self, error_type: &str) {
        self.errors_total
            .get_or_create(&ErrorLabels {
                error_type: error_type.to_string(),
            })
            .inc();
    }

    /// Prometheus text exposition of every metric
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
