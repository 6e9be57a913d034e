//! Probe scheduler.
//!
//! One tick probes every target of every enabled kind concurrently and waits
//! for all of them before the next tick can start. Results drive the
//! [`HealthStateStore`]; a target reaching its failure threshold escalates to
//! the DNS switcher or the alert dispatcher depending on [`RemediationMode`].

use crate::alert::{AlertDispatcher, DeliveryOutcome};
use crate::config::{FailoverCandidate, MonitorConfig, RemediationMode};
use crate::error::{RemoteConfigError, SchedulerError};
use crate::metrics::MetricsRegistry;
use crate::remote::RemoteConfigFetcher;
use crate::state::{HealthStateStore, TargetStatus};
use crate::store::ConfigStore;
use crate::switcher::DnsSwitcher;
use parking_lot::{Mutex, RwLock};
use probe::checkers::split_host_port;
use probe::{ProbeKind, ProbeResult, ProbeSet};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};
use validator::Validate;

/// Targets added and removed by a configuration change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl TargetDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Set difference between two target lists, in list order
pub fn diff_targets(old: &[String], new: &[String]) -> TargetDiff {
    let old_set: HashSet<&str> = old.iter().map(String::as_str).collect();
    let new_set: HashSet<&str> = new.iter().map(String::as_str).collect();

    let mut seen = HashSet::new();
    let added = new
        .iter()
        .filter(|t| !old_set.contains(t.as_str()) && seen.insert(t.as_str()))
        .cloned()
        .collect();

    let mut seen = HashSet::new();
    let removed = old
        .iter()
        .filter(|t| !new_set.contains(t.as_str()) && seen.insert(t.as_str()))
        .cloned()
        .collect();

    TargetDiff { added, removed }
}

/// DNS record name switched when `target` fails
pub fn record_name(kind: ProbeKind, target: &str) -> Option<String> {
    match kind {
        ProbeKind::Ping => Some(target.to_string()).filter(|t| !t.is_empty()),
        ProbeKind::Tcp => split_host_port(target).map(|(host, _)| host.to_string()),
        ProbeKind::Http => reqwest::Url::parse(target)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string)),
    }
}

/// One probe to run in a tick, copied out of the live config
#[derive(Debug, Clone)]
struct ProbeJob {
    kind: ProbeKind,
    target: String,
    timeout: Duration,
    threshold: u32,
    silence_period: Duration,
    failover: Arc<Vec<FailoverCandidate>>,
}

struct RemoteSource {
    url: String,
    fetcher: Arc<dyn RemoteConfigFetcher>,
    interval: RwLock<Duration>,
}

struct Inner {
    mode: RemediationMode,
    config: RwLock<MonitorConfig>,
    state: Arc<HealthStateStore>,
    probes: ProbeSet,
    dispatcher: Arc<AlertDispatcher>,
    switcher: Option<Arc<DnsSwitcher>>,
    config_store: Option<Arc<dyn ConfigStore>>,
    remote: Option<RemoteSource>,
    metrics: Option<Arc<MetricsRegistry>>,
}

struct RunHandle {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

/// Builder for [`ProbeScheduler`]
pub struct ProbeSchedulerBuilder {
    mode: RemediationMode,
    config: MonitorConfig,
    probes: ProbeSet,
    dispatcher: Arc<AlertDispatcher>,
    state: Option<Arc<HealthStateStore>>,
    switcher: Option<Arc<DnsSwitcher>>,
    config_store: Option<Arc<dyn ConfigStore>>,
    remote: Option<RemoteSource>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl ProbeSchedulerBuilder {
    pub fn state(mut self, state: Arc<HealthStateStore>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn switcher(mut self, switcher: Arc<DnsSwitcher>) -> Self {
        self.switcher = Some(switcher);
        self
    }

    pub fn config_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.config_store = Some(store);
        self
    }

    pub fn remote(
        mut self,
        url: impl Into<String>,
        fetcher: Arc<dyn RemoteConfigFetcher>,
        interval: Duration,
    ) -> Self {
        self.remote = Some(RemoteSource {
            url: url.into(),
            fetcher,
            interval: RwLock::new(interval),
        });
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> ProbeScheduler {
        let state = self.state.unwrap_or_default();
        for target in self.config.monitored_targets() {
            state.init(&target);
        }
        if let Some(switcher) = &self.switcher {
            switcher.set_retry_count(self.config.dns_retry);
        }
        self.dispatcher.update_settings(self.config.webhook.clone());

        ProbeScheduler {
            inner: Arc::new(Inner {
                mode: self.mode,
                config: RwLock::new(self.config),
                state,
                probes: self.probes,
                dispatcher: self.dispatcher,
                switcher: self.switcher,
                config_store: self.config_store,
                remote: self.remote,
                metrics: self.metrics,
            }),
            running: Mutex::new(None),
        }
    }
}

/// Recurring probe loop with threshold escalation
pub struct ProbeScheduler {
    inner: Arc<Inner>,
    running: Mutex<Option<RunHandle>>,
}

impl ProbeScheduler {
    pub fn builder(
        mode: RemediationMode,
        config: MonitorConfig,
        probes: ProbeSet,
        dispatcher: Arc<AlertDispatcher>,
    ) -> ProbeSchedulerBuilder {
        ProbeSchedulerBuilder {
            mode,
            config,
            probes,
            dispatcher,
            state: None,
            switcher: None,
            config_store: None,
            remote: None,
            metrics: None,
        }
    }

    /// Start the tick loop (and the remote refresh loop when configured).
    /// The first tick runs immediately.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut tasks = vec![tokio::spawn(run_loop(self.inner.clone(), stop_rx.clone()))];
        if self.inner.remote.is_some() {
            tasks.push(tokio::spawn(refresh_loop(self.inner.clone(), stop_rx)));
        }

        let config = self.inner.config.read();
        info!(
            mode = %self.inner.mode,
            frequency_secs = config.min_frequency().as_secs(),
            targets = config.monitored_targets().len(),
            "Probe scheduler started"
        );
        *running = Some(RunHandle { stop_tx, tasks });
        Ok(())
    }

    /// Stop the loops. Probes of a tick already in progress finish first.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let handle = self
            .running
            .lock()
            .take()
            .ok_or(SchedulerError::NotRunning)?;

        let _ = handle.stop_tx.send(true);
        for task in handle.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Scheduler task ended abnormally");
            }
        }
        info!("Probe scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Run a single tick and wait for it to finish
    pub async fn run_once(&self) {
        self.inner.run_tick().await;
    }

    /// Replace the live config, reconciling health state for added and
    /// removed targets before the next tick reads it
    pub async fn apply_config(
        &self,
        config: MonitorConfig,
        source: &str,
    ) -> Result<TargetDiff, SchedulerError> {
        self.inner.apply_config(config, source).await
    }

    /// Fetch the remote config now and apply it
    pub async fn refresh_remote(&self) -> Result<TargetDiff, RemoteConfigError> {
        self.inner.refresh_remote().await
    }

    /// Apply the config saved in the config store, if any. A config that
    /// fails to load or validate is logged and the current config is kept.
    pub async fn restore_persisted(&self) -> Result<Option<TargetDiff>, SchedulerError> {
        let Some(store) = &self.inner.config_store else {
            return Ok(None);
        };
        match store.load().await {
            Ok(Some(config)) => match self.inner.apply_config(config, "persisted").await {
                Ok(diff) => Ok(Some(diff)),
                Err(e) => {
                    warn!(error = %e, "Persisted config rejected, keeping current config");
                    if let Some(metrics) = &self.inner.metrics {
                        metrics.record_error("persisted_config");
                    }
                    Ok(None)
                }
            },
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(error = %e, "Failed to load persisted config");
                Ok(None)
            }
        }
    }

    pub fn mode(&self) -> RemediationMode {
        self.inner.mode
    }

    /// Copy of the live config
    pub fn config(&self) -> MonitorConfig {
        self.inner.config.read().clone()
    }

    pub fn state(&self) -> Arc<HealthStateStore> {
        self.inner.state.clone()
    }

    /// Health of every monitored target, sorted by target
    pub fn snapshot(&self) -> Vec<TargetStatus> {
        self.inner.state.statuses()
    }
}

async fn run_loop(inner: Arc<Inner>, mut stop: watch::Receiver<bool>) {
    if inner.remote.is_some() {
        if let Err(e) = inner.refresh_remote().await {
            warn!(error = %e, "Initial remote config fetch failed, using local config");
        }
    }

    loop {
        inner.run_tick().await;

        if *stop.borrow() {
            break;
        }
        let wait = inner.config.read().min_frequency();
        tokio::select! {
            _ = sleep(wait) => {}
            _ = stop.changed() => break,
        }
    }
    debug!("Tick loop exited");
}

async fn refresh_loop(inner: Arc<Inner>, mut stop: watch::Receiver<bool>) {
    loop {
        let wait = match &inner.remote {
            Some(remote) => *remote.interval.read(),
            None => return,
        };
        tokio::select! {
            _ = sleep(wait) => {}
            _ = stop.changed() => break,
        }
        tokio::select! {
            result = inner.refresh_remote() => {
                if let Err(e) = result {
                    error!(error = %e, "Remote config refresh failed, keeping current config");
                }
            }
            _ = stop.changed() => break,
        }
    }
    debug!("Remote refresh loop exited");
}

impl Inner {
    fn snapshot_jobs(&self) -> Vec<ProbeJob> {
        let config = self.config.read();
        let mut jobs = Vec::new();
        for kind in ProbeKind::ALL {
            let settings = config.probe(kind);
            if !settings.is_active() {
                continue;
            }
            let failover = Arc::new(settings.failover.clone());
            for target in &settings.targets {
                jobs.push(ProbeJob {
                    kind,
                    target: target.clone(),
                    timeout: settings.timeout,
                    threshold: settings.failure_threshold,
                    silence_period: config.silence_period,
                    failover: failover.clone(),
                });
            }
        }
        jobs
    }

    async fn run_tick(self: &Arc<Self>) {
        let started = Instant::now();
        let jobs = self.snapshot_jobs();
        if jobs.is_empty() {
            debug!("No targets to probe");
            return;
        }

        let count = jobs.len();
        let mut set = JoinSet::new();
        for job in jobs {
            let inner = self.clone();
            set.spawn(async move { inner.probe_target(job).await });
        }
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Probe task failed");
            }
        }

        let elapsed = started.elapsed();
        debug!(probes = count, elapsed_ms = elapsed.as_millis(), "Tick complete");
        if let Some(metrics) = &self.metrics {
            metrics.record_tick(elapsed);
            let statuses = self.state.statuses();
            let down = statuses.iter().filter(|s| s.is_down).count();
            metrics.set_target_counts(statuses.len(), down);
        }
    }

    async fn probe_target(&self, job: ProbeJob) {
        let target = job.target.as_str();

        if self.mode == RemediationMode::Alert && self.state.is_silenced(target) {
            debug!(
                kind = %job.kind,
                target = %target,
                remaining_secs = self.state.silence_remaining(target).as_secs(),
                "Target silenced, skipping probe"
            );
            return;
        }
        let in_cooldown = self.state.is_in_cooldown(target);

        let result = self.probes.check(job.kind, target, job.timeout).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_probe(job.kind, result.status, result.latency.unwrap_or(result.elapsed));
        }

        // removed by a config update while the check was in flight
        if !self.state.contains(target) {
            debug!(kind = %job.kind, target = %target, "Target no longer monitored, dropping result");
            return;
        }

        if result.is_healthy() {
            self.on_success(&job, &result).await;
        } else {
            let Some(failures) = self.state.record_failure(target) else {
                return;
            };
            warn!(
                kind = %job.kind,
                target = %target,
                failures,
                threshold = job.threshold,
                error = %result.error_text(),
                "Probe failed"
            );
            if failures >= job.threshold {
                self.escalate(&job, failures, &result, in_cooldown).await;
            }
        }
    }

    async fn on_success(&self, job: &ProbeJob, result: &ProbeResult) {
        let target = job.target.as_str();
        info!(
            kind = %job.kind,
            target = %target,
            latency_ms = result.latency.unwrap_or(result.elapsed).as_millis(),
            "Probe succeeded"
        );

        if self.state.is_down(target) && self.mode == RemediationMode::Alert {
            info!(kind = %job.kind, target = %target, "Target recovered");
            let outcome = self.dispatcher.send_recovery(job.kind, target).await;
            self.record_alert("alert_recovery", &outcome);
        }
        self.state.reset_failure(target);
        self.state.clear_silence(target);
    }

    async fn escalate(&self, job: &ProbeJob, failures: u32, result: &ProbeResult, in_cooldown: bool) {
        let target = job.target.as_str();
        match self.mode {
            RemediationMode::Alert => {
                error!(kind = %job.kind, target = %target, failures, "Failure threshold reached, sending alert");
                let outcome = self
                    .dispatcher
                    .send_down(job.kind, target, failures, job.threshold, result.error_text())
                    .await;
                self.record_alert("alert_down", &outcome);
                self.state.mark_down(target, job.silence_period);
            }
            RemediationMode::DnsFailover => {
                if in_cooldown {
                    info!(
                        kind = %job.kind,
                        target = %target,
                        remaining_secs = self.state.cooldown_remaining(target).as_secs(),
                        "Failure threshold reached during cooldown, not switching"
                    );
                    return;
                }
                error!(kind = %job.kind, target = %target, failures, "Failure threshold reached, starting failover");
                self.failover(job).await;
            }
        }
    }

    async fn failover(&self, job: &ProbeJob) {
        let target = job.target.as_str();
        let Some(switcher) = &self.switcher else {
            error!(target = %target, "No DNS switcher configured, cannot fail over");
            self.state.reset_failure(target);
            return;
        };
        let Some(domain) = record_name(job.kind, target) else {
            error!(kind = %job.kind, target = %target, "Cannot derive a DNS record name from target");
            self.state.reset_failure(target);
            return;
        };

        match switcher.auto_switch(&domain, &job.failover).await {
            Ok(address) => {
                info!(target = %target, domain = %domain, address = %address, "Failover complete");
                self.state.mark_switched(target);
                self.record_remediation("dns_switch", "success");
            }
            Err(e) => {
                error!(target = %target, domain = %domain, error = %e, "Failover failed");
                self.state.reset_failure(target);
                self.record_remediation("dns_switch", "failure");
                if let Some(metrics) = &self.metrics {
                    metrics.record_error("dns_switch");
                }
            }
        }
    }

    fn record_alert(&self, action: &str, outcome: &DeliveryOutcome) {
        let label = match outcome {
            DeliveryOutcome::Delivered(_) => "success",
            DeliveryOutcome::Skipped => "skipped",
            DeliveryOutcome::Failed(_) => "failure",
        };
        self.record_remediation(action, label);
    }

    fn record_remediation(&self, action: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_remediation(action, outcome);
        }
    }

    async fn apply_config(
        &self,
        config: MonitorConfig,
        source: &str,
    ) -> Result<TargetDiff, SchedulerError> {
        config
            .validate()
            .map_err(|e| SchedulerError::InvalidConfig(e.to_string()))?;

        let diff = {
            let mut current = self.config.write();
            let diff = diff_targets(&current.monitored_targets(), &config.monitored_targets());
            for target in &diff.added {
                info!(target = %target, "Monitoring new target");
                self.state.init(target);
            }
            for target in &diff.removed {
                info!(target = %target, "No longer monitoring target");
                self.state.remove(target);
            }
            *current = config.clone();
            diff
        };

        self.dispatcher.update_settings(config.webhook.clone());
        if let Some(switcher) = &self.switcher {
            switcher.set_retry_count(config.dns_retry);
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_config_update(source);
        }
        info!(
            source = %source,
            added = diff.added.len(),
            removed = diff.removed.len(),
            "Configuration applied"
        );

        if let Some(store) = &self.config_store {
            if let Err(e) = store.save(&config).await {
                error!(error = %e, "Failed to persist config");
            }
        }
        Ok(diff)
    }

    async fn refresh_remote(&self) -> Result<TargetDiff, RemoteConfigError> {
        let Some(remote) = &self.remote else {
            return Ok(TargetDiff::default());
        };

        let fetched = match remote.fetcher.fetch(&remote.url).await {
            Ok(fetched) => fetched,
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_error("remote_config");
                }
                return Err(e);
            }
        };

        let mut next = self.config.read().clone();
        fetched.apply_to(&mut next);
        let diff = self
            .apply_config(next, "remote")
            .await
            .map_err(|e| RemoteConfigError::Invalid(e.to_string()))?;
        *remote.interval.write() = fetched.update_interval();
        Ok(diff)
    }
}
