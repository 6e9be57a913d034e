//! Daemon wiring: builds every component from [`Config`] and runs them until
//! Ctrl-C.

use crate::alert::{AlertDispatcher, HttpTransport, NotificationTransport};
use crate::cloudflare::CloudflareProvider;
use crate::config::{Config, RemediationMode};
use crate::error::SchedulerError;
use crate::http_server::{StatusServer, StatusState};
use crate::metrics::MetricsRegistry;
use crate::remote::HttpRemoteFetcher;
use crate::runner::TaskRunner;
use crate::scheduler::ProbeScheduler;
use crate::selector::FailoverSelector;
use crate::state::HealthStateStore;
use crate::store::{ConfigStore, JsonFileStore, TaskStore};
use crate::switcher::DnsSwitcher;
use common::logging::LogBuffer;
use probe::{PingChecker, ProbeSet};
use std::sync::Arc;
use tracing::{error, info, warn};
use validator::Validate;

/// The DNS failover daemon
pub struct FailoverDaemon {
    config: Config,
    scheduler: Arc<ProbeScheduler>,
    runner: TaskRunner,
    metrics: Arc<MetricsRegistry>,
    logs: Arc<LogBuffer>,
    provider: Option<Arc<CloudflareProvider>>,
}

impl FailoverDaemon {
    /// Build the daemon. `logs` is the buffer fed by the tracing subscriber.
    pub async fn new(config: Config, logs: Arc<LogBuffer>) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let probes = ProbeSet::standard()?;
        let metrics = Arc::new(MetricsRegistry::new());
        let transport: Arc<dyn NotificationTransport> = Arc::new(HttpTransport::new());
        let dispatcher = Arc::new(AlertDispatcher::new(
            transport.clone(),
            config.monitor.webhook.clone(),
        ));
        let state = Arc::new(HealthStateStore::new(config.dns.cooldown));

        let store = match &config.storage.directory {
            Some(dir) => {
                info!(directory = %dir.display(), "Using JSON file store");
                Some(Arc::new(JsonFileStore::open(dir).await?))
            }
            None => None,
        };

        let mut builder = ProbeScheduler::builder(
            config.mode,
            config.monitor.clone(),
            probes.clone(),
            dispatcher,
        )
        .state(state)
        .metrics(metrics.clone());

        let mut provider = None;
        if config.mode == RemediationMode::DnsFailover {
            if config.dns.api_token.is_empty() {
                return Err(SchedulerError::InvalidConfig(
                    "dns.api_token is required in dns_failover mode".into(),
                )
                .into());
            }
            let cloudflare = Arc::new(CloudflareProvider::new(
                config.dns.api_token.clone(),
                config.dns.api_base.clone(),
                config.dns.request_timeout,
            )?);
            let selector = FailoverSelector::new(Arc::new(PingChecker::new()));
            let switcher = DnsSwitcher::new(cloudflare.clone(), selector, config.monitor.dns_retry)
                .with_call_timeout(config.dns.request_timeout);
            builder = builder.switcher(Arc::new(switcher));
            provider = Some(cloudflare);
        }

        if let Some(url) = &config.remote.url {
            builder = builder.remote(
                url.clone(),
                Arc::new(HttpRemoteFetcher::new()?),
                config.remote.update_interval,
            );
        }
        if let Some(store) = &store {
            builder = builder.config_store(store.clone() as Arc<dyn ConfigStore>);
        }

        let runner = TaskRunner::new(
            probes,
            transport,
            store.map(|s| s as Arc<dyn TaskStore>),
            Some(metrics.clone()),
        );

        Ok(Self {
            scheduler: Arc::new(builder.build()),
            runner,
            metrics,
            logs,
            provider,
            config,
        })
    }

    pub fn scheduler(&self) -> &Arc<ProbeScheduler> {
        &self.scheduler
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    /// Start everything, wait for Ctrl-C, then stop the scheduler and the
    /// task runner
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!(mode = %self.config.mode, "Starting DNS failover daemon");

        if let Some(provider) = &self.provider {
            match provider.verify_token().await {
                Ok(()) => info!("DNS provider token verified"),
                Err(e) => warn!(error = %e, "DNS provider token verification failed"),
            }
        }

        if let Err(e) = self.scheduler.restore_persisted().await {
            warn!(error = %e, "Failed to restore persisted config");
        }
        if let Err(e) = self.runner.load_from_store().await {
            error!(error = %e, "Failed to load scheduled tasks");
        }

        let status_handle = if self.config.status.enabled {
            let server = StatusServer::new(
                StatusState {
                    scheduler: self.scheduler.clone(),
                    runner: self.runner.clone(),
                    logs: self.logs.clone(),
                    metrics: Some(self.metrics.clone()),
                },
                self.config.status.listen.clone(),
            );
            Some(tokio::spawn(async move {
                if let Err(e) = server.run().await {
                    warn!(error = %e, "Status server error");
                }
            }))
        } else {
            None
        };

        self.scheduler.start()?;
        self.runner.start();
        info!("DNS failover daemon running");

        tokio::signal::ctrl_c().await?;
        info!("Shutdown requested");

        self.runner.stop();
        self.scheduler.stop().await?;
        if let Some(handle) = status_handle {
            handle.abort();
        }

        info!("DNS failover daemon stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dns_mode_requires_token() {
        let config = Config::default();
        let result = FailoverDaemon::new(config, Arc::new(LogBuffer::default())).await;
        let err = result.err().unwrap();
        assert!(err.to_string().contains("api_token"));
    }

    #[tokio::test]
    async fn test_alert_mode_with_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.mode = RemediationMode::Alert;
        config.storage.directory = Some(dir.path().join("state"));
        config.monitor.ping.targets = vec!["www.example.com".into()];

        let daemon = FailoverDaemon::new(config, Arc::new(LogBuffer::default()))
            .await
            .unwrap();
        assert_eq!(daemon.scheduler().mode(), RemediationMode::Alert);
        assert_eq!(daemon.scheduler().snapshot().len(), 1);
        assert_eq!(daemon.runner().task_count(), 0);
        assert!(dir.path().join("state").is_dir());

        // nothing persisted yet
        let store = JsonFileStore::open(dir.path().join("state")).await.unwrap();
        assert!(ConfigStore::load(&store).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dns_mode_with_token() {
        let mut config = Config::default();
        config.dns.api_token = "token".into();
        let daemon = FailoverDaemon::new(config, Arc::new(LogBuffer::default()))
            .await
            .unwrap();
        assert!(daemon.provider.is_some());
        assert!(!daemon.scheduler().is_running());
    }
}
