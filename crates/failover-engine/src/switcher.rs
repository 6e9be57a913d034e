//! DNS record switching.

use crate::config::FailoverCandidate;
use crate::error::{DnsError, SwitchError};
use crate::selector::FailoverSelector;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Default bound on a single provider call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// DNS provider collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Current content of the record for `domain`
    async fn get_current_target(&self, domain: &str) -> Result<String, DnsError>;

    /// Point the record for `domain` at `address`
    async fn update_record(&self, domain: &str, address: &str) -> Result<(), DnsError>;
}

/// Reads, selects and updates DNS records with bounded retry
pub struct DnsSwitcher {
    provider: Arc<dyn DnsProvider>,
    selector: FailoverSelector,
    retry_count: AtomicU32,
    call_timeout: Duration,
}

impl DnsSwitcher {
    pub fn new(provider: Arc<dyn DnsProvider>, selector: FailoverSelector, retry_count: u32) -> Self {
        Self {
            provider,
            selector,
            retry_count: AtomicU32::new(retry_count.max(1)),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::Relaxed)
    }

    /// Update attempts per switch, at least 1
    pub fn set_retry_count(&self, retry_count: u32) {
        self.retry_count.store(retry_count.max(1), Ordering::Relaxed);
    }

    pub async fn current_target(&self, domain: &str) -> Result<String, SwitchError> {
        match timeout(self.call_timeout, self.provider.get_current_target(domain)).await {
            Ok(result) => result,
            Err(_) => Err(DnsError::Timeout(self.call_timeout)),
        }
        .map_err(|source| SwitchError::Lookup {
            domain: domain.to_string(),
            source,
        })
    }

    async fn update_once(&self, domain: &str, address: &str) -> Result<(), DnsError> {
        match timeout(self.call_timeout, self.provider.update_record(domain, address)).await {
            Ok(result) => result,
            Err(_) => Err(DnsError::Timeout(self.call_timeout)),
        }
    }

    /// Point `domain` at `address`.
    ///
    /// Fails with [`SwitchError::AlreadyCurrent`] without updating anything
    /// when the record already holds `address`.
    pub async fn switch_domain(&self, domain: &str, address: &str) -> Result<(), SwitchError> {
        let current = self.current_target(domain).await?;
        if current == address {
            return Err(SwitchError::AlreadyCurrent {
                domain: domain.to_string(),
                address: address.to_string(),
            });
        }

        let attempts = self.retry_count();
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.update_once(domain, address).await {
                Ok(()) => {
                    info!(domain = %domain, from = %current, to = %address, attempt, "DNS record switched");
                    return Ok(());
                }
                Err(e) => {
                    warn!(domain = %domain, attempt, max_attempts = attempts, error = %e, "DNS update failed");
                    last_error = Some(e);
                }
            }
        }

        Err(SwitchError::UpdateFailed {
            domain: domain.to_string(),
            attempts,
            source: last_error.unwrap_or_else(|| DnsError::Api("no update attempted".to_string())),
        })
    }

    /// Switch `domain` to the best reachable candidate other than the
    /// current address. Returns the new address.
    pub async fn auto_switch(
        &self,
        domain: &str,
        candidates: &[FailoverCandidate],
    ) -> Result<String, SwitchError> {
        let current = match self.current_target(domain).await {
            Ok(current) => current,
            Err(e) => {
                warn!(domain = %domain, error = %e, "Could not read current record, selecting without exclusion");
                String::new()
            }
        };

        let address = if current.is_empty() {
            self.selector.select_best(candidates).await?
        } else {
            self.selector.select_excluding(candidates, &current).await?
        };

        self.switch_domain(domain, &address).await?;
        Ok(address)
    }
}
