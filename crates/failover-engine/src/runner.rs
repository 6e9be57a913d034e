//! Cron task runner.
//!
//! Keeps the set of [`ScheduledTask`]s and one trigger per enabled task.
//! Executions probe the task's target once, record `last_run_at` and
//! `last_result`, and optionally POST a webhook. The runner shares nothing
//! with the probe scheduler beyond the checkers.

use crate::alert::{DeliveryRequest, NotificationTransport};
use crate::error::TaskError;
use crate::metrics::MetricsRegistry;
use crate::store::TaskStore;
use crate::task::{ScheduledTask, TaskResult, TaskWebhookPayload, describe, result_text};
use crate::trigger::{CronScheduler, TriggerCallback, TriggerHandle, parse_schedule};
use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use probe::ProbeSet;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Timeout for task webhook delivery
pub const TASK_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

struct TaskEntry {
    task: ScheduledTask,
    trigger: Option<TriggerHandle>,
}

struct RunnerInner {
    probes: ProbeSet,
    transport: Arc<dyn NotificationTransport>,
    store: Option<Arc<dyn TaskStore>>,
    metrics: Option<Arc<MetricsRegistry>>,
    cron: CronScheduler,
    entries: Mutex<HashMap<String, TaskEntry>>,
}

/// Runs [`ScheduledTask`]s on their cron schedules
#[derive(Clone)]
pub struct TaskRunner {
    inner: Arc<RunnerInner>,
}

impl TaskRunner {
    pub fn new(
        probes: ProbeSet,
        transport: Arc<dyn NotificationTransport>,
        store: Option<Arc<dyn TaskStore>>,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                probes,
                transport,
                store,
                metrics,
                cron: CronScheduler::new(),
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn start(&self) {
        self.inner.cron.start();
        info!(tasks = self.task_count(), "Task runner started");
    }

    /// Suppress further fires. Executions already started run to completion.
    pub fn stop(&self) {
        self.inner.cron.stop();
        info!("Task runner stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.cron.is_running()
    }

    /// Add or replace a task. The task is checked and persisted before it
    /// is scheduled, so a store failure leaves the runner unchanged.
    pub async fn add_task(&self, task: ScheduledTask) -> Result<(), TaskError> {
        check_task(&task)?;
        self.persist(&task).await?;
        self.insert(task)
    }

    pub async fn remove_task(&self, id: &str) -> Result<(), TaskError> {
        let entry = self
            .inner
            .entries
            .lock()
            .remove(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        if let Some(trigger) = entry.trigger {
            self.inner.cron.unregister(trigger);
        }
        info!(task_id = %id, "Removed scheduled task");

        if let Some(store) = &self.inner.store {
            store.delete(id).await?;
        }
        Ok(())
    }

    pub async fn enable_task(&self, id: &str) -> Result<(), TaskError> {
        self.set_enabled(id, true).await
    }

    pub async fn disable_task(&self, id: &str) -> Result<(), TaskError> {
        self.set_enabled(id, false).await
    }

    pub fn get_task(&self, id: &str) -> Option<ScheduledTask> {
        self.inner.entries.lock().get(id).map(|e| e.task.clone())
    }

    /// All tasks, sorted by id
    pub fn list_tasks(&self) -> Vec<ScheduledTask> {
        let mut tasks: Vec<_> = self
            .inner
            .entries
            .lock()
            .values()
            .map(|e| e.task.clone())
            .collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }

    pub fn task_count(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Execute a task immediately, whether or not it is enabled
    pub async fn run_task_now(&self, id: &str) -> Result<TaskResult, TaskError> {
        let task = self
            .get_task(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        Ok(self.inner.execute(task, true).await)
    }

    /// Add every task in the store. Invalid tasks are logged and skipped.
    pub async fn load_from_store(&self) -> Result<usize, TaskError> {
        let Some(store) = &self.inner.store else {
            return Ok(0);
        };

        let mut loaded = 0;
        for task in store.get_all().await? {
            let id = task.id.clone();
            match self.insert(task) {
                Ok(()) => loaded += 1,
                Err(e) => warn!(task_id = %id, error = %e, "Skipping stored task"),
            }
        }
        info!(loaded, "Loaded scheduled tasks from store");
        Ok(loaded)
    }

    fn insert(&self, task: ScheduledTask) -> Result<(), TaskError> {
        check_task(&task)?;

        let mut entries = self.inner.entries.lock();
        if let Some(old) = entries.remove(&task.id) {
            if let Some(trigger) = old.trigger {
                self.inner.cron.unregister(trigger);
            }
        }
        let trigger = if task.enabled {
            Some(self.register(&task)?)
        } else {
            None
        };

        info!(
            task_id = %task.id,
            name = %task.name,
            cron = %task.cron_expression,
            enabled = task.enabled,
            "Added scheduled task"
        );
        entries.insert(task.id.clone(), TaskEntry { task, trigger });
        Ok(())
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), TaskError> {
        let task = {
            let mut entries = self.inner.entries.lock();
            let entry = entries
                .get_mut(id)
                .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
            if entry.task.enabled == enabled {
                return Ok(());
            }

            if enabled {
                entry.trigger = Some(self.register(&entry.task)?);
            } else if let Some(trigger) = entry.trigger.take() {
                self.inner.cron.unregister(trigger);
            }
            entry.task.enabled = enabled;
            entry.task.updated_at = Utc::now();
            entry.task.clone()
        };

        info!(task_id = %id, enabled, "Updated scheduled task");
        self.persist(&task).await
    }

    fn register(&self, task: &ScheduledTask) -> Result<TriggerHandle, TaskError> {
        let weak: Weak<RunnerInner> = Arc::downgrade(&self.inner);
        let id = task.id.clone();
        let callback: TriggerCallback = Arc::new(move || {
            let weak = weak.clone();
            let id = id.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.execute_task(&id).await;
                }
            }
            .boxed()
        });
        self.inner.cron.register(&task.cron_expression, callback)
    }

    async fn persist(&self, task: &ScheduledTask) -> Result<(), TaskError> {
        if let Some(store) = &self.inner.store {
            store.save(task).await?;
        }
        Ok(())
    }
}

fn check_task(task: &ScheduledTask) -> Result<(), TaskError> {
    if task.id.is_empty() {
        return Err(TaskError::Invalid("task id must not be empty".into()));
    }
    if task.target.is_empty() {
        return Err(TaskError::Invalid(format!("task {} has no target", task.id)));
    }
    parse_schedule(&task.cron_expression)?;
    Ok(())
}

impl RunnerInner {
    /// Triggered execution; missing or disabled tasks are skipped
    async fn execute_task(&self, id: &str) {
        let task = match self.entries.lock().get(id) {
            Some(entry) if entry.task.enabled => entry.task.clone(),
            Some(_) => {
                debug!(task_id = %id, "Task disabled, skipping");
                return;
            }
            None => {
                debug!(task_id = %id, "Task no longer exists, skipping");
                return;
            }
        };
        let result = self.execute(task, false).await;
        debug!(task_id = %result.task_id, success = result.success, "Scheduled execution finished");
    }

    async fn execute(&self, task: ScheduledTask, manual: bool) -> TaskResult {
        let target = task.probe_target();
        info!(task_id = %task.id, kind = %task.check_kind, target = %target, manual, "Running scheduled task");

        let probe = self.probes.check(task.check_kind, &target, task.timeout()).await;
        let (available, message) = describe(&probe);
        let executed_at = Utc::now();

        let webhook_sent = match task.webhook() {
            Some(url) => self.send_webhook(&task, url, available, &message, executed_at).await,
            None => false,
        };

        let updated = {
            let mut entries = self.entries.lock();
            entries.get_mut(&task.id).map(|entry| {
                entry.task.last_run_at = Some(executed_at);
                entry.task.last_result = result_text(available, &message, manual);
                entry.task.clone()
            })
        };
        if let (Some(updated), Some(store)) = (updated, &self.store) {
            if let Err(e) = store.save(&updated).await {
                error!(task_id = %task.id, error = %e, "Failed to persist task result");
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_task_run(task.check_kind, available);
        }
        if available {
            info!(task_id = %task.id, target = %target, message = %message, "Scheduled check succeeded");
        } else {
            warn!(task_id = %task.id, target = %target, message = %message, "Scheduled check failed");
        }

        TaskResult {
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            success: available,
            check_kind: task.check_kind,
            target: task.target.clone(),
            message,
            executed_at,
            webhook_sent,
        }
    }

    async fn send_webhook(
        &self,
        task: &ScheduledTask,
        url: &str,
        available: bool,
        message: &str,
        executed_at: chrono::DateTime<Utc>,
    ) -> bool {
        let payload = TaskWebhookPayload::new(task, available, message, executed_at);
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Failed to encode task webhook");
                return false;
            }
        };

        let request = DeliveryRequest {
            url: url.to_string(),
            method: "POST".to_string(),
            headers: BTreeMap::new(),
            timeout: TASK_WEBHOOK_TIMEOUT,
            body,
        };
        match self.transport.deliver(request).await {
            Ok(status) => {
                debug!(task_id = %task.id, status, "Task webhook delivered");
                true
            }
            Err(e) => {
                warn!(task_id = %task.id, url = %url, error = %e, "Task webhook failed");
                false
            }
        }
    }
}
