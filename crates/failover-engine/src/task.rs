//! Scheduled one-off checks.

use chrono::{DateTime, Utc};
use probe::{ProbeKind, ProbeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Timeout used when a task does not set one
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(5);

/// Event name carried by task webhooks
pub const SCHEDULE_CHECK_EVENT: &str = "schedule_check";

/// A cron-scheduled check of one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    /// 5-field (minute precision) or 6/7-field (with seconds) cron expression
    #[serde(rename = "cron")]
    pub cron_expression: String,
    #[serde(rename = "check_type")]
    pub check_kind: ProbeKind,
    /// Host, IP or URL depending on `check_kind`
    pub target: String,
    /// Port appended to `target` for TCP checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Seconds; 0 means [`DEFAULT_TASK_TIMEOUT`]
    #[serde(default, rename = "timeout")]
    pub timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    /// Copied verbatim into the webhook payload
    #[serde(default, rename = "webhook_data")]
    pub webhook_custom_data: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_result: String,
}

impl ScheduledTask {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        cron_expression: impl Into<String>,
        check_kind: ProbeKind,
        target: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            cron_expression: cron_expression.into(),
            check_kind,
            target: target.into(),
            port: None,
            timeout_seconds: 0,
            webhook_url: None,
            webhook_custom_data: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            last_run_at: None,
            last_result: String::new(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_webhook(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }

    pub fn with_custom_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.webhook_custom_data.insert(key.into(), value.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn timeout(&self) -> Duration {
        if self.timeout_seconds == 0 {
            DEFAULT_TASK_TIMEOUT
        } else {
            Duration::from_secs(self.timeout_seconds)
        }
    }

    /// Target handed to the checker: TCP tasks with a port become `host:port`
    pub fn probe_target(&self) -> String {
        match (self.check_kind, self.port) {
            (ProbeKind::Tcp, Some(port)) if port > 0 => format!("{}:{}", self.target, port),
            _ => self.target.clone(),
        }
    }

    /// Webhook URL, if one is set and non-empty
    pub fn webhook(&self) -> Option<&str> {
        self.webhook_url.as_deref().filter(|url| !url.is_empty())
    }
}

/// `lastResult` text for an execution
pub fn result_text(available: bool, message: &str, manual: bool) -> String {
    match (available, manual) {
        (true, false) => "available".to_string(),
        (true, true) => "available (manual run)".to_string(),
        (false, false) => format!("unavailable: {}", message),
        (false, true) => format!("unavailable (manual run): {}", message),
    }
}

/// Availability and message for a probe result
pub fn describe(result: &ProbeResult) -> (bool, String) {
    if result.is_healthy() {
        let latency = result.latency.unwrap_or(result.elapsed);
        (
            true,
            format!("{} check succeeded, latency: {:?}", result.kind, latency),
        )
    } else {
        (false, result.error_text().to_string())
    }
}

/// Outcome of one task execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskResult {
    pub task_id: String,
    pub task_name: String,
    pub success: bool,
    #[serde(rename = "check_type")]
    pub check_kind: ProbeKind,
    pub target: String,
    pub message: String,
    pub executed_at: DateTime<Utc>,
    pub webhook_sent: bool,
}

/// Body of a task webhook
#[derive(Debug, Clone, Serialize)]
pub struct TaskWebhookPayload<'a> {
    pub event: &'static str,
    pub task_id: &'a str,
    pub task_name: &'a str,
    pub check_type: ProbeKind,
    pub target: &'a str,
    pub available: bool,
    pub message: &'a str,
    pub custom_data: &'a BTreeMap<String, String>,
    pub executed_at: DateTime<Utc>,
    pub timestamp: i64,
}

impl<'a> TaskWebhookPayload<'a> {
    pub fn new(task: &'a ScheduledTask, available: bool, message: &'a str, executed_at: DateTime<Utc>) -> Self {
        Self {
            event: SCHEDULE_CHECK_EVENT,
            task_id: &task.id,
            task_name: &task.name,
            check_type: task.check_kind,
            target: &task.target,
            available,
            message,
            custom_data: &task.webhook_custom_data,
            executed_at,
            timestamp: executed_at.timestamp(),
        }
    }
}
