//! Down and recovery alerts over webhooks

use crate::config::WebhookSettings;
use crate::error::DeliveryError;
use async_trait::async_trait;
use parking_lot::RwLock;
use probe::ProbeKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Alert type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Down,
    Recovery,
}

/// Alert record, serialized as the webhook body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub probe_type: ProbeKind,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unix seconds
    pub timestamp: i64,
    pub message: String,
}

impl Alert {
    pub fn down(
        probe_type: ProbeKind,
        target: &str,
        fail_count: u32,
        threshold: u32,
        error: &str,
    ) -> Self {
        Self {
            kind: AlertKind::Down,
            probe_type,
            target: target.to_string(),
            fail_count: Some(fail_count),
            threshold: Some(threshold),
            error: Some(error.to_string()),
            timestamp: chrono::Utc::now().timestamp(),
            message: format!(
                "[{}] {} failed {} consecutive checks (threshold: {}): {}",
                probe_type, target, fail_count, threshold, error
            ),
        }
    }

    pub fn recovery(probe_type: ProbeKind, target: &str) -> Self {
        Self {
            kind: AlertKind::Recovery,
            probe_type,
            target: target.to_string(),
            fail_count: None,
            threshold: None,
            error: None,
            timestamp: chrono::Utc::now().timestamp(),
            message: format!("[{}] {} has recovered", probe_type, target),
        }
    }
}

/// A single outbound HTTP call
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
    pub body: Vec<u8>,
}

/// Notification transport collaborator. Returns the response status code;
/// non-2xx responses are errors.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn deliver(&self, request: DeliveryRequest) -> Result<u16, DeliveryError>;
}

/// [`NotificationTransport`] over `reqwest`
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationTransport for HttpTransport {
    async fn deliver(&self, request: DeliveryRequest) -> Result<u16, DeliveryError> {
        let method = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| DeliveryError::InvalidMethod(request.method.clone()))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.body(request.body).send().await?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(DeliveryError::Status(status));
        }
        Ok(status)
    }
}

/// What happened to an alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Accepted with this status code
    Delivered(u16),
    /// No webhook URL configured
    Skipped,
    /// Delivery attempted and failed
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered(_))
    }
}

/// Formats alerts and hands them to the transport. Delivery failures are
/// logged and reported in the outcome, never raised.
pub struct AlertDispatcher {
    transport: Arc<dyn NotificationTransport>,
    settings: RwLock<WebhookSettings>,
}

impl AlertDispatcher {
    pub fn new(transport: Arc<dyn NotificationTransport>, settings: WebhookSettings) -> Self {
        Self {
            transport,
            settings: RwLock::new(settings),
        }
    }

    /// Replace the webhook settings used for later alerts
    pub fn update_settings(&self, settings: WebhookSettings) {
        *self.settings.write() = settings;
    }

    pub fn settings(&self) -> WebhookSettings {
        self.settings.read().clone()
    }

    pub async fn send_down(
        &self,
        probe_type: ProbeKind,
        target: &str,
        fail_count: u32,
        threshold: u32,
        error: &str,
    ) -> DeliveryOutcome {
        self.send(&Alert::down(probe_type, target, fail_count, threshold, error))
            .await
    }

    pub async fn send_recovery(&self, probe_type: ProbeKind, target: &str) -> DeliveryOutcome {
        self.send(&Alert::recovery(probe_type, target)).await
    }

    pub async fn send(&self, alert: &Alert) -> DeliveryOutcome {
        let settings = self.settings();
        if settings.url.is_empty() {
            warn!(target = %alert.target, kind = ?alert.kind, "Webhook URL not configured, alert not sent");
            return DeliveryOutcome::Skipped;
        }

        let body = match serde_json::to_vec(alert) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "Failed to encode alert");
                return DeliveryOutcome::Failed(e.to_string());
            }
        };

        debug!(url = %settings.url, method = %settings.method, message = %alert.message, "Sending alert");
        let request = DeliveryRequest {
            url: settings.url,
            method: settings.method,
            headers: settings.headers,
            timeout: settings.timeout,
            body,
        };

        match self.transport.deliver(request).await {
            Ok(status) => {
                info!(target = %alert.target, kind = ?alert.kind, status, "Alert delivered");
                DeliveryOutcome::Delivered(status)
            }
            Err(e) => {
                error!(target = %alert.target, kind = ?alert.kind, error = %e, "Alert delivery failed");
                DeliveryOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<DeliveryRequest>>,
        status: Option<u16>,
    }

    #[async_trait]
    impl NotificationTransport for Recorder {
        async fn deliver(&self, request: DeliveryRequest) -> Result<u16, DeliveryError> {
            self.requests.lock().push(request);
            match self.status {
                Some(code) if (200..300).contains(&code) => Ok(code),
                Some(code) => Err(DeliveryError::Status(code)),
                None => Ok(200),
            }
        }
    }

    fn settings(url: &str) -> WebhookSettings {
        WebhookSettings {
            url: url.to_string(),
            ..WebhookSettings::default()
        }
    }

    #[test]
    fn test_down_alert_json() {
        let alert = Alert::down(ProbeKind::Tcp, "db.example.com:5432", 3, 3, "connection refused");
        let value = serde_json::to_value(&alert).unwrap();

        assert_eq!(value["type"], "down");
        assert_eq!(value["probe_type"], "tcp");
        assert_eq!(value["fail_count"], 3);
        assert_eq!(value["threshold"], 3);
        assert_eq!(value["error"], "connection refused");
        assert_eq!(
            value["message"],
            "[TCP] db.example.com:5432 failed 3 consecutive checks (threshold: 3): connection refused"
        );
    }

    #[test]
    fn test_recovery_alert_omits_failure_fields() {
        let alert = Alert::recovery(ProbeKind::Http, "https://example.com");
        let value = serde_json::to_value(&alert).unwrap();

        assert_eq!(value["type"], "recovery");
        assert!(value.get("fail_count").is_none());
        assert!(value.get("error").is_none());
        assert_eq!(value["message"], "[HTTP] https://example.com has recovered");
    }

    #[tokio::test]
    async fn test_dispatch_uses_configured_request() {
        let transport = Arc::new(Recorder::default());
        let mut webhook = settings("https://hooks.example.com/a");
        webhook.method = "PUT".to_string();
        webhook.headers.insert("X-Token".into(), "secret".into());
        let dispatcher = AlertDispatcher::new(transport.clone(), webhook);

        let outcome = dispatcher.send_recovery(ProbeKind::Ping, "a.example.com").await;

        assert_eq!(outcome, DeliveryOutcome::Delivered(200));
        let requests = transport.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "PUT");
        assert_eq!(requests[0].headers["X-Token"], "secret");
        assert_eq!(requests[0].timeout, Duration::from_secs(10));
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["target"], "a.example.com");
    }

    #[tokio::test]
    async fn test_missing_url_skips_delivery() {
        let transport = Arc::new(Recorder::default());
        let dispatcher = AlertDispatcher::new(transport.clone(), settings(""));

        let outcome = dispatcher
            .send_down(ProbeKind::Ping, "a", 3, 3, "timeout")
            .await;

        assert_eq!(outcome, DeliveryOutcome::Skipped);
        assert!(transport.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delivery_is_reported_not_raised() {
        let transport = Arc::new(Recorder {
            status: Some(503),
            ..Recorder::default()
        });
        let dispatcher = AlertDispatcher::new(transport, settings("https://hooks.example.com"));

        let outcome = dispatcher
            .send_down(ProbeKind::Ping, "a", 3, 3, "timeout")
            .await;

        assert_eq!(outcome, DeliveryOutcome::Failed("unexpected response status: 503".into()));
    }

    #[tokio::test]
    async fn test_update_settings() {
        let transport = Arc::new(Recorder::default());
        let dispatcher = AlertDispatcher::new(transport.clone(), settings(""));
        dispatcher.update_settings(settings("https://hooks.example.com/new"));

        dispatcher.send_recovery(ProbeKind::Ping, "a").await;

        assert_eq!(transport.requests.lock()[0].url, "https://hooks.example.com/new");
    }
}
