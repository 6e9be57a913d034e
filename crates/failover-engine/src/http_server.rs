//! HTTP status server: metrics, target health, scheduled tasks and recent logs.

use crate::error::TaskError;
use crate::metrics::MetricsRegistry;
use crate::runner::TaskRunner;
use crate::scheduler::ProbeScheduler;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use common::logging::LogBuffer;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Lines returned by `GET /logs` without a limit
pub const DEFAULT_LOG_LIMIT: usize = 100;

/// Handles shared by every route
#[derive(Clone)]
pub struct StatusState {
    pub scheduler: Arc<ProbeScheduler>,
    pub runner: TaskRunner,
    pub logs: Arc<LogBuffer>,
    pub metrics: Option<Arc<MetricsRegistry>>,
}

/// HTTP server for status reporting
pub struct StatusServer {
    state: StatusState,
    listen_addr: String,
}

impl StatusServer {
    pub fn new(state: StatusState, listen_addr: String) -> Self {
        Self { state, listen_addr }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Run the HTTP server
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.router();
        let listener = TcpListener::bind(&self.listen_addr).await?;
        info!(listen_addr = %self.listen_addr, "Status server listening");

        axum::serve(listener, app).await?;
        Ok(())
    }
}

fn router(state: StatusState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/status", get(status_handler))
        .route("/tasks", get(tasks_handler))
        .route("/tasks/:id/run", post(run_task_handler))
        .route("/logs", get(logs_handler))
        .route("/logs/clear", post(clear_logs_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn metrics_handler(State(state): State<StatusState>) -> Response {
    let Some(metrics) = state.metrics else {
        return (StatusCode::NOT_FOUND, "metrics disabled").into_response();
    };

    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn status_handler(State(state): State<StatusState>) -> Response {
    Json(json!({
        "running": state.scheduler.is_running(),
        "mode": state.scheduler.mode(),
        "targets": state.scheduler.snapshot(),
        "tasks": state.runner.task_count(),
    }))
    .into_response()
}

async fn tasks_handler(State(state): State<StatusState>) -> Response {
    Json(state.runner.list_tasks()).into_response()
}

async fn run_task_handler(State(state): State<StatusState>, Path(id): Path<String>) -> Response {
    match state.runner.run_task_now(&id).await {
        Ok(result) => Json(result).into_response(),
        Err(e @ TaskError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    limit: Option<usize>,
}

async fn logs_handler(State(state): State<StatusState>, Query(query): Query<LogQuery>) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    Json(state.logs.entries(limit)).into_response()
}

async fn clear_logs_handler(State(state): State<StatusState>) -> StatusCode {
    state.logs.clear();
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertDispatcher, HttpTransport};
    use crate::config::{MonitorConfig, RemediationMode, WebhookSettings};
    use crate::task::ScheduledTask;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use chrono::Utc;
    use common::logging::LogEntry;
    use probe::{ProbeKind, ProbeSet};
    use tower::ServiceExt;

    fn state() -> StatusState {
        let transport = Arc::new(HttpTransport::new());
        let dispatcher = Arc::new(AlertDispatcher::new(transport.clone(), WebhookSettings::default()));
        let mut config = MonitorConfig::default();
        config.ping.targets = vec!["www.example.com".into()];
        let scheduler = ProbeScheduler::builder(RemediationMode::Alert, config, ProbeSet::new(), dispatcher).build();

        StatusState {
            scheduler: Arc::new(scheduler),
            runner: TaskRunner::new(ProbeSet::new(), transport, None, None),
            logs: Arc::new(LogBuffer::new(10)),
            metrics: Some(Arc::new(MetricsRegistry::new())),
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let app = router(state());
        let response = app
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["running"], false);
        assert_eq!(body["mode"], "alert");
        assert_eq!(body["targets"][0]["target"], "www.example.com");
        assert_eq!(body["targets"][0]["failure_count"], 0);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let state = state();
        state.metrics.as_ref().unwrap().set_target_counts(1, 0);
        let response = router(state)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("dns_failover_targets_monitored 1"));
    }

    #[tokio::test]
    async fn test_metrics_disabled() {
        let mut state = state();
        state.metrics = None;
        let response = router(state)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_run_task_endpoint() {
        let state = state();
        let task = ScheduledTask::new("t1", "local", "0 * * * *", ProbeKind::Tcp, "127.0.0.1").with_port(1);
        state.runner.add_task(task).await.unwrap();

        let response = router(state.clone())
            .oneshot(Request::post("/tasks/t1/run").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["task_id"], "t1");
        assert_eq!(body["success"], false);

        let response = router(state)
            .oneshot(Request::post("/tasks/missing/run").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_logs_endpoints() {
        let state = state();
        for i in 0..3 {
            state.logs.push(LogEntry {
                timestamp: Utc::now(),
                level: "INFO".into(),
                target: "test".into(),
                message: format!("line {}", i),
            });
        }

        let response = router(state.clone())
            .oneshot(Request::get("/logs?limit=2").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[1]["message"], "line 2");

        let response = router(state.clone())
            .oneshot(Request::post("/logs/clear").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.logs.is_empty());
    }
}
