//! Tracing setup with optional OpenTelemetry export.

use crate::config::{LoggingSettings, TelemetrySettings};
use common::logging::{LogBuffer, LogBufferLayer, init_with_buffer};
use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource, runtime,
    trace::{RandomIdGenerator, Sampler, Tracer, TracerProvider},
};
use std::sync::Arc;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// OpenTelemetry tracer guard
///
/// When dropped, flushes all pending spans and shuts down the tracer
pub struct TelemetryGuard {
    provider: TracerProvider,
}

impl TelemetryGuard {
    pub fn provider(&self) -> &TracerProvider {
        &self.provider
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(e) = self.provider.shutdown() {
            eprintln!("Failed to shut down tracer provider: {e}");
        }
    }
}

/// Tracing layer exporting spans through `provider`
pub fn otel_layer<S>(provider: &TracerProvider, service_name: &str) -> OpenTelemetryLayer<S, Tracer>
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span>,
{
    tracing_opentelemetry::layer().with_tracer(provider.tracer(service_name.to_string()))
}

/// Build the OTLP (gRPC) tracer provider and install it globally. Returns
/// `None` when disabled.
pub async fn init_telemetry(
    service_name: &str,
    otlp_endpoint: &str,
    enabled: bool,
) -> Result<Option<TelemetryGuard>, Box<dyn std::error::Error>> {
    if !enabled {
        return Ok(None);
    }

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(otlp_endpoint)
        .build()?;

    let resource = Resource::new(vec![
        KeyValue::new("service.name", service_name.to_string()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION").to_string()),
    ]);

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .build();
    opentelemetry::global::set_tracer_provider(provider.clone());
    Ok(Some(TelemetryGuard { provider }))
}

/// Install the global subscriber: env filter, console output, the log
/// buffer and, when enabled, OpenTelemetry span export.
///
/// `RUST_LOG` overrides the configured level.
pub async fn setup_tracing_with_otel(
    telemetry: &TelemetrySettings,
    logging: &LoggingSettings,
    buffer: Arc<LogBuffer>,
) -> Result<Option<TelemetryGuard>, Box<dyn std::error::Error>> {
    let level = logging.level.as_deref().unwrap_or("info");
    let json = logging.format.as_deref() == Some("json");

    if !telemetry.enabled {
        init_with_buffer(level, json, buffer);
        tracing::info!("Tracing initialized without OpenTelemetry");
        return Ok(None);
    }

    let Some(guard) = init_telemetry(&telemetry.service_name, &telemetry.otlp_endpoint, true).await?
    else {
        return Ok(None);
    };
    let tracer_layer = otel_layer(guard.provider(), &telemetry.service_name);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(LogBufferLayer::new(buffer))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .with(tracer_layer)
        .init();

    tracing::info!(
        service_name = %telemetry.service_name,
        otlp_endpoint = %telemetry.otlp_endpoint,
        "Tracing initialized with OpenTelemetry integration"
    );
    Ok(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_telemetry_disabled() {
        let result = init_telemetry("test-service", "http://localhost:4317", false).await;
        assert!(result.is_ok());
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_otel_layer_records_spans() {
        let provider = TracerProvider::builder().build();
        let subscriber = tracing_subscriber::registry().with(otel_layer(&provider, "test-service"));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("tick", targets = 2);
            let _entered = span.enter();
            tracing::info!("inside span");
        });
        assert!(provider.shutdown().is_ok());
    }
}
