//! DNS failover daemon binary

use common::logging::LogBuffer;
use failover_engine::{Config, FailoverDaemon, setup_tracing_with_otel};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tracing is not initialized until the config is known
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return Err(e.into());
        }
    };

    let logs = Arc::new(LogBuffer::new(config.logging.buffer_size));
    let _telemetry_guard =
        setup_tracing_with_otel(&config.telemetry, &config.logging, logs.clone()).await?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "DNS failover starting");

    let daemon = FailoverDaemon::new(config, logs).await?;
    daemon.run().await?;

    // Telemetry guard flushes spans on drop
    Ok(())
}
