//! Tracing and metrics initialization.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{AppConfig, LogFormat};
use crate::error::{AppError, Result};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured filter when both are set. Fails if a
/// subscriber is already installed.
pub fn init_tracing(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .map_err(|e| AppError::Config(format!("RUST_LOG: {e}")))?;

    let json = config.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_target(false)))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .try_init()
        .map_err(|e| AppError::Telemetry(e.to_string()))
}

/// Installs the Prometheus recorder and returns the handle used to render
/// the scrape output.
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::Telemetry(e.to_string()))
}
