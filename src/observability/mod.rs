//! # Observability Infrastructure
//!
//! Structured logging and Prometheus metrics for the authentication core.

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{init_metrics, MetricsRecorder};

use crate::config::ObservabilityConfig;
use crate::errors::Result;
use ::tracing::info;

/// Initialize logging and, when enabled, the metrics exporter.
pub async fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    init_logging(config)?;

    if config.enable_metrics {
        init_metrics(config).await?;
    }

    info!(
        log_level = %config.log_level,
        json_logs = config.json_logs,
        metrics_enabled = config.enable_metrics,
        "Observability initialized"
    );

    Ok(())
}
