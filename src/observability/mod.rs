// src/observability/mod.rs
//! Logging and metrics setup for the daemon
//!
//! The library only emits through `tracing` and `metrics` macros; installing
//! a subscriber and a recorder is left to the binary.

use crate::utils::config::ObservabilitySettings;
use crate::utils::errors::{EngineError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `settings.log_filter`.
pub fn init_tracing(settings: &ObservabilitySettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .map_err(|e| EngineError::ObservabilityError(format!("Invalid log filter: {}", e)))?;

    let registry = Registry::default().with(filter);
    let installed = if settings.json_logs {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    installed.map_err(|e| EngineError::ObservabilityError(e.to_string()))
}

/// Install the Prometheus recorder and its scrape endpoint
///
/// Does nothing when `metrics_addr` is unset.
pub fn init_metrics(settings: &ObservabilitySettings) -> Result<()> {
    let Some(addr) = settings.metrics_addr.as_deref() else {
        info!("Metrics exporter disabled");
        return Ok(());
    };

    let addr = parse_metrics_addr(addr)?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| EngineError::ObservabilityError(e.to_string()))?;

    info!("Prometheus metrics served on http://{}/metrics", addr);
    Ok(())
}

fn parse_metrics_addr(addr: &str) -> Result<SocketAddr> {
    addr.parse()
        .map_err(|e| EngineError::ObservabilityError(format!("Invalid metrics address {}: {}", addr, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_addr_parsing() {
        assert_eq!(
            parse_metrics_addr("127.0.0.1:9464").unwrap().port(),
            9464
        );
        assert!(matches!(
            parse_metrics_addr("not-an-address"),
            Err(EngineError::ObservabilityError(_))
        ));
    }

    #[test]
    fn test_disabled_metrics_is_noop() {
        let settings = ObservabilitySettings {
            metrics_addr: None,
            ..Default::default()
        };
        assert!(init_metrics(&settings).is_ok());
    }
}
