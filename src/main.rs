// src/main.rs
//! Agent Resource Engine daemon
//!
//! Loads configuration, registers the resource inventory and runs the
//! engine's periodic tasks until interrupted.

use agent_resource_engine::observability::{init_metrics, init_tracing};
use agent_resource_engine::utils::config::{load_inventory, EngineConfig};
use agent_resource_engine::{BuildInfo, ResourceManager};
use anyhow::{Context, Result};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::load().context("Failed to load configuration")?;

    // Initialize observability (tracing, metrics)
    init_tracing(&config.observability)?;
    init_metrics(&config.observability)?;

    let build = BuildInfo::current();
    info!(
        "Starting Agent Resource Engine v{} ({})",
        build.version, build.git_hash
    );
    info!("Configuration loaded: {:?}", config.engine);

    let manager = ResourceManager::new(config.engine.clone());

    if let Some(path) = &config.inventory.path {
        let specs = load_inventory(path)
            .with_context(|| format!("Failed to load inventory {}", path.display()))?;
        info!("Registering {} resource(s) from {}", specs.len(), path.display());

        for spec in specs {
            let name = spec.name.clone();
            if let Err(e) = manager.register(spec) {
                warn!("Skipping resource {}: {}", name, e);
            }
        }
    }

    manager.start()?;

    // Graceful shutdown handler
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal, cleaning up..."),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    let released = manager.shutdown().await?;
    info!("Engine stopped gracefully ({} allocation(s) released)", released);
    Ok(())
}
