// src/utils/config.rs
//! Engine configuration
//!
//! Configuration is layered, later sources overriding earlier ones:
//!
//! 1. Built-in defaults ([`EngineConfig::default`])
//! 2. Optional config file (`RESOURCE_ENGINE_CONFIG`, else `config/engine.*`)
//! 3. Environment variables, e.g. `RESOURCE_ENGINE_ENGINE__CLEANUP_INTERVAL_MS=5000`

use crate::resources::ResourceSpec;
use crate::scheduling::AllocationStrategy;
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "RESOURCE_ENGINE";
const CONFIG_PATH_VAR: &str = "RESOURCE_ENGINE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/engine";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: EngineSettings,
    pub observability: ObservabilitySettings,
    pub inventory: InventorySettings,
}

/// Allocation engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Lifetime of a reservation when the request gives no timeout
    pub default_reservation_timeout_ms: u64,

    /// Monitoring + QoS tick
    pub monitoring_interval_ms: u64,

    /// Reservation expiry + history pruning tick
    pub cleanup_interval_ms: u64,

    /// Auto-scaling evaluation tick
    pub scaling_interval_ms: u64,

    /// Minimum time between two scaling decisions for the same pool
    pub scaling_cooldown_ms: u64,

    /// Samples kept per resource
    pub usage_history_limit: usize,

    /// Samples older than this are pruned by cleanup
    pub usage_retention_hours: i64,

    /// Strategy used when neither the request nor a pool names one
    pub default_strategy: AllocationStrategy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_reservation_timeout_ms: 300_000, // 5 minutes
            monitoring_interval_ms: 30_000,
            cleanup_interval_ms: 60_000,
            scaling_interval_ms: 60_000,
            scaling_cooldown_ms: 300_000,
            usage_history_limit: 1_000,
            usage_retention_hours: 24,
            default_strategy: AllocationStrategy::Balanced,
        }
    }
}

impl EngineSettings {
    pub fn default_reservation_timeout(&self) -> Duration {
        Duration::from_millis(self.default_reservation_timeout_ms)
    }

    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_millis(self.monitoring_interval_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn scaling_interval(&self) -> Duration {
        Duration::from_millis(self.scaling_interval_ms)
    }

    pub fn scaling_cooldown(&self) -> Duration {
        Duration::from_millis(self.scaling_cooldown_ms)
    }
}

/// Logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilitySettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_filter: String,

    /// Emit logs as JSON lines
    pub json_logs: bool,

    /// Prometheus scrape endpoint; disabled when `None`
    pub metrics_addr: Option<String>,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            json_logs: false,
            metrics_addr: Some("0.0.0.0:9464".to_string()),
        }
    }
}

/// Resources registered when the daemon starts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InventorySettings {
    /// YAML file holding a list of resource specs
    pub path: Option<PathBuf>,
}

impl EngineConfig {
    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// Load configuration using `path` as the (optional) config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let defaults = config::Config::try_from(&EngineConfig::default())?;

        let config: EngineConfig = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name(&path.to_string_lossy()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the periodic loops cannot run with
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;

        for (name, value) in [
            ("monitoring_interval_ms", engine.monitoring_interval_ms),
            ("cleanup_interval_ms", engine.cleanup_interval_ms),
            ("scaling_interval_ms", engine.scaling_interval_ms),
            ("default_reservation_timeout_ms", engine.default_reservation_timeout_ms),
        ] {
            if value == 0 {
                return Err(EngineError::ConfigError(format!("{} must be positive", name)));
            }
        }

        if engine.usage_history_limit == 0 {
            return Err(EngineError::ConfigError(
                "usage_history_limit must be positive".to_string(),
            ));
        }

        if engine.usage_retention_hours <= 0 {
            return Err(EngineError::ConfigError(
                "usage_retention_hours must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse a resource inventory file
pub fn load_inventory(path: &Path) -> Result<Vec<ResourceSpec>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        EngineError::ConfigError(format!("Failed to read inventory {}: {}", path.display(), e))
    })?;

    let specs: Vec<ResourceSpec> = serde_yaml::from_str(&raw)?;
    Ok(specs)
}
