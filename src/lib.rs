// src/lib.rs
//! Agent Resource Engine Library
//!
//! Allocation and scheduling of compute resources for pools of autonomous
//! agents: a resource registry, strategy-driven placement, a two-phase
//! reservation/allocation lifecycle, auto-scaling pools, QoS monitoring and
//! usage forecasting.
//!
//! # Architecture
//!
//! - **resources**: Resource model, capacity vectors, requirements, registry
//! - **scheduling**: Suitability scoring and placement strategies
//! - **allocation**: Reservation and allocation state machine
//! - **pools**: Resource pools and auto-scaling decisions
//! - **monitoring**: Usage ingestion, statistics, QoS checks, cleanup
//! - **prediction**: Linear-trend usage forecasts and recommendations
//! - **events**: Engine events and the subscriber bus
//! - **manager**: `ResourceManager` facade and periodic tasks
//! - **observability**: Tracing and Prometheus setup for the daemon
//! - **utils**: Configuration and error types

pub mod allocation;
pub mod events;
pub mod manager;
pub mod monitoring;
pub mod observability;
pub mod pools;
pub mod prediction;
pub mod resources;
pub mod scheduling;
pub mod utils;

// Re-export commonly used types
pub use allocation::{RequestOptions, ResourceAllocation, ResourceReservation};
pub use events::{EngineEvent, EventKind};
pub use manager::ResourceManager;
pub use resources::{
    ResourceLimits, ResourceMetadata, ResourceRequirements, ResourceSpec, ResourceType,
    UsageSnapshot,
};
pub use scheduling::{AllocationStrategy, Priority};
pub use utils::config::{EngineConfig, EngineSettings};
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Engine build information
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_build_info() {
        let info = BuildInfo::current();
        assert_eq!(info.version, VERSION);
        assert!(!info.git_hash.is_empty());
    }
}
