// src/pools/mod.rs
//! Resource pools and auto-scaling
//!
//! A pool groups resources of one type under a shared selection strategy,
//! scaling policy and QoS policy.
//!
//! # Architecture
//!
//! ```text
//! ResourcePool
//! ├─ Members: [res_A, res_B, ...]      (same ResourceType)
//! ├─ Scaling: min/max, thresholds, cooldown, metrics
//! ├─ QoS: guarantees, objectives, violation policy
//! └─ Statistics: refreshed by the monitoring tick
//! ```
//!
//! Scaling evaluation only emits decisions; provisioning is external.

pub mod pool;
pub mod scaling;

pub use pool::{PoolId, PoolStatistics, ResourcePool, ScalingConfig, ScalingMetric};
pub use scaling::{PoolMetrics, ScalingDecision, ScalingDirection};
