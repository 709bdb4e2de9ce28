// src/monitoring/mod.rs
//! Monitoring, QoS and cleanup
//!
//! Everything here runs from the engine's periodic tasks (or on demand in
//! tests) against the shared tables:
//!
//! - **Usage**: snapshot ingestion into a capped per-resource history
//! - **Statistics**: performance scores, pool aggregates, engine-wide figures
//! - **QoS**: guarantee checks with severity classification and a
//!   remediation extension point
//! - **Cleanup**: reservation expiry and history retention

pub mod cleanup;
pub mod qos;
pub mod statistics;
pub mod usage;

pub use cleanup::CleanupReport;
pub use qos::{
    LoggingRemediation, QosConfig, QosGuarantee, QosMetric, QosObjective, QosOperator,
    QosViolation, RemediationHook, RemediationRequest, Severity, ViolationPolicy,
};
pub use statistics::ManagerStatistics;
