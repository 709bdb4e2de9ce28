// src/utils/errors.rs
//! Error types for the resource engine
//!
//! Every fallible engine operation returns [`Result`]. Errors fall into four
//! families that callers are expected to branch on:
//!
//! - **Not found**: unknown resource, pool, reservation or allocation id
//! - **Capacity**: no registered resource can satisfy a request
//! - **State**: the operation is invalid for the entity's current status
//! - **Validation**: malformed input or a resource/pool type mismatch

use thiserror::Error;

/// Engine result alias
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource pool not found: {0}")]
    PoolNotFound(String),

    #[error("Reservation not found: {0}")]
    ReservationNotFound(String),

    #[error("Allocation not found: {0}")]
    AllocationNotFound(String),

    #[error("Insufficient capacity: {0}")]
    InsufficientCapacity(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Observability setup failed: {0}")]
    ObservabilityError(String),
}

impl EngineError {
    /// True for any of the unknown-id variants
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::ResourceNotFound(_)
                | EngineError::PoolNotFound(_)
                | EngineError::ReservationNotFound(_)
                | EngineError::AllocationNotFound(_)
        )
    }

    pub fn is_capacity(&self) -> bool {
        matches!(self, EngineError::InsufficientCapacity(_))
    }

    pub fn is_state(&self) -> bool {
        matches!(self, EngineError::InvalidState(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Validation(_))
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::ConfigError(err.to_string())
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::ConfigError(format!("Invalid YAML: {}", err))
    }
}
