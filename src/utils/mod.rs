// src/utils/mod.rs
//! Common utilities: error types and configuration

pub mod config;
pub mod errors;

pub use self::config::{EngineConfig, EngineSettings, ObservabilitySettings};
pub use self::errors::{EngineError, Result};
