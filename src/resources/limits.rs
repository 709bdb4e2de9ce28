// src/resources/limits.rs
//! Multi-dimensional capacity figures
//!
//! [`ResourceLimits`] is used for a resource's capacity, its allocated
//! amount and its available amount. All dimensions are non-negative:
//! - CPU in cores (fractional)
//! - Memory and disk in bytes
//! - Network bandwidth in bytes/sec
//! - Custom named units (GPU slots, licences, ...)

use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

/// A single capacity dimension
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Cpu,
    Memory,
    Disk,
    Network,
    Custom(String),
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Cpu => write!(f, "cpu"),
            Dimension::Memory => write!(f, "memory"),
            Dimension::Disk => write!(f, "disk"),
            Dimension::Network => write!(f, "network"),
            Dimension::Custom(name) => write!(f, "custom:{}", name),
        }
    }
}

/// Capacity across all dimensions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// CPU cores
    pub cpu: f64,

    /// Memory in bytes
    pub memory: u64,

    /// Disk in bytes
    pub disk: u64,

    /// Network bandwidth in bytes/sec
    pub network: u64,

    /// Named custom units
    pub custom: HashMap<String, f64>,
}

impl ResourceLimits {
    /// All-zero limits
    pub fn zero() -> Self {
        Self::default()
    }

    /// CPU + memory, the common case for compute nodes
    pub fn new(cpu: f64, memory: u64) -> Self {
        Self {
            cpu,
            memory,
            ..Default::default()
        }
    }

    pub fn with_disk(mut self, disk: u64) -> Self {
        self.disk = disk;
        self
    }

    pub fn with_network(mut self, network: u64) -> Self {
        self.network = network;
        self
    }

    pub fn with_custom(mut self, name: impl Into<String>, amount: f64) -> Self {
        self.custom.insert(name.into(), amount);
        self
    }

    /// Custom dimension value, zero when absent
    pub fn custom_value(&self, name: &str) -> f64 {
        self.custom.get(name).copied().unwrap_or(0.0)
    }

    /// Value of one dimension as f64
    pub fn get(&self, dimension: &Dimension) -> f64 {
        match dimension {
            Dimension::Cpu => self.cpu,
            Dimension::Memory => self.memory as f64,
            Dimension::Disk => self.disk as f64,
            Dimension::Network => self.network as f64,
            Dimension::Custom(name) => self.custom_value(name),
        }
    }

    /// All dimensions with their values (custom keys in sorted order)
    pub fn dimensions(&self) -> Vec<(Dimension, f64)> {
        let mut dims = vec![
            (Dimension::Cpu, self.cpu),
            (Dimension::Memory, self.memory as f64),
            (Dimension::Disk, self.disk as f64),
            (Dimension::Network, self.network as f64),
        ];

        let mut custom: Vec<_> = self.custom.iter().collect();
        custom.sort_by(|a, b| a.0.cmp(b.0));
        dims.extend(
            custom
                .into_iter()
                .map(|(name, value)| (Dimension::Custom(name.clone()), *value)),
        );

        dims
    }

    /// True when every dimension is zero
    pub fn is_zero(&self) -> bool {
        self.dimensions().iter().all(|(_, value)| *value == 0.0)
    }

    /// Per-dimension sum
    pub fn add(&self, other: &ResourceLimits) -> ResourceLimits {
        let mut custom = self.custom.clone();
        for (name, amount) in &other.custom {
            *custom.entry(name.clone()).or_insert(0.0) += amount;
        }

        ResourceLimits {
            cpu: self.cpu + other.cpu,
            memory: self.memory.saturating_add(other.memory),
            disk: self.disk.saturating_add(other.disk),
            network: self.network.saturating_add(other.network),
            custom,
        }
    }

    /// Per-dimension difference, clamped at zero
    pub fn saturating_sub(&self, other: &ResourceLimits) -> ResourceLimits {
        let custom = self
            .custom
            .iter()
            .map(|(name, amount)| (name.clone(), (amount - other.custom_value(name)).max(0.0)))
            .collect();

        ResourceLimits {
            cpu: (self.cpu - other.cpu).max(0.0),
            memory: self.memory.saturating_sub(other.memory),
            disk: self.disk.saturating_sub(other.disk),
            network: self.network.saturating_sub(other.network),
            custom,
        }
    }

    /// Per-dimension minimum against `ceiling`
    ///
    /// Custom keys missing from `ceiling` clamp to zero.
    pub fn clamp_to(&self, ceiling: &ResourceLimits) -> ResourceLimits {
        let custom = self
            .custom
            .iter()
            .map(|(name, amount)| (name.clone(), amount.min(ceiling.custom_value(name))))
            .collect();

        ResourceLimits {
            cpu: self.cpu.min(ceiling.cpu),
            memory: self.memory.min(ceiling.memory),
            disk: self.disk.min(ceiling.disk),
            network: self.network.min(ceiling.network),
            custom,
        }
    }

    /// True when no dimension exceeds the matching dimension of `other`
    pub fn fits_within(&self, other: &ResourceLimits) -> bool {
        const EPSILON: f64 = 1e-9;

        self.cpu <= other.cpu + EPSILON
            && self.memory <= other.memory
            && self.disk <= other.disk
            && self.network <= other.network
            && self
                .custom
                .iter()
                .all(|(name, amount)| *amount <= other.custom_value(name) + EPSILON)
    }

    /// Validate limits at the API boundary
    pub fn validate(&self) -> Result<()> {
        if !self.cpu.is_finite() || self.cpu < 0.0 {
            return Err(EngineError::Validation(format!(
                "CPU must be a non-negative number, got {}",
                self.cpu
            )));
        }

        for (name, amount) in &self.custom {
            if name.is_empty() {
                return Err(EngineError::Validation(
                    "Custom dimension name cannot be empty".to_string(),
                ));
            }
            if !amount.is_finite() || *amount < 0.0 {
                return Err(EngineError::Validation(format!(
                    "Custom dimension '{}' must be a non-negative number, got {}",
                    name, amount
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let limits = ResourceLimits::new(4.0, 8 * GIB)
            .with_disk(100 * GIB)
            .with_network(125 * MIB)
            .with_custom("gpu", 2.0);

        assert_eq!(limits.cpu, 4.0);
        assert_eq!(limits.memory, 8 * GIB);
        assert_eq!(limits.get(&Dimension::Disk), (100 * GIB) as f64);
        assert_eq!(limits.custom_value("gpu"), 2.0);
        assert_eq!(limits.custom_value("fpga"), 0.0);
    }

    #[test]
    fn test_saturating_sub_clamps_at_zero() {
        let capacity = ResourceLimits::new(2.0, GIB).with_custom("gpu", 1.0);
        let taken = ResourceLimits::new(3.0, 2 * GIB).with_custom("gpu", 4.0);

        let left = capacity.saturating_sub(&taken);
        assert_eq!(left.cpu, 0.0);
        assert_eq!(left.memory, 0);
        assert_eq!(left.custom_value("gpu"), 0.0);
    }

    #[test]
    fn test_add_merges_custom() {
        let a = ResourceLimits::new(1.0, GIB).with_custom("gpu", 1.0);
        let b = ResourceLimits::new(0.5, GIB).with_custom("tpu", 2.0);

        let sum = a.add(&b);
        assert_eq!(sum.cpu, 1.5);
        assert_eq!(sum.memory, 2 * GIB);
        assert_eq!(sum.custom_value("gpu"), 1.0);
        assert_eq!(sum.custom_value("tpu"), 2.0);
    }

    #[test]
    fn test_fits_within() {
        let capacity = ResourceLimits::new(4.0, 8 * GIB);
        assert!(ResourceLimits::new(4.0, 8 * GIB).fits_within(&capacity));
        assert!(!ResourceLimits::new(4.5, GIB).fits_within(&capacity));
        assert!(!ResourceLimits::zero().with_custom("gpu", 1.0).fits_within(&capacity));
    }

    #[test]
    fn test_clamp_to() {
        let wanted = ResourceLimits::new(6.0, GIB).with_custom("gpu", 2.0);
        let ceiling = ResourceLimits::new(4.0, 8 * GIB).with_custom("gpu", 1.0);

        let clamped = wanted.clamp_to(&ceiling);
        assert_eq!(clamped.cpu, 4.0);
        assert_eq!(clamped.memory, GIB);
        assert_eq!(clamped.custom_value("gpu"), 1.0);
    }

    #[test]
    fn test_validation() {
        assert!(ResourceLimits::new(4.0, GIB).validate().is_ok());
        assert!(ResourceLimits::new(-1.0, GIB).validate().is_err());
        assert!(ResourceLimits::new(f64::NAN, GIB).validate().is_err());
        assert!(ResourceLimits::zero().with_custom("gpu", -2.0).validate().is_err());
        assert!(ResourceLimits::zero().with_custom("", 1.0).validate().is_err());
    }

    #[test]
    fn test_dimensions_order() {
        let limits = ResourceLimits::zero().with_custom("b", 1.0).with_custom("a", 2.0);
        let names: Vec<String> = limits.dimensions().iter().map(|(d, _)| d.to_string()).collect();
        assert_eq!(names, vec!["cpu", "memory", "disk", "network", "custom:a", "custom:b"]);
        assert!(ResourceLimits::zero().is_zero());
    }
}
