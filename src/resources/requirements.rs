// src/resources/requirements.rs
//! What a request needs from a resource

use crate::resources::limits::ResourceLimits;
use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Numeric types a dimension spec can be expressed in
pub trait Quantity: Copy + PartialOrd + Default {
    fn as_f64(self) -> f64;
}

impl Quantity for f64 {
    fn as_f64(self) -> f64 {
        self
    }
}

impl Quantity for u64 {
    fn as_f64(self) -> f64 {
        self as f64
    }
}

/// Requirement for one dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSpec<T> {
    pub min: T,

    #[serde(default)]
    pub max: Option<T>,

    /// Amount actually allocated when available (falls back to `min`)
    #[serde(default)]
    pub preferred: Option<T>,

    #[serde(default)]
    pub unit: Option<String>,

    #[serde(default)]
    pub shared: bool,

    /// Exclusive use of the whole resource
    #[serde(default)]
    pub exclusive: bool,
}

impl<T: Quantity> DimensionSpec<T> {
    pub fn at_least(min: T) -> Self {
        Self {
            min,
            max: None,
            preferred: None,
            unit: None,
            shared: false,
            exclusive: false,
        }
    }

    pub fn preferred(mut self, preferred: T) -> Self {
        self.preferred = Some(preferred);
        self
    }

    pub fn max(mut self, max: T) -> Self {
        self.max = Some(max);
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// `preferred`, else `min`
    pub fn desired(&self) -> T {
        self.preferred.unwrap_or(self.min)
    }

    fn validate(&self, name: &str) -> Result<()> {
        let min = self.min.as_f64();
        if !min.is_finite() || min < 0.0 {
            return Err(EngineError::Validation(format!(
                "{}: minimum must be a non-negative number, got {}",
                name, min
            )));
        }

        for (label, bound) in [("maximum", self.max), ("preferred", self.preferred)] {
            if let Some(bound) = bound {
                if !bound.as_f64().is_finite() {
                    return Err(EngineError::Validation(format!(
                        "{}: {} must be a finite number, got {}",
                        name,
                        label,
                        bound.as_f64()
                    )));
                }
            }
        }

        if let Some(max) = self.max {
            if max < self.min {
                return Err(EngineError::Validation(format!(
                    "{}: maximum {} is below minimum {}",
                    name,
                    max.as_f64(),
                    min
                )));
            }
        }

        if let Some(preferred) = self.preferred {
            if preferred < self.min || self.max.map_or(false, |max| preferred > max) {
                return Err(EngineError::Validation(format!(
                    "{}: preferred {} is outside [min, max]",
                    name,
                    preferred.as_f64()
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConstraint {
    /// Allowed locations (empty = any)
    pub include: Vec<String>,

    /// Forbidden locations
    pub exclude: Vec<String>,
}

impl LocationConstraint {
    pub fn allows(&self, location: Option<&str>) -> bool {
        if let Some(location) = location {
            if self.exclude.iter().any(|l| l == location) {
                return false;
            }
        }

        if self.include.is_empty() {
            return true;
        }

        location.map_or(false, |location| self.include.iter().any(|l| l == location))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequirementConstraints {
    pub location: Option<LocationConstraint>,

    /// Cost ceiling per hour
    pub max_cost: Option<f64>,

    /// The request is only valid inside this window
    pub time_window: Option<TimeWindow>,

    /// Ids of resources the workload depends on (informational)
    pub dependencies: Vec<String>,
}

/// Soft preferences, carried with the reservation for collaborators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub providers: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRequirements {
    pub cpu: Option<DimensionSpec<f64>>,
    pub memory: Option<DimensionSpec<u64>>,
    pub disk: Option<DimensionSpec<u64>>,
    pub network: Option<DimensionSpec<u64>>,
    pub custom: HashMap<String, DimensionSpec<f64>>,
    pub constraints: RequirementConstraints,
    pub preferences: Preferences,
}

impl ResourceRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require at least `cores` CPU cores
    pub fn cpu(mut self, cores: f64) -> Self {
        self.cpu = Some(DimensionSpec::at_least(cores));
        self
    }

    /// Require at least `bytes` of memory
    pub fn memory(mut self, bytes: u64) -> Self {
        self.memory = Some(DimensionSpec::at_least(bytes));
        self
    }

    pub fn disk(mut self, bytes: u64) -> Self {
        self.disk = Some(DimensionSpec::at_least(bytes));
        self
    }

    pub fn network(mut self, bytes_per_sec: u64) -> Self {
        self.network = Some(DimensionSpec::at_least(bytes_per_sec));
        self
    }

    pub fn custom(mut self, name: impl Into<String>, amount: f64) -> Self {
        self.custom.insert(name.into(), DimensionSpec::at_least(amount));
        self
    }

    pub fn cpu_spec(mut self, spec: DimensionSpec<f64>) -> Self {
        self.cpu = Some(spec);
        self
    }

    pub fn memory_spec(mut self, spec: DimensionSpec<u64>) -> Self {
        self.memory = Some(spec);
        self
    }

    pub fn max_cost(mut self, cost: f64) -> Self {
        self.constraints.max_cost = Some(cost);
        self
    }

    pub fn in_locations(mut self, locations: &[&str]) -> Self {
        let constraint = self.constraints.location.get_or_insert_with(Default::default);
        constraint.include.extend(locations.iter().map(|l| l.to_string()));
        self
    }

    pub fn excluding_locations(mut self, locations: &[&str]) -> Self {
        let constraint = self.constraints.location.get_or_insert_with(Default::default);
        constraint.exclude.extend(locations.iter().map(|l| l.to_string()));
        self
    }

    pub fn within(mut self, window: TimeWindow) -> Self {
        self.constraints.time_window = Some(window);
        self
    }

    /// Per-dimension minimums
    pub fn minimums(&self) -> ResourceLimits {
        self.collect(false)
    }

    /// Per-dimension `preferred ?? min`
    pub fn desired(&self) -> ResourceLimits {
        self.collect(true)
    }

    fn collect(&self, preferred: bool) -> ResourceLimits {
        fn pick<T: Quantity>(spec: &DimensionSpec<T>, preferred: bool) -> f64 {
            if preferred {
                spec.desired().as_f64()
            } else {
                spec.min.as_f64()
            }
        }

        ResourceLimits {
            cpu: self.cpu.as_ref().map_or(0.0, |s| pick(s, preferred)),
            memory: self.memory.as_ref().map_or(0, |s| pick(s, preferred) as u64),
            disk: self.disk.as_ref().map_or(0, |s| pick(s, preferred) as u64),
            network: self.network.as_ref().map_or(0, |s| pick(s, preferred) as u64),
            custom: self
                .custom
                .iter()
                .map(|(name, spec)| (name.clone(), pick(spec, preferred)))
                .collect(),
        }
    }

    /// Any dimension asks for exclusive use
    pub fn is_exclusive(&self) -> bool {
        self.cpu.as_ref().map_or(false, |s| s.exclusive)
            || self.memory.as_ref().map_or(false, |s| s.exclusive)
            || self.disk.as_ref().map_or(false, |s| s.exclusive)
            || self.network.as_ref().map_or(false, |s| s.exclusive)
            || self.custom.values().any(|s| s.exclusive)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(spec) = &self.cpu {
            spec.validate("cpu")?;
        }
        if let Some(spec) = &self.memory {
            spec.validate("memory")?;
        }
        if let Some(spec) = &self.disk {
            spec.validate("disk")?;
        }
        if let Some(spec) = &self.network {
            spec.validate("network")?;
        }
        for (name, spec) in &self.custom {
            if name.is_empty() {
                return Err(EngineError::Validation(
                    "Custom dimension name cannot be empty".to_string(),
                ));
            }
            spec.validate(name)?;
        }

        if let Some(cost) = self.constraints.max_cost {
            if !cost.is_finite() || cost < 0.0 {
                return Err(EngineError::Validation(format!(
                    "max_cost must be a non-negative number, got {}",
                    cost
                )));
            }
        }

        if let Some(window) = &self.constraints.time_window {
            if window.end < window.start {
                return Err(EngineError::Validation(
                    "time window ends before it starts".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::limits::GIB;
    use chrono::Duration;

    #[test]
    fn test_minimums_and_desired() {
        let req = ResourceRequirements::new()
            .cpu_spec(DimensionSpec::at_least(2.0).preferred(3.0))
            .memory(2 * GIB)
            .custom("gpu", 1.0);

        let min = req.minimums();
        assert_eq!(min.cpu, 2.0);
        assert_eq!(min.memory, 2 * GIB);
        assert_eq!(min.disk, 0);
        assert_eq!(min.custom_value("gpu"), 1.0);

        let desired = req.desired();
        assert_eq!(desired.cpu, 3.0);
        assert_eq!(desired.memory, 2 * GIB);
    }

    #[test]
    fn test_validation() {
        assert!(ResourceRequirements::new().cpu(1.0).validate().is_ok());
        assert!(ResourceRequirements::new().cpu(-1.0).validate().is_err());

        let bad_preferred = ResourceRequirements::new()
            .cpu_spec(DimensionSpec::at_least(2.0).max(4.0).preferred(8.0));
        assert!(bad_preferred.validate().is_err());

        let bad_max = ResourceRequirements::new().memory_spec(DimensionSpec::at_least(GIB).max(1));
        assert!(bad_max.validate().is_err());

        let now = Utc::now();
        let backwards = ResourceRequirements::new().within(TimeWindow {
            start: now,
            end: now - Duration::hours(1),
        });
        assert!(backwards.validate().is_err());
    }

    #[test]
    fn test_non_finite_bounds_rejected() {
        let nan_preferred =
            ResourceRequirements::new().cpu_spec(DimensionSpec::at_least(1.0).preferred(f64::NAN));
        assert!(nan_preferred.validate().unwrap_err().is_validation());

        let infinite_max =
            ResourceRequirements::new().cpu_spec(DimensionSpec::at_least(1.0).max(f64::INFINITY));
        assert!(infinite_max.validate().unwrap_err().is_validation());

        let nan_max = ResourceRequirements::new().cpu_spec(DimensionSpec::at_least(1.0).max(f64::NAN));
        assert!(nan_max.validate().unwrap_err().is_validation());
    }

    #[test]
    fn test_location_constraint() {
        let constraint = LocationConstraint {
            include: vec!["eu-west-1".into(), "eu-central-1".into()],
            exclude: vec![],
        };
        assert!(constraint.allows(Some("eu-west-1")));
        assert!(!constraint.allows(Some("us-east-1")));
        assert!(!constraint.allows(None));

        let deny = LocationConstraint {
            include: vec![],
            exclude: vec!["us-east-1".into()],
        };
        assert!(deny.allows(None));
        assert!(deny.allows(Some("eu-west-1")));
        assert!(!deny.allows(Some("us-east-1")));
    }

    #[test]
    fn test_exclusive() {
        assert!(!ResourceRequirements::new().cpu(1.0).is_exclusive());
        let req = ResourceRequirements::new().cpu_spec(DimensionSpec::at_least(1.0).exclusive());
        assert!(req.is_exclusive());
    }
}
