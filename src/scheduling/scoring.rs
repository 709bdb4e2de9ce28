// src/scheduling/scoring.rs
//! Candidate filtering and composite scoring
//!
//! ```text
//! score = ((1 - utilization) * 100
//!          + performance * 10
//!          + uptime * 50
//!          + (1 / cost) * 20) * priority_weight
//! ```
//!
//! The priority weight scales every candidate by the same constant, so the
//! relative ranking of resources never depends on request priority.

use crate::resources::{Resource, ResourceRequirements};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Background,
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Fixed score multiplier
    pub fn weight(&self) -> f64 {
        match self {
            Priority::Critical => 1.0,
            Priority::High => 0.8,
            Priority::Normal => 0.6,
            Priority::Low => 0.4,
            Priority::Background => 0.2,
        }
    }

    pub fn all() -> [Priority; 5] {
        [
            Priority::Critical,
            Priority::High,
            Priority::Normal,
            Priority::Low,
            Priority::Background,
        ]
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
            Priority::Background => "background",
        };
        f.write_str(s)
    }
}

/// Whether `resource` can currently host `requirements`
pub fn can_satisfy_requirements(resource: &Resource, requirements: &ResourceRequirements) -> bool {
    can_satisfy_requirements_at(resource, requirements, Utc::now())
}

/// [`can_satisfy_requirements`] evaluated at a given instant
pub fn can_satisfy_requirements_at(
    resource: &Resource,
    requirements: &ResourceRequirements,
    now: DateTime<Utc>,
) -> bool {
    let available = &resource.available;

    if let Some(cpu) = &requirements.cpu {
        if cpu.min > available.cpu {
            return false;
        }
    }
    if let Some(memory) = &requirements.memory {
        if memory.min > available.memory {
            return false;
        }
    }
    if let Some(disk) = &requirements.disk {
        if disk.min > available.disk {
            return false;
        }
    }
    if let Some(network) = &requirements.network {
        if network.min > available.network {
            return false;
        }
    }
    for (name, spec) in &requirements.custom {
        if spec.min > available.custom_value(name) {
            return false;
        }
    }

    let constraints = &requirements.constraints;

    if let Some(location) = &constraints.location {
        if !location.allows(resource.metadata.location.as_deref()) {
            return false;
        }
    }

    if let Some(max_cost) = constraints.max_cost {
        if resource.cost > max_cost {
            return false;
        }
    }

    if let Some(window) = &constraints.time_window {
        if !window.contains(now) {
            return false;
        }
    }

    true
}

/// Composite score, zero when the resource cannot satisfy the request
pub fn calculate_resource_score(
    resource: &Resource,
    requirements: &ResourceRequirements,
    priority: Priority,
) -> f64 {
    if !can_satisfy_requirements(resource, requirements) {
        return 0.0;
    }

    base_score(resource) * priority.weight()
}

/// Score before the priority weight is applied
pub(crate) fn base_score(resource: &Resource) -> f64 {
    // Free resources (cost <= 0) score like unit cost
    let cost = if resource.cost > 0.0 { resource.cost } else { 1.0 };

    (1.0 - resource.utilization()) * 100.0
        + resource.metadata.performance.score * 10.0
        + resource.metadata.reliability.uptime * 50.0
        + (1.0 / cost) * 20.0
}
