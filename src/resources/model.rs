// src/resources/model.rs
//! Resource entity types

use crate::resources::limits::ResourceLimits;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ResourceId = String;

/// Kind of capacity a resource offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Compute,
    Storage,
    Network,
    Memory,
    Gpu,
    Custom,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Compute => "compute",
            ResourceType::Storage => "storage",
            ResourceType::Network => "network",
            ResourceType::Memory => "memory",
            ResourceType::Gpu => "gpu",
            ResourceType::Custom => "custom",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Available,
    Allocated,
    Reserved,
    Maintenance,
    Failed,
    Offline,
}

impl ResourceStatus {
    /// Statuses the engine derives from allocation state
    ///
    /// Maintenance, failed and offline are only set by explicit signals.
    pub fn is_managed(&self) -> bool {
        matches!(
            self,
            ResourceStatus::Available | ResourceStatus::Allocated | ResourceStatus::Reserved
        )
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceStatus::Available => "available",
            ResourceStatus::Allocated => "allocated",
            ResourceStatus::Reserved => "reserved",
            ResourceStatus::Maintenance => "maintenance",
            ResourceStatus::Failed => "failed",
            ResourceStatus::Offline => "offline",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceProfile {
    /// Relative performance, refreshed by the monitoring tick
    pub score: f64,

    /// Named benchmark results supplied at registration
    pub benchmarks: std::collections::HashMap<String, f64>,
}

impl Default for PerformanceProfile {
    fn default() -> Self {
        Self {
            score: 1.0,
            benchmarks: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityProfile {
    /// Fraction of time the resource has been up (0.0 - 1.0)
    pub uptime: f64,

    pub failures: Vec<FailureRecord>,
}

impl Default for ReliabilityProfile {
    fn default() -> Self {
        Self {
            uptime: 1.0,
            failures: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceMetadata {
    /// Infrastructure provider ("aws", "on-prem", ...)
    pub provider: String,

    /// Location used by location constraints ("eu-west-1", ...)
    pub location: Option<String>,

    pub performance: PerformanceProfile,

    pub reliability: ReliabilityProfile,

    /// Billing currency for `Resource::cost`
    pub currency: Option<String>,
}

impl ResourceMetadata {
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_performance(mut self, score: f64) -> Self {
        self.performance.score = score;
        self
    }

    pub fn with_uptime(mut self, uptime: f64) -> Self {
        self.reliability.uptime = uptime;
        self
    }
}

fn default_cost() -> f64 {
    1.0
}

fn default_sharable() -> bool {
    true
}

/// Everything needed to register a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub resource_type: ResourceType,

    pub name: String,

    pub capacity: ResourceLimits,

    #[serde(default)]
    pub metadata: ResourceMetadata,

    /// Cost per hour
    #[serde(default = "default_cost")]
    pub cost: f64,

    /// Whether several owners may hold allocations concurrently
    #[serde(default = "default_sharable")]
    pub sharable: bool,

    #[serde(default)]
    pub tags: Vec<String>,
}

impl ResourceSpec {
    pub fn new(resource_type: ResourceType, name: impl Into<String>, capacity: ResourceLimits) -> Self {
        Self {
            resource_type,
            name: name.into(),
            capacity,
            metadata: ResourceMetadata::default(),
            cost: default_cost(),
            sharable: default_sharable(),
            tags: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: ResourceMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.sharable = false;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// A capacity-bearing entity tracked by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub resource_type: ResourceType,
    pub name: String,
    pub capacity: ResourceLimits,
    pub allocated: ResourceLimits,
    pub available: ResourceLimits,
    pub status: ResourceStatus,
    pub metadata: ResourceMetadata,

    /// Live reservation ids
    pub reservations: Vec<String>,

    /// Active allocation ids
    pub allocations: Vec<String>,

    pub sharable: bool,
    pub cost: f64,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    pub fn new(id: ResourceId, spec: ResourceSpec) -> Self {
        let now = Utc::now();
        Self {
            id,
            resource_type: spec.resource_type,
            name: spec.name,
            available: spec.capacity.clone(),
            capacity: spec.capacity,
            allocated: ResourceLimits::zero(),
            status: ResourceStatus::Available,
            metadata: spec.metadata,
            reservations: Vec::new(),
            allocations: Vec::new(),
            sharable: spec.sharable,
            cost: spec.cost,
            tags: spec.tags,
            created_at: now,
            updated_at: now,
        }
    }

    /// `available = capacity - allocated`, clamped at zero
    pub fn recompute_availability(&mut self) {
        self.available = self.capacity.saturating_sub(&self.allocated);
        self.updated_at = Utc::now();
    }

    /// Mean of the cpu and memory allocation ratios
    ///
    /// Dimensions with zero capacity are skipped; a resource with neither
    /// reports zero.
    pub fn utilization(&self) -> f64 {
        let mut ratios = Vec::with_capacity(2);
        if self.capacity.cpu > 0.0 {
            ratios.push(self.allocated.cpu / self.capacity.cpu);
        }
        if self.capacity.memory > 0 {
            ratios.push(self.allocated.memory as f64 / self.capacity.memory as f64);
        }

        if ratios.is_empty() {
            0.0
        } else {
            (ratios.iter().sum::<f64>() / ratios.len() as f64).clamp(0.0, 1.0)
        }
    }

    /// True when every dimension with capacity has nothing left
    pub fn is_exhausted(&self) -> bool {
        self.capacity
            .dimensions()
            .iter()
            .filter(|(_, cap)| *cap > 0.0)
            .all(|(dim, _)| self.available.get(dim) <= 0.0)
    }

    pub(crate) fn attach_reservation(&mut self, reservation_id: &str) {
        if !self.reservations.iter().any(|id| id == reservation_id) {
            self.reservations.push(reservation_id.to_string());
        }
    }

    pub(crate) fn detach_reservation(&mut self, reservation_id: &str) {
        self.reservations.retain(|id| id != reservation_id);
    }

    pub(crate) fn attach_allocation(&mut self, allocation_id: &str) {
        if !self.allocations.iter().any(|id| id == allocation_id) {
            self.allocations.push(allocation_id.to_string());
        }
    }

    pub(crate) fn detach_allocation(&mut self, allocation_id: &str) {
        self.allocations.retain(|id| id != allocation_id);
    }
}

/// Point-in-time usage of one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub timestamp: DateTime<Utc>,

    /// Share of the resource's CPU in use (0 - 100)
    pub cpu_percent: f64,

    /// Bytes of memory in use
    pub memory: u64,

    /// Bytes of disk in use
    #[serde(default)]
    pub disk: u64,

    /// Network throughput in bytes/sec
    #[serde(default)]
    pub network: u64,

    #[serde(default)]
    pub custom: std::collections::HashMap<String, f64>,
}

impl UsageSnapshot {
    pub fn new(cpu_percent: f64, memory: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            cpu_percent,
            memory,
            disk: 0,
            network: 0,
            custom: Default::default(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
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

    /// Usage in the same units as the resource's capacity
    pub fn to_absolute(&self, capacity: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            cpu: (self.cpu_percent / 100.0) * capacity.cpu,
            memory: self.memory,
            disk: self.disk,
            network: self.network,
            custom: self.custom.clone(),
        }
    }
}
