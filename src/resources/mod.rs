// src/resources/mod.rs
//! Resource model and registry
//!
//! - **Limits**: multi-dimensional capacity figures (cpu, memory, disk, network, custom)
//! - **Model**: the `Resource` entity, its metadata and usage snapshots
//! - **Requirements**: what a request needs from a resource
//! - **Registry**: CRUD store for registered resources
//!
//! Every resource maintains `available = capacity - allocated`, clamped at
//! zero. `available` is always recomputed from the other two figures, never
//! adjusted on its own.

pub mod limits;
pub mod model;
pub mod registry;
pub mod requirements;

// Re-export commonly used types
pub use limits::{Dimension, ResourceLimits, GIB, KIB, MIB};
pub use model::{
    FailureRecord, PerformanceProfile, ReliabilityProfile, Resource, ResourceId,
    ResourceMetadata, ResourceSpec, ResourceStatus, ResourceType, UsageSnapshot,
};
pub use registry::ResourceRegistry;
pub use requirements::{
    DimensionSpec, LocationConstraint, Preferences, RequirementConstraints,
    ResourceRequirements, TimeWindow,
};
