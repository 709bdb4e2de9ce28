// src/scheduling/mod.rs
//! Resource selection and scoring
//!
//! Given requirements and a priority, candidates are filtered
//! (`can_satisfy_requirements`), scored (`calculate_resource_score`) and one
//! is chosen by an [`AllocationStrategy`].
//!
//! # Architecture
//!
//! ```text
//! available resources
//!        │
//!        ▼
//!   can_satisfy? ──no──► dropped
//!        │ yes
//!        ▼
//!   score × priority weight
//!        │
//!        ▼
//!   strategy (first/best/worst-fit, balanced) ──► chosen resource
//! ```

pub mod scoring;
pub mod strategy;

// Re-export commonly used types
pub use scoring::{
    calculate_resource_score, can_satisfy_requirements, can_satisfy_requirements_at, Priority,
};
pub use strategy::{
    calculate_waste, rank_candidates, select_resource_by_strategy, AllocationStrategy,
    ScoredCandidate,
};
