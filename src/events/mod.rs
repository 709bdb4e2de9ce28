// src/events/mod.rs
//! Engine events
//!
//! Collaborators subscribe instead of polling. Every state transition the
//! engine performs is published as an [`EngineEvent`]:
//!
//! - **Resources**: registered, unregistered, failed, status changed
//! - **Reservations**: created, confirmed, failed, cancelled, expired
//! - **Allocations**: activated, released
//! - **Pools**: created, resource added/removed, scale-up/down decisions
//! - **QoS**: violations and remediation attempts
//! - **Monitoring**: periodic summary

pub mod bus;

pub use bus::{BusStats, EventBus};

use crate::monitoring::qos::QosViolation;
use crate::pools::scaling::ScalingDecision;
use crate::resources::{ResourceStatus, ResourceType};
use crate::scheduling::Priority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Event published by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    /// Unique event ID
    pub id: String,

    pub timestamp: DateTime<Utc>,

    pub kind: EventKind,
}

impl EngineEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: format!("evt_{}", Ulid::new()),
            timestamp: Utc::now(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    ResourceRegistered {
        resource_id: String,
        resource_type: ResourceType,
        name: String,
    },
    ResourceUnregistered {
        resource_id: String,
    },
    ResourceFailed {
        resource_id: String,
        reason: String,
    },
    ResourceStatusChanged {
        resource_id: String,
        from: ResourceStatus,
        to: ResourceStatus,
    },
    ReservationCreated {
        reservation_id: String,
        owner_id: String,
        priority: Priority,
    },
    ReservationConfirmed {
        reservation_id: String,
        resource_id: String,
    },
    ReservationFailed {
        reservation_id: String,
        reason: String,
    },
    ReservationCancelled {
        reservation_id: String,
        reason: String,
    },
    ReservationExpired {
        reservation_id: String,
    },
    AllocationActivated {
        allocation_id: String,
        reservation_id: String,
        resource_id: String,
    },
    AllocationReleased {
        allocation_id: String,
        resource_id: String,
        reason: String,
        efficiency: f64,
    },
    PoolCreated {
        pool_id: String,
        name: String,
    },
    PoolResourceAdded {
        pool_id: String,
        resource_id: String,
    },
    PoolResourceRemoved {
        pool_id: String,
        resource_id: String,
    },
    PoolScaledUp {
        decision: ScalingDecision,
    },
    PoolScaledDown {
        decision: ScalingDecision,
    },
    QosViolation {
        allocation_id: String,
        pool_id: String,
        violation: QosViolation,
    },
    RemediationAttempted {
        allocation_id: String,
        pool_id: String,
        violation: QosViolation,
    },
    MonitoringUpdated {
        resources: usize,
        pools: usize,
        active_allocations: usize,
    },
}

impl EventKind {
    /// Stable snake_case name, used for logs and metric labels
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ResourceRegistered { .. } => "resource_registered",
            EventKind::ResourceUnregistered { .. } => "resource_unregistered",
            EventKind::ResourceFailed { .. } => "resource_failed",
            EventKind::ResourceStatusChanged { .. } => "resource_status_changed",
            EventKind::ReservationCreated { .. } => "reservation_created",
            EventKind::ReservationConfirmed { .. } => "reservation_confirmed",
            EventKind::ReservationFailed { .. } => "reservation_failed",
            EventKind::ReservationCancelled { .. } => "reservation_cancelled",
            EventKind::ReservationExpired { .. } => "reservation_expired",
            EventKind::AllocationActivated { .. } => "allocation_activated",
            EventKind::AllocationReleased { .. } => "allocation_released",
            EventKind::PoolCreated { .. } => "pool_created",
            EventKind::PoolResourceAdded { .. } => "pool_resource_added",
            EventKind::PoolResourceRemoved { .. } => "pool_resource_removed",
            EventKind::PoolScaledUp { .. } => "pool_scaled_up",
            EventKind::PoolScaledDown { .. } => "pool_scaled_down",
            EventKind::QosViolation { .. } => "qos_violation",
            EventKind::RemediationAttempted { .. } => "remediation_attempted",
            EventKind::MonitoringUpdated { .. } => "monitoring_updated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = EngineEvent::new(EventKind::ReservationCancelled {
            reservation_id: "rsv_1".to_string(),
            reason: "expired".to_string(),
        });

        assert!(event.id.starts_with("evt_"));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"]["type"], "reservation_cancelled");
        assert_eq!(json["kind"]["reason"], "expired");
        assert_eq!(event.kind.name(), "reservation_cancelled");
    }
}
