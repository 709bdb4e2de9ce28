// src/allocation/model.rs
//! Reservation and allocation entities

use crate::monitoring::qos::QosViolation;
use crate::resources::{ResourceLimits, ResourceRequirements, UsageSnapshot};
use crate::scheduling::{AllocationStrategy, Priority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub type ReservationId = String;
pub type AllocationId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Active,
    Expired,
    Cancelled,
    Failed,
}

impl ReservationStatus {
    /// No further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Expired | ReservationStatus::Cancelled | ReservationStatus::Failed
        )
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Active => "active",
            ReservationStatus::Expired => "expired",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Options accepted by `request_resources`
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub task_id: Option<String>,

    pub priority: Priority,

    /// Reservation lifetime; engine default when `None`
    pub timeout: Option<Duration>,

    pub preemptible: bool,

    /// Overrides the pool/engine default strategy
    pub strategy: Option<AllocationStrategy>,

    /// Restrict candidates to the members of this pool
    pub pool_id: Option<String>,

    /// Turn the confirmed reservation into an allocation straight away
    pub auto_activate: bool,

    /// Stay pending instead of failing when nothing fits right now
    pub wait_for_capacity: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            task_id: None,
            priority: Priority::Normal,
            timeout: None,
            preemptible: false,
            strategy: None,
            pool_id: None,
            auto_activate: true,
            wait_for_capacity: false,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn preemptible(mut self) -> Self {
        self.preemptible = true;
        self
    }

    pub fn strategy(mut self, strategy: AllocationStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn in_pool(mut self, pool_id: impl Into<String>) -> Self {
        self.pool_id = Some(pool_id.into());
        self
    }

    /// Leave the reservation confirmed; activation is explicit
    pub fn manual_activation(mut self) -> Self {
        self.auto_activate = false;
        self
    }

    pub fn wait_for_capacity(mut self) -> Self {
        self.wait_for_capacity = true;
        self
    }
}

/// Intent to consume capacity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceReservation {
    pub id: ReservationId,

    /// Set once a satisfying resource has been found
    pub resource_id: Option<String>,

    pub owner_id: String,
    pub task_id: Option<String>,
    pub requirements: ResourceRequirements,
    pub status: ReservationStatus,
    pub priority: Priority,
    pub preemptible: bool,
    pub strategy: Option<AllocationStrategy>,
    pub pool_id: Option<String>,
    pub auto_activate: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,

    /// When the allocation backing this reservation was released
    pub released_at: Option<DateTime<Utc>>,

    pub cancel_reason: Option<String>,
}

impl ResourceReservation {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Pending and not yet attached to any resource
    pub fn is_waiting(&self) -> bool {
        self.status == ReservationStatus::Pending && self.resource_id.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    Active,
    Completed,
    Failed,
    Terminated,
    Suspended,
}

impl fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AllocationStatus::Active => "active",
            AllocationStatus::Completed => "completed",
            AllocationStatus::Failed => "failed",
            AllocationStatus::Terminated => "terminated",
            AllocationStatus::Suspended => "suspended",
        };
        f.write_str(s)
    }
}

/// Capacity actually consumed on behalf of a reservation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub id: AllocationId,
    pub reservation_id: ReservationId,
    pub resource_id: String,
    pub owner_id: String,
    pub allocated: ResourceLimits,

    /// Latest usage, in the resource's capacity units
    pub actual_usage: ResourceLimits,

    /// Latest raw snapshot (carries cpu percent for QoS)
    pub last_snapshot: Option<UsageSnapshot>,

    pub efficiency: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: AllocationStatus,
    pub release_reason: Option<String>,
    pub qos_violations: Vec<QosViolation>,
}

impl ResourceAllocation {
    pub fn is_active(&self) -> bool {
        self.status == AllocationStatus::Active
    }
}

/// Mean of `actual / allocated` over dimensions with a non-zero allocation
pub fn calculate_efficiency(allocated: &ResourceLimits, actual: &ResourceLimits) -> f64 {
    let ratios: Vec<f64> = allocated
        .dimensions()
        .into_iter()
        .filter(|(_, amount)| *amount > 0.0)
        .map(|(dim, amount)| actual.get(&dim) / amount)
        .collect();

    if ratios.is_empty() {
        0.0
    } else {
        ratios.iter().sum::<f64>() / ratios.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::GIB;

    #[test]
    fn test_efficiency_skips_zero_dimensions() {
        let allocated = ResourceLimits::new(2.0, 4 * GIB);
        let actual = ResourceLimits::new(1.0, 4 * GIB).with_disk(10 * GIB);

        // (0.5 + 1.0) / 2
        assert!((calculate_efficiency(&allocated, &actual) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_efficiency_of_empty_allocation() {
        assert_eq!(calculate_efficiency(&ResourceLimits::zero(), &ResourceLimits::new(1.0, 1)), 0.0);
    }

    #[test]
    fn test_request_options_defaults() {
        let options = RequestOptions::default();
        assert_eq!(options.priority, Priority::Normal);
        assert!(options.auto_activate);
        assert!(!options.wait_for_capacity);

        let options = RequestOptions::new().manual_activation().wait_for_capacity();
        assert!(!options.auto_activate);
        assert!(options.wait_for_capacity);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ReservationStatus::Cancelled.is_terminal());
        assert!(ReservationStatus::Expired.is_terminal());
        assert!(ReservationStatus::Failed.is_terminal());
        assert!(!ReservationStatus::Active.is_terminal());
        assert!(!ReservationStatus::Pending.is_terminal());
    }
}
