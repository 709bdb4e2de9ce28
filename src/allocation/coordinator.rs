// src/allocation/coordinator.rs
//! Reservation/allocation state machine
//!
//! ```text
//! pending ──resource found──► confirmed ──activate──► active ──release──► (allocation completed)
//!    │                            │                     │
//!    ├──no resource──► failed     └──────cancel─────────┴──► cancelled
//!    └──timeout (cleanup)──► cancelled("expired")
//! ```
//!
//! Reservations only record intent; capacity is consumed when an allocation
//! is activated. After every step the touched resource's `available` figure
//! is recomputed from `capacity - allocated`.

use crate::allocation::model::{
    calculate_efficiency, AllocationId, AllocationStatus, RequestOptions, ReservationId,
    ReservationStatus, ResourceAllocation, ResourceReservation,
};
use crate::events::EventKind;
use crate::manager::state::EngineState;
use crate::resources::{ResourceRequirements, ResourceStatus};
use crate::scheduling::{can_satisfy_requirements, select_resource_by_strategy};
use crate::utils::errors::{EngineError, Result};
use chrono::Utc;
use std::cmp::Reverse;
use tracing::{debug, info, warn};
use ulid::Ulid;

impl EngineState {
    /// Create a reservation and try to place it
    pub fn request_resources(
        &mut self,
        owner_id: &str,
        requirements: ResourceRequirements,
        options: RequestOptions,
    ) -> Result<ReservationId> {
        self.ensure_running("request resources")?;
        if owner_id.trim().is_empty() {
            return Err(EngineError::Validation("Owner id cannot be empty".to_string()));
        }
        requirements.validate()?;
        if let Some(pool_id) = &options.pool_id {
            if !self.pools.contains_key(pool_id) {
                return Err(EngineError::PoolNotFound(pool_id.clone()));
            }
        }

        let timeout = options
            .timeout
            .unwrap_or_else(|| self.settings.default_reservation_timeout());
        let timeout = chrono::Duration::from_std(timeout)
            .map_err(|e| EngineError::Validation(format!("Invalid timeout: {}", e)))?;

        let now = Utc::now();
        let id = format!("rsv_{}", Ulid::new());
        let reservation = ResourceReservation {
            id: id.clone(),
            resource_id: None,
            owner_id: owner_id.to_string(),
            task_id: options.task_id.clone(),
            requirements,
            status: ReservationStatus::Pending,
            priority: options.priority,
            preemptible: options.preemptible,
            strategy: options.strategy,
            pool_id: options.pool_id.clone(),
            auto_activate: options.auto_activate,
            created_at: now,
            expires_at: now + timeout,
            activated_at: None,
            released_at: None,
            cancel_reason: None,
        };

        debug!("Reservation {} requested by {} ({})", id, owner_id, options.priority);
        self.reservations.insert(id.clone(), reservation);
        self.emit(EventKind::ReservationCreated {
            reservation_id: id.clone(),
            owner_id: owner_id.to_string(),
            priority: options.priority,
        });

        if self.place_reservation(&id)?.is_some() {
            metrics::counter!("resource_engine_reservations_total", "outcome" => "confirmed")
                .increment(1);
            if options.auto_activate {
                self.try_auto_activate(&id)?;
            }
            return Ok(id);
        }

        if options.wait_for_capacity {
            info!("No capacity for reservation {}, waiting until {}", id, now + timeout);
            metrics::counter!("resource_engine_reservations_total", "outcome" => "waiting")
                .increment(1);
            return Ok(id);
        }

        let reason = "no resource can satisfy the requirements".to_string();
        if let Some(reservation) = self.reservations.get_mut(&id) {
            reservation.status = ReservationStatus::Failed;
        }
        warn!("Reservation {} failed: {}", id, reason);
        metrics::counter!("resource_engine_reservations_total", "outcome" => "failed").increment(1);
        self.emit(EventKind::ReservationFailed {
            reservation_id: id.clone(),
            reason: reason.clone(),
        });

        Err(EngineError::InsufficientCapacity(format!("{}: {}", id, reason)))
    }

    /// Attach a pending reservation to the best available resource
    ///
    /// Returns the chosen resource id, or `None` when nothing fits.
    pub(crate) fn place_reservation(&mut self, reservation_id: &str) -> Result<Option<String>> {
        let reservation = self
            .reservations
            .get(reservation_id)
            .ok_or_else(|| EngineError::ReservationNotFound(reservation_id.to_string()))?;

        if reservation.status != ReservationStatus::Pending {
            return Err(EngineError::InvalidState(format!(
                "Reservation {} is {}, expected pending",
                reservation_id, reservation.status
            )));
        }

        let pool = match &reservation.pool_id {
            Some(pool_id) => Some(
                self.pools
                    .get(pool_id)
                    .ok_or_else(|| EngineError::PoolNotFound(pool_id.clone()))?,
            ),
            None => None,
        };

        let strategy = reservation
            .strategy
            .or(pool.map(|p| p.strategy))
            .unwrap_or(self.settings.default_strategy);

        let exclusive = reservation.requirements.is_exclusive();
        let candidates: Vec<_> = self
            .resources
            .iter()
            .filter(|r| pool.map_or(true, |p| p.resource_ids.contains(&r.id)))
            .filter(|r| r.status == ResourceStatus::Available)
            .filter(|r| {
                let busy = self.active_allocations_on(r).next().is_some();
                if exclusive {
                    !busy && r.reservations.is_empty()
                } else {
                    r.sharable || !busy
                }
            })
            .collect();

        let chosen = select_resource_by_strategy(
            &candidates,
            &reservation.requirements,
            reservation.priority,
            strategy,
        )
        .map(|r| r.id.clone());

        let resource_id = match chosen {
            Some(id) => id,
            None => {
                debug!(
                    "No candidate among {} resource(s) for reservation {}",
                    candidates.len(),
                    reservation_id
                );
                return Ok(None);
            }
        };

        self.resources.get_mut(&resource_id)?.attach_reservation(reservation_id);
        if let Some(reservation) = self.reservations.get_mut(reservation_id) {
            reservation.resource_id = Some(resource_id.clone());
            reservation.status = ReservationStatus::Confirmed;
        }
        self.refresh_resource(&resource_id)?;

        info!(
            "Reservation {} confirmed on {} ({})",
            reservation_id, resource_id, strategy
        );
        self.emit(EventKind::ReservationConfirmed {
            reservation_id: reservation_id.to_string(),
            resource_id: resource_id.clone(),
        });

        Ok(Some(resource_id))
    }

    /// Activate a freshly confirmed reservation if its resource still fits
    fn try_auto_activate(&mut self, reservation_id: &str) -> Result<Option<AllocationId>> {
        let reservation = &self.reservations[reservation_id];
        let resource_id = match &reservation.resource_id {
            Some(id) => id,
            None => return Ok(None),
        };

        let resource = self.resources.get(resource_id)?;
        if !can_satisfy_requirements(resource, &reservation.requirements) {
            debug!(
                "Reservation {} stays confirmed, {} can no longer satisfy it",
                reservation_id, resource_id
            );
            return Ok(None);
        }

        self.activate_reservation(reservation_id).map(Some)
    }

    /// Turn a confirmed reservation into an active allocation
    pub fn activate_reservation(&mut self, reservation_id: &str) -> Result<AllocationId> {
        self.ensure_running("activate a reservation")?;
        let reservation = self
            .reservations
            .get(reservation_id)
            .ok_or_else(|| EngineError::ReservationNotFound(reservation_id.to_string()))?;

        if reservation.status != ReservationStatus::Confirmed {
            return Err(EngineError::InvalidState(format!(
                "Reservation {} is {}, only confirmed reservations can be activated",
                reservation_id, reservation.status
            )));
        }

        let resource_id = reservation.resource_id.clone().ok_or_else(|| {
            EngineError::InvalidState(format!("Reservation {} has no resource", reservation_id))
        })?;
        let resource = self.resources.get(&resource_id)?;

        // Per dimension: min(preferred ?? min, available)
        let amount = reservation.requirements.desired().clamp_to(&resource.available);
        let allocated = resource.allocated.add(&amount);
        if !allocated.fits_within(&resource.capacity) {
            return Err(EngineError::InvalidState(format!(
                "Activating {} would exceed the capacity of {}",
                reservation_id, resource_id
            )));
        }

        let now = Utc::now();
        let id = format!("alloc_{}", Ulid::new());
        let allocation = ResourceAllocation {
            id: id.clone(),
            reservation_id: reservation_id.to_string(),
            resource_id: resource_id.clone(),
            owner_id: reservation.owner_id.clone(),
            allocated: amount,
            actual_usage: Default::default(),
            last_snapshot: None,
            efficiency: 0.0,
            start_time: now,
            end_time: None,
            status: AllocationStatus::Active,
            release_reason: None,
            qos_violations: Vec::new(),
        };

        let resource = self.resources.get_mut(&resource_id)?;
        resource.allocated = allocated;
        resource.attach_allocation(&id);

        if let Some(reservation) = self.reservations.get_mut(reservation_id) {
            reservation.status = ReservationStatus::Active;
            reservation.activated_at = Some(now);
        }
        self.allocations.insert(id.clone(), allocation);
        self.refresh_resource(&resource_id)?;

        info!("Allocation {} activated on {} for {}", id, resource_id, reservation_id);
        metrics::counter!("resource_engine_allocations_total").increment(1);
        metrics::gauge!("resource_engine_active_allocations")
            .set(self.active_allocation_count() as f64);

        self.emit(EventKind::AllocationActivated {
            allocation_id: id.clone(),
            reservation_id: reservation_id.to_string(),
            resource_id,
        });

        Ok(id)
    }

    /// Complete an active allocation and return its capacity
    pub fn release_resources(&mut self, allocation_id: &str, reason: &str) -> Result<()> {
        self.release_allocation(allocation_id, reason)?;
        self.place_waiting_reservations();
        Ok(())
    }

    fn release_allocation(&mut self, allocation_id: &str, reason: &str) -> Result<()> {
        let allocation = self
            .allocations
            .get(allocation_id)
            .ok_or_else(|| EngineError::AllocationNotFound(allocation_id.to_string()))?;

        if !allocation.is_active() {
            return Err(EngineError::InvalidState(format!(
                "Allocation {} is {}, only active allocations can be released",
                allocation_id, allocation.status
            )));
        }

        let efficiency = calculate_efficiency(&allocation.allocated, &allocation.actual_usage);
        let resource_id = allocation.resource_id.clone();
        let reservation_id = allocation.reservation_id.clone();
        let amount = allocation.allocated.clone();
        let now = Utc::now();

        if let Some(allocation) = self.allocations.get_mut(allocation_id) {
            allocation.status = AllocationStatus::Completed;
            allocation.end_time = Some(now);
            allocation.efficiency = efficiency;
            allocation.release_reason = Some(reason.to_string());
        }
        if let Some(reservation) = self.reservations.get_mut(&reservation_id) {
            reservation.released_at = Some(now);
        }

        if self.resources.contains(&resource_id) {
            let resource = self.resources.get_mut(&resource_id)?;
            resource.allocated = resource.allocated.saturating_sub(&amount);
            resource.detach_allocation(allocation_id);
            resource.detach_reservation(&reservation_id);
            self.refresh_resource(&resource_id)?;
        }

        info!(
            "Allocation {} released from {} ({}), efficiency {:.2}",
            allocation_id, resource_id, reason, efficiency
        );
        metrics::counter!("resource_engine_releases_total").increment(1);
        metrics::histogram!("resource_engine_allocation_efficiency").record(efficiency);
        metrics::gauge!("resource_engine_active_allocations")
            .set(self.active_allocation_count() as f64);

        self.emit(EventKind::AllocationReleased {
            allocation_id: allocation_id.to_string(),
            resource_id,
            reason: reason.to_string(),
            efficiency,
        });
        Ok(())
    }

    /// Cancel a reservation, releasing its allocation first when active
    ///
    /// Cancelling a reservation that already reached a terminal state is a
    /// no-op.
    pub fn cancel_reservation(&mut self, reservation_id: &str, reason: &str) -> Result<()> {
        self.withdraw_reservation(reservation_id, reason)?;
        self.place_waiting_reservations();
        Ok(())
    }

    /// Cancel without retrying waiting reservations on the freed capacity
    pub(crate) fn withdraw_reservation(&mut self, reservation_id: &str, reason: &str) -> Result<()> {
        let reservation = self
            .reservations
            .get(reservation_id)
            .ok_or_else(|| EngineError::ReservationNotFound(reservation_id.to_string()))?;

        if reservation.status.is_terminal() {
            debug!(
                "Reservation {} already {}, nothing to cancel",
                reservation_id, reservation.status
            );
            return Ok(());
        }

        let resource_id = reservation.resource_id.clone();
        let live_allocation = self
            .allocations
            .values()
            .find(|a| a.reservation_id == reservation_id && a.is_active())
            .map(|a| a.id.clone());

        if let Some(allocation_id) = live_allocation {
            self.release_allocation(&allocation_id, reason)?;
        }

        if let Some(reservation) = self.reservations.get_mut(reservation_id) {
            reservation.status = ReservationStatus::Cancelled;
            reservation.cancel_reason = Some(reason.to_string());
        }

        if let Some(resource_id) = resource_id.filter(|id| self.resources.contains(id)) {
            self.resources.get_mut(&resource_id)?.detach_reservation(reservation_id);
            self.refresh_resource(&resource_id)?;
        }

        info!("Reservation {} cancelled ({})", reservation_id, reason);
        metrics::counter!("resource_engine_reservations_cancelled_total").increment(1);
        self.emit(EventKind::ReservationCancelled {
            reservation_id: reservation_id.to_string(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Retry placement of reservations waiting for capacity
    ///
    /// Highest priority first, oldest first within a priority.
    pub(crate) fn place_waiting_reservations(&mut self) {
        if self.is_shut_down() {
            return;
        }
        let now = Utc::now();
        let mut waiting: Vec<_> = self
            .reservations
            .values()
            .filter(|r| r.is_waiting() && !r.is_expired_at(now))
            .map(|r| (Reverse(r.priority), r.created_at, r.id.clone()))
            .collect();
        if waiting.is_empty() {
            return;
        }
        waiting.sort();

        for (_, _, reservation_id) in waiting {
            match self.place_reservation(&reservation_id) {
                Ok(Some(_)) => {
                    let auto_activate = self.reservations[&reservation_id].auto_activate;
                    if auto_activate {
                        if let Err(e) = self.try_auto_activate(&reservation_id) {
                            warn!("Failed to activate waiting reservation {}: {}", reservation_id, e);
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to place waiting reservation {}: {}", reservation_id, e),
            }
        }
    }
}
