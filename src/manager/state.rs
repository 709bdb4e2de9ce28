// src/manager/state.rs
//! Shared engine tables
//!
//! `EngineState` owns every table the engine mutates. It is only ever
//! accessed through the manager's mutex, so each public operation is one
//! atomic read-compute-write sequence. Operations record the events they
//! raise in an outbox; the manager publishes them after releasing the lock.
//!
//! The coordinator, pool, monitoring and prediction modules extend this type
//! with their own `impl EngineState` blocks.

use crate::allocation::{
    AllocationId, ReservationId, ReservationStatus, ResourceAllocation, ResourceReservation,
};
use crate::events::{EngineEvent, EventKind};
use crate::monitoring::qos::RemediationRequest;
use crate::pools::{PoolId, ResourcePool};
use crate::resources::{
    FailureRecord, Resource, ResourceId, ResourceRegistry, ResourceSpec, ResourceStatus,
    UsageSnapshot,
};
use crate::utils::config::EngineSettings;
use crate::utils::errors::{EngineError, Result};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{info, warn};

pub struct EngineState {
    pub(crate) settings: EngineSettings,
    pub(crate) resources: ResourceRegistry,
    pub(crate) pools: BTreeMap<PoolId, ResourcePool>,
    pub(crate) reservations: HashMap<ReservationId, ResourceReservation>,
    pub(crate) allocations: HashMap<AllocationId, ResourceAllocation>,
    pub(crate) usage_history: HashMap<ResourceId, VecDeque<UsageSnapshot>>,

    /// Events raised while the lock is held
    outbox: Vec<EngineEvent>,

    /// Remediation work to run once the lock is released
    remediations: Vec<RemediationRequest>,

    /// Set by shutdown; admission of new work stops
    shut_down: bool,
}

impl EngineState {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            resources: ResourceRegistry::new(),
            pools: BTreeMap::new(),
            reservations: HashMap::new(),
            allocations: HashMap::new(),
            usage_history: HashMap::new(),
            outbox: Vec::new(),
            remediations: Vec::new(),
            shut_down: false,
        }
    }

    pub(crate) fn emit(&mut self, kind: EventKind) {
        self.outbox.push(EngineEvent::new(kind));
    }

    pub(crate) fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.outbox)
    }

    pub(crate) fn queue_remediation(&mut self, request: RemediationRequest) {
        self.remediations.push(request);
    }

    pub(crate) fn take_remediations(&mut self) -> Vec<RemediationRequest> {
        std::mem::take(&mut self.remediations)
    }

    /// Stop admitting new resources, reservations, activations and usage
    pub(crate) fn begin_shutdown(&mut self) {
        self.shut_down = true;
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub(crate) fn ensure_running(&self, operation: &str) -> Result<()> {
        if self.shut_down {
            return Err(EngineError::InvalidState(format!(
                "Cannot {}: engine has been shut down",
                operation
            )));
        }
        Ok(())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Registry
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn register_resource(&mut self, spec: ResourceSpec) -> Result<ResourceId> {
        self.ensure_running("register a resource")?;
        let resource_type = spec.resource_type;
        let name = spec.name.clone();
        let id = self.resources.register(spec)?;

        info!("Registered {} resource '{}' ({})", resource_type, name, id);
        metrics::counter!("resource_engine_resources_registered_total").increment(1);
        metrics::gauge!("resource_engine_resources").set(self.resources.len() as f64);

        self.emit(EventKind::ResourceRegistered {
            resource_id: id.clone(),
            resource_type,
            name,
        });
        Ok(id)
    }

    pub fn unregister_resource(&mut self, resource_id: &str) -> Result<()> {
        let resource = self.resources.get(resource_id)?;

        let active = resource
            .allocations
            .iter()
            .filter(|id| self.allocations.get(*id).map_or(false, |a| a.is_active()))
            .count();
        if active > 0 {
            return Err(EngineError::InvalidState(format!(
                "Resource {} still has {} active allocation(s)",
                resource_id, active
            )));
        }

        let reservation_ids = resource.reservations.clone();
        for reservation_id in reservation_ids {
            self.withdraw_reservation(&reservation_id, "resource_unregistered")?;
        }

        for pool in self.pools.values_mut() {
            pool.resource_ids.retain(|id| id != resource_id);
        }
        self.usage_history.remove(resource_id);
        self.resources.remove(resource_id)?;

        info!("Unregistered resource {}", resource_id);
        metrics::gauge!("resource_engine_resources").set(self.resources.len() as f64);
        self.emit(EventKind::ResourceUnregistered {
            resource_id: resource_id.to_string(),
        });
        Ok(())
    }

    /// Record an external failure signal
    ///
    /// Existing allocations stay in place; migrating or terminating them is
    /// the caller's decision.
    pub fn mark_resource_failed(&mut self, resource_id: &str, reason: &str) -> Result<()> {
        let resource = self.resources.get_mut(resource_id)?;

        resource.metadata.reliability.failures.push(FailureRecord {
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        let previous = resource.status;
        resource.status = ResourceStatus::Failed;
        resource.updated_at = Utc::now();

        let active = resource.allocations.len();
        warn!(
            "Resource {} marked failed ({}), {} allocation(s) left in place",
            resource_id, reason, active
        );
        metrics::counter!("resource_engine_resource_failures_total").increment(1);

        if previous != ResourceStatus::Failed {
            self.emit(EventKind::ResourceStatusChanged {
                resource_id: resource_id.to_string(),
                from: previous,
                to: ResourceStatus::Failed,
            });
        }
        self.emit(EventKind::ResourceFailed {
            resource_id: resource_id.to_string(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Explicit status change (maintenance, offline, recovery)
    ///
    /// Managed statuses are re-derived from allocation state, so setting
    /// `Available` on a busy resource may settle on `Allocated`.
    pub fn set_resource_status(&mut self, resource_id: &str, status: ResourceStatus) -> Result<()> {
        let resource = self.resources.get_mut(resource_id)?;
        let previous = resource.status;
        resource.status = status;

        if status.is_managed() {
            self.refresh_resource(resource_id)?;
        }

        let current = self.resources.get(resource_id)?.status;
        if current != previous {
            info!("Resource {} status {} -> {}", resource_id, previous, current);
            self.emit(EventKind::ResourceStatusChanged {
                resource_id: resource_id.to_string(),
                from: previous,
                to: current,
            });
        }
        Ok(())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Derived figures
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Recompute availability and the managed status of one resource
    pub(crate) fn refresh_resource(&mut self, resource_id: &str) -> Result<()> {
        let resource = self.resources.get(resource_id)?;

        let exclusive_reserved = resource.reservations.iter().any(|id| {
            self.reservations.get(id).map_or(false, |r| {
                r.status == ReservationStatus::Confirmed && r.requirements.is_exclusive()
            })
        });
        let exclusive_active = resource.allocations.iter().any(|id| {
            self.allocations
                .get(id)
                .filter(|a| a.is_active())
                .and_then(|a| self.reservations.get(&a.reservation_id))
                .map_or(false, |r| r.requirements.is_exclusive())
        });

        let resource = self.resources.get_mut(resource_id)?;
        resource.recompute_availability();
        debug_assert!(resource.allocated.fits_within(&resource.capacity));

        if !resource.status.is_managed() {
            return Ok(());
        }

        let previous = resource.status;
        resource.status = if exclusive_active || resource.is_exhausted() {
            ResourceStatus::Allocated
        } else if exclusive_reserved {
            ResourceStatus::Reserved
        } else {
            ResourceStatus::Available
        };

        if resource.status != previous {
            let to = resource.status;
            self.emit(EventKind::ResourceStatusChanged {
                resource_id: resource_id.to_string(),
                from: previous,
                to,
            });
        }
        Ok(())
    }

    pub(crate) fn active_allocation_count(&self) -> usize {
        self.allocations.values().filter(|a| a.is_active()).count()
    }

    /// Active allocations currently held on `resource`
    pub(crate) fn active_allocations_on<'a>(
        &'a self,
        resource: &'a Resource,
    ) -> impl Iterator<Item = &'a ResourceAllocation> + 'a {
        resource
            .allocations
            .iter()
            .filter_map(move |id| self.allocations.get(id))
            .filter(|a| a.is_active())
    }
}
