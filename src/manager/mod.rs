// src/manager/mod.rs
//! Engine facade and lifecycle
//!
//! [`ResourceManager`] is the only entry point collaborators use. It owns
//! one [`EngineState`] behind a mutex, the event bus, the remediation hook,
//! the prediction cache and the periodic tasks.
//!
//! # Architecture
//!
//! ```text
//! callers ──► ResourceManager ──lock──► EngineState (tables)
//!                  │                        │
//!                  │◄──── events, remediation requests (outbox)
//!                  │
//!                  ├─► EventBus ──► subscribers
//!                  └─► RemediationHook
//!
//! periodic tasks: monitor (+QoS), cleanup, scaling ──lock──► EngineState
//! ```
//!
//! Every operation is one short critical section. Its events are handed to
//! the bus before the lock is released, so subscribers see them in the order
//! the state changed. Remediation hooks run only after the lock is released.

pub mod state;
pub mod tasks;

pub use state::EngineState;

use crate::allocation::{
    AllocationId, RequestOptions, ReservationId, ResourceAllocation, ResourceReservation,
};
use crate::events::{BusStats, EngineEvent, EventBus, EventKind};
use crate::monitoring::{
    CleanupReport, LoggingRemediation, ManagerStatistics, QosConfig, QosViolation, RemediationHook,
};
use crate::pools::{PoolId, ResourcePool, ScalingConfig, ScalingDecision};
use crate::prediction::UsagePrediction;
use crate::resources::{
    Resource, ResourceId, ResourceLimits, ResourceMetadata, ResourceRequirements, ResourceSpec,
    ResourceStatus, ResourceType, UsageSnapshot,
};
use crate::scheduling::AllocationStrategy;
use crate::utils::config::EngineSettings;
use crate::utils::errors::{EngineError, Result};
use crossbeam_channel::Receiver;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use tasks::{spawn_periodic, PeriodicTask, CLEANUP_TASK, MONITOR_TASK, SCALING_TASK};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Reason recorded on allocations released by [`ResourceManager::shutdown`]
pub const SHUTDOWN_REASON: &str = "system_shutdown";

/// State shared between the facade and the periodic tasks
struct EngineCore {
    state: Mutex<EngineState>,
    bus: EventBus,
    hook: Arc<dyn RemediationHook>,
    predictions: DashMap<ResourceId, UsagePrediction>,
}

impl EngineCore {
    /// Run `f` under the lock, then publish what it raised
    fn with_state<T>(&self, f: impl FnOnce(&mut EngineState) -> T) -> T {
        let (out, remediations) = {
            let mut state = self.state.lock();
            let out = f(&mut state);
            // Under the lock so delivery order matches mutation order
            self.bus.publish_all(state.take_events());
            (out, state.take_remediations())
        };

        for request in remediations {
            self.hook.remediate(&request);
            self.bus.publish(EngineEvent::new(EventKind::RemediationAttempted {
                allocation_id: request.allocation_id,
                pool_id: request.pool_id,
                violation: request.violation,
            }));
        }

        out
    }

    fn monitoring_tick(&self) {
        let predictions = self.with_state(|state| {
            state.run_monitoring();
            state.predict_all()
        });
        for prediction in predictions {
            self.predictions.insert(prediction.resource_id.clone(), prediction);
        }
    }

    fn qos_tick(&self) -> Vec<QosViolation> {
        self.with_state(|state| state.run_qos_checks())
    }

    fn cleanup_tick(&self) -> CleanupReport {
        let report = self.with_state(|state| state.run_cleanup());

        // Drop forecasts of resources that are gone
        let state = self.state.lock();
        self.predictions.retain(|id, _| state.resources.contains(id));
        report
    }

    fn scaling_tick(&self) -> Vec<ScalingDecision> {
        self.with_state(|state| state.evaluate_scaling())
    }
}

/// Resource allocation and scheduling engine
pub struct ResourceManager {
    core: Arc<EngineCore>,
    settings: EngineSettings,
    cancel: CancellationToken,
    tasks: Mutex<Vec<PeriodicTask>>,
}

impl ResourceManager {
    pub fn new(settings: EngineSettings) -> Self {
        Self::with_remediation_hook(settings, Arc::new(LoggingRemediation))
    }

    /// Create an engine that hands QoS violations to `hook`
    pub fn with_remediation_hook(settings: EngineSettings, hook: Arc<dyn RemediationHook>) -> Self {
        let core = EngineCore {
            state: Mutex::new(EngineState::new(settings.clone())),
            bus: EventBus::new(),
            hook,
            predictions: DashMap::new(),
        };

        Self {
            core: Arc::new(core),
            settings,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Lifecycle
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Start the periodic tasks; requires a tokio runtime
    pub fn start(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::InvalidState("Engine has been shut down".to_string()));
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(EngineError::InvalidState(
                "Periodic tasks need a tokio runtime".to_string(),
            ));
        }

        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return Err(EngineError::InvalidState("Engine is already running".to_string()));
        }

        info!("Starting resource engine tasks");

        let core = Arc::clone(&self.core);
        tasks.push(spawn_periodic(
            MONITOR_TASK,
            self.settings.monitoring_interval(),
            self.cancel.child_token(),
            move || {
                core.monitoring_tick();
                core.qos_tick();
            },
        ));

        let core = Arc::clone(&self.core);
        tasks.push(spawn_periodic(
            CLEANUP_TASK,
            self.settings.cleanup_interval(),
            self.cancel.child_token(),
            move || {
                core.cleanup_tick();
            },
        ));

        let core = Arc::clone(&self.core);
        tasks.push(spawn_periodic(
            SCALING_TASK,
            self.settings.scaling_interval(),
            self.cancel.child_token(),
            move || {
                core.scaling_tick();
            },
        ));

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.tasks.lock().is_empty()
    }

    /// Stop the periodic tasks, then release every active allocation
    ///
    /// Returns the number of allocations released.
    pub async fn shutdown(&self) -> Result<usize> {
        info!("Shutting down resource engine");
        self.cancel.cancel();

        let tasks: Vec<PeriodicTask> = std::mem::take(&mut *self.tasks.lock());
        let names: Vec<&'static str> = tasks.iter().map(|t| t.name).collect();
        let results = join_all(tasks.into_iter().map(|t| t.handle)).await;
        for (name, result) in names.into_iter().zip(results) {
            if let Err(e) = result {
                error!("{} task ended abnormally: {}", name, e);
            }
        }

        let released = self.core.with_state(|state| {
            state.begin_shutdown();

            let mut active: Vec<AllocationId> = state
                .allocations
                .values()
                .filter(|a| a.is_active())
                .map(|a| a.id.clone())
                .collect();
            active.sort();

            let mut released = 0;
            for allocation_id in active {
                match state.release_resources(&allocation_id, SHUTDOWN_REASON) {
                    Ok(()) => released += 1,
                    Err(e) => warn!("Failed to release {} on shutdown: {}", allocation_id, e),
                }
            }
            released
        });

        info!("Resource engine stopped, {} allocation(s) released", released);
        Ok(released)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Registry
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn register_resource(
        &self,
        resource_type: ResourceType,
        name: &str,
        capacity: ResourceLimits,
        metadata: ResourceMetadata,
    ) -> Result<ResourceId> {
        self.register(ResourceSpec::new(resource_type, name, capacity).with_metadata(metadata))
    }

    /// Register a resource described by a full spec
    pub fn register(&self, spec: ResourceSpec) -> Result<ResourceId> {
        self.core.with_state(|state| state.register_resource(spec))
    }

    pub fn unregister_resource(&self, resource_id: &str) -> Result<()> {
        self.core.with_state(|state| state.unregister_resource(resource_id))?;
        self.core.predictions.remove(resource_id);
        Ok(())
    }

    pub fn mark_resource_failed(&self, resource_id: &str, reason: &str) -> Result<()> {
        self.core
            .with_state(|state| state.mark_resource_failed(resource_id, reason))
    }

    pub fn set_resource_status(&self, resource_id: &str, status: ResourceStatus) -> Result<()> {
        self.core
            .with_state(|state| state.set_resource_status(resource_id, status))
    }

    pub fn get_resource(&self, resource_id: &str) -> Result<Resource> {
        self.core.state.lock().resources.get(resource_id).cloned()
    }

    pub fn get_all_resources(&self) -> Vec<Resource> {
        self.core.state.lock().resources.all()
    }

    pub fn get_resources_by_type(&self, resource_type: ResourceType) -> Vec<Resource> {
        self.core.state.lock().resources.by_type(resource_type)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Reservations and allocations
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn request_resources(
        &self,
        owner_id: &str,
        requirements: ResourceRequirements,
        options: RequestOptions,
    ) -> Result<ReservationId> {
        self.core
            .with_state(|state| state.request_resources(owner_id, requirements, options))
    }

    pub fn activate_reservation(&self, reservation_id: &str) -> Result<AllocationId> {
        self.core
            .with_state(|state| state.activate_reservation(reservation_id))
    }

    pub fn release_resources(&self, allocation_id: &str, reason: &str) -> Result<()> {
        self.core
            .with_state(|state| state.release_resources(allocation_id, reason))
    }

    pub fn cancel_reservation(&self, reservation_id: &str, reason: &str) -> Result<()> {
        self.core
            .with_state(|state| state.cancel_reservation(reservation_id, reason))
    }

    pub fn get_reservation(&self, reservation_id: &str) -> Result<ResourceReservation> {
        self.core
            .state
            .lock()
            .reservations
            .get(reservation_id)
            .cloned()
            .ok_or_else(|| EngineError::ReservationNotFound(reservation_id.to_string()))
    }

    pub fn get_allocation(&self, allocation_id: &str) -> Result<ResourceAllocation> {
        self.core
            .state
            .lock()
            .allocations
            .get(allocation_id)
            .cloned()
            .ok_or_else(|| EngineError::AllocationNotFound(allocation_id.to_string()))
    }

    /// Allocation backing `reservation_id`, if it was activated
    pub fn get_allocation_for_reservation(&self, reservation_id: &str) -> Option<ResourceAllocation> {
        self.core
            .state
            .lock()
            .allocations
            .values()
            .filter(|a| a.reservation_id == reservation_id)
            .max_by_key(|a| a.start_time)
            .cloned()
    }

    pub fn get_active_allocations(&self) -> Vec<ResourceAllocation> {
        let state = self.core.state.lock();
        let mut active: Vec<_> = state
            .allocations
            .values()
            .filter(|a| a.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        active
    }

    pub fn get_reservations_for_owner(&self, owner_id: &str) -> Vec<ResourceReservation> {
        let state = self.core.state.lock();
        let mut reservations: Vec<_> = state
            .reservations
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        reservations.sort_by_key(|r| r.created_at);
        reservations
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Pools
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn create_resource_pool(
        &self,
        name: &str,
        resource_type: ResourceType,
        resource_ids: &[ResourceId],
        strategy: AllocationStrategy,
    ) -> Result<PoolId> {
        self.core.with_state(|state| {
            state.create_resource_pool(name, resource_type, resource_ids, strategy)
        })
    }

    pub fn add_resource_to_pool(&self, pool_id: &str, resource_id: &str) -> Result<()> {
        self.core
            .with_state(|state| state.add_resource_to_pool(pool_id, resource_id))
    }

    pub fn remove_resource_from_pool(&self, pool_id: &str, resource_id: &str) -> Result<()> {
        self.core
            .with_state(|state| state.remove_resource_from_pool(pool_id, resource_id))
    }

    pub fn configure_pool_scaling(&self, pool_id: &str, scaling: ScalingConfig) -> Result<()> {
        self.core
            .with_state(|state| state.configure_pool_scaling(pool_id, scaling))
    }

    pub fn configure_pool_qos(&self, pool_id: &str, qos: QosConfig) -> Result<()> {
        self.core.with_state(|state| state.configure_pool_qos(pool_id, qos))
    }

    pub fn get_pool(&self, pool_id: &str) -> Result<ResourcePool> {
        self.core.state.lock().pool(pool_id).cloned()
    }

    pub fn get_all_pools(&self) -> Vec<ResourcePool> {
        self.core.state.lock().pools.values().cloned().collect()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Usage, predictions, statistics
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn update_resource_usage(&self, resource_id: &str, snapshot: UsageSnapshot) -> Result<()> {
        self.core
            .with_state(|state| state.update_resource_usage(resource_id, snapshot))
    }

    pub fn get_usage_history(&self, resource_id: &str, limit: Option<usize>) -> Result<Vec<UsageSnapshot>> {
        self.core.state.lock().get_usage_history(resource_id, limit)
    }

    /// Forecast now and refresh the cache
    pub fn predict_resource_usage(&self, resource_id: &str) -> Result<Option<UsagePrediction>> {
        let prediction = self.core.state.lock().predict_resource_usage(resource_id)?;
        if let Some(prediction) = &prediction {
            self.core
                .predictions
                .insert(resource_id.to_string(), prediction.clone());
        }
        Ok(prediction)
    }

    /// Forecast from the last monitoring tick (or on-demand prediction)
    pub fn get_prediction(&self, resource_id: &str) -> Option<UsagePrediction> {
        self.core
            .predictions
            .get(resource_id)
            .map(|entry| entry.value().clone())
    }

    pub fn get_manager_statistics(&self) -> ManagerStatistics {
        self.core.state.lock().statistics()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Events and on-demand ticks
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.core.bus.subscribe()
    }

    pub fn event_stats(&self) -> BusStats {
        self.core.bus.stats()
    }

    /// Refresh statistics and forecasts once
    pub fn run_monitoring_tick(&self) {
        self.core.monitoring_tick();
    }

    pub fn run_qos_tick(&self) -> Vec<QosViolation> {
        self.core.qos_tick()
    }

    pub fn run_cleanup_tick(&self) -> CleanupReport {
        self.core.cleanup_tick()
    }

    pub fn evaluate_scaling(&self) -> Vec<ScalingDecision> {
        self.core.scaling_tick()
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{AllocationStatus, ReservationStatus};
    use crate::monitoring::{QosGuarantee, QosMetric, QosOperator, RemediationRequest};
    use crate::resources::GIB;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn engine() -> (ResourceManager, ResourceId) {
        let engine = ResourceManager::new(EngineSettings::default());
        let id = engine
            .register_resource(
                ResourceType::Compute,
                "node-1",
                ResourceLimits::new(4.0, 8 * GIB),
                ResourceMetadata::default(),
            )
            .unwrap();
        (engine, id)
    }

    #[test]
    fn test_events_are_published_after_operations() {
        let (engine, _) = engine();
        let events = engine.subscribe();

        let rsv = engine
            .request_resources("agent", ResourceRequirements::new().cpu(1.0), RequestOptions::default())
            .unwrap();
        let names: Vec<_> = events.try_iter().map(|e| e.kind.name()).collect();
        assert_eq!(
            names,
            vec!["reservation_created", "reservation_confirmed", "allocation_activated"]
        );

        engine.cancel_reservation(&rsv, "done").unwrap();
        let names: Vec<_> = events.try_iter().map(|e| e.kind.name()).collect();
        assert_eq!(names, vec!["allocation_released", "reservation_cancelled"]);
    }

    #[test]
    fn test_queries_return_copies() {
        let (engine, id) = engine();
        let mut copy = engine.get_resource(&id).unwrap();
        copy.allocated.cpu = 3.0;

        assert_eq!(engine.get_resource(&id).unwrap().allocated.cpu, 0.0);
        assert!(engine.get_resource("res_missing").unwrap_err().is_not_found());
        assert_eq!(engine.get_resources_by_type(ResourceType::Compute).len(), 1);
        assert!(engine.get_resources_by_type(ResourceType::Gpu).is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_releases_active_allocations() {
        let (engine, id) = engine();
        engine.start().unwrap();
        assert!(engine.is_running());

        let rsv = engine
            .request_resources("agent", ResourceRequirements::new().cpu(2.0), RequestOptions::default())
            .unwrap();
        let allocation = engine.get_allocation_for_reservation(&rsv).unwrap();

        assert_eq!(engine.shutdown().await.unwrap(), 1);
        assert!(!engine.is_running());

        let allocation = engine.get_allocation(&allocation.id).unwrap();
        assert_eq!(allocation.status, AllocationStatus::Completed);
        assert_eq!(allocation.release_reason.as_deref(), Some(SHUTDOWN_REASON));
        assert_eq!(engine.get_resource(&id).unwrap().available.cpu, 4.0);

        assert!(engine.start().unwrap_err().is_state());
    }

    #[tokio::test]
    async fn test_requests_after_shutdown_are_rejected() {
        let (engine, id) = engine();
        engine.start().unwrap();
        engine
            .request_resources("agent", ResourceRequirements::new().cpu(4.0), RequestOptions::default())
            .unwrap();
        let waiting = engine
            .request_resources(
                "agent",
                ResourceRequirements::new().cpu(1.0),
                RequestOptions::new().wait_for_capacity(),
            )
            .unwrap();
        assert_eq!(engine.shutdown().await.unwrap(), 1);

        let err = engine
            .request_resources("agent", ResourceRequirements::new().cpu(1.0), RequestOptions::default())
            .unwrap_err();
        assert!(err.is_state());
        assert!(engine
            .update_resource_usage(&id, UsageSnapshot::new(10.0, GIB))
            .unwrap_err()
            .is_state());
        assert!(engine
            .register(ResourceSpec::new(ResourceType::Compute, "late", ResourceLimits::new(1.0, GIB)))
            .unwrap_err()
            .is_state());

        assert!(engine.get_active_allocations().is_empty());
        assert_eq!(engine.get_resource(&id).unwrap().available.cpu, 4.0);
        assert_eq!(
            engine.get_reservation(&waiting).unwrap().status,
            ReservationStatus::Pending
        );
    }

    #[test]
    fn test_events_follow_mutation_order_across_threads() {
        let engine = ResourceManager::new(EngineSettings::default());
        engine
            .register_resource(
                ResourceType::Compute,
                "single-slot",
                ResourceLimits::new(4.0, 8 * GIB),
                ResourceMetadata::default(),
            )
            .unwrap();
        let events = engine.subscribe();

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let engine = &engine;
                scope.spawn(move || {
                    for _ in 0..200 {
                        let owner = format!("agent-{}", worker);
                        match engine.request_resources(
                            &owner,
                            ResourceRequirements::new().cpu(4.0),
                            RequestOptions::default(),
                        ) {
                            Ok(rsv) => {
                                let allocation = engine.get_allocation_for_reservation(&rsv).unwrap();
                                engine.release_resources(&allocation.id, "done").unwrap();
                            }
                            Err(e) => assert!(e.is_capacity()),
                        }
                    }
                });
            }
        });

        // The slot holds one allocation, so a subscriber must never observe two live ones
        let mut live = 0i32;
        let mut activations = 0;
        for event in events.try_iter() {
            match event.kind {
                EventKind::AllocationActivated { .. } => {
                    live += 1;
                    activations += 1;
                }
                EventKind::AllocationReleased { .. } => live -= 1,
                _ => {}
            }
            assert!((0..=1).contains(&live), "observed {} live allocations", live);
        }
        assert_eq!(live, 0);
        assert!(activations > 0);
    }

    #[test]
    fn test_start_requires_runtime() {
        let (engine, _) = engine();
        assert!(engine.start().unwrap_err().is_state());
    }

    #[tokio::test]
    async fn test_cleanup_task_expires_waiting_reservations() {
        let settings = EngineSettings {
            cleanup_interval_ms: 20,
            ..Default::default()
        };
        let engine = ResourceManager::new(settings);
        engine
            .register_resource(ResourceType::Compute, "small", ResourceLimits::new(1.0, GIB), ResourceMetadata::default())
            .unwrap();
        engine.start().unwrap();

        let rsv = engine
            .request_resources(
                "agent",
                ResourceRequirements::new().cpu(8.0),
                RequestOptions::new().wait_for_capacity().timeout(Duration::from_millis(100)),
            )
            .unwrap();
        assert_eq!(engine.get_reservation(&rsv).unwrap().status, ReservationStatus::Pending);

        tokio::time::sleep(Duration::from_millis(250)).await;

        let reservation = engine.get_reservation(&rsv).unwrap();
        assert_eq!(reservation.status, ReservationStatus::Cancelled);
        assert_eq!(reservation.cancel_reason.as_deref(), Some("expired"));
        engine.shutdown().await.unwrap();
    }

    struct CountingHook(AtomicUsize);

    impl RemediationHook for CountingHook {
        fn remediate(&self, _request: &RemediationRequest) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_remediation_hook_runs_outside_the_lock() {
        let hook = Arc::new(CountingHook(AtomicUsize::new(0)));
        let engine = ResourceManager::with_remediation_hook(EngineSettings::default(), hook.clone());
        let id = engine
            .register_resource(ResourceType::Compute, "node", ResourceLimits::new(4.0, 8 * GIB), ResourceMetadata::default())
            .unwrap();
        let pool_id = engine
            .create_resource_pool("guarded", ResourceType::Compute, &[id.clone()], AllocationStrategy::Balanced)
            .unwrap();
        engine
            .configure_pool_qos(
                &pool_id,
                QosConfig::default()
                    .with_guarantee(QosGuarantee::new(QosMetric::CpuUsage, QosOperator::LessThan, 50.0))
                    .auto_remediate(),
            )
            .unwrap();
        engine
            .request_resources("agent", ResourceRequirements::new().cpu(1.0), RequestOptions::default())
            .unwrap();
        engine.update_resource_usage(&id, UsageSnapshot::new(90.0, GIB)).unwrap();

        let events = engine.subscribe();
        assert_eq!(engine.run_qos_tick().len(), 1);
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);

        let names: Vec<_> = events.try_iter().map(|e| e.kind.name()).collect();
        assert_eq!(names, vec!["qos_violation", "remediation_attempted"]);
    }

    #[test]
    fn test_monitoring_tick_caches_predictions() {
        let (engine, id) = engine();
        for i in 0..12 {
            engine
                .update_resource_usage(&id, UsageSnapshot::new(10.0 + i as f64, GIB))
                .unwrap();
        }
        assert!(engine.get_prediction(&id).is_none());

        engine.run_monitoring_tick();
        let prediction = engine.get_prediction(&id).unwrap();
        assert_eq!(prediction.samples, 12);

        engine.unregister_resource(&id).unwrap();
        assert!(engine.get_prediction(&id).is_none());
    }

    #[test]
    fn test_prediction_needs_history() {
        let (engine, id) = engine();
        engine.update_resource_usage(&id, UsageSnapshot::new(10.0, GIB)).unwrap();
        assert!(engine.predict_resource_usage(&id).unwrap().is_none());
        assert!(engine.predict_resource_usage("res_missing").unwrap_err().is_not_found());
    }
}
