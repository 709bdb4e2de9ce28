// src/monitoring/statistics.rs
//! Monitoring tick and aggregate statistics

use crate::allocation::AllocationStatus;
use crate::events::EventKind;
use crate::manager::state::EngineState;
use crate::pools::{PoolStatistics, ResourcePool};
use crate::resources::{ResourceLimits, ResourceStatus, UsageSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Samples averaged for the performance score
const PERFORMANCE_WINDOW: usize = 10;

/// Floor of the derived performance score
const MIN_PERFORMANCE: f64 = 0.1;

/// Engine-wide figures returned by `get_manager_statistics`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerStatistics {
    pub total_resources: usize,
    pub resources_by_status: BTreeMap<String, usize>,
    pub total_pools: usize,
    pub reservations_by_status: BTreeMap<String, usize>,
    pub active_allocations: usize,
    pub total_capacity: ResourceLimits,
    pub total_allocated: ResourceLimits,

    /// Mean utilization of all resources (0.0 - 1.0)
    pub utilization: f64,

    /// QoS violations recorded on all allocations
    pub qos_violations: usize,

    /// Mean efficiency of completed allocations
    pub average_efficiency: f64,
}

/// Mean cpu percent over the newest `window` samples
pub(crate) fn recent_cpu_average<'a>(
    samples: impl DoubleEndedIterator<Item = &'a UsageSnapshot>,
    window: usize,
) -> Option<f64> {
    let recent: Vec<f64> = samples.rev().take(window).map(|s| s.cpu_percent).collect();
    if recent.is_empty() {
        None
    } else {
        Some(recent.iter().sum::<f64>() / recent.len() as f64)
    }
}

impl EngineState {
    /// Refresh derived performance scores and pool statistics
    pub fn run_monitoring_at(&mut self, now: DateTime<Utc>) {
        for resource in self.resources.iter_mut() {
            let history = match self.usage_history.get(&resource.id) {
                Some(history) => history,
                None => continue,
            };
            if let Some(avg_cpu) = recent_cpu_average(history.iter(), PERFORMANCE_WINDOW) {
                resource.metadata.performance.score = (1.0 - avg_cpu / 100.0).max(MIN_PERFORMANCE);
            }
        }

        let pool_ids: Vec<_> = self.pools.keys().cloned().collect();
        for pool_id in &pool_ids {
            let statistics = match self.pools.get(pool_id) {
                Some(pool) => self.pool_statistics(pool, now),
                None => continue,
            };
            if let Some(pool) = self.pools.get_mut(pool_id) {
                pool.statistics = statistics;
            }
        }

        let active = self.active_allocation_count();
        let utilization = self.overall_utilization();
        metrics::gauge!("resource_engine_active_allocations").set(active as f64);
        metrics::gauge!("resource_engine_utilization").set(utilization);

        debug!(
            "Monitoring tick: {} resource(s), {} pool(s), {} active allocation(s), utilization {:.2}",
            self.resources.len(),
            self.pools.len(),
            active,
            utilization
        );
        self.emit(EventKind::MonitoringUpdated {
            resources: self.resources.len(),
            pools: self.pools.len(),
            active_allocations: active,
        });
    }

    pub fn run_monitoring(&mut self) {
        self.run_monitoring_at(Utc::now())
    }

    fn pool_statistics(&self, pool: &ResourcePool, now: DateTime<Utc>) -> PoolStatistics {
        let aggregates = self.pool_metrics(pool);
        let members: Vec<_> = pool
            .resource_ids
            .iter()
            .filter_map(|id| self.resources.get(id).ok())
            .collect();

        PoolStatistics {
            total_resources: members.len(),
            available_resources: members
                .iter()
                .filter(|r| r.status == ResourceStatus::Available)
                .count(),
            utilization: aggregates.utilization,
            cost_per_hour: members.iter().map(|r| r.cost * r.utilization()).sum(),
            active_allocations: aggregates.active_allocations,
            queue_depth: aggregates.queue_depth,
            updated_at: Some(now),
        }
    }

    fn overall_utilization(&self) -> f64 {
        if self.resources.is_empty() {
            return 0.0;
        }
        self.resources.iter().map(|r| r.utilization()).sum::<f64>() / self.resources.len() as f64
    }

    pub fn statistics(&self) -> ManagerStatistics {
        let mut stats = ManagerStatistics {
            total_resources: self.resources.len(),
            total_pools: self.pools.len(),
            active_allocations: self.active_allocation_count(),
            utilization: self.overall_utilization(),
            ..Default::default()
        };

        for resource in self.resources.iter() {
            *stats
                .resources_by_status
                .entry(resource.status.to_string())
                .or_default() += 1;
            stats.total_capacity = stats.total_capacity.add(&resource.capacity);
            stats.total_allocated = stats.total_allocated.add(&resource.allocated);
        }

        for reservation in self.reservations.values() {
            *stats
                .reservations_by_status
                .entry(reservation.status.to_string())
                .or_default() += 1;
        }

        let completed: Vec<f64> = self
            .allocations
            .values()
            .filter(|a| a.status == AllocationStatus::Completed)
            .map(|a| a.efficiency)
            .collect();
        if !completed.is_empty() {
            stats.average_efficiency = completed.iter().sum::<f64>() / completed.len() as f64;
        }

        stats.qos_violations = self.allocations.values().map(|a| a.qos_violations.len()).sum();
        stats
    }
}
