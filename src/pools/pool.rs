// src/pools/pool.rs
//! Pool entity and membership operations

use crate::events::EventKind;
use crate::manager::state::EngineState;
use crate::monitoring::qos::QosConfig;
use crate::resources::{ResourceId, ResourceType};
use crate::scheduling::AllocationStrategy;
use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};
use ulid::Ulid;

pub type PoolId = String;

/// Aggregated value a scaling rule looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMetric {
    /// Mean utilization of the member resources (0.0 - 1.0)
    Utilization,

    /// Reservations attached to members that are not active yet
    QueueDepth,
}

impl fmt::Display for ScalingMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalingMetric::Utilization => f.write_str("utilization"),
            ScalingMetric::QueueDepth => f.write_str("queue_depth"),
        }
    }
}

/// Auto-scaling policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingConfig {
    pub enabled: bool,

    /// Scale-down never goes below this many members
    pub min_size: usize,

    pub max_size: usize,

    pub scale_up_threshold: f64,

    pub scale_down_threshold: f64,

    /// Minimum time between two decisions
    pub cooldown_ms: u64,

    /// Evaluated in order; the first one that triggers wins
    pub metrics: Vec<ScalingMetric>,

    /// Time of the last emitted decision
    #[serde(default)]
    pub last_scaled_at: Option<DateTime<Utc>>,
}

impl ScalingConfig {
    /// Defaults for a pool created with `size` members
    pub fn for_size(size: usize, cooldown: Duration) -> Self {
        Self {
            enabled: true,
            min_size: size,
            max_size: size * 3,
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.3,
            cooldown_ms: cooldown.as_millis() as u64,
            metrics: vec![ScalingMetric::Utilization],
            last_scaled_at: None,
        }
    }

    pub fn with_bounds(mut self, min_size: usize, max_size: usize) -> Self {
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }

    pub fn with_thresholds(mut self, scale_up: f64, scale_down: f64) -> Self {
        self.scale_up_threshold = scale_up;
        self.scale_down_threshold = scale_down;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown_ms = cooldown.as_millis() as u64;
        self
    }

    pub fn with_metrics(mut self, metrics: Vec<ScalingMetric>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Still inside the cooldown window at `now`
    pub fn cooling_down(&self, now: DateTime<Utc>) -> bool {
        match self.last_scaled_at {
            Some(last) => (now - last).num_milliseconds() < self.cooldown_ms as i64,
            None => false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_size > self.max_size {
            return Err(EngineError::Validation(format!(
                "Scaling min {} exceeds max {}",
                self.min_size, self.max_size
            )));
        }
        if !self.scale_up_threshold.is_finite() || !self.scale_down_threshold.is_finite() {
            return Err(EngineError::Validation(
                "Scaling thresholds must be finite".to_string(),
            ));
        }
        if self.scale_down_threshold >= self.scale_up_threshold {
            return Err(EngineError::Validation(format!(
                "Scale-down threshold {} must be below scale-up threshold {}",
                self.scale_down_threshold, self.scale_up_threshold
            )));
        }
        Ok(())
    }
}

/// Aggregates refreshed by the monitoring tick
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStatistics {
    pub total_resources: usize,

    /// Members in `available` status
    pub available_resources: usize,

    /// Mean member utilization (0.0 - 1.0)
    pub utilization: f64,

    /// Sum of member cost weighted by utilization
    pub cost_per_hour: f64,

    pub active_allocations: usize,
    pub queue_depth: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Group of resources of one type sharing a scaling and QoS policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePool {
    pub id: PoolId,
    pub name: String,
    pub resource_type: ResourceType,
    pub resource_ids: Vec<ResourceId>,
    pub strategy: AllocationStrategy,
    pub scaling: ScalingConfig,
    pub qos: QosConfig,
    pub statistics: PoolStatistics,
    pub created_at: DateTime<Utc>,
}

impl ResourcePool {
    pub fn size(&self) -> usize {
        self.resource_ids.len()
    }

    pub fn contains(&self, resource_id: &str) -> bool {
        self.resource_ids.iter().any(|id| id == resource_id)
    }
}

impl EngineState {
    pub fn create_resource_pool(
        &mut self,
        name: &str,
        resource_type: ResourceType,
        resource_ids: &[ResourceId],
        strategy: AllocationStrategy,
    ) -> Result<PoolId> {
        if name.trim().is_empty() {
            return Err(EngineError::Validation("Pool name cannot be empty".to_string()));
        }

        let mut members: Vec<ResourceId> = Vec::with_capacity(resource_ids.len());
        for resource_id in resource_ids {
            self.check_pool_member(resource_id, resource_type)?;
            if !members.contains(resource_id) {
                members.push(resource_id.clone());
            }
        }

        let id = format!("pool_{}", Ulid::new());
        let pool = ResourcePool {
            id: id.clone(),
            name: name.to_string(),
            resource_type,
            scaling: ScalingConfig::for_size(members.len(), self.settings.scaling_cooldown()),
            resource_ids: members,
            strategy,
            qos: QosConfig::default(),
            statistics: PoolStatistics::default(),
            created_at: Utc::now(),
        };

        info!(
            "Created {} pool '{}' ({}) with {} resource(s)",
            resource_type,
            name,
            id,
            pool.size()
        );
        self.pools.insert(id.clone(), pool);
        metrics::gauge!("resource_engine_pools").set(self.pools.len() as f64);

        self.emit(EventKind::PoolCreated {
            pool_id: id.clone(),
            name: name.to_string(),
        });
        Ok(id)
    }

    pub fn add_resource_to_pool(&mut self, pool_id: &str, resource_id: &str) -> Result<()> {
        let resource_type = self.pool(pool_id)?.resource_type;
        self.check_pool_member(resource_id, resource_type)?;

        let pool = self.pool_mut(pool_id)?;
        if pool.contains(resource_id) {
            debug!("Resource {} already in pool {}", resource_id, pool_id);
            return Ok(());
        }
        pool.resource_ids.push(resource_id.to_string());

        info!("Added resource {} to pool {}", resource_id, pool_id);
        self.emit(EventKind::PoolResourceAdded {
            pool_id: pool_id.to_string(),
            resource_id: resource_id.to_string(),
        });
        Ok(())
    }

    pub fn remove_resource_from_pool(&mut self, pool_id: &str, resource_id: &str) -> Result<()> {
        let pool = self.pool(pool_id)?;
        if !pool.contains(resource_id) {
            return Err(EngineError::Validation(format!(
                "Resource {} is not a member of pool {}",
                resource_id, pool_id
            )));
        }
        if pool.size() <= pool.scaling.min_size {
            return Err(EngineError::InvalidState(format!(
                "Removing {} would shrink pool {} below its minimum of {}",
                resource_id, pool_id, pool.scaling.min_size
            )));
        }

        self.pool_mut(pool_id)?.resource_ids.retain(|id| id != resource_id);

        info!("Removed resource {} from pool {}", resource_id, pool_id);
        self.emit(EventKind::PoolResourceRemoved {
            pool_id: pool_id.to_string(),
            resource_id: resource_id.to_string(),
        });
        Ok(())
    }

    pub fn configure_pool_scaling(&mut self, pool_id: &str, mut scaling: ScalingConfig) -> Result<()> {
        scaling.validate()?;
        let pool = self.pool_mut(pool_id)?;
        scaling.last_scaled_at = pool.scaling.last_scaled_at;
        pool.scaling = scaling;
        debug!("Updated scaling policy of pool {}", pool_id);
        Ok(())
    }

    pub fn configure_pool_qos(&mut self, pool_id: &str, qos: QosConfig) -> Result<()> {
        qos.validate()?;
        self.pool_mut(pool_id)?.qos = qos;
        debug!("Updated QoS policy of pool {}", pool_id);
        Ok(())
    }

    pub(crate) fn pool(&self, pool_id: &str) -> Result<&ResourcePool> {
        self.pools
            .get(pool_id)
            .ok_or_else(|| EngineError::PoolNotFound(pool_id.to_string()))
    }

    fn pool_mut(&mut self, pool_id: &str) -> Result<&mut ResourcePool> {
        self.pools
            .get_mut(pool_id)
            .ok_or_else(|| EngineError::PoolNotFound(pool_id.to_string()))
    }

    fn check_pool_member(&self, resource_id: &str, expected: ResourceType) -> Result<()> {
        let resource = self.resources.get(resource_id)?;
        if resource.resource_type != expected {
            return Err(EngineError::Validation(format!(
                "Resource {} is {}, pool expects {}",
                resource_id, resource.resource_type, expected
            )));
        }
        Ok(())
    }

    /// Pools `resource_id` belongs to
    pub(crate) fn pools_containing<'a>(
        &'a self,
        resource_id: &'a str,
    ) -> impl Iterator<Item = &'a ResourcePool> + 'a {
        self.pools.values().filter(move |p| p.contains(resource_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{ResourceLimits, ResourceSpec, GIB};
    use crate::utils::config::EngineSettings;

    fn state_with(types: &[ResourceType]) -> (EngineState, Vec<ResourceId>) {
        let mut state = EngineState::new(EngineSettings::default());
        let ids = types
            .iter()
            .enumerate()
            .map(|(i, t)| {
                state
                    .register_resource(ResourceSpec::new(*t, format!("r{}", i), ResourceLimits::new(4.0, 8 * GIB)))
                    .unwrap()
            })
            .collect();
        (state, ids)
    }

    #[test]
    fn test_create_pool_defaults() {
        let (mut state, ids) = state_with(&[ResourceType::Compute, ResourceType::Compute]);
        let pool_id = state
            .create_resource_pool("workers", ResourceType::Compute, &ids, AllocationStrategy::BestFit)
            .unwrap();

        let pool = state.pool(&pool_id).unwrap();
        assert!(pool_id.starts_with("pool_"));
        assert_eq!(pool.size(), 2);
        assert_eq!(pool.scaling.min_size, 2);
        assert_eq!(pool.scaling.max_size, 6);
        assert_eq!(pool.scaling.scale_up_threshold, 0.8);
        assert_eq!(pool.scaling.scale_down_threshold, 0.3);
        assert_eq!(pool.scaling.metrics, vec![ScalingMetric::Utilization]);
        assert!(pool.qos.guarantees.is_empty());
    }

    #[test]
    fn test_create_pool_rejects_type_mismatch() {
        let (mut state, ids) = state_with(&[ResourceType::Compute, ResourceType::Gpu]);
        let err = state
            .create_resource_pool("mixed", ResourceType::Compute, &ids, AllocationStrategy::Balanced)
            .unwrap_err();
        assert!(err.is_validation());
        assert!(state.pools.is_empty());

        let err = state
            .create_resource_pool("ghost", ResourceType::Compute, &["res_missing".to_string()], AllocationStrategy::Balanced)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_add_and_remove_members() {
        let (mut state, ids) = state_with(&[ResourceType::Compute, ResourceType::Compute, ResourceType::Storage]);
        let pool_id = state
            .create_resource_pool("workers", ResourceType::Compute, &ids[..1], AllocationStrategy::Balanced)
            .unwrap();

        state.add_resource_to_pool(&pool_id, &ids[1]).unwrap();
        assert!(state.add_resource_to_pool(&pool_id, &ids[2]).unwrap_err().is_validation());
        assert_eq!(state.pool(&pool_id).unwrap().size(), 2);

        state.remove_resource_from_pool(&pool_id, &ids[1]).unwrap();
        // min_size is 1, set at creation
        let err = state.remove_resource_from_pool(&pool_id, &ids[0]).unwrap_err();
        assert!(err.is_state());
        assert_eq!(state.pool(&pool_id).unwrap().size(), 1);
    }

    #[test]
    fn test_configure_scaling_validates() {
        let (mut state, ids) = state_with(&[ResourceType::Compute]);
        let pool_id = state
            .create_resource_pool("workers", ResourceType::Compute, &ids, AllocationStrategy::Balanced)
            .unwrap();

        let bad = ScalingConfig::for_size(1, Duration::ZERO).with_bounds(3, 2);
        assert!(state.configure_pool_scaling(&pool_id, bad).unwrap_err().is_validation());

        let inverted = ScalingConfig::for_size(1, Duration::ZERO).with_thresholds(0.2, 0.5);
        assert!(state.configure_pool_scaling(&pool_id, inverted).is_err());

        let good = ScalingConfig::for_size(1, Duration::ZERO).with_bounds(0, 4);
        state.configure_pool_scaling(&pool_id, good).unwrap();
        assert_eq!(state.pool(&pool_id).unwrap().scaling.max_size, 4);
    }

    #[test]
    fn test_unregister_removes_from_pool() {
        let (mut state, ids) = state_with(&[ResourceType::Compute, ResourceType::Compute]);
        let pool_id = state
            .create_resource_pool("workers", ResourceType::Compute, &ids, AllocationStrategy::Balanced)
            .unwrap();

        state.unregister_resource(&ids[0]).unwrap();
        assert_eq!(state.pool(&pool_id).unwrap().resource_ids, vec![ids[1].clone()]);
    }
}
