// src/pools/scaling.rs
//! Auto-scaling evaluation
//!
//! The engine only decides *that* a pool should grow or shrink. Decisions are
//! published as events; provisioning is up to whoever listens. Membership is
//! never changed here.

use crate::allocation::ReservationStatus;
use crate::events::EventKind;
use crate::manager::state::EngineState;
use crate::pools::pool::{PoolId, ResourcePool, ScalingMetric};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingDirection {
    Up,
    Down,
}

impl fmt::Display for ScalingDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalingDirection::Up => f.write_str("up"),
            ScalingDirection::Down => f.write_str("down"),
        }
    }
}

/// Decision emitted for one pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub pool_id: PoolId,
    pub direction: ScalingDirection,

    /// Metric that triggered the decision
    pub metric: ScalingMetric,
    pub value: f64,
    pub threshold: f64,

    pub current_size: usize,
    pub target_size: usize,
    pub timestamp: DateTime<Utc>,
}

/// Live aggregates of one pool
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoolMetrics {
    /// Mean member utilization
    pub utilization: f64,

    /// Pending or confirmed reservations attached to members
    pub queue_depth: usize,

    pub active_allocations: usize,
}

impl PoolMetrics {
    pub fn value(&self, metric: ScalingMetric) -> f64 {
        match metric {
            ScalingMetric::Utilization => self.utilization,
            ScalingMetric::QueueDepth => self.queue_depth as f64,
        }
    }
}

impl EngineState {
    pub(crate) fn pool_metrics(&self, pool: &ResourcePool) -> PoolMetrics {
        let members: Vec<_> = pool
            .resource_ids
            .iter()
            .filter_map(|id| self.resources.get(id).ok())
            .collect();

        if members.is_empty() {
            return PoolMetrics::default();
        }

        let utilization =
            members.iter().map(|r| r.utilization()).sum::<f64>() / members.len() as f64;

        let queue_depth = members
            .iter()
            .flat_map(|r| r.reservations.iter())
            .filter_map(|id| self.reservations.get(id))
            .filter(|r| {
                matches!(r.status, ReservationStatus::Pending | ReservationStatus::Confirmed)
            })
            .count();

        let active_allocations = members
            .iter()
            .map(|r| self.active_allocations_on(r).count())
            .sum();

        PoolMetrics {
            utilization,
            queue_depth,
            active_allocations,
        }
    }

    /// Evaluate every pool's scaling policy at `now`
    ///
    /// At most one decision per pool; the first configured metric that
    /// crosses a threshold wins.
    pub fn evaluate_scaling_at(&mut self, now: DateTime<Utc>) -> Vec<ScalingDecision> {
        let mut decisions = Vec::new();

        for pool in self.pools.values() {
            let scaling = &pool.scaling;
            if !scaling.enabled {
                continue;
            }
            if scaling.cooling_down(now) {
                debug!("Pool {} is cooling down, skipping evaluation", pool.id);
                continue;
            }

            let aggregates = self.pool_metrics(pool);
            let size = pool.size();

            let decision = scaling.metrics.iter().find_map(|&metric| {
                let value = aggregates.value(metric);
                let (direction, threshold, target) =
                    if value > scaling.scale_up_threshold && size < scaling.max_size {
                        (ScalingDirection::Up, scaling.scale_up_threshold, size + 1)
                    } else if value < scaling.scale_down_threshold && size > scaling.min_size {
                        (ScalingDirection::Down, scaling.scale_down_threshold, size - 1)
                    } else {
                        return None;
                    };

                Some(ScalingDecision {
                    pool_id: pool.id.clone(),
                    direction,
                    metric,
                    value,
                    threshold,
                    current_size: size,
                    target_size: target,
                    timestamp: now,
                })
            });

            decisions.extend(decision);
        }

        for decision in &decisions {
            if let Some(pool) = self.pools.get_mut(&decision.pool_id) {
                pool.scaling.last_scaled_at = Some(now);
            }

            info!(
                "Pool {} should scale {} ({} {:.2} vs {:.2}): {} -> {}",
                decision.pool_id,
                decision.direction,
                decision.metric,
                decision.value,
                decision.threshold,
                decision.current_size,
                decision.target_size
            );
            metrics::counter!(
                "resource_engine_scaling_decisions_total",
                "direction" => decision.direction.to_string()
            )
            .increment(1);

            let kind = match decision.direction {
                ScalingDirection::Up => EventKind::PoolScaledUp {
                    decision: decision.clone(),
                },
                ScalingDirection::Down => EventKind::PoolScaledDown {
                    decision: decision.clone(),
                },
            };
            self.emit(kind);
        }

        decisions
    }

    pub fn evaluate_scaling(&mut self) -> Vec<ScalingDecision> {
        self.evaluate_scaling_at(Utc::now())
    }
}
