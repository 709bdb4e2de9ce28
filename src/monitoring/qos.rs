// src/monitoring/qos.rs
//! QoS guarantees and violation detection
//!
//! Each pool may carry guarantees `{metric, threshold, operator}`. The QoS
//! tick checks every active allocation against the guarantees of every pool
//! containing its resource. Violations are recorded data, never errors.
//!
//! Severity is derived from the relative deviation `|actual - threshold| /
//! |threshold|`:
//!
//! | Deviation | Severity |
//! |-----------|----------|
//! | > 0.5     | critical |
//! | > 0.3     | high     |
//! | > 0.1     | medium   |
//! | otherwise | low      |

use crate::allocation::{AllocationId, ResourceAllocation};
use crate::events::EventKind;
use crate::manager::state::EngineState;
use crate::pools::PoolId;
use crate::resources::ResourceId;
use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QosMetric {
    /// Percent of the resource's cpu in use, from the latest snapshot
    CpuUsage,

    /// Percent of the allocated memory in use
    MemoryUsage,

    /// Allocation efficiency (0.0 - 1.0)
    Efficiency,
}

impl QosMetric {
    /// Current value for `allocation`, `None` until usage has been reported
    pub fn value_for(&self, allocation: &ResourceAllocation) -> Option<f64> {
        let snapshot = allocation.last_snapshot.as_ref()?;
        match self {
            QosMetric::CpuUsage => Some(snapshot.cpu_percent),
            QosMetric::MemoryUsage => {
                if allocation.allocated.memory == 0 {
                    None
                } else {
                    Some(
                        allocation.actual_usage.memory as f64 / allocation.allocated.memory as f64
                            * 100.0,
                    )
                }
            }
            QosMetric::Efficiency => Some(allocation.efficiency),
        }
    }
}

impl fmt::Display for QosMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QosMetric::CpuUsage => "cpu_usage",
            QosMetric::MemoryUsage => "memory_usage",
            QosMetric::Efficiency => "efficiency",
        };
        f.write_str(s)
    }
}

/// Comparison the metric must satisfy against the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QosOperator {
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Equal,
}

impl QosOperator {
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            QosOperator::LessThan => value < threshold,
            QosOperator::LessOrEqual => value <= threshold,
            QosOperator::GreaterThan => value > threshold,
            QosOperator::GreaterOrEqual => value >= threshold,
            QosOperator::Equal => (value - threshold).abs() < f64::EPSILON,
        }
    }
}

impl fmt::Display for QosOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QosOperator::LessThan => "<",
            QosOperator::LessOrEqual => "<=",
            QosOperator::GreaterThan => ">",
            QosOperator::GreaterOrEqual => ">=",
            QosOperator::Equal => "==",
        };
        f.write_str(s)
    }
}

/// Hard rule an active allocation is expected to satisfy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QosGuarantee {
    pub metric: QosMetric,
    pub threshold: f64,
    pub operator: QosOperator,
}

impl QosGuarantee {
    pub fn new(metric: QosMetric, operator: QosOperator, threshold: f64) -> Self {
        Self {
            metric,
            threshold,
            operator,
        }
    }
}

/// Soft target, recorded for reporting only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QosObjective {
    pub metric: QosMetric,
    pub target: f64,

    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViolationPolicy {
    /// Hand violations to the remediation hook
    pub auto_remediate: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QosConfig {
    pub guarantees: Vec<QosGuarantee>,
    pub objectives: Vec<QosObjective>,
    pub violation_policy: ViolationPolicy,
}

impl QosConfig {
    pub fn with_guarantee(mut self, guarantee: QosGuarantee) -> Self {
        self.guarantees.push(guarantee);
        self
    }

    pub fn with_objective(mut self, objective: QosObjective) -> Self {
        self.objectives.push(objective);
        self
    }

    pub fn auto_remediate(mut self) -> Self {
        self.violation_policy.auto_remediate = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        for guarantee in &self.guarantees {
            if !guarantee.threshold.is_finite() {
                return Err(EngineError::Validation(format!(
                    "QoS threshold for {} must be finite",
                    guarantee.metric
                )));
            }
        }
        for objective in &self.objectives {
            if !objective.target.is_finite() || !objective.weight.is_finite() {
                return Err(EngineError::Validation(format!(
                    "QoS objective for {} must be finite",
                    objective.metric
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_deviation(deviation: f64) -> Self {
        if deviation > 0.5 {
            Severity::Critical
        } else if deviation > 0.3 {
            Severity::High
        } else if deviation > 0.1 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Relative deviation of `actual` from `threshold`
///
/// With a zero threshold the absolute difference is used.
pub fn relative_deviation(actual: f64, threshold: f64) -> f64 {
    if threshold == 0.0 {
        actual.abs()
    } else {
        (actual - threshold).abs() / threshold.abs()
    }
}

/// One failed guarantee check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QosViolation {
    pub metric: QosMetric,
    pub operator: QosOperator,
    pub threshold: f64,
    pub actual: f64,
    pub deviation: f64,
    pub severity: Severity,
    pub pool_id: PoolId,

    /// Last time the guarantee was seen failing
    pub timestamp: DateTime<Utc>,

    /// First failing check of this episode
    pub first_seen: DateTime<Utc>,

    /// Consecutive failing checks folded into this record
    #[serde(default = "default_occurrences")]
    pub occurrences: u32,

    /// Set once the guarantee holds again
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

fn default_occurrences() -> u32 {
    1
}

impl QosViolation {
    /// Check `guarantee` against `actual`, returning the violation if any
    pub fn check(
        guarantee: &QosGuarantee,
        actual: f64,
        pool_id: &str,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        if guarantee.operator.holds(actual, guarantee.threshold) {
            return None;
        }

        let deviation = relative_deviation(actual, guarantee.threshold);
        Some(Self {
            metric: guarantee.metric,
            operator: guarantee.operator,
            threshold: guarantee.threshold,
            actual,
            deviation,
            severity: Severity::from_deviation(deviation),
            pool_id: pool_id.to_string(),
            timestamp: now,
            first_seen: now,
            occurrences: 1,
            resolved_at: None,
        })
    }

    /// Same pool and guarantee
    pub fn matches(&self, guarantee: &QosGuarantee, pool_id: &str) -> bool {
        self.pool_id == pool_id
            && self.metric == guarantee.metric
            && self.operator == guarantee.operator
            && self.threshold == guarantee.threshold
    }

    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// Record `violation` in an allocation's history
///
/// A guarantee that keeps failing updates its open record instead of adding
/// a new one. Returns the record as stored.
pub fn record_violation(history: &mut Vec<QosViolation>, violation: QosViolation) -> QosViolation {
    let guarantee = QosGuarantee::new(violation.metric, violation.operator, violation.threshold);
    let open = history
        .iter_mut()
        .rev()
        .find(|v| v.is_open() && v.matches(&guarantee, &violation.pool_id));

    match open {
        Some(existing) => {
            existing.actual = violation.actual;
            existing.deviation = violation.deviation;
            existing.severity = violation.severity;
            existing.timestamp = violation.timestamp;
            existing.occurrences += 1;
            existing.clone()
        }
        None => {
            history.push(violation.clone());
            violation
        }
    }
}

/// Close the open record for `guarantee` in `pool_id`, if any
pub fn resolve_violation(
    history: &mut [QosViolation],
    guarantee: &QosGuarantee,
    pool_id: &str,
    now: DateTime<Utc>,
) -> bool {
    match history
        .iter_mut()
        .rev()
        .find(|v| v.is_open() && v.matches(guarantee, pool_id))
    {
        Some(open) => {
            open.resolved_at = Some(now);
            true
        }
        None => false,
    }
}

/// Work handed to the remediation hook once the engine lock is released
#[derive(Debug, Clone)]
pub struct RemediationRequest {
    pub allocation_id: AllocationId,
    pub resource_id: ResourceId,
    pub pool_id: PoolId,
    pub violation: QosViolation,
}

/// Extension point for corrective action on QoS violations
///
/// Hooks run outside the engine's critical section and must not block; slow
/// work should be handed off to a task of its own.
pub trait RemediationHook: Send + Sync {
    fn remediate(&self, request: &RemediationRequest);
}

/// Default hook: records the attempt and does nothing else
#[derive(Debug, Default)]
pub struct LoggingRemediation;

impl RemediationHook for LoggingRemediation {
    fn remediate(&self, request: &RemediationRequest) {
        let v = &request.violation;
        match v.metric {
            QosMetric::CpuUsage => info!(
                "Remediation for {}: cpu usage {:.1} {} {:.1} on {}, no action configured",
                request.allocation_id, v.actual, v.operator, v.threshold, request.resource_id
            ),
            QosMetric::MemoryUsage => info!(
                "Remediation for {}: memory usage {:.1} {} {:.1} on {}, no action configured",
                request.allocation_id, v.actual, v.operator, v.threshold, request.resource_id
            ),
            QosMetric::Efficiency => info!(
                "Remediation for {}: efficiency {:.2} {} {:.2}, no action configured",
                request.allocation_id, v.actual, v.operator, v.threshold
            ),
        }
    }
}

impl EngineState {
    /// Check every active allocation against its pools' guarantees
    pub fn run_qos_checks_at(&mut self, now: DateTime<Utc>) -> Vec<QosViolation> {
        let mut allocation_ids: Vec<_> = self
            .allocations
            .values()
            .filter(|a| a.is_active())
            .map(|a| a.id.clone())
            .collect();
        allocation_ids.sort();

        let mut found = Vec::new();
        let mut recovered = Vec::new();
        for allocation_id in &allocation_ids {
            let allocation = &self.allocations[allocation_id];
            for pool in self.pools_containing(&allocation.resource_id) {
                for guarantee in &pool.qos.guarantees {
                    let actual = match guarantee.metric.value_for(allocation) {
                        Some(value) => value,
                        None => continue,
                    };
                    match QosViolation::check(guarantee, actual, &pool.id, now) {
                        Some(violation) => found.push((
                            allocation_id.clone(),
                            allocation.resource_id.clone(),
                            pool.qos.violation_policy.auto_remediate,
                            violation,
                        )),
                        None => recovered.push((allocation_id.clone(), pool.id.clone(), guarantee.clone())),
                    }
                }
            }
        }

        for (allocation_id, pool_id, guarantee) in recovered {
            if let Some(allocation) = self.allocations.get_mut(&allocation_id) {
                if resolve_violation(&mut allocation.qos_violations, &guarantee, &pool_id, now) {
                    info!(
                        "QoS on {} back within {} {} {:.2}",
                        allocation_id, guarantee.metric, guarantee.operator, guarantee.threshold
                    );
                }
            }
        }

        let mut violations = Vec::with_capacity(found.len());
        for (allocation_id, resource_id, auto_remediate, violation) in found {
            let violation = match self.allocations.get_mut(&allocation_id) {
                Some(allocation) => record_violation(&mut allocation.qos_violations, violation),
                None => violation,
            };

            warn!(
                "QoS violation on {}: {} {:.2} not {} {:.2} ({}, check #{})",
                allocation_id,
                violation.metric,
                violation.actual,
                violation.operator,
                violation.threshold,
                violation.severity,
                violation.occurrences
            );
            metrics::counter!(
                "resource_engine_qos_violations_total",
                "severity" => violation.severity.to_string()
            )
            .increment(1);

            self.emit(EventKind::QosViolation {
                allocation_id: allocation_id.clone(),
                pool_id: violation.pool_id.clone(),
                violation: violation.clone(),
            });

            if auto_remediate {
                self.queue_remediation(RemediationRequest {
                    allocation_id,
                    resource_id,
                    pool_id: violation.pool_id.clone(),
                    violation: violation.clone(),
                });
            }
            violations.push(violation);
        }

        debug!(
            "QoS check over {} active allocation(s): {} violation(s)",
            allocation_ids.len(),
            violations.len()
        );
        violations
    }

    pub fn run_qos_checks(&mut self) -> Vec<QosViolation> {
        self.run_qos_checks_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::RequestOptions;
    use crate::resources::{
        ResourceLimits, ResourceRequirements, ResourceSpec, ResourceType, UsageSnapshot, GIB,
    };
    use crate::scheduling::AllocationStrategy;
    use crate::utils::config::EngineSettings;

    #[test]
    fn test_severity_bands() {
        assert_eq!(Severity::from_deviation(0.6), Severity::Critical);
        assert_eq!(Severity::from_deviation(0.5), Severity::High);
        assert_eq!(Severity::from_deviation(0.31), Severity::High);
        assert_eq!(Severity::from_deviation(0.2), Severity::Medium);
        assert_eq!(Severity::from_deviation(0.1), Severity::Low);
        assert_eq!(Severity::from_deviation(0.0), Severity::Low);
    }

    #[test]
    fn test_relative_deviation() {
        assert!((relative_deviation(90.0, 60.0) - 0.5).abs() < 1e-9);
        assert_eq!(relative_deviation(0.4, 0.0), 0.4);
    }

    #[test]
    fn test_check_produces_violation() {
        let guarantee = QosGuarantee::new(QosMetric::CpuUsage, QosOperator::LessThan, 50.0);
        assert!(QosViolation::check(&guarantee, 40.0, "pool_1", Utc::now()).is_none());

        let violation = QosViolation::check(&guarantee, 80.0, "pool_1", Utc::now()).unwrap();
        assert_eq!(violation.severity, Severity::Critical);
        assert!((violation.deviation - 0.6).abs() < 1e-9);
    }

    fn state_with_guarded_pool(auto_remediate: bool) -> (EngineState, String) {
        let mut state = EngineState::new(EngineSettings::default());
        let id = state
            .register_resource(ResourceSpec::new(
                ResourceType::Compute,
                "node",
                ResourceLimits::new(4.0, 8 * GIB),
            ))
            .unwrap();
        let pool_id = state
            .create_resource_pool("guarded", ResourceType::Compute, &[id.clone()], AllocationStrategy::Balanced)
            .unwrap();

        let mut qos = QosConfig::default()
            .with_guarantee(QosGuarantee::new(QosMetric::CpuUsage, QosOperator::LessOrEqual, 60.0));
        if auto_remediate {
            qos = qos.auto_remediate();
        }
        state.configure_pool_qos(&pool_id, qos).unwrap();

        state
            .request_resources("agent", ResourceRequirements::new().cpu(2.0).memory(GIB), RequestOptions::default())
            .unwrap();
        (state, id)
    }

    #[test]
    fn test_allocations_without_usage_are_skipped() {
        let (mut state, _) = state_with_guarded_pool(false);
        assert!(state.run_qos_checks().is_empty());
    }

    #[test]
    fn test_violation_is_recorded_on_allocation() {
        let (mut state, id) = state_with_guarded_pool(false);
        state.update_resource_usage(&id, UsageSnapshot::new(75.0, GIB)).unwrap();
        state.take_events();

        let violations = state.run_qos_checks();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Medium);

        let allocation = state.allocations.values().next().unwrap();
        assert_eq!(allocation.qos_violations.len(), 1);
        assert!(state
            .take_events()
            .iter()
            .any(|e| matches!(e.kind, EventKind::QosViolation { .. })));
        assert!(state.take_remediations().is_empty());
    }

    #[test]
    fn test_persistent_violation_is_folded_into_one_record() {
        let (mut state, id) = state_with_guarded_pool(false);
        state.update_resource_usage(&id, UsageSnapshot::new(75.0, GIB)).unwrap();

        for _ in 0..5 {
            assert_eq!(state.run_qos_checks().len(), 1);
        }

        let allocation = state.allocations.values().next().unwrap();
        assert_eq!(allocation.qos_violations.len(), 1);
        assert_eq!(allocation.qos_violations[0].occurrences, 5);
        assert!(allocation.qos_violations[0].is_open());
    }

    #[test]
    fn test_recovery_closes_episode() {
        let (mut state, id) = state_with_guarded_pool(false);
        state.update_resource_usage(&id, UsageSnapshot::new(75.0, GIB)).unwrap();
        state.run_qos_checks();

        state.update_resource_usage(&id, UsageSnapshot::new(30.0, GIB)).unwrap();
        assert!(state.run_qos_checks().is_empty());

        state.update_resource_usage(&id, UsageSnapshot::new(80.0, GIB)).unwrap();
        state.run_qos_checks();

        let history = &state.allocations.values().next().unwrap().qos_violations;
        assert_eq!(history.len(), 2);
        assert!(history[0].resolved_at.is_some());
        assert!(history[1].is_open());
        assert_eq!(history[1].occurrences, 1);
    }

    #[test]
    fn test_auto_remediation_is_queued() {
        let (mut state, id) = state_with_guarded_pool(true);
        state.update_resource_usage(&id, UsageSnapshot::new(95.0, GIB)).unwrap();

        state.run_qos_checks();
        let requests = state.take_remediations();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].resource_id, id);
        assert_eq!(requests[0].violation.severity, Severity::Critical);
    }
}
