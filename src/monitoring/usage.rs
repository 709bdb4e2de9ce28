// src/monitoring/usage.rs
//! Usage ingestion

use crate::allocation::calculate_efficiency;
use crate::manager::state::EngineState;
use crate::resources::UsageSnapshot;
use crate::utils::errors::{EngineError, Result};
use tracing::trace;

impl EngineState {
    /// Record a usage snapshot and propagate it to the resource's active
    /// allocations
    pub fn update_resource_usage(&mut self, resource_id: &str, snapshot: UsageSnapshot) -> Result<()> {
        self.ensure_running("record usage")?;
        if !snapshot.cpu_percent.is_finite() || snapshot.cpu_percent < 0.0 {
            return Err(EngineError::Validation(format!(
                "cpu_percent must be a non-negative number, got {}",
                snapshot.cpu_percent
            )));
        }
        if snapshot.custom.values().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(EngineError::Validation(
                "Custom usage values must be non-negative numbers".to_string(),
            ));
        }

        let resource = self.resources.get(resource_id)?;
        let usage = snapshot.to_absolute(&resource.capacity);
        let allocation_ids: Vec<_> = self
            .active_allocations_on(resource)
            .map(|a| a.id.clone())
            .collect();

        for allocation_id in &allocation_ids {
            if let Some(allocation) = self.allocations.get_mut(allocation_id) {
                allocation.actual_usage = usage.clone();
                allocation.efficiency = calculate_efficiency(&allocation.allocated, &usage);
                allocation.last_snapshot = Some(snapshot.clone());
            }
        }

        let limit = self.settings.usage_history_limit;
        let history = self.usage_history.entry(resource_id.to_string()).or_default();
        history.push_back(snapshot);
        while history.len() > limit {
            history.pop_front();
        }

        trace!(
            "Usage for {} recorded ({} sample(s), {} allocation(s) updated)",
            resource_id,
            history.len(),
            allocation_ids.len()
        );
        Ok(())
    }

    /// Recorded samples, oldest first; `limit` keeps the newest `n`
    pub fn get_usage_history(&self, resource_id: &str, limit: Option<usize>) -> Result<Vec<UsageSnapshot>> {
        self.resources.get(resource_id)?;
        let history = match self.usage_history.get(resource_id) {
            Some(history) => history,
            None => return Ok(Vec::new()),
        };

        let skip = limit.map_or(0, |n| history.len().saturating_sub(n));
        Ok(history.iter().skip(skip).cloned().collect())
    }
}
