// src/prediction/optimizer.rs
//! Usage forecasting and recommendations
//!
//! ```text
//! usage history (>= 10 samples)
//!        │
//!        ├─ cpu ────┐
//!        ├─ memory ─┼─► OLS fit ─► 24 hourly points + trend
//!        └─ disk ───┘
//!        │
//!        └─ last 10 samples ─► recommendations
//! ```

use crate::manager::state::EngineState;
use crate::monitoring::statistics::recent_cpu_average;
use crate::prediction::regression::{fit_ols, LinearFit};
use crate::resources::{Dimension, ResourceId, ResourceLimits, UsageSnapshot};
use crate::utils::errors::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Samples needed before a forecast is attempted
pub const MIN_SAMPLES: usize = 10;

/// Hourly points produced per dimension
pub const FORECAST_HORIZON: usize = 24;

/// Slopes within this band count as stable
pub const TREND_EPSILON: f64 = 0.1;

/// Samples looked at for recommendations
const RECENT_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl Trend {
    pub fn from_slope(slope: f64) -> Self {
        if slope > TREND_EPSILON {
            Trend::Increasing
        } else if slope < -TREND_EPSILON {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Increasing => f.write_str("increasing"),
            Trend::Decreasing => f.write_str("decreasing"),
            Trend::Stable => f.write_str("stable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,

    /// Decays with distance: `max(0.1, 1 - step * 0.05)`
    pub confidence: f64,
}

/// Forecast of one dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionForecast {
    pub dimension: Dimension,
    pub fit: LinearFit,
    pub trend: Trend,
    pub points: Vec<ForecastPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    ScaleUp,
    ScaleDown,
    IncreaseMemory,
    ReduceMemory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub message: String,

    /// Figure that triggered it (cpu percent or memory ratio)
    pub value: f64,
}

/// Forecast and advice for one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsagePrediction {
    pub resource_id: ResourceId,
    pub generated_at: DateTime<Utc>,
    pub samples: usize,
    pub forecasts: Vec<DimensionForecast>,
    pub recommendations: Vec<Recommendation>,
}

impl UsagePrediction {
    pub fn forecast(&self, dimension: &Dimension) -> Option<&DimensionForecast> {
        self.forecasts.iter().find(|f| &f.dimension == dimension)
    }
}

/// Confidence of the point `step` hours ahead
pub fn confidence_at(step: usize) -> f64 {
    (1.0 - step as f64 * 0.05).max(0.1)
}

fn forecast_dimension(
    dimension: Dimension,
    values: &[f64],
    last_timestamp: DateTime<Utc>,
) -> Option<DimensionForecast> {
    let fit = fit_ols(values)?;
    let last_index = values.len() - 1;

    let points = (1..=FORECAST_HORIZON)
        .map(|step| ForecastPoint {
            timestamp: last_timestamp + Duration::hours(step as i64),
            value: fit.at((last_index + step) as f64).max(0.0),
            confidence: confidence_at(step),
        })
        .collect();

    Some(DimensionForecast {
        dimension,
        trend: Trend::from_slope(fit.slope),
        fit,
        points,
    })
}

fn recommend(history: &[UsageSnapshot], capacity: &ResourceLimits) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    if let Some(avg_cpu) = recent_cpu_average(history.iter(), RECENT_WINDOW) {
        if avg_cpu > 80.0 {
            recommendations.push(Recommendation {
                kind: RecommendationKind::ScaleUp,
                message: format!(
                    "High cpu usage ({:.1}%), scale up or optimize the workload",
                    avg_cpu
                ),
                value: avg_cpu,
            });
        } else if avg_cpu < 20.0 {
            recommendations.push(Recommendation {
                kind: RecommendationKind::ScaleDown,
                message: format!("Low cpu usage ({:.1}%), consider scaling down", avg_cpu),
                value: avg_cpu,
            });
        }
    }

    if capacity.memory > 0 {
        let recent: Vec<f64> = history
            .iter()
            .rev()
            .take(RECENT_WINDOW)
            .map(|s| s.memory as f64)
            .collect();
        let ratio = recent.iter().sum::<f64>() / recent.len().max(1) as f64 / capacity.memory as f64;

        if ratio > 0.9 {
            recommendations.push(Recommendation {
                kind: RecommendationKind::IncreaseMemory,
                message: format!(
                    "Memory at {:.0}% of capacity, increase the memory allocation",
                    ratio * 100.0
                ),
                value: ratio,
            });
        } else if ratio < 0.3 {
            recommendations.push(Recommendation {
                kind: RecommendationKind::ReduceMemory,
                message: format!(
                    "Memory at {:.0}% of capacity, reduce the memory allocation",
                    ratio * 100.0
                ),
                value: ratio,
            });
        }
    }

    recommendations
}

/// Forecast `history` (oldest first) of a resource with `capacity`
///
/// Returns `None` with fewer than [`MIN_SAMPLES`] samples.
pub fn predict_usage(
    resource_id: &str,
    history: &[UsageSnapshot],
    capacity: &ResourceLimits,
    now: DateTime<Utc>,
) -> Option<UsagePrediction> {
    if history.len() < MIN_SAMPLES {
        return None;
    }
    let last_timestamp = history.last()?.timestamp;

    let series: [(Dimension, Vec<f64>); 3] = [
        (Dimension::Cpu, history.iter().map(|s| s.cpu_percent).collect()),
        (Dimension::Memory, history.iter().map(|s| s.memory as f64).collect()),
        (Dimension::Disk, history.iter().map(|s| s.disk as f64).collect()),
    ];

    let forecasts = series
        .into_iter()
        .filter_map(|(dimension, values)| forecast_dimension(dimension, &values, last_timestamp))
        .collect();

    Some(UsagePrediction {
        resource_id: resource_id.to_string(),
        generated_at: now,
        samples: history.len(),
        forecasts,
        recommendations: recommend(history, capacity),
    })
}

impl EngineState {
    /// Forecast one resource from its recorded history
    pub fn predict_resource_usage(&self, resource_id: &str) -> Result<Option<UsagePrediction>> {
        let resource = self.resources.get(resource_id)?;
        let history: Vec<UsageSnapshot> = self
            .usage_history
            .get(resource_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default();

        let prediction = predict_usage(resource_id, &history, &resource.capacity, Utc::now());
        if prediction.is_none() {
            debug!(
                "Not enough history to forecast {} ({} sample(s))",
                resource_id,
                history.len()
            );
        }
        Ok(prediction)
    }

    /// Forecast every resource with enough history
    pub fn predict_all(&self) -> Vec<UsagePrediction> {
        self.resources
            .ids()
            .iter()
            .filter_map(|id| self.predict_resource_usage(id).ok().flatten())
            .collect()
    }
}
