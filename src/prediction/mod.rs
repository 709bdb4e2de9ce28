// src/prediction/mod.rs
//! Predictive optimizer
//!
//! Linear-trend forecasting of per-resource usage plus qualitative
//! recommendations. Forecasts are refreshed by the monitoring task and
//! cached by the manager; they can also be computed on demand.

pub mod optimizer;
pub mod regression;

pub use optimizer::{
    confidence_at, predict_usage, DimensionForecast, ForecastPoint, Recommendation,
    RecommendationKind, Trend, UsagePrediction, FORECAST_HORIZON, MIN_SAMPLES, TREND_EPSILON,
};
pub use regression::{fit_ols, LinearFit};
