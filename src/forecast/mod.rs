//! Spend forecasting and budget variance analysis.

pub mod budget;
pub mod projector;

use serde::{Deserialize, Serialize};

use crate::analysis::baseline::ModelType;

pub use budget::{analyze_variance, BudgetStatus, BudgetVariance, VarianceCategory};
pub use projector::{project_forecast, project_from_history, ForecastConfig, ForecastProjector};

pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// A known upcoming change in infrastructure spend, e.g. a new cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfrastructureChange {
    /// Zero-based forecast month from which the delta applies.
    pub start_month: usize,
    /// Fixed amount added to every month from `start_month` on.
    pub monthly_delta: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub budget_id: String,
    pub months: usize,
    /// Annual growth as a fraction (0.15 = 15%).
    #[serde(default)]
    pub annual_growth_rate: Option<f64>,
    #[serde(default)]
    pub infrastructure_changes: Vec<InfrastructureChange>,
    /// Multipliers applied cyclically, month `i` uses `factors[i % len]`.
    #[serde(default)]
    pub seasonal_factors: Option<Vec<f64>>,
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
}

fn default_confidence_level() -> f64 {
    DEFAULT_CONFIDENCE_LEVEL
}

impl ForecastRequest {
    pub fn new(budget_id: impl Into<String>, months: usize) -> Self {
        Self {
            budget_id: budget_id.into(),
            months,
            annual_growth_rate: None,
            infrastructure_changes: Vec::new(),
            seasonal_factors: None,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
        }
    }

    pub fn with_growth(mut self, annual_growth_rate: f64) -> Self {
        self.annual_growth_rate = Some(annual_growth_rate);
        self
    }

    pub fn with_change(mut self, start_month: usize, monthly_delta: f64) -> Self {
        self.infrastructure_changes.push(InfrastructureChange {
            start_month,
            monthly_delta,
            description: String::new(),
        });
        self
    }

    pub fn with_seasonality(mut self, factors: Vec<f64>) -> Self {
        self.seasonal_factors = Some(factors);
        self
    }

    pub fn with_confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceIntervals {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub confidence_level: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenarios {
    pub realistic: Vec<f64>,
    pub optimistic: Vec<f64>,
    pub pessimistic: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastAssumptions {
    pub model_type: Option<ModelType>,
    pub annual_growth_rate: f64,
    pub infrastructure_changes: usize,
    pub seasonal: bool,
    /// Relative half-width of the confidence band.
    pub margin: f64,
    pub confidence_level: f64,
    /// True when no history was available and the placeholder level was used.
    pub placeholder: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub budget_id: String,
    pub months: usize,
    pub base_forecast: Vec<f64>,
    pub confidence_intervals: ConfidenceIntervals,
    pub scenarios: Scenarios,
    pub assumptions: ForecastAssumptions,
}

impl Forecast {
    pub fn total(&self) -> f64 {
        self.base_forecast.iter().sum()
    }
}
