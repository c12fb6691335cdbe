//! Forward projection of a baseline into monthly spend, with confidence
//! bands and named scenarios.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::baseline::{BaselineAnalysis, ModelType};
use crate::analysis::stats::{self, safe_ratio};
use crate::error::{AnalysisError, Result};
use crate::forecast::{
    ConfidenceIntervals, Forecast, ForecastAssumptions, ForecastRequest, Scenarios,
    DEFAULT_CONFIDENCE_LEVEL,
};

pub const OPTIMISTIC_MULTIPLIER: f64 = 0.85;
pub const PESSIMISTIC_MULTIPLIER: f64 = 1.25;

/// Band margin used when the history cannot provide one.
pub const DEFAULT_MARGIN: f64 = 0.2;

/// Monthly level assumed when there is no history at all.
pub const PLACEHOLDER_MONTHLY_COST: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub confidence_level: f64,
    pub default_margin: f64,
    pub placeholder_monthly_cost: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            default_margin: DEFAULT_MARGIN,
            placeholder_monthly_cost: PLACEHOLDER_MONTHLY_COST,
        }
    }
}

impl ForecastConfig {
    pub fn validate(&self) -> Result<()> {
        check_confidence_level(self.confidence_level)?;
        if !self.default_margin.is_finite() || self.default_margin < 0.0 {
            return Err(invalid("default_margin", "must be a non-negative number"));
        }
        if !self.placeholder_monthly_cost.is_finite() || self.placeholder_monthly_cost < 0.0 {
            return Err(invalid("placeholder_monthly_cost", "must be a non-negative number"));
        }
        Ok(())
    }
}

/// Starting point of a projection: level, per-month trend and band margin.
struct Trajectory {
    anchor: f64,
    slope: f64,
    margin: f64,
    model_type: Option<ModelType>,
    placeholder: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ForecastProjector {
    config: ForecastConfig,
}

impl ForecastProjector {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    /// Extend the baseline's selected model `request.months` steps forward.
    ///
    /// An unestablished baseline projects flat at its mean; an empty one
    /// falls back to the placeholder level.
    pub fn project(&self, baseline: &BaselineAnalysis, request: &ForecastRequest) -> Result<Forecast> {
        validate_request(request)?;
        let stats = &baseline.statistics;

        let trajectory = match baseline.selected() {
            Some(model) if baseline.established => Trajectory {
                anchor: model.last_fitted(),
                slope: model.slope(),
                margin: self.history_margin(stats.mean, stats.std_dev, stats.count),
                model_type: Some(model.model_type),
                placeholder: false,
            },
            _ if stats.count > 0 => {
                debug!(count = stats.count, "baseline not established, projecting flat at mean");
                Trajectory {
                    anchor: stats.mean,
                    slope: 0.0,
                    margin: self.history_margin(stats.mean, stats.std_dev, stats.count),
                    model_type: None,
                    placeholder: false,
                }
            }
            _ => self.placeholder(),
        };

        Ok(self.build(&trajectory, request))
    }

    /// Project from raw monthly costs with a linear trend.
    pub fn project_from_history(&self, history: &[f64], request: &ForecastRequest) -> Result<Forecast> {
        validate_request(request)?;
        let usable: Vec<f64> = history
            .iter()
            .copied()
            .filter(|c| c.is_finite() && *c >= 0.0)
            .collect();
        if usable.len() < history.len() {
            warn!(dropped = history.len() - usable.len(), "skipping malformed monthly costs");
        }

        let trajectory = if usable.is_empty() {
            self.placeholder()
        } else {
            let fit = stats::linear_regression(&usable);
            Trajectory {
                anchor: fit.predict((usable.len() - 1) as f64),
                slope: fit.slope,
                margin: self.history_margin(stats::mean(&usable), stats::std_dev(&usable), usable.len()),
                model_type: Some(ModelType::LinearTrend),
                placeholder: false,
            }
        };

        Ok(self.build(&trajectory, request))
    }

    fn placeholder(&self) -> Trajectory {
        warn!(
            monthly_cost = self.config.placeholder_monthly_cost,
            "no cost history available, using placeholder forecast"
        );
        Trajectory {
            anchor: self.config.placeholder_monthly_cost,
            slope: 0.0,
            margin: self.config.default_margin,
            model_type: None,
            placeholder: true,
        }
    }

    /// Coefficient of variation of the history, or the default margin.
    fn history_margin(&self, mean: f64, std_dev: f64, count: usize) -> f64 {
        if count < 2 || mean <= 0.0 {
            return self.config.default_margin;
        }
        safe_ratio(std_dev, mean)
    }

    fn build(&self, trajectory: &Trajectory, request: &ForecastRequest) -> Forecast {
        let growth = request.annual_growth_rate.unwrap_or(0.0);
        let seasonal = request.seasonal_factors.as_deref().filter(|f| !f.is_empty());

        let base_forecast: Vec<f64> = (0..request.months)
            .map(|i| {
                let step = (i + 1) as f64;
                let mut value = (trajectory.anchor + trajectory.slope * step).max(0.0);
                value *= 1.0 + growth / 12.0 * step;
                if let Some(factors) = seasonal {
                    value *= factors[i % factors.len()];
                }
                for change in &request.infrastructure_changes {
                    if i >= change.start_month {
                        value += change.monthly_delta;
                    }
                }
                value.max(0.0)
            })
            .collect();

        let margin = trajectory.margin * z_for_level(request.confidence_level) / z_for_level(DEFAULT_CONFIDENCE_LEVEL);
        let lower: Vec<f64> = base_forecast.iter().map(|b| (b * (1.0 - margin)).max(0.0)).collect();
        let upper: Vec<f64> = base_forecast
            .iter()
            .zip(&lower)
            .map(|(b, l)| (b * (1.0 + margin)).max(*l))
            .collect();

        let scenarios = Scenarios {
            realistic: base_forecast.clone(),
            optimistic: base_forecast.iter().map(|b| b * OPTIMISTIC_MULTIPLIER).collect(),
            pessimistic: base_forecast.iter().map(|b| b * PESSIMISTIC_MULTIPLIER).collect(),
        };

        let forecast = Forecast {
            budget_id: request.budget_id.clone(),
            months: request.months,
            base_forecast,
            confidence_intervals: ConfidenceIntervals {
                lower,
                upper,
                confidence_level: request.confidence_level,
            },
            scenarios,
            assumptions: ForecastAssumptions {
                model_type: trajectory.model_type,
                annual_growth_rate: growth,
                infrastructure_changes: request.infrastructure_changes.len(),
                seasonal: seasonal.is_some(),
                margin,
                confidence_level: request.confidence_level,
                placeholder: trajectory.placeholder,
            },
        };

        info!(
            budget_id = %forecast.budget_id,
            months = forecast.months,
            total = forecast.total(),
            placeholder = trajectory.placeholder,
            "forecast projected"
        );
        forecast
    }
}

/// Two-sided normal quantile for the common confidence levels.
fn z_for_level(level: f64) -> f64 {
    match level {
        x if x >= 0.99 => 2.576,
        x if x >= 0.95 => 1.96,
        x if x >= 0.90 => 1.645,
        x if x >= 0.80 => 1.282,
        _ => 1.0,
    }
}

fn check_confidence_level(level: f64) -> Result<()> {
    if !level.is_finite() || level <= 0.0 || level >= 1.0 {
        return Err(invalid("confidence_level", "must lie strictly between 0 and 1"));
    }
    Ok(())
}

fn validate_request(request: &ForecastRequest) -> Result<()> {
    check_confidence_level(request.confidence_level)?;
    if let Some(growth) = request.annual_growth_rate {
        if !growth.is_finite() {
            return Err(invalid("annual_growth_rate", "must be a finite number"));
        }
    }
    if let Some(factors) = &request.seasonal_factors {
        if factors.is_empty() {
            return Err(invalid("seasonal_factors", "must not be empty"));
        }
        if factors.iter().any(|f| !f.is_finite() || *f < 0.0) {
            return Err(invalid("seasonal_factors", "must be non-negative numbers"));
        }
    }
    if request
        .infrastructure_changes
        .iter()
        .any(|c| !c.monthly_delta.is_finite())
    {
        return Err(invalid("infrastructure_changes", "monthly_delta must be a finite number"));
    }
    Ok(())
}

fn invalid(name: &str, reason: &str) -> AnalysisError {
    AnalysisError::InvalidParameter {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

pub fn project_forecast(baseline: &BaselineAnalysis, request: &ForecastRequest) -> Result<Forecast> {
    ForecastProjector::default().project(baseline, request)
}

pub fn project_from_history(history: &[f64], request: &ForecastRequest) -> Result<Forecast> {
    ForecastProjector::default().project_from_history(history, request)
}
