//! Baseline modeler: fits candidate models of "normal" spend over a
//! historical window and selects the best one.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::stats::{self, TimeSeries};
use crate::model::CostObservation;

/// Minimum number of historical points before a baseline counts as established.
pub const DEFAULT_MIN_POINTS: usize = 24;

/// Upper bound on the moving-average window.
pub const DEFAULT_MOVING_AVERAGE_WINDOW: usize = 24;

/// Relative MAE below which a fit counts as exact.
const PERFECT_FIT_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Model types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelType {
    MovingAverage,
    LinearTrend,
    Percentile,
}

impl ModelType {
    /// Tie-break order when two models score the same accuracy (lower wins).
    pub fn selection_priority(self) -> u8 {
        match self {
            ModelType::LinearTrend => 0,
            ModelType::MovingAverage => 1,
            ModelType::Percentile => 2,
        }
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelType::MovingAverage => write!(f, "moving_average"),
            ModelType::LinearTrend => write!(f, "linear_trend"),
            ModelType::Percentile => write!(f, "percentile"),
        }
    }
}

/// Fitted parameters, one shape per model type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelParameters {
    MovingAverage { window: usize, level: f64 },
    LinearTrend { slope: f64, intercept: f64, r_squared: f64 },
    Percentile { p10: f64, p50: f64, p90: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineModel {
    pub model_type: ModelType,
    pub parameters: ModelParameters,
    pub fitted_predictions: Vec<f64>,
    /// Fit quality in [0, 100].
    pub accuracy_score: f64,
    /// Fit quality discounted for short histories, in [0, 100].
    pub confidence_score: f64,
}

impl BaselineModel {
    /// Last fitted value of the window, the anchor for forward projection.
    pub fn last_fitted(&self) -> f64 {
        match self.parameters {
            ModelParameters::MovingAverage { level, .. } => level,
            ModelParameters::LinearTrend { .. } => {
                self.fitted_predictions.last().copied().unwrap_or(0.0)
            }
            ModelParameters::Percentile { p50, .. } => p50,
        }
    }

    /// Per-step trend; only the linear model carries one.
    pub fn slope(&self) -> f64 {
        match self.parameters {
            ModelParameters::LinearTrend { slope, .. } => slope,
            _ => 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Analysis result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineStatistics {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub count: usize,
}

impl BaselineStatistics {
    pub fn from_series(series: &TimeSeries) -> Self {
        Self {
            mean: series.mean(),
            median: series.median(),
            min: series.min(),
            max: series.max(),
            std_dev: series.std_dev(),
            count: series.len(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselinePeriod {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineAnalysis {
    /// False when the window held too few points; no anomalies may be
    /// derived from an unestablished baseline.
    pub established: bool,
    pub statistics: BaselineStatistics,
    pub candidate_models: BTreeMap<ModelType, BaselineModel>,
    pub selected_model: Option<ModelType>,
    pub period: BaselinePeriod,
}

impl BaselineAnalysis {
    pub fn selected(&self) -> Option<&BaselineModel> {
        self.selected_model
            .and_then(|t| self.candidate_models.get(&t))
    }

    /// Expected cost at `index` of the window under the selected model.
    pub fn expected_at(&self, index: usize) -> Option<f64> {
        self.selected()
            .and_then(|m| m.fitted_predictions.get(index).copied())
    }
}

// ---------------------------------------------------------------------------
// Modeler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub min_points: usize,
    pub moving_average_window: usize,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            min_points: DEFAULT_MIN_POINTS,
            moving_average_window: DEFAULT_MOVING_AVERAGE_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BaselineModeler {
    config: BaselineConfig,
}

impl BaselineModeler {
    pub fn new(config: BaselineConfig) -> Self {
        Self { config }
    }

    /// Build a baseline from an observation window.
    ///
    /// Malformed observations are dropped with a warning and the rest are
    /// ordered by timestamp before fitting.
    pub fn establish(&self, observations: &[CostObservation]) -> BaselineAnalysis {
        let prepared = prepare_observations(observations);
        self.establish_prepared(&prepared)
    }

    /// Same as [`establish`](Self::establish) for input that is already
    /// validated and time-ordered.
    pub(crate) fn establish_prepared(&self, observations: &[CostObservation]) -> BaselineAnalysis {
        let costs: Vec<f64> = observations.iter().map(|o| o.cost).collect();
        let series = TimeSeries::new(costs);

        let period = BaselinePeriod {
            start: observations.first().map(|o| o.timestamp),
            end: observations.last().map(|o| o.timestamp),
            count: observations.len(),
        };
        let statistics = BaselineStatistics::from_series(&series);

        let required = self.config.min_points.max(1);
        if series.len() < required {
            debug!(have = series.len(), needed = required, "baseline not established");
            return BaselineAnalysis {
                established: false,
                statistics,
                candidate_models: BTreeMap::new(),
                selected_model: None,
                period,
            };
        }

        let candidates = [
            self.fit_moving_average(series.values()),
            self.fit_linear_trend(series.values()),
            self.fit_percentile(&series),
        ];
        let selected = select_best(&candidates);

        for model in &candidates {
            debug!(
                model = %model.model_type,
                accuracy = model.accuracy_score,
                confidence = model.confidence_score,
                "scored baseline candidate"
            );
        }
        debug!(selected = ?selected, "selected baseline model");

        BaselineAnalysis {
            established: true,
            statistics,
            candidate_models: candidates
                .into_iter()
                .map(|m| (m.model_type, m))
                .collect(),
            selected_model: selected,
            period,
        }
    }

    fn fit_moving_average(&self, costs: &[f64]) -> BaselineModel {
        let window = self.config.moving_average_window.max(1).min(costs.len().max(1));
        let fitted = stats::trailing_moving_average(costs, window);
        let level = stats::tail_mean(costs, window);
        self.scored(
            ModelType::MovingAverage,
            ModelParameters::MovingAverage { window, level },
            costs,
            fitted,
        )
    }

    fn fit_linear_trend(&self, costs: &[f64]) -> BaselineModel {
        let fit = stats::linear_regression(costs);
        let fitted = (0..costs.len()).map(|i| fit.predict(i as f64)).collect();
        self.scored(
            ModelType::LinearTrend,
            ModelParameters::LinearTrend {
                slope: fit.slope,
                intercept: fit.intercept,
                r_squared: fit.r_squared,
            },
            costs,
            fitted,
        )
    }

    fn fit_percentile(&self, series: &TimeSeries) -> BaselineModel {
        let p50 = series.median();
        self.scored(
            ModelType::Percentile,
            ModelParameters::Percentile {
                p10: series.percentile(10.0),
                p50,
                p90: series.percentile(90.0),
            },
            series.values(),
            vec![p50; series.len()],
        )
    }

    fn scored(
        &self,
        model_type: ModelType,
        parameters: ModelParameters,
        actual: &[f64],
        fitted: Vec<f64>,
    ) -> BaselineModel {
        let accuracy_score = accuracy_score(actual, &fitted);
        let confidence_score = self.confidence_score(accuracy_score, actual.len());
        BaselineModel {
            model_type,
            parameters,
            fitted_predictions: fitted,
            accuracy_score,
            confidence_score,
        }
    }

    /// Accuracy discounted until the window holds twice the minimum points.
    fn confidence_score(&self, accuracy: f64, count: usize) -> f64 {
        let full_at = (self.config.min_points.max(1) * 2) as f64;
        let coverage = (count as f64 / full_at).min(1.0);
        (accuracy * (0.5 + 0.5 * coverage)).clamp(0.0, 100.0)
    }
}

/// `100 * (1 - MAE / mean|actual|)`, clamped to [0, 100].
fn accuracy_score(actual: &[f64], fitted: &[f64]) -> f64 {
    let mae = match stats::mean_absolute_error(actual, fitted) {
        Ok(mae) => mae,
        Err(e) => {
            warn!(error = %e, "cannot score baseline model");
            return 0.0;
        }
    };
    let scale = actual.iter().map(|v| v.abs()).sum::<f64>() / actual.len().max(1) as f64;
    // Rounding noise from the fit must not break ties on a perfect fit.
    if mae <= PERFECT_FIT_TOLERANCE * scale.max(1.0) {
        return 100.0;
    }
    if scale <= f64::EPSILON {
        return 0.0;
    }
    (100.0 * (1.0 - mae / scale)).clamp(0.0, 100.0)
}

/// Highest accuracy wins; ties go to the type with the lower priority rank.
fn select_best(candidates: &[BaselineModel]) -> Option<ModelType> {
    let mut ranked: Vec<&BaselineModel> = candidates.iter().collect();
    ranked.sort_by(|a, b| {
        b.accuracy_score
            .total_cmp(&a.accuracy_score)
            .then(a.model_type.selection_priority().cmp(&b.model_type.selection_priority()))
    });
    ranked.first().map(|m| m.model_type)
}

/// Drop malformed observations (with a warning) and order by timestamp.
pub(crate) fn prepare_observations(observations: &[CostObservation]) -> Vec<CostObservation> {
    let mut prepared: Vec<CostObservation> = observations
        .iter()
        .filter(|o| {
            let ok = o.is_well_formed();
            if !ok {
                warn!(
                    timestamp = %o.timestamp,
                    cost = o.cost,
                    service = %o.service,
                    "skipping malformed cost observation"
                );
            }
            ok
        })
        .cloned()
        .collect();
    prepared.sort_by_key(|o| o.timestamp);
    prepared
}

/// Convenience entry point with the default moving-average window.
pub fn establish_baseline(observations: &[CostObservation], min_points: usize) -> BaselineAnalysis {
    BaselineModeler::new(BaselineConfig {
        min_points,
        ..BaselineConfig::default()
    })
    .establish(observations)
}
