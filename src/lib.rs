//! costpulse -- cloud cost baselines, anomaly detection and spend forecasting.
//!
//! The core is synchronous and stateless: every operation is a pure function
//! of its inputs plus the active [`detect::ThresholdConfig`]. Callers own the
//! data, the scheduling and the persistence.

pub mod analysis;
pub mod config;
pub mod detect;
pub mod error;
pub mod forecast;
pub mod model;
pub mod recommendation;

pub use analysis::{establish_baseline, BaselineAnalysis, ModelType};
pub use config::EngineConfig;
pub use detect::{detect_anomalies, Anomaly, DetectionResult, Severity, ThresholdConfig, ThresholdStore};
pub use error::{AnalysisError, Result};
pub use forecast::{analyze_variance, project_forecast, BudgetVariance, Forecast, ForecastRequest};
pub use model::{CostObservation, RawCostRecord, ResourceRecord};
