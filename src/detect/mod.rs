//! Cost anomaly detection and root cause attribution.

pub mod anomaly;
pub mod root_cause;
pub mod thresholds;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use anomaly::{detect_anomalies, AnomalyDetector, DetectionResult};
pub use root_cause::{RootCauseAnalysis, RootCauseAttributor};
pub use thresholds::{classify_severity, ThresholdConfig, ThresholdStore};

/// Severity levels for detected anomalies, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A flagged cost observation with its attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub region: String,
    pub actual_cost: f64,
    pub expected_cost: f64,
    pub absolute_delta: f64,
    pub deviation_std: f64,
    pub deviation_pct: f64,
    pub severity: Severity,
    /// Wall-clock time of detection; the only non-deterministic field.
    pub detected_at: DateTime<Utc>,
    pub root_cause_analysis: RootCauseAnalysis,
}
