use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::analysis::baseline::{prepare_observations, BaselineAnalysis, BaselineConfig, BaselineModeler};
use crate::analysis::stats::safe_ratio;
use crate::detect::root_cause::{RootCauseAnalysis, RootCauseAttributor};
use crate::detect::thresholds::{classify_severity, ThresholdConfig};
use crate::detect::Anomaly;
use crate::model::{CostObservation, ResourceRecord};

/// Deviation reported for any departure from a perfectly flat baseline.
pub const MAX_DEVIATION_STD: f64 = 10.0;

const STD_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub baseline_analysis: BaselineAnalysis,
    pub anomalies: Vec<Anomaly>,
}

/// How far one observation sits from its expected value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deviation {
    pub expected: f64,
    pub absolute_delta: f64,
    pub deviation_std: f64,
    pub deviation_pct: f64,
}

impl Deviation {
    pub fn measure(actual: f64, expected: f64, std_dev: f64) -> Self {
        let absolute_delta = actual - expected;
        let deviation_std = if std_dev > STD_EPSILON {
            absolute_delta / std_dev
        } else if absolute_delta.abs() > STD_EPSILON {
            // Any difference from a constant baseline is off the scale.
            MAX_DEVIATION_STD.copysign(absolute_delta)
        } else {
            0.0
        };
        Self {
            expected,
            absolute_delta,
            deviation_std,
            deviation_pct: safe_ratio(absolute_delta, expected) * 100.0,
        }
    }

    /// Only cost increases are flagged; any one threshold is enough.
    pub fn exceeds(&self, thresholds: &ThresholdConfig) -> bool {
        if self.absolute_delta <= 0.0 {
            return false;
        }
        self.deviation_std >= thresholds.cost_spike_threshold
            || self.deviation_pct >= thresholds.percentage_increase_threshold
            || self.absolute_delta >= thresholds.absolute_cost_threshold
    }
}

/// Stateless anomaly detector over a caller-supplied observation window.
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    thresholds: ThresholdConfig,
    modeler: BaselineModeler,
    attributor: RootCauseAttributor,
}

impl AnomalyDetector {
    pub fn new(thresholds: ThresholdConfig) -> Self {
        Self {
            thresholds,
            ..Self::default()
        }
    }

    pub fn with_baseline_config(mut self, config: BaselineConfig) -> Self {
        self.modeler = BaselineModeler::new(config);
        self
    }

    pub fn with_attributor(mut self, attributor: RootCauseAttributor) -> Self {
        self.attributor = attributor;
        self
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    /// Establish a baseline over `observations` and flag the points that
    /// deviate from it.
    ///
    /// An unestablished baseline yields no anomalies. The output depends only
    /// on the arguments and the thresholds, apart from `detected_at`.
    pub fn detect(&self, observations: &[CostObservation], resources: &[ResourceRecord]) -> DetectionResult {
        let prepared = prepare_observations(observations);
        let baseline = self.modeler.establish_prepared(&prepared);

        if !baseline.established {
            debug!(count = prepared.len(), "baseline not established, skipping detection");
            return DetectionResult {
                baseline_analysis: baseline,
                anomalies: Vec::new(),
            };
        }

        let std_dev = baseline.statistics.std_dev;
        let detected_at = Utc::now();
        let mut anomalies = Vec::new();

        for (index, obs) in prepared.iter().enumerate() {
            let Some(expected) = baseline.expected_at(index) else {
                continue;
            };
            let deviation = Deviation::measure(obs.cost, expected, std_dev);
            if !deviation.exceeds(&self.thresholds) {
                continue;
            }

            let id = anomaly_id(obs, index);
            let mut anomaly = Anomaly {
                id,
                timestamp: obs.timestamp,
                service: obs.service.clone(),
                region: obs.region.clone(),
                actual_cost: obs.cost,
                expected_cost: deviation.expected,
                absolute_delta: deviation.absolute_delta,
                deviation_std: deviation.deviation_std,
                deviation_pct: deviation.deviation_pct,
                severity: classify_severity(deviation.deviation_std, &self.thresholds),
                detected_at,
                root_cause_analysis: RootCauseAnalysis::empty(id),
            };
            anomaly.root_cause_analysis = self.attributor.attribute(&anomaly, resources);

            debug!(
                timestamp = %anomaly.timestamp,
                actual = anomaly.actual_cost,
                expected = anomaly.expected_cost,
                deviation_std = anomaly.deviation_std,
                severity = %anomaly.severity,
                "cost anomaly flagged"
            );
            anomalies.push(anomaly);
        }

        info!(
            observations = prepared.len(),
            anomalies = anomalies.len(),
            model = ?baseline.selected_model,
            "anomaly detection complete"
        );

        DetectionResult {
            baseline_analysis: baseline,
            anomalies,
        }
    }
}

/// Name-based id so repeated runs over the same input agree.
fn anomaly_id(obs: &CostObservation, index: usize) -> Uuid {
    let key = format!(
        "{}|{}|{}|{}",
        obs.timestamp.to_rfc3339(),
        obs.service,
        obs.region,
        index
    );
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
}

pub fn detect_anomalies(
    observations: &[CostObservation],
    resources: &[ResourceRecord],
    thresholds: &ThresholdConfig,
) -> DetectionResult {
    AnomalyDetector::new(*thresholds).detect(observations, resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Severity;
    use chrono::{Duration, TimeZone};

    fn daily(costs: &[f64]) -> Vec<CostObservation> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        costs
            .iter()
            .enumerate()
            .map(|(i, &c)| CostObservation::new(start + Duration::days(i as i64), c, "ec2", "us-east-1"))
            .collect()
    }

    #[test]
    fn test_deviation_guards() {
        let flat = Deviation::measure(500.0, 100.0, 0.0);
        assert_eq!(flat.deviation_std, MAX_DEVIATION_STD);
        assert_eq!(flat.deviation_pct, 400.0);

        let same = Deviation::measure(100.0, 100.0, 0.0);
        assert_eq!(same.deviation_std, 0.0);

        let zero_expected = Deviation::measure(50.0, 0.0, 5.0);
        assert_eq!(zero_expected.deviation_pct, 0.0);
        assert_eq!(zero_expected.deviation_std, 10.0);
    }

    #[test]
    fn test_decreases_are_never_flagged() {
        let all_zero = ThresholdConfig {
            cost_spike_threshold: 0.0,
            percentage_increase_threshold: 0.0,
            absolute_cost_threshold: 0.0,
            ..ThresholdConfig::default()
        };
        assert!(!Deviation::measure(90.0, 100.0, 5.0).exceeds(&all_zero));
        assert!(!Deviation::measure(100.0, 100.0, 5.0).exceeds(&all_zero));
        assert!(Deviation::measure(100.5, 100.0, 5.0).exceeds(&all_zero));
    }

    #[test]
    fn test_insufficient_data_yields_no_anomalies() {
        let mut costs = vec![100.0; 20];
        costs.push(10_000.0);
        let result = detect_anomalies(&daily(&costs), &[], &ThresholdConfig::default());
        assert!(!result.baseline_analysis.established);
        assert!(result.anomalies.is_empty());
    }

    #[test]
    fn test_flat_series_spike_is_critical() {
        let mut costs = vec![100.0; 60];
        costs[40] = 500.0;
        let result = detect_anomalies(&daily(&costs), &[], &ThresholdConfig::default());

        assert_eq!(result.anomalies.len(), 1);
        let a = &result.anomalies[0];
        assert_eq!(a.actual_cost, 500.0);
        assert_eq!(a.severity, Severity::Critical);
        assert!(a.deviation_pct >= 50.0);
        assert!(!a.root_cause_analysis.recommendations.is_empty());
        assert_eq!(a.root_cause_analysis.anomaly_id, a.id);
    }

    #[test]
    fn test_thresholds_change_outcome() {
        let mut costs = vec![100.0; 60];
        costs[40] = 130.0;
        let obs = daily(&costs);

        // +30 is below the 50% and $100 defaults but far above a flat baseline's spread.
        let default = detect_anomalies(&obs, &[], &ThresholdConfig::default());
        assert_eq!(default.anomalies.len(), 1);

        let strict = ThresholdConfig {
            cost_spike_threshold: 50.0,
            ..ThresholdConfig::default()
        };
        let relaxed = detect_anomalies(&obs, &[], &strict);
        assert!(relaxed.anomalies.is_empty());
    }

    #[test]
    fn test_ids_are_deterministic_and_unique() {
        let mut costs = vec![100.0; 60];
        costs[30] = 600.0;
        costs[45] = 700.0;
        let obs = daily(&costs);
        let a = detect_anomalies(&obs, &[], &ThresholdConfig::default());
        let b = detect_anomalies(&obs, &[], &ThresholdConfig::default());
        let ids_a: Vec<Uuid> = a.anomalies.iter().map(|x| x.id).collect();
        let ids_b: Vec<Uuid> = b.anomalies.iter().map(|x| x.id).collect();
        assert_eq!(ids_a.len(), 2);
        assert_eq!(ids_a, ids_b);
        assert_ne!(ids_a[0], ids_a[1]);
    }

    #[test]
    fn test_unsorted_input_with_malformed_rows() {
        let mut obs = daily(&[100.0; 40]);
        obs[10].cost = 900.0;
        obs.push(CostObservation::new(obs[0].timestamp, -5.0, "ec2", "us-east-1"));
        obs.reverse();
        let result = detect_anomalies(&obs, &[], &ThresholdConfig::default());
        assert_eq!(result.baseline_analysis.statistics.count, 40);
        assert_eq!(result.anomalies.len(), 1);
        assert_eq!(result.anomalies[0].actual_cost, 900.0);
    }
}
