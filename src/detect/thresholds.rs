//! Detection thresholds and the hot-swappable store that holds them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detect::Severity;
use crate::error::{AnalysisError, Result};

pub const COST_SPIKE_THRESHOLD: &str = "cost_spike_threshold";
pub const PERCENTAGE_INCREASE_THRESHOLD: &str = "percentage_increase_threshold";
pub const ABSOLUTE_COST_THRESHOLD: &str = "absolute_cost_threshold";
pub const CRITICAL_THRESHOLD: &str = "critical_threshold";
pub const HIGH_THRESHOLD: &str = "high_threshold";
pub const MEDIUM_THRESHOLD: &str = "medium_threshold";

/// Named numeric thresholds driving anomaly flagging and severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Flag when the deviation reaches this many standard deviations.
    pub cost_spike_threshold: f64,
    /// Flag when cost exceeds the expected value by this percentage.
    pub percentage_increase_threshold: f64,
    /// Flag when cost exceeds the expected value by this absolute amount.
    pub absolute_cost_threshold: f64,
    pub critical_threshold: f64,
    pub high_threshold: f64,
    pub medium_threshold: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            cost_spike_threshold: 3.0,
            percentage_increase_threshold: 50.0,
            absolute_cost_threshold: 100.0,
            critical_threshold: 5.0,
            high_threshold: 3.5,
            medium_threshold: 2.0,
        }
    }
}

impl ThresholdConfig {
    pub const NAMES: [&'static str; 6] = [
        COST_SPIKE_THRESHOLD,
        PERCENTAGE_INCREASE_THRESHOLD,
        ABSOLUTE_COST_THRESHOLD,
        CRITICAL_THRESHOLD,
        HIGH_THRESHOLD,
        MEDIUM_THRESHOLD,
    ];

    /// Reject negative or non-finite values and out-of-order severity levels.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in self.entries() {
            if !value.is_finite() || value < 0.0 {
                return Err(AnalysisError::InvalidThreshold { name: name.to_string(), value });
            }
        }
        if self.medium_threshold > self.high_threshold {
            return Err(AnalysisError::InvalidThreshold {
                name: MEDIUM_THRESHOLD.to_string(),
                value: self.medium_threshold,
            });
        }
        if self.high_threshold > self.critical_threshold {
            return Err(AnalysisError::InvalidThreshold {
                name: HIGH_THRESHOLD.to_string(),
                value: self.high_threshold,
            });
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<f64> {
        self.entries()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| AnalysisError::UnknownThreshold { name: name.to_string() })
    }

    /// Copy of `self` with one named field replaced, validated as a whole.
    pub fn with_value(&self, name: &str, value: f64) -> Result<Self> {
        if !Self::NAMES.contains(&name) {
            return Err(AnalysisError::UnknownThreshold { name: name.to_string() });
        }
        let next = self.assign(name, value);
        next.validate()?;
        Ok(next)
    }

    /// Build from a flat name → value map. Missing names keep their defaults.
    pub fn from_map(values: &HashMap<String, f64>) -> Result<Self> {
        let mut config = Self::default();
        // Apply in a fixed order so error reporting does not depend on map order.
        let mut names: Vec<&String> = values.keys().collect();
        names.sort();
        for name in names {
            if !Self::NAMES.contains(&name.as_str()) {
                return Err(AnalysisError::UnknownThreshold { name: name.clone() });
            }
            let value = values[name];
            if !value.is_finite() || value < 0.0 {
                return Err(AnalysisError::InvalidThreshold { name: name.clone(), value });
            }
            config = config.assign(name, value);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn to_map(&self) -> HashMap<String, f64> {
        self.entries()
            .into_iter()
            .map(|(n, v)| (n.to_string(), v))
            .collect()
    }

    fn entries(&self) -> [(&'static str, f64); 6] {
        [
            (COST_SPIKE_THRESHOLD, self.cost_spike_threshold),
            (PERCENTAGE_INCREASE_THRESHOLD, self.percentage_increase_threshold),
            (ABSOLUTE_COST_THRESHOLD, self.absolute_cost_threshold),
            (CRITICAL_THRESHOLD, self.critical_threshold),
            (HIGH_THRESHOLD, self.high_threshold),
            (MEDIUM_THRESHOLD, self.medium_threshold),
        ]
    }

    // Unvalidated single-field assignment; callers validate the final result.
    fn assign(mut self, name: &str, value: f64) -> Self {
        match name {
            COST_SPIKE_THRESHOLD => self.cost_spike_threshold = value,
            PERCENTAGE_INCREASE_THRESHOLD => self.percentage_increase_threshold = value,
            ABSOLUTE_COST_THRESHOLD => self.absolute_cost_threshold = value,
            CRITICAL_THRESHOLD => self.critical_threshold = value,
            HIGH_THRESHOLD => self.high_threshold = value,
            MEDIUM_THRESHOLD => self.medium_threshold = value,
            _ => {}
        }
        self
    }
}

/// Map a deviation (in standard deviations) to a severity.
///
/// Raising any threshold can only keep or lower the result for a fixed
/// deviation.
pub fn classify_severity(deviation_std: f64, thresholds: &ThresholdConfig) -> Severity {
    if deviation_std >= thresholds.critical_threshold {
        Severity::Critical
    } else if deviation_std >= thresholds.high_threshold {
        Severity::High
    } else if deviation_std >= thresholds.medium_threshold {
        Severity::Medium
    } else {
        Severity::Low
    }
}

// ---------------------------------------------------------------------------
// ThresholdStore
// ---------------------------------------------------------------------------

/// Shared, hot-swappable threshold configuration.
///
/// Readers take a cheap `Arc` snapshot and never observe a half-applied
/// update. Writers validate before swapping, so a rejected update leaves the
/// active configuration untouched.
#[derive(Debug, Default)]
pub struct ThresholdStore {
    current: RwLock<Arc<ThresholdConfig>>,
}

impl ThresholdStore {
    pub fn new(config: ThresholdConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { current: RwLock::new(Arc::new(config)) })
    }

    pub fn snapshot(&self) -> Arc<ThresholdConfig> {
        // The guarded value is an immutable Arc, so a poisoned lock is still consistent.
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn update(&self, config: ThresholdConfig) -> Result<()> {
        if let Err(e) = config.validate() {
            warn!(error = %e, "rejected threshold update");
            return Err(e);
        }
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(config);
        info!(?config, "threshold configuration updated");
        Ok(())
    }

    /// Update a single named threshold against the current configuration.
    pub fn set(&self, name: &str, value: f64) -> Result<()> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let next = match guard.with_value(name, value) {
            Ok(next) => next,
            Err(e) => {
                warn!(name, value, error = %e, "rejected threshold update");
                return Err(e);
            }
        };
        *guard = Arc::new(next);
        info!(name, value, "threshold updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = ThresholdConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.get(COST_SPIKE_THRESHOLD).unwrap(), 3.0);
        assert_eq!(cfg.get(PERCENTAGE_INCREASE_THRESHOLD).unwrap(), 50.0);
        assert_eq!(cfg.get(ABSOLUTE_COST_THRESHOLD).unwrap(), 100.0);
        assert_eq!(cfg.get(CRITICAL_THRESHOLD).unwrap(), 5.0);
        assert_eq!(cfg.get(HIGH_THRESHOLD).unwrap(), 3.5);
        assert_eq!(cfg.get(MEDIUM_THRESHOLD).unwrap(), 2.0);
    }

    #[test]
    fn test_rejects_negative_and_nan() {
        let cfg = ThresholdConfig::default();
        assert!(matches!(
            cfg.with_value(ABSOLUTE_COST_THRESHOLD, -1.0),
            Err(AnalysisError::InvalidThreshold { .. })
        ));
        assert!(cfg.with_value(COST_SPIKE_THRESHOLD, f64::NAN).is_err());
        assert!(matches!(
            cfg.with_value("bogus", 1.0),
            Err(AnalysisError::UnknownThreshold { .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_order_severity_levels() {
        let cfg = ThresholdConfig::default();
        assert!(cfg.with_value(MEDIUM_THRESHOLD, 4.0).is_err());
        assert!(cfg.with_value(HIGH_THRESHOLD, 6.0).is_err());
        assert!(cfg.with_value(CRITICAL_THRESHOLD, 8.0).is_ok());
    }

    #[test]
    fn test_from_map_and_back() {
        let mut map = HashMap::new();
        map.insert(ABSOLUTE_COST_THRESHOLD.to_string(), 250.0);
        map.insert(CRITICAL_THRESHOLD.to_string(), 6.0);
        let cfg = ThresholdConfig::from_map(&map).unwrap();
        assert_eq!(cfg.absolute_cost_threshold, 250.0);
        assert_eq!(cfg.critical_threshold, 6.0);
        assert_eq!(cfg.cost_spike_threshold, 3.0);

        let back = cfg.to_map();
        assert_eq!(back.len(), 6);
        assert_eq!(back[ABSOLUTE_COST_THRESHOLD], 250.0);

        map.insert("unknown".to_string(), 1.0);
        assert!(ThresholdConfig::from_map(&map).is_err());
    }

    #[test]
    fn test_classify_severity() {
        let cfg = ThresholdConfig::default();
        assert_eq!(classify_severity(5.0, &cfg), Severity::Critical);
        assert_eq!(classify_severity(3.5, &cfg), Severity::High);
        assert_eq!(classify_severity(2.0, &cfg), Severity::Medium);
        assert_eq!(classify_severity(1.99, &cfg), Severity::Low);
        assert_eq!(classify_severity(-4.0, &cfg), Severity::Low);
    }

    #[test]
    fn test_raising_thresholds_never_raises_severity() {
        let base = ThresholdConfig::default();
        for step in 0..80 {
            let deviation = step as f64 * 0.1;
            let before = classify_severity(deviation, &base);
            for bump in [0.5, 1.0, 3.0] {
                let raised = ThresholdConfig {
                    critical_threshold: base.critical_threshold + bump,
                    high_threshold: base.high_threshold + bump,
                    medium_threshold: base.medium_threshold + bump,
                    ..base
                };
                assert!(classify_severity(deviation, &raised) <= before);
            }
        }
    }

    #[test]
    fn test_store_swaps_and_keeps_old_on_rejection() {
        let store = ThresholdStore::new(ThresholdConfig::default()).unwrap();
        let before = store.snapshot();

        store.set(ABSOLUTE_COST_THRESHOLD, 500.0).unwrap();
        assert_eq!(store.snapshot().absolute_cost_threshold, 500.0);
        // Earlier snapshots are unaffected.
        assert_eq!(before.absolute_cost_threshold, 100.0);

        assert!(store.set(ABSOLUTE_COST_THRESHOLD, -3.0).is_err());
        assert_eq!(store.snapshot().absolute_cost_threshold, 500.0);

        let bad = ThresholdConfig { medium_threshold: 10.0, ..ThresholdConfig::default() };
        assert!(store.update(bad).is_err());
        assert_eq!(store.snapshot().medium_threshold, 2.0);
    }

    #[test]
    fn test_store_concurrent_readers() {
        let store = Arc::new(ThresholdStore::default());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    if i == 0 {
                        store.set(CRITICAL_THRESHOLD, 7.0).unwrap();
                    }
                    let snap = store.snapshot();
                    assert!(snap.validate().is_ok());
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.snapshot().critical_threshold, 7.0);
    }
}
