//! TOML configuration for the cost analysis engine.
//!
//! Every section defaults independently, so a file only needs the keys it
//! changes. The file path can be overridden with `COSTPULSE_CONFIG`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::baseline::BaselineConfig;
use crate::detect::root_cause::{RootCauseAttributor, DEFAULT_TOP_RESOURCES};
use crate::detect::thresholds::ThresholdConfig;
use crate::detect::AnomalyDetector;
use crate::error::AnalysisError;
use crate::forecast::{ForecastConfig, ForecastProjector};

pub const CONFIG_ENV_VAR: &str = "COSTPULSE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "costpulse.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub baseline: BaselineConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub attribution: AttributionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded engine configuration");
        Ok(config)
    }

    /// Try, in order: the file named by `COSTPULSE_CONFIG`, `./costpulse.toml`,
    /// then compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "COSTPULSE_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local_path = Path::new(DEFAULT_CONFIG_FILE);
        if local_path.exists() {
            match Self::load(local_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local_path.display(),
                        error = %e,
                        "config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        self.thresholds.validate()?;
        self.forecast.validate()?;
        if self.baseline.min_points == 0 {
            return Err(AnalysisError::InvalidParameter {
                name: "baseline.min_points".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.baseline.moving_average_window == 0 {
            return Err(AnalysisError::InvalidParameter {
                name: "baseline.moving_average_window".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Detector wired with this config's thresholds, baseline and attribution settings.
    pub fn detector(&self) -> AnomalyDetector {
        AnomalyDetector::new(self.thresholds)
            .with_baseline_config(self.baseline)
            .with_attributor(RootCauseAttributor::new(self.attribution.top_resources))
    }

    pub fn projector(&self) -> ForecastProjector {
        ForecastProjector::new(self.forecast)
    }
}

// ---------------------------------------------------------------------------
// Attribution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionConfig {
    /// Resources listed as contributing factors per anomaly.
    pub top_resources: usize,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            top_resources: DEFAULT_TOP_RESOURCES,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.thresholds.cost_spike_threshold, 3.0);
        assert_eq!(cfg.baseline.min_points, 24);
        assert_eq!(cfg.forecast.placeholder_monthly_cost, 1000.0);
        assert_eq!(cfg.attribution.top_resources, 5);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[thresholds]\nabsolute_cost_threshold = 250.0\n\n[logging]\njson = true"
        )
        .unwrap();

        let cfg = EngineConfig::load(file.path()).unwrap();
        assert_eq!(cfg.thresholds.absolute_cost_threshold, 250.0);
        assert_eq!(cfg.thresholds.cost_spike_threshold, 3.0);
        assert!(cfg.logging.json);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.baseline.moving_average_window, 24);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[thresholds\nbroken").unwrap();
        assert!(EngineConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EngineConfig::load(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = EngineConfig::default();
        cfg.thresholds.high_threshold = 9.0;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.forecast.confidence_level = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.baseline.min_points = 0;
        assert!(matches!(
            cfg.validate(),
            Err(AnalysisError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_detector_uses_configured_thresholds() {
        let mut cfg = EngineConfig::default();
        cfg.thresholds.absolute_cost_threshold = 42.0;
        assert_eq!(cfg.detector().thresholds().absolute_cost_threshold, 42.0);
    }
}
