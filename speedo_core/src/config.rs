//! Tracker configuration.
//!
//! Every tunable of the pipeline lives in [`TrackerConfig`]. All fields
//! have defaults, so a JSON file only needs to name what it overrides:
//!
//! ```json
//! { "accuracy_threshold_m": 50.0, "strictness": "lenient" }
//! ```

use crate::cadence::{CadenceController, CadenceTable};
use crate::error::ConfigError;
use crate::estimator::{ScalarKalmanFilter, DEFAULT_MEASUREMENT_NOISE, DEFAULT_PROCESS_NOISE};
use crate::stats::{StatsAggregator, DEFAULT_MAX_WINDOW_SIZE, DEFAULT_WINDOW_DURATION_MS};
use crate::validation::{AccuracyPolicy, SampleValidator, DEFAULT_ACCURACY_THRESHOLD_M};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Retry behaviour after a retryable sensor error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Fixed delay before re-subscribing (ms)
    pub backoff_ms: u64,

    /// Consecutive failed attempts tolerated before tracking stops
    pub max_attempts: u32,

    /// Multiplier applied to sample age and timeout on retry
    pub relax_factor: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_ms: 2000,
            max_attempts: 3,
            relax_factor: 3,
        }
    }
}

/// Configuration for a tracking session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Accuracy radius above which a sample is considered poor (default: 20 m)
    pub accuracy_threshold_m: f64,

    /// What to do with poor samples (default: strict)
    pub strictness: AccuracyPolicy,

    /// Kalman process noise Q (default: 0.1)
    pub process_noise: f64,

    /// Kalman measurement noise R (default: 1.0)
    pub measurement_noise: f64,

    /// Speed → interval table
    pub cadence: CadenceTable,

    /// Moving average horizon (default: 60 s)
    pub window_duration_ms: i64,

    /// Moving average hard cap (default: 1000)
    pub max_window_size: usize,

    pub retry: RetryPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            accuracy_threshold_m: DEFAULT_ACCURACY_THRESHOLD_M,
            strictness: AccuracyPolicy::default(),
            process_noise: DEFAULT_PROCESS_NOISE,
            measurement_noise: DEFAULT_MEASUREMENT_NOISE,
            cadence: CadenceTable::default(),
            window_duration_ms: DEFAULT_WINDOW_DURATION_MS,
            max_window_size: DEFAULT_MAX_WINDOW_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

impl TrackerConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let mut config: TrackerConfig = serde_json::from_str(json)?;
        config.cadence.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.accuracy_threshold_m.is_finite() && self.accuracy_threshold_m > 0.0) {
            return Err(ConfigError::invalid("accuracy_threshold_m must be positive"));
        }
        // Q may be zero (static signal); R must be positive so the gain stays below 1
        if !(self.process_noise.is_finite() && self.process_noise >= 0.0) {
            return Err(ConfigError::invalid("process_noise must be non-negative"));
        }
        if !(self.measurement_noise.is_finite() && self.measurement_noise > 0.0) {
            return Err(ConfigError::invalid("measurement_noise must be positive"));
        }
        if self.window_duration_ms <= 0 {
            return Err(ConfigError::invalid("window_duration_ms must be positive"));
        }
        if self.max_window_size == 0 {
            return Err(ConfigError::invalid("max_window_size must be at least 1"));
        }
        if self.cadence.fallback_ms == 0 || self.cadence.steps.iter().any(|s| s.interval_ms == 0) {
            return Err(ConfigError::invalid("cadence intervals must be positive"));
        }
        if self.cadence.steps.iter().any(|s| !s.above_kph.is_finite()) {
            return Err(ConfigError::invalid("cadence thresholds must be finite"));
        }
        let ordered = self
            .cadence
            .steps
            .windows(2)
            .all(|w| w[0].above_kph > w[1].above_kph);
        if !ordered {
            return Err(ConfigError::invalid(
                "cadence steps must have distinct thresholds sorted fastest-first",
            ));
        }
        if self.retry.backoff_ms == 0 {
            return Err(ConfigError::invalid("retry.backoff_ms must be positive"));
        }
        Ok(())
    }

    pub fn validator(&self) -> SampleValidator {
        SampleValidator::new(self.accuracy_threshold_m, self.strictness)
    }

    pub fn new_filter(&self) -> ScalarKalmanFilter {
        ScalarKalmanFilter::new(self.process_noise, self.measurement_noise)
    }

    pub fn new_stats(&self) -> StatsAggregator {
        StatsAggregator::new(self.window_duration_ms, self.max_window_size)
    }

    pub fn new_controller(&self) -> CadenceController {
        CadenceController::new(self.cadence.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadence::CadenceStep;

    #[test]
    fn test_config_default() {
        let config = TrackerConfig::default();
        assert_eq!(config.accuracy_threshold_m, 20.0);
        assert_eq!(config.strictness, AccuracyPolicy::Strict);
        assert_eq!(config.process_noise, 0.1);
        assert_eq!(config.measurement_noise, 1.0);
        assert_eq!(config.window_duration_ms, 60_000);
        assert_eq!(config.max_window_size, 1000);
        assert_eq!(config.retry.backoff_ms, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = TrackerConfig::from_json_str(
            r#"{
                "accuracy_threshold_m": 50.0,
                "strictness": "lenient",
                "retry": { "max_attempts": 5 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.accuracy_threshold_m, 50.0);
        assert_eq!(config.strictness, AccuracyPolicy::Lenient);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_ms, 2000);
        assert_eq!(config.max_window_size, 1000);
    }

    #[test]
    fn test_cadence_from_json_is_normalized() {
        let config = TrackerConfig::from_json_str(
            r#"{ "cadence": {
                "steps": [ { "above_kph": 30.0, "interval_ms": 400 },
                           { "above_kph": 90.0, "interval_ms": 150 } ],
                "fallback_ms": 800, "min_change_ms": 50,
                "timeout_factor": 10, "min_timeout_ms": 5000 } }"#,
        )
        .unwrap();
        assert_eq!(config.cadence.interval_for(95.0), 150);
        assert_eq!(config.cadence.interval_for(40.0), 400);
        assert_eq!(config.cadence.interval_for(10.0), 800);
    }

    #[test]
    fn test_malformed_json() {
        let err = TrackerConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = TrackerConfig::from_json_file("/nonexistent/speedo.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = TrackerConfig::default();
        config.measurement_noise = 0.0;
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.max_window_size = 0;
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.cadence.steps.push(CadenceStep::new(20.0, 700));
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.accuracy_threshold_m = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_factories_follow_config() {
        let mut config = TrackerConfig::default();
        config.process_noise = 0.3;
        config.max_window_size = 7;
        assert_eq!(config.new_filter().process_noise(), 0.3);
        assert_eq!(config.new_stats().max_window_size(), 7);
        assert_eq!(config.new_controller().current_interval_ms(), 1000);
        assert_eq!(config.validator().threshold_accuracy_m, 20.0);
    }
}
