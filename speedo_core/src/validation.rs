//! Sample Validation - Screens raw readings before they reach the filter
//! =====================================================================
//!
//! A sample is usable when it carries a finite speed. What happens to a
//! sample whose accuracy radius is worse than the threshold depends on
//! the configured [`AccuracyPolicy`]:
//!
//! - **Strict**: the sample is rejected outright
//! - **Lenient**: the sample passes, flagged as out of bound so the
//!   session can report degraded accuracy in its status text
//!
//! Rejected samples are not errors; the session drops them silently.

use serde::{Deserialize, Serialize};
use speedo_env::RawSample;
use std::fmt;
use std::str::FromStr;

/// m/s → km/h
pub const MPS_TO_KPH: f64 = 3.6;

/// Default accuracy threshold in meters.
pub const DEFAULT_ACCURACY_THRESHOLD_M: f64 = 20.0;

/// How to treat samples whose accuracy exceeds the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyPolicy {
    /// Reject samples above the threshold
    #[default]
    Strict,
    /// Accept them but flag the accuracy as out of bound
    Lenient,
}

impl fmt::Display for AccuracyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Lenient => write!(f, "lenient"),
        }
    }
}

impl FromStr for AccuracyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            other => Err(format!("unknown accuracy policy '{}'", other)),
        }
    }
}

/// A sample that survived validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedSample {
    /// Converted speed in km/h, never negative
    pub speed_kph: f64,
    /// Accuracy radius reported by the source
    pub accuracy_m: f64,
    /// False only under the lenient policy when accuracy exceeded the threshold
    pub accuracy_in_bound: bool,
    /// Source timestamp
    pub timestamp_ms: i64,
}

/// Screen one raw sample.
///
/// Returns `None` when the sample carries no usable speed, or when the
/// strict policy rejects it for poor accuracy.
pub fn validate(
    raw: &RawSample,
    threshold_accuracy_m: f64,
    policy: AccuracyPolicy,
) -> Option<ValidatedSample> {
    let speed_kph = raw.speed_mps.map(|s| s * MPS_TO_KPH)?;
    if !speed_kph.is_finite() {
        return None;
    }

    // NaN accuracy never compares as in-bound
    let accuracy_in_bound = raw.accuracy_m <= threshold_accuracy_m;
    if !accuracy_in_bound && policy == AccuracyPolicy::Strict {
        return None;
    }

    Some(ValidatedSample {
        speed_kph: speed_kph.max(0.0),
        accuracy_m: raw.accuracy_m,
        accuracy_in_bound,
        timestamp_ms: raw.timestamp_ms,
    })
}

/// Validator bound to a threshold and policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleValidator {
    pub threshold_accuracy_m: f64,
    pub policy: AccuracyPolicy,
}

impl SampleValidator {
    pub fn new(threshold_accuracy_m: f64, policy: AccuracyPolicy) -> Self {
        Self {
            threshold_accuracy_m,
            policy,
        }
    }

    pub fn validate(&self, raw: &RawSample) -> Option<ValidatedSample> {
        validate(raw, self.threshold_accuracy_m, self.policy)
    }
}

impl Default for SampleValidator {
    fn default() -> Self {
        Self::new(DEFAULT_ACCURACY_THRESHOLD_M, AccuracyPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_missing_speed_rejected() {
        let raw = RawSample::without_speed(5.0, 0);
        assert!(validate(&raw, 20.0, AccuracyPolicy::Strict).is_none());
        assert!(validate(&raw, 20.0, AccuracyPolicy::Lenient).is_none());
    }

    #[test]
    fn test_non_finite_speed_rejected() {
        let raw = RawSample::new(f64::NAN, 5.0, 0);
        assert!(validate(&raw, 20.0, AccuracyPolicy::Lenient).is_none());
    }

    #[test]
    fn test_speed_overflowing_on_conversion_rejected() {
        let raw = RawSample::new(1e308, 5.0, 0);
        assert!(validate(&raw, 20.0, AccuracyPolicy::Lenient).is_none());
        let raw = RawSample::new(-1e308, 5.0, 0);
        assert!(validate(&raw, 20.0, AccuracyPolicy::Strict).is_none());
    }

    #[test]
    fn test_conversion_to_kph() {
        let raw = RawSample::new(27.8, 5.0, 1000);
        let sample = validate(&raw, 20.0, AccuracyPolicy::Strict).unwrap();
        assert_relative_eq!(sample.speed_kph, 100.08, epsilon = 1e-9);
        assert!(sample.accuracy_in_bound);
        assert_eq!(sample.timestamp_ms, 1000);
    }

    #[test]
    fn test_zero_speed_accepted() {
        let raw = RawSample::new(0.0, 5.0, 0);
        let sample = validate(&raw, 20.0, AccuracyPolicy::Strict).unwrap();
        assert_eq!(sample.speed_kph, 0.0);
    }

    #[test]
    fn test_negative_speed_clamped() {
        let raw = RawSample::new(-3.0, 5.0, 0);
        let sample = validate(&raw, 20.0, AccuracyPolicy::Strict).unwrap();
        assert_eq!(sample.speed_kph, 0.0);
    }

    #[test]
    fn test_strict_rejects_poor_accuracy() {
        let raw = RawSample::new(10.0, 35.0, 0);
        assert!(validate(&raw, 20.0, AccuracyPolicy::Strict).is_none());
        // Threshold is inclusive
        let edge = RawSample::new(10.0, 20.0, 0);
        assert!(validate(&edge, 20.0, AccuracyPolicy::Strict).is_some());
    }

    #[test]
    fn test_lenient_flags_poor_accuracy() {
        let raw = RawSample::new(10.0, 35.0, 0);
        let sample = validate(&raw, 20.0, AccuracyPolicy::Lenient).unwrap();
        assert!(!sample.accuracy_in_bound);
        assert_relative_eq!(sample.speed_kph, 36.0, epsilon = 1e-9);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let validator = SampleValidator::new(50.0, AccuracyPolicy::Strict);
        let raw = RawSample::new(10.0, 35.0, 0);
        assert!(validator.validate(&raw).is_some());
        assert!(SampleValidator::default().validate(&raw).is_none());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("Strict".parse::<AccuracyPolicy>(), Ok(AccuracyPolicy::Strict));
        assert_eq!("lenient".parse::<AccuracyPolicy>(), Ok(AccuracyPolicy::Lenient));
        assert!("loose".parse::<AccuracyPolicy>().is_err());
    }
}
