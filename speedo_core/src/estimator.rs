//! The "SMOOTHING" Engine - Scalar Kalman Filter
//!
//! Smooths the converted speed stream into a filtered estimate with a
//! quantified uncertainty. The model is a random walk: the true speed is
//! assumed to drift by variance `Q` between samples and every measurement
//! carries variance `R`.

use serde::{Deserialize, Serialize};

/// Covariance the filter starts with (and keeps until the second update).
pub const INITIAL_ERROR_COVARIANCE: f64 = 1.0;

/// Default process noise Q.
pub const DEFAULT_PROCESS_NOISE: f64 = 0.1;

/// Default measurement noise R.
pub const DEFAULT_MEASUREMENT_NOISE: f64 = 1.0;

/// One-dimensional Kalman filter.
///
/// Owned by exactly one tracking session; created fresh on `start()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarKalmanFilter {
    /// Current estimate; `None` until the first measurement
    estimate: Option<f64>,

    /// Uncertainty of the estimate (P). Always > 0.
    error_covariance: f64,

    /// Process noise (Q)
    process_noise: f64,

    /// Measurement noise (R)
    measurement_noise: f64,
}

impl ScalarKalmanFilter {
    /// Create a filter with the given noise parameters.
    ///
    /// # Arguments
    /// * `process_noise` - Q, expected drift variance between samples
    /// * `measurement_noise` - R, expected sensor error variance
    pub fn new(process_noise: f64, measurement_noise: f64) -> Self {
        Self {
            estimate: None,
            error_covariance: INITIAL_ERROR_COVARIANCE,
            process_noise,
            measurement_noise,
        }
    }

    /// Fold one measurement into the estimate and return the new estimate.
    ///
    /// The first measurement is adopted verbatim. Afterwards:
    /// ```text
    /// P' = P + Q
    /// K  = P' / (P' + R)
    /// x  = x + K (z - x)
    /// P  = (1 - K) P'
    /// ```
    pub fn update(&mut self, measurement: f64) -> f64 {
        let Some(estimate) = self.estimate else {
            self.estimate = Some(measurement);
            return measurement;
        };

        let predicted = self.error_covariance + self.process_noise;
        let gain = predicted / (predicted + self.measurement_noise);
        let next = estimate + gain * (measurement - estimate);

        self.estimate = Some(next);
        self.error_covariance = (1.0 - gain) * predicted;
        next
    }

    /// Retune noise parameters without discarding the estimate.
    pub fn set_noise(&mut self, process_noise: f64, measurement_noise: f64) {
        self.process_noise = process_noise;
        self.measurement_noise = measurement_noise;
    }

    pub fn estimate(&self) -> Option<f64> {
        self.estimate
    }

    pub fn error_covariance(&self) -> f64 {
        self.error_covariance
    }

    pub fn process_noise(&self) -> f64 {
        self.process_noise
    }

    pub fn measurement_noise(&self) -> f64 {
        self.measurement_noise
    }

    pub fn is_initialized(&self) -> bool {
        self.estimate.is_some()
    }
}

impl Default for ScalarKalmanFilter {
    fn default() -> Self {
        Self::new(DEFAULT_PROCESS_NOISE, DEFAULT_MEASUREMENT_NOISE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_filter_initialization() {
        let filter = ScalarKalmanFilter::default();
        assert!(!filter.is_initialized());
        assert_eq!(filter.estimate(), None);
        assert_relative_eq!(filter.error_covariance(), INITIAL_ERROR_COVARIANCE);
        assert_relative_eq!(filter.process_noise(), 0.1);
        assert_relative_eq!(filter.measurement_noise(), 1.0);
    }

    #[test]
    fn test_first_update_adopts_measurement() {
        let mut filter = ScalarKalmanFilter::default();
        assert_eq!(filter.update(42.5), 42.5);
        assert_eq!(filter.estimate(), Some(42.5));
        // Covariance untouched by the first sample
        assert_relative_eq!(filter.error_covariance(), INITIAL_ERROR_COVARIANCE);
    }

    #[test]
    fn test_second_update_matches_hand_computation() {
        let mut filter = ScalarKalmanFilter::default();
        filter.update(0.0);
        let out = filter.update(100.08);

        // P' = 1.1, K = 1.1 / 2.1
        let gain = 1.1 / 2.1;
        assert_relative_eq!(out, gain * 100.08, epsilon = 1e-12);
        assert_relative_eq!(filter.error_covariance(), (1.0 - gain) * 1.1, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_input_converges() {
        let mut filter = ScalarKalmanFilter::default();
        filter.update(0.0);

        let mut out = 0.0;
        for _ in 0..200 {
            out = filter.update(50.0);
        }
        assert_relative_eq!(out, 50.0, epsilon = 1e-3);
    }

    #[test]
    fn test_covariance_settles() {
        let mut filter = ScalarKalmanFilter::default();
        for z in [10.0, 12.0, 9.0, 11.0, 10.5, 10.0, 9.5] {
            filter.update(z);
        }
        // Steady state of P for Q=0.1, R=1 is about 0.27
        assert!(filter.error_covariance() > 0.0);
        assert!(filter.error_covariance() < INITIAL_ERROR_COVARIANCE);
    }

    #[test]
    fn test_set_noise_keeps_estimate() {
        let mut filter = ScalarKalmanFilter::default();
        filter.update(30.0);
        filter.set_noise(0.5, 4.0);
        assert_eq!(filter.estimate(), Some(30.0));
        assert_relative_eq!(filter.process_noise(), 0.5);
        assert_relative_eq!(filter.measurement_noise(), 4.0);
    }

    proptest! {
        #[test]
        fn prop_first_output_is_first_measurement(
            first in 0.0f64..400.0,
            rest in proptest::collection::vec(0.0f64..400.0, 0..20),
        ) {
            let mut filter = ScalarKalmanFilter::default();
            prop_assert_eq!(filter.update(first), first);
            for z in rest {
                filter.update(z);
                prop_assert!(filter.error_covariance() > 0.0);
            }
        }

        #[test]
        fn prop_estimate_stays_within_measurement_range(
            zs in proptest::collection::vec(0.0f64..400.0, 1..50),
        ) {
            let mut filter = ScalarKalmanFilter::default();
            let lo = zs.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = zs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            for z in zs {
                let out = filter.update(z);
                prop_assert!(out >= lo - 1e-9 && out <= hi + 1e-9);
            }
        }
    }
}
