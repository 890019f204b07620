//! Ground truth oracle for simulation.
//!
//! The oracle maintains the "true" speed of one simulated vehicle as it
//! follows a speed profile phase by phase, and generates sensor samples
//! from it with noise, accuracy jitter and dropouts.

use crate::error::SimError;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use speedo_env::RawSample;

/// One leg of a drive: approach `target_kph`, then hold it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedPhase {
    pub target_kph: f64,
    pub duration_secs: f64,
}

impl SpeedPhase {
    pub const fn new(target_kph: f64, duration_secs: f64) -> Self {
        Self {
            target_kph,
            duration_secs,
        }
    }
}

/// How the simulated receiver corrupts the truth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorProfile {
    /// Gaussian speed noise std dev in m/s (default: 0.4)
    pub speed_noise_std_mps: f64,

    /// Typical reported accuracy radius in meters (default: 6.0)
    pub accuracy_mean_m: f64,

    /// Std dev of the accuracy radius in meters (default: 2.0)
    pub accuracy_jitter_m: f64,

    /// Probability that a fix carries no speed (default: 0.02)
    pub missing_speed_prob: f64,
}

impl Default for SensorProfile {
    fn default() -> Self {
        Self {
            speed_noise_std_mps: 0.4,
            accuracy_mean_m: 6.0,
            accuracy_jitter_m: 2.0,
            missing_speed_prob: 0.02,
        }
    }
}

/// The VehicleOracle - drives the truth and generates sensor samples.
pub struct VehicleOracle {
    /// RNG for sensor noise (separate from any other stream)
    rng: ChaCha8Rng,

    profile: Vec<SpeedPhase>,
    sensor: SensorProfile,
    speed_noise: Normal<f64>,
    accuracy_noise: Normal<f64>,

    /// Longitudinal acceleration limit in m/s² (default: 1.5)
    max_accel_mps2: f64,

    /// Ground speed in m/s
    speed_mps: f64,
    current_time: f64,
    max_speed_mps: f64,
}

impl VehicleOracle {
    /// Creates an oracle at rest.
    pub fn new(
        rng: ChaCha8Rng,
        profile: Vec<SpeedPhase>,
        sensor: SensorProfile,
    ) -> Result<Self, SimError> {
        if profile.is_empty() {
            return Err(SimError::Profile("profile has no phases".to_string()));
        }
        if profile
            .iter()
            .any(|p| !(p.target_kph >= 0.0 && p.duration_secs > 0.0))
        {
            return Err(SimError::Profile(
                "phases need a non-negative target and positive duration".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&sensor.missing_speed_prob) {
            return Err(SimError::Profile(
                "missing_speed_prob must be within [0, 1]".to_string(),
            ));
        }

        Ok(Self {
            rng,
            speed_noise: Normal::new(0.0, sensor.speed_noise_std_mps)?,
            accuracy_noise: Normal::new(sensor.accuracy_mean_m, sensor.accuracy_jitter_m)?,
            profile,
            sensor,
            max_accel_mps2: 1.5,
            speed_mps: 0.0,
            current_time: 0.0,
            max_speed_mps: 0.0,
        })
    }

    /// Sets the acceleration limit.
    pub fn with_max_accel(mut self, accel_mps2: f64) -> Self {
        self.max_accel_mps2 = accel_mps2.abs();
        self
    }

    /// Advances physics by dt seconds.
    pub fn step(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        self.current_time += dt;

        // Rate-limited approach to the phase target
        let target = self.target_kph() / 3.6;
        let max_delta = self.max_accel_mps2 * dt;
        let delta = (target - self.speed_mps).clamp(-max_delta, max_delta);
        self.speed_mps = (self.speed_mps + delta).max(0.0);
        self.max_speed_mps = self.max_speed_mps.max(self.speed_mps);
    }

    /// Generates a noisy sample of the current state.
    pub fn sample(&mut self, timestamp_ms: i64) -> RawSample {
        let accuracy_m = self.accuracy_noise.sample(&mut self.rng).max(1.0);

        if self.rng.gen_bool(self.sensor.missing_speed_prob) {
            return RawSample::without_speed(accuracy_m, timestamp_ms);
        }

        let speed_mps = self.speed_mps + self.speed_noise.sample(&mut self.rng);
        RawSample::new(speed_mps, accuracy_m, timestamp_ms)
    }

    /// Target speed of the phase in force, holding the last one at the end.
    pub fn target_kph(&self) -> f64 {
        let mut elapsed = 0.0;
        for phase in &self.profile {
            elapsed += phase.duration_secs;
            if self.current_time < elapsed {
                return phase.target_kph;
            }
        }
        self.profile.last().map(|p| p.target_kph).unwrap_or(0.0)
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.current_time
    }

    pub fn true_speed_kph(&self) -> f64 {
        self.speed_mps * 3.6
    }

    pub fn max_true_speed_kph(&self) -> f64 {
        self.max_speed_mps * 3.6
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use rand::SeedableRng;

    fn oracle(profile: Vec<SpeedPhase>, sensor: SensorProfile) -> VehicleOracle {
        VehicleOracle::new(ChaCha8Rng::seed_from_u64(42), profile, sensor).unwrap()
    }

    fn quiet() -> SensorProfile {
        SensorProfile {
            speed_noise_std_mps: 0.0,
            accuracy_jitter_m: 0.0,
            missing_speed_prob: 0.0,
            ..SensorProfile::default()
        }
    }

    #[test]
    fn test_oracle_accelerates_to_target() {
        let mut oracle = oracle(vec![SpeedPhase::new(36.0, 60.0)], quiet()).with_max_accel(2.0);

        oracle.step(1.0);
        assert_relative_eq!(oracle.true_speed_kph(), 7.2, epsilon = 1e-9);

        for _ in 0..10 {
            oracle.step(1.0);
        }
        assert_relative_eq!(oracle.true_speed_kph(), 36.0, epsilon = 1e-9);
    }

    #[test]
    fn test_oracle_follows_phases() {
        let mut oracle = oracle(
            vec![SpeedPhase::new(50.0, 10.0), SpeedPhase::new(20.0, 10.0)],
            quiet(),
        );
        assert_eq!(oracle.target_kph(), 50.0);
        for _ in 0..15 {
            oracle.step(1.0);
        }
        assert_eq!(oracle.target_kph(), 20.0);
        for _ in 0..30 {
            oracle.step(1.0);
        }
        // Last phase is held
        assert_eq!(oracle.target_kph(), 20.0);
    }

    #[test]
    fn test_quiet_sensor_reports_truth() {
        let mut oracle = oracle(vec![SpeedPhase::new(36.0, 60.0)], quiet()).with_max_accel(100.0);
        oracle.step(1.0);
        let sample = oracle.sample(1000);
        assert_relative_eq!(sample.speed_mps.unwrap(), 10.0, epsilon = 1e-9);
        assert_relative_eq!(sample.accuracy_m, 6.0);
        assert_eq!(sample.timestamp_ms, 1000);
    }

    #[test]
    fn test_missing_speed_probability() {
        let sensor = SensorProfile {
            missing_speed_prob: 1.0,
            ..SensorProfile::default()
        };
        let mut oracle = oracle(vec![SpeedPhase::new(36.0, 60.0)], sensor);
        assert!(oracle.sample(0).speed_mps.is_none());
    }

    #[test]
    fn test_oracle_deterministic_noise() {
        let profile = vec![SpeedPhase::new(80.0, 30.0)];
        let mut oracle1 = oracle(profile.clone(), SensorProfile::default());
        let mut oracle2 = oracle(profile, SensorProfile::default());

        for i in 0..20 {
            oracle1.step(0.5);
            oracle2.step(0.5);
            assert_eq!(oracle1.sample(i * 500), oracle2.sample(i * 500));
        }
    }

    #[test]
    fn test_invalid_profiles_rejected() {
        let rng = || ChaCha8Rng::seed_from_u64(1);
        assert!(VehicleOracle::new(rng(), vec![], SensorProfile::default()).is_err());
        assert!(VehicleOracle::new(
            rng(),
            vec![SpeedPhase::new(50.0, 0.0)],
            SensorProfile::default()
        )
        .is_err());
        let noisy = SensorProfile {
            speed_noise_std_mps: -1.0,
            ..SensorProfile::default()
        };
        assert!(matches!(
            VehicleOracle::new(rng(), vec![SpeedPhase::new(50.0, 1.0)], noisy),
            Err(SimError::Noise(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_speed_stays_within_profile_bounds(
            targets in proptest::collection::vec(0.0f64..200.0, 1..6),
            dt in 0.05f64..1.0,
        ) {
            let top = targets.iter().cloned().fold(0.0, f64::max);
            let profile = targets.iter().map(|t| SpeedPhase::new(*t, 5.0)).collect();
            let mut oracle = oracle(profile, SensorProfile::default());

            for _ in 0..200 {
                oracle.step(dt);
                prop_assert!(oracle.true_speed_kph() >= 0.0);
                prop_assert!(oracle.true_speed_kph() <= top + 1e-9);
                prop_assert!(oracle.sample(0).accuracy_m >= 1.0);
            }
        }
    }
}
