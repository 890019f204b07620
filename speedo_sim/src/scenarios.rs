//! Driving scenarios for deterministic simulation runs.

use crate::oracle::{SensorProfile, SpeedPhase};
use serde::{Deserialize, Serialize};
use speedo_core::{AccuracyPolicy, TrackerConfig};
use std::time::Duration;

/// Length of the signal outage in `SignalDropout`.
pub const DROPOUT_LENGTH: Duration = Duration::from_secs(3);

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// SIM-001: stop-and-go urban driving below 60 km/h
    CityDrive,

    /// SIM-002: motorway ramp up past 100 km/h
    HighwayRun,

    /// SIM-003: receiver loses the signal for a few seconds
    SignalDropout,

    /// SIM-004: user revokes location permission mid-drive
    PermissionRevoked,

    /// SIM-005: urban canyon, accuracy mostly worse than the threshold
    PoorAccuracy,
}

/// What the environment does to the source at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disturbance {
    None,
    SignalLoss,
    PermissionRevoked,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::CityDrive,
            ScenarioId::HighwayRun,
            ScenarioId::SignalDropout,
            ScenarioId::PermissionRevoked,
            ScenarioId::PoorAccuracy,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::CityDrive => "city_drive",
            ScenarioId::HighwayRun => "highway_run",
            ScenarioId::SignalDropout => "signal_dropout",
            ScenarioId::PermissionRevoked => "permission_revoked",
            ScenarioId::PoorAccuracy => "poor_accuracy",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::CityDrive => "Stop-and-go city traffic, cadence follows speed bands",
            ScenarioId::HighwayRun => "Accelerate past 100 km/h, expect 100 ms sampling",
            ScenarioId::SignalDropout => "3 s signal loss, relaxed retry then recovery",
            ScenarioId::PermissionRevoked => "Permission revoked mid-drive, session stops for good",
            ScenarioId::PoorAccuracy => "Accuracy around 35 m under the lenient policy",
        }
    }

    /// Speed profile the simulated driver follows.
    pub fn profile(&self) -> Vec<SpeedPhase> {
        match self {
            ScenarioId::CityDrive => vec![
                SpeedPhase::new(30.0, 12.0),
                SpeedPhase::new(50.0, 15.0),
                SpeedPhase::new(20.0, 10.0),
                SpeedPhase::new(45.0, 15.0),
                SpeedPhase::new(0.0, 8.0),
            ],
            ScenarioId::HighwayRun => vec![
                SpeedPhase::new(80.0, 15.0),
                SpeedPhase::new(115.0, 15.0),
                SpeedPhase::new(130.0, 15.0),
                SpeedPhase::new(90.0, 15.0),
            ],
            ScenarioId::SignalDropout => vec![
                SpeedPhase::new(55.0, 20.0),
                SpeedPhase::new(75.0, 40.0),
            ],
            ScenarioId::PermissionRevoked => vec![SpeedPhase::new(40.0, 60.0)],
            ScenarioId::PoorAccuracy => vec![
                SpeedPhase::new(35.0, 30.0),
                SpeedPhase::new(55.0, 30.0),
            ],
        }
    }

    /// Receiver characteristics for the scenario.
    pub fn sensor(&self) -> SensorProfile {
        match self {
            ScenarioId::PoorAccuracy => SensorProfile {
                accuracy_mean_m: 35.0,
                accuracy_jitter_m: 8.0,
                ..SensorProfile::default()
            },
            _ => SensorProfile::default(),
        }
    }

    /// Longitudinal acceleration limit in m/s².
    pub fn max_accel(&self) -> f64 {
        match self {
            ScenarioId::HighwayRun => 1.5,
            _ => 1.0,
        }
    }

    /// Largest acceptable RMS gap between estimate and truth, km/h.
    pub fn rms_limit_kph(&self) -> f64 {
        match self {
            ScenarioId::HighwayRun => 10.0,
            _ => 12.0,
        }
    }

    /// Scenario-specific tracker settings layered over the run's config.
    pub fn adjust_config(&self, config: &mut TrackerConfig) {
        if *self == ScenarioId::PoorAccuracy {
            config.strictness = AccuracyPolicy::Lenient;
        }
    }

    /// Disturbance in force `elapsed` into a run of length `duration`.
    pub fn disturbance(&self, elapsed: Duration, duration: Duration) -> Disturbance {
        match self {
            ScenarioId::SignalDropout => {
                let start = duration.mul_f64(0.4);
                if elapsed >= start && elapsed < start + DROPOUT_LENGTH {
                    Disturbance::SignalLoss
                } else {
                    Disturbance::None
                }
            }
            ScenarioId::PermissionRevoked if elapsed >= duration / 2 => {
                Disturbance::PermissionRevoked
            }
            _ => Disturbance::None,
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "city_drive" | "citydrive" | "city" | "sim-001" => Ok(ScenarioId::CityDrive),
            "highway_run" | "highwayrun" | "highway" | "sim-002" => Ok(ScenarioId::HighwayRun),
            "signal_dropout" | "signaldropout" | "dropout" | "sim-003" => {
                Ok(ScenarioId::SignalDropout)
            }
            "permission_revoked" | "permissionrevoked" | "sim-004" => {
                Ok(ScenarioId::PermissionRevoked)
            }
            "poor_accuracy" | "pooraccuracy" | "sim-005" => Ok(ScenarioId::PoorAccuracy),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert_eq!("SIM-002".parse::<ScenarioId>(), Ok(ScenarioId::HighwayRun));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_dropout_window() {
        let duration = Duration::from_secs(60);
        let s = ScenarioId::SignalDropout;
        assert_eq!(s.disturbance(Duration::from_secs(23), duration), Disturbance::None);
        assert_eq!(s.disturbance(Duration::from_millis(24_100), duration), Disturbance::SignalLoss);
        assert_eq!(
            s.disturbance(Duration::from_millis(26_900), duration),
            Disturbance::SignalLoss
        );
        assert_eq!(s.disturbance(Duration::from_secs(27), duration), Disturbance::None);
    }

    #[test]
    fn test_permission_revoked_after_halfway() {
        let duration = Duration::from_secs(40);
        let s = ScenarioId::PermissionRevoked;
        assert_eq!(s.disturbance(Duration::from_secs(19), duration), Disturbance::None);
        assert_eq!(
            s.disturbance(Duration::from_secs(20), duration),
            Disturbance::PermissionRevoked
        );
    }

    #[test]
    fn test_poor_accuracy_goes_lenient() {
        let mut config = TrackerConfig::default();
        ScenarioId::PoorAccuracy.adjust_config(&mut config);
        assert_eq!(config.strictness, AccuracyPolicy::Lenient);

        let mut config = TrackerConfig::default();
        ScenarioId::CityDrive.adjust_config(&mut config);
        assert_eq!(config.strictness, AccuracyPolicy::Strict);
    }
}
