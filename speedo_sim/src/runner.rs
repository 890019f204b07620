//! Scenario runner - drives a full tracking session against the oracle.
//!
//! Each run wires the real `TrackingSession` to a `SimPositionSource` and a
//! virtual clock. The loop advances time by the session's own sampling
//! interval (or up to a pending retry deadline, whichever is sooner), so
//! the adaptive cadence decides how often the oracle is sampled.

use crate::context::SimContext;
use crate::error::SimError;
use crate::oracle::VehicleOracle;
use crate::scenarios::{Disturbance, ScenarioId};
use crate::source::SimPositionSource;

use serde::{Deserialize, Serialize};
use speedo_core::{ChannelSink, Readout, SpeedUnit, TrackerConfig, TrackingSession};
use speedo_env::{SensorError, SourceEventKind, SpeedoContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// RNG stream for sensor noise.
const PHYSICS_STREAM: u64 = 0x9e3779b97f4a7c15;

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism (default: 42)
    pub seed: u64,

    /// Simulated drive length in seconds (default: 60)
    pub duration_secs: f64,

    /// Tracker settings before scenario adjustments
    pub tracker: TrackerConfig,

    /// Display unit for readouts (default: km/h)
    pub unit: SpeedUnit,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            duration_secs: 60.0,
            tracker: TrackerConfig::default(),
            unit: SpeedUnit::Kph,
        }
    }
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    /// Clock steps taken
    pub steps: u64,

    /// Samples pushed through the source
    pub samples_delivered: u64,

    /// Samples that made it past validation
    pub samples_accepted: u64,

    /// Sensor errors pushed through the source
    pub errors_delivered: u64,

    /// Retry timers that fired
    pub retries: u64,

    /// Subscriptions opened after the initial one
    pub resubscriptions: u64,

    /// Fastest cadence the session selected (ms)
    pub min_interval_ms: Option<u64>,

    /// Readouts rendered
    pub readouts: u64,

    /// Readouts flagged with degraded accuracy
    pub low_accuracy_readouts: u64,

    /// Readouts carrying an error text
    pub error_readouts: u64,
}

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// RMS of filtered minus true speed over accepted samples (km/h)
    pub rms_error_kph: f64,

    /// Highest true speed reached (km/h)
    pub max_true_speed_kph: f64,

    /// Running max reported by the session at the end (km/h)
    pub max_speed_kph: Option<f64>,

    /// Windowed average reported by the session at the end (km/h)
    pub average_speed_kph: Option<f64>,

    /// Whether the session was still tracking when the run ended
    pub tracking_at_end: bool,

    /// Last readout the presentation sink saw
    pub final_readout: Option<Readout>,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Runs driving scenarios.
pub struct ScenarioRunner {
    config: SimConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner with default settings.
    pub fn new(seed: u64) -> Self {
        Self::from_config(SimConfig {
            seed,
            ..SimConfig::default()
        })
    }

    pub fn from_config(config: SimConfig) -> Self {
        Self { config }
    }

    /// Sets the drive length.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.config.duration_secs = secs;
        self
    }

    /// Sets the tracker configuration.
    pub fn with_tracker_config(mut self, tracker: TrackerConfig) -> Self {
        self.config.tracker = tracker;
        self
    }

    /// Sets the display unit.
    pub fn with_unit(mut self, unit: SpeedUnit) -> Self {
        self.config.unit = unit;
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> Result<ScenarioResult, SimError> {
        let seed = self.config.seed;
        info!("Starting scenario: {} (seed={})", scenario.name(), seed);

        // Setup
        let context = SimContext::shared(seed);
        let source = Arc::new(SimPositionSource::new());
        let (sink, mut readouts) = ChannelSink::new();

        let mut tracker = self.config.tracker.clone();
        scenario.adjust_config(&mut tracker);
        let (mut session, mut events) = TrackingSession::with_channel(
            context.clone(),
            source.clone(),
            Box::new(sink),
            tracker,
        )?;
        session.set_unit(self.config.unit);

        let mut oracle = VehicleOracle::new(
            context.derive_rng(PHYSICS_STREAM),
            scenario.profile(),
            scenario.sensor(),
        )?
        .with_max_accel(scenario.max_accel());

        session.start()?;

        let duration = Duration::from_secs_f64(self.config.duration_secs.max(0.0));
        let mut metrics = ScenarioMetrics::default();
        let mut squared_error = 0.0;
        let mut final_readout: Option<Readout> = None;
        let mut subscribes_at_revoke: Option<usize> = None;

        // Run simulation
        while context.now() < duration {
            let Some(interval_ms) = session.current_interval_ms() else {
                break;
            };
            metrics.min_interval_ms = Some(
                metrics
                    .min_interval_ms
                    .map_or(interval_ms, |m| m.min(interval_ms)),
            );

            // Wake for whichever comes first: the next fix or the retry timer
            let now = context.now();
            let mut step = Duration::from_millis(interval_ms);
            let mut sample_due = true;
            if let Some(due) = session.next_deadline() {
                let until = due.saturating_sub(now);
                if until < step {
                    step = until.max(Duration::from_millis(1));
                    sample_due = false;
                }
            }

            oracle.step(step.as_secs_f64());
            context.advance_time(step);
            metrics.steps += 1;

            if session.poll_timers().is_some() {
                metrics.retries += 1;
            }

            if sample_due && session.is_tracking() {
                match scenario.disturbance(context.now(), duration) {
                    Disturbance::None => {
                        source.deliver_sample(oracle.sample(context.time_ms()));
                        metrics.samples_delivered += 1;
                    }
                    Disturbance::SignalLoss => {
                        source.deliver_error(SensorError::SignalUnavailable);
                        metrics.errors_delivered += 1;
                    }
                    Disturbance::PermissionRevoked => {
                        if subscribes_at_revoke.is_none() {
                            source.revoke_permission();
                            subscribes_at_revoke = Some(source.subscribe_count());
                        }
                        source.deliver_error(SensorError::PermissionDenied);
                        metrics.errors_delivered += 1;
                    }
                }
            }

            while let Ok(event) = events.try_recv() {
                let is_sample = matches!(event.kind, SourceEventKind::Sample(_));
                if session.handle_event(event).is_some() && is_sample {
                    if let Some(estimate) = session.filter().and_then(|f| f.estimate()) {
                        let error = estimate - oracle.true_speed_kph();
                        squared_error += error * error;
                        metrics.samples_accepted += 1;
                    }
                }
            }

            while let Ok(readout) = readouts.try_recv() {
                metrics.readouts += 1;
                if readout.status_text.starts_with("Tracking (low accuracy") {
                    metrics.low_accuracy_readouts += 1;
                }
                if readout.error_text.is_some() {
                    metrics.error_readouts += 1;
                }
                final_readout = Some(readout);
            }

            if metrics.steps % 50 == 0 {
                debug!(
                    "  t={:.1}s | true={:.1} km/h | interval={:?} ms | status={:?}",
                    oracle.time(),
                    oracle.true_speed_kph(),
                    session.current_interval_ms(),
                    final_readout.as_ref().map(|r| r.status_text.as_str()),
                );
            }

            if !session.is_tracking() {
                info!("Session stopped at t={:.1}s", oracle.time());
                break;
            }
        }

        while let Ok(readout) = readouts.try_recv() {
            metrics.readouts += 1;
            final_readout = Some(readout);
        }

        metrics.resubscriptions = source.subscribe_count().saturating_sub(1) as u64;
        let rms_error_kph = if metrics.samples_accepted > 0 {
            (squared_error / metrics.samples_accepted as f64).sqrt()
        } else {
            0.0
        };

        let mut result = ScenarioResult {
            scenario,
            seed,
            passed: false,
            final_time_secs: oracle.time(),
            rms_error_kph,
            max_true_speed_kph: oracle.max_true_speed_kph(),
            max_speed_kph: session.stats().map(|s| s.max_speed()),
            average_speed_kph: session.stats().map(|s| s.average()),
            tracking_at_end: session.is_tracking(),
            final_readout,
            failure_reason: None,
            metrics,
        };

        let failures = self.check(&result, subscribes_at_revoke, source.subscribe_count());
        result.passed = failures.is_empty();
        if !result.passed {
            result.failure_reason = Some(failures.join("; "));
            warn!("{} failed: {:?}", scenario.name(), result.failure_reason);
        } else {
            info!(
                "✓ {} complete: {} samples, {} resubscriptions, RMS error: {:.2} km/h",
                scenario.name(),
                result.metrics.samples_accepted,
                result.metrics.resubscriptions,
                result.rms_error_kph
            );
        }

        Ok(result)
    }

    // ========== Private Helper Methods ==========

    /// Scenario assertions. Returns one message per failed check.
    fn check(
        &self,
        result: &ScenarioResult,
        subscribes_at_revoke: Option<usize>,
        subscribes_at_end: usize,
    ) -> Vec<String> {
        let mut failures = Vec::new();
        let scenario = result.scenario;
        let metrics = &result.metrics;

        if result.rms_error_kph >= scenario.rms_limit_kph() {
            failures.push(format!(
                "RMS error {:.2} km/h exceeds threshold {:.1} km/h",
                result.rms_error_kph,
                scenario.rms_limit_kph()
            ));
        }

        if scenario != ScenarioId::PermissionRevoked && !result.tracking_at_end {
            failures.push("session stopped unexpectedly".to_string());
        }

        match scenario {
            ScenarioId::CityDrive => {
                if metrics.resubscriptions == 0 {
                    failures.push("cadence never changed".to_string());
                }
                if let Some(max) = result.max_speed_kph {
                    if max < 0.8 * result.max_true_speed_kph {
                        failures.push(format!(
                            "max speed {:.1} km/h far below true {:.1} km/h",
                            max, result.max_true_speed_kph
                        ));
                    }
                }
            }
            ScenarioId::HighwayRun => {
                if result.max_true_speed_kph > 110.0 && metrics.min_interval_ms != Some(100) {
                    failures.push(format!(
                        "fastest cadence {:?} ms, expected 100 ms",
                        metrics.min_interval_ms
                    ));
                }
            }
            ScenarioId::SignalDropout => {
                if metrics.errors_delivered > 0 && metrics.retries == 0 {
                    failures.push("no retry during signal loss".to_string());
                }
                if metrics.errors_delivered > 0 && metrics.error_readouts == 0 {
                    failures.push("signal loss never reported".to_string());
                }
            }
            ScenarioId::PermissionRevoked => {
                if let Some(at_revoke) = subscribes_at_revoke {
                    if result.tracking_at_end {
                        failures.push("still tracking after permission revoked".to_string());
                    }
                    if subscribes_at_end != at_revoke {
                        failures.push("resubscribed after a fatal error".to_string());
                    }
                    let reported = result
                        .final_readout
                        .as_ref()
                        .and_then(|r| r.error_text.as_deref())
                        .map_or(false, |t| t.contains("Permission denied"));
                    if !reported {
                        failures.push("permission error not shown".to_string());
                    }
                }
            }
            ScenarioId::PoorAccuracy => {
                if metrics.samples_accepted == 0 {
                    failures.push("no samples accepted".to_string());
                }
                if metrics.low_accuracy_readouts == 0 {
                    failures.push("degraded accuracy never reported".to_string());
                }
            }
        }

        failures
    }
}
