//! Adaptive Sampling Controller
//!
//! Chooses how often the position source is asked for samples based on
//! the filtered speed: faster travel covers more ground per sample, so
//! the cadence tightens as speed rises.
//!
//! # Hysteresis
//!
//! A new interval is only acted on when it differs from the current one
//! by more than `min_change_ms`. Noise straddling a step boundary would
//! otherwise tear down and reopen the subscription on every sample.

use serde::{Deserialize, Serialize};
use speedo_env::SubscribeOptions;
use tracing::debug;

/// One row of the cadence table: above `above_kph`, sample every `interval_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CadenceStep {
    pub above_kph: f64,
    pub interval_ms: u64,
}

impl CadenceStep {
    pub const fn new(above_kph: f64, interval_ms: u64) -> Self {
        Self {
            above_kph,
            interval_ms,
        }
    }
}

/// Speed → sampling interval lookup.
///
/// Steps are kept sorted by descending `above_kph`; the first step whose
/// threshold the speed strictly exceeds wins, otherwise `fallback_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceTable {
    pub steps: Vec<CadenceStep>,
    pub fallback_ms: u64,

    /// Minimum interval delta that triggers a resubscription
    pub min_change_ms: u64,

    /// Subscription timeout as a multiple of the interval
    pub timeout_factor: u64,

    /// Lower bound on the subscription timeout
    pub min_timeout_ms: u64,
}

impl Default for CadenceTable {
    fn default() -> Self {
        Self {
            steps: vec![
                CadenceStep::new(100.0, 100),
                CadenceStep::new(60.0, 200),
                CadenceStep::new(20.0, 500),
            ],
            fallback_ms: 1000,
            min_change_ms: 50,
            timeout_factor: 10,
            min_timeout_ms: 5000,
        }
    }
}

impl CadenceTable {
    /// Interval to use at `speed_kph`.
    pub fn interval_for(&self, speed_kph: f64) -> u64 {
        self.steps
            .iter()
            .find(|step| speed_kph > step.above_kph)
            .map(|step| step.interval_ms)
            .unwrap_or(self.fallback_ms)
    }

    /// Subscription options for a given interval.
    pub fn options_for(&self, interval_ms: u64) -> SubscribeOptions {
        SubscribeOptions::for_interval(interval_ms, self.timeout_factor, self.min_timeout_ms)
    }

    /// Sort steps fastest-first.
    pub fn normalize(&mut self) {
        self.steps
            .sort_by(|a, b| b.above_kph.total_cmp(&a.above_kph));
    }
}

/// Instruction to replace the active subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResubscribeRequest {
    pub interval_ms: u64,
    pub options: SubscribeOptions,
}

/// Tracks the current cadence and decides when it should change.
#[derive(Debug, Clone)]
pub struct CadenceController {
    table: CadenceTable,
    current_interval_ms: u64,
}

impl CadenceController {
    /// Starts at the table's fallback (slowest) interval.
    pub fn new(table: CadenceTable) -> Self {
        let current_interval_ms = table.fallback_ms;
        Self {
            table,
            current_interval_ms,
        }
    }

    /// Options for the interval currently in force.
    pub fn current_options(&self) -> SubscribeOptions {
        self.table.options_for(self.current_interval_ms)
    }

    /// Feed the latest filtered speed.
    ///
    /// Returns a request only when the desired interval moved by more than
    /// the hysteresis threshold; the controller then assumes the caller
    /// resubscribes and adopts the new interval.
    pub fn on_filtered_speed(&mut self, speed_kph: f64) -> Option<ResubscribeRequest> {
        let desired = self.table.interval_for(speed_kph);
        if desired.abs_diff(self.current_interval_ms) <= self.table.min_change_ms {
            return None;
        }

        debug!(
            from_ms = self.current_interval_ms,
            to_ms = desired,
            speed_kph,
            "Sampling cadence change"
        );
        self.current_interval_ms = desired;

        Some(ResubscribeRequest {
            interval_ms: desired,
            options: self.table.options_for(desired),
        })
    }

    /// Swap the table. The current interval is kept until the next speed
    /// update decides otherwise.
    pub fn set_table(&mut self, table: CadenceTable) {
        self.table = table;
    }

    pub fn current_interval_ms(&self) -> u64 {
        self.current_interval_ms
    }

    pub fn table(&self) -> &CadenceTable {
        &self.table
    }
}

impl Default for CadenceController {
    fn default() -> Self {
        Self::new(CadenceTable::default())
    }
}
