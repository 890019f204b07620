//! Speed Statistics
//! ================
//!
//! Running maximum and a time-windowed moving average over the filtered
//! speed stream.
//!
//! The window is bounded twice:
//! - **Time horizon**: entries older than `window_duration_ms` relative to
//!   the newest recorded timestamp are evicted
//! - **Size cap**: at most `max_window_size` entries, oldest dropped first
//!
//! On every `record` the time horizon is applied first and the size cap
//! second. The cap therefore only ever trims entries that are still
//! inside the horizon. Both passes pop from the front of an ordered
//! window, so the retained set is always the newest `max_window_size`
//! entries within the horizon.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default averaging horizon (60 s).
pub const DEFAULT_WINDOW_DURATION_MS: i64 = 60_000;

/// Default hard cap on retained entries.
pub const DEFAULT_MAX_WINDOW_SIZE: usize = 1000;

/// One filtered speed observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatEntry {
    pub speed_kph: f64,
    pub timestamp_ms: i64,
}

// =============================================================================
// AGGREGATOR
// =============================================================================

/// Maximum and moving average for one tracking session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsAggregator {
    max_speed_kph: f64,
    window: VecDeque<StatEntry>,
    window_duration_ms: i64,
    max_window_size: usize,
}

impl StatsAggregator {
    /// Create an empty aggregator with the given bounds.
    pub fn new(window_duration_ms: i64, max_window_size: usize) -> Self {
        Self {
            max_speed_kph: 0.0,
            window: VecDeque::with_capacity(max_window_size.min(DEFAULT_MAX_WINDOW_SIZE)),
            window_duration_ms,
            max_window_size,
        }
    }

    /// Record a filtered speed.
    ///
    /// A timestamp older than the newest entry is clamped forward so the
    /// window stays ordered.
    pub fn record(&mut self, speed_kph: f64, timestamp_ms: i64) {
        if speed_kph > self.max_speed_kph {
            self.max_speed_kph = speed_kph;
        }

        let timestamp_ms = match self.window.back() {
            Some(last) if timestamp_ms < last.timestamp_ms => last.timestamp_ms,
            _ => timestamp_ms,
        };

        self.window.push_back(StatEntry {
            speed_kph,
            timestamp_ms,
        });
        self.evict(timestamp_ms);
    }

    /// Arithmetic mean of the window, 0 when empty.
    pub fn average(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.window.iter().map(|e| e.speed_kph).sum();
        sum / self.window.len() as f64
    }

    /// Clear maximum and window. Bounds are kept.
    pub fn reset(&mut self) {
        self.max_speed_kph = 0.0;
        self.window.clear();
    }

    /// Change the bounds and enforce them right away.
    pub fn set_limits(&mut self, window_duration_ms: i64, max_window_size: usize) {
        self.window_duration_ms = window_duration_ms;
        self.max_window_size = max_window_size;
        if let Some(newest) = self.window.back().map(|e| e.timestamp_ms) {
            self.evict(newest);
        }
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed_kph
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn window_duration_ms(&self) -> i64 {
        self.window_duration_ms
    }

    pub fn max_window_size(&self) -> usize {
        self.max_window_size
    }

    /// Entries currently averaged, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &StatEntry> {
        self.window.iter()
    }

    fn evict(&mut self, newest_ms: i64) {
        // Time horizon first
        while let Some(front) = self.window.front() {
            if newest_ms.saturating_sub(front.timestamp_ms) > self.window_duration_ms {
                self.window.pop_front();
            } else {
                break;
            }
        }

        // Then the size cap
        while self.window.len() > self.max_window_size {
            self.window.pop_front();
        }
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_DURATION_MS, DEFAULT_MAX_WINDOW_SIZE)
    }
}

// =============================================================================
// TESTS
// =============================================================================
