//! Common types for the Speedo environment abstraction.

use crate::error::SensorError;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// A single reading delivered by the position source.
///
/// Immutable once produced; the core consumes each sample exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Ground speed in m/s, if the source could compute one
    pub speed_mps: Option<f64>,

    /// Horizontal accuracy radius in meters (lower is better)
    pub accuracy_m: f64,

    /// Acquisition time in milliseconds (source clock)
    pub timestamp_ms: i64,
}

impl RawSample {
    /// Creates a sample carrying a speed reading.
    pub fn new(speed_mps: f64, accuracy_m: f64, timestamp_ms: i64) -> Self {
        Self {
            speed_mps: Some(speed_mps),
            accuracy_m,
            timestamp_ms,
        }
    }

    /// Creates a sample for a fix without a speed component.
    pub fn without_speed(accuracy_m: f64, timestamp_ms: i64) -> Self {
        Self {
            speed_mps: None,
            accuracy_m,
            timestamp_ms,
        }
    }
}

/// Acquisition parameters passed to [`PositionSource::subscribe`](crate::PositionSource::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeOptions {
    /// Request the most accurate fix the hardware can give
    pub high_accuracy: bool,

    /// Oldest cached fix the source may hand back (ms)
    pub max_sample_age_ms: u64,

    /// How long the source may wait for a fix before reporting a timeout (ms)
    pub timeout_ms: u64,
}

impl SubscribeOptions {
    /// Options derived from a sampling interval.
    ///
    /// The accepted sample age matches the interval; the timeout is
    /// `interval * timeout_factor`, never shorter than `min_timeout_ms`.
    pub fn for_interval(interval_ms: u64, timeout_factor: u64, min_timeout_ms: u64) -> Self {
        Self {
            high_accuracy: true,
            max_sample_age_ms: interval_ms,
            timeout_ms: interval_ms.saturating_mul(timeout_factor).max(min_timeout_ms),
        }
    }

    /// Loosened acquisition parameters used when retrying after a sensor error.
    pub fn relaxed(&self, factor: u64) -> Self {
        let factor = factor.max(1);
        Self {
            high_accuracy: false,
            max_sample_age_ms: self.max_sample_age_ms.saturating_mul(factor),
            timeout_ms: self.timeout_ms.saturating_mul(factor),
        }
    }
}

/// Opaque identifier of one live subscription.
///
/// Sources mint handles from a per-source sequence, so successive
/// subscriptions never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionHandle(pub Uuid);

impl SubscriptionHandle {
    /// Creates a deterministic handle from a sequence number.
    pub fn from_seq(seq: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seq.to_le_bytes());
        bytes[8..16].copy_from_slice(&seq.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl std::fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// What a subscription delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEventKind {
    Sample(RawSample),
    Error(SensorError),
}

/// An event emitted by the position source, tagged with the subscription
/// that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEvent {
    pub subscription: SubscriptionHandle,
    pub kind: SourceEventKind,
}

impl SourceEvent {
    pub fn sample(subscription: SubscriptionHandle, sample: RawSample) -> Self {
        Self {
            subscription,
            kind: SourceEventKind::Sample(sample),
        }
    }

    pub fn error(subscription: SubscriptionHandle, error: SensorError) -> Self {
        Self {
            subscription,
            kind: SourceEventKind::Error(error),
        }
    }
}

/// Channel end a source pushes its events into.
pub type EventSink = mpsc::UnboundedSender<SourceEvent>;

/// Channel end the session driver drains.
pub type EventStream = mpsc::UnboundedReceiver<SourceEvent>;

/// Creates a connected sink/stream pair.
pub fn event_channel() -> (EventSink, EventStream) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_for_interval() {
        let opts = SubscribeOptions::for_interval(1000, 10, 5000);
        assert!(opts.high_accuracy);
        assert_eq!(opts.max_sample_age_ms, 1000);
        assert_eq!(opts.timeout_ms, 10_000);

        // Fast cadence still gets the minimum timeout
        let fast = SubscribeOptions::for_interval(100, 10, 5000);
        assert_eq!(fast.timeout_ms, 5000);
    }

    #[test]
    fn test_relaxed_options() {
        let opts = SubscribeOptions::for_interval(500, 10, 5000);
        let relaxed = opts.relaxed(3);
        assert!(!relaxed.high_accuracy);
        assert_eq!(relaxed.max_sample_age_ms, 1500);
        assert_eq!(relaxed.timeout_ms, 15_000);
    }

    #[test]
    fn test_handle_from_seq_is_deterministic() {
        assert_eq!(SubscriptionHandle::from_seq(7), SubscriptionHandle::from_seq(7));
        assert_ne!(SubscriptionHandle::from_seq(7), SubscriptionHandle::from_seq(8));
    }
}
