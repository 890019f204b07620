//! Speedo Core - Adaptive Vehicle Speed Estimation
//!
//! Turns a stream of noisy position-source readings into a smoothed speed
//! readout with running statistics, and adapts how often the source is
//! polled to how fast the vehicle is moving:
//!
//! 1. **Validation**: drop samples without speed or with poor accuracy
//! 2. **Smoothing**: scalar Kalman filter over km/h
//! 3. **Statistics**: running max plus a time-windowed average
//! 4. **Cadence**: faster sampling at higher speeds, with hysteresis
//!
//! A [`TrackingSession`] owns all of it; a [`SessionDriver`] serializes
//! commands, source events and retry timers into that session.

pub mod cadence;
pub mod config;
pub mod driver;
pub mod error;
pub mod estimator;
pub mod session;
pub mod stats;
pub mod units;
pub mod validation;

#[cfg(test)]
mod test_support;

// Re-export key types for convenience
pub use cadence::{CadenceController, CadenceStep, CadenceTable, ResubscribeRequest};
pub use config::{RetryPolicy, TrackerConfig};
pub use driver::{SessionCommand, SessionDriver, SessionHandle};
pub use error::{ConfigError, SessionError};
pub use estimator::ScalarKalmanFilter;
pub use session::{
    ChannelSink, FormattedReadout, NullSink, PresentationSink, Readout, RetryTimer,
    TrackingSession,
};
pub use stats::{StatEntry, StatsAggregator};
pub use units::{SpeedBand, SpeedUnit};
pub use validation::{AccuracyPolicy, SampleValidator, ValidatedSample};
