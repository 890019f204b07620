//! Tracking Session - Orchestrates the pipeline for one start/stop cycle.
//!
//! This module ties the pure engines together and owns every piece of
//! mutable state a tracking run needs:
//!
//! ```text
//!   SourceEvent ──► Validator ──► Kalman ──┬──► Readout ──► PresentationSink
//!                                           ├──► StatsAggregator
//!                                           └──► CadenceController
//!                                                     │
//!                        PositionSource ◄── resubscribe┘
//! ```
//!
//! # State Machine
//!
//! - `NotTracking` → `start()` → `Tracking`: fresh filter and statistics,
//!   initial subscription at the slowest cadence
//! - `Tracking` → `stop()` or a fatal sensor error → `NotTracking`:
//!   subscription cancelled, filter/statistics dropped, retry timer cleared
//!
//! # Single Writer
//!
//! The session is a plain `&mut self` object. Whoever owns it (normally
//! [`SessionDriver`](crate::driver::SessionDriver)) feeds it one event at a
//! time, so no locking happens here.

use crate::cadence::CadenceController;
use crate::config::TrackerConfig;
use crate::error::{ConfigError, SessionError};
use crate::estimator::ScalarKalmanFilter;
use crate::stats::StatsAggregator;
use crate::units::{self, SpeedBand, SpeedUnit};
use crate::validation::SampleValidator;

use serde::{Deserialize, Serialize};
use speedo_env::{
    event_channel, EventSink, EventStream, PositionSource, RawSample, SensorError, SourceEvent,
    SourceEventKind, SpeedoContext, SubscribeOptions, SubscriptionHandle,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

const STATUS_READY_TO_TRACK: &str = "Ready to track";
const STATUS_TRACKING: &str = "Tracking...";
const STATUS_READY: &str = "Ready";
const STATUS_RECONNECTING: &str = "Reconnecting...";
const STATUS_UNSUPPORTED: &str = "Position source not supported";

// ============================================================================
// PRESENTATION
// ============================================================================

/// Value bundle handed to the presentation layer.
///
/// Speeds are already converted into `unit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Readout {
    pub instantaneous_speed: f64,
    pub max_speed: f64,
    pub average_speed: f64,
    pub unit: SpeedUnit,
    pub band: SpeedBand,
    pub status_text: String,
    pub error_text: Option<String>,
}

/// Display strings for a [`Readout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedReadout {
    /// Whole number, no unit
    pub speed: String,
    /// One decimal plus unit label
    pub max_speed: String,
    /// One decimal plus unit label
    pub average_speed: String,
}

impl Readout {
    /// Render the numbers the way a dashboard shows them.
    pub fn formatted(&self) -> FormattedReadout {
        // Values are already in display units; format as km/h to skip reconversion
        let label = self.unit.label();
        FormattedReadout {
            speed: units::format(self.instantaneous_speed, SpeedUnit::Kph, 0),
            max_speed: format!("{} {}", units::format(self.max_speed, SpeedUnit::Kph, 1), label),
            average_speed: format!(
                "{} {}",
                units::format(self.average_speed, SpeedUnit::Kph, 1),
                label
            ),
        }
    }
}

/// Consumer of readouts. Rendering, styling and layout are its business.
pub trait PresentationSink: Send {
    fn render(&mut self, readout: &Readout);
}

/// Discards every readout.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PresentationSink for NullSink {
    fn render(&mut self, _readout: &Readout) {}
}

impl<F> PresentationSink for F
where
    F: FnMut(&Readout) + Send,
{
    fn render(&mut self, readout: &Readout) {
        self(readout)
    }
}

/// Forwards readouts over a channel, e.g. to a UI task.
#[derive(Debug, Clone)]
pub struct ChannelSink(pub mpsc::UnboundedSender<Readout>);

impl ChannelSink {
    /// Creates a sink and the receiver its readouts arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Readout>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

impl PresentationSink for ChannelSink {
    fn render(&mut self, readout: &Readout) {
        // A dropped receiver only means nobody is watching
        let _ = self.0.send(readout.clone());
    }
}

// ============================================================================
// SESSION STATE
// ============================================================================

/// A scheduled re-subscription after a retryable sensor error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryTimer {
    /// Context time at which the retry fires
    pub due: Duration,
    /// 1-based attempt number this timer will make
    pub attempt: u32,
}

/// State that only exists while tracking.
#[derive(Debug)]
struct ActiveTracking {
    filter: ScalarKalmanFilter,
    stats: StatsAggregator,
    controller: CadenceController,
    subscription: Option<SubscriptionHandle>,
    relaxed: bool,
    retry: Option<RetryTimer>,
    failed_attempts: u32,
}

impl ActiveTracking {
    fn new(config: &TrackerConfig) -> Self {
        Self {
            filter: config.new_filter(),
            stats: config.new_stats(),
            controller: config.new_controller(),
            subscription: None,
            relaxed: false,
            retry: None,
            failed_attempts: 0,
        }
    }
}

/// One caller-owned tracking session.
pub struct TrackingSession<Ctx, Src>
where
    Ctx: SpeedoContext,
    Src: PositionSource,
{
    context: Arc<Ctx>,
    source: Arc<Src>,
    events: EventSink,
    sink: Box<dyn PresentationSink>,
    config: TrackerConfig,
    validator: SampleValidator,
    unit: SpeedUnit,
    active: Option<ActiveTracking>,
    last_speed_kph: f64,
    status: String,
    error_text: Option<String>,
    unsupported_reported: bool,
    last_readout: Option<Readout>,
}

impl<Ctx, Src> TrackingSession<Ctx, Src>
where
    Ctx: SpeedoContext,
    Src: PositionSource,
{
    /// Creates an idle session.
    ///
    /// `events` is the sink handed to the source on every subscribe; the
    /// matching stream must be drained into [`handle_event`](Self::handle_event).
    pub fn new(
        context: Arc<Ctx>,
        source: Arc<Src>,
        events: EventSink,
        sink: Box<dyn PresentationSink>,
        config: TrackerConfig,
    ) -> Result<Self, ConfigError> {
        let mut config = config;
        config.cadence.normalize();
        config.validate()?;

        Ok(Self {
            context,
            source,
            events,
            sink,
            validator: config.validator(),
            config,
            unit: SpeedUnit::default(),
            active: None,
            last_speed_kph: 0.0,
            status: STATUS_READY_TO_TRACK.to_string(),
            error_text: None,
            unsupported_reported: false,
            last_readout: None,
        })
    }

    /// Creates an idle session together with its event stream.
    pub fn with_channel(
        context: Arc<Ctx>,
        source: Arc<Src>,
        sink: Box<dyn PresentationSink>,
        config: TrackerConfig,
    ) -> Result<(Self, EventStream), ConfigError> {
        let (events, stream) = event_channel();
        let session = Self::new(context, source, events, sink, config)?;
        Ok((session, stream))
    }

    // ========== Caller Commands ==========

    /// Begin tracking.
    ///
    /// A retryable subscribe failure still leaves the session tracking with
    /// a retry scheduled; a fatal one stops it and is returned.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.active.is_some() {
            return Err(SessionError::AlreadyTracking);
        }

        if !self.source.is_supported() {
            if !self.unsupported_reported {
                self.unsupported_reported = true;
                self.status = STATUS_UNSUPPORTED.to_string();
                self.error_text = Some("This device lacks position source support".to_string());
                warn!("Position source not supported; tracking unavailable");
                self.emit();
            }
            return Err(SessionError::NoSensorSupport);
        }

        let active = ActiveTracking::new(&self.config);
        let options = active.controller.current_options();
        self.active = Some(active);
        self.last_speed_kph = 0.0;
        self.status = STATUS_TRACKING.to_string();
        self.error_text = None;
        info!(interval_ms = options.max_sample_age_ms, "Tracking started");

        match self.source.subscribe(options, self.events.clone()) {
            Ok(handle) => {
                if let Some(active) = self.active.as_mut() {
                    active.subscription = Some(handle);
                }
                debug!(%handle, "Initial subscription opened");
                self.emit();
                Ok(())
            }
            Err(error) => {
                let fatal = error.is_fatal();
                self.on_sensor_error(error.clone());
                if fatal {
                    Err(SessionError::Sensor(error))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Stop tracking. Does nothing when already stopped.
    pub fn stop(&mut self) {
        self.stop_with(None);
    }

    /// Clear max and average. Filter and cadence are untouched.
    pub fn reset(&mut self) -> Readout {
        if let Some(active) = self.active.as_mut() {
            active.stats.reset();
            info!("Statistics reset");
        }
        self.emit()
    }

    /// Change the display unit and re-render the last values.
    pub fn set_unit(&mut self, unit: SpeedUnit) -> Readout {
        if unit != self.unit {
            debug!(%unit, "Display unit changed");
        }
        self.unit = unit;
        self.emit()
    }

    /// Validate and apply a new configuration, live if tracking.
    pub fn set_config(&mut self, config: TrackerConfig) -> Result<(), ConfigError> {
        let mut config = config;
        config.cadence.normalize();
        config.validate()?;

        self.validator = config.validator();
        if let Some(active) = self.active.as_mut() {
            active.filter.set_noise(config.process_noise, config.measurement_noise);
            active
                .stats
                .set_limits(config.window_duration_ms, config.max_window_size);
            active.controller.set_table(config.cadence.clone());
        }
        self.config = config;
        info!("Configuration updated");
        Ok(())
    }

    // ========== Source Events ==========

    /// Process one source event to completion.
    ///
    /// Returns the readout it produced, or `None` when the event was
    /// dropped (not tracking, stale subscription, invalid sample).
    pub fn handle_event(&mut self, event: SourceEvent) -> Option<Readout> {
        let Some(active) = self.active.as_ref() else {
            trace!("Event while not tracking; ignored");
            return None;
        };
        if active.subscription != Some(event.subscription) {
            trace!(handle = %event.subscription, "Event from stale subscription; ignored");
            return None;
        }

        match event.kind {
            SourceEventKind::Sample(raw) => self.on_sample(raw),
            SourceEventKind::Error(error) => {
                self.on_sensor_error(error);
                self.last_readout.clone()
            }
        }
    }

    /// Fire the retry timer if it is due.
    pub fn poll_timers(&mut self) -> Option<Readout> {
        let now = self.context.now();
        let active = self.active.as_mut()?;
        let timer = match active.retry {
            Some(timer) if timer.due <= now => timer,
            _ => return None,
        };
        active.retry = None;
        active.failed_attempts = timer.attempt;

        let options = active
            .controller
            .current_options()
            .relaxed(self.config.retry.relax_factor);
        info!(attempt = timer.attempt, "Retrying subscription with relaxed parameters");

        self.status = STATUS_RECONNECTING.to_string();
        self.resubscribe(options, true);
        Some(self.emit())
    }

    /// When the pending retry is due, if any.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.active.as_ref()?.retry.map(|t| t.due)
    }

    // ========== Accessors ==========

    pub fn is_tracking(&self) -> bool {
        self.active.is_some()
    }

    /// Cadence in force, `None` when not tracking.
    pub fn current_interval_ms(&self) -> Option<u64> {
        self.active
            .as_ref()
            .map(|a| a.controller.current_interval_ms())
    }

    pub fn filter(&self) -> Option<&ScalarKalmanFilter> {
        self.active.as_ref().map(|a| &a.filter)
    }

    pub fn stats(&self) -> Option<&StatsAggregator> {
        self.active.as_ref().map(|a| &a.stats)
    }

    pub fn subscription(&self) -> Option<SubscriptionHandle> {
        self.active.as_ref()?.subscription
    }

    pub fn pending_retry(&self) -> Option<RetryTimer> {
        self.active.as_ref()?.retry
    }

    /// Whether the live subscription uses relaxed retry parameters.
    pub fn is_relaxed(&self) -> bool {
        self.active.as_ref().map(|a| a.relaxed).unwrap_or(false)
    }

    pub fn last_readout(&self) -> Option<&Readout> {
        self.last_readout.as_ref()
    }

    pub fn unit(&self) -> SpeedUnit {
        self.unit
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.context
    }

    // ========== Private Helpers ==========

    fn on_sample(&mut self, raw: RawSample) -> Option<Readout> {
        let Some(sample) = self.validator.validate(&raw) else {
            trace!(
                speed_mps = ?raw.speed_mps,
                accuracy_m = raw.accuracy_m,
                "Sample rejected by validator"
            );
            return None;
        };

        let active = self.active.as_mut()?;
        active.failed_attempts = 0;
        active.retry = None;

        let filtered = active.filter.update(sample.speed_kph);
        active.stats.record(filtered, sample.timestamp_ms);
        let request = active.controller.on_filtered_speed(filtered);

        self.last_speed_kph = filtered;
        self.error_text = None;
        self.status = if sample.accuracy_in_bound {
            STATUS_TRACKING.to_string()
        } else {
            format!("Tracking (low accuracy: {:.0} m)", sample.accuracy_m)
        };

        if let Some(request) = request {
            info!(interval_ms = request.interval_ms, "Resubscribing at new cadence");
            self.resubscribe(request.options, false);
        }

        Some(self.emit())
    }

    /// Cancel the live subscription, then open a new one.
    fn resubscribe(&mut self, options: SubscribeOptions, relaxed: bool) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if let Some(old) = active.subscription.take() {
            self.source.unsubscribe(old);
        }

        match self.source.subscribe(options, self.events.clone()) {
            Ok(handle) => {
                active.subscription = Some(handle);
                active.relaxed = relaxed;
                debug!(%handle, ?options, "Subscription replaced");
            }
            Err(error) => self.on_sensor_error(error),
        }
    }

    fn on_sensor_error(&mut self, error: SensorError) {
        let message = format!("GPS Error: {}", error);

        if error.is_fatal() {
            warn!(%error, "Fatal sensor error; stopping");
            self.stop_with(Some(message));
            return;
        }

        let now = self.context.now();
        let policy = self.config.retry;
        let Some(active) = self.active.as_mut() else {
            return;
        };

        if active.retry.is_none() {
            if active.failed_attempts >= policy.max_attempts {
                warn!(
                    %error,
                    attempts = active.failed_attempts,
                    "Retry budget exhausted; stopping"
                );
                self.stop_with(Some(message));
                return;
            }

            let timer = RetryTimer {
                due: now + Duration::from_millis(policy.backoff_ms),
                attempt: active.failed_attempts + 1,
            };
            active.retry = Some(timer);
            warn!(
                %error,
                attempt = timer.attempt,
                backoff_ms = policy.backoff_ms,
                "Sensor error; retry scheduled"
            );
        } else {
            debug!(%error, "Sensor error while retry pending");
        }

        self.status = format!(
            "Retrying in {:.1} s",
            Duration::from_millis(policy.backoff_ms).as_secs_f64()
        );
        self.error_text = Some(message);
        self.emit();
    }

    fn stop_with(&mut self, error_text: Option<String>) {
        let Some(active) = self.active.take() else {
            return;
        };
        if let Some(handle) = active.subscription {
            self.source.unsubscribe(handle);
        }
        // Dropping `active` discards filter, statistics and any retry timer

        self.last_speed_kph = 0.0;
        self.status = STATUS_READY.to_string();
        self.error_text = error_text;
        info!("Tracking stopped");
        self.emit();
    }

    fn build_readout(&self) -> Readout {
        let (max, average) = self
            .active
            .as_ref()
            .map(|a| (a.stats.max_speed(), a.stats.average()))
            .unwrap_or((0.0, 0.0));

        Readout {
            instantaneous_speed: units::to_display(self.last_speed_kph, self.unit),
            max_speed: units::to_display(max, self.unit),
            average_speed: units::to_display(average, self.unit),
            unit: self.unit,
            band: SpeedBand::classify(self.last_speed_kph),
            status_text: self.status.clone(),
            error_text: self.error_text.clone(),
        }
    }

    fn emit(&mut self) -> Readout {
        let readout = self.build_readout();
        self.sink.render(&readout);
        self.last_readout = Some(readout.clone());
        readout
    }
}

// ============================================================================
// TESTS
// ============================================================================
