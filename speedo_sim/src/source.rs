//! Scripted position source for simulation runs.

use speedo_env::{
    EventSink, PositionSource, RawSample, SensorError, SourceEvent, SubscribeOptions,
    SubscriptionHandle,
};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// One `subscribe` call as the source saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub handle: SubscriptionHandle,
    pub options: SubscribeOptions,
}

#[derive(Default)]
struct SourceState {
    next_seq: u64,
    active: Option<(SubscriptionHandle, EventSink)>,
    subscribed: Vec<SubscriptionRecord>,
    unsubscribed: Vec<SubscriptionHandle>,
    permission_revoked: bool,
}

/// Position source whose readings are pushed by the scenario runner.
///
/// Every call is recorded so runs can assert on subscription churn.
/// Handles are sequential, keeping a seeded run fully reproducible.
pub struct SimPositionSource {
    supported: bool,
    state: Mutex<SourceState>,
}

impl SimPositionSource {
    /// Creates a supported source with no subscriptions.
    pub fn new() -> Self {
        Self {
            supported: true,
            state: Mutex::new(SourceState::default()),
        }
    }

    /// Creates a source that reports no hardware support.
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    /// Deny permission from now on: later subscribes fail.
    pub fn revoke_permission(&self) {
        self.state().permission_revoked = true;
    }

    /// Deliver a sample to the live subscription.
    ///
    /// Returns false when nothing is subscribed.
    pub fn deliver_sample(&self, sample: RawSample) -> bool {
        let state = self.state();
        match state.active.as_ref() {
            Some((handle, sink)) => sink.send(SourceEvent::sample(*handle, sample)).is_ok(),
            None => {
                trace!("No subscriber for sample");
                false
            }
        }
    }

    /// Deliver an error to the live subscription.
    pub fn deliver_error(&self, error: SensorError) -> bool {
        let state = self.state();
        match state.active.as_ref() {
            Some((handle, sink)) => sink.send(SourceEvent::error(*handle, error)).is_ok(),
            None => false,
        }
    }

    /// All subscribe calls so far, oldest first.
    pub fn subscriptions(&self) -> Vec<SubscriptionRecord> {
        self.state().subscribed.clone()
    }

    pub fn subscribe_count(&self) -> usize {
        self.state().subscribed.len()
    }

    pub fn unsubscribed(&self) -> Vec<SubscriptionHandle> {
        self.state().unsubscribed.clone()
    }

    /// Handle of the live subscription, if any.
    pub fn active(&self) -> Option<SubscriptionHandle> {
        self.state().active.as_ref().map(|(h, _)| *h)
    }

    // ========== Private Helper Methods ==========

    fn state(&self) -> MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimPositionSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionSource for SimPositionSource {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn subscribe(
        &self,
        options: SubscribeOptions,
        sink: EventSink,
    ) -> Result<SubscriptionHandle, SensorError> {
        if !self.supported {
            return Err(SensorError::NoSensorSupport);
        }
        let mut state = self.state();
        if state.permission_revoked {
            return Err(SensorError::PermissionDenied);
        }

        state.next_seq += 1;
        let handle = SubscriptionHandle::from_seq(state.next_seq);
        state.subscribed.push(SubscriptionRecord { handle, options });
        state.active = Some((handle, sink));
        trace!(%handle, ?options, "Sim source subscribed");
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut state = self.state();
        if matches!(state.active.as_ref(), Some((h, _)) if *h == handle) {
            state.active = None;
        }
        state.unsubscribed.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speedo_env::{event_channel, SourceEventKind};

    fn options() -> SubscribeOptions {
        SubscribeOptions::for_interval(1000, 10, 5000)
    }

    #[test]
    fn test_subscribe_records_options() {
        let source = SimPositionSource::new();
        let (sink, _stream) = event_channel();

        let handle = source.subscribe(options(), sink).unwrap();
        assert_eq!(source.active(), Some(handle));
        assert_eq!(source.subscriptions()[0].options.timeout_ms, 10_000);
        assert_eq!(source.subscribe_count(), 1);
    }

    #[test]
    fn test_delivery_tags_active_handle() {
        let source = SimPositionSource::new();
        let (sink, mut stream) = event_channel();
        let handle = source.subscribe(options(), sink).unwrap();

        assert!(source.deliver_sample(RawSample::new(10.0, 5.0, 0)));
        let event = stream.try_recv().unwrap();
        assert_eq!(event.subscription, handle);
        assert!(matches!(event.kind, SourceEventKind::Sample(_)));

        assert!(source.deliver_error(SensorError::RequestTimeout));
        let event = stream.try_recv().unwrap();
        assert_eq!(event.kind, SourceEventKind::Error(SensorError::RequestTimeout));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let source = SimPositionSource::new();
        let (sink, _stream) = event_channel();
        let handle = source.subscribe(options(), sink).unwrap();

        source.unsubscribe(handle);
        assert!(source.active().is_none());
        assert!(!source.deliver_sample(RawSample::new(1.0, 5.0, 0)));
        assert_eq!(source.unsubscribed(), vec![handle]);
    }

    #[test]
    fn test_revoked_permission_fails_subscribe() {
        let source = SimPositionSource::new();
        source.revoke_permission();
        let (sink, _stream) = event_channel();
        assert_eq!(
            source.subscribe(options(), sink),
            Err(SensorError::PermissionDenied)
        );
    }

    #[test]
    fn test_unsupported_source() {
        let source = SimPositionSource::unsupported();
        assert!(!source.is_supported());
        let (sink, _stream) = event_channel();
        assert_eq!(source.subscribe(options(), sink), Err(SensorError::NoSensorSupport));
    }
}
