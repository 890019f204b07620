//! In-crate fakes for the environment seams.

use async_trait::async_trait;
use speedo_env::{
    EventSink, PositionSource, RawSample, SensorError, SourceEvent, SpeedoContext,
    SubscribeOptions, SubscriptionHandle,
};
use std::sync::Mutex;
use std::time::Duration;

/// Clock that only moves when told to.
pub(crate) struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            now: Mutex::new(Duration::ZERO),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

#[async_trait]
impl SpeedoContext for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }

    fn spawn<F>(&self, _name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(future);
    }
}

/// One call made on a [`ManualSource`], in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SourceCall {
    Subscribe(SubscriptionHandle),
    Unsubscribe(SubscriptionHandle),
}

#[derive(Default)]
struct ManualState {
    next_seq: u64,
    active: Option<(SubscriptionHandle, EventSink, SubscribeOptions)>,
    subscribes: usize,
    unsubscribed: Vec<SubscriptionHandle>,
    calls: Vec<SourceCall>,
    fail_next: Option<SensorError>,
}

/// Position source driven by the test body.
pub(crate) struct ManualSource {
    supported: bool,
    state: Mutex<ManualState>,
}

impl ManualSource {
    pub(crate) fn new() -> Self {
        Self {
            supported: true,
            state: Mutex::new(ManualState::default()),
        }
    }

    pub(crate) fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    pub(crate) fn fail_next_subscribe(&self, error: SensorError) {
        self.state.lock().unwrap().fail_next = Some(error);
    }

    pub(crate) fn subscribe_count(&self) -> usize {
        self.state.lock().unwrap().subscribes
    }

    pub(crate) fn unsubscribed(&self) -> Vec<SubscriptionHandle> {
        self.state.lock().unwrap().unsubscribed.clone()
    }

    pub(crate) fn calls(&self) -> Vec<SourceCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn active_options(&self) -> Option<SubscribeOptions> {
        self.state.lock().unwrap().active.as_ref().map(|(_, _, o)| *o)
    }

    /// Push a sample through the live subscription's sink.
    pub(crate) fn push_sample(&self, sample: RawSample) -> bool {
        let state = self.state.lock().unwrap();
        match state.active.as_ref() {
            Some((handle, sink, _)) => sink.send(SourceEvent::sample(*handle, sample)).is_ok(),
            None => false,
        }
    }

    /// Push an error through the live subscription's sink.
    pub(crate) fn push_error(&self, error: SensorError) -> bool {
        let state = self.state.lock().unwrap();
        match state.active.as_ref() {
            Some((handle, sink, _)) => sink.send(SourceEvent::error(*handle, error)).is_ok(),
            None => false,
        }
    }
}

impl PositionSource for ManualSource {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn subscribe(
        &self,
        options: SubscribeOptions,
        sink: EventSink,
    ) -> Result<SubscriptionHandle, SensorError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }
        state.next_seq += 1;
        state.subscribes += 1;
        let handle = SubscriptionHandle::from_seq(state.next_seq);
        state.active = Some((handle, sink, options));
        state.calls.push(SourceCall::Subscribe(handle));
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut state = self.state.lock().unwrap();
        if matches!(state.active.as_ref(), Some((h, _, _)) if *h == handle) {
            state.active = None;
        }
        state.unsubscribed.push(handle);
        state.calls.push(SourceCall::Unsubscribe(handle));
    }
}
