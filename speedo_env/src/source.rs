//! Position source abstraction.

use crate::error::SensorError;
use crate::types::{EventSink, SubscribeOptions, SubscriptionHandle};

/// Abstraction over whatever produces speed samples (GNSS receiver,
/// browser geolocation bridge, replay file, simulator).
///
/// The core only subscribes and unsubscribes; acquisition, permissions
/// and hardware access are the source's business.
///
/// # Event Flow
///
/// ```text
/// Session                      Source
///   |-- subscribe(opts, sink) --->|
///   |<-- Ok(handle) --------------|
///   |                             |-- sink.send(SourceEvent { handle, Sample })
///   |                             |-- sink.send(SourceEvent { handle, Error })
///   |-- unsubscribe(handle) ----->|
/// ```
pub trait PositionSource: Send + Sync + 'static {
    /// Whether the host offers this source at all.
    fn is_supported(&self) -> bool;

    /// Opens a subscription delivering events into `sink`.
    ///
    /// # Returns
    /// * `Ok(handle)` - Every event for this subscription carries `handle`
    /// * `Err(SensorError)` - The subscription could not be opened
    fn subscribe(
        &self,
        options: SubscribeOptions,
        sink: EventSink,
    ) -> Result<SubscriptionHandle, SensorError>;

    /// Cancels a subscription. Unknown handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}
