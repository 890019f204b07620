//! Speedo Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seam between the speed estimation
//! core and the outside world:
//! - Time (`now()`, `sleep()`, `spawn()`)
//! - The position source (`subscribe()`, `unsubscribe()`)
//! - Sample, event and error types shared by both sides
//!
//! Production code runs on [`TokioContext`]; the simulation harness swaps
//! in a virtual clock and a scripted source without touching the core.
//!
//! # Example
//!
//! ```ignore
//! use speedo_env::{event_channel, PositionSource, SubscribeOptions};
//!
//! let (sink, mut events) = event_channel();
//! let handle = source.subscribe(SubscribeOptions::for_interval(1000, 10, 5000), sink)?;
//! while let Some(event) = events.recv().await {
//!     session.handle_event(event);
//! }
//! source.unsubscribe(handle);
//! ```

mod context;
mod error;
mod source;
mod tokio_impl;
mod types;

pub use context::SpeedoContext;
pub use error::SensorError;
pub use source::PositionSource;
pub use tokio_impl::TokioContext;
pub use types::{
    event_channel, EventSink, EventStream, RawSample, SourceEvent, SourceEventKind,
    SubscribeOptions, SubscriptionHandle,
};
