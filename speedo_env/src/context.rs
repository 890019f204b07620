//! Core environment context trait for Speedo sessions.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// The central interface for environment interaction.
///
/// This trait abstracts the "real world" so that the speed estimation
/// core can run both in production (tokio) and under a virtual clock.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` - manually advanced virtual clock
///
/// # Determinism
///
/// Retry timers are measured against `now()` only, so a simulated clock
/// fully controls when they fire.
#[async_trait]
pub trait SpeedoContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Used for retry deadlines. In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
