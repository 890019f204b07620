//! Session Driver - the single-writer processing loop.
//!
//! Caller commands, source events and the retry timer all funnel into one
//! task that owns the [`TrackingSession`]. Each input is processed to
//! completion before the next is taken, so the session never sees two
//! concurrent mutations.
//!
//! # Usage
//!
//! ```ignore
//! use speedo_core::driver::SessionDriver;
//! use speedo_core::session::{ChannelSink, TrackingSession};
//! use speedo_env::TokioContext;
//!
//! let (sink, mut readouts) = ChannelSink::new();
//! let (session, events) = TrackingSession::with_channel(
//!     TokioContext::shared(), source, Box::new(sink), TrackerConfig::default())?;
//! let handle = SessionDriver::spawn(session, events);
//!
//! handle.start().await?;
//! while let Some(readout) = readouts.recv().await {
//!     println!("{}", readout.formatted().speed);
//! }
//! ```

use crate::config::TrackerConfig;
use crate::error::SessionError;
use crate::session::TrackingSession;
use crate::units::SpeedUnit;

use speedo_env::{EventStream, PositionSource, SpeedoContext};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Commands accepted by the driver.
#[derive(Debug)]
pub enum SessionCommand {
    Start(oneshot::Sender<Result<(), SessionError>>),
    Stop,
    Reset,
    SetUnit(SpeedUnit),
    SetConfig(TrackerConfig, oneshot::Sender<Result<(), SessionError>>),
    /// Stop tracking and end the driver loop
    Shutdown,
}

/// Cloneable handle for sending commands to a running driver.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub async fn start(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Start(tx))?;
        rx.await.map_err(|_| SessionError::DriverClosed)?
    }

    pub fn stop(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Stop)
    }

    pub fn reset(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Reset)
    }

    pub fn set_unit(&self, unit: SpeedUnit) -> Result<(), SessionError> {
        self.send(SessionCommand::SetUnit(unit))
    }

    pub async fn set_config(&self, config: TrackerConfig) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::SetConfig(config, tx))?;
        rx.await.map_err(|_| SessionError::DriverClosed)?
    }

    pub fn shutdown(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Shutdown)
    }

    fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::DriverClosed)
    }
}

/// Owns a session and serializes everything that touches it.
pub struct SessionDriver<Ctx, Src>
where
    Ctx: SpeedoContext,
    Src: PositionSource,
{
    session: TrackingSession<Ctx, Src>,
    events: EventStream,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
}

impl<Ctx, Src> SessionDriver<Ctx, Src>
where
    Ctx: SpeedoContext,
    Src: PositionSource,
{
    /// Creates a driver and its handle without starting the loop.
    pub fn new(session: TrackingSession<Ctx, Src>, events: EventStream) -> (Self, SessionHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let driver = Self {
            session,
            events,
            commands,
        };
        (driver, SessionHandle { commands: tx })
    }

    /// Runs the loop on the session's context executor.
    pub fn spawn(session: TrackingSession<Ctx, Src>, events: EventStream) -> SessionHandle {
        let context = Arc::clone(session.context());
        let (driver, handle) = Self::new(session, events);
        context.spawn("speedo-session", driver.run());
        handle
    }

    /// Process inputs until shutdown or until every handle is dropped.
    pub async fn run(self) {
        let Self {
            mut session,
            mut events,
            mut commands,
        } = self;

        loop {
            let deadline = session.next_deadline();
            let context = Arc::clone(session.context());
            let timer = async move {
                match deadline {
                    Some(due) => {
                        let wait = due.saturating_sub(context.now());
                        context.sleep(wait).await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => {
                        session.stop();
                        break;
                    }
                    Some(command) => apply(&mut session, command),
                },
                Some(event) = events.recv() => {
                    session.handle_event(event);
                }
                _ = timer => {
                    session.poll_timers();
                }
            }
        }

        debug!("Session driver exited");
    }
}

fn apply<Ctx, Src>(session: &mut TrackingSession<Ctx, Src>, command: SessionCommand)
where
    Ctx: SpeedoContext,
    Src: PositionSource,
{
    match command {
        SessionCommand::Start(reply) => {
            let _ = reply.send(session.start());
        }
        SessionCommand::Stop => session.stop(),
        SessionCommand::Reset => {
            session.reset();
        }
        SessionCommand::SetUnit(unit) => {
            session.set_unit(unit);
        }
        SessionCommand::SetConfig(config, reply) => {
            let _ = reply.send(session.set_config(config).map_err(SessionError::from));
        }
        SessionCommand::Shutdown => session.stop(),
    }
}
