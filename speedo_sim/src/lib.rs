//! Speedo Deterministic Simulation Testing (DST) Harness
//!
//! This crate provides a controlled environment where a real tracking
//! session runs against a simulated vehicle, deterministically.
//!
//! # Core Principle: Everything Is Seeded
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: virtual clock advanced by the runner, never the wall clock
//! - **Sensor**: scripted position source fed by the oracle
//! - **Randomness**: all noise derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                        │
//! │                                                            │
//! │  ┌───────────────┐  samples  ┌───────────────────┐         │
//! │  │ VehicleOracle │──────────►│ SimPositionSource │         │
//! │  │ (ground truth)│  errors   └─────────┬─────────┘         │
//! │  └───────────────┘                     │ SourceEvent       │
//! │          ▲                             ▼                   │
//! │          │ step(dt)          ┌───────────────────┐         │
//! │  ┌───────┴───────┐  now()    │  TrackingSession  │──► Readout
//! │  │  SimContext   │◄──────────│   (speedo_core)   │         │
//! │  │ virtual clock │           └───────────────────┘         │
//! │  └───────────────┘                                         │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use speedo_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42)
//!     .with_duration(60.0)
//!     .run(ScenarioId::HighwayRun)?;
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod oracle;
mod runner;
mod source;
pub mod scenarios;

pub use context::SimContext;
pub use error::SimError;
pub use oracle::{SensorProfile, SpeedPhase, VehicleOracle};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner, SimConfig};
pub use source::{SimPositionSource, SubscriptionRecord};
