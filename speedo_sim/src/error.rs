//! Error types for the simulation harness.

use speedo_core::{ConfigError, SessionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Invalid sensor noise: {0}")]
    Noise(#[from] rand_distr::NormalError),

    #[error("Invalid speed profile: {0}")]
    Profile(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),
}
