//! Error types for the reference simulation.

use modrl_env::EnvError;
use thiserror::Error;

/// Errors that can occur while building or running a simulated scene.
#[derive(Error, Debug)]
pub enum SimError {
    /// A scene setting is out of range.
    #[error("invalid scene configuration: {0}")]
    InvalidConfig(String),

    /// A rigid body handle no longer exists in the physics session.
    #[error("rigid body {0} is not in the physics session")]
    MissingBody(String),

    /// A sensor that observes a robot was configured without one.
    #[error("{0} sensor must be attached to a robot")]
    SensorNeedsRobot(&'static str),

    /// Environment assembly failed.
    #[error(transparent)]
    Env(#[from] EnvError),
}

impl From<SimError> for EnvError {
    fn from(err: SimError) -> Self {
        match err {
            SimError::Env(inner) => inner,
            other => EnvError::Component(other.to_string()),
        }
    }
}

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;
