//! Error types for environment orchestration.

use modrl_geometry::GeometryError;
use thiserror::Error;

use crate::components::{Capability, MetricKind};

/// Errors that can occur while building or running an environment.
#[derive(Error, Debug)]
pub enum EnvError {
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Two components declared the same observation key.
    #[error("observation key declared twice: {0}")]
    DuplicateObservationKey(String),

    /// Two robots share a name.
    #[error("robot name registered twice: {0}")]
    DuplicateRobot(String),

    /// Observation bounds disagree in shape.
    #[error("bounds shape mismatch: low {low:?}, high {high:?}")]
    BoundsShape {
        /// Shape of the lower bound.
        low: Vec<usize>,
        /// Shape of the upper bound.
        high: Vec<usize>,
    },

    /// A goal needs a sensor capability its robot does not provide.
    #[error("robot {robot} has no sensor providing {capability:?}")]
    MissingCapability {
        /// Robot name.
        robot: String,
        /// Missing capability.
        capability: Capability,
    },

    /// The world has no position target for a robot.
    #[error("no position target for robot {robot}")]
    MissingTarget {
        /// Robot name.
        robot: String,
    },

    /// The action vector does not match the action layout.
    #[error("action has {actual} values, layout expects {expected}")]
    ActionLength {
        /// Length required by the layout.
        expected: usize,
        /// Length received.
        actual: usize,
    },

    /// World generation kept producing colliding setups.
    #[error("could not find a collision-free starting setup after {attempts} tries, check the world generation")]
    NoCollisionFreeSetup {
        /// Attempts made.
        attempts: usize,
    },

    /// The configured number of episodes has been run.
    #[error("episode budget of {episodes} exhausted")]
    EpisodeBudgetExhausted {
        /// Configured episode budget.
        episodes: u64,
    },

    /// A goal was asked to change a metric it does not track.
    #[error("goal tracks {expected:?}, cannot set {metric:?}")]
    UnknownMetric {
        /// Requested metric.
        metric: MetricKind,
        /// Metric the goal tracks.
        expected: MetricKind,
    },

    /// A collaborator (world, robot, sensor) failed.
    #[error("component failure: {0}")]
    Component(String),

    /// Obstacle geometry failed.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Log persistence failed.
    #[error("log I/O: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization failed.
    #[error("log CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for environment operations.
pub type Result<T> = std::result::Result<T, EnvError>;
