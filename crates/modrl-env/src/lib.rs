#![warn(missing_docs)]

//! Multi-robot reinforcement learning environment orchestration.
//!
//! An [`Environment`] composes a [`World`], robots, sensors and per-robot
//! goals into one dictionary observation space and one flat action vector.
//! Every step it applies the action slices, refreshes sensors, checks for
//! collisions, evaluates the goals and keeps rolling statistics that drive
//! the goals' curricula.
//!
//! The physics behind [`World`], [`Robot`] and [`Sensor`] is pluggable; the
//! `modrl-sim` crate provides a Rapier-backed implementation.

mod components;
mod config;
mod env;
mod error;
pub mod goal;
mod record;
mod registry;
mod space;
mod stats;

pub use components::{
    Capability, ControlMode, Goal, GoalContext, GoalMetric, MetricKind, PointCloudProvider,
    RewardInfo, Robot, Sensor, SkeletonProvider, StartPose, World,
};
pub use config::{EnvConfig, LogLevel};
pub use env::{aggregate, Aggregate, Environment, EnvironmentBuilder, StepResult, MAX_SETUP_RETRIES};
pub use error::{EnvError, Result};
pub use record::{CsvSink, InfoRecord, LogValue};
pub use registry::{SensorSet, SensorView};
pub use space::{vector, ActionLayout, BoxSpace, Observation, ObservationSpace, ACTION_BOUND};
pub use stats::{EpisodeOutcome, EpisodeStats, RollingStat, NEUTRAL_SEED};
