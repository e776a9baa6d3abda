//! Interfaces of the pluggable environment components.
//!
//! An environment is assembled from one [`World`], any number of
//! [`Robot`]s, [`Sensor`]s attached to a robot or to the scene, and at most
//! one [`Goal`] per robot. The environment only talks to them through these
//! traits.

use std::time::Duration;

use nalgebra::{Point3, UnitQuaternion};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::record::InfoRecord;
use crate::registry::SensorView;
use crate::space::{Observation, ObservationSpace};

/// How a robot interprets its slice of the action vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Cartesian end-effector displacement.
    #[default]
    InverseKinematics,
    /// Joint position targets.
    JointPositions,
    /// Joint velocity targets.
    JointVelocities,
}

impl ControlMode {
    /// Whether actions are expressed per joint.
    pub fn uses_joint_space(self) -> bool {
        !matches!(self, ControlMode::InverseKinematics)
    }
}

/// Typed role a sensor can fulfil for goals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Produces a segmented point cloud of the scene.
    PointCloud,
    /// Produces the robot's skeleton points.
    Skeleton,
}

/// Scalar a goal exposes for curriculum tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Distance below which a position goal counts as reached.
    DistanceThreshold,
}

impl MetricKind {
    /// Name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            MetricKind::DistanceThreshold => "distance_threshold",
        }
    }
}

/// Current value of a goal's curriculum metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalMetric {
    /// Which metric.
    pub kind: MetricKind,
    /// Its value after the last reset.
    pub value: f64,
}

/// Where a robot's end effector starts an episode.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StartPose {
    /// Start position; `None` leaves the robot where it was built.
    pub position: Option<Point3<f64>>,
    /// Start orientation; only used together with a position.
    pub rotation: Option<UnitQuaternion<f64>>,
}

impl StartPose {
    /// Position-only pose.
    pub fn at(position: Point3<f64>) -> Self {
        Self {
            position: Some(position),
            rotation: None,
        }
    }
}

/// What a goal reports after evaluating one step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RewardInfo {
    /// Reward for this step.
    pub reward: f64,
    /// The task was accomplished.
    pub success: bool,
    /// The episode should end.
    pub done: bool,
    /// The step limit was exceeded.
    pub timeout: bool,
    /// The robot left its allowed region.
    pub out_of_bounds: bool,
}

/// Source of a segmented point cloud.
pub trait PointCloudProvider {
    /// Cloud points in world coordinates.
    fn points(&self) -> &[Point3<f64>];
    /// Segmentation label per point.
    fn labels(&self) -> &[i32];
}

/// Source of robot skeleton points.
pub trait SkeletonProvider {
    /// Skeleton points in world coordinates.
    fn skeleton(&self) -> &[Point3<f64>];
}

/// A producer of fixed-shape observations.
pub trait Sensor {
    /// Sensor name, unique within an environment.
    fn name(&self) -> &str;

    /// Bring the sensor back to its episode start state.
    fn reset(&mut self) -> Result<()>;

    /// Refresh readings for the given step of the episode.
    fn update(&mut self, step: u64) -> Result<()>;

    /// Current readings keyed like [`Sensor::observation_space`].
    fn observation(&self) -> Observation;

    /// Declared observation elements.
    fn observation_space(&self) -> ObservationSpace;

    /// Whether the readings are part of the environment observation.
    fn add_to_observation_space(&self) -> bool;

    /// Whether [`Sensor::logging_data`] goes into step records.
    fn add_to_logging(&self) -> bool {
        false
    }

    /// Values for the step record.
    fn logging_data(&self) -> InfoRecord {
        InfoRecord::new()
    }

    /// Point-cloud view of this sensor, if it has one.
    fn as_point_cloud(&self) -> Option<&dyn PointCloudProvider> {
        None
    }

    /// Skeleton view of this sensor, if it has one.
    fn as_skeleton(&self) -> Option<&dyn SkeletonProvider> {
        None
    }
}

/// A controllable robot.
pub trait Robot {
    /// Robot name, unique within an environment.
    fn name(&self) -> &str;

    /// Spawn the robot into the freshly reset world.
    fn build(&mut self) -> Result<()>;

    /// Move the end effector to a position.
    fn moveto_xyz(&mut self, position: &Point3<f64>, use_physics: bool) -> Result<()>;

    /// Move the end effector to a position and orientation.
    fn moveto_xyzquat(
        &mut self,
        position: &Point3<f64>,
        rotation: &UnitQuaternion<f64>,
        use_physics: bool,
    ) -> Result<()>;

    /// Apply this robot's slice of the action vector; returns the time spent.
    fn process_action(&mut self, action: &[f64]) -> Result<Duration>;

    /// `(joint_dims, ik_dims)` action sizes.
    fn action_space_dims(&self) -> (usize, usize);

    /// Active control mode.
    fn control_mode(&self) -> ControlMode;

    /// Current end effector position.
    fn end_effector_position(&self) -> Point3<f64>;

    /// Action size in the active control mode.
    fn action_dim(&self) -> usize {
        let (joints, ik) = self.action_space_dims();
        if self.control_mode().uses_joint_space() {
            joints
        } else {
            ik
        }
    }
}

/// The scene: physics session, scenery, targets and collision state.
pub trait World {
    /// Reset scene state; `success_rate` lets generation scale difficulty.
    fn reset(&mut self, success_rate: f64) -> Result<()>;

    /// Spawn the scenery for the current episode.
    fn build(&mut self) -> Result<()>;

    /// Tell the world which robots (by name, in registration order) exist.
    fn register_robots(&mut self, names: &[String]);

    /// Start pose per registered robot.
    fn create_ee_starting_points(&mut self) -> Vec<StartPose>;

    /// Choose a position target per robot.
    fn create_position_target(&mut self);

    /// Choose a rotation target per robot.
    fn create_rotation_target(&mut self);

    /// Position target of a robot.
    fn position_target(&self, robot: usize) -> Option<Point3<f64>>;

    /// Rotation target of a robot.
    fn rotation_target(&self, robot: usize) -> Option<UnitQuaternion<f64>>;

    /// Recompute the collision flag.
    fn perform_collision_check(&mut self) -> Result<()>;

    /// Result of the last collision check.
    fn collision(&self) -> bool;

    /// Advance time-dependent scene state (moving obstacles and the like).
    fn update(&mut self) -> Result<()>;

    /// Advance the physics engine by one fixed tick.
    fn step_physics(&mut self) -> Result<()>;
}

/// What a goal may look at while evaluating.
#[derive(Clone, Copy)]
pub struct GoalContext<'a> {
    /// Registration index of the goal's robot.
    pub robot_index: usize,
    /// The goal's robot.
    pub robot: &'a dyn Robot,
    /// The scene.
    pub world: &'a dyn World,
    /// Sensors visible to the goal's robot.
    pub sensors: SensorView<'a>,
}

/// A per-robot task with its reward, termination and curriculum.
pub trait Goal {
    /// Sensor capabilities this goal relies on.
    fn required_capabilities(&self) -> &[Capability] {
        &[]
    }

    /// Start a new episode; returns the goal's curriculum metric.
    fn on_env_reset(
        &mut self,
        ctx: &GoalContext<'_>,
        success_rate: f64,
        episode: u64,
    ) -> Result<GoalMetric>;

    /// Evaluate the step that just happened.
    fn reward(&mut self, ctx: &GoalContext<'_>, step: u64, action: &[f64]) -> Result<RewardInfo>;

    /// Goal observations.
    fn observation(&self) -> Observation;

    /// Declared goal observation elements.
    fn observation_space(&self) -> ObservationSpace;

    /// Values for the step record.
    fn logging_data(&self) -> InfoRecord;

    /// Whether observations go into the environment observation.
    fn add_to_observation_space(&self) -> bool;

    /// Whether [`Goal::logging_data`] goes into step records.
    fn add_to_logging(&self) -> bool;

    /// Keep the robot moving after success.
    fn continue_after_success(&self) -> bool;

    /// The curriculum metric this goal tracks.
    fn metric_kind(&self) -> MetricKind;

    /// Overwrite the curriculum metric from outside.
    fn set_metric(&mut self, kind: MetricKind, value: f64) -> Result<()>;
}
