#![warn(missing_docs)]

//! Rapier-backed reference simulation for modrl environments.
//!
//! A [`SceneConfig`] names a world, robots, sensors and goals; calling
//! [`build_environment`] turns it into a ready [`modrl_env::Environment`]
//! whose components share one [`PhysicsSession`].
//!
//! # Example
//!
//! ```no_run
//! use modrl_sim::{build_environment, SceneConfig};
//!
//! let mut env = build_environment(SceneConfig::default().with_seed(1)).unwrap();
//! env.reset().unwrap();
//! let step = env.step(&vec![0.0; env.action_dim()]).unwrap();
//! println!("reward {}", step.reward);
//! ```

mod error;
mod robot;
mod scene;
mod sensors;
mod session;
mod workspace;
mod world;

pub use error::{Result, SimError};
pub use robot::{GantryConfig, GantryHandle, GantryRobot, SKELETON_POINTS};
pub use scene::{
    build_environment, GoalSpec, RobotEntry, RobotSpec, SceneConfig, SensorSpec, WorldSpec,
};
pub use sensors::{
    JointsSensor, JointsSensorConfig, PointCloudSensor, PointCloudSensorConfig, PoseSensor,
    PoseSensorConfig, SkeletonSensor, SkeletonSensorConfig,
};
pub use session::{sample_ball, sample_cuboid, PhysicsSession, SharedSession};
pub use workspace::Workspace;
pub use world::{TableTopConfig, TableTopWorld, FIRST_OBSTACLE_LABEL};
