//! Declarative scene descriptions and the factory that assembles them.

use modrl_env::goal::{PositionCollisionConfig, PositionCollisionGoal};
use modrl_env::{EnvConfig, Environment, EnvironmentBuilder, Goal, Sensor, World};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SimError};
use crate::robot::{GantryConfig, GantryHandle, GantryRobot};
use crate::sensors::{
    JointsSensor, JointsSensorConfig, PointCloudSensor, PointCloudSensorConfig, PoseSensor,
    PoseSensorConfig, SkeletonSensor, SkeletonSensorConfig,
};
use crate::session::{PhysicsSession, SharedSession};
use crate::world::{TableTopConfig, TableTopWorld};

/// Which world to simulate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorldSpec {
    /// Table with box obstacles.
    TableTop(TableTopConfig),
}

impl Default for WorldSpec {
    fn default() -> Self {
        WorldSpec::TableTop(TableTopConfig::default())
    }
}

/// Which robot to place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RobotSpec {
    /// Cartesian gantry.
    Gantry(GantryConfig),
}

impl RobotSpec {
    /// Robot name.
    pub fn name(&self) -> &str {
        match self {
            RobotSpec::Gantry(config) => &config.name,
        }
    }
}

/// Optional sensors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SensorSpec {
    /// Labeled point cloud of the scenery.
    PointCloud(PointCloudSensorConfig),
    /// Robot skeleton; only valid on a robot.
    Skeleton(SkeletonSensorConfig),
}

/// Which goal a robot pursues.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GoalSpec {
    /// Reach a target position without touching obstacles.
    PositionCollision(PositionCollisionConfig),
}

/// A robot with its sensors and goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotEntry {
    /// The robot.
    pub robot: RobotSpec,
    /// Settings of the joints sensor every robot carries.
    #[serde(default)]
    pub joints: JointsSensorConfig,
    /// Settings of the pose sensor every robot carries.
    #[serde(default)]
    pub pose: PoseSensorConfig,
    /// Additional sensors owned by the robot.
    #[serde(default)]
    pub sensors: Vec<SensorSpec>,
    /// Goal of the robot, if any.
    #[serde(default)]
    pub goal: Option<GoalSpec>,
}

impl RobotEntry {
    /// A gantry with a skeleton sensor and a position-collision goal.
    pub fn gantry(config: GantryConfig) -> Self {
        Self {
            robot: RobotSpec::Gantry(config),
            joints: JointsSensorConfig::default(),
            pose: PoseSensorConfig::default(),
            sensors: vec![SensorSpec::Skeleton(SkeletonSensorConfig::default())],
            goal: Some(GoalSpec::PositionCollision(PositionCollisionConfig::default())),
        }
    }
}

/// Complete description of an environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Environment settings.
    #[serde(default)]
    pub env: EnvConfig,
    /// The world.
    #[serde(default)]
    pub world: WorldSpec,
    /// Robots in registration order.
    pub robots: Vec<RobotEntry>,
    /// Sensors belonging to no robot.
    #[serde(default)]
    pub sensors: Vec<SensorSpec>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self::gantries(1)
    }
}

impl SceneConfig {
    /// Table-top scene with `count` gantries mounted side by side.
    ///
    /// A single gantry keeps the default name; several are named
    /// `gantry_0`, `gantry_1` and so on.
    pub fn gantries(count: usize) -> Self {
        let robots = (0..count)
            .map(|i| {
                let mut config = GantryConfig::default();
                if count > 1 {
                    config.name = format!("gantry_{i}");
                    let spread = (i as f64 / (count - 1) as f64) - 0.5;
                    config.mount[0] = spread;
                }
                RobotEntry::gantry(config)
            })
            .collect();
        Self {
            env: EnvConfig::default(),
            world: WorldSpec::default(),
            robots,
            sensors: vec![SensorSpec::PointCloud(PointCloudSensorConfig::default())],
        }
    }

    /// Fix the seed of world generation.
    pub fn with_seed(mut self, seed: u64) -> Self {
        match &mut self.world {
            WorldSpec::TableTop(config) => config.seed = Some(seed),
        }
        self
    }
}

fn make_sensor(
    spec: SensorSpec,
    session: &SharedSession,
    owner: Option<&GantryHandle>,
) -> Result<Box<dyn Sensor>> {
    let sensor: Box<dyn Sensor> = match spec {
        SensorSpec::PointCloud(config) => Box::new(PointCloudSensor::new(config, session.clone())?),
        SensorSpec::Skeleton(config) => {
            let gantry = owner.ok_or(SimError::SensorNeedsRobot("skeleton"))?;
            Box::new(SkeletonSensor::new(config, gantry.clone())?)
        }
    };
    Ok(sensor)
}

fn make_goal(spec: GoalSpec, robot: &str, env: &EnvConfig) -> Result<Box<dyn Goal>> {
    let goal: Box<dyn Goal> = match spec {
        GoalSpec::PositionCollision(config) => {
            Box::new(PositionCollisionGoal::new(robot, config, env)?)
        }
    };
    Ok(goal)
}

/// Assemble an [`Environment`] from a scene description.
///
/// Each robot gets its joints and pose sensors first, then the configured
/// sensors, then its goal. All components share one physics session.
pub fn build_environment(scene: SceneConfig) -> Result<Environment> {
    scene.env.validate()?;
    let env = scene.env;
    let session = PhysicsSession::shared();

    let world: Box<dyn World> = match scene.world {
        WorldSpec::TableTop(config) => {
            Box::new(TableTopWorld::new(config, session.clone(), env.sim_step)?)
        }
    };

    let robots = scene.robots.len();
    let mut builder = EnvironmentBuilder::new(env.clone(), world);
    for entry in scene.robots {
        let robot = match entry.robot {
            RobotSpec::Gantry(config) => {
                GantryRobot::new(config, session.clone(), env.sim_step, env.use_physics_sim)?
            }
        };
        let handle = robot.handle();

        let mut joints = entry.joints;
        joints.normalize |= env.normalize_observations;
        let mut sensors: Vec<Box<dyn Sensor>> = vec![
            Box::new(JointsSensor::new(joints, handle.clone())?),
            Box::new(PoseSensor::new(entry.pose, handle.clone())?),
        ];
        for spec in entry.sensors {
            sensors.push(make_sensor(spec, &session, Some(&handle))?);
        }
        let goal = entry
            .goal
            .map(|spec| make_goal(spec, handle.name(), &env))
            .transpose()?;

        builder = builder.robot(Box::new(robot), sensors, goal);
    }
    for spec in scene.sensors {
        builder = builder.sensor(make_sensor(spec, &session, None)?);
    }

    let environment = builder.build()?;
    info!(
        robots,
        action_dim = environment.action_dim(),
        observation_keys = environment.observation_space().len(),
        "scene assembled"
    );
    Ok(environment)
}
