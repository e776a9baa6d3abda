//! Scripted components for environment tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use modrl_env::{
    vector, BoxSpace, ControlMode, InfoRecord, Observation, ObservationSpace,
    PointCloudProvider, Result, Robot, Sensor, SkeletonProvider, StartPose, World,
};
use nalgebra::{Point3, UnitQuaternion};

/// State shared between a test and its mocks.
#[derive(Debug, Default)]
pub struct Scene {
    /// Collision results of successive checks; `default_collision` once empty.
    pub collision_script: VecDeque<bool>,
    pub default_collision: bool,
    pub targets: Vec<Point3<f64>>,
    pub starts: Vec<StartPose>,
    pub registered: Vec<String>,
    pub world_resets: usize,
    pub world_updates: usize,
    pub physics_steps: usize,
    pub success_rates: Vec<f64>,
    /// Actions received per robot name.
    pub actions: Vec<(String, Vec<f64>)>,
    pub moves: Vec<(String, Point3<f64>)>,
    pub sensor_updates: Vec<(String, u64)>,
    pub sensor_resets: usize,
}

pub type SharedScene = Rc<RefCell<Scene>>;

pub fn scene() -> SharedScene {
    Rc::new(RefCell::new(Scene::default()))
}

pub struct MockWorld {
    scene: SharedScene,
    collision: bool,
}

impl MockWorld {
    pub fn boxed(scene: &SharedScene) -> Box<dyn World> {
        Box::new(Self {
            scene: scene.clone(),
            collision: false,
        })
    }
}

impl World for MockWorld {
    fn reset(&mut self, success_rate: f64) -> Result<()> {
        let mut scene = self.scene.borrow_mut();
        scene.world_resets += 1;
        scene.success_rates.push(success_rate);
        Ok(())
    }

    fn build(&mut self) -> Result<()> {
        Ok(())
    }

    fn register_robots(&mut self, names: &[String]) {
        self.scene.borrow_mut().registered = names.to_vec();
    }

    fn create_ee_starting_points(&mut self) -> Vec<StartPose> {
        self.scene.borrow().starts.clone()
    }

    fn create_position_target(&mut self) {}

    fn create_rotation_target(&mut self) {}

    fn position_target(&self, robot: usize) -> Option<Point3<f64>> {
        self.scene.borrow().targets.get(robot).copied()
    }

    fn rotation_target(&self, _robot: usize) -> Option<UnitQuaternion<f64>> {
        None
    }

    fn perform_collision_check(&mut self) -> Result<()> {
        let mut scene = self.scene.borrow_mut();
        let default = scene.default_collision;
        self.collision = scene.collision_script.pop_front().unwrap_or(default);
        Ok(())
    }

    fn collision(&self) -> bool {
        self.collision
    }

    fn update(&mut self) -> Result<()> {
        self.scene.borrow_mut().world_updates += 1;
        Ok(())
    }

    fn step_physics(&mut self) -> Result<()> {
        self.scene.borrow_mut().physics_steps += 1;
        Ok(())
    }
}

pub struct MockRobot {
    name: String,
    scene: SharedScene,
    mode: ControlMode,
    dims: (usize, usize),
    speed: f64,
    ee: Point3<f64>,
}

impl MockRobot {
    /// A robot with 7 joints and 3 IK dims that stays where it is put.
    pub fn new(name: &str, scene: &SharedScene, mode: ControlMode) -> Self {
        Self {
            name: name.to_string(),
            scene: scene.clone(),
            mode,
            dims: (7, 3),
            speed: 0.0,
            ee: Point3::new(0.0, 0.0, 1.0),
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn boxed(self) -> Box<dyn Robot> {
        Box::new(self)
    }
}

impl Robot for MockRobot {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(&mut self) -> Result<()> {
        Ok(())
    }

    fn moveto_xyz(&mut self, position: &Point3<f64>, _use_physics: bool) -> Result<()> {
        self.ee = *position;
        self.scene
            .borrow_mut()
            .moves
            .push((self.name.clone(), *position));
        Ok(())
    }

    fn moveto_xyzquat(
        &mut self,
        position: &Point3<f64>,
        _rotation: &UnitQuaternion<f64>,
        use_physics: bool,
    ) -> Result<()> {
        self.moveto_xyz(position, use_physics)
    }

    fn process_action(&mut self, action: &[f64]) -> Result<Duration> {
        for (axis, a) in action.iter().take(3).enumerate() {
            self.ee[axis] += a * self.speed;
        }
        self.scene
            .borrow_mut()
            .actions
            .push((self.name.clone(), action.to_vec()));
        Ok(Duration::from_micros(5))
    }

    fn action_space_dims(&self) -> (usize, usize) {
        self.dims
    }

    fn control_mode(&self) -> ControlMode {
        self.mode
    }

    fn end_effector_position(&self) -> Point3<f64> {
        self.ee
    }
}

/// Sensor emitting a constant vector under a fixed key.
pub struct ConstSensor {
    name: String,
    key: String,
    len: usize,
    scene: SharedScene,
    in_obs: bool,
    logged: bool,
}

impl ConstSensor {
    pub fn boxed(name: &str, key: &str, len: usize, scene: &SharedScene) -> Box<dyn Sensor> {
        Box::new(Self {
            name: name.to_string(),
            key: key.to_string(),
            len,
            scene: scene.clone(),
            in_obs: true,
            logged: true,
        })
    }
}

impl Sensor for ConstSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&mut self) -> Result<()> {
        self.scene.borrow_mut().sensor_resets += 1;
        Ok(())
    }

    fn update(&mut self, step: u64) -> Result<()> {
        self.scene
            .borrow_mut()
            .sensor_updates
            .push((self.name.clone(), step));
        Ok(())
    }

    fn observation(&self) -> Observation {
        let mut obs = Observation::new();
        obs.insert(self.key.clone(), vector(&vec![0.5; self.len]));
        obs
    }

    fn observation_space(&self) -> ObservationSpace {
        ObservationSpace::new().with(self.key.clone(), BoxSpace::uniform(&[self.len], -1.0, 1.0))
    }

    fn add_to_observation_space(&self) -> bool {
        self.in_obs
    }

    fn add_to_logging(&self) -> bool {
        self.logged
    }

    fn logging_data(&self) -> InfoRecord {
        let mut record = InfoRecord::new();
        record.insert(format!("{}_reading", self.name), 0.5);
        record
    }
}

/// Fixed segmented point cloud.
pub struct CloudSensor {
    points: Vec<Point3<f64>>,
    labels: Vec<i32>,
}

impl CloudSensor {
    pub fn boxed(points: Vec<Point3<f64>>, labels: Vec<i32>) -> Box<dyn Sensor> {
        Box::new(Self { points, labels })
    }
}

impl PointCloudProvider for CloudSensor {
    fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    fn labels(&self) -> &[i32] {
        &self.labels
    }
}

impl Sensor for CloudSensor {
    fn name(&self) -> &str {
        "cloud"
    }

    fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    fn update(&mut self, _step: u64) -> Result<()> {
        Ok(())
    }

    fn observation(&self) -> Observation {
        Observation::new()
    }

    fn observation_space(&self) -> ObservationSpace {
        ObservationSpace::new()
    }

    fn add_to_observation_space(&self) -> bool {
        false
    }

    fn as_point_cloud(&self) -> Option<&dyn PointCloudProvider> {
        Some(self)
    }
}

/// Sixteen skeleton points collapsed onto one location.
pub struct SkeletonSensor {
    points: Vec<Point3<f64>>,
}

impl SkeletonSensor {
    pub fn boxed(at: Point3<f64>) -> Box<dyn Sensor> {
        Box::new(Self {
            points: vec![at; 16],
        })
    }
}

impl SkeletonProvider for SkeletonSensor {
    fn skeleton(&self) -> &[Point3<f64>] {
        &self.points
    }
}

impl Sensor for SkeletonSensor {
    fn name(&self) -> &str {
        "skeleton"
    }

    fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    fn update(&mut self, _step: u64) -> Result<()> {
        Ok(())
    }

    fn observation(&self) -> Observation {
        Observation::new()
    }

    fn observation_space(&self) -> ObservationSpace {
        ObservationSpace::new()
    }

    fn add_to_observation_space(&self) -> bool {
        false
    }

    fn as_skeleton(&self) -> Option<&dyn SkeletonProvider> {
        Some(self)
    }
}
