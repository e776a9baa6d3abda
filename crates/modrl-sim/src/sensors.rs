//! Sensors reading the physics session and gantry state.
//!
//! Every sensor refreshes its cached reading on reset and on steps that are a
//! multiple of its `update_steps`; observations always report the cache.

use modrl_env::{
    vector, BoxSpace, InfoRecord, Observation, ObservationSpace, PointCloudProvider, Sensor,
    SkeletonProvider,
};
use nalgebra::{Point3, UnitQuaternion};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Result, SimError};
use crate::robot::{GantryHandle, SKELETON_POINTS};
use crate::session::SharedSession;

/// Bound on skeleton coordinates, in meters.
const SKELETON_BOUND: f32 = 5.0;

fn check_update_steps(update_steps: u64) -> Result<()> {
    if update_steps == 0 {
        return Err(SimError::InvalidConfig("update_steps must be at least 1".into()));
    }
    Ok(())
}

fn due(step: u64, update_steps: u64) -> bool {
    step % update_steps == 0
}

fn to_f32(p: &Point3<f64>) -> [f32; 3] {
    [p.x as f32, p.y as f32, p.z as f32]
}

/// Settings of a [`JointsSensor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JointsSensorConfig {
    /// Refresh period in steps.
    pub update_steps: u64,
    /// Report axes in `[-1, 1]` instead of meters.
    pub normalize: bool,
    /// Include readings in the environment observation.
    pub add_to_observation_space: bool,
    /// Include readings in step records.
    pub add_to_logging: bool,
}

impl Default for JointsSensorConfig {
    fn default() -> Self {
        Self {
            update_steps: 1,
            normalize: true,
            add_to_observation_space: true,
            add_to_logging: false,
        }
    }
}

/// Axis positions of a gantry.
pub struct JointsSensor {
    config: JointsSensorConfig,
    gantry: GantryHandle,
    key: String,
    reading: [f32; 3],
}

impl JointsSensor {
    /// Observe the axes of `gantry`.
    pub fn new(config: JointsSensorConfig, gantry: GantryHandle) -> Result<Self> {
        check_update_steps(config.update_steps)?;
        let key = format!("joints_{}", gantry.name());
        let mut sensor = Self {
            config,
            gantry,
            key,
            reading: [0.0; 3],
        };
        sensor.refresh();
        Ok(sensor)
    }

    fn refresh(&mut self) {
        self.reading = if self.config.normalize {
            self.gantry.normalized_axes().map(|v| v as f32)
        } else {
            to_f32(&self.gantry.end_effector())
        };
    }
}

impl Sensor for JointsSensor {
    fn name(&self) -> &str {
        &self.key
    }

    fn reset(&mut self) -> modrl_env::Result<()> {
        self.refresh();
        Ok(())
    }

    fn update(&mut self, step: u64) -> modrl_env::Result<()> {
        if due(step, self.config.update_steps) {
            self.refresh();
        }
        Ok(())
    }

    fn observation(&self) -> Observation {
        let mut obs = Observation::new();
        obs.insert(self.key.clone(), vector(&self.reading));
        obs
    }

    fn observation_space(&self) -> ObservationSpace {
        let space = if self.config.normalize {
            BoxSpace::uniform(&[3], -1.0, 1.0)
        } else {
            let ws = self.gantry.workspace();
            BoxSpace::from_arrays(ws.low.map(|v| v as f32), ws.high.map(|v| v as f32))
        };
        ObservationSpace::new().with(self.key.clone(), space)
    }

    fn add_to_observation_space(&self) -> bool {
        self.config.add_to_observation_space
    }

    fn add_to_logging(&self) -> bool {
        self.config.add_to_logging
    }

    fn logging_data(&self) -> InfoRecord {
        let mut record = InfoRecord::new();
        record.insert(
            self.key.clone(),
            self.reading.iter().map(|&v| f64::from(v)).collect::<Vec<f64>>(),
        );
        record
    }
}

/// Settings of a [`PoseSensor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseSensorConfig {
    /// Refresh period in steps.
    pub update_steps: u64,
    /// Include readings in the environment observation.
    pub add_to_observation_space: bool,
    /// Include readings in step records.
    pub add_to_logging: bool,
}

impl Default for PoseSensorConfig {
    fn default() -> Self {
        Self {
            update_steps: 1,
            add_to_observation_space: false,
            add_to_logging: false,
        }
    }
}

/// End effector position and orientation.
pub struct PoseSensor {
    config: PoseSensorConfig,
    gantry: GantryHandle,
    name: String,
    position_key: String,
    rotation_key: String,
    position: Point3<f64>,
    rotation: UnitQuaternion<f64>,
}

impl PoseSensor {
    /// Observe the end effector of `gantry`.
    pub fn new(config: PoseSensorConfig, gantry: GantryHandle) -> Result<Self> {
        check_update_steps(config.update_steps)?;
        let robot = gantry.name().to_string();
        let position = gantry.end_effector();
        Ok(Self {
            config,
            gantry,
            name: format!("pose_{robot}"),
            position_key: format!("position_{robot}"),
            rotation_key: format!("rotation_{robot}"),
            position,
            rotation: UnitQuaternion::identity(),
        })
    }

    fn quaternion_f32(&self) -> [f32; 4] {
        let q = self.rotation.quaternion();
        [q.i as f32, q.j as f32, q.k as f32, q.w as f32]
    }
}

impl Sensor for PoseSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&mut self) -> modrl_env::Result<()> {
        self.position = self.gantry.end_effector();
        Ok(())
    }

    fn update(&mut self, step: u64) -> modrl_env::Result<()> {
        if due(step, self.config.update_steps) {
            self.position = self.gantry.end_effector();
        }
        Ok(())
    }

    fn observation(&self) -> Observation {
        let mut obs = Observation::new();
        obs.insert(self.position_key.clone(), vector(&to_f32(&self.position)));
        obs.insert(self.rotation_key.clone(), vector(&self.quaternion_f32()));
        obs
    }

    fn observation_space(&self) -> ObservationSpace {
        let ws = self.gantry.workspace();
        ObservationSpace::new()
            .with(
                self.position_key.clone(),
                BoxSpace::from_arrays(ws.low.map(|v| v as f32), ws.high.map(|v| v as f32)),
            )
            .with(self.rotation_key.clone(), BoxSpace::uniform(&[4], -1.0, 1.0))
    }

    fn add_to_observation_space(&self) -> bool {
        self.config.add_to_observation_space
    }

    fn add_to_logging(&self) -> bool {
        self.config.add_to_logging
    }

    fn logging_data(&self) -> InfoRecord {
        let mut record = InfoRecord::new();
        record.insert(self.position_key.clone(), self.position.coords.as_slice().to_vec());
        record
    }
}

/// Settings of a [`PointCloudSensor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PointCloudSensorConfig {
    /// Sensor name, unique within a scene.
    pub name: String,
    /// Refresh period in steps.
    pub update_steps: u64,
    /// Approximate distance between surface samples, in meters.
    pub spacing: f64,
    /// Log the number of points per step.
    pub add_to_logging: bool,
}

impl Default for PointCloudSensorConfig {
    fn default() -> Self {
        Self {
            name: "point_cloud".into(),
            update_steps: 1,
            spacing: 0.05,
            add_to_logging: true,
        }
    }
}

/// Labeled surface samples of every scenery collider.
pub struct PointCloudSensor {
    config: PointCloudSensorConfig,
    session: SharedSession,
    points: Vec<Point3<f64>>,
    labels: Vec<i32>,
}

impl PointCloudSensor {
    /// Sample the scenery of `session`.
    pub fn new(config: PointCloudSensorConfig, session: SharedSession) -> Result<Self> {
        check_update_steps(config.update_steps)?;
        if !(config.spacing.is_finite() && config.spacing > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "point cloud spacing must be positive, got {}",
                config.spacing
            )));
        }
        Ok(Self {
            config,
            session,
            points: Vec::new(),
            labels: Vec::new(),
        })
    }

    fn refresh(&mut self) {
        let (points, labels) = self.session.borrow().sample_scenery(self.config.spacing);
        trace!(points = points.len(), "point cloud sampled");
        self.points = points;
        self.labels = labels;
    }
}

impl PointCloudProvider for PointCloudSensor {
    fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    fn labels(&self) -> &[i32] {
        &self.labels
    }
}

impl Sensor for PointCloudSensor {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn reset(&mut self) -> modrl_env::Result<()> {
        self.refresh();
        Ok(())
    }

    fn update(&mut self, step: u64) -> modrl_env::Result<()> {
        if due(step, self.config.update_steps) {
            self.refresh();
        }
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

    fn add_to_logging(&self) -> bool {
        self.config.add_to_logging
    }

    fn logging_data(&self) -> InfoRecord {
        let mut record = InfoRecord::new();
        record.insert(
            format!("{}_points", self.config.name),
            self.points.len() as u64,
        );
        record
    }

    fn as_point_cloud(&self) -> Option<&dyn PointCloudProvider> {
        Some(self)
    }
}

/// Settings of a [`SkeletonSensor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SkeletonSensorConfig {
    /// Refresh period in steps.
    pub update_steps: u64,
    /// Include the skeleton in the environment observation.
    pub add_to_observation_space: bool,
}

impl Default for SkeletonSensorConfig {
    fn default() -> Self {
        Self {
            update_steps: 1,
            add_to_observation_space: false,
        }
    }
}

/// Skeleton points of a gantry.
pub struct SkeletonSensor {
    config: SkeletonSensorConfig,
    gantry: GantryHandle,
    name: String,
    points: Vec<Point3<f64>>,
}

impl SkeletonSensor {
    /// Trace the skeleton of `gantry`.
    pub fn new(config: SkeletonSensorConfig, gantry: GantryHandle) -> Result<Self> {
        check_update_steps(config.update_steps)?;
        let name = format!("skeleton_{}", gantry.name());
        let points = gantry.skeleton();
        Ok(Self {
            config,
            gantry,
            name,
            points,
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
        &self.name
    }

    fn reset(&mut self) -> modrl_env::Result<()> {
        self.points = self.gantry.skeleton();
        Ok(())
    }

    fn update(&mut self, step: u64) -> modrl_env::Result<()> {
        if due(step, self.config.update_steps) {
            self.points = self.gantry.skeleton();
        }
        Ok(())
    }

    fn observation(&self) -> Observation {
        let rows = Array2::from_shape_fn((SKELETON_POINTS, 3), |(i, j)| {
            self.points.get(i).map_or(0.0, |p| p[j] as f32)
        });
        let mut obs = Observation::new();
        obs.insert(self.name.clone(), rows.into_dyn());
        obs
    }

    fn observation_space(&self) -> ObservationSpace {
        ObservationSpace::new().with(
            self.name.clone(),
            BoxSpace::uniform(&[SKELETON_POINTS, 3], -SKELETON_BOUND, SKELETON_BOUND),
        )
    }

    fn add_to_observation_space(&self) -> bool {
        self.config.add_to_observation_space
    }

    fn as_skeleton(&self) -> Option<&dyn SkeletonProvider> {
        Some(self)
    }
}
