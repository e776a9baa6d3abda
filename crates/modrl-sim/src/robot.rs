//! Cartesian gantry robot.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use modrl_env::{ControlMode, Robot};
use nalgebra::{Point3, UnitQuaternion};
use rapier3d::dynamics::RigidBodyHandle;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::session::SharedSession;
use crate::workspace::Workspace;

/// Number of skeleton points a gantry reports.
pub const SKELETON_POINTS: usize = 16;

/// Settings of a [`GantryRobot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GantryConfig {
    /// Robot name, unique within a scene.
    pub name: String,
    /// How actions are interpreted.
    pub control_mode: ControlMode,
    /// Reachable region of the tool tip.
    pub workspace: Workspace,
    /// Foot of the column on the table.
    pub mount: [f64; 3],
    /// Height of the boom carrying the tool carriage.
    pub boom_height: f64,
    /// Tool displacement per unit action in inverse kinematics mode, in meters.
    pub max_displacement: f64,
    /// Axis speed per unit action in joint velocity mode, in m/s.
    pub max_velocity: f64,
    /// Radius of the tool tip collider.
    pub tool_radius: f64,
}

impl Default for GantryConfig {
    fn default() -> Self {
        Self {
            name: "gantry".into(),
            control_mode: ControlMode::InverseKinematics,
            workspace: Workspace::default(),
            mount: [0.0, -0.8, 1.0],
            boom_height: 1.8,
            max_displacement: 0.05,
            max_velocity: 0.5,
            tool_radius: 0.03,
        }
    }
}

impl GantryConfig {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        self.workspace.validate()?;
        if self.name.is_empty() {
            return Err(SimError::InvalidConfig("gantry name must not be empty".into()));
        }
        for (field, value) in [
            ("max_displacement", self.max_displacement),
            ("max_velocity", self.max_velocity),
            ("tool_radius", self.tool_radius),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "{field} must be positive, got {value}"
                )));
            }
        }
        if self.boom_height < self.workspace.high[2] {
            return Err(SimError::InvalidConfig(format!(
                "boom at {} runs through the workspace top at {}",
                self.boom_height, self.workspace.high[2]
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct GantryState {
    axes: Point3<f64>,
    body: Option<RigidBodyHandle>,
}

/// Read access to a gantry's pose for sensors.
#[derive(Debug, Clone)]
pub struct GantryHandle {
    name: String,
    workspace: Workspace,
    mount: Point3<f64>,
    boom_height: f64,
    state: Rc<RefCell<GantryState>>,
}

impl GantryHandle {
    /// Name of the observed robot.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reachable region of the tool tip.
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Tool tip position, which equals the three axis positions.
    pub fn end_effector(&self) -> Point3<f64> {
        self.state.borrow().axes
    }

    /// Axis positions mapped into `[-1, 1]`.
    pub fn normalized_axes(&self) -> [f64; 3] {
        self.workspace.normalize(&self.end_effector())
    }

    /// Skeleton from the column foot to the tool tip.
    ///
    /// Indices 0-3 run up the column, 4-10 along the boom, 11-12 mark the
    /// carriage and 13-15 run down the tool, ending at the tip.
    pub fn skeleton(&self) -> Vec<Point3<f64>> {
        let tip = self.end_effector();
        let foot = self.mount;
        let column_top = Point3::new(foot.x, foot.y, self.boom_height);
        let carriage = Point3::new(tip.x, tip.y, self.boom_height);

        let lerp = |a: &Point3<f64>, b: &Point3<f64>, t: f64| a + (b - a) * t;

        let mut points = Vec::with_capacity(SKELETON_POINTS);
        points.extend((0..4u32).map(|i| lerp(&foot, &column_top, f64::from(i) / 3.0)));
        points.extend((1..=7u32).map(|i| lerp(&column_top, &carriage, f64::from(i) / 8.0)));
        points.push(carriage);
        points.push(carriage + nalgebra::Vector3::new(0.0, 0.0, 0.05));
        points.extend((1..=3u32).map(|i| lerp(&carriage, &tip, f64::from(i) / 3.0)));
        points
    }
}

/// Gantry with three prismatic axes moving a ball-shaped tool tip.
///
/// The tool orientation is fixed, so rotation targets are ignored.
pub struct GantryRobot {
    config: GantryConfig,
    session: SharedSession,
    sim_step: f64,
    use_physics: bool,
    state: Rc<RefCell<GantryState>>,
}

impl GantryRobot {
    /// Create a gantry living in `session`.
    pub fn new(
        config: GantryConfig,
        session: SharedSession,
        sim_step: f64,
        use_physics: bool,
    ) -> Result<Self> {
        config.validate()?;
        let state = GantryState {
            axes: config.workspace.center(),
            body: None,
        };
        Ok(Self {
            config,
            session,
            sim_step,
            use_physics,
            state: Rc::new(RefCell::new(state)),
        })
    }

    /// Handle for sensors observing this gantry.
    pub fn handle(&self) -> GantryHandle {
        GantryHandle {
            name: self.config.name.clone(),
            workspace: self.config.workspace,
            mount: Point3::from(self.config.mount),
            boom_height: self.config.boom_height,
            state: self.state.clone(),
        }
    }

    fn target_for(&self, action: &[f64]) -> Point3<f64> {
        let current = self.state.borrow().axes;
        let clamped: Vec<f64> = action.iter().map(|a| a.clamp(-1.0, 1.0)).collect();
        let delta = |scale: f64| {
            let mut p = current;
            for (axis, a) in clamped.iter().take(3).enumerate() {
                p[axis] += a * scale;
            }
            p
        };
        match self.config.control_mode {
            ControlMode::InverseKinematics => delta(self.config.max_displacement),
            ControlMode::JointPositions => self.config.workspace.denormalize(&clamped),
            ControlMode::JointVelocities => delta(self.config.max_velocity * self.sim_step),
        }
    }
}

impl Robot for GantryRobot {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn build(&mut self) -> modrl_env::Result<()> {
        let home = self.config.workspace.center();
        let body = self
            .session
            .borrow_mut()
            .add_robot_ball(&home, self.config.tool_radius);
        let mut state = self.state.borrow_mut();
        state.axes = home;
        state.body = Some(body);
        Ok(())
    }

    fn moveto_xyz(&mut self, position: &Point3<f64>, use_physics: bool) -> modrl_env::Result<()> {
        let target = self.config.workspace.clamp(position);
        let body = self
            .state
            .borrow()
            .body
            .ok_or_else(|| SimError::MissingBody(self.config.name.clone()))?;
        self.session
            .borrow_mut()
            .move_body(body, &target, use_physics)?;
        self.state.borrow_mut().axes = target;
        Ok(())
    }

    fn moveto_xyzquat(
        &mut self,
        position: &Point3<f64>,
        _rotation: &UnitQuaternion<f64>,
        use_physics: bool,
    ) -> modrl_env::Result<()> {
        self.moveto_xyz(position, use_physics)
    }

    fn process_action(&mut self, action: &[f64]) -> modrl_env::Result<Duration> {
        let start = Instant::now();
        let target = self.target_for(action);
        self.moveto_xyz(&target, self.use_physics)?;
        Ok(start.elapsed())
    }

    fn action_space_dims(&self) -> (usize, usize) {
        (3, 3)
    }

    fn control_mode(&self) -> ControlMode {
        self.config.control_mode
    }

    fn end_effector_position(&self) -> Point3<f64> {
        self.state.borrow().axes
    }
}
