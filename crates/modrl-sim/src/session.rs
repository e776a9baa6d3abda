//! Rapier physics session shared by a scene's world, robots and sensors.

use std::cell::RefCell;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::rc::Rc;

use nalgebra::{Isometry3, Point3, Vector3};
use parry3d::query::intersection_test;
use rapier3d::dynamics::{
    CCDSolver, ImpulseJointSet, IntegrationParameters, IslandManager, MultibodyJointSet,
    RigidBodyBuilder, RigidBodyHandle, RigidBodySet,
};
use rapier3d::geometry::{
    BroadPhaseMultiSap, Collider, ColliderBuilder, ColliderHandle, ColliderSet, NarrowPhase,
};
use rapier3d::pipeline::{PhysicsPipeline, QueryPipeline};
use tracing::trace;

use crate::error::{Result, SimError};

/// A session handle shared between the components of one scene.
pub type SharedSession = Rc<RefCell<PhysicsSession>>;

/// Upper bound of samples along one edge of a cuboid face.
const MAX_FACE_SAMPLES: usize = 12;
/// Upper bound of samples on a ball surface.
const MAX_BALL_SAMPLES: usize = 200;

/// Physics state of one scene.
///
/// Scenery is made of static colliders carrying a segmentation label.
/// Robots are kinematic bodies whose colliders are tested against the
/// scenery.
pub struct PhysicsSession {
    pipeline: PhysicsPipeline,
    gravity: Vector3<f32>,
    integration_params: IntegrationParameters,
    islands: IslandManager,
    broad_phase: BroadPhaseMultiSap,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,

    labels: HashMap<ColliderHandle, i32>,
    robot_bodies: Vec<RigidBodyHandle>,
}

impl Default for PhysicsSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsSession {
    /// Create an empty session with gravity along −z.
    pub fn new() -> Self {
        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: Vector3::new(0.0, 0.0, -9.81),
            integration_params: IntegrationParameters::default(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseMultiSap::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            labels: HashMap::new(),
            robot_bodies: Vec::new(),
        }
    }

    /// Create a session wrapped for sharing.
    pub fn shared() -> SharedSession {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Remove every body and collider.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Step the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        self.integration_params.dt = dt as f32;

        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
    }

    /// Add a static box centered at `center` with a segmentation label.
    pub fn add_static_cuboid(
        &mut self,
        center: &Point3<f64>,
        half_extents: &Vector3<f64>,
        label: i32,
    ) -> ColliderHandle {
        let h = half_extents.cast::<f32>();
        let collider = ColliderBuilder::cuboid(h.x, h.y, h.z)
            .translation(center.coords.cast::<f32>())
            .build();
        let handle = self.colliders.insert(collider);
        self.labels.insert(handle, label);
        handle
    }

    /// Add a static ball with a segmentation label.
    pub fn add_static_ball(&mut self, center: &Point3<f64>, radius: f64, label: i32) -> ColliderHandle {
        let collider = ColliderBuilder::ball(radius as f32)
            .translation(center.coords.cast::<f32>())
            .build();
        let handle = self.colliders.insert(collider);
        self.labels.insert(handle, label);
        handle
    }

    /// Add a kinematic robot body carrying a ball collider.
    pub fn add_robot_ball(&mut self, position: &Point3<f64>, radius: f64) -> RigidBodyHandle {
        let body = RigidBodyBuilder::kinematic_position_based()
            .translation(position.coords.cast::<f32>())
            .build();
        let handle = self.bodies.insert(body);
        let collider = ColliderBuilder::ball(radius as f32).build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        self.robot_bodies.push(handle);
        handle
    }

    /// Move a kinematic body.
    ///
    /// With `use_physics` the move is applied by the next [`PhysicsSession::step`],
    /// otherwise the body is teleported.
    pub fn move_body(
        &mut self,
        handle: RigidBodyHandle,
        position: &Point3<f64>,
        use_physics: bool,
    ) -> Result<()> {
        let body = self
            .bodies
            .get_mut(handle)
            .ok_or_else(|| SimError::MissingBody(format!("{handle:?}")))?;
        let translation = position.coords.cast::<f32>();
        if use_physics {
            body.set_next_kinematic_translation(translation);
        } else {
            body.set_translation(translation, true);
        }
        Ok(())
    }

    /// World position of a body.
    pub fn body_position(&self, handle: RigidBodyHandle) -> Option<Point3<f64>> {
        let body = self.bodies.get(handle)?;
        Some(Point3::from(body.translation().cast::<f64>()))
    }

    /// Number of labeled scenery colliders.
    pub fn scenery_len(&self) -> usize {
        self.labels.len()
    }

    fn world_pose(&self, collider: &Collider) -> Isometry3<f32> {
        match (collider.parent(), collider.position_wrt_parent()) {
            (Some(parent), Some(local)) => self
                .bodies
                .get(parent)
                .map_or(*collider.position(), |body| body.position() * local),
            _ => *collider.position(),
        }
    }

    /// Whether any robot collider touches any labeled collider.
    pub fn any_robot_intersects(&self) -> bool {
        let robot_colliders = self
            .robot_bodies
            .iter()
            .filter_map(|&h| self.bodies.get(h))
            .flat_map(|body| body.colliders().iter().copied());

        for robot_handle in robot_colliders {
            let Some(robot) = self.colliders.get(robot_handle) else {
                continue;
            };
            let robot_pose = self.world_pose(robot);
            for &scenery_handle in self.labels.keys() {
                let Some(scenery) = self.colliders.get(scenery_handle) else {
                    continue;
                };
                let hit = intersection_test(
                    &robot_pose,
                    robot.shape(),
                    &self.world_pose(scenery),
                    scenery.shape(),
                )
                .unwrap_or(false);
                if hit {
                    trace!(?robot_handle, ?scenery_handle, "robot touches scenery");
                    return true;
                }
            }
        }
        false
    }

    /// Sample the surfaces of all labeled colliders.
    ///
    /// Points are roughly `spacing` apart. Labels are returned per point.
    /// Colliders are visited in handle order so sampling is deterministic.
    pub fn sample_scenery(&self, spacing: f64) -> (Vec<Point3<f64>>, Vec<i32>) {
        let mut handles: Vec<(ColliderHandle, i32)> =
            self.labels.iter().map(|(&h, &l)| (h, l)).collect();
        handles.sort_by_key(|(h, _)| h.into_raw_parts());

        let mut points = Vec::new();
        let mut labels = Vec::new();
        for (handle, label) in handles {
            let Some(collider) = self.colliders.get(handle) else {
                continue;
            };
            let pose = self.world_pose(collider);
            let shape = collider.shape();
            let local = if let Some(cuboid) = shape.as_cuboid() {
                sample_cuboid(&cuboid.half_extents.cast::<f64>(), spacing)
            } else if let Some(ball) = shape.as_ball() {
                sample_ball(f64::from(ball.radius), spacing)
            } else {
                Vec::new()
            };
            for p in local {
                let world = pose * p.cast::<f32>();
                points.push(world.cast::<f64>());
                labels.push(label);
            }
        }
        (points, labels)
    }
}

fn samples_along(length: f64, spacing: f64) -> usize {
    ((length / spacing).ceil() as usize + 1).clamp(2, MAX_FACE_SAMPLES)
}

fn lerp(from: f64, to: f64, i: usize, n: usize) -> f64 {
    from + (to - from) * i as f64 / (n - 1) as f64
}

/// Grid samples on the six faces of a box centered at the origin.
pub fn sample_cuboid(half: &Vector3<f64>, spacing: f64) -> Vec<Point3<f64>> {
    let mut points = Vec::new();
    for axis in 0..3 {
        let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
        let nu = samples_along(2.0 * half[u], spacing);
        let nv = samples_along(2.0 * half[v], spacing);
        for sign in [-1.0, 1.0] {
            for i in 0..nu {
                for j in 0..nv {
                    let mut p = Point3::origin();
                    p[axis] = sign * half[axis];
                    p[u] = lerp(-half[u], half[u], i, nu);
                    p[v] = lerp(-half[v], half[v], j, nv);
                    points.push(p);
                }
            }
        }
    }
    points
}

/// Fibonacci-lattice samples on a sphere centered at the origin.
pub fn sample_ball(radius: f64, spacing: f64) -> Vec<Point3<f64>> {
    let area = 4.0 * PI * radius * radius;
    let n = ((area / (spacing * spacing)).ceil() as usize).clamp(8, MAX_BALL_SAMPLES);
    let golden = PI * (3.0 - 5.0_f64.sqrt());
    (0..n)
        .map(|i| {
            let z = 1.0 - 2.0 * (i as f64 + 0.5) / n as f64;
            let r = (1.0 - z * z).sqrt();
            let theta = golden * i as f64;
            Point3::new(r * theta.cos(), r * theta.sin(), z) * radius
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cuboid_samples_lie_on_surface() {
        let half = Vector3::new(0.1, 0.2, 0.05);
        let points = sample_cuboid(&half, 0.05);
        assert!(!points.is_empty());
        for p in &points {
            let on_face = (0..3).any(|a| (p[a].abs() - half[a]).abs() < 1e-12);
            let inside = (0..3).all(|a| p[a].abs() <= half[a] + 1e-12);
            assert!(on_face && inside);
        }
    }

    #[test]
    fn test_ball_samples_lie_on_surface() {
        for p in sample_ball(0.3, 0.1) {
            assert_relative_eq!(p.coords.norm(), 0.3, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_robot_ball_intersects_scenery() {
        let mut session = PhysicsSession::new();
        session.add_static_cuboid(&Point3::new(0.0, 0.0, 0.95), &Vector3::new(1.0, 1.0, 0.05), 2);
        let robot = session.add_robot_ball(&Point3::new(0.0, 0.0, 1.5), 0.03);
        assert!(!session.any_robot_intersects());

        session
            .move_body(robot, &Point3::new(0.0, 0.0, 1.02), false)
            .unwrap();
        assert!(session.any_robot_intersects());
    }

    #[test]
    fn test_kinematic_move_applies_on_step() {
        let mut session = PhysicsSession::new();
        let robot = session.add_robot_ball(&Point3::new(0.0, 0.0, 1.5), 0.03);
        session
            .move_body(robot, &Point3::new(0.1, 0.0, 1.5), true)
            .unwrap();
        session.step(1.0 / 240.0);
        let position = session.body_position(robot).unwrap();
        assert_relative_eq!(position.x, 0.1, epsilon = 1e-5);
    }

    #[test]
    fn test_sampled_cloud_is_labeled() {
        let mut session = PhysicsSession::new();
        session.add_static_cuboid(&Point3::new(0.0, 0.0, 0.95), &Vector3::new(0.5, 0.5, 0.05), 2);
        session.add_static_ball(&Point3::new(0.2, 0.0, 1.3), 0.05, 3);
        let (points, labels) = session.sample_scenery(0.1);
        assert_eq!(points.len(), labels.len());
        assert!(labels.contains(&2) && labels.contains(&3));
        let ball_point = points[labels.iter().position(|&l| l == 3).unwrap()];
        assert_relative_eq!(
            nalgebra::distance(&ball_point, &Point3::new(0.2, 0.0, 1.3)),
            0.05,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut session = PhysicsSession::new();
        session.add_static_ball(&Point3::origin(), 0.1, 4);
        let robot = session.add_robot_ball(&Point3::origin(), 0.1);
        assert!(session.any_robot_intersects());
        session.clear();
        assert_eq!(session.scenery_len(), 0);
        assert!(session.body_position(robot).is_none());
        assert!(!session.any_robot_intersects());
    }
}
