//! Table-top world with randomly placed box obstacles.

use modrl_env::{StartPose, World};
use nalgebra::{distance, Point3, UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SimError};
use crate::session::SharedSession;
use crate::workspace::Workspace;

/// Segmentation label of the first obstacle; later ones count up from here.
pub const FIRST_OBSTACLE_LABEL: i32 = 3;

const PLACEMENT_TRIES: usize = 64;

/// Settings of a [`TableTopWorld`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableTopConfig {
    /// Seed for scene generation; entropy when absent.
    pub seed: Option<u64>,
    /// Region starts, targets and obstacles are drawn from.
    pub workspace: Workspace,
    /// Center of the table slab.
    pub table_center: [f64; 3],
    /// Half extents of the table slab.
    pub table_half_extents: [f64; 3],
    /// Segmentation label of the table.
    pub table_label: i32,
    /// Obstacles at a success rate of zero.
    pub min_obstacles: usize,
    /// Obstacles at a success rate of one.
    pub max_obstacles: usize,
    /// Smallest obstacle half extent.
    pub obstacle_half_min: f64,
    /// Largest obstacle half extent.
    pub obstacle_half_max: f64,
    /// Minimum distance between a robot's start and its target.
    pub min_target_distance: f64,
    /// Free space kept around starts and targets when placing obstacles.
    pub target_clearance: f64,
}

impl Default for TableTopConfig {
    fn default() -> Self {
        Self {
            seed: None,
            workspace: Workspace::default(),
            table_center: [0.0, 0.0, 0.95],
            table_half_extents: [1.0, 1.0, 0.05],
            table_label: 2,
            min_obstacles: 1,
            max_obstacles: 5,
            obstacle_half_min: 0.03,
            obstacle_half_max: 0.08,
            min_target_distance: 0.25,
            target_clearance: 0.12,
        }
    }
}

impl TableTopConfig {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        self.workspace.validate()?;
        if self.min_obstacles > self.max_obstacles {
            return Err(SimError::InvalidConfig(format!(
                "min_obstacles {} exceeds max_obstacles {}",
                self.min_obstacles, self.max_obstacles
            )));
        }
        if !(self.obstacle_half_min > 0.0 && self.obstacle_half_min <= self.obstacle_half_max) {
            return Err(SimError::InvalidConfig(format!(
                "obstacle half extents {}..{} are not a positive range",
                self.obstacle_half_min, self.obstacle_half_max
            )));
        }
        if self.table_half_extents.iter().any(|h| !(*h > 0.0)) {
            return Err(SimError::InvalidConfig(
                "table half extents must be positive".into(),
            ));
        }
        if self.min_target_distance < 0.0 || self.target_clearance < 0.0 {
            return Err(SimError::InvalidConfig(
                "target distances must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Obstacle count for a success rate; harder scenes as the agent improves.
    pub fn obstacle_count(&self, success_rate: f64) -> usize {
        let span = (self.max_obstacles - self.min_obstacles) as f64;
        self.min_obstacles + (span * success_rate.clamp(0.0, 1.0)).round() as usize
    }
}

/// Table with box obstacles, a start and a target per robot.
pub struct TableTopWorld {
    config: TableTopConfig,
    session: SharedSession,
    sim_step: f64,
    rng: StdRng,
    robots: Vec<String>,
    obstacle_count: usize,
    starts: Vec<Point3<f64>>,
    targets: Vec<Point3<f64>>,
    rotations: Vec<UnitQuaternion<f64>>,
    collision: bool,
}

impl TableTopWorld {
    /// Create a world living in `session`.
    pub fn new(config: TableTopConfig, session: SharedSession, sim_step: f64) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let obstacle_count = config.min_obstacles;
        Ok(Self {
            config,
            session,
            sim_step,
            rng,
            robots: Vec::new(),
            obstacle_count,
            starts: Vec::new(),
            targets: Vec::new(),
            rotations: Vec::new(),
            collision: false,
        })
    }

    /// Obstacles spawned by the next [`World::build`].
    pub fn obstacle_count(&self) -> usize {
        self.obstacle_count
    }

    fn clear_of_poses(&self, center: &Point3<f64>, half: f64) -> bool {
        let keep_out = half * 3f64.sqrt() + self.config.target_clearance;
        self.starts
            .iter()
            .chain(&self.targets)
            .all(|p| distance(p, center) > keep_out)
    }
}

impl World for TableTopWorld {
    fn reset(&mut self, success_rate: f64) -> modrl_env::Result<()> {
        self.session.borrow_mut().clear();
        self.obstacle_count = self.config.obstacle_count(success_rate);
        self.starts.clear();
        self.targets.clear();
        self.rotations.clear();
        self.collision = false;
        Ok(())
    }

    fn build(&mut self) -> modrl_env::Result<()> {
        let mut session = self.session.borrow_mut();
        session.add_static_cuboid(
            &Point3::from(self.config.table_center),
            &Vector3::from(self.config.table_half_extents),
            self.config.table_label,
        );
        drop(session);

        let mut placed = 0;
        for i in 0..self.obstacle_count {
            for _ in 0..PLACEMENT_TRIES {
                let half = self
                    .rng
                    .gen_range(self.config.obstacle_half_min..=self.config.obstacle_half_max);
                let center = self.config.workspace.sample(&mut self.rng);
                if !self.clear_of_poses(&center, half) {
                    continue;
                }
                self.session.borrow_mut().add_static_cuboid(
                    &center,
                    &Vector3::repeat(half),
                    FIRST_OBSTACLE_LABEL + i as i32,
                );
                placed += 1;
                break;
            }
        }
        debug!(placed, requested = self.obstacle_count, "table top built");
        Ok(())
    }

    fn register_robots(&mut self, names: &[String]) {
        self.robots = names.to_vec();
    }

    fn create_ee_starting_points(&mut self) -> Vec<StartPose> {
        self.starts = (0..self.robots.len())
            .map(|_| self.config.workspace.sample(&mut self.rng))
            .collect();
        self.starts.iter().copied().map(StartPose::at).collect()
    }

    fn create_position_target(&mut self) {
        let mut targets = Vec::with_capacity(self.starts.len());
        for start in &self.starts {
            let mut target = self.config.workspace.sample(&mut self.rng);
            for _ in 0..PLACEMENT_TRIES {
                if distance(start, &target) >= self.config.min_target_distance {
                    break;
                }
                target = self.config.workspace.sample(&mut self.rng);
            }
            targets.push(target);
        }
        self.targets = targets;
    }

    fn create_rotation_target(&mut self) {
        self.rotations = vec![UnitQuaternion::identity(); self.robots.len()];
    }

    fn position_target(&self, robot: usize) -> Option<Point3<f64>> {
        self.targets.get(robot).copied()
    }

    fn rotation_target(&self, robot: usize) -> Option<UnitQuaternion<f64>> {
        self.rotations.get(robot).copied()
    }

    fn perform_collision_check(&mut self) -> modrl_env::Result<()> {
        self.collision = self.session.borrow().any_robot_intersects();
        Ok(())
    }

    fn collision(&self) -> bool {
        self.collision
    }

    fn update(&mut self) -> modrl_env::Result<()> {
        Ok(())
    }

    fn step_physics(&mut self) -> modrl_env::Result<()> {
        self.session.borrow_mut().step(self.sim_step);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PhysicsSession;

    fn world(seed: u64) -> (TableTopWorld, SharedSession) {
        let session = PhysicsSession::shared();
        let config = TableTopConfig {
            seed: Some(seed),
            ..TableTopConfig::default()
        };
        let world = TableTopWorld::new(config, session.clone(), 0.01).unwrap();
        (world, session)
    }

    fn generate(world: &mut TableTopWorld, success_rate: f64) {
        world.reset(success_rate).unwrap();
        world.create_ee_starting_points();
        world.create_position_target();
        world.create_rotation_target();
        world.build().unwrap();
    }

    #[test]
    fn test_obstacle_count_follows_success_rate() {
        let config = TableTopConfig::default();
        assert_eq!(config.obstacle_count(0.0), 1);
        assert_eq!(config.obstacle_count(0.5), 3);
        assert_eq!(config.obstacle_count(1.0), 5);
        assert_eq!(config.obstacle_count(7.0), 5);
    }

    #[test]
    fn test_targets_per_registered_robot() {
        let (mut world, _) = world(3);
        world.register_robots(&["a".to_string(), "b".to_string()]);
        generate(&mut world, 0.0);
        let start = world.starts[1];
        let target = world.position_target(1).unwrap();
        assert!(world.position_target(2).is_none());
        assert!(world.config.workspace.contains(&target));
        assert!(distance(&start, &target) >= 0.25);
        assert_eq!(world.rotation_target(0), Some(UnitQuaternion::identity()));
    }

    #[test]
    fn test_build_spawns_table_and_obstacles() {
        let (mut world, session) = world(11);
        world.register_robots(&["a".to_string()]);
        generate(&mut world, 1.0);
        let count = session.borrow().scenery_len();
        assert!(count >= 1 && count <= 6, "got {count} colliders");
        // a reset wipes the scene
        world.reset(0.0).unwrap();
        assert_eq!(session.borrow().scenery_len(), 0);
    }

    #[test]
    fn test_same_seed_same_scene() {
        let (mut first, _) = world(5);
        let (mut second, _) = world(5);
        for w in [&mut first, &mut second] {
            w.register_robots(&["a".to_string()]);
            generate(w, 0.5);
        }
        assert_eq!(first.targets, second.targets);
        assert_eq!(first.starts, second.starts);
    }

    #[test]
    fn test_rejects_inverted_obstacle_range() {
        let config = TableTopConfig {
            min_obstacles: 4,
            max_obstacles: 2,
            ..TableTopConfig::default()
        };
        assert!(TableTopWorld::new(config, PhysicsSession::shared(), 0.01).is_err());
    }
}
