//! Reach a position target while keeping away from obstacles.
//!
//! The goal watches the closest obstacle points between a segmented point
//! cloud and its robot's skeleton. Its shaped reward trades progress towards
//! the target against obstacle proximity and action magnitude, and its
//! success distance tightens as the rolling success rate improves.

use nalgebra::Point3;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use modrl_geometry::{closest_obstacle_points, ObstaclePoints, SkeletonSubsets, OBSTACLE_POINT_COUNT};

use crate::components::{Capability, Goal, GoalContext, GoalMetric, MetricKind, RewardInfo};
use crate::config::EnvConfig;
use crate::error::{EnvError, Result};
use crate::record::InfoRecord;
use crate::space::{vector, BoxSpace, Observation, ObservationSpace};

/// Reward for reaching the target.
pub const SUCCESS_REWARD: f64 = 500.0;
/// Reward for colliding.
pub const COLLISION_REWARD: f64 = -500.0;
/// Reward for running out of steps.
pub const TIMEOUT_REWARD: f64 = -100.0;
/// Success rate separating tightening from loosening the threshold.
pub const CURRICULUM_SUCCESS_RATE: f64 = 0.7;

/// Loosening is this many times slower than tightening.
const LOOSEN_DIVISOR: f64 = 25.0;

const POSITION_LOW: [f32; 3] = [-1.0, -1.0, 1.0];
const POSITION_HIGH: [f32; 3] = [1.0, 1.0, 2.0];

const REQUIRED: [Capability; 2] = [Capability::PointCloud, Capability::Skeleton];

/// Coefficients of the shaped reward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardWeights {
    /// Weight of the target distance term.
    pub distance: f64,
    /// Weight of the obstacle proximity term.
    pub obstacle: f64,
    /// Weight of the action magnitude term.
    pub action: f64,
    /// Exponent of the obstacle proximity term.
    pub exponent: i32,
    /// Obstacle distance at which the proximity term is half saturated.
    pub reference_distance: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            distance: 1.0,
            obstacle: 15.0,
            action: 0.06,
            exponent: 8,
            reference_distance: 0.33,
        }
    }
}

/// Dense reward of a non-terminal step.
pub fn shaped_reward(
    weights: &RewardWeights,
    distance: f64,
    min_obstacle_distance: f64,
    action: &[f64],
) -> f64 {
    let d_ref = weights.reference_distance;
    let target_term = -distance;
    let obstacle_term = -(d_ref / (min_obstacle_distance + d_ref)).powi(weights.exponent);
    let action_term = -action.iter().map(|a| a * a).sum::<f64>();
    weights.distance * target_term + weights.obstacle * obstacle_term + weights.action * action_term
}

/// Settings of a [`PositionCollisionGoal`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionCollisionConfig {
    /// Loosest success distance, used first when training.
    pub threshold_start: f64,
    /// Tightest success distance, used when evaluating.
    pub threshold_end: f64,
    /// Threshold change per episode near `threshold_start`.
    pub increment_start: f64,
    /// Threshold change per episode near `threshold_end`.
    pub increment_end: f64,
    /// Initial threshold overriding the train/eval choice.
    pub threshold_overwrite: Option<f64>,
    /// Keep the robot moving after success.
    pub continue_after_success: bool,
    /// Expose goal observations to the policy.
    pub add_to_observation_space: bool,
    /// Add goal fields to step records.
    pub add_to_logging: bool,
    /// Table label and skeleton index subsets for obstacle distances.
    pub subsets: SkeletonSubsets,
    /// Coefficients of the shaped reward.
    pub weights: RewardWeights,
}

impl Default for PositionCollisionConfig {
    fn default() -> Self {
        Self {
            threshold_start: 0.2,
            threshold_end: 0.01,
            increment_start: 0.01,
            increment_end: 0.001,
            threshold_overwrite: None,
            continue_after_success: false,
            add_to_observation_space: true,
            add_to_logging: true,
            subsets: SkeletonSubsets::default(),
            weights: RewardWeights::default(),
        }
    }
}

impl PositionCollisionConfig {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        let finite = [
            self.threshold_start,
            self.threshold_end,
            self.increment_start,
            self.increment_end,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err(EnvError::InvalidConfig(
                "distance thresholds and increments must be finite".into(),
            ));
        }
        if self.threshold_end < 0.0 || self.threshold_start < self.threshold_end {
            return Err(EnvError::InvalidConfig(format!(
                "need 0 <= threshold_end <= threshold_start, got {} and {}",
                self.threshold_end, self.threshold_start
            )));
        }
        if self.increment_start < 0.0 || self.increment_end < 0.0 {
            return Err(EnvError::InvalidConfig(
                "threshold increments must not be negative".into(),
            ));
        }
        if let Some(v) = self.threshold_overwrite {
            if !(v.is_finite() && v > 0.0) {
                return Err(EnvError::InvalidConfig(format!(
                    "threshold_overwrite must be positive, got {v}"
                )));
            }
        }
        Ok(())
    }

    fn clamp(&self, threshold: f64) -> f64 {
        threshold.min(self.threshold_start).max(self.threshold_end)
    }
}

/// Threshold after one curriculum update.
///
/// The increment shrinks linearly from `increment_start` at the loosest
/// threshold to `increment_end` at the tightest.
pub fn curriculum_step(config: &PositionCollisionConfig, threshold: f64, success_rate: f64) -> f64 {
    let span = config.threshold_start - config.threshold_end;
    let ratio = if span > 0.0 {
        (threshold - config.threshold_end) / span
    } else {
        0.0
    };
    let increment =
        (config.increment_start - config.increment_end) * ratio + config.increment_end;

    let mut next = threshold;
    if success_rate > CURRICULUM_SUCCESS_RATE && threshold > config.threshold_end {
        next -= increment;
    } else if success_rate < CURRICULUM_SUCCESS_RATE && threshold < config.threshold_start {
        next += increment / LOOSEN_DIVISOR;
    }
    config.clamp(next)
}

/// Position goal with collision avoidance for one robot.
#[derive(Debug, Clone)]
pub struct PositionCollisionGoal {
    robot: String,
    config: PositionCollisionConfig,
    train: bool,
    max_steps: u64,
    threshold: f64,

    position: Point3<f64>,
    target: Point3<f64>,
    distance: f64,
    obstacles: Option<ObstaclePoints>,

    collided: bool,
    timeout: bool,
    success: bool,
    done: bool,
    ep_reward: f64,
    last_reward: f64,
}

impl PositionCollisionGoal {
    /// Create the goal for robot `robot`.
    pub fn new(
        robot: impl Into<String>,
        config: PositionCollisionConfig,
        env: &EnvConfig,
    ) -> Result<Self> {
        config.validate()?;
        let initial = if env.train {
            config.threshold_start
        } else {
            config.threshold_end
        };
        let threshold = config.threshold_overwrite.unwrap_or(initial);

        Ok(Self {
            robot: robot.into(),
            config,
            train: env.train,
            max_steps: env.max_steps_per_episode,
            threshold,
            position: Point3::origin(),
            target: Point3::origin(),
            distance: 0.0,
            obstacles: None,
            collided: false,
            timeout: false,
            success: false,
            done: false,
            ep_reward: 0.0,
            last_reward: 0.0,
        })
    }

    /// Current success distance.
    pub fn distance_threshold(&self) -> f64 {
        self.threshold
    }

    /// Distance between end effector and target at the last refresh.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Obstacle selection of the last refresh.
    pub fn obstacles(&self) -> Option<&ObstaclePoints> {
        self.obstacles.as_ref()
    }

    fn key(&self, base: &str) -> String {
        format!("{base}_{}", self.robot)
    }

    fn min_obstacle_distance(&self) -> f64 {
        self.obstacles
            .as_ref()
            .map_or(f64::INFINITY, |o| o.min_distance)
    }

    fn refresh(&mut self, ctx: &GoalContext<'_>) -> Result<()> {
        self.position = ctx.robot.end_effector_position();
        self.target = ctx
            .world
            .position_target(ctx.robot_index)
            .ok_or_else(|| EnvError::MissingTarget {
                robot: self.robot.clone(),
            })?;
        self.distance = (self.target - self.position).norm();

        let missing = |capability| EnvError::MissingCapability {
            robot: self.robot.clone(),
            capability,
        };
        let cloud = ctx
            .sensors
            .point_cloud()
            .ok_or_else(|| missing(Capability::PointCloud))?;
        let skeleton = ctx
            .sensors
            .skeleton()
            .ok_or_else(|| missing(Capability::Skeleton))?;

        self.obstacles = Some(closest_obstacle_points(
            cloud.points(),
            cloud.labels(),
            skeleton.skeleton(),
            &self.config.subsets,
        )?);
        Ok(())
    }
}

fn point_f32(p: &Point3<f64>) -> [f32; 3] {
    [p.x as f32, p.y as f32, p.z as f32]
}

impl Goal for PositionCollisionGoal {
    fn required_capabilities(&self) -> &[Capability] {
        &REQUIRED
    }

    fn on_env_reset(
        &mut self,
        ctx: &GoalContext<'_>,
        success_rate: f64,
        episode: u64,
    ) -> Result<GoalMetric> {
        self.collided = false;
        self.timeout = false;
        self.success = false;
        self.done = false;
        self.ep_reward = 0.0;
        self.last_reward = 0.0;
        self.refresh(ctx)?;

        if self.train {
            let next = curriculum_step(&self.config, self.threshold, success_rate);
            if next != self.threshold {
                debug!(
                    robot = %self.robot,
                    episode,
                    success_rate,
                    from = self.threshold,
                    to = next,
                    "distance threshold updated"
                );
            }
            self.threshold = next;
        }

        Ok(GoalMetric {
            kind: MetricKind::DistanceThreshold,
            value: self.threshold,
        })
    }

    fn reward(&mut self, ctx: &GoalContext<'_>, step: u64, action: &[f64]) -> Result<RewardInfo> {
        if !self.collided {
            self.collided = ctx.world.collision();
        }
        self.refresh(ctx)?;

        self.success = false;
        let reward = if self.collided {
            self.done = true;
            COLLISION_REWARD
        } else if self.distance < self.threshold {
            self.done = true;
            self.success = true;
            SUCCESS_REWARD
        } else if step > self.max_steps {
            self.done = true;
            self.timeout = true;
            TIMEOUT_REWARD
        } else {
            shaped_reward(
                &self.config.weights,
                self.distance,
                self.min_obstacle_distance(),
                action,
            )
        };

        self.ep_reward += reward;
        self.last_reward = reward;
        Ok(RewardInfo {
            reward,
            success: self.success,
            done: self.done,
            timeout: self.timeout,
            out_of_bounds: false,
        })
    }

    fn observation(&self) -> Observation {
        let rows = self
            .obstacles
            .as_ref()
            .map(|o| o.points)
            .unwrap_or([Point3::origin(); OBSTACLE_POINT_COUNT]);
        let obstacle_rows =
            Array2::from_shape_fn((OBSTACLE_POINT_COUNT, 3), |(r, c)| rows[r][c] as f32);

        let mut obs = Observation::new();
        obs.insert(
            self.key("end_effector_position"),
            vector(&point_f32(&self.position)),
        );
        obs.insert(self.key("target_position"), vector(&point_f32(&self.target)));
        obs.insert(
            self.key("closest_obstacle_points"),
            obstacle_rows.into_dyn(),
        );
        obs
    }

    fn observation_space(&self) -> ObservationSpace {
        let position = BoxSpace::from_arrays(POSITION_LOW, POSITION_HIGH);
        let rows = BoxSpace::rows_from_arrays(POSITION_LOW, POSITION_HIGH, OBSTACLE_POINT_COUNT);
        ObservationSpace::new()
            .with(self.key("end_effector_position"), position.clone())
            .with(self.key("target_position"), position)
            .with(self.key("closest_obstacle_points"), rows)
    }

    fn logging_data(&self) -> InfoRecord {
        let mut record = InfoRecord::new();
        record.insert(self.key("reward"), self.last_reward);
        record.insert(
            self.key("min_distance_to_obstacles"),
            self.min_obstacle_distance(),
        );
        record.insert(self.key("distance"), self.distance);
        record.insert(self.key("distance_threshold"), self.threshold);
        record.insert(self.key("ep_reward"), self.ep_reward);
        record
    }

    fn add_to_observation_space(&self) -> bool {
        self.config.add_to_observation_space
    }

    fn add_to_logging(&self) -> bool {
        self.config.add_to_logging
    }

    fn continue_after_success(&self) -> bool {
        self.config.continue_after_success
    }

    fn metric_kind(&self) -> MetricKind {
        MetricKind::DistanceThreshold
    }

    fn set_metric(&mut self, kind: MetricKind, value: f64) -> Result<()> {
        if kind != self.metric_kind() {
            return Err(EnvError::UnknownMetric {
                metric: kind,
                expected: self.metric_kind(),
            });
        }
        if !value.is_finite() {
            return Err(EnvError::InvalidConfig(format!(
                "{} must be finite, got {value}",
                kind.name()
            )));
        }
        self.threshold = self.config.clamp(value);
        Ok(())
    }
}
