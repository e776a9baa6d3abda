//! The environment orchestrator.
//!
//! An [`Environment`] owns one world, the registered robots with their goals,
//! and every sensor. `reset` regenerates the scene until it starts collision
//! free; `step` applies one action vector, advances the scene and evaluates
//! every goal.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::components::{Goal, GoalContext, GoalMetric, MetricKind, RewardInfo, Robot, Sensor, World};
use crate::config::{EnvConfig, LogLevel};
use crate::error::{EnvError, Result};
use crate::record::{CsvSink, InfoRecord};
use crate::registry::SensorSet;
use crate::space::{ActionLayout, Observation, ObservationSpace};
use crate::stats::{EpisodeOutcome, EpisodeStats};

/// Colliding setups tolerated per reset before giving up.
pub const MAX_SETUP_RETRIES: usize = 1000;

/// Result of one environment step.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Merged observation after the step.
    pub observation: Observation,
    /// Aggregated goal reward.
    pub reward: f64,
    /// The episode ended.
    pub done: bool,
    /// Aggregated terminal flags.
    pub outcome: EpisodeOutcome,
    /// Step record; empty when logging is off.
    pub info: InfoRecord,
}

#[derive(Debug, Clone)]
struct EpisodeState {
    steps: u64,
    sim_time: f64,
    cpu_epoch: Instant,
    cpu_time: f64,
    cumulative_reward: f64,
    active: Vec<bool>,
}

impl EpisodeState {
    fn new(robots: usize) -> Self {
        Self {
            steps: 0,
            sim_time: 0.0,
            cpu_epoch: Instant::now(),
            cpu_time: 0.0,
            cumulative_reward: 0.0,
            active: vec![true; robots],
        }
    }
}

struct RobotSlot {
    robot: Box<dyn Robot>,
    goal: Option<Box<dyn Goal>>,
}

/// Reward and flags of one step combined over all goals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    /// Mean or sum of goal rewards.
    pub reward: f64,
    /// Some goal is done or the world collided.
    pub done: bool,
    /// Combined terminal flags.
    pub outcome: EpisodeOutcome,
}

/// Combine per-goal results.
///
/// Success needs every goal to succeed and at least one goal to exist;
/// timeout and out-of-bounds need any goal to report them.
pub fn aggregate(infos: &[RewardInfo], collision: bool, normalize_rewards: bool) -> Aggregate {
    let total: f64 = infos.iter().map(|i| i.reward).sum();
    let reward = if normalize_rewards && !infos.is_empty() {
        total / infos.len() as f64
    } else {
        total
    };
    Aggregate {
        reward,
        done: collision || infos.iter().any(|i| i.done),
        outcome: EpisodeOutcome {
            success: !infos.is_empty() && infos.iter().all(|i| i.success),
            collision,
            timeout: infos.iter().any(|i| i.timeout),
            out_of_bounds: infos.iter().any(|i| i.out_of_bounds),
        },
    }
}

/// Collects the components of an [`Environment`].
pub struct EnvironmentBuilder {
    config: EnvConfig,
    world: Box<dyn World>,
    robots: Vec<(Box<dyn Robot>, Vec<Box<dyn Sensor>>, Option<Box<dyn Goal>>)>,
    sensors: Vec<Box<dyn Sensor>>,
}

impl EnvironmentBuilder {
    /// Start an environment around `world`.
    pub fn new(config: EnvConfig, world: Box<dyn World>) -> Self {
        Self {
            config,
            world,
            robots: Vec::new(),
            sensors: Vec::new(),
        }
    }

    /// Register a robot with its own sensors and optional goal.
    pub fn robot(
        mut self,
        robot: Box<dyn Robot>,
        sensors: Vec<Box<dyn Sensor>>,
        goal: Option<Box<dyn Goal>>,
    ) -> Self {
        self.robots.push((robot, sensors, goal));
        self
    }

    /// Register a sensor that belongs to no robot.
    pub fn sensor(mut self, sensor: Box<dyn Sensor>) -> Self {
        self.sensors.push(sensor);
        self
    }

    /// Validate the assembly and compute observation and action spaces.
    pub fn build(self) -> Result<Environment> {
        let Self {
            config,
            mut world,
            robots,
            sensors: global_sensors,
        } = self;
        config.validate()?;

        let mut seen = HashSet::new();
        for (robot, _, _) in &robots {
            if !seen.insert(robot.name().to_string()) {
                return Err(EnvError::DuplicateRobot(robot.name().to_string()));
            }
        }
        let names: Vec<String> = robots.iter().map(|(r, _, _)| r.name().to_string()).collect();
        world.register_robots(&names);

        let mut sensors = SensorSet::new();
        let mut slots = Vec::with_capacity(robots.len());
        for (idx, (robot, owned, goal)) in robots.into_iter().enumerate() {
            for sensor in owned {
                sensors.push(Some(idx), sensor);
            }
            slots.push(RobotSlot { robot, goal });
        }
        for sensor in global_sensors {
            sensors.push(None, sensor);
        }

        for (idx, slot) in slots.iter().enumerate() {
            let Some(goal) = &slot.goal else { continue };
            let view = sensors.view(idx);
            if let Some(&capability) = goal
                .required_capabilities()
                .iter()
                .find(|&&c| !view.provides(c))
            {
                return Err(EnvError::MissingCapability {
                    robot: slot.robot.name().to_string(),
                    capability,
                });
            }
        }

        let mut observation_space = ObservationSpace::new();
        for sensor in sensors.iter().filter(|s| s.add_to_observation_space()) {
            observation_space.merge(sensor.observation_space())?;
        }
        for goal in slots.iter().filter_map(|s| s.goal.as_deref()) {
            if goal.add_to_observation_space() {
                observation_space.merge(goal.observation_space())?;
            }
        }

        let layout = ActionLayout::new(slots.iter().map(|s| s.robot.action_dim()).collect());

        if slots.iter().all(|s| s.goal.is_none()) {
            warn!("environment has no goals, episodes end only on collision and never succeed");
        }

        let csv = (config.logging == LogLevel::Csv).then(|| CsvSink::new(&config.log_dir));
        let stats = EpisodeStats::new(config.stat_buffer_size);
        let state = EpisodeState::new(slots.len());

        debug!(
            robots = slots.len(),
            sensors = sensors.len(),
            observation_keys = observation_space.len(),
            action_dim = layout.total(),
            "environment built"
        );

        Ok(Environment {
            config,
            world,
            slots,
            sensors,
            observation_space,
            layout,
            stats,
            episode: 0,
            state,
            goal_metrics: Vec::new(),
            log: Vec::new(),
            csv,
        })
    }
}

/// A multi-robot environment.
pub struct Environment {
    config: EnvConfig,
    world: Box<dyn World>,
    slots: Vec<RobotSlot>,
    sensors: SensorSet,
    observation_space: ObservationSpace,
    layout: ActionLayout,
    stats: EpisodeStats,
    episode: u64,
    state: EpisodeState,
    goal_metrics: Vec<GoalMetric>,
    log: Vec<InfoRecord>,
    csv: Option<CsvSink>,
}

impl Environment {
    /// Start a new episode and return its first observation.
    ///
    /// Fails with [`EnvError::EpisodeBudgetExhausted`] once the configured
    /// number of episodes has run, and with
    /// [`EnvError::NoCollisionFreeSetup`] when world generation keeps
    /// producing colliding setups.
    pub fn reset(&mut self) -> Result<Observation> {
        if let Some(max) = self.config.max_episodes {
            if self.episode >= max {
                return Err(EnvError::EpisodeBudgetExhausted { episodes: max });
            }
        }

        self.state = EpisodeState::new(self.slots.len());
        self.episode += 1;
        if self.config.max_episodes.is_none() {
            self.log.clear();
        }

        let success_rate = self.stats.success.rate();
        let retries = self.generate_setup(success_rate)?;
        if retries > 0 {
            info!(
                episode = self.episode,
                retries, "found collision-free starting setup"
            );
        }

        for sensor in self.sensors.iter_mut() {
            sensor.reset()?;
        }

        self.goal_metrics.clear();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            let RobotSlot { robot, goal } = slot;
            let Some(goal) = goal.as_mut() else { continue };
            let ctx = GoalContext {
                robot_index: idx,
                robot: &**robot,
                world: &*self.world,
                sensors: self.sensors.view(idx),
            };
            self.goal_metrics
                .push(goal.on_env_reset(&ctx, success_rate, self.episode)?);
        }

        Ok(self.observation())
    }

    fn generate_setup(&mut self, success_rate: f64) -> Result<usize> {
        let mut retries = 0;
        loop {
            if retries > MAX_SETUP_RETRIES {
                return Err(EnvError::NoCollisionFreeSetup { attempts: retries });
            }

            self.world.reset(success_rate)?;
            for slot in &mut self.slots {
                slot.robot.build()?;
            }
            let starts = self.world.create_ee_starting_points();
            self.world.create_position_target();
            self.world.create_rotation_target();
            self.world.build()?;

            for (slot, start) in self.slots.iter_mut().zip(&starts) {
                match (start.position, start.rotation) {
                    (None, _) => {}
                    (Some(position), None) => slot.robot.moveto_xyz(&position, false)?,
                    (Some(position), Some(rotation)) => {
                        slot.robot.moveto_xyzquat(&position, &rotation, false)?
                    }
                }
            }

            self.world.perform_collision_check()?;
            if !self.world.collision() {
                return Ok(retries);
            }
            retries += 1;
            debug!(episode = self.episode, retries, "starting setup collides, regenerating");
        }
    }

    /// Apply `action` and advance the environment by one step.
    pub fn step(&mut self, action: &[f64]) -> Result<StepResult> {
        if action.len() != self.layout.total() {
            return Err(EnvError::ActionLength {
                expected: self.layout.total(),
                actual: action.len(),
            });
        }

        self.world.update()?;

        let mut exec_times: Vec<Option<Duration>> = vec![None; self.slots.len()];
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if !self.state.active[idx] {
                continue;
            }
            exec_times[idx] = Some(slot.robot.process_action(self.layout.slice(action, idx))?);
            if self.config.use_physics_sim {
                self.world.step_physics()?;
            }
        }

        let step = self.state.steps;
        for sensor in self.sensors.iter_mut() {
            sensor.update(step)?;
        }

        self.world.perform_collision_check()?;
        let collision = self.world.collision();
        trace!(step, collision, "collision check");

        let mut infos = Vec::new();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            let RobotSlot { robot, goal } = slot;
            let Some(goal) = goal.as_mut() else { continue };
            let ctx = GoalContext {
                robot_index: idx,
                robot: &**robot,
                world: &*self.world,
                sensors: self.sensors.view(idx),
            };
            let info = goal.reward(&ctx, step, self.layout.slice(action, idx))?;
            if info.success && !goal.continue_after_success() {
                self.state.active[idx] = false;
            }
            infos.push(info);
        }

        let Aggregate {
            reward,
            done,
            outcome,
        } = aggregate(&infos, collision, self.config.normalize_rewards);
        self.state.cumulative_reward += reward;

        self.state.sim_time += self.config.sim_step;
        self.state.cpu_time = self.state.cpu_epoch.elapsed().as_secs_f64();
        self.state.steps += 1;
        if done {
            self.stats.record(&outcome);
        }

        let info = if self.config.logging.records() {
            let record = self.step_record(&outcome, &exec_times);
            self.log.push(record.clone());
            self.report(&record, done)?;
            record
        } else {
            InfoRecord::new()
        };

        Ok(StepResult {
            observation: self.observation(),
            reward,
            done,
            outcome,
            info,
        })
    }

    fn step_record(&self, outcome: &EpisodeOutcome, exec_times: &[Option<Duration>]) -> InfoRecord {
        let mut record = InfoRecord::new();
        record.insert("episodes", self.episode);
        record.insert("is_success", outcome.success);
        record.insert("collision", outcome.collision);
        record.insert("timeout", outcome.timeout);
        record.insert("out_of_bounds", outcome.out_of_bounds);
        record.insert("step", self.state.steps);
        record.insert("success_rate", self.stats.success.rate());
        record.insert("out_of_bounds_rate", self.stats.out_of_bounds.rate());
        record.insert("timeout_rate", self.stats.timeout.rate());
        record.insert("collision_rate", self.stats.collision.rate());
        record.insert("sim_time", self.state.sim_time);
        record.insert("cpu_time", self.state.cpu_time);

        for (slot, time) in self.slots.iter().zip(exec_times) {
            if let Some(time) = time {
                record.insert(
                    format!("action_cpu_time_{}", slot.robot.name()),
                    time.as_secs_f64(),
                );
            }
        }
        for sensor in self.sensors.iter().filter(|s| s.add_to_logging()) {
            record.extend(sensor.logging_data());
        }
        for goal in self.slots.iter().filter_map(|s| s.goal.as_deref()) {
            if goal.add_to_logging() {
                record.extend(goal.logging_data());
            }
        }
        record
    }

    fn report(&self, record: &InfoRecord, done: bool) -> Result<()> {
        if self.config.logging == LogLevel::Csv {
            match serde_json::to_string(record) {
                Ok(json) => debug!(record = %json, "step"),
                Err(err) => warn!(%err, "step record is not serializable"),
            }
        }
        if !done {
            return Ok(());
        }

        info!("{}", record.summary_line());

        if let Some(sink) = &self.csv {
            let last_episode = self
                .config
                .max_episodes
                .map_or(true, |max| self.episode == max);
            if last_episode {
                let path = sink.write(self.episode, &self.log)?;
                info!(path = %path.display(), records = self.log.len(), "episode log written");
            }
        }
        Ok(())
    }

    /// Merged observation of every contributing sensor and goal.
    pub fn observation(&self) -> Observation {
        let mut obs = Observation::new();
        for sensor in self.sensors.iter().filter(|s| s.add_to_observation_space()) {
            obs.extend(sensor.observation());
        }
        for goal in self.slots.iter().filter_map(|s| s.goal.as_deref()) {
            if goal.add_to_observation_space() {
                obs.extend(goal.observation());
            }
        }
        obs
    }

    /// Forward a curriculum value to every goal tracking `kind`.
    ///
    /// Returns the number of goals updated.
    pub fn set_goal_metric(&mut self, kind: MetricKind, value: f64) -> Result<usize> {
        let mut updated = 0;
        for goal in self.slots.iter_mut().filter_map(|s| s.goal.as_deref_mut()) {
            if goal.metric_kind() == kind {
                goal.set_metric(kind, value)?;
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Declared observation elements.
    pub fn observation_space(&self) -> &ObservationSpace {
        &self.observation_space
    }

    /// Per-robot partition of the action vector.
    pub fn action_layout(&self) -> &ActionLayout {
        &self.layout
    }

    /// Length of the action vector.
    pub fn action_dim(&self) -> usize {
        self.layout.total()
    }

    /// Index of the current episode; zero before the first reset.
    pub fn episode_index(&self) -> u64 {
        self.episode
    }

    /// Steps taken in the current episode.
    pub fn steps_current_episode(&self) -> u64 {
        self.state.steps
    }

    /// Rolling success rate.
    pub fn success_rate(&self) -> f64 {
        self.stats.success.rate()
    }

    /// Rolling episode statistics.
    pub fn stats(&self) -> &EpisodeStats {
        &self.stats
    }

    /// Goal metrics reported at the last reset, one per goal.
    pub fn goal_metrics(&self) -> &[GoalMetric] {
        &self.goal_metrics
    }

    /// Step records currently retained.
    pub fn log(&self) -> &[InfoRecord] {
        &self.log
    }

    /// Whether robot `idx` still receives actions this episode.
    pub fn is_robot_active(&self, idx: usize) -> bool {
        self.state.active.get(idx).copied().unwrap_or(false)
    }

    /// Reward accumulated in the current episode.
    pub fn cumulative_reward(&self) -> f64 {
        self.state.cumulative_reward
    }

    /// Registered robot names in registration order.
    pub fn robot_names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.robot.name()).collect()
    }
}
