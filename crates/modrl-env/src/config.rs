//! Environment-wide settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{EnvError, Result};

/// How much an environment reports about its episodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// No info records are produced.
    Off,
    /// Records are kept in memory and a summary is logged per episode.
    #[default]
    Console,
    /// Like `Console`, plus every step record at debug level and CSV files.
    Csv,
}

impl LogLevel {
    /// Whether step records are built at all.
    pub fn records(self) -> bool {
        !matches!(self, LogLevel::Off)
    }
}

/// Environment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Training mode; enables goal curricula.
    pub train: bool,
    /// Ask sensors to normalize their observations.
    pub normalize_observations: bool,
    /// Average goal rewards instead of summing them.
    pub normalize_rewards: bool,
    /// Steps after which goals time out.
    pub max_steps_per_episode: u64,
    /// Episode budget; `None` runs until stopped from outside.
    pub max_episodes: Option<u64>,
    /// Reporting level.
    pub logging: LogLevel,
    /// Let simulated time pass instead of teleporting robots.
    pub use_physics_sim: bool,
    /// Number of episodes the rolling statistics average over.
    pub stat_buffer_size: usize,
    /// Simulated seconds per step.
    pub sim_step: f64,
    /// Directory receiving CSV episode logs.
    pub log_dir: PathBuf,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            train: true,
            normalize_observations: false,
            normalize_rewards: false,
            max_steps_per_episode: 1024,
            max_episodes: None,
            logging: LogLevel::Console,
            use_physics_sim: false,
            stat_buffer_size: 25,
            sim_step: 1.0 / 240.0,
            log_dir: PathBuf::from("./models/env_logs"),
        }
    }
}

impl EnvConfig {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if self.stat_buffer_size == 0 {
            return Err(EnvError::InvalidConfig(
                "stat_buffer_size must be positive".into(),
            ));
        }
        if !(self.sim_step.is_finite() && self.sim_step > 0.0) {
            return Err(EnvError::InvalidConfig(format!(
                "sim_step must be a positive number, got {}",
                self.sim_step
            )));
        }
        if self.max_steps_per_episode == 0 {
            return Err(EnvError::InvalidConfig(
                "max_steps_per_episode must be positive".into(),
            ));
        }
        if self.max_episodes == Some(0) {
            return Err(EnvError::InvalidConfig(
                "max_episodes must be positive when set".into(),
            ));
        }
        Ok(())
    }
}
