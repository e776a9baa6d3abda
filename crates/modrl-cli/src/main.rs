//! modrl CLI
//!
//! Runs simulated table-top scenes with a random policy.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

use modrl_env::{EnvError, LogLevel, ACTION_BOUND};
use modrl_sim::{build_environment, SceneConfig};

#[derive(Parser)]
#[command(name = "modrl")]
#[command(version, about = "Multi-robot reach-and-avoid environments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run episodes with a uniformly random policy
    Run {
        /// Number of gantries
        #[arg(long, default_value = "1")]
        robots: usize,

        /// Number of episodes
        #[arg(long, default_value = "5")]
        episodes: u64,

        /// Steps after which an episode times out
        #[arg(long)]
        steps: Option<u64>,

        /// Seed for world generation and the policy
        #[arg(long)]
        seed: Option<u64>,

        /// Reporting level
        #[arg(long, value_enum, default_value = "console")]
        log: LogArg,

        /// Let simulated time pass instead of teleporting robots
        #[arg(long)]
        physics: bool,

        /// Evaluate with final curriculum thresholds
        #[arg(long)]
        eval: bool,
    },

    /// Print the default scene description as JSON
    Scene {
        /// Number of gantries
        #[arg(long, default_value = "1")]
        robots: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogArg {
    Off,
    Console,
    Csv,
}

impl From<LogArg> for LogLevel {
    fn from(arg: LogArg) -> Self {
        match arg {
            LogArg::Off => LogLevel::Off,
            LogArg::Console => LogLevel::Console,
            LogArg::Csv => LogLevel::Csv,
        }
    }
}

struct RunOptions {
    robots: usize,
    episodes: u64,
    steps: Option<u64>,
    seed: Option<u64>,
    log: LogArg,
    physics: bool,
    eval: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            robots,
            episodes,
            steps,
            seed,
            log,
            physics,
            eval,
        } => {
            run(RunOptions {
                robots,
                episodes,
                steps,
                seed,
                log,
                physics,
                eval,
            })?;
        }
        Commands::Scene { robots } => {
            println!("{}", serde_json::to_string_pretty(&SceneConfig::gantries(robots))?);
        }
    }

    Ok(())
}

fn run(opts: RunOptions) -> Result<()> {
    let mut scene = SceneConfig::gantries(opts.robots);
    if let Some(seed) = opts.seed {
        scene = scene.with_seed(seed);
    }
    scene.env.max_episodes = Some(opts.episodes);
    if let Some(steps) = opts.steps {
        scene.env.max_steps_per_episode = steps;
    }
    scene.env.logging = opts.log.into();
    scene.env.use_physics_sim |= opts.physics;
    if opts.eval {
        scene.env.train = false;
    }
    let max_steps = scene.env.max_steps_per_episode;

    let mut env = build_environment(scene)?;
    let mut rng = match opts.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    loop {
        match env.reset() {
            Ok(_) => {}
            Err(EnvError::EpisodeBudgetExhausted { episodes }) => {
                info!(episodes, "episode budget exhausted");
                break;
            }
            Err(err) => return Err(err.into()),
        }

        // Scenes without goals never finish on their own.
        let has_goals = !env.goal_metrics().is_empty();
        loop {
            let action: Vec<f64> = (0..env.action_dim())
                .map(|_| rng.gen_range(-ACTION_BOUND..=ACTION_BOUND))
                .collect();
            let done = env.step(&action)?.done;
            if done || (!has_goals && env.steps_current_episode() >= max_steps) {
                break;
            }
        }
    }

    let stats = env.stats();
    info!(
        success_rate = stats.success.rate(),
        collision_rate = stats.collision.rate(),
        timeout_rate = stats.timeout.rate(),
        "run finished"
    );
    Ok(())
}
