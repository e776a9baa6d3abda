mod common;

use approx::assert_relative_eq;
use modrl_env::goal::{PositionCollisionConfig, PositionCollisionGoal};
use modrl_env::{
    Capability, ControlMode, EnvConfig, EnvError, Environment, EnvironmentBuilder, Goal,
    LogLevel, MetricKind, StartPose, MAX_SETUP_RETRIES,
};
use nalgebra::Point3;

use common::{scene, CloudSensor, ConstSensor, MockRobot, MockWorld, SharedScene, SkeletonSensor};

fn quiet() -> EnvConfig {
    EnvConfig {
        logging: LogLevel::Off,
        ..EnvConfig::default()
    }
}

fn position_goal(robot: &str, config: &EnvConfig) -> Box<dyn Goal> {
    let goal_config = PositionCollisionConfig {
        threshold_overwrite: Some(0.1),
        ..PositionCollisionConfig::default()
    };
    Box::new(PositionCollisionGoal::new(robot, goal_config, config).unwrap())
}

/// One robot at (0, 0, 1) with a single obstacle 0.33 above it.
fn goal_env(scene: &SharedScene, config: EnvConfig, target: Point3<f64>) -> Environment {
    scene.borrow_mut().targets = vec![target];
    let goal = position_goal("arm", &config);
    EnvironmentBuilder::new(config, MockWorld::boxed(scene))
        .robot(
            MockRobot::new("arm", scene, ControlMode::InverseKinematics).boxed(),
            vec![
                CloudSensor::boxed(vec![Point3::new(0.0, 0.0, 1.33)], vec![3]),
                SkeletonSensor::boxed(Point3::new(0.0, 0.0, 1.0)),
            ],
            Some(goal),
        )
        .build()
        .unwrap()
}

#[test]
fn test_action_layout_follows_control_modes() {
    let scene = scene();
    let mut env = EnvironmentBuilder::new(quiet(), MockWorld::boxed(&scene))
        .robot(
            MockRobot::new("ik", &scene, ControlMode::InverseKinematics).boxed(),
            vec![],
            None,
        )
        .robot(
            MockRobot::new("joints", &scene, ControlMode::JointVelocities).boxed(),
            vec![],
            None,
        )
        .build()
        .unwrap();

    assert_eq!(env.action_layout().dims(), &[3, 7]);
    assert_eq!(env.action_dim(), 10);
    assert_eq!(scene.borrow().registered, vec!["ik", "joints"]);

    env.reset().unwrap();
    let action: Vec<f64> = (0..10).map(|i| f64::from(i) / 10.0).collect();
    env.step(&action).unwrap();

    let scene = scene.borrow();
    assert_eq!(scene.actions[0], ("ik".to_string(), action[..3].to_vec()));
    assert_eq!(scene.actions[1], ("joints".to_string(), action[3..].to_vec()));
}

#[test]
fn test_action_length_is_checked() {
    let scene = scene();
    let mut env = EnvironmentBuilder::new(quiet(), MockWorld::boxed(&scene))
        .robot(
            MockRobot::new("arm", &scene, ControlMode::InverseKinematics).boxed(),
            vec![],
            None,
        )
        .build()
        .unwrap();
    env.reset().unwrap();

    let err = env.step(&[0.0; 4]).unwrap_err();
    assert!(matches!(
        err,
        EnvError::ActionLength {
            expected: 3,
            actual: 4
        }
    ));
    assert_eq!(scene.borrow().world_updates, 0);
}

#[test]
fn test_reset_regenerates_until_collision_free() {
    let scene = scene();
    scene.borrow_mut().collision_script = [true, true, false].into_iter().collect();
    scene.borrow_mut().starts = vec![StartPose::at(Point3::new(0.1, 0.2, 1.3))];

    let mut env = EnvironmentBuilder::new(quiet(), MockWorld::boxed(&scene))
        .robot(
            MockRobot::new("arm", &scene, ControlMode::InverseKinematics).boxed(),
            vec![],
            None,
        )
        .build()
        .unwrap();
    env.reset().unwrap();

    let scene = scene.borrow();
    assert_eq!(scene.world_resets, 3);
    assert_eq!(scene.moves.len(), 3);
    assert_eq!(env.episode_index(), 1);
    assert!(env.is_robot_active(0));
}

#[test]
fn test_reset_gives_up_eventually() {
    let scene = scene();
    scene.borrow_mut().default_collision = true;
    let mut env = EnvironmentBuilder::new(quiet(), MockWorld::boxed(&scene))
        .build()
        .unwrap();

    let err = env.reset().unwrap_err();
    assert!(matches!(err, EnvError::NoCollisionFreeSetup { attempts } if attempts > MAX_SETUP_RETRIES));
    assert_eq!(scene.borrow().world_resets, MAX_SETUP_RETRIES + 1);
}

#[test]
fn test_episode_budget() {
    let scene = scene();
    let config = EnvConfig {
        max_episodes: Some(2),
        ..quiet()
    };
    let mut env = EnvironmentBuilder::new(config, MockWorld::boxed(&scene))
        .build()
        .unwrap();

    env.reset().unwrap();
    env.reset().unwrap();
    let err = env.reset().unwrap_err();
    assert!(matches!(err, EnvError::EpisodeBudgetExhausted { episodes: 2 }));
    assert_eq!(env.episode_index(), 2);
}

#[test]
fn test_observation_matches_space() {
    let scene = scene();
    let config = quiet();
    scene.borrow_mut().targets = vec![Point3::new(0.5, 0.0, 1.0)];
    let goal = position_goal("arm", &config);
    let mut env = EnvironmentBuilder::new(config, MockWorld::boxed(&scene))
        .robot(
            MockRobot::new("arm", &scene, ControlMode::InverseKinematics).boxed(),
            vec![
                ConstSensor::boxed("joints_arm", "joints_arm", 7, &scene),
                CloudSensor::boxed(vec![Point3::new(0.0, 0.0, 1.33)], vec![3]),
                SkeletonSensor::boxed(Point3::new(0.0, 0.0, 1.0)),
            ],
            Some(goal),
        )
        .sensor(ConstSensor::boxed("clock", "clock", 1, &scene))
        .build()
        .unwrap();

    let obs = env.reset().unwrap();
    let space = env.observation_space().clone();
    assert_eq!(space.len(), 5);
    assert!(space.contains_shapes(&obs));
    assert_eq!(obs["closest_obstacle_points_arm"].shape(), &[6, 3]);

    let result = env.step(&[0.0; 3]).unwrap();
    assert!(space.contains_shapes(&result.observation));
}

#[test]
fn test_duplicate_observation_key() {
    let scene = scene();
    let result = EnvironmentBuilder::new(quiet(), MockWorld::boxed(&scene))
        .sensor(ConstSensor::boxed("a", "shared", 2, &scene))
        .sensor(ConstSensor::boxed("b", "shared", 2, &scene))
        .build();
    assert!(matches!(result, Err(EnvError::DuplicateObservationKey(key)) if key == "shared"));
}

#[test]
fn test_duplicate_robot_name() {
    let scene = scene();
    let result = EnvironmentBuilder::new(quiet(), MockWorld::boxed(&scene))
        .robot(MockRobot::new("arm", &scene, ControlMode::InverseKinematics).boxed(), vec![], None)
        .robot(MockRobot::new("arm", &scene, ControlMode::InverseKinematics).boxed(), vec![], None)
        .build();
    assert!(matches!(result, Err(EnvError::DuplicateRobot(name)) if name == "arm"));
}

#[test]
fn test_goal_requires_its_sensors() {
    let scene = scene();
    let config = quiet();
    let goal = position_goal("arm", &config);
    let result = EnvironmentBuilder::new(config, MockWorld::boxed(&scene))
        .robot(
            MockRobot::new("arm", &scene, ControlMode::InverseKinematics).boxed(),
            vec![CloudSensor::boxed(vec![Point3::origin()], vec![1])],
            Some(goal),
        )
        .build();
    assert!(matches!(
        result,
        Err(EnvError::MissingCapability {
            capability: Capability::Skeleton,
            ..
        })
    ));
}

#[test]
fn test_global_sensors_satisfy_goals() {
    let scene = scene();
    let config = quiet();
    scene.borrow_mut().targets = vec![Point3::new(0.5, 0.0, 1.0)];
    let goal = position_goal("arm", &config);
    let mut env = EnvironmentBuilder::new(config, MockWorld::boxed(&scene))
        .robot(
            MockRobot::new("arm", &scene, ControlMode::InverseKinematics).boxed(),
            vec![SkeletonSensor::boxed(Point3::new(0.0, 0.0, 1.0))],
            Some(goal),
        )
        .sensor(CloudSensor::boxed(vec![Point3::new(0.0, 0.0, 1.33)], vec![3]))
        .build()
        .unwrap();
    env.reset().unwrap();
}

#[test]
fn test_shaped_reward_step() {
    let scene = scene();
    let config = EnvConfig {
        train: false,
        ..quiet()
    };
    let mut env = goal_env(&scene, config, Point3::new(0.5, 0.0, 1.0));
    env.reset().unwrap();

    let result = env.step(&[0.1, 0.2, 0.0]).unwrap();
    // distance 0.5, obstacle 0.33 away, |a|^2 = 0.05
    assert_relative_eq!(result.reward, -0.56159375, epsilon = 1e-9);
    assert!(!result.done);
    assert!(!result.outcome.success);
    assert_eq!(env.steps_current_episode(), 1);
    assert_relative_eq!(env.cumulative_reward(), result.reward);
}

#[test]
fn test_success_deactivates_robot() {
    let scene = scene();
    let config = EnvConfig {
        train: false,
        ..quiet()
    };
    let mut env = goal_env(&scene, config, Point3::new(0.05, 0.0, 1.0));
    env.reset().unwrap();

    let result = env.step(&[0.0; 3]).unwrap();
    assert_relative_eq!(result.reward, 500.0);
    assert!(result.done);
    assert!(result.outcome.success);
    assert!(!env.is_robot_active(0));

    env.step(&[0.0; 3]).unwrap();
    assert_eq!(scene.borrow().actions.len(), 1);
}

#[test]
fn test_inactive_robot_keeps_later_offsets() {
    let scene = scene();
    let config = EnvConfig {
        train: false,
        ..quiet()
    };
    scene.borrow_mut().targets = vec![Point3::new(0.05, 0.0, 1.0)];
    let goal = position_goal("a", &config);
    let mut env = EnvironmentBuilder::new(config, MockWorld::boxed(&scene))
        .robot(
            MockRobot::new("a", &scene, ControlMode::InverseKinematics).boxed(),
            vec![
                CloudSensor::boxed(vec![Point3::new(0.0, 0.0, 1.33)], vec![3]),
                SkeletonSensor::boxed(Point3::new(0.0, 0.0, 1.0)),
            ],
            Some(goal),
        )
        .robot(
            MockRobot::new("b", &scene, ControlMode::JointPositions).boxed(),
            vec![],
            None,
        )
        .build()
        .unwrap();
    assert_eq!(env.action_layout().dims(), &[3, 7]);

    env.reset().unwrap();
    assert!(env.step(&[0.0; 10]).unwrap().outcome.success);
    assert!(!env.is_robot_active(0));
    assert!(env.is_robot_active(1));

    let action: Vec<f64> = (0..10_u32).map(f64::from).collect();
    env.step(&action).unwrap();

    let scene = scene.borrow();
    assert_eq!(scene.actions.len(), 3);
    assert_eq!(
        scene.actions[2],
        ("b".to_string(), vec![3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0])
    );
}

#[test]
fn test_collision_is_terminal() {
    let scene = scene();
    scene.borrow_mut().collision_script = [false, true].into_iter().collect();
    let mut env = goal_env(&scene, quiet(), Point3::new(0.5, 0.0, 1.0));
    env.reset().unwrap();

    let result = env.step(&[0.0; 3]).unwrap();
    assert_relative_eq!(result.reward, -500.0);
    assert!(result.done);
    assert!(result.outcome.collision);
    assert!(!result.outcome.success);
    assert_relative_eq!(env.stats().collision.rate(), 1.0 / 5.0);
}

#[test]
fn test_timeout_after_max_steps() {
    let scene = scene();
    let config = EnvConfig {
        max_steps_per_episode: 2,
        ..quiet()
    };
    let mut env = goal_env(&scene, config, Point3::new(0.5, 0.0, 1.0));
    env.reset().unwrap();

    for _ in 0..3 {
        assert!(!env.step(&[0.0; 3]).unwrap().done);
    }
    let result = env.step(&[0.0; 3]).unwrap();
    assert!(result.done);
    assert!(result.outcome.timeout);
    assert_relative_eq!(result.reward, -100.0);
}

#[test]
fn test_curriculum_sees_rolling_success_rate() {
    let scene = scene();
    let mut env = goal_env(&scene, quiet(), Point3::new(0.05, 0.0, 1.0));

    for _ in 0..3 {
        env.reset().unwrap();
        assert!(env.step(&[0.0; 3]).unwrap().outcome.success);
    }
    env.reset().unwrap();

    let rates = scene.borrow().success_rates.clone();
    assert_relative_eq!(rates[0], 0.0);
    assert_relative_eq!(rates[3], 3.0 / 7.0);
    assert_eq!(env.goal_metrics().len(), 1);
    assert_eq!(env.goal_metrics()[0].kind, MetricKind::DistanceThreshold);
}

#[test]
fn test_set_goal_metric() {
    let scene = scene();
    let mut env = goal_env(&scene, quiet(), Point3::new(0.5, 0.0, 1.0));
    assert_eq!(env.set_goal_metric(MetricKind::DistanceThreshold, 0.05).unwrap(), 1);

    env.reset().unwrap();
    // below the pivot the curriculum loosens slightly, never past the start
    let value = env.goal_metrics()[0].value;
    assert!(value > 0.05 && value < 0.051);
}

#[test]
fn test_step_record() {
    let scene = scene();
    let config = EnvConfig {
        logging: LogLevel::Console,
        train: false,
        ..EnvConfig::default()
    };
    let mut env = goal_env(&scene, config, Point3::new(0.5, 0.0, 1.0));
    env.reset().unwrap();
    let result = env.step(&[0.0; 3]).unwrap();

    let keys: Vec<&str> = result.info.keys().collect();
    assert_eq!(
        &keys[..13],
        &[
            "episodes",
            "is_success",
            "collision",
            "timeout",
            "out_of_bounds",
            "step",
            "success_rate",
            "out_of_bounds_rate",
            "timeout_rate",
            "collision_rate",
            "sim_time",
            "cpu_time",
            "action_cpu_time_arm",
        ]
    );
    assert!(keys.contains(&"distance_threshold_arm"));
    assert_eq!(result.info.get_f64("step"), Some(1.0));
    assert_relative_eq!(result.info.get_f64("sim_time").unwrap(), 1.0 / 240.0);
    assert_eq!(env.log().len(), 1);
}

#[test]
fn test_log_cleared_per_episode_when_unbounded() {
    let scene = scene();
    let config = EnvConfig {
        logging: LogLevel::Console,
        ..EnvConfig::default()
    };
    let mut env = EnvironmentBuilder::new(config, MockWorld::boxed(&scene))
        .robot(MockRobot::new("arm", &scene, ControlMode::InverseKinematics).boxed(), vec![], None)
        .build()
        .unwrap();

    env.reset().unwrap();
    env.step(&[0.0; 3]).unwrap();
    env.step(&[0.0; 3]).unwrap();
    assert_eq!(env.log().len(), 2);
    env.reset().unwrap();
    assert!(env.log().is_empty());
}

#[test]
fn test_log_kept_with_episode_budget() {
    let scene = scene();
    let config = EnvConfig {
        logging: LogLevel::Console,
        max_episodes: Some(5),
        ..EnvConfig::default()
    };
    let mut env = EnvironmentBuilder::new(config, MockWorld::boxed(&scene))
        .robot(MockRobot::new("arm", &scene, ControlMode::InverseKinematics).boxed(), vec![], None)
        .build()
        .unwrap();

    env.reset().unwrap();
    env.step(&[0.0; 3]).unwrap();
    env.reset().unwrap();
    env.step(&[0.0; 3]).unwrap();
    assert_eq!(env.log().len(), 2);
}

#[test]
fn test_csv_written_on_episode_end() {
    let dir = std::env::temp_dir().join(format!("modrl-env-csv-{}", std::process::id()));
    let scene = scene();
    scene.borrow_mut().collision_script = [false, false, true].into_iter().collect();
    let config = EnvConfig {
        logging: LogLevel::Csv,
        log_dir: dir.clone(),
        ..EnvConfig::default()
    };
    let mut env = EnvironmentBuilder::new(config, MockWorld::boxed(&scene))
        .robot(MockRobot::new("arm", &scene, ControlMode::InverseKinematics).boxed(), vec![], None)
        .sensor(ConstSensor::boxed("clock", "clock", 1, &scene))
        .build()
        .unwrap();

    env.reset().unwrap();
    assert!(!env.step(&[0.0; 3]).unwrap().done);
    assert!(env.step(&[0.0; 3]).unwrap().done);

    let text = std::fs::read_to_string(dir.join("episode_1.csv")).unwrap();
    let mut lines = text.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with(",episodes,is_success,collision"));
    assert!(header.ends_with("action_cpu_time_arm,clock_reading"));
    assert_eq!(lines.count(), 2);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_sensors_follow_lifecycle() {
    let scene = scene();
    let config = EnvConfig {
        use_physics_sim: true,
        ..quiet()
    };
    let mut env = EnvironmentBuilder::new(config, MockWorld::boxed(&scene))
        .robot(
            MockRobot::new("a", &scene, ControlMode::InverseKinematics).boxed(),
            vec![ConstSensor::boxed("s", "s", 1, &scene)],
            None,
        )
        .robot(MockRobot::new("b", &scene, ControlMode::InverseKinematics).boxed(), vec![], None)
        .build()
        .unwrap();

    env.reset().unwrap();
    env.step(&[0.0; 6]).unwrap();
    env.step(&[0.0; 6]).unwrap();

    let scene = scene.borrow();
    assert_eq!(scene.sensor_resets, 1);
    assert_eq!(
        scene.sensor_updates,
        vec![("s".to_string(), 0), ("s".to_string(), 1)]
    );
    assert_eq!(scene.physics_steps, 4);
    assert_eq!(scene.world_updates, 2);
}

#[test]
fn test_no_goals_never_succeed() {
    let scene = scene();
    let mut env = EnvironmentBuilder::new(quiet(), MockWorld::boxed(&scene))
        .robot(MockRobot::new("arm", &scene, ControlMode::InverseKinematics).boxed(), vec![], None)
        .build()
        .unwrap();
    env.reset().unwrap();
    let result = env.step(&[0.0; 3]).unwrap();
    assert!(!result.outcome.success);
    assert!(!result.done);
    assert_relative_eq!(result.reward, 0.0);
}
