//! Goal implementations.

mod position_collision;

pub use position_collision::{
    curriculum_step, shaped_reward, PositionCollisionConfig, PositionCollisionGoal,
    RewardWeights, COLLISION_REWARD, CURRICULUM_SUCCESS_RATE, SUCCESS_REWARD, TIMEOUT_REWARD,
};
