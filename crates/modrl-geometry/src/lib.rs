#![warn(missing_docs)]

//! Obstacle geometry for collision-aware goals.
//!
//! Given a segmented point cloud of the scene and the skeleton points of a
//! robot, this crate finds how close the robot is to every detected object
//! and picks a fixed-size set of representative obstacle points that a
//! policy can observe.
//!
//! # Example
//!
//! ```
//! use modrl_geometry::{closest_obstacle_points, Point3, SkeletonSubsets};
//!
//! let skeleton = vec![Point3::origin()];
//! let subsets = SkeletonSubsets {
//!     table_label: 2,
//!     table_aware: vec![0],
//!     table_agnostic: vec![0],
//! };
//! let cloud = vec![Point3::new(0.5, 0.0, 0.0), Point3::new(0.0, 0.2, 0.0)];
//! let labels = vec![3, 4];
//!
//! let closest = closest_obstacle_points(&cloud, &labels, &skeleton, &subsets).unwrap();
//! assert_eq!(closest.points.len(), 6);
//! assert!((closest.min_distance - 0.2).abs() < 1e-12);
//! ```

mod closest;
mod error;

pub use closest::{
    closest_obstacle_points, effective_distances, ObstaclePoints, SkeletonSubsets,
    DISTANCE_SENTINEL, OBSTACLE_POINT_COUNT,
};
pub use error::{GeometryError, Result};

/// A point in 3D space, in meters.
pub type Point3 = nalgebra::Point3<f64>;
