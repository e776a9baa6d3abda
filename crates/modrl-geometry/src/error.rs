//! Error types for obstacle geometry.

use thiserror::Error;

/// Errors that can occur while selecting closest obstacle points.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    /// The point cloud holds no points.
    #[error("point cloud is empty")]
    EmptyPointCloud,

    /// Points and segmentation labels disagree in length.
    #[error("point cloud has {points} points but {labels} labels")]
    LabelCount {
        /// Number of points.
        points: usize,
        /// Number of labels.
        labels: usize,
    },

    /// A skeleton subset refers to a point the skeleton does not have.
    #[error("skeleton index {index} out of range for {len} skeleton points")]
    SkeletonIndex {
        /// Offending index.
        index: usize,
        /// Skeleton length.
        len: usize,
    },
}

/// Result type for geometry operations.
pub type Result<T> = std::result::Result<T, GeometryError>;
