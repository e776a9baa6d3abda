//! Closest obstacle point selection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{GeometryError, Result};
use crate::Point3;

/// Number of representative obstacle points produced per query.
pub const OBSTACLE_POINT_COUNT: usize = 6;

/// Distance assigned when a point is not measured against a skeleton subset.
pub const DISTANCE_SENTINEL: f64 = 200.0;

/// Which skeleton points measure against which parts of the cloud.
///
/// Skeleton points close to the robot mount touch the table in normal
/// operation, so they are only measured against non-table points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkeletonSubsets {
    /// Segmentation label of the table.
    pub table_label: i32,
    /// Skeleton indices measured against every cloud point.
    pub table_aware: Vec<usize>,
    /// Skeleton indices measured against non-table points only.
    pub table_agnostic: Vec<usize>,
}

impl Default for SkeletonSubsets {
    fn default() -> Self {
        Self {
            table_label: 2,
            table_aware: vec![4, 5, 6, 7, 8, 9, 10, 13, 14, 15],
            table_agnostic: vec![0, 1, 2, 3, 11, 12],
        }
    }
}

impl SkeletonSubsets {
    fn resolve(indices: &[usize], skeleton: &[Point3]) -> Result<Vec<Point3>> {
        indices
            .iter()
            .map(|&index| {
                skeleton.get(index).copied().ok_or(GeometryError::SkeletonIndex {
                    index,
                    len: skeleton.len(),
                })
            })
            .collect()
    }
}

/// Representative closest obstacle points and the overall clearance.
#[derive(Debug, Clone, PartialEq)]
pub struct ObstaclePoints {
    /// Selected points; short selections are padded by repeating the last one.
    pub points: [Point3; OBSTACLE_POINT_COUNT],
    /// Cloud indices of the genuinely selected points, in output order.
    pub indices: Vec<usize>,
    /// Minimum effective distance over the whole cloud.
    pub min_distance: f64,
}

impl ObstaclePoints {
    /// Number of points that were selected rather than padded.
    pub fn selected(&self) -> usize {
        self.indices.len()
    }

    /// Points as a row-major `6 x 3` buffer.
    pub fn to_rows_f32(&self) -> Vec<f32> {
        self.points
            .iter()
            .flat_map(|p| [p.x as f32, p.y as f32, p.z as f32])
            .collect()
    }
}

/// Per-point distance to the nearest relevant skeleton point.
///
/// Every point is measured against the table-aware subset. Points not
/// labeled as table are additionally measured against the table-agnostic
/// subset, and the smaller of the two wins.
pub fn effective_distances(
    points: &[Point3],
    labels: &[i32],
    skeleton: &[Point3],
    subsets: &SkeletonSubsets,
) -> Result<Vec<f64>> {
    if points.len() != labels.len() {
        return Err(GeometryError::LabelCount {
            points: points.len(),
            labels: labels.len(),
        });
    }

    let aware = SkeletonSubsets::resolve(&subsets.table_aware, skeleton)?;
    let agnostic = SkeletonSubsets::resolve(&subsets.table_agnostic, skeleton)?;

    Ok(points
        .iter()
        .zip(labels)
        .map(|(point, &label)| {
            let to_aware = nearest(point, &aware);
            let to_agnostic = if label == subsets.table_label {
                DISTANCE_SENTINEL
            } else {
                nearest(point, &agnostic)
            };
            to_aware.min(to_agnostic)
        })
        .collect())
}

fn nearest(point: &Point3, references: &[Point3]) -> f64 {
    references
        .iter()
        .map(|r| nalgebra::distance(point, r))
        .reduce(f64::min)
        .unwrap_or(DISTANCE_SENTINEL)
}

/// Select the representative closest obstacle points of a labeled cloud.
///
/// One point per object label is preferred: with more than six objects the
/// six nearest objects win, with exactly six each contributes its nearest
/// point, and with fewer the remaining slots take the nearest points of the
/// whole cloud whose distance differs from every per-object pick. Ties keep
/// cloud order.
pub fn closest_obstacle_points(
    points: &[Point3],
    labels: &[i32],
    skeleton: &[Point3],
    subsets: &SkeletonSubsets,
) -> Result<ObstaclePoints> {
    let distances = effective_distances(points, labels, skeleton, subsets)?;
    if distances.is_empty() {
        return Err(GeometryError::EmptyPointCloud);
    }

    // First index with the smallest distance per label, labels ascending.
    let mut per_label: BTreeMap<i32, usize> = BTreeMap::new();
    for (index, (&label, &distance)) in labels.iter().zip(&distances).enumerate() {
        per_label
            .entry(label)
            .and_modify(|best| {
                if distance < distances[*best] {
                    *best = index;
                }
            })
            .or_insert(index);
    }

    let objects = per_label.len();
    let mut indices: Vec<usize> = per_label.into_values().collect();
    let by_distance = |a: &usize, b: &usize| distances[*a].total_cmp(&distances[*b]);

    if objects > OBSTACLE_POINT_COUNT {
        indices.sort_by(by_distance);
        indices.truncate(OBSTACLE_POINT_COUNT);
    } else if objects < OBSTACLE_POINT_COUNT {
        let taken: Vec<f64> = indices.iter().map(|&i| distances[i]).collect();
        let mut pool: Vec<usize> = (0..distances.len())
            .filter(|&i| !taken.contains(&distances[i]))
            .collect();
        pool.sort_by(by_distance);
        indices.extend(pool.into_iter().take(OBSTACLE_POINT_COUNT - objects));
    }

    let last = indices.len() - 1;
    let selected = std::array::from_fn(|slot| points[indices[slot.min(last)]]);
    let min_distance = distances.iter().copied().fold(f64::INFINITY, f64::min);

    Ok(ObstaclePoints {
        points: selected,
        indices,
        min_distance,
    })
}
