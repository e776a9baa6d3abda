//! Axis-aligned region robots operate in.

use nalgebra::Point3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Axis-aligned box in world coordinates, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    /// Lower corner.
    pub low: [f64; 3],
    /// Upper corner.
    pub high: [f64; 3],
}

impl Default for Workspace {
    fn default() -> Self {
        Self {
            low: [-0.6, -0.6, 1.1],
            high: [0.6, 0.6, 1.6],
        }
    }
}

impl Workspace {
    /// Check that every lower bound lies below its upper bound.
    pub fn validate(&self) -> Result<()> {
        let ordered = self
            .low
            .iter()
            .zip(&self.high)
            .all(|(l, h)| l.is_finite() && h.is_finite() && l < h);
        if !ordered {
            return Err(SimError::InvalidConfig(format!(
                "workspace bounds {:?}..{:?} are not ordered",
                self.low, self.high
            )));
        }
        Ok(())
    }

    /// Lower corner as a point.
    pub fn low_point(&self) -> Point3<f64> {
        Point3::from(self.low)
    }

    /// Upper corner as a point.
    pub fn high_point(&self) -> Point3<f64> {
        Point3::from(self.high)
    }

    /// Center of the box.
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.low_point(), &self.high_point())
    }

    /// Closest point inside the box.
    pub fn clamp(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::new(
            p.x.clamp(self.low[0], self.high[0]),
            p.y.clamp(self.low[1], self.high[1]),
            p.z.clamp(self.low[2], self.high[2]),
        )
    }

    /// Whether `p` lies inside the box.
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|a| p[a] >= self.low[a] && p[a] <= self.high[a])
    }

    /// Map `p` into `[-1, 1]` per axis.
    pub fn normalize(&self, p: &Point3<f64>) -> [f64; 3] {
        std::array::from_fn(|a| 2.0 * (p[a] - self.low[a]) / (self.high[a] - self.low[a]) - 1.0)
    }

    /// Inverse of [`Workspace::normalize`]; values are clamped to `[-1, 1]`.
    pub fn denormalize(&self, v: &[f64]) -> Point3<f64> {
        let mut p = self.center();
        for (a, value) in v.iter().take(3).enumerate() {
            let t = (value.clamp(-1.0, 1.0) + 1.0) / 2.0;
            p[a] = self.low[a] + t * (self.high[a] - self.low[a]);
        }
        p
    }

    /// Uniformly random point inside the box.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Point3<f64> {
        Point3::new(
            rng.gen_range(self.low[0]..=self.high[0]),
            rng.gen_range(self.low[1]..=self.high[1]),
            rng.gen_range(self.low[2]..=self.high[2]),
        )
    }
}
