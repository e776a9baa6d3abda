//! Observation and action spaces.

use std::collections::BTreeMap;
use std::ops::Range;

use ndarray::{Array1, ArrayD, IxDyn};

use crate::error::{EnvError, Result};

/// Named observation arrays, merged from every contributing component.
pub type Observation = BTreeMap<String, ArrayD<f32>>;

/// Lower and upper bound of every action value.
pub const ACTION_BOUND: f64 = 1.0;

/// Wrap a flat slice as a one-dimensional observation array.
pub fn vector(values: &[f32]) -> ArrayD<f32> {
    Array1::from(values.to_vec()).into_dyn()
}

fn repeat_row(row: &[f32], rows: usize) -> ArrayD<f32> {
    ArrayD::from_shape_fn(IxDyn(&[rows, row.len()]), |idx| row[idx[1]])
}

/// Box space for continuous values with bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSpace {
    low: ArrayD<f32>,
    high: ArrayD<f32>,
}

impl BoxSpace {
    /// Create a box space from explicit bounds.
    pub fn new(low: ArrayD<f32>, high: ArrayD<f32>) -> Result<Self> {
        if low.shape() != high.shape() {
            return Err(EnvError::BoundsShape {
                low: low.shape().to_vec(),
                high: high.shape().to_vec(),
            });
        }
        Ok(Self { low, high })
    }

    /// Create a box space with the same bounds for every element.
    pub fn uniform(shape: &[usize], low: f32, high: f32) -> Self {
        Self {
            low: ArrayD::from_elem(IxDyn(shape), low),
            high: ArrayD::from_elem(IxDyn(shape), high),
        }
    }

    /// One-dimensional box space from fixed-size bounds.
    pub fn from_arrays<const N: usize>(low: [f32; N], high: [f32; N]) -> Self {
        Self {
            low: vector(&low),
            high: vector(&high),
        }
    }

    /// `rows x N` box space from fixed-size row bounds.
    pub fn rows_from_arrays<const N: usize>(low: [f32; N], high: [f32; N], rows: usize) -> Self {
        Self {
            low: repeat_row(&low, rows),
            high: repeat_row(&high, rows),
        }
    }

    /// Shape of the space.
    pub fn shape(&self) -> &[usize] {
        self.low.shape()
    }

    /// Number of scalar elements.
    pub fn size(&self) -> usize {
        self.low.len()
    }

    /// Lower bounds.
    pub fn low(&self) -> &ArrayD<f32> {
        &self.low
    }

    /// Upper bounds.
    pub fn high(&self) -> &ArrayD<f32> {
        &self.high
    }

    /// Whether `value` has the right shape and lies within the bounds.
    pub fn contains(&self, value: &ArrayD<f32>) -> bool {
        value.shape() == self.shape()
            && value
                .iter()
                .zip(self.low.iter().zip(self.high.iter()))
                .all(|(&v, (&l, &h))| v >= l && v <= h)
    }
}

/// Dictionary of named observation elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationSpace {
    elements: BTreeMap<String, BoxSpace>,
}

impl ObservationSpace {
    /// Create an empty observation space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an element, replacing an earlier declaration of the same key.
    pub fn insert(&mut self, key: impl Into<String>, space: BoxSpace) {
        self.elements.insert(key.into(), space);
    }

    /// Builder form of [`ObservationSpace::insert`].
    pub fn with(mut self, key: impl Into<String>, space: BoxSpace) -> Self {
        self.insert(key, space);
        self
    }

    /// Merge another component's elements; keys must stay unique.
    pub fn merge(&mut self, other: ObservationSpace) -> Result<()> {
        for (key, space) in other.elements {
            if self.elements.contains_key(&key) {
                return Err(EnvError::DuplicateObservationKey(key));
            }
            self.elements.insert(key, space);
        }
        Ok(())
    }

    /// Look up an element.
    pub fn get(&self, key: &str) -> Option<&BoxSpace> {
        self.elements.get(key)
    }

    /// Element names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.elements.keys()
    }

    /// Iterate over `(name, space)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BoxSpace)> {
        self.elements.iter()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether no element is declared.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Total number of scalars across all elements.
    pub fn flat_dim(&self) -> usize {
        self.elements.values().map(BoxSpace::size).sum()
    }

    /// Whether `observation` has exactly the declared keys and shapes.
    pub fn contains_shapes(&self, observation: &Observation) -> bool {
        observation.len() == self.elements.len()
            && self.elements.iter().all(|(key, space)| {
                observation
                    .get(key)
                    .is_some_and(|value| value.shape() == space.shape())
            })
    }
}

/// Per-robot partition of the flat action vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLayout {
    dims: Vec<usize>,
    offsets: Vec<usize>,
}

impl ActionLayout {
    /// Lay out robots contiguously in registration order.
    pub fn new(dims: Vec<usize>) -> Self {
        let offsets = dims
            .iter()
            .scan(0, |offset, &dim| {
                let start = *offset;
                *offset += dim;
                Some(start)
            })
            .collect();
        Self { dims, offsets }
    }

    /// Length of the full action vector.
    pub fn total(&self) -> usize {
        self.dims.iter().sum()
    }

    /// Per-robot action dimensions.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Index range of a robot's slice.
    pub fn range(&self, robot: usize) -> Range<usize> {
        let start = self.offsets[robot];
        start..start + self.dims[robot]
    }

    /// A robot's slice of a full action vector.
    pub fn slice<'a>(&self, action: &'a [f64], robot: usize) -> &'a [f64] {
        &action[self.range(robot)]
    }
}
