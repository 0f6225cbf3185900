//! Training samples: feature vectors, labelled examples and datasets.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RiskError};

/// Number of features per sample: two spatial coordinates and a sequence index.
pub const FEATURE_DIM: usize = 3;

/// Model input `(x1, x2, t)`.
///
/// `x1`/`x2` are the spatial coordinates (latitude/longitude in the reference
/// scenario) and `t` is an ordinal time index.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    /// First spatial coordinate
    pub x1: f64,
    /// Second spatial coordinate
    pub x2: f64,
    /// Ordinal / time index
    pub t: f64,
}

impl FeatureVector {
    /// Create a feature vector from its three components.
    #[inline]
    #[must_use]
    pub const fn new(x1: f64, x2: f64, t: f64) -> Self {
        Self { x1, x2, t }
    }

    /// Build from a slice, failing with [`RiskError::Shape`] unless it has exactly 3 entries.
    pub fn try_from_slice(values: &[f64]) -> Result<Self> {
        match *values {
            [x1, x2, t] => Ok(Self::new(x1, x2, t)),
            _ => Err(RiskError::Shape {
                expected: (1, FEATURE_DIM),
                actual: (1, values.len()),
            }),
        }
    }

    /// Components in column order.
    #[inline]
    #[must_use]
    pub fn as_array(&self) -> [f64; FEATURE_DIM] {
        [self.x1, self.x2, self.t]
    }
}

impl From<[f64; FEATURE_DIM]> for FeatureVector {
    fn from([x1, x2, t]: [f64; FEATURE_DIM]) -> Self {
        Self::new(x1, x2, t)
    }
}

/// Stack feature vectors into an `n x 3` matrix, one row per sample.
#[must_use]
pub fn features_to_matrix(features: &[FeatureVector]) -> DMatrix<f64> {
    DMatrix::from_fn(features.len(), FEATURE_DIM, |r, c| features[r].as_array()[c])
}

/// A feature vector paired with its heuristic-derived risk label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    /// Model input
    pub features: FeatureVector,
    /// Target risk, nominally in [0, 1] (not enforced)
    pub target: f64,
}

impl TrainingExample {
    /// Create a new labelled example.
    #[must_use]
    pub const fn new(features: FeatureVector, target: f64) -> Self {
        Self { features, target }
    }
}

/// Ordered collection of training examples.
///
/// An empty dataset is representable (that is how a missing upstream reading
/// surfaces) but the trainer refuses it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    examples: Vec<TrainingExample>,
}

impl Dataset {
    /// Create a dataset from examples in synthesis order.
    #[must_use]
    pub fn new(examples: Vec<TrainingExample>) -> Self {
        Self { examples }
    }

    /// Dataset with no examples.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of examples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    /// True when there are no examples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Examples in insertion order.
    #[must_use]
    pub fn examples(&self) -> &[TrainingExample] {
        &self.examples
    }

    /// Feature vectors in insertion order.
    #[must_use]
    pub fn features(&self) -> Vec<FeatureVector> {
        self.examples.iter().map(|e| e.features).collect()
    }

    /// Features as an `n x 3` matrix.
    #[must_use]
    pub fn features_matrix(&self) -> DMatrix<f64> {
        features_to_matrix(&self.features())
    }

    /// Targets as an `n x 1` matrix.
    #[must_use]
    pub fn targets_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.len(), 1, |r, _| self.examples[r].target)
    }
}

impl FromIterator<TrainingExample> for Dataset {
    fn from_iter<I: IntoIterator<Item = TrainingExample>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
