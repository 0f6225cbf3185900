//! Per-iteration loss record.
//!
//! The `physics` series holds the **unweighted** residual. The weight used
//! for the run is stored alongside, and every entry satisfies
//! `total = data + physics_weight · physics`.

use serde::{Deserialize, Serialize};

/// Loss components of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossRecord {
    /// Optimised objective
    pub total: f64,
    /// Mean squared error against the targets
    pub data: f64,
    /// Raw physics residual
    pub physics: f64,
}

/// Append-only loss series for one training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossHistory {
    physics_weight: f64,
    total: Vec<f64>,
    data: Vec<f64>,
    physics: Vec<f64>,
}

impl LossHistory {
    /// Empty history for a run using `physics_weight`.
    #[must_use]
    pub fn new(physics_weight: f64) -> Self {
        Self {
            physics_weight,
            ..Self::default()
        }
    }

    /// Empty history with room for `epochs` entries.
    #[must_use]
    pub fn with_capacity(physics_weight: f64, epochs: usize) -> Self {
        Self {
            physics_weight,
            total: Vec::with_capacity(epochs),
            data: Vec::with_capacity(epochs),
            physics: Vec::with_capacity(epochs),
        }
    }

    pub(crate) fn push(&mut self, record: LossRecord) {
        self.total.push(record.total);
        self.data.push(record.data);
        self.physics.push(record.physics);
    }

    /// Weight the physics series was combined with.
    #[must_use]
    pub fn physics_weight(&self) -> f64 {
        self.physics_weight
    }

    /// Number of completed iterations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.total.len()
    }

    /// True before the first iteration completes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total.is_empty()
    }

    /// Total loss per iteration.
    #[must_use]
    pub fn total(&self) -> &[f64] {
        &self.total
    }

    /// Data term per iteration.
    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Raw physics residual per iteration.
    #[must_use]
    pub fn physics(&self) -> &[f64] {
        &self.physics
    }

    /// Physics contribution to the total at iteration `i`.
    #[must_use]
    pub fn weighted_physics(&self, i: usize) -> Option<f64> {
        self.physics.get(i).map(|p| self.physics_weight * p)
    }

    /// Components of iteration `i`.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<LossRecord> {
        Some(LossRecord {
            total: *self.total.get(i)?,
            data: *self.data.get(i)?,
            physics: *self.physics.get(i)?,
        })
    }

    /// Components of the most recent iteration.
    #[must_use]
    pub fn last(&self) -> Option<LossRecord> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Iterate over all records in order.
    pub fn records(&self) -> impl Iterator<Item = LossRecord> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    /// Smallest total loss and the iteration it occurred at.
    #[must_use]
    pub fn min_total(&self) -> Option<(usize, f64)> {
        self.total
            .iter()
            .copied()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Largest `|total - (data + weight · physics)|` over the run.
    #[must_use]
    pub fn max_recombination_error(&self) -> f64 {
        self.records()
            .map(|r| (r.total - (r.data + self.physics_weight * r.physics)).abs())
            .fold(0.0, f64::max)
    }
}
