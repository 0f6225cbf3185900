//! Error types for risk estimation and training.

use thiserror::Error;

use crate::training::{LossRecord, TrainerState};

/// Result type alias for turbulence risk operations.
pub type Result<T> = std::result::Result<T, RiskError>;

/// Errors raised by the estimator, the autodiff tape and the trainer.
///
/// All variants are terminal for the current run; nothing in the crate retries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    /// Operand or feature dimensions do not match.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    Shape {
        /// Expected (rows, cols). `usize::MAX` marks an unconstrained axis.
        expected: (usize, usize),
        /// Actual (rows, cols).
        actual: (usize, usize),
    },

    /// A gradient was requested that the tape cannot provide.
    #[error("differentiation error: {0}")]
    Differentiation(String),

    /// The total loss or a parameter gradient became NaN or infinite.
    #[error("numerical instability at iteration {iteration} (last valid: {last_valid:?})")]
    NumericalInstability {
        /// Zero-based iteration that produced the non-finite value.
        iteration: usize,
        /// Loss components of the last completed iteration, if any.
        last_valid: Option<LossRecord>,
    },

    /// Training was requested on a dataset with no examples.
    #[error("dataset is empty")]
    EmptyDataset,

    /// Evaluation was requested on an empty batch.
    #[error("evaluation batch is empty")]
    EmptyBatch,

    /// `fit` was called on a trainer that has already run.
    #[error("trainer has already run (state {0:?})")]
    AlreadyTrained(TrainerState),

    /// A hyperparameter is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RiskError {
    /// Shape error for a feature matrix whose width is not 3.
    pub(crate) fn feature_width(rows: usize, cols: usize) -> Self {
        Self::Shape {
            expected: (rows, crate::core_types::FEATURE_DIM),
            actual: (rows, cols),
        }
    }
}
