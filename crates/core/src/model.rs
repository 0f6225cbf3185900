//! Risk estimator: a small tanh multilayer perceptron.
//!
//! ```text
//! (x1, x2, t) ─ Linear(3→H) ─ tanh ─ Linear(H→H) ─ tanh ─ Linear(H→1) ─ u
//! ```
//!
//! tanh is required here: the transport residual differentiates `u` with
//! respect to the inputs and then the optimizer differentiates that again,
//! so the activation needs a smooth, non-vanishing second derivative.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::autodiff::{Matrix, Tape, Var};
use crate::core_types::{features_to_matrix, FeatureVector, FEATURE_DIM};
use crate::error::{Result, RiskError};

/// Number of trainable tensors in [`ModelParameters`].
pub const PARAMETER_TENSORS: usize = 6;

/// Weights and biases of the three dense layers.
///
/// Weights are stored `fan_in x fan_out` and biases as `1 x fan_out` rows, so
/// a layer is `X · W + b` for a batch `X` with one sample per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// Input layer weights, `3 x H`
    pub w1: Matrix,
    /// Input layer bias, `1 x H`
    pub b1: Matrix,
    /// Hidden layer weights, `H x H`
    pub w2: Matrix,
    /// Hidden layer bias, `1 x H`
    pub b2: Matrix,
    /// Output layer weights, `H x 1`
    pub w3: Matrix,
    /// Output layer bias, `1 x 1`
    pub b3: Matrix,
}

impl ModelParameters {
    /// Uniform `U(-1/√fan_in, 1/√fan_in)` initialisation for weights and biases.
    pub fn init<R: Rng>(hidden_dim: usize, rng: &mut R) -> Self {
        let (w1, b1) = dense_init(FEATURE_DIM, hidden_dim, rng);
        let (w2, b2) = dense_init(hidden_dim, hidden_dim, rng);
        let (w3, b3) = dense_init(hidden_dim, 1, rng);
        Self {
            w1,
            b1,
            w2,
            b2,
            w3,
            b3,
        }
    }

    /// Tensors in a fixed order: `w1, b1, w2, b2, w3, b3`.
    #[must_use]
    pub fn tensors(&self) -> [&Matrix; PARAMETER_TENSORS] {
        [&self.w1, &self.b1, &self.w2, &self.b2, &self.w3, &self.b3]
    }

    /// Mutable tensors in the same order as [`ModelParameters::tensors`].
    pub fn tensors_mut(&mut self) -> [&mut Matrix; PARAMETER_TENSORS] {
        [
            &mut self.w1,
            &mut self.b1,
            &mut self.w2,
            &mut self.b2,
            &mut self.w3,
            &mut self.b3,
        ]
    }

    /// Total number of scalar parameters.
    #[must_use]
    pub fn count(&self) -> usize {
        self.tensors().iter().map(|t| t.len()).sum()
    }

    /// Record the parameters on `tape` as differentiable leaves.
    pub fn register(&self, tape: &mut Tape) -> ParameterVars {
        ParameterVars {
            w1: tape.variable(self.w1.clone()),
            b1: tape.variable(self.b1.clone()),
            w2: tape.variable(self.w2.clone()),
            b2: tape.variable(self.b2.clone()),
            w3: tape.variable(self.w3.clone()),
            b3: tape.variable(self.b3.clone()),
        }
    }
}

fn dense_init<R: Rng>(fan_in: usize, fan_out: usize, rng: &mut R) -> (Matrix, Matrix) {
    let bound = 1.0 / (fan_in as f64).sqrt();
    let weights = Matrix::from_fn(fan_in, fan_out, |_, _| rng.random_range(-bound..bound));
    let bias = Matrix::from_fn(1, fan_out, |_, _| rng.random_range(-bound..bound));
    (weights, bias)
}

/// Tape handles for one registration of [`ModelParameters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterVars {
    /// Input layer weights
    pub w1: Var,
    /// Input layer bias
    pub b1: Var,
    /// Hidden layer weights
    pub w2: Var,
    /// Hidden layer bias
    pub b2: Var,
    /// Output layer weights
    pub w3: Var,
    /// Output layer bias
    pub b3: Var,
}

impl ParameterVars {
    /// Handles in the same order as [`ModelParameters::tensors`].
    #[must_use]
    pub fn as_array(&self) -> [Var; PARAMETER_TENSORS] {
        [self.w1, self.b1, self.w2, self.b2, self.w3, self.b3]
    }
}

/// Learned turbulence risk estimator.
///
/// Serialisable for export only; an estimator is always built through
/// [`RiskEstimator::new`] so `hidden_dim` matches the parameter shapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskEstimator {
    hidden_dim: usize,
    params: ModelParameters,
}

impl RiskEstimator {
    /// Default width of both hidden layers.
    pub const DEFAULT_HIDDEN_DIM: usize = 20;

    /// Randomly initialised estimator.
    pub fn new<R: Rng>(hidden_dim: usize, rng: &mut R) -> Result<Self> {
        if hidden_dim == 0 {
            return Err(RiskError::InvalidConfig(
                "hidden_dim must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            hidden_dim,
            params: ModelParameters::init(hidden_dim, rng),
        })
    }

    /// Estimator whose initial parameters are fully determined by `seed`.
    pub fn seeded(hidden_dim: usize, seed: u64) -> Result<Self> {
        Self::new(hidden_dim, &mut StdRng::seed_from_u64(seed))
    }

    /// Width of the hidden layers.
    #[must_use]
    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// Current parameters.
    #[must_use]
    pub fn parameters(&self) -> &ModelParameters {
        &self.params
    }

    pub(crate) fn parameters_mut(&mut self) -> &mut ModelParameters {
        &mut self.params
    }

    /// Risk estimate for each feature vector, in input order.
    #[must_use]
    pub fn forward(&self, features: &[FeatureVector]) -> Vec<f64> {
        let x = features_to_matrix(features);
        // Width is FEATURE_DIM by construction
        self.forward_rows(&x).iter().copied().collect()
    }

    /// Batched inference on an `n x 3` matrix, returning `n x 1`.
    pub fn forward_matrix(&self, x: &Matrix) -> Result<Matrix> {
        if x.ncols() != FEATURE_DIM {
            return Err(RiskError::feature_width(x.nrows(), x.ncols()));
        }
        Ok(self.forward_rows(x))
    }

    fn forward_rows(&self, x: &Matrix) -> Matrix {
        let p = &self.params;
        let h1 = dense(x, &p.w1, &p.b1).map(f64::tanh);
        let h2 = dense(&h1, &p.w2, &p.b2).map(f64::tanh);
        dense(&h2, &p.w3, &p.b3)
    }

    /// Differentiable forward pass of `input` (`n x 3`) on `tape`.
    ///
    /// `params` must come from [`ModelParameters::register`] on the same tape.
    pub fn forward_on_tape(&self, tape: &mut Tape, params: &ParameterVars, input: Var) -> Result<Var> {
        let (rows, cols) = tape.shape(input);
        if cols != FEATURE_DIM {
            return Err(RiskError::feature_width(rows, cols));
        }
        let z1 = tape.matmul(input, params.w1)?;
        let z1 = tape.add_row(z1, params.b1)?;
        let h1 = tape.tanh(z1);
        let z2 = tape.matmul(h1, params.w2)?;
        let z2 = tape.add_row(z2, params.b2)?;
        let h2 = tape.tanh(z2);
        let out = tape.matmul(h2, params.w3)?;
        tape.add_row(out, params.b3)
    }
}

fn dense(x: &Matrix, w: &Matrix, b: &Matrix) -> Matrix {
    let mut out = x * w;
    for c in 0..out.ncols() {
        let bias = b[(0, c)];
        for r in 0..out.nrows() {
            out[(r, c)] += bias;
        }
    }
    out
}
