//! Transport-equation residual of the risk field.
//!
//! The estimator output `u(x1, x2, t)` is treated as a scalar field advected
//! by itself in both horizontal directions (inviscid, pressure-free):
//!
//! ```text
//! ∂u/∂t + u·∂u/∂x1 + u·∂u/∂x2 = 0
//! ```
//!
//! The residual is the batch mean of the squared left-hand side. Input
//! derivatives come from a reverse pass over the estimator that is kept on the
//! tape, so the residual can later be differentiated with respect to the
//! parameters.

use crate::autodiff::{Tape, Var};
use crate::core_types::FEATURE_DIM;
use crate::error::{Result, RiskError};
use crate::model::{ParameterVars, RiskEstimator};

/// Column of each input in the feature matrix.
const X1: usize = 0;
const X2: usize = 1;
const T: usize = 2;

/// Residual of one physics pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Residual {
    /// `1 x 1` mean squared residual
    pub value: Var,
    /// Estimator output `u`, `n x 1`
    pub output: Var,
    /// `∂u/∂(x1, x2, t)`, `n x 3`, one row per sample
    pub input_gradient: Var,
}

impl Residual {
    /// Mean absolute input derivative per feature column, `[x1, x2, t]`.
    #[must_use]
    pub fn mean_abs_input_gradient(&self, tape: &Tape) -> [f64; FEATURE_DIM] {
        let g = tape.value(self.input_gradient);
        let n = g.nrows().max(1) as f64;
        let mut means = [0.0; FEATURE_DIM];
        for (c, mean) in means.iter_mut().enumerate() {
            *mean = g.column(c).iter().map(|v| v.abs()).sum::<f64>() / n;
        }
        means
    }
}

/// Evaluate the advection residual of `estimator` at `inputs`.
///
/// `inputs` must be an `n x 3` [`Tape::variable`]; a constant input fails with
/// [`RiskError::Differentiation`] before the forward pass runs.
pub fn advection_residual(
    tape: &mut Tape,
    estimator: &RiskEstimator,
    params: &ParameterVars,
    inputs: Var,
) -> Result<Residual> {
    if !tape.is_tracked(inputs) {
        return Err(RiskError::Differentiation(
            "physics residual needs inputs created with Tape::variable".to_string(),
        ));
    }

    let u = estimator.forward_on_tape(tape, params, inputs)?;
    let input_gradient = tape.grad(u, &[inputs])?[0];

    let u_x1 = tape.column(input_gradient, X1)?;
    let u_x2 = tape.column(input_gradient, X2)?;
    let u_t = tape.column(input_gradient, T)?;

    let adv_x1 = tape.mul(u, u_x1)?;
    let adv_x2 = tape.mul(u, u_x2)?;
    let lhs = tape.add(u_t, adv_x1)?;
    let lhs = tape.add(lhs, adv_x2)?;
    let squared = tape.square(lhs);
    let value = tape.mean(squared);

    Ok(Residual {
        value,
        output: u,
        input_gradient,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::Matrix;
    use approx::assert_relative_eq;

    fn inputs() -> Matrix {
        Matrix::from_row_slice(
            4,
            3,
            &[
                0.1, -0.2, 0.0, //
                0.3, 0.1, 0.5, //
                -0.4, 0.2, 1.0, //
                0.0, 0.4, 1.5,
            ],
        )
    }

    fn residual_value(model: &RiskEstimator, x: &Matrix) -> f64 {
        let mut tape = Tape::new();
        let vars = model.parameters().register(&mut tape);
        let input = tape.variable(x.clone());
        let r = advection_residual(&mut tape, model, &vars, input).unwrap();
        tape.scalar(r.value)
    }

    #[test]
    fn untracked_inputs_are_rejected() {
        let model = RiskEstimator::seeded(5, 2).unwrap();
        let mut tape = Tape::new();
        let vars = model.parameters().register(&mut tape);
        let input = tape.constant(inputs());
        let before = tape.len();

        let err = advection_residual(&mut tape, &model, &vars, input).unwrap_err();
        assert!(matches!(err, RiskError::Differentiation(_)));
        // Nothing was recorded for the rejected pass
        assert_eq!(tape.len(), before);
    }

    #[test]
    fn matches_finite_difference_residual() {
        let model = RiskEstimator::seeded(8, 21).unwrap();
        let x = inputs();
        let h = 1e-6;

        let u = model.forward_matrix(&x).unwrap();
        let partial = |col: usize| {
            let mut plus = x.clone();
            let mut minus = x.clone();
            plus.column_mut(col).add_scalar_mut(h);
            minus.column_mut(col).add_scalar_mut(-h);
            (model.forward_matrix(&plus).unwrap() - model.forward_matrix(&minus).unwrap())
                / (2.0 * h)
        };
        let (ux1, ux2, ut) = (partial(X1), partial(X2), partial(T));
        let expected = (0..x.nrows())
            .map(|i| {
                let lhs = ut[i] + u[i] * ux1[i] + u[i] * ux2[i];
                lhs * lhs
            })
            .sum::<f64>()
            / x.nrows() as f64;

        assert_relative_eq!(residual_value(&model, &x), expected, epsilon = 1e-8);
    }

    #[test]
    fn residual_is_deterministic_and_finite() {
        let model = RiskEstimator::seeded(8, 4).unwrap();
        let a = residual_value(&model, &inputs());
        let b = residual_value(&model, &inputs());
        assert!(a.is_finite());
        assert!(a >= 0.0);
        assert_eq!(a, b);
    }

    #[test]
    fn parameter_gradient_through_input_gradient() {
        let model = RiskEstimator::seeded(5, 8).unwrap();
        let x = inputs();

        let mut tape = Tape::new();
        let vars = model.parameters().register(&mut tape);
        let input = tape.variable(x.clone());
        let r = advection_residual(&mut tape, &model, &vars, input).unwrap();
        let grads = tape.grad(r.value, &vars.as_array()).unwrap();

        let h = 1e-6;
        for (slot, grad) in grads.iter().enumerate() {
            let analytic = tape.value(*grad).clone();
            for k in 0..analytic.len() {
                let mut plus = model.clone();
                plus.parameters_mut().tensors_mut()[slot][k] += h;
                let mut minus = model.clone();
                minus.parameters_mut().tensors_mut()[slot][k] -= h;
                let numeric = (residual_value(&plus, &x) - residual_value(&minus, &x)) / (2.0 * h);
                assert_relative_eq!(analytic[k], numeric, epsilon = 1e-6, max_relative = 1e-4);
            }
        }
    }

    #[test]
    fn mean_abs_input_gradient_per_column() {
        let model = RiskEstimator::seeded(6, 13).unwrap();
        let mut tape = Tape::new();
        let vars = model.parameters().register(&mut tape);
        let input = tape.variable(inputs());
        let r = advection_residual(&mut tape, &model, &vars, input).unwrap();

        let g = tape.value(r.input_gradient).clone();
        assert_eq!(g.shape(), (4, 3));
        let means = r.mean_abs_input_gradient(&tape);
        assert_relative_eq!(
            means[T],
            g.column(T).iter().map(|v| v.abs()).sum::<f64>() / 4.0,
            epsilon = 1e-15
        );
    }
}
