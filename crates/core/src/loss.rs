//! Composite training objective.
//!
//! ```text
//! data    = mean((prediction - target)²)
//! physics = advection residual (unweighted)
//! total   = data + physics_weight · physics
//! ```

use crate::autodiff::{Tape, Var};
use crate::error::{Result, RiskError};
use crate::training::LossRecord;

/// Tape handles of the three loss components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossTerms {
    /// Objective the optimizer differentiates
    pub total: Var,
    /// Mean squared error against targets
    pub data: Var,
    /// Raw (unweighted) physics residual
    pub physics: Var,
}

impl LossTerms {
    /// Read the current values off the tape.
    #[must_use]
    pub fn record(&self, tape: &Tape) -> LossRecord {
        LossRecord {
            total: tape.scalar(self.total),
            data: tape.scalar(self.data),
            physics: tape.scalar(self.physics),
        }
    }
}

/// Weighted sum of the data-fit and physics terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeLoss {
    physics_weight: f64,
}

impl CompositeLoss {
    /// Loss with the given physics weight; must be finite and non-negative.
    pub fn new(physics_weight: f64) -> Result<Self> {
        if !physics_weight.is_finite() || physics_weight < 0.0 {
            return Err(RiskError::InvalidConfig(format!(
                "physics_weight must be finite and >= 0, got {physics_weight}"
            )));
        }
        Ok(Self { physics_weight })
    }

    /// Weight applied to the physics residual.
    #[must_use]
    pub fn physics_weight(&self) -> f64 {
        self.physics_weight
    }

    /// Mean squared error between `predictions` and `targets` (both `n x 1`).
    pub fn data_term(tape: &mut Tape, predictions: Var, targets: Var) -> Result<Var> {
        let diff = tape.sub(predictions, targets)?;
        let squared = tape.square(diff);
        Ok(tape.mean(squared))
    }

    /// Combine an existing data term with the residual.
    ///
    /// With a zero weight the total is the data term itself, so the residual
    /// stays on the tape for reporting but never reaches the parameter gradient.
    pub fn combine(&self, tape: &mut Tape, data: Var, residual: Var) -> Result<LossTerms> {
        let total = if self.physics_weight == 0.0 {
            data
        } else {
            let weighted = tape.affine(residual, self.physics_weight, 0.0);
            tape.add(data, weighted)?
        };
        Ok(LossTerms {
            total,
            data,
            physics: residual,
        })
    }

    /// Full objective from predictions, targets and the physics residual.
    pub fn compute(
        &self,
        tape: &mut Tape,
        predictions: Var,
        targets: Var,
        residual: Var,
    ) -> Result<LossTerms> {
        let data = Self::data_term(tape, predictions, targets)?;
        self.combine(tape, data, residual)
    }
}

impl Default for CompositeLoss {
    fn default() -> Self {
        Self {
            physics_weight: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::Matrix;
    use crate::model::RiskEstimator;
    use crate::physics::advection_residual;
    use approx::assert_relative_eq;

    fn column(values: &[f64]) -> Matrix {
        Matrix::from_column_slice(values.len(), 1, values)
    }

    #[test]
    fn data_term_is_mean_squared_error() {
        let mut tape = Tape::new();
        let pred = tape.constant(column(&[0.5, 0.0, 1.0]));
        let target = tape.constant(column(&[0.0, 0.0, 0.0]));
        let residual = tape.constant(Matrix::from_element(1, 1, 2.0));

        let terms = CompositeLoss::new(0.5)
            .unwrap()
            .compute(&mut tape, pred, target, residual)
            .unwrap();
        let record = terms.record(&tape);

        assert_relative_eq!(record.data, 1.25 / 3.0, epsilon = 1e-15);
        assert_eq!(record.physics, 2.0);
        assert_relative_eq!(record.total, 1.25 / 3.0 + 1.0, epsilon = 1e-15);
    }

    #[test]
    fn rejects_negative_or_non_finite_weight() {
        assert!(CompositeLoss::new(-0.1).is_err());
        assert!(CompositeLoss::new(f64::NAN).is_err());
        assert!(CompositeLoss::new(f64::INFINITY).is_err());
        assert!(CompositeLoss::new(0.0).is_ok());
    }

    #[test]
    fn zero_weight_contributes_no_parameter_gradient() {
        let model = RiskEstimator::seeded(6, 17).unwrap();
        let x = Matrix::from_fn(5, 3, |r, c| 0.2 * r as f64 - 0.1 * c as f64);
        let y = column(&[0.4, 0.5, 0.3, 0.45, 0.35]);

        let gradients = |with_physics: bool| {
            let mut tape = Tape::new();
            let vars = model.parameters().register(&mut tape);
            let input = tape.constant(x.clone());
            let pred = model.forward_on_tape(&mut tape, &vars, input).unwrap();
            let target = tape.constant(y.clone());
            let loss = CompositeLoss::new(0.0).unwrap();
            let data = CompositeLoss::data_term(&mut tape, pred, target).unwrap();

            let total = if with_physics {
                let tracked = tape.variable(x.clone());
                let r = advection_residual(&mut tape, &model, &vars, tracked).unwrap();
                let terms = loss.combine(&mut tape, data, r.value).unwrap();
                let record = terms.record(&tape);
                assert!(record.physics.is_finite());
                assert_eq!(record.total, record.data);
                terms.total
            } else {
                data
            };

            let grads = tape.grad(total, &vars.as_array()).unwrap();
            grads
                .iter()
                .map(|g| tape.value(*g).clone())
                .collect::<Vec<_>>()
        };

        assert_eq!(gradients(true), gradients(false));
    }
}
