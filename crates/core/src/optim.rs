//! Adam optimizer (adaptive first/second moment estimates).
//!
//! ```text
//! m ← β1·m + (1-β1)·g
//! v ← β2·v + (1-β2)·g²
//! θ ← θ - lr · m̂ / (√v̂ + ε)      m̂ = m/(1-β1ᵗ), v̂ = v/(1-β2ᵗ)
//! ```

use serde::{Deserialize, Serialize};

use crate::autodiff::Matrix;
use crate::error::{Result, RiskError};
use crate::model::{ModelParameters, PARAMETER_TENSORS};

/// Adam hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamConfig {
    /// Step size
    pub learning_rate: f64,
    /// Decay of the first moment estimate
    pub beta1: f64,
    /// Decay of the second moment estimate
    pub beta2: f64,
    /// Denominator stabiliser
    pub epsilon: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

impl AdamConfig {
    /// Check every field is in range.
    pub fn validate(&self) -> Result<()> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(RiskError::InvalidConfig(format!(
                "learning_rate must be finite and > 0, got {}",
                self.learning_rate
            )));
        }
        for (name, beta) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0.0..1.0).contains(&beta) {
                return Err(RiskError::InvalidConfig(format!(
                    "{name} must be in [0, 1), got {beta}"
                )));
            }
        }
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(RiskError::InvalidConfig(format!(
                "epsilon must be finite and > 0, got {}",
                self.epsilon
            )));
        }
        Ok(())
    }
}

/// Adam state for one [`ModelParameters`] instance.
#[derive(Debug, Clone)]
pub struct Adam {
    config: AdamConfig,
    steps: u64,
    first_moment: Vec<Matrix>,
    second_moment: Vec<Matrix>,
}

impl Adam {
    /// Zero moment estimates shaped like `params`.
    pub fn new(config: AdamConfig, params: &ModelParameters) -> Result<Self> {
        config.validate()?;
        let zeros: Vec<Matrix> = params
            .tensors()
            .iter()
            .map(|t| Matrix::zeros(t.nrows(), t.ncols()))
            .collect();
        Ok(Self {
            config,
            steps: 0,
            first_moment: zeros.clone(),
            second_moment: zeros,
        })
    }

    /// Hyperparameters in use.
    #[must_use]
    pub fn config(&self) -> &AdamConfig {
        &self.config
    }

    /// Number of updates applied so far.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Apply one update in place. `grads` follows [`ModelParameters::tensors`] order.
    pub fn step(&mut self, params: &mut ModelParameters, grads: &[Matrix]) -> Result<()> {
        if grads.len() != PARAMETER_TENSORS {
            return Err(RiskError::Shape {
                expected: (PARAMETER_TENSORS, 1),
                actual: (grads.len(), 1),
            });
        }
        for (param, grad) in params.tensors().iter().zip(grads) {
            if param.shape() != grad.shape() {
                return Err(RiskError::Shape {
                    expected: param.shape(),
                    actual: grad.shape(),
                });
            }
        }

        self.steps += 1;
        let AdamConfig {
            learning_rate,
            beta1,
            beta2,
            epsilon,
        } = self.config;
        let t = self.steps as f64;
        let bias1 = 1.0 - beta1.powf(t);
        let bias2 = 1.0 - beta2.powf(t);

        let moments = self.first_moment.iter_mut().zip(self.second_moment.iter_mut());
        for ((param, grad), (m_t, v_t)) in params.tensors_mut().into_iter().zip(grads).zip(moments) {
            for (((p, &g), m), v) in param
                .iter_mut()
                .zip(grad.iter())
                .zip(m_t.iter_mut())
                .zip(v_t.iter_mut())
            {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / bias1;
                let v_hat = *v / bias2;
                *p -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
            }
        }
        Ok(())
    }
}
