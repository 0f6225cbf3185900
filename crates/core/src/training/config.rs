//! Training hyperparameters.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RiskError};
use crate::model::RiskEstimator;
use crate::optim::AdamConfig;

/// Stop when the total loss has not improved by `min_delta` for `patience` iterations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarlyStopping {
    /// Iterations without improvement before stopping
    pub patience: usize,
    /// Minimum decrease that counts as an improvement
    pub min_delta: f64,
}

impl EarlyStopping {
    /// Create a new early stopping rule.
    #[must_use]
    pub const fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta,
        }
    }
}

/// Tracks the best loss seen so far for an [`EarlyStopping`] rule.
#[derive(Debug, Clone)]
pub(crate) struct EarlyStoppingTracker {
    rule: EarlyStopping,
    best: f64,
    stale: usize,
}

impl EarlyStoppingTracker {
    pub(crate) fn new(rule: EarlyStopping) -> Self {
        Self {
            rule,
            best: f64::INFINITY,
            stale: 0,
        }
    }

    /// Record `loss`; returns true once patience is exhausted.
    pub(crate) fn should_stop(&mut self, loss: f64) -> bool {
        if loss < self.best - self.rule.min_delta {
            self.best = loss;
            self.stale = 0;
        } else {
            self.stale += 1;
        }
        self.stale >= self.rule.patience
    }
}

/// Hyperparameters for one training run.
///
/// Defaults: 1000 epochs, physics weight 1.0, hidden width 20, Adam with
/// learning rate 1e-3, random initialisation, no early stopping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of optimizer iterations (full-batch)
    pub epochs: usize,
    /// Weight of the physics residual in the total loss
    pub physics_weight: f64,
    /// Width of both hidden layers
    pub hidden_dim: usize,
    /// Optimizer settings
    pub optimizer: AdamConfig,
    /// Seed for parameter initialisation; `None` draws from the thread RNG
    pub seed: Option<u64>,
    /// Optional early stopping on the total loss
    pub early_stopping: Option<EarlyStopping>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 1000,
            physics_weight: 1.0,
            hidden_dim: RiskEstimator::DEFAULT_HIDDEN_DIM,
            optimizer: AdamConfig::default(),
            seed: None,
            early_stopping: None,
        }
    }
}

impl TrainingConfig {
    /// Set the iteration budget.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set the physics weight.
    pub fn with_physics_weight(mut self, physics_weight: f64) -> Self {
        self.physics_weight = physics_weight;
        self
    }

    /// Set the hidden layer width.
    pub fn with_hidden_dim(mut self, hidden_dim: usize) -> Self {
        self.hidden_dim = hidden_dim;
        self
    }

    /// Set the Adam learning rate.
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.optimizer.learning_rate = learning_rate;
        self
    }

    /// Fix the initialisation seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Enable early stopping.
    pub fn with_early_stopping(mut self, rule: EarlyStopping) -> Self {
        self.early_stopping = Some(rule);
        self
    }

    /// Check every hyperparameter is in range. `epochs == 0` is allowed.
    pub fn validate(&self) -> Result<()> {
        if self.hidden_dim == 0 {
            return Err(RiskError::InvalidConfig(
                "hidden_dim must be greater than zero".to_string(),
            ));
        }
        if !self.physics_weight.is_finite() || self.physics_weight < 0.0 {
            return Err(RiskError::InvalidConfig(format!(
                "physics_weight must be finite and >= 0, got {}",
                self.physics_weight
            )));
        }
        if let Some(rule) = self.early_stopping {
            if rule.patience == 0 || !rule.min_delta.is_finite() || rule.min_delta < 0.0 {
                return Err(RiskError::InvalidConfig(format!(
                    "early stopping needs patience > 0 and a finite min_delta >= 0, got {rule:?}"
                )));
            }
        }
        self.optimizer.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_run() {
        let config = TrainingConfig::default();
        assert_eq!(config.epochs, 1000);
        assert_eq!(config.physics_weight, 1.0);
        assert_eq!(config.hidden_dim, 20);
        assert_eq!(config.optimizer.learning_rate, 1e-3);
        assert!(config.seed.is_none());
        assert!(config.early_stopping.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation() {
        assert!(TrainingConfig::default().with_epochs(0).validate().is_ok());
        assert!(TrainingConfig::default().with_hidden_dim(0).validate().is_err());
        assert!(TrainingConfig::default().with_physics_weight(-1.0).validate().is_err());
        assert!(TrainingConfig::default().with_learning_rate(0.0).validate().is_err());
        assert!(TrainingConfig::default().with_learning_rate(f64::NAN).validate().is_err());
        assert!(TrainingConfig::default()
            .with_early_stopping(EarlyStopping::new(0, 0.0))
            .validate()
            .is_err());
    }

    #[test]
    fn partial_config_deserialises_with_defaults() {
        let config: TrainingConfig =
            serde_json::from_str(r#"{"epochs": 50, "optimizer": {"learning_rate": 0.01}}"#)
                .unwrap();
        assert_eq!(config.epochs, 50);
        assert_eq!(config.hidden_dim, 20);
        assert_eq!(config.optimizer.learning_rate, 0.01);
        assert_eq!(config.optimizer.beta2, 0.999);
    }

    #[test]
    fn tracker_counts_stale_iterations() {
        let mut tracker = EarlyStoppingTracker::new(EarlyStopping::new(2, 0.1));
        assert!(!tracker.should_stop(1.0));
        assert!(!tracker.should_stop(0.95)); // not enough improvement
        assert!(tracker.should_stop(0.93));

        let mut tracker = EarlyStoppingTracker::new(EarlyStopping::new(2, 0.0));
        assert!(!tracker.should_stop(1.0));
        assert!(!tracker.should_stop(0.5));
        assert!(!tracker.should_stop(0.6));
        assert!(!tracker.should_stop(0.4));
    }
}
