//! Physics-informed training loop.

use rand::rng;
use tracing::{info, warn};

use super::config::{EarlyStoppingTracker, TrainingConfig};
use super::history::LossHistory;
use super::observer::{IterationReport, NoopObserver, TrainingObserver};
use crate::autodiff::{Matrix, Tape};
use crate::core_types::Dataset;
use crate::error::{Result, RiskError};
use crate::loss::CompositeLoss;
use crate::model::RiskEstimator;
use crate::optim::Adam;
use crate::physics::advection_residual;

/// Lifecycle of a [`Trainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    /// Constructed, no iteration has run
    Idle,
    /// Executing `iteration` (zero-based) out of `epochs`
    Running {
        /// Current iteration
        iteration: usize,
        /// Iteration budget
        epochs: usize,
    },
    /// Finished after `iterations` completed iterations
    Completed {
        /// Iterations actually run (less than the budget only with early stopping)
        iterations: usize,
    },
    /// Stopped by a numerical failure at `iteration`
    Aborted {
        /// Iteration that failed
        iteration: usize,
    },
}

/// Full-batch trainer for one [`RiskEstimator`].
///
/// A trainer runs once: after [`Trainer::fit`] returns it is either
/// `Completed` or `Aborted` and further calls are rejected.
#[derive(Debug)]
pub struct Trainer {
    config: TrainingConfig,
    loss: CompositeLoss,
    estimator: RiskEstimator,
    optimizer: Adam,
    history: LossHistory,
    tape: Tape,
    state: TrainerState,
}

impl Trainer {
    /// Validate `config` and initialise the estimator and optimizer.
    pub fn new(config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        let estimator = match config.seed {
            Some(seed) => RiskEstimator::seeded(config.hidden_dim, seed)?,
            None => RiskEstimator::new(config.hidden_dim, &mut rng())?,
        };
        let optimizer = Adam::new(config.optimizer, estimator.parameters())?;
        Ok(Self {
            loss: CompositeLoss::new(config.physics_weight)?,
            history: LossHistory::with_capacity(config.physics_weight, config.epochs),
            estimator,
            optimizer,
            tape: Tape::new(),
            state: TrainerState::Idle,
            config,
        })
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TrainerState {
        self.state
    }

    /// The estimator being trained.
    #[must_use]
    pub fn estimator(&self) -> &RiskEstimator {
        &self.estimator
    }

    /// Losses recorded so far.
    #[must_use]
    pub fn history(&self) -> &LossHistory {
        &self.history
    }

    /// Consume the trainer, returning the estimator and its loss history.
    #[must_use]
    pub fn into_parts(self) -> (RiskEstimator, LossHistory) {
        (self.estimator, self.history)
    }

    /// Train on `dataset` for the configured number of epochs.
    pub fn fit(&mut self, dataset: &Dataset) -> Result<()> {
        self.fit_with_observer(dataset, &mut NoopObserver)
    }

    /// Train on `dataset`, reporting each completed iteration to `observer`.
    pub fn fit_with_observer(
        &mut self,
        dataset: &Dataset,
        observer: &mut dyn TrainingObserver,
    ) -> Result<()> {
        if dataset.is_empty() {
            return Err(RiskError::EmptyDataset);
        }
        if self.state != TrainerState::Idle {
            return Err(RiskError::AlreadyTrained(self.state));
        }

        let epochs = self.config.epochs;
        let features = dataset.features_matrix();
        let targets = dataset.targets_matrix();
        let mut early_stopping = self.config.early_stopping.map(EarlyStoppingTracker::new);

        info!(
            "Training risk estimator: {} samples, {} epochs, hidden={}, lr={:e}, physics_weight={}",
            dataset.len(),
            epochs,
            self.config.hidden_dim,
            self.config.optimizer.learning_rate,
            self.config.physics_weight
        );

        for iteration in 0..epochs {
            self.state = TrainerState::Running { iteration, epochs };

            let report = match self.step(iteration, epochs, &features, &targets) {
                Ok(report) => report,
                Err(err) => {
                    self.state = TrainerState::Aborted { iteration };
                    warn!("Training aborted at iteration {}: {}", iteration, err);
                    return Err(err);
                }
            };
            observer.on_iteration(&report);

            if let Some(tracker) = early_stopping.as_mut() {
                if tracker.should_stop(report.loss.total) {
                    info!(
                        "Early stopping after {} iterations (total={:.6})",
                        iteration + 1,
                        report.loss.total
                    );
                    break;
                }
            }
        }

        self.state = TrainerState::Completed {
            iterations: self.history.len(),
        };
        if let Some(last) = self.history.last() {
            info!(
                "Training complete: {} iterations, total={:.6}, data={:.6}, physics={:.6}",
                self.history.len(),
                last.total,
                last.data,
                last.physics
            );
        } else {
            info!("Training complete: no iterations requested");
        }
        Ok(())
    }

    /// One optimizer iteration. Parameters are untouched when this fails.
    fn step(
        &mut self,
        iteration: usize,
        epochs: usize,
        features: &Matrix,
        targets: &Matrix,
    ) -> Result<IterationReport> {
        // 1. Fresh tape: no gradient state survives from the previous iteration
        self.tape.clear();
        let params = self.estimator.parameters().register(&mut self.tape);

        // 2. Forward pass for the data term
        let inputs = self.tape.constant(features.clone());
        let predictions = self
            .estimator
            .forward_on_tape(&mut self.tape, &params, inputs)?;

        // 3. Data term
        let target_var = self.tape.constant(targets.clone());
        let data = CompositeLoss::data_term(&mut self.tape, predictions, target_var)?;

        // 4. Physics residual on a tracked copy of the inputs
        let tracked_inputs = self.tape.variable(features.clone());
        let residual =
            advection_residual(&mut self.tape, &self.estimator, &params, tracked_inputs)?;

        // 5. Total
        let terms = self.loss.combine(&mut self.tape, data, residual.value)?;
        let record = terms.record(&self.tape);
        if !record.total.is_finite() {
            return Err(self.instability(iteration));
        }

        // 6. Reverse pass to the parameters
        let grad_vars = self.tape.grad(terms.total, &params.as_array())?;
        let grads: Vec<Matrix> = grad_vars
            .iter()
            .map(|g| self.tape.value(*g).clone())
            .collect();
        if grads.iter().any(|g| g.iter().any(|v| !v.is_finite())) {
            return Err(self.instability(iteration));
        }
        let gradient_norm = grads.iter().map(Matrix::norm_squared).sum::<f64>().sqrt();

        // 7. Optimizer step
        self.optimizer
            .step(self.estimator.parameters_mut(), &grads)?;

        // 8. Record
        self.history.push(record);

        Ok(IterationReport {
            iteration,
            epochs,
            loss: record,
            mean_abs_input_gradient: residual.mean_abs_input_gradient(&self.tape),
            gradient_norm,
        })
    }

    fn instability(&self, iteration: usize) -> RiskError {
        RiskError::NumericalInstability {
            iteration,
            last_valid: self.history.last(),
        }
    }
}

/// Train a fresh estimator on `dataset`.
///
/// An empty dataset is rejected before the estimator is even initialised.
pub fn train(dataset: &Dataset, config: &TrainingConfig) -> Result<(RiskEstimator, LossHistory)> {
    train_with_observer(dataset, config, &mut NoopObserver)
}

/// [`train`] with a per-iteration observer.
pub fn train_with_observer(
    dataset: &Dataset,
    config: &TrainingConfig,
    observer: &mut dyn TrainingObserver,
) -> Result<(RiskEstimator, LossHistory)> {
    if dataset.is_empty() {
        return Err(RiskError::EmptyDataset);
    }
    let mut trainer = Trainer::new(config.clone())?;
    trainer.fit_with_observer(dataset, observer)?;
    Ok(trainer.into_parts())
}
