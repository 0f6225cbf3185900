//! Training of the risk estimator.
//!
//! Each iteration runs the full batch through the estimator twice (once for
//! the data term, once with tracked inputs for the transport residual),
//! differentiates the composite loss with respect to the parameters and takes
//! one Adam step. Iterations are strictly sequential.
//!
//! # Example
//!
//! ```rust,no_run
//! use turbulence_risk_core::training::{train, TrainingConfig};
//! use turbulence_risk_core::weather::SampleBuilder;
//! use turbulence_risk_core::evaluate;
//!
//! let dataset = SampleBuilder::default().build(0.42);
//! let config = TrainingConfig::default().with_seed(7);
//! let (estimator, history) = train(&dataset, &config).unwrap();
//! assert_eq!(history.len(), 1000);
//! let risk = evaluate(&estimator, &dataset.features()).unwrap();
//! println!("learned risk: {risk:.3}");
//! ```

mod config;
mod history;
mod observer;
mod trainer;

pub use config::{EarlyStopping, TrainingConfig};
pub use history::{LossHistory, LossRecord};
pub use observer::{
    IterationReport, NoopObserver, RecordingObserver, TracingObserver, TrainingObserver,
};
pub use trainer::{train, train_with_observer, Trainer, TrainerState};
