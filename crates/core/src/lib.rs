//! Turbulence Risk Core Library
//!
//! A physics-informed estimator of flight turbulence risk over a small
//! spatio-temporal neighbourhood. A weather reading is turned into a scalar
//! heuristic risk, a short synthetic trajectory of labelled samples is built
//! around a location, and a compact tanh network is fitted to it with a loss
//! that combines the data error with an advection-style transport residual.
//!
//! ## Pipeline
//!
//! - [`weather`]: heuristic risk and synthetic sample generation
//! - [`autodiff`]: reverse-mode tape over `nalgebra` matrices, second-order capable
//! - [`model`]: the 3→H→H→1 estimator and its parameters
//! - [`physics`]: the transport residual `mean((u_t + u·u_x1 + u·u_x2)²)`
//! - [`loss`] and [`optim`]: composite objective and Adam
//! - [`training`]: the training loop, loss history and observers
//! - [`evaluate`](mod@evaluate): mean predicted risk for a batch

// Core types and utilities
pub mod core_types;
pub mod error;

// Inputs
pub mod weather;

// Estimator and its differentiation
pub mod autodiff;
pub mod model;
pub mod physics;

// Fitting
pub mod loss;
pub mod optim;
pub mod training;

pub mod evaluate;

// Re-export core types
pub use core_types::{Celsius, Dataset, FeatureVector, Hectopascals, MetersPerSecond, TrainingExample};
pub use error::{Result, RiskError};

// Re-export the pipeline
pub use evaluate::{evaluate, evaluate_dataset};
pub use model::RiskEstimator;
pub use training::{train, train_with_observer, LossHistory, LossRecord, TrainingConfig};
pub use weather::{heuristic_risk, SampleBuilder, StaticWeather, WeatherReading, WeatherSource};
