//! Inference with a trained estimator.

use crate::core_types::{Dataset, FeatureVector};
use crate::error::{Result, RiskError};
use crate::model::RiskEstimator;

/// Mean predicted risk over `batch`.
///
/// Parameters are only read; calling this any number of times has no effect
/// on the estimator.
pub fn evaluate(estimator: &RiskEstimator, batch: &[FeatureVector]) -> Result<f64> {
    if batch.is_empty() {
        return Err(RiskError::EmptyBatch);
    }
    let predictions = estimator.forward(batch);
    Ok(predictions.iter().sum::<f64>() / predictions.len() as f64)
}

/// Mean predicted risk over the features of `dataset`.
pub fn evaluate_dataset(estimator: &RiskEstimator, dataset: &Dataset) -> Result<f64> {
    evaluate(estimator, &dataset.features())
}
