//! Per-iteration hooks.
//!
//! The trainer has no side effects of its own beyond the `tracing` events at
//! run start and end. Anything that wants to watch individual iterations
//! (logging, progress bars, diagnostics) implements [`TrainingObserver`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::LossRecord;
use crate::core_types::FEATURE_DIM;

/// Quantities computed during one completed iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationReport {
    /// Zero-based iteration index
    pub iteration: usize,
    /// Iteration budget of the run
    pub epochs: usize,
    /// Loss components recorded for this iteration
    pub loss: LossRecord,
    /// Mean `|∂u/∂x1|`, `|∂u/∂x2|`, `|∂u/∂t|` over the batch
    pub mean_abs_input_gradient: [f64; FEATURE_DIM],
    /// L2 norm of the parameter gradient before the optimizer step
    pub gradient_norm: f64,
}

/// Receives one report per completed iteration.
pub trait TrainingObserver {
    /// Called after the optimizer step and history append.
    fn on_iteration(&mut self, report: &IterationReport);
}

impl<F: FnMut(&IterationReport)> TrainingObserver for F {
    fn on_iteration(&mut self, report: &IterationReport) {
        self(report);
    }
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TrainingObserver for NoopObserver {
    fn on_iteration(&mut self, _report: &IterationReport) {}
}

/// Emits `tracing` events every `interval` iterations and on the last one.
#[derive(Debug, Clone, Copy)]
pub struct TracingObserver {
    interval: usize,
}

impl TracingObserver {
    /// Log every `interval` iterations (clamped to at least 1).
    #[must_use]
    pub fn new(interval: usize) -> Self {
        Self {
            interval: interval.max(1),
        }
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new(100)
    }
}

impl TrainingObserver for TracingObserver {
    fn on_iteration(&mut self, report: &IterationReport) {
        let last = report.iteration + 1 == report.epochs;
        if report.iteration.is_multiple_of(self.interval) || last {
            info!(
                "Epoch {}/{}: total={:.6}, data={:.6}, physics={:.6}",
                report.iteration + 1,
                report.epochs,
                report.loss.total,
                report.loss.data,
                report.loss.physics
            );
        }
        let [gx1, gx2, gt] = report.mean_abs_input_gradient;
        debug!(
            "Epoch {}: mean |du/dx1|={:.3e}, |du/dx2|={:.3e}, |du/dt|={:.3e}, |grad|={:.3e}",
            report.iteration + 1,
            gx1,
            gx2,
            gt,
            report.gradient_norm
        );
    }
}

/// Keeps every report in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    reports: Vec<IterationReport>,
}

impl RecordingObserver {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports received so far, in order.
    #[must_use]
    pub fn reports(&self) -> &[IterationReport] {
        &self.reports
    }
}

impl TrainingObserver for RecordingObserver {
    fn on_iteration(&mut self, report: &IterationReport) {
        self.reports.push(*report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(iteration: usize, epochs: usize) -> IterationReport {
        IterationReport {
            iteration,
            epochs,
            loss: LossRecord {
                total: 0.5,
                data: 0.25,
                physics: 0.25,
            },
            mean_abs_input_gradient: [0.0; FEATURE_DIM],
            gradient_norm: 1.0,
        }
    }

    #[test]
    fn tracing_interval_is_at_least_one() {
        let mut observer = TracingObserver::new(0);
        assert_eq!(observer.interval, 1);
        for i in 0..3 {
            observer.on_iteration(&report(i, 3));
        }
        assert_eq!(TracingObserver::default().interval, 100);
    }

    #[test]
    fn recorder_keeps_reports_in_order() {
        let mut recorder = RecordingObserver::new();
        for i in 0..4 {
            recorder.on_iteration(&report(i, 4));
        }
        let iterations: Vec<usize> = recorder.reports().iter().map(|r| r.iteration).collect();
        assert_eq!(iterations, vec![0, 1, 2, 3]);
    }
}
