//! Synthesis of labelled training samples around an observation point.

use tracing::{debug, warn};

use super::{Location, WeatherReading, WeatherSource};
use crate::core_types::{Dataset, FeatureVector, TrainingExample};

/// Multipliers applied to the base heuristic risk, one per synthesised sample.
pub const REFERENCE_RISK_PROFILE: [f64; 7] = [1.0, 1.2, 0.8, 1.1, 0.9, 1.3, 0.7];

/// Builds a small trajectory of samples from a single heuristic risk value.
///
/// Sample `i` sits at `(lat + step·i, lon + step·i)` with time index `i` and
/// target `risk · profile[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuilder {
    origin: Location,
    step_degrees: f64,
    profile: Vec<f64>,
}

impl SampleBuilder {
    /// Default spacing between successive samples, in degrees.
    pub const DEFAULT_STEP_DEGREES: f64 = 0.1;

    /// Builder anchored at `origin` with the reference risk profile.
    #[must_use]
    pub fn new(origin: Location) -> Self {
        Self {
            origin,
            step_degrees: Self::DEFAULT_STEP_DEGREES,
            profile: REFERENCE_RISK_PROFILE.to_vec(),
        }
    }

    /// Override the spacing between samples.
    pub fn with_step(mut self, step_degrees: f64) -> Self {
        self.step_degrees = step_degrees;
        self
    }

    /// Override the risk multipliers; the dataset has one sample per entry.
    pub fn with_profile(mut self, profile: Vec<f64>) -> Self {
        self.profile = profile;
        self
    }

    /// Anchor location.
    #[must_use]
    pub fn origin(&self) -> Location {
        self.origin
    }

    /// Synthesise the dataset for a base risk value.
    #[must_use]
    pub fn build(&self, base_risk: f64) -> Dataset {
        self.profile
            .iter()
            .enumerate()
            .map(|(i, factor)| {
                let offset = self.step_degrees * i as f64;
                let features = FeatureVector::new(
                    self.origin.latitude + offset,
                    self.origin.longitude + offset,
                    i as f64,
                );
                TrainingExample::new(features, base_risk * factor)
            })
            .collect()
    }

    /// Synthesise from an observation, labelling with its heuristic risk.
    #[must_use]
    pub fn from_reading(&self, reading: &WeatherReading) -> Dataset {
        let risk = reading.heuristic_risk();
        debug!(
            "Building samples from reading: wind={}, pressure={}, temp={}, risk={:.4}",
            reading.wind_speed, reading.pressure, reading.temperature, risk
        );
        self.build(risk)
    }

    /// Query `source` at the origin; an absent reading yields an empty dataset.
    #[must_use]
    pub fn from_source(&self, source: &dyn WeatherSource) -> Dataset {
        if let Some(reading) = source.current(self.origin) {
            self.from_reading(&reading)
        } else {
            warn!(
                "No weather data for ({:.4}, {:.4})",
                self.origin.latitude, self.origin.longitude
            );
            Dataset::empty()
        }
    }
}

impl Default for SampleBuilder {
    fn default() -> Self {
        Self::new(Location::SEOUL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{Celsius, Hectopascals, MetersPerSecond};
    use crate::weather::StaticWeather;
    use approx::assert_relative_eq;

    #[test]
    fn reference_trajectory() {
        let ds = SampleBuilder::default().build(0.42);
        assert_eq!(ds.len(), 7);

        let first = ds.examples()[0];
        assert_eq!(first.features, FeatureVector::new(37.5665, 126.9780, 0.0));
        assert_relative_eq!(first.target, 0.42);

        let second = ds.examples()[1];
        assert_relative_eq!(second.features.x1, 37.6665, epsilon = 1e-9);
        assert_relative_eq!(second.features.x2, 127.0780, epsilon = 1e-9);
        assert_eq!(second.features.t, 1.0);
        assert_relative_eq!(second.target, 1.2 * 0.42, epsilon = 1e-12);

        let targets: Vec<f64> = ds.examples().iter().map(|e| e.target).collect();
        for (target, factor) in targets.iter().zip(REFERENCE_RISK_PROFILE) {
            assert_relative_eq!(*target, 0.42 * factor, epsilon = 1e-12);
        }
    }

    #[test]
    fn custom_profile_controls_size() {
        let ds = SampleBuilder::new(Location::new(0.0, 0.0))
            .with_step(1.0)
            .with_profile(vec![1.0, 2.0])
            .build(0.5);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.examples()[1].features, FeatureVector::new(1.0, 1.0, 1.0));
        assert_eq!(ds.examples()[1].target, 1.0);
    }

    #[test]
    fn missing_source_data_gives_empty_dataset() {
        let ds = SampleBuilder::default().from_source(&StaticWeather::unavailable());
        assert!(ds.is_empty());
    }

    #[test]
    fn source_reading_labels_with_heuristic() {
        let source = StaticWeather::new(
            MetersPerSecond::new(10.0),
            Hectopascals::new(993.0),
            Celsius::new(20.0),
        );
        let ds = SampleBuilder::default().from_source(&source);
        assert_eq!(ds.len(), 7);
        assert_relative_eq!(ds.examples()[0].target, 0.22, epsilon = 1e-12);
    }
}
