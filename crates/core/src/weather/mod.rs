//! Weather observations and the supervision they produce.
//!
//! Remote retrieval is out of scope for this crate. Observations enter through
//! the [`WeatherSource`] trait; [`StaticWeather`] serves a fixed reading for
//! the CLI and tests. From a reading the closed-form [`heuristic_risk`] is
//! computed and [`SampleBuilder`] synthesises a small labelled dataset around
//! the observation point.

mod heuristic;
mod sample_builder;

pub use heuristic::heuristic_risk;
pub use sample_builder::{SampleBuilder, REFERENCE_RISK_PROFILE};

use serde::{Deserialize, Serialize};

use crate::core_types::{Celsius, Hectopascals, MetersPerSecond};

/// Geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    /// Latitude (degrees north)
    pub latitude: f64,
    /// Longitude (degrees east)
    pub longitude: f64,
}

impl Location {
    /// Seoul City Hall, the location used by the reference scenario.
    pub const SEOUL: Location = Location::new(37.5665, 126.9780);

    /// Create a new location.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A single surface observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    /// Where the observation was taken
    pub location: Location,
    /// Mean wind speed
    pub wind_speed: MetersPerSecond,
    /// Station pressure
    pub pressure: Hectopascals,
    /// Air temperature
    pub temperature: Celsius,
}

impl WeatherReading {
    /// Heuristic turbulence risk for this reading, in [0, 1].
    #[must_use]
    pub fn heuristic_risk(&self) -> f64 {
        heuristic_risk(self.wind_speed, self.pressure, self.temperature)
    }
}

/// Provider of current observations.
///
/// Implementations return `None` when no data is available for the location;
/// callers turn that into an empty dataset rather than an error.
pub trait WeatherSource {
    /// Current observation at `location`, if the provider has one.
    fn current(&self, location: Location) -> Option<WeatherReading>;
}

/// In-memory source that always serves the same observation values.
#[derive(Debug, Clone, Default)]
pub struct StaticWeather {
    reading: Option<WeatherReading>,
}

impl StaticWeather {
    /// Serve `wind_speed`, `pressure` and `temperature` for any requested location.
    #[must_use]
    pub fn new(wind_speed: MetersPerSecond, pressure: Hectopascals, temperature: Celsius) -> Self {
        Self {
            reading: Some(WeatherReading {
                location: Location::default(),
                wind_speed,
                pressure,
                temperature,
            }),
        }
    }

    /// Source with no data at all.
    #[must_use]
    pub fn unavailable() -> Self {
        Self { reading: None }
    }
}

impl WeatherSource for StaticWeather {
    fn current(&self, location: Location) -> Option<WeatherReading> {
        self.reading
            .map(|reading| WeatherReading { location, ..reading })
    }
}
