//! Closed-form turbulence risk heuristic.
//!
//! ```text
//! risk = clip(|wind|·0.01 + |p − 1013|·0.001 + |T|·0.005, 0, 1)
//! ```
//!
//! Wind in m/s, pressure in hPa, temperature in °C.

use crate::core_types::{Celsius, Hectopascals, MetersPerSecond};

/// Weight per m/s of wind speed
const WIND_WEIGHT: f64 = 0.01;

/// Weight per hPa of deviation from 1013 hPa
const PRESSURE_WEIGHT: f64 = 0.001;

/// Weight per °C away from freezing
const TEMPERATURE_WEIGHT: f64 = 0.005;

/// Heuristic turbulence risk in [0, 1].
///
/// # Arguments
///
/// * `wind_speed` - Mean wind speed
/// * `pressure` - Station pressure
/// * `temperature` - Air temperature
#[must_use]
pub fn heuristic_risk(
    wind_speed: MetersPerSecond,
    pressure: Hectopascals,
    temperature: Celsius,
) -> f64 {
    let risk = wind_speed.abs() * WIND_WEIGHT
        + pressure.anomaly().abs() * PRESSURE_WEIGHT
        + temperature.abs() * TEMPERATURE_WEIGHT;
    risk.clamp(0.0, 1.0)
}
