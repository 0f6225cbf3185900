//! Semantic unit types for weather observations
//!
//! Newtype wrappers keep the three heuristic inputs (wind, pressure,
//! temperature) from being swapped at call sites. Each wrapper derefs to its
//! raw `f64` so arithmetic stays terse.
//!
//! # Usage
//! ```
//! use turbulence_risk_core::core_types::units::{Celsius, Hectopascals, MetersPerSecond};
//!
//! let wind = MetersPerSecond::new(12.0);
//! let pressure = Hectopascals::new(1005.0);
//! let temp = Celsius::new(18.5);
//! assert_eq!(*wind + *temp, 30.5);
//! assert!((pressure.anomaly() - (-8.0)).abs() < 1e-12);
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;

/// Compare f64 values with total ordering using Rust's built-in `total_cmp`
#[inline]
fn f64_total_cmp(a: f64, b: f64) -> Ordering {
    a.total_cmp(&b)
}

// ============================================================================
// TEMPERATURE
// ============================================================================

/// Air temperature in degrees Celsius
///
/// Deserialisation goes through [`TryFrom<f64>`], so a stored value below
/// absolute zero is rejected rather than accepted silently.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "f64")]
#[repr(transparent)]
pub struct Celsius(f64);

impl Eq for Celsius {}

impl PartialOrd for Celsius {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Celsius {
    fn cmp(&self, other: &Self) -> Ordering {
        f64_total_cmp(self.0, other.0)
    }
}

impl Deref for Celsius {
    type Target = f64;
    #[inline]
    fn deref(&self) -> &f64 {
        &self.0
    }
}

impl Celsius {
    /// Celsius to Kelvin conversion offset (0°C = 273.15 K)
    const CELSIUS_KELVIN_OFFSET: f64 = 273.15;

    /// Create a new Celsius temperature. Asserts value >= absolute zero (-273.15°C).
    #[inline]
    #[must_use]
    #[track_caller]
    pub const fn new(value: f64) -> Self {
        assert!(
            value >= -Self::CELSIUS_KELVIN_OFFSET,
            "Celsius::new: value is below absolute zero (-273.15°C)"
        );
        Celsius(value)
    }

    /// Get the raw f64 value
    #[inline]
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Celsius {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if value >= -Self::CELSIUS_KELVIN_OFFSET {
            Ok(Celsius(value))
        } else {
            Err(format!("{value} °C is below absolute zero (-273.15°C)"))
        }
    }
}

impl fmt::Display for Celsius {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}°C", self.0)
    }
}

// ============================================================================
// PRESSURE
// ============================================================================

/// Station pressure in hectopascals
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Hectopascals(f64);

impl Eq for Hectopascals {}

impl PartialOrd for Hectopascals {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Hectopascals {
    fn cmp(&self, other: &Self) -> Ordering {
        f64_total_cmp(self.0, other.0)
    }
}

impl Deref for Hectopascals {
    type Target = f64;
    #[inline]
    fn deref(&self) -> &f64 {
        &self.0
    }
}

impl Hectopascals {
    /// Reference sea-level pressure used by the risk heuristic
    pub const REFERENCE: Hectopascals = Hectopascals(1013.0);

    /// Create a new `Hectopascals` value.
    #[inline]
    #[must_use]
    pub const fn new(value: f64) -> Self {
        Hectopascals(value)
    }

    /// Deviation from [`Hectopascals::REFERENCE`]
    #[inline]
    #[must_use]
    pub fn anomaly(self) -> f64 {
        self.0 - Self::REFERENCE.0
    }

    /// Get the raw f64 value
    #[inline]
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Hectopascals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} hPa", self.0)
    }
}

// ============================================================================
// SPEED
// ============================================================================

/// Wind speed in meters per second
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MetersPerSecond(f64);

impl Eq for MetersPerSecond {}

impl PartialOrd for MetersPerSecond {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MetersPerSecond {
    fn cmp(&self, other: &Self) -> Ordering {
        f64_total_cmp(self.0, other.0)
    }
}

impl Deref for MetersPerSecond {
    type Target = f64;
    #[inline]
    fn deref(&self) -> &f64 {
        &self.0
    }
}

impl MetersPerSecond {
    /// Create a new `MetersPerSecond` value.
    #[inline]
    #[must_use]
    pub const fn new(value: f64) -> Self {
        MetersPerSecond(value)
    }

    /// Convert from km/h
    #[inline]
    #[must_use]
    pub fn from_kmh(kmh: f64) -> Self {
        MetersPerSecond(kmh / 3.6)
    }

    /// Get the raw f64 value
    #[inline]
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for MetersPerSecond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} m/s", self.0)
    }
}
