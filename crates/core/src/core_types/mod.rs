//! Core types and utilities

pub mod sample;
pub mod units;

pub use sample::*;
pub use units::*;
