#![warn(missing_docs)]

//! Error types for the odometry library.
//!
//! This module defines the errors that can occur when constructing an
//! estimator from physical calibration constants. Once constructed, the
//! estimator itself is infallible; only malformed calibration is rejected.

use core::fmt;

/// Errors that can occur when configuring the odometry estimator.
#[derive(Debug, Clone, PartialEq)]
pub enum OdometryError {
    /// Error for invalid wheel diameter.
    /// This variant is returned when a wheel diameter is provided that is not positive.
    InvalidWheelDiameter(&'static str),
    /// Error for invalid encoder resolution.
    /// This variant is returned when a counts-per-revolution value is provided that is not positive.
    InvalidCountsPerRevolution(&'static str),
    /// Error for invalid track width.
    /// This variant is returned when a track width is provided that is not positive.
    InvalidTrackWidth(&'static str),
}

impl core::fmt::Display for OdometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OdometryError::InvalidWheelDiameter(msg) => {
                write!(f, "Invalid wheel diameter: {}", msg)
            }
            OdometryError::InvalidCountsPerRevolution(msg) => {
                write!(f, "Invalid counts per revolution: {}", msg)
            }
            OdometryError::InvalidTrackWidth(msg) => write!(f, "Invalid track width: {}", msg),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for OdometryError {}
