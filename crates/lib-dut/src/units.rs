//! Physical units with type safety.
//!
//! These newtypes keep device geometry, temperatures and metallization
//! resistances from being mixed up as bare `f64` values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// Number of decimals a key temperature is rounded to.
pub const TEMPERATURE_DECIMALS: i32 = 3;

/// Tolerance-based float comparison: `|a - b| <= atol + rtol * |b|`.
///
/// Asymmetric in `b`, matching the usual numerical convention.
#[inline]
pub fn is_close(a: f64, b: f64, rtol: f64, atol: f64) -> bool {
    (a - b).abs() <= atol + rtol * b.abs()
}

/// Absolute temperature in Kelvin.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Kelvin(pub f64);

impl Kelvin {
    /// Room temperature reference used when nothing else is configured.
    pub const ROOM: Self = Self(300.0);

    #[inline]
    pub fn from_celsius(celsius: f64) -> Self {
        Self(celsius + 273.15)
    }

    #[inline]
    pub fn as_celsius(&self) -> f64 {
        self.0 - 273.15
    }

    /// Round to the precision keys are compared at.
    #[inline]
    pub fn rounded(self) -> Self {
        let scale = 10f64.powi(TEMPERATURE_DECIMALS);
        Self((self.0 * scale).round() / scale)
    }

    /// Exact equality after rounding both sides.
    #[inline]
    pub fn same_as(&self, other: Kelvin) -> bool {
        self.rounded().0 == other.rounded().0
    }

    /// Tolerance-based equality (rtol 1e-5, atol 1e-8).
    #[inline]
    pub fn is_close(&self, other: Kelvin) -> bool {
        is_close(self.0, other.0, 1e-5, 1e-8)
    }
}

impl fmt::Display for Kelvin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}K", self.0)
    }
}

impl Add for Kelvin {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Kelvin {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

/// Geometric length in meters.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Meters(pub f64);

impl Meters {
    pub const ZERO: Self = Self(0.0);

    #[inline]
    pub fn from_um(um: f64) -> Self {
        Self(um * 1e-6)
    }

    #[inline]
    pub fn as_um(&self) -> f64 {
        self.0 * 1e6
    }

    /// Geometry comparison used when matching calibration structures
    /// (rtol 1e-8, atol 1e-8).
    #[inline]
    pub fn matches(&self, other: Meters) -> bool {
        is_close(self.0, other.0, 1e-8, 1e-8)
    }
}

impl Mul<f64> for Meters {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self(self.0 * rhs)
    }
}

/// Resistance in Ohms.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Ohms(pub f64);

impl Ohms {
    pub const ZERO: Self = Self(0.0);

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }
}

impl Add for Ohms {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Mul<f64> for Ohms {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self(self.0 * rhs)
    }
}
