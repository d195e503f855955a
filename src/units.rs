//! Length and angle units. Every length in the crate is expressed in metres
//! and every angle in radians, so `400.0 * NM` is a wavelength.

pub const M: f64 = 1.0;
pub const CM: f64 = 1e-2;
pub const MM: f64 = 1e-3;
pub const UM: f64 = 1e-6;
pub const NM: f64 = 1e-9;

/// Radians per degree.
pub const DEG: f64 = std::f64::consts::PI / 180.0;

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;
