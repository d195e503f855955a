//! Snell's law in scalar and vector form.
//!
//! - [`get_theta_t`]: transmitted angle for complex refractive indices
//!   (generalized Snell's law, Macke 1996). Reduces to `asin(n1 sinθ/n2)` for
//!   real indices.
//! - [`refract`] / [`reflect`]: outgoing directions for a unit direction and a
//!   unit surface normal.

use nalgebra::Vector3;
use num_complex::Complex64;

use crate::error::{Result, TraceError};


/// Transmitted angle for complex refractive indices `m1` (incident side) and
/// `m2`.
///
/// **Context**: In an absorbing medium the refracted wave is inhomogeneous,
/// so `n1 sinθi = n2 sinθt` no longer holds with the real parts alone. Lenses
/// with finite absorption length still need a real propagation direction.
///
/// **How it Works**: Follows Macke (1996). Each index is written as
/// `n(1 + iκ)`, the pair is reduced to a relative index and relative
/// absorption, and the effective real index of the transmitted wave is solved
/// for. Identical indices return `theta_i` untouched. Returns
/// [`TraceError::Numerical`] beyond the critical angle or if no real angle
/// exists.
///
/// # Example
/// ```rust
/// use num_complex::Complex64;
/// use optrace::snell::get_theta_t;
///
/// let theta_t = get_theta_t(0.5, Complex64::new(1.0, 0.0), Complex64::new(1.5, 0.0)).unwrap();
/// assert!((theta_t - (0.5f64.sin() / 1.5).asin()).abs() < 1e-12);
/// ```
pub fn get_theta_t(theta_i: f64, m1: Complex64, m2: Complex64) -> Result<f64> {
    if m1 == m2 {
        return Ok(theta_i);
    }
    if m1.re * theta_i.sin() > m2.re {
        return Err(TraceError::Numerical(format!(
            "theta_i = {} is beyond the critical angle from {} into {}",
            theta_i, m1, m2
        )));
    }

    let kappa_i = m1.im / m1.re;
    let kappa_t = m2.im / m2.re;
    let kappa = (kappa_t - kappa_i) / (1.0 + kappa_i * kappa_t);
    let n = m2.re / m1.re * (1.0 + kappa_i * kappa_t) / (1.0 + kappa_i * kappa_i);

    let n2 = n * n;
    let kappa2 = kappa * kappa;
    let norm = (1.0 + kappa2).powi(2);
    let sin2 = theta_i.sin().powi(2);

    let re = 1.0 - (1.0 - kappa2) / (n2 * norm) * sin2;
    let im = 2.0 * kappa / (n2 * norm) * sin2;
    let modulus = re.hypot(im);
    let half_arg = (re / modulus).acos() / 2.0;

    let scale = n2 * norm / (1.0 + kappa * kappa_t).powi(2);
    let damping = (half_arg.cos() - kappa_t * half_arg.sin()).powi(2);
    let effective_index = (sin2 + scale * modulus * damping).sqrt();

    let theta_t = (theta_i.sin() / effective_index).asin();
    if theta_t.is_nan() {
        return Err(TraceError::Numerical(format!(
            "no real transmitted angle for theta_i = {}, m1 = {}, m2 = {}",
            theta_i, m1, m2
        )));
    }
    Ok(theta_t)
}

/// Refracted direction for unit direction `d` at a surface with unit normal
/// `normal`, given the transmitted angle `theta_t`. The tangential part of `d`
/// is rescaled to `sin(theta_t)` and the normal part keeps the side `d` was
/// travelling towards.
pub fn refract(d: &Vector3<f64>, normal: &Vector3<f64>, theta_t: f64) -> Vector3<f64> {
    // orient the normal along the direction of travel
    let n = if d.dot(normal) < 0.0 { -normal } else { *normal };
    let cos_i = d.dot(&n).min(1.0);
    let tangential = d - n * cos_i;
    let sin_i = tangential.norm();
    if sin_i < 1e-12 {
        return *d;
    }
    (tangential * (theta_t.sin() / sin_i) + n * theta_t.cos()).normalize()
}

/// Specular reflection of `d` about `normal`.
pub fn reflect(d: &Vector3<f64>, normal: &Vector3<f64>) -> Vector3<f64> {
    (d - normal * (2.0 * d.dot(normal))).normalize()
}
