//! Fresnel equations at a planar interface.
//!
//! Amplitude coefficients are returned as diagonal matrices in the
//! `(p, s)` basis so they can multiply a field amplitude directly, and the
//! same coefficients drive the thin-film transfer matrices. Cosines are
//! complex so that evanescent and absorbing media are handled uniformly.

use nalgebra::{Matrix2, Vector2, Vector3};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_incidence_reflectance() {
        let (rs, rp) = reflectance(1.0, 1.5, 1.0).unwrap();
        assert!((rs - 0.04).abs() < 1e-12, "rs: {}", rs);
        assert!((rp - 0.04).abs() < 1e-12, "rp: {}", rp);

        let (rs, _) = reflectance(3.0, 1.0, 1.0).unwrap();
        assert!((rs - 0.25).abs() < 1e-12, "rs: {}", rs);
    }

    #[test]
    fn brewster_angle() {
        let theta_b = 1.5f64.atan();
        let (rs, rp) = reflectance(1.0, 1.5, theta_b.cos()).unwrap();
        assert!(rp < 1e-12, "rp: {}", rp);
        assert!(rs > 0.1);
    }

    #[test]
    fn total_internal_reflection() {
        // critical angle of 1.5 -> 1.0 is ~41.8 deg
        assert!(reflectance(1.5, 1.0, 45f64.to_radians().cos()).is_none());
        assert!(reflectance(1.5, 1.0, 40f64.to_radians().cos()).is_some());
    }

    #[test]
    fn energy_conservation() {
        let n1 = Complex64::new(1.0, 0.0);
        let n2 = Complex64::new(1.5, 0.0);
        let cos_i = Complex64::new(30f64.to_radians().cos(), 0.0);
        let sin_t = 30f64.to_radians().sin() / 1.5;
        let cos_t = Complex64::new((1.0 - sin_t * sin_t).sqrt(), 0.0);
        let r = refl(n1, n2, cos_i, cos_t);
        let t = refr(n1, n2, cos_i, cos_t);
        // s: T = |t|^2 Re(n2 cos_t)/Re(n1 cos_i)
        let ts = t[(1, 1)].norm_sqr() * (n2 * cos_t).re / (n1 * cos_i).re;
        assert!((r[(1, 1)].norm_sqr() + ts - 1.0).abs() < 1e-12);
        let tp = t[(0, 0)].norm_sqr() * (n2 * cos_t.conj()).re / (n1 * cos_i.conj()).re;
        assert!((r[(0, 0)].norm_sqr() + tp - 1.0).abs() < 1e-12);
    }

    #[test]
    fn linear_polarization_mixing() {
        let d = Vector3::new(0.0, 0.0, -1.0);
        let normal = Vector3::new(1.0, 0.0, 1.0).normalize();
        // s direction is along y for this plane of incidence
        let s_pol = Vector3::y();
        let p_pol = d.cross(&s_pol);
        assert!((s_fraction(&s_pol, &d, &normal) - 1.0).abs() < 1e-12);
        assert!(s_fraction(&p_pol, &d, &normal).abs() < 1e-12);
        // normal incidence has no plane of incidence
        assert_eq!(s_fraction(&s_pol, &d, &Vector3::z()), 0.5);
    }
}

/// Polarization component relative to the plane of incidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    /// Electric field perpendicular to the plane of incidence (TE).
    S,
    /// Electric field parallel to the plane of incidence (TM).
    P,
}

/// Fresnel reflection amplitude coefficients `diag(r_p, r_s)` for light going
/// from `n1` into `n2`.
///
/// **Context**: A ray meeting an uncoated border between two media splits its
/// power between a reflected and a refracted ray. How much goes each way
/// depends on the polarization, the angle and both indices.
///
/// **How it Works**: Evaluates the Fresnel formulas with complex indices and
/// complex cosines, so the same expression covers absorbing media and the
/// evanescent side of total internal reflection. The p coefficient sits in
/// the first diagonal slot and the s coefficient in the second, matching the
/// layout the thin-film transfer matrices expect.
///
/// # Example
/// ```rust
/// use num_complex::Complex64;
/// use optrace::fresnel;
///
/// let one = Complex64::new(1.0, 0.0);
/// let glass = Complex64::new(1.5, 0.0);
/// let r = fresnel::refl(one, glass, one, one);
/// assert!((r[(1, 1)].norm_sqr() - 0.04).abs() < 1e-12);
/// ```
pub fn refl(
    n1: Complex64,
    n2: Complex64,
    cos_i: Complex64,
    cos_t: Complex64,
) -> Matrix2<Complex64> {
    let f11 = (n2 * cos_i - n1 * cos_t) / (n1 * cos_t + n2 * cos_i);
    let f22 = (n1 * cos_i - n2 * cos_t) / (n1 * cos_i + n2 * cos_t);
    Matrix2::from_diagonal(&Vector2::new(f11, f22))
}

/// Fresnel transmission amplitude coefficients `diag(t_p, t_s)` for light
/// going from `n1` into `n2`.
///
/// **Context**: The transmitted amplitude is needed wherever field, not
/// power, is propagated through a border, most notably inside a multilayer
/// stack where successive interfaces interfere.
///
/// **How it Works**: Same layout and conventions as [`refl`]. Power
/// transmittance additionally needs the ratio of `n cos θ` on both sides,
/// which callers apply themselves.
pub fn refr(
    n1: Complex64,
    n2: Complex64,
    cos_i: Complex64,
    cos_t: Complex64,
) -> Matrix2<Complex64> {
    let f11 = (2.0 * n1 * cos_i) / (n1 * cos_t + n2 * cos_i);
    let f22 = (2.0 * n1 * cos_i) / (n1 * cos_i + n2 * cos_t);
    Matrix2::from_diagonal(&Vector2::new(f11, f22))
}

/// Picks the coefficient for one polarization out of a `diag(p, s)` matrix.
pub fn component(coeffs: &Matrix2<Complex64>, pol: Polarization) -> Complex64 {
    match pol {
        Polarization::P => coeffs[(0, 0)],
        Polarization::S => coeffs[(1, 1)],
    }
}

/// Power reflectances `(R_s, R_p)` between two real indices for an incidence
/// cosine `cos_i`. Returns `None` under total internal reflection.
pub fn reflectance(n1: f64, n2: f64, cos_i: f64) -> Option<(f64, f64)> {
    let cos_i = cos_i.abs().min(1.0);
    let sin_i = (1.0 - cos_i * cos_i).sqrt();
    let sin_t = n1 * sin_i / n2;
    if sin_t > 1.0 {
        return None;
    }
    let cos_t = (1.0 - sin_t * sin_t).sqrt();
    let r = refl(
        Complex64::new(n1, 0.0),
        Complex64::new(n2, 0.0),
        Complex64::new(cos_i, 0.0),
        Complex64::new(cos_t, 0.0),
    );
    Some((r[(1, 1)].norm_sqr(), r[(0, 0)].norm_sqr()))
}

/// Fraction of the power of a linearly polarized ray (field `e`, direction
/// `d`) carried by the s component at a surface with normal `normal`. Equal
/// to one half when the plane of incidence is undefined.
pub fn s_fraction(e: &Vector3<f64>, d: &Vector3<f64>, normal: &Vector3<f64>) -> f64 {
    let s_dir = d.cross(normal);
    let norm = s_dir.norm();
    if norm < 1e-12 {
        return 0.5;
    }
    let e_norm = e.norm();
    if e_norm == 0.0 {
        return 0.5;
    }
    (e.dot(&s_dir) / (norm * e_norm)).powi(2)
}
