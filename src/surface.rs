//! Monte Carlo resolution of a ray meeting a boundary.
//!
//! Every decision consumes uniform draws from the caller's generator, so a
//! ray traced with the same seeded generator always takes the same path.
//!
//! - [`SurfaceCondition`]: optional roughness, Lambertian scattering, thin
//!   film stack and reflectance override on a directed border
//! - [`resolve_refractive`]: reflect or transmit between two media
//! - [`resolve_mirror`]: reflect or absorb at a mirror
//! - [`accept_focal`]: quantum efficiency gates of a detector
//! - [`sample_absorption_distance`]: Beer-Lambert free path

use std::f64::consts::PI;
use std::sync::Arc;

use log::trace;
use nalgebra::Vector3;
use num_complex::Complex64;
use rand::Rng;
use rand_distr::{Distribution, Exp, StandardNormal};

use crate::error::{Result, TraceError};
use crate::fresnel::{self, Polarization};
use crate::multilayer::{Multilayer, PowerResult};
use crate::ray::PolarizationState;
use crate::role::{FocalSurface, Reflectance};
use crate::settings::MAX_FACET_ATTEMPTS;
use crate::snell;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refractive_index::RefractiveIndex;
    use crate::units::{DEG, NM};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const WL: f64 = 400.0 * NM;

    fn real(n: f64) -> Complex64 {
        Complex64::new(n, 0.0)
    }

    fn down() -> Vector3<f64> {
        Vector3::new(0.0, 0.0, -1.0)
    }

    #[test]
    fn fresnel_fraction_at_normal_incidence() {
        let mut rng = StdRng::seed_from_u64(1);
        let n = 20000;
        let reflected = (0..n)
            .filter(|_| {
                let outcome = resolve_refractive(
                    &mut rng,
                    &down(),
                    &Vector3::z(),
                    &PolarizationState::Unpolarized,
                    WL,
                    real(1.0),
                    real(1.5),
                    None,
                    true,
                )
                .unwrap();
                matches!(outcome, Outcome::Reflect(_))
            })
            .count();
        let p = 0.04;
        let sigma = (n as f64 * p * (1.0 - p)).sqrt();
        assert!(
            (reflected as f64 - n as f64 * p).abs() < 4.0 * sigma,
            "reflected: {}",
            reflected
        );
    }

    #[test]
    fn disabled_fresnel_always_refracts() {
        let mut rng = StdRng::seed_from_u64(2);
        let theta: f64 = 30.0 * DEG;
        let d = Vector3::new(theta.sin(), 0.0, -theta.cos());
        for _ in 0..100 {
            let outcome = resolve_refractive(
                &mut rng,
                &d,
                &Vector3::z(),
                &PolarizationState::Unpolarized,
                WL,
                real(1.0),
                real(1.5),
                None,
                false,
            )
            .unwrap();
            match outcome {
                Outcome::Transmit(t) => assert!((t.x - theta.sin() / 1.5).abs() < 1e-12),
                other => panic!("unexpected outcome {:?}", other),
            }
        }
    }

    #[test]
    fn total_internal_reflection_even_without_fresnel() {
        let mut rng = StdRng::seed_from_u64(3);
        let theta: f64 = 60.0 * DEG;
        let d = Vector3::new(theta.sin(), 0.0, -theta.cos());
        let outcome = resolve_refractive(
            &mut rng,
            &d,
            &Vector3::z(),
            &PolarizationState::Unpolarized,
            WL,
            real(1.5),
            real(1.0),
            None,
            false,
        )
        .unwrap();
        match outcome {
            Outcome::Reflect(r) => assert!((r - Vector3::new(d.x, 0.0, -d.z)).norm() < 1e-12),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn mirror_reflectance_and_override() {
        let mut rng = StdRng::seed_from_u64(4);
        let n = 20000;
        let count = |rng: &mut StdRng, mirror: &Reflectance, cond: Option<&SurfaceCondition>| {
            (0..n)
                .filter(|_| {
                    matches!(
                        resolve_mirror(rng, &down(), &Vector3::z(), WL, mirror, cond),
                        Outcome::Reflect(_)
                    )
                })
                .count() as f64
        };
        let reflected = count(&mut rng, &Reflectance::Constant(0.25), None);
        assert!((reflected / n as f64 - 0.25).abs() < 0.015, "reflected: {}", reflected);

        let cond = SurfaceCondition::new().with_reflectance(Reflectance::Constant(0.75));
        let reflected = count(&mut rng, &Reflectance::Constant(0.25), Some(&cond));
        assert!((reflected / n as f64 - 0.75).abs() < 0.015, "reflected: {}", reflected);

        assert_eq!(count(&mut rng, &Reflectance::default(), None), n as f64);
    }

    #[test]
    fn rough_mirror_spreads_twice_sigma() {
        let mut rng = StdRng::seed_from_u64(5);
        let sigma = 1.0 * DEG;
        let cond = SurfaceCondition::new().with_gaussian_roughness(sigma);
        let n = 20000;
        let angles: Vec<f64> = (0..n)
            .map(|_| match resolve_mirror(&mut rng, &down(), &Vector3::z(), WL, &Reflectance::default(), Some(&cond)) {
                Outcome::Reflect(r) => r.x.atan2(r.z),
                other => panic!("unexpected outcome {:?}", other),
            })
            .collect();
        let mean = angles.iter().sum::<f64>() / n as f64;
        let var = angles.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n as f64;
        let spread = var.sqrt();
        assert!((spread - 2.0 * sigma).abs() < 0.05 * 2.0 * sigma, "spread: {}", spread / DEG);
    }

    #[test]
    fn lambertian_cosine_distribution() {
        let mut rng = StdRng::seed_from_u64(6);
        let cond = SurfaceCondition::new().with_lambertian();
        let n = 20000;
        let mut sum_cos = 0.0;
        for _ in 0..n {
            match resolve_mirror(&mut rng, &down(), &Vector3::z(), WL, &Reflectance::default(), Some(&cond)) {
                Outcome::Reflect(r) => {
                    assert!(r.z > 0.0);
                    sum_cos += r.z;
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        // E[cos] = 2/3 for a cosine-weighted hemisphere
        let mean = sum_cos / n as f64;
        assert!((mean - 2.0 / 3.0).abs() < 0.01, "mean cos: {}", mean);
    }

    #[test]
    fn multilayer_probabilities() {
        let air = Arc::new(RefractiveIndex::constant(1.0, 0.0));
        let glass = Arc::new(RefractiveIndex::constant(1.5, 0.0));
        let stack = Multilayer::new(air, glass);
        let cond = SurfaceCondition::new().with_multilayer(Arc::new(stack));
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20000;
        let reflected = (0..n)
            .filter(|_| {
                matches!(
                    resolve_refractive(
                        &mut rng,
                        &down(),
                        &Vector3::z(),
                        &PolarizationState::Unpolarized,
                        WL,
                        real(1.0),
                        real(1.5),
                        Some(&cond),
                        false,
                    )
                    .unwrap(),
                    Outcome::Reflect(_)
                )
            })
            .count() as f64;
        assert!((reflected / n as f64 - 0.04).abs() < 0.006, "reflected: {}", reflected);
    }

    #[test]
    fn focal_gates_are_independent() {
        let flat = |v: f64| crate::interp::Graph1D::new(vec![(0.0, v), (1.0, v)]).unwrap();
        let focal = FocalSurface::new()
            .with_qe_lambda(flat(0.5))
            .with_qe_angle(flat(0.5));
        let mut rng = StdRng::seed_from_u64(8);
        let n = 20000;
        let accepted = (0..n)
            .filter(|_| accept_focal(&mut rng, &focal, 0.5, 0.5))
            .count() as f64;
        assert!((accepted / n as f64 - 0.25).abs() < 0.015, "accepted: {}", accepted);
        assert!(accept_focal(&mut rng, &FocalSurface::new(), 0.5, 0.5));
    }

    #[test]
    fn absorption_distance_mean() {
        let mut rng = StdRng::seed_from_u64(9);
        let n = 20000;
        let mean = (0..n)
            .map(|_| sample_absorption_distance(&mut rng, 2.0).unwrap())
            .sum::<f64>()
            / n as f64;
        assert!((mean - 2.0).abs() < 0.1, "mean: {}", mean);
        assert_eq!(
            sample_absorption_distance(&mut rng, f64::INFINITY).unwrap(),
            f64::INFINITY
        );
    }
}

/// Optical condition of the border crossed when going from one volume into
/// another. Conditions are directional.
#[derive(Debug, Clone, Default)]
pub struct SurfaceCondition {
    /// Standard deviation in radians of the facet normal tilt. Zero is smooth.
    pub gaussian_roughness: f64,
    pub lambertian: bool,
    pub multilayer: Option<Arc<Multilayer>>,
    /// Reflectance applied to reflected rays, replacing a mirror's own.
    pub reflectance: Option<Reflectance>,
}

impl SurfaceCondition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gaussian_roughness(mut self, sigma: f64) -> Self {
        self.gaussian_roughness = sigma.abs();
        self
    }

    pub fn with_lambertian(mut self) -> Self {
        self.lambertian = true;
        self
    }

    pub fn with_multilayer(mut self, multilayer: Arc<Multilayer>) -> Self {
        self.multilayer = Some(multilayer);
        self
    }

    pub fn with_reflectance(mut self, reflectance: Reflectance) -> Self {
        self.reflectance = Some(reflectance);
        self
    }
}

/// Result of a boundary decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Reflect(Vector3<f64>),
    Transmit(Vector3<f64>),
    Absorb,
}

/// Decides reflection or transmission of a ray with unit direction `d` at a
/// border between media `n1` (incident side) and `n2`.
///
/// A multilayer on the condition gives the reflect, transmit and absorb
/// probabilities. Otherwise Fresnel reflectance is used when enabled.
/// Total internal reflection always reflects.
#[allow(clippy::too_many_arguments)]
pub fn resolve_refractive<R: Rng + ?Sized>(
    rng: &mut R,
    d: &Vector3<f64>,
    normal: &Vector3<f64>,
    polarization: &PolarizationState,
    wavelength: f64,
    n1: Complex64,
    n2: Complex64,
    condition: Option<&SurfaceCondition>,
    fresnel_enabled: bool,
) -> Result<Outcome> {
    let n_in = facing(d, normal);
    let sigma = condition.map_or(0.0, |c| c.gaussian_roughness);

    for _ in 0..MAX_FACET_ATTEMPTS {
        let facet = sample_facet(rng, d, &n_in, sigma);
        let outcome = refractive_at_facet(
            rng,
            d,
            &facet,
            polarization,
            wavelength,
            n1,
            n2,
            condition,
            fresnel_enabled,
        )?;
        if leaves_correct_side(&outcome, &n_in) {
            return Ok(scatter(rng, outcome, &n_in, condition));
        }
        if sigma == 0.0 {
            break;
        }
    }
    trace!("no valid facet found, using the geometric normal");
    let outcome = refractive_at_facet(
        rng,
        d,
        &n_in,
        polarization,
        wavelength,
        n1,
        n2,
        condition,
        fresnel_enabled,
    )?;
    Ok(scatter(rng, outcome, &n_in, condition))
}

#[allow(clippy::too_many_arguments)]
fn refractive_at_facet<R: Rng + ?Sized>(
    rng: &mut R,
    d: &Vector3<f64>,
    facet: &Vector3<f64>,
    polarization: &PolarizationState,
    wavelength: f64,
    n1: Complex64,
    n2: Complex64,
    condition: Option<&SurfaceCondition>,
    fresnel_enabled: bool,
) -> Result<Outcome> {
    let cos_i = (-d.dot(facet)).clamp(0.0, 1.0);
    let theta_i = cos_i.acos();
    let sin_t = n1.re * theta_i.sin() / n2.re;
    if sin_t > 1.0 {
        trace!("total internal reflection at {:.3} rad", theta_i);
        return Ok(Outcome::Reflect(snell::reflect(d, facet)));
    }

    let s_frac = match polarization {
        PolarizationState::Unpolarized => 0.5,
        PolarizationState::Linear(e) => fresnel::s_fraction(e, d, facet),
    };

    let u: f64 = rng.random();
    let power = match condition.and_then(|c| c.multilayer.as_deref()) {
        Some(stack) => multilayer_power(stack, s_frac, theta_i, wavelength)?,
        None if fresnel_enabled => {
            let r = fresnel_reflectance(n1, n2, cos_i, s_frac);
            PowerResult {
                reflectance: r,
                transmittance: 1.0 - r,
            }
        }
        None => PowerResult {
            reflectance: 0.0,
            transmittance: 1.0,
        },
    };

    if u < power.reflectance {
        let reflected = Outcome::Reflect(snell::reflect(d, facet));
        // an override reflectance makes a second, independent draw
        if let Some(r) = condition.and_then(|c| c.reflectance.as_ref()) {
            let u: f64 = rng.random();
            if u > r.at(wavelength, theta_i) {
                return Ok(Outcome::Absorb);
            }
        }
        Ok(reflected)
    } else if u < power.reflectance + power.transmittance {
        let theta_t = snell::get_theta_t(theta_i, n1, n2)?;
        Ok(Outcome::Transmit(snell::refract(d, facet, theta_t)))
    } else {
        Ok(Outcome::Absorb)
    }
}

/// Power reflectance mixing s and p by `s_frac`, for complex media.
fn fresnel_reflectance(n1: Complex64, n2: Complex64, cos_i: f64, s_frac: f64) -> f64 {
    let cos_i = Complex64::new(cos_i, 0.0);
    let sin2_t = (n1 / n2).powi(2) * (Complex64::new(1.0, 0.0) - cos_i * cos_i);
    let mut cos_t = (Complex64::new(1.0, 0.0) - sin2_t).sqrt();
    // decaying wave in an absorbing second medium
    if (n2 * cos_t).im < 0.0 {
        cos_t = -cos_t;
    }
    let r = fresnel::refl(n1, n2, cos_i, cos_t);
    let rs = fresnel::component(&r, Polarization::S).norm_sqr();
    let rp = fresnel::component(&r, Polarization::P).norm_sqr();
    (s_frac * rs + (1.0 - s_frac) * rp).clamp(0.0, 1.0)
}

fn multilayer_power(
    stack: &Multilayer,
    s_frac: f64,
    angle: f64,
    wavelength: f64,
) -> Result<PowerResult> {
    if s_frac == 0.5 {
        return if stack.has_incoherent_layers() {
            stack.incoherent_tmm_mixed(angle, wavelength)
        } else {
            stack.coherent_tmm_mixed(angle, wavelength)
        };
    }
    let power = |pol| -> Result<PowerResult> {
        if stack.has_incoherent_layers() {
            stack.incoherent_tmm(pol, angle, wavelength)
        } else {
            Ok(stack.coherent_tmm(pol, angle, wavelength)?.power())
        }
    };
    let s = power(Polarization::S)?;
    let p = power(Polarization::P)?;
    Ok(PowerResult {
        reflectance: s_frac * s.reflectance + (1.0 - s_frac) * p.reflectance,
        transmittance: s_frac * s.transmittance + (1.0 - s_frac) * p.transmittance,
    })
}

/// Reflects at a mirror or absorbs with probability `1 - R`.
pub fn resolve_mirror<R: Rng + ?Sized>(
    rng: &mut R,
    d: &Vector3<f64>,
    normal: &Vector3<f64>,
    wavelength: f64,
    reflectance: &Reflectance,
    condition: Option<&SurfaceCondition>,
) -> Outcome {
    let n_in = facing(d, normal);
    let angle = (-d.dot(&n_in)).clamp(-1.0, 1.0).acos();
    let reflectance = condition
        .and_then(|c| c.reflectance.as_ref())
        .unwrap_or(reflectance);
    let u: f64 = rng.random();
    if u > reflectance.at(wavelength, angle) {
        return Outcome::Absorb;
    }

    let sigma = condition.map_or(0.0, |c| c.gaussian_roughness);
    let mut direction = snell::reflect(d, &n_in);
    if sigma > 0.0 {
        for _ in 0..MAX_FACET_ATTEMPTS {
            let facet = sample_facet(rng, d, &n_in, sigma);
            let candidate = snell::reflect(d, &facet);
            if candidate.dot(&n_in) > 0.0 {
                direction = candidate;
                break;
            }
        }
    }
    scatter(rng, Outcome::Reflect(direction), &n_in, condition)
}

/// Applies both quantum efficiency gates with independent draws. `angle` is
/// the incidence angle in radians.
pub fn accept_focal<R: Rng + ?Sized>(
    rng: &mut R,
    focal: &FocalSurface,
    wavelength: f64,
    angle: f64,
) -> bool {
    if let Some(qe) = &focal.qe_lambda {
        if rng.random::<f64>() >= qe.eval(wavelength) {
            return false;
        }
    }
    if let Some(qe) = &focal.qe_angle {
        if rng.random::<f64>() >= qe.eval(angle) {
            return false;
        }
    }
    true
}

/// Distance travelled before bulk absorption for absorption length `length`.
pub fn sample_absorption_distance<R: Rng + ?Sized>(rng: &mut R, length: f64) -> Result<f64> {
    if length.is_infinite() {
        return Ok(f64::INFINITY);
    }
    let exp = Exp::new(1.0 / length).map_err(|e| {
        TraceError::Numerical(format!("invalid absorption length {}: {}", length, e))
    })?;
    Ok(exp.sample(rng))
}

/// Normal oriented against the direction of travel.
fn facing(d: &Vector3<f64>, normal: &Vector3<f64>) -> Vector3<f64> {
    let n = normal.normalize();
    if d.dot(&n) > 0.0 {
        -n
    } else {
        n
    }
}

/// Two unit vectors spanning the plane perpendicular to `n`.
pub(crate) fn tangent_basis(n: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let helper = if n.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let u = n.cross(&helper).normalize();
    let v = n.cross(&u);
    (u, v)
}

/// Facet normal tilted from `n_in` by Gaussian deviates along two tangent
/// axes. Facets that face away from the ray are resampled.
fn sample_facet<R: Rng + ?Sized>(
    rng: &mut R,
    d: &Vector3<f64>,
    n_in: &Vector3<f64>,
    sigma: f64,
) -> Vector3<f64> {
    if sigma == 0.0 {
        return *n_in;
    }
    let (u, v) = tangent_basis(n_in);
    for _ in 0..MAX_FACET_ATTEMPTS {
        let g1: f64 = StandardNormal.sample(rng);
        let g2: f64 = StandardNormal.sample(rng);
        let facet = (n_in + (u * g1 + v * g2) * sigma).normalize();
        if facet.dot(d) < 0.0 {
            return facet;
        }
    }
    *n_in
}

fn leaves_correct_side(outcome: &Outcome, n_in: &Vector3<f64>) -> bool {
    match outcome {
        Outcome::Reflect(r) => r.dot(n_in) > 0.0,
        Outcome::Transmit(t) => t.dot(n_in) < 0.0,
        Outcome::Absorb => true,
    }
}

/// Replaces a reflection by a cosine-weighted direction on the incoming side
/// when the condition is Lambertian.
fn scatter<R: Rng + ?Sized>(
    rng: &mut R,
    outcome: Outcome,
    n_in: &Vector3<f64>,
    condition: Option<&SurfaceCondition>,
) -> Outcome {
    match outcome {
        Outcome::Reflect(_) if condition.is_some_and(|c| c.lambertian) => {
            Outcome::Reflect(lambertian(rng, n_in))
        }
        other => other,
    }
}

fn lambertian<R: Rng + ?Sized>(rng: &mut R, n: &Vector3<f64>) -> Vector3<f64> {
    let u1: f64 = rng.random();
    let u2: f64 = rng.random();
    let r = u1.sqrt();
    let phi = 2.0 * PI * u2;
    let (a, b) = tangent_basis(n);
    (a * (r * phi.cos()) + b * (r * phi.sin()) + n * (1.0 - u1).sqrt()).normalize()
}
