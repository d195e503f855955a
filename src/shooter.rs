//! Initial ray bundles.
//!
//! Every bundle is generated in a local frame with rays travelling along +z
//! and then moved into the world by `placement`. Ray ids count up from zero.

use std::f64::consts::PI;

use nalgebra::{Isometry3, Point3, Vector3};
use rand::Rng;
use rand_distr::{Distribution, UnitDisc, UnitSphere};

use crate::error::{Result, TraceError};
use crate::ray::Ray;


fn check(condition: bool, message: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(TraceError::Configuration(message.to_string()))
    }
}

fn make_ray(id: usize, wavelength: f64, local: Point3<f64>, dir: Vector3<f64>, placement: &Isometry3<f64>) -> Ray {
    Ray::new(
        id,
        wavelength,
        placement.transform_point(&local),
        placement.transform_vector(&dir),
        0.0,
    )
}

/// A ray at the centre plus `nr` concentric rings out to `rmax`, ring `i`
/// (from 1) holding `nphi·i` rays.
pub fn circle(wavelength: f64, rmax: f64, nr: usize, nphi: usize, placement: &Isometry3<f64>) -> Result<Vec<Ray>> {
    check(rmax >= 0.0 && nr >= 1 && nphi >= 1, "circle needs rmax >= 0, nr >= 1 and nphi >= 1")?;
    let mut rays = vec![make_ray(0, wavelength, Point3::origin(), Vector3::z(), placement)];
    for i in 1..=nr {
        let r = rmax * i as f64 / nr as f64;
        let count = nphi * i;
        for j in 0..count {
            let phi = 2.0 * PI * j as f64 / count as f64;
            let local = Point3::new(r * phi.cos(), r * phi.sin(), 0.0);
            rays.push(make_ray(rays.len(), wavelength, local, Vector3::z(), placement));
        }
    }
    Ok(rays)
}

/// `nx × ny` grid covering a `dx × dy` rectangle centred on the origin.
pub fn rectangle(
    wavelength: f64,
    dx: f64,
    dy: f64,
    nx: usize,
    ny: usize,
    placement: &Isometry3<f64>,
) -> Result<Vec<Ray>> {
    check(dx >= 0.0 && dy >= 0.0 && nx >= 1 && ny >= 1, "rectangle needs dx, dy >= 0 and nx, ny >= 1")?;
    let axis = |d: f64, n: usize, i: usize| {
        if n == 1 {
            0.0
        } else {
            -d / 2.0 + d * i as f64 / (n - 1) as f64
        }
    };
    let mut rays = Vec::with_capacity(nx * ny);
    for i in 0..nx {
        for j in 0..ny {
            let local = Point3::new(axis(dx, nx, i), axis(dy, ny, j), 0.0);
            rays.push(make_ray(rays.len(), wavelength, local, Vector3::z(), placement));
        }
    }
    Ok(rays)
}

pub fn square(wavelength: f64, d: f64, n: usize, placement: &Isometry3<f64>) -> Result<Vec<Ray>> {
    rectangle(wavelength, d, d, n, n, placement)
}

/// `n` rays uniformly inside a disc of radius `rmax`.
pub fn random_circle<R: Rng + ?Sized>(
    wavelength: f64,
    rmax: f64,
    n: usize,
    placement: &Isometry3<f64>,
    rng: &mut R,
) -> Result<Vec<Ray>> {
    check(rmax >= 0.0, "random circle needs rmax >= 0")?;
    Ok((0..n)
        .map(|id| {
            let [x, y]: [f64; 2] = UnitDisc.sample(rng);
            make_ray(id, wavelength, Point3::new(x * rmax, y * rmax, 0.0), Vector3::z(), placement)
        })
        .collect())
}

/// `n` rays from the origin aimed at uniform points inside a disc of radius
/// `r` at height `d`.
pub fn random_cone<R: Rng + ?Sized>(
    wavelength: f64,
    r: f64,
    d: f64,
    n: usize,
    placement: &Isometry3<f64>,
    rng: &mut R,
) -> Result<Vec<Ray>> {
    check(r >= 0.0 && d != 0.0, "random cone needs r >= 0 and a non-zero height")?;
    Ok((0..n)
        .map(|id| {
            let [x, y]: [f64; 2] = UnitDisc.sample(rng);
            let goal = Vector3::new(x * r, y * r, d);
            make_ray(id, wavelength, Point3::origin(), goal, placement)
        })
        .collect())
}

/// `n` rays uniformly inside a `dx × dy` rectangle.
pub fn random_rectangle<R: Rng + ?Sized>(
    wavelength: f64,
    dx: f64,
    dy: f64,
    n: usize,
    placement: &Isometry3<f64>,
    rng: &mut R,
) -> Result<Vec<Ray>> {
    check(dx >= 0.0 && dy >= 0.0, "random rectangle needs dx, dy >= 0")?;
    Ok((0..n)
        .map(|id| {
            let x = (rng.random::<f64>() - 0.5) * dx;
            let y = (rng.random::<f64>() - 0.5) * dy;
            make_ray(id, wavelength, Point3::new(x, y, 0.0), Vector3::z(), placement)
        })
        .collect())
}

pub fn random_square<R: Rng + ?Sized>(
    wavelength: f64,
    d: f64,
    n: usize,
    placement: &Isometry3<f64>,
    rng: &mut R,
) -> Result<Vec<Ray>> {
    random_rectangle(wavelength, d, d, n, placement, rng)
}

/// `n` rays from the origin in isotropic directions.
pub fn random_sphere<R: Rng + ?Sized>(
    wavelength: f64,
    n: usize,
    placement: &Isometry3<f64>,
    rng: &mut R,
) -> Result<Vec<Ray>> {
    Ok((0..n)
        .map(|id| {
            let [x, y, z]: [f64; 3] = UnitSphere.sample(rng);
            make_ray(id, wavelength, Point3::origin(), Vector3::new(x, y, z), placement)
        })
        .collect())
}

/// `n` rays from the origin spread uniformly over the solid angle within
/// `theta` radians of +z.
pub fn random_spherical_cone<R: Rng + ?Sized>(
    wavelength: f64,
    n: usize,
    theta: f64,
    placement: &Isometry3<f64>,
    rng: &mut R,
) -> Result<Vec<Ray>> {
    check((0.0..=PI).contains(&theta), "spherical cone needs 0 <= theta <= pi")?;
    let cos_max = theta.cos();
    Ok((0..n)
        .map(|id| {
            let cos_t = cos_max + (1.0 - cos_max) * rng.random::<f64>();
            let sin_t = (1.0 - cos_t * cos_t).sqrt();
            let phi = 2.0 * PI * rng.random::<f64>();
            let dir = Vector3::new(sin_t * phi.cos(), sin_t * phi.sin(), cos_t);
            make_ray(id, wavelength, Point3::origin(), dir, placement)
        })
        .collect())
}
