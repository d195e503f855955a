//! Solid shapes in their local frame.
//!
//! Every shape answers two questions: is a point inside it, and where does a
//! straight line cross its surface. Crossings carry the surface normal at the
//! hit point; its orientation is not significant and callers orient it along
//! the direction of travel.

use std::path::Path;

use nalgebra::{Point3, Vector3};

use crate::containment::AABB;
use crate::error::{Result, TraceError};


/// A point where a line crosses a surface, at `origin + t·dir`.
#[derive(Debug, Clone, PartialEq)]
pub struct Crossing {
    pub t: f64,
    pub normal: Vector3<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Box centred on the origin with the given half lengths.
    Box { half: Vector3<f64> },
    /// Spherical shell `rmin <= r <= rmax` (solid when `rmin == 0`).
    Sphere { rmin: f64, rmax: f64 },
    /// Cylindrical shell along z, `rmin <= r <= rmax`, `|z| <= dz`.
    Tube { rmin: f64, rmax: f64, dz: f64 },
    /// Closed triangle mesh.
    Mesh(Mesh),
}

/// Loose tolerance for points lying on a surface.
const SURFACE_TOLERANCE: f64 = 1e-12;

impl Shape {
    pub fn new_box(dx: f64, dy: f64, dz: f64) -> Result<Self> {
        if !(dx > 0.0 && dy > 0.0 && dz > 0.0) {
            return Err(TraceError::Geometry(format!(
                "box half lengths must be positive, got ({}, {}, {})",
                dx, dy, dz
            )));
        }
        Ok(Self::Box {
            half: Vector3::new(dx, dy, dz),
        })
    }

    pub fn new_sphere(rmin: f64, rmax: f64) -> Result<Self> {
        if !(rmin >= 0.0 && rmax > rmin) {
            return Err(TraceError::Geometry(format!(
                "sphere radii must satisfy 0 <= rmin < rmax, got ({}, {})",
                rmin, rmax
            )));
        }
        Ok(Self::Sphere { rmin, rmax })
    }

    pub fn new_tube(rmin: f64, rmax: f64, dz: f64) -> Result<Self> {
        if !(rmin >= 0.0 && rmax > rmin && dz > 0.0) {
            return Err(TraceError::Geometry(format!(
                "tube must satisfy 0 <= rmin < rmax and dz > 0, got ({}, {}, {})",
                rmin, rmax, dz
            )));
        }
        Ok(Self::Tube { rmin, rmax, dz })
    }

    pub fn aabb(&self) -> AABB {
        match self {
            Self::Box { half } => AABB::from_half_lengths(half),
            Self::Sphere { rmax, .. } => AABB::from_half_lengths(&Vector3::new(*rmax, *rmax, *rmax)),
            Self::Tube { rmax, dz, .. } => AABB::from_half_lengths(&Vector3::new(*rmax, *rmax, *dz)),
            Self::Mesh(mesh) => mesh.aabb.clone(),
        }
    }

    pub fn contains(&self, p: &Point3<f64>) -> bool {
        let tol = SURFACE_TOLERANCE;
        match self {
            Self::Box { half } => (0..3).all(|i| p[i].abs() <= half[i] + tol),
            Self::Sphere { rmin, rmax } => {
                let r = p.coords.norm();
                r >= rmin - tol && r <= rmax + tol
            }
            Self::Tube { rmin, rmax, dz } => {
                let r = p.x.hypot(p.y);
                r >= rmin - tol && r <= rmax + tol && p.z.abs() <= dz + tol
            }
            Self::Mesh(mesh) => mesh.contains(p),
        }
    }

    /// Every crossing of the line `p + t·d` with the surface, for any sign of `t`.
    pub fn crossings(&self, p: &Point3<f64>, d: &Vector3<f64>) -> Vec<Crossing> {
        let mut out = Vec::new();
        match self {
            Self::Box { half } => {
                for axis in 0..3 {
                    if d[axis] == 0.0 {
                        continue;
                    }
                    for sign in [-1.0, 1.0] {
                        let t = (sign * half[axis] - p[axis]) / d[axis];
                        let q = p + d * t;
                        let inside = (0..3)
                            .filter(|&j| j != axis)
                            .all(|j| q[j].abs() <= half[j] + SURFACE_TOLERANCE);
                        if inside {
                            let mut normal = Vector3::zeros();
                            normal[axis] = sign;
                            out.push(Crossing { t, normal });
                        }
                    }
                }
            }
            Self::Sphere { rmin, rmax } => {
                for r in [*rmin, *rmax] {
                    if r <= 0.0 {
                        continue;
                    }
                    for t in solve_quadratic(d.norm_squared(), 2.0 * p.coords.dot(d), p.coords.norm_squared() - r * r) {
                        let q = p + d * t;
                        out.push(Crossing {
                            t,
                            normal: q.coords / r,
                        });
                    }
                }
            }
            Self::Tube { rmin, rmax, dz } => {
                let a = d.x * d.x + d.y * d.y;
                for r in [*rmin, *rmax] {
                    if r <= 0.0 || a == 0.0 {
                        continue;
                    }
                    let b = 2.0 * (p.x * d.x + p.y * d.y);
                    let c = p.x * p.x + p.y * p.y - r * r;
                    for t in solve_quadratic(a, b, c) {
                        let q = p + d * t;
                        if q.z.abs() <= dz + SURFACE_TOLERANCE {
                            out.push(Crossing {
                                t,
                                normal: Vector3::new(q.x / r, q.y / r, 0.0),
                            });
                        }
                    }
                }
                if d.z != 0.0 {
                    for sign in [-1.0, 1.0] {
                        let t = (sign * dz - p.z) / d.z;
                        let q = p + d * t;
                        let r = q.x.hypot(q.y);
                        if r >= rmin - SURFACE_TOLERANCE && r <= rmax + SURFACE_TOLERANCE {
                            out.push(Crossing {
                                t,
                                normal: Vector3::new(0.0, 0.0, sign),
                            });
                        }
                    }
                }
            }
            Self::Mesh(mesh) => mesh.crossings(p, d, &mut out),
        }
        out
    }
}

fn solve_quadratic(a: f64, b: f64, c: f64) -> Vec<f64> {
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 || a == 0.0 {
        return Vec::new();
    }
    let sq = disc.sqrt();
    // numerically stable pair of roots
    let q = -0.5 * (b + b.signum() * sq);
    if q == 0.0 {
        return vec![0.0];
    }
    let (t0, t1) = (q / a, c / q);
    if t0 <= t1 {
        vec![t0, t1]
    } else {
        vec![t1, t0]
    }
}

/// Closed triangle mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    triangles: Vec<[Point3<f64>; 3]>,
    aabb: AABB,
}

impl Mesh {
    pub fn new(triangles: Vec<[Point3<f64>; 3]>) -> Result<Self> {
        if triangles.len() < 4 {
            return Err(TraceError::Geometry(format!(
                "a closed mesh needs at least 4 triangles, got {}",
                triangles.len()
            )));
        }
        if let Some(i) = triangles
            .iter()
            .position(|[a, b, c]| (b - a).cross(&(c - a)).norm() < 1e-15)
        {
            return Err(TraceError::Geometry(format!("triangle {} is degenerate", i)));
        }
        let aabb = AABB::from_points(triangles.iter().flatten());
        Ok(Self { triangles, aabb })
    }

    /// Loads every model of a Wavefront OBJ file into one mesh, triangulating
    /// polygonal faces.
    pub fn from_obj<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };
        let (models, _) = tobj::load_obj(path, &options).map_err(|e| {
            TraceError::Geometry(format!("failed to load OBJ file {}: {}", path.display(), e))
        })?;

        let mut triangles = Vec::new();
        for model in &models {
            let mesh = &model.mesh;
            let vertex = |i: u32| {
                let i = i as usize * 3;
                Point3::new(
                    mesh.positions[i] as f64,
                    mesh.positions[i + 1] as f64,
                    mesh.positions[i + 2] as f64,
                )
            };
            for face in mesh.indices.chunks_exact(3) {
                triangles.push([vertex(face[0]), vertex(face[1]), vertex(face[2])]);
            }
        }
        Self::new(triangles)
    }

    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    fn crossings(&self, p: &Point3<f64>, d: &Vector3<f64>, out: &mut Vec<Crossing>) {
        for [a, b, c] in &self.triangles {
            // Moller-Trumbore
            let e1 = b - a;
            let e2 = c - a;
            let h = d.cross(&e2);
            let det = e1.dot(&h);
            if det.abs() < 1e-300 {
                continue;
            }
            let inv = 1.0 / det;
            let s = p - a;
            let u = inv * s.dot(&h);
            if !(-SURFACE_TOLERANCE..=1.0 + SURFACE_TOLERANCE).contains(&u) {
                continue;
            }
            let q = s.cross(&e1);
            let v = inv * d.dot(&q);
            if v < -SURFACE_TOLERANCE || u + v > 1.0 + SURFACE_TOLERANCE {
                continue;
            }
            out.push(Crossing {
                t: inv * e2.dot(&q),
                normal: e1.cross(&e2).normalize(),
            });
        }
    }

    fn contains(&self, p: &Point3<f64>) -> bool {
        if !self.aabb.contains_aabb(&AABB {
            min: *p,
            max: *p,
        }) {
            return false;
        }
        // parity along a direction unlikely to graze edges
        let dir = Vector3::new(0.5773, 0.5779, 0.5768).normalize();
        let mut crossings = Vec::new();
        self.crossings(p, &dir, &mut crossings);
        crossings.iter().filter(|c| c.t > 0.0).count() % 2 == 1
    }
}
