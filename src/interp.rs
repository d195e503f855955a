//! Tabulated curves with deterministic linear interpolation.
//!
//! - [`Graph1D`]: piecewise-linear curve `y(x)`, clamped to the end values
//!   outside the tabulated range.
//! - [`Graph2D`]: bilinear surface `z(x, y)` on a regular (not necessarily
//!   uniform) grid, clamped on every edge.
//!
//! Both are used for wavelength dependent refractive indices, mirror
//! reflectances and detector quantum efficiencies.

use itertools::Itertools;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};


/// Piecewise-linear curve over a sorted abscissa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph1D {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Graph1D {
    /// Builds a curve from `(x, y)` pairs in any order. At least two distinct
    /// abscissae are required.
    pub fn new(mut points: Vec<(f64, f64)>) -> Result<Self> {
        if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(TraceError::Numerical(
                "interpolation table contains non-finite values".to_string(),
            ));
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        points.dedup_by(|a, b| a.0 == b.0);
        if points.len() < 2 {
            return Err(TraceError::Numerical(format!(
                "interpolation table needs at least 2 distinct points, got {}",
                points.len()
            )));
        }
        let (x, y) = points.into_iter().unzip();
        Ok(Self { x, y })
    }

    pub fn from_slices(x: &[f64], y: &[f64]) -> Result<Self> {
        if x.len() != y.len() {
            return Err(TraceError::Numerical(format!(
                "abscissa and ordinate lengths differ: {} vs {}",
                x.len(),
                y.len()
            )));
        }
        Self::new(x.iter().copied().zip(y.iter().copied()).collect())
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn x_range(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }

    /// Linear interpolation, clamped to the end values.
    pub fn eval(&self, x: f64) -> f64 {
        let (i, t) = bracket(&self.x, x);
        if t == 0.0 {
            self.y[i]
        } else {
            self.y[i] + t * (self.y[i + 1] - self.y[i])
        }
    }

    /// Applies `f` to every ordinate.
    pub fn map_y(&self, f: impl Fn(f64, f64) -> f64) -> Self {
        let y = self.points().map(|(x, y)| f(x, y)).collect();
        Self {
            x: self.x.clone(),
            y,
        }
    }
}

/// Bilinear surface on a rectilinear grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph2D {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Array2<f64>,
}

impl Graph2D {
    /// Builds a surface from grid axes and a `(x.len(), y.len())` array.
    pub fn new(x: Vec<f64>, y: Vec<f64>, z: Array2<f64>) -> Result<Self> {
        if x.len() < 2 || y.len() < 2 {
            return Err(TraceError::Numerical(format!(
                "2D interpolation table needs at least 2x2 points, got {}x{}",
                x.len(),
                y.len()
            )));
        }
        if z.dim() != (x.len(), y.len()) {
            return Err(TraceError::Numerical(format!(
                "2D table shape {:?} does not match axes {}x{}",
                z.dim(),
                x.len(),
                y.len()
            )));
        }
        if x.iter().tuple_windows().any(|(a, b)| a >= b)
            || y.iter().tuple_windows().any(|(a, b)| a >= b)
        {
            return Err(TraceError::Numerical(
                "2D table axes must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { x, y, z })
    }

    /// Builds a surface from scattered `(x, y, z)` samples that together cover
    /// every node of the grid spanned by their unique `x` and `y` values.
    pub fn from_points(points: &[(f64, f64, f64)]) -> Result<Self> {
        let mut xs: Vec<f64> = points.iter().map(|p| p.0).collect();
        let mut ys: Vec<f64> = points.iter().map(|p| p.1).collect();
        xs.sort_by(f64::total_cmp);
        ys.sort_by(f64::total_cmp);
        xs.dedup();
        ys.dedup();
        if xs.len() < 2 || ys.len() < 2 {
            return Err(TraceError::Numerical(format!(
                "2D interpolation table needs at least 2x2 points, got {}x{}",
                xs.len(),
                ys.len()
            )));
        }

        let mut z = Array2::from_elem((xs.len(), ys.len()), f64::NAN);
        for &(px, py, pz) in points {
            let i = xs.partition_point(|&v| v < px);
            let j = ys.partition_point(|&v| v < py);
            z[[i, j]] = pz;
        }
        if z.iter().any(|v| v.is_nan()) {
            return Err(TraceError::Numerical(
                "2D interpolation samples do not form a complete grid".to_string(),
            ));
        }
        Self::new(xs, ys, z)
    }

    pub fn x_range(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }

    pub fn y_range(&self) -> (f64, f64) {
        (self.y[0], self.y[self.y.len() - 1])
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (x0, x1) = self.x_range();
        let (y0, y1) = self.y_range();
        x >= x0 && x <= x1 && y >= y0 && y <= y1
    }

    pub fn eval(&self, x: f64, y: f64) -> f64 {
        let (i, tx) = bracket(&self.x, x);
        let (j, ty) = bracket(&self.y, y);
        let i1 = (i + 1).min(self.x.len() - 1);
        let j1 = (j + 1).min(self.y.len() - 1);
        let z00 = self.z[[i, j]];
        let z10 = self.z[[i1, j]];
        let z01 = self.z[[i, j1]];
        let z11 = self.z[[i1, j1]];
        let lo = z00 + tx * (z10 - z00);
        let hi = z01 + tx * (z11 - z01);
        lo + ty * (hi - lo)
    }
}

/// Index of the lower bracketing node and the fractional position inside the
/// bracket. Positions outside the axis clamp to an end node with `t == 0`.
fn bracket(axis: &[f64], v: f64) -> (usize, f64) {
    let last = axis.len() - 1;
    if v <= axis[0] {
        return (0, 0.0);
    }
    if v >= axis[last] {
        return (last, 0.0);
    }
    let i = axis.partition_point(|&a| a <= v) - 1;
    let t = (v - axis[i]) / (axis[i + 1] - axis[i]);
    (i, t)
}
