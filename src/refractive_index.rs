//! Wavelength dependent complex refractive indices.
//!
//! A [`RefractiveIndex`] returns `n(λ)`, `k(λ)` and `n + ik` for any
//! wavelength given in metres. Dispersion formulas take micrometres
//! internally, the way glass catalogs publish their coefficients.
//!
//! - Constant `(n, k)`
//! - Tabulated `n(λ)` with optional `k(λ)`, linearly interpolated and clamped
//! - Sellmeier, Cauchy and Schott dispersion formulas
//! - Weighted mixture of two other indices
//!
//! Absorption in bulk media can also be given directly as an
//! [`AbsorptionLength`], which is what the tracer samples against.

use std::f64::consts::PI;
use std::sync::Arc;

use log::debug;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};
use crate::interp::Graph1D;
use crate::units::{NM, UM};


/// Fraunhofer C line (H-alpha).
pub const LINE_C: f64 = 656.2725 * NM;
/// Helium d line.
pub const LINE_D: f64 = 587.5618 * NM;
/// Fraunhofer F line (H-beta).
pub const LINE_F: f64 = 486.1327 * NM;

/// Extinction coefficient giving a Beer-Lambert absorption length `length`.
pub fn extinction_from_absorption_length(wavelength: f64, length: f64) -> f64 {
    wavelength / (4.0 * PI * length)
}

/// Beer-Lambert absorption length for extinction coefficient `k`. Infinite when
/// `k` is not positive.
pub fn absorption_length(wavelength: f64, k: f64) -> f64 {
    if k > 0.0 {
        wavelength / (4.0 * PI * k)
    } else {
        f64::INFINITY
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefractiveIndex {
    Constant {
        n: f64,
        k: f64,
    },
    Tabulated {
        n: Graph1D,
        k: Option<Graph1D>,
    },
    Sellmeier(Sellmeier),
    /// `n = A + B/λ² + C/λ⁴`, λ in µm.
    Cauchy {
        a: f64,
        b: f64,
        c: f64,
    },
    /// `n² = A0 + A1λ² + A2λ⁻² + A3λ⁻⁴ + A4λ⁻⁶ + A5λ⁻⁸`, λ in µm.
    Schott {
        a: [f64; 6],
    },
    Mixed {
        first: Arc<RefractiveIndex>,
        second: Arc<RefractiveIndex>,
        weights: (f64, f64),
    },
}

impl RefractiveIndex {
    pub fn constant(n: f64, k: f64) -> Self {
        Self::Constant { n, k }
    }

    pub fn vacuum() -> Self {
        Self::Constant { n: 1.0, k: 0.0 }
    }

    /// Constant index whose `k` gives absorption length `length` at `wavelength`.
    pub fn constant_with_absorption_length(n: f64, length: f64, wavelength: f64) -> Self {
        Self::Constant {
            n,
            k: extinction_from_absorption_length(wavelength, length),
        }
    }

    pub fn tabulated(n: Graph1D, k: Option<Graph1D>) -> Self {
        Self::Tabulated { n, k }
    }

    /// Tabulated index whose extinction coefficient is derived from a table of
    /// absorption lengths at each of its wavelengths.
    pub fn tabulated_with_absorption_lengths(n: Graph1D, lengths: &Graph1D) -> Self {
        let k = lengths.map_y(extinction_from_absorption_length);
        Self::Tabulated { n, k: Some(k) }
    }

    /// Linear blend of two indices. The weights need not sum to one: they are
    /// stored as fractions `w1/(w1+w2)` and `w2/(w1+w2)`, so `(1, 1)` and
    /// `(0.5, 0.5)` give the same mixture.
    pub fn mixed(
        first: Arc<RefractiveIndex>,
        w1: f64,
        second: Arc<RefractiveIndex>,
        w2: f64,
    ) -> Result<Self> {
        if w1 < 0.0 || w2 < 0.0 || !w1.is_finite() || !w2.is_finite() {
            return Err(TraceError::Configuration(format!(
                "mixture weights must be finite and non-negative, got ({}, {})",
                w1, w2
            )));
        }
        let total = w1 + w2;
        if total <= 0.0 {
            return Err(TraceError::Configuration(format!(
                "mixture weights must have a positive sum, got ({}, {})",
                w1, w2
            )));
        }
        Ok(Self::Mixed {
            first,
            second,
            weights: (w1 / total, w2 / total),
        })
    }

    pub fn refractive_index(&self, wavelength: f64) -> f64 {
        match self {
            Self::Constant { n, .. } => *n,
            Self::Tabulated { n, .. } => n.eval(wavelength),
            Self::Sellmeier(s) => s.index(wavelength),
            Self::Cauchy { a, b, c } => {
                let l2 = (wavelength / UM).powi(2);
                a + b / l2 + c / (l2 * l2)
            }
            Self::Schott { a } => {
                let l2 = (wavelength / UM).powi(2);
                let n2 = a[0]
                    + a[1] * l2
                    + a[2] / l2
                    + a[3] / l2.powi(2)
                    + a[4] / l2.powi(3)
                    + a[5] / l2.powi(4);
                n2.sqrt()
            }
            Self::Mixed {
                first,
                second,
                weights,
            } => {
                weights.0 * first.refractive_index(wavelength)
                    + weights.1 * second.refractive_index(wavelength)
            }
        }
    }

    pub fn extinction_coefficient(&self, wavelength: f64) -> f64 {
        match self {
            Self::Constant { k, .. } => *k,
            Self::Tabulated { k, .. } => k.as_ref().map_or(0.0, |k| k.eval(wavelength)),
            Self::Sellmeier(_) | Self::Cauchy { .. } | Self::Schott { .. } => 0.0,
            Self::Mixed {
                first,
                second,
                weights,
            } => {
                weights.0 * first.extinction_coefficient(wavelength)
                    + weights.1 * second.extinction_coefficient(wavelength)
            }
        }
    }

    pub fn complex_refractive_index(&self, wavelength: f64) -> Complex64 {
        Complex64::new(
            self.refractive_index(wavelength),
            self.extinction_coefficient(wavelength),
        )
    }

    pub fn absorption_length(&self, wavelength: f64) -> f64 {
        absorption_length(wavelength, self.extinction_coefficient(wavelength))
    }

    /// Abbe number `(n_d − 1)/(n_F − n_C)`. Infinite for a non-dispersive index.
    pub fn abbe_number(&self) -> f64 {
        let nd = self.refractive_index(LINE_D);
        let nf = self.refractive_index(LINE_F);
        let nc = self.refractive_index(LINE_C);
        if nf == nc {
            return f64::INFINITY;
        }
        (nd - 1.0) / (nf - nc)
    }
}

/// Sellmeier dispersion `n² = 1 + Σ Bi·λ²/(λ² − Ci)` with λ in µm and Ci in µm².
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sellmeier {
    pub b: [f64; 3],
    pub c: [f64; 3],
}

const FIT_MAX_ITERATIONS: usize = 5000;
const FIT_RELATIVE_TOLERANCE: f64 = 1e-10;

impl Sellmeier {
    pub fn new(b: [f64; 3], c: [f64; 3]) -> Self {
        Self { b, c }
    }

    fn params(&self) -> [f64; 6] {
        [self.b[0], self.b[1], self.b[2], self.c[0], self.c[1], self.c[2]]
    }

    fn from_params(p: &DVector<f64>) -> Self {
        Self {
            b: [p[0], p[1], p[2]],
            c: [p[3], p[4], p[5]],
        }
    }

    pub fn index(&self, wavelength: f64) -> f64 {
        let l2 = (wavelength / UM).powi(2);
        let n2 = 1.0
            + self
                .b
                .iter()
                .zip(self.c.iter())
                .map(|(b, c)| b * l2 / (l2 - c))
                .sum::<f64>();
        n2.sqrt()
    }

    /// Least-squares fit of the six coefficients to measured `(λ, n)` pairs,
    /// starting from the current coefficients (Levenberg-Marquardt with an
    /// analytic Jacobian). On error the coefficients are left unchanged.
    pub fn fit_data(&mut self, data: &[(f64, f64)]) -> Result<()> {
        if data.len() < 6 {
            return Err(TraceError::Numerical(format!(
                "Sellmeier fit needs at least 6 points, got {}",
                data.len()
            )));
        }

        let rows = data.len();
        let mut p = DVector::from_row_slice(&self.params());
        let residuals = |p: &DVector<f64>| -> DVector<f64> {
            let s = Self::from_params(p);
            DVector::from_iterator(rows, data.iter().map(|&(wl, n)| s.index(wl) - n))
        };

        let mut r = residuals(&p);
        let mut cost = r.norm_squared();
        if !cost.is_finite() {
            return Err(TraceError::Numerical(
                "Sellmeier fit started from coefficients with a pole in the data range".to_string(),
            ));
        }
        let mut damping = 1e-3;

        for iteration in 0..FIT_MAX_ITERATIONS {
            let jac = self.jacobian(&p, data);
            let jtj = jac.transpose() * &jac;
            let grad = jac.transpose() * &r;

            let mut lhs = jtj.clone();
            for i in 0..6 {
                lhs[(i, i)] += damping * jtj[(i, i)].max(1e-30);
            }
            let Some(step) = lhs.lu().solve(&(-grad)) else {
                damping *= 10.0;
                continue;
            };

            let trial = &p + step;
            let trial_r = residuals(&trial);
            let trial_cost = trial_r.norm_squared();

            if trial_cost.is_finite() && trial_cost < cost {
                let reduction = (cost - trial_cost) / cost;
                p = trial;
                r = trial_r;
                cost = trial_cost;
                damping = (damping / 10.0).max(1e-12);
                if reduction < FIT_RELATIVE_TOLERANCE || cost == 0.0 {
                    debug!("Sellmeier fit converged after {} iterations", iteration + 1);
                    *self = Self::from_params(&p);
                    return Ok(());
                }
            } else {
                damping *= 10.0;
                if damping > 1e16 {
                    // no downhill step left: stationary point
                    debug!("Sellmeier fit stalled after {} iterations", iteration + 1);
                    *self = Self::from_params(&p);
                    return Ok(());
                }
            }
        }

        Err(TraceError::Numerical(format!(
            "Sellmeier fit did not converge in {} iterations (residual {:e})",
            FIT_MAX_ITERATIONS, cost
        )))
    }

    fn jacobian(&self, p: &DVector<f64>, data: &[(f64, f64)]) -> DMatrix<f64> {
        let s = Self::from_params(p);
        let mut jac = DMatrix::zeros(data.len(), 6);
        for (row, &(wl, _)) in data.iter().enumerate() {
            let l2 = (wl / UM).powi(2);
            let n = s.index(wl);
            for i in 0..3 {
                let denom = l2 - s.c[i];
                jac[(row, i)] = l2 / denom / (2.0 * n);
                jac[(row, 3 + i)] = s.b[i] * l2 / (denom * denom) / (2.0 * n);
            }
        }
        jac
    }
}

/// Absorption length of a bulk medium, either constant or tabulated over
/// wavelength. Interpolation is done on the length itself.
#[derive(Debug, Clone, PartialEq)]
pub enum AbsorptionLength {
    Constant(f64),
    Tabulated(Graph1D),
}

impl AbsorptionLength {
    pub fn tabulated(points: Vec<(f64, f64)>) -> Result<Self> {
        Ok(Self::Tabulated(Graph1D::new(points)?))
    }

    pub fn at(&self, wavelength: f64) -> f64 {
        match self {
            Self::Constant(length) => *length,
            Self::Tabulated(graph) => graph.eval(wavelength),
        }
    }
}
