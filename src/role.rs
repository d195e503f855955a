//! Optical behaviour attached to each scene volume.

use std::sync::Arc;

use num_complex::Complex64;

use crate::interp::{Graph1D, Graph2D};
use crate::refractive_index::{AbsorptionLength, RefractiveIndex};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{DEG, MM, NM};

    #[test]
    fn mirror_reflectance_tables() {
        let table = Graph1D::new(vec![(300.0 * NM, 0.1), (400.0 * NM, 0.25), (500.0 * NM, 0.6)])
            .unwrap();
        let r = Reflectance::Wavelength(table);
        assert_eq!(r.at(400.0 * NM, 0.0), 0.25);

        let mut points = Vec::new();
        for wl in [300.0, 400.0, 500.0] {
            for angle in [0.0, 45.0, 90.0] {
                let r = if wl == 400.0 && angle == 45.0 { 0.5 } else { 0.2 };
                points.push((wl * NM, angle * DEG, r));
            }
        }
        let r = Reflectance::WavelengthAngle(Graph2D::from_points(&points).unwrap());
        assert!((r.at(400.0 * NM, 45.0 * DEG) - 0.5).abs() < 1e-3);

        assert_eq!(Reflectance::Constant(1.5).at(400.0 * NM, 0.0), 1.0);
        assert_eq!(Reflectance::default().at(400.0 * NM, 0.0), 1.0);
    }

    #[test]
    fn lens_absorption_length() {
        let lens = Lens::new(Arc::new(RefractiveIndex::constant(1.5, 0.0)));
        assert_eq!(lens.absorption_length(400.0 * NM), f64::INFINITY);

        let lens = lens.with_absorption_length(AbsorptionLength::Constant(1.0 * MM));
        assert_eq!(lens.absorption_length(400.0 * NM), 1.0 * MM);

        let k = crate::refractive_index::extinction_from_absorption_length(400.0 * NM, 2.0 * MM);
        let lens = Lens::new(Arc::new(RefractiveIndex::constant(1.5, k)));
        assert!((lens.absorption_length(400.0 * NM) - 2.0 * MM).abs() < 1e-15);
    }

    #[test]
    fn media() {
        let wl = 400.0 * NM;
        assert_eq!(OpticalRole::Transparent.medium_index(wl), Some(Complex64::new(1.0, 0.0)));
        assert_eq!(OpticalRole::Obscuration.medium_index(wl), None);
        assert!(OpticalRole::Obscuration.is_terminal());
        assert!(!OpticalRole::Transparent.is_terminal());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpticalRole {
    /// Vacuum filling, e.g. the world volume.
    Transparent,
    Lens(Lens),
    Mirror(Reflectance),
    FocalSurface(FocalSurface),
    /// Blocks every ray entering it.
    Obscuration,
}

impl OpticalRole {
    /// Complex index of the medium a ray travels through inside this volume.
    /// `None` for volumes rays never propagate through.
    pub fn medium_index(&self, wavelength: f64) -> Option<Complex64> {
        match self {
            Self::Transparent => Some(Complex64::new(1.0, 0.0)),
            Self::Lens(lens) => Some(lens.index.complex_refractive_index(wavelength)),
            Self::Mirror(_) | Self::FocalSurface(_) | Self::Obscuration => None,
        }
    }

    /// True if a ray can not propagate inside this volume.
    pub fn is_terminal(&self) -> bool {
        self.medium_index(1.0).is_none()
    }
}

/// Refractive volume.
#[derive(Debug, Clone, PartialEq)]
pub struct Lens {
    pub index: Arc<RefractiveIndex>,
    /// Overrides the absorption length implied by the index.
    pub absorption: Option<AbsorptionLength>,
}

impl Lens {
    pub fn new(index: Arc<RefractiveIndex>) -> Self {
        Self {
            index,
            absorption: None,
        }
    }

    pub fn with_absorption_length(mut self, absorption: AbsorptionLength) -> Self {
        self.absorption = Some(absorption);
        self
    }

    pub fn absorption_length(&self, wavelength: f64) -> f64 {
        match &self.absorption {
            Some(length) => length.at(wavelength),
            None => self.index.absorption_length(wavelength),
        }
    }
}

/// Reflectance of a mirror surface, clamped to `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Reflectance {
    Constant(f64),
    /// Over wavelength.
    Wavelength(Graph1D),
    /// Over wavelength and incidence angle in radians.
    WavelengthAngle(Graph2D),
}

impl Default for Reflectance {
    fn default() -> Self {
        Self::Constant(1.0)
    }
}

impl Reflectance {
    pub fn at(&self, wavelength: f64, angle: f64) -> f64 {
        let r = match self {
            Self::Constant(r) => *r,
            Self::Wavelength(graph) => graph.eval(wavelength),
            Self::WavelengthAngle(graph) => graph.eval(wavelength, angle),
        };
        r.clamp(0.0, 1.0)
    }
}

/// Detecting surface with optional quantum efficiency curves. Each curve is
/// an independent acceptance gate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FocalSurface {
    /// Efficiency over wavelength.
    pub qe_lambda: Option<Graph1D>,
    /// Efficiency over incidence angle in radians.
    pub qe_angle: Option<Graph1D>,
}

impl FocalSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_qe_lambda(mut self, qe: Graph1D) -> Self {
        self.qe_lambda = Some(qe);
        self
    }

    pub fn with_qe_angle(mut self, qe: Graph1D) -> Self {
        self.qe_angle = Some(qe);
        self
    }
}
