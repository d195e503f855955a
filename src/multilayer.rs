//! Thin-film stacks solved with the transfer-matrix method.
//!
//! A [`Multilayer`] is an ordered list of layers between two semi-infinite
//! media: `top`, the inserted layers, then `bottom`. Light is incident from
//! the top medium.
//!
//! - Coherent layers interfere. [`coh_tmm`] chains 2x2 characteristic
//!   matrices built from the Fresnel amplitude coefficients and the phase
//!   thickness of each layer.
//! - Incoherent layers only attenuate. [`inc_tmm`] splits the stack into
//!   coherent sub-stacks separated by incoherent layers, solves each sub-stack
//!   in both directions and combines the power coefficients as an incoherent
//!   series including multiple internal reflections.
//!
//! Both follow the conventions of Byrnes, "Multilayer optical calculations"
//! (arXiv:1603.02720): indices are `n + ik`, forward waves decay towards the
//! bottom, and angles are complex inside absorbing media.

use std::f64::consts::PI;
use std::sync::Arc;

use log::debug;
use nalgebra::Matrix2;
use ndarray::{Array1, Array2};
use num_complex::Complex64;
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{Result, TraceError};
use crate::fresnel::{self, Polarization};
use crate::interp::Graph2D;
use crate::refractive_index::RefractiveIndex;


/// Complex amplitude and power coefficients of a coherent calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TmmResult {
    pub r: Complex64,
    pub t: Complex64,
    pub reflectance: f64,
    pub transmittance: f64,
}

impl TmmResult {
    pub fn power(&self) -> PowerResult {
        PowerResult {
            reflectance: self.reflectance,
            transmittance: self.transmittance,
        }
    }
}

/// Reflected and transmitted power fractions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PowerResult {
    pub reflectance: f64,
    pub transmittance: f64,
}

impl PowerResult {
    pub fn absorptance(&self) -> f64 {
        (1.0 - self.reflectance - self.transmittance).max(0.0)
    }

    fn average(a: PowerResult, b: PowerResult) -> PowerResult {
        PowerResult {
            reflectance: (a.reflectance + b.reflectance) / 2.0,
            transmittance: (a.transmittance + b.transmittance) / 2.0,
        }
    }
}

fn is_forward_angle(n: Complex64, theta: Complex64) -> bool {
    let ncostheta = n * theta.cos();
    if ncostheta.im.abs() > 100.0 * f64::EPSILON {
        ncostheta.im > 0.0
    } else {
        ncostheta.re > 0.0
    }
}

/// Propagation angle in every layer from the conserved `n sinθ`. The first
/// and last angles are chosen to describe forward-travelling waves.
fn list_snell(n_list: &[Complex64], th0: Complex64) -> Vec<Complex64> {
    let kx = n_list[0] * th0.sin();
    let mut angles: Vec<Complex64> = n_list.iter().map(|&n| (kx / n).asin()).collect();
    let last = angles.len() - 1;
    if !is_forward_angle(n_list[0], angles[0]) {
        angles[0] = PI - angles[0];
    }
    if !is_forward_angle(n_list[last], angles[last]) {
        angles[last] = PI - angles[last];
    }
    angles
}

fn interface_coefficients(
    pol: Polarization,
    n_i: Complex64,
    n_f: Complex64,
    cos_i: Complex64,
    cos_f: Complex64,
) -> (Complex64, Complex64) {
    let r = fresnel::component(&fresnel::refl(n_i, n_f, cos_i, cos_f), pol);
    let t = fresnel::component(&fresnel::refr(n_i, n_f, cos_i, cos_f), pol);
    (r, t)
}

/// Transmitted power fraction for amplitude `t` between semi-infinite media.
fn transmittance_from_t(
    pol: Polarization,
    t: Complex64,
    n_i: Complex64,
    n_f: Complex64,
    cos_i: Complex64,
    cos_f: Complex64,
) -> f64 {
    match pol {
        Polarization::S => t.norm_sqr() * (n_f * cos_f).re / (n_i * cos_i).re,
        Polarization::P => t.norm_sqr() * (n_f * cos_f.conj()).re / (n_i * cos_i.conj()).re,
    }
}

fn interface_power(
    pol: Polarization,
    n_i: Complex64,
    n_f: Complex64,
    th_i: Complex64,
    th_f: Complex64,
) -> PowerResult {
    let (cos_i, cos_f) = (th_i.cos(), th_f.cos());
    let (r, t) = interface_coefficients(pol, n_i, n_f, cos_i, cos_f);
    PowerResult {
        reflectance: r.norm_sqr(),
        transmittance: transmittance_from_t(pol, t, n_i, n_f, cos_i, cos_f),
    }
}

fn check_stack(n_list: &[Complex64], d_list: &[f64], th0: Complex64) -> Result<()> {
    let num = n_list.len();
    if num < 2 || d_list.len() != num {
        return Err(TraceError::Configuration(format!(
            "a stack needs at least 2 layers and one thickness per layer, got {} indices and {} thicknesses",
            num,
            d_list.len()
        )));
    }
    if d_list[0].is_finite() || d_list[num - 1].is_finite() {
        return Err(TraceError::Configuration(
            "the first and last layers must be semi-infinite".to_string(),
        ));
    }
    if (n_list[0] * th0.sin()).im.abs() > 100.0 * f64::EPSILON || !is_forward_angle(n_list[0], th0)
    {
        return Err(TraceError::Numerical(format!(
            "incidence angle {} is not a forward angle in medium {}",
            th0, n_list[0]
        )));
    }
    Ok(())
}

/// Coherent transfer-matrix solution of a stack. `d_list` must start and end
/// with infinite thicknesses; `th0` is the angle in the first medium.
pub fn coh_tmm(
    pol: Polarization,
    n_list: &[Complex64],
    d_list: &[f64],
    th0: Complex64,
    wavelength: f64,
) -> Result<TmmResult> {
    check_stack(n_list, d_list, th0)?;
    let num = n_list.len();
    let last = num - 1;
    let th_list = list_snell(n_list, th0);
    let cos_list: Vec<Complex64> = th_list.iter().map(|th| th.cos()).collect();

    let one = Complex64::new(1.0, 0.0);
    let zero = Complex64::new(0.0, 0.0);
    let j = Complex64::i();

    let (r01, t01) = interface_coefficients(pol, n_list[0], n_list[1], cos_list[0], cos_list[1]);
    let mut mtilde = Matrix2::new(one, r01, r01, one).map(|x| x / t01);

    for i in 1..last {
        let kz = 2.0 * PI * n_list[i] * cos_list[i] / wavelength;
        let mut delta = kz * d_list[i];
        // opaque layers: cap the attenuation to keep the matrices finite
        if delta.im > 35.0 {
            delta = Complex64::new(delta.re, 35.0);
        }
        let (r, t) =
            interface_coefficients(pol, n_list[i], n_list[i + 1], cos_list[i], cos_list[i + 1]);
        let phase = Matrix2::new((-j * delta).exp(), zero, zero, (j * delta).exp());
        let m = (phase * Matrix2::new(one, r, r, one)).map(|x| x / t);
        mtilde *= m;
    }

    let r = mtilde[(1, 0)] / mtilde[(0, 0)];
    let t = one / mtilde[(0, 0)];
    Ok(TmmResult {
        r,
        t,
        reflectance: r.norm_sqr(),
        transmittance: transmittance_from_t(
            pol,
            t,
            n_list[0],
            n_list[last],
            cos_list[0],
            cos_list[last],
        ),
    })
}

/// Incoherent transfer-matrix solution. `coherent[i]` marks layers that take
/// part in interference; the first and last layers are always incoherent.
pub fn inc_tmm(
    pol: Polarization,
    n_list: &[Complex64],
    d_list: &[f64],
    coherent: &[bool],
    th0: Complex64,
    wavelength: f64,
) -> Result<PowerResult> {
    check_stack(n_list, d_list, th0)?;
    let num = n_list.len();
    if coherent.len() != num {
        return Err(TraceError::Configuration(format!(
            "{} coherence flags for {} layers",
            coherent.len(),
            num
        )));
    }
    let th_list = list_snell(n_list, th0);

    // indices of incoherent layers in the full stack
    let incoherent: Vec<usize> = (0..num)
        .filter(|&i| i == 0 || i == num - 1 || !coherent[i])
        .collect();
    let num_inc = incoherent.len();

    let mut p_list = vec![1.0; num_inc];
    for (inc, &i) in incoherent.iter().enumerate().take(num_inc - 1).skip(1) {
        let decay = (n_list[i] * th_list[i].cos()).im;
        p_list[inc] = (-4.0 * PI * d_list[i] * decay / wavelength).exp().max(1e-30);
    }

    // forward[k]: from incoherent layer k into k+1, backward[k]: from k+1 into k
    let mut forward = Vec::with_capacity(num_inc - 1);
    let mut backward = Vec::with_capacity(num_inc - 1);
    for pair in incoherent.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if b == a + 1 {
            forward.push(interface_power(pol, n_list[a], n_list[b], th_list[a], th_list[b]));
            backward.push(interface_power(pol, n_list[b], n_list[a], th_list[b], th_list[a]));
        } else {
            let n_stack = &n_list[a..=b];
            let mut d_stack = d_list[a..=b].to_vec();
            d_stack[0] = f64::INFINITY;
            let last = d_stack.len() - 1;
            d_stack[last] = f64::INFINITY;
            forward.push(coh_tmm(pol, n_stack, &d_stack, th_list[a], wavelength)?.power());

            let n_rev: Vec<Complex64> = n_stack.iter().rev().copied().collect();
            let d_rev: Vec<f64> = d_stack.iter().rev().copied().collect();
            backward.push(coh_tmm(pol, &n_rev, &d_rev, th_list[b], wavelength)?.power());
        }
    }

    let step = |k: usize| -> Matrix2<f64> {
        let (f, b) = (forward[k], backward[k]);
        Matrix2::new(
            1.0,
            -b.reflectance,
            f.reflectance,
            b.transmittance * f.transmittance - b.reflectance * f.reflectance,
        ) / f.transmittance
    };

    let mut ltilde = step(0);
    for k in 1..num_inc - 1 {
        let attenuation = Matrix2::new(1.0 / p_list[k], 0.0, 0.0, p_list[k]);
        ltilde *= attenuation * step(k);
    }

    Ok(PowerResult {
        reflectance: ltilde[(1, 0)] / ltilde[(0, 0)],
        transmittance: 1.0 / ltilde[(0, 0)],
    })
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub index: Arc<RefractiveIndex>,
    pub thickness: f64,
    pub coherent: bool,
}

/// Bilinear lookup of polarization-averaged `(R, T)` over wavelength × angle.
#[derive(Debug, Clone)]
struct TmmTable {
    reflectance: Graph2D,
    transmittance: Graph2D,
}

#[derive(Debug, Clone)]
pub struct Multilayer {
    layers: Vec<Layer>,
    table: Option<TmmTable>,
}

impl Multilayer {
    /// An interface between the semi-infinite `top` and `bottom` media.
    pub fn new(top: Arc<RefractiveIndex>, bottom: Arc<RefractiveIndex>) -> Self {
        let boundary = |index| Layer {
            index,
            thickness: f64::INFINITY,
            coherent: false,
        };
        Self {
            layers: vec![boundary(top), boundary(bottom)],
            table: None,
        }
    }

    /// Adds a coherent layer directly above the bottom medium.
    pub fn insert_layer(&mut self, index: Arc<RefractiveIndex>, thickness: f64) -> Result<()> {
        self.insert(index, thickness, true)
    }

    /// Adds an incoherent (thick) layer directly above the bottom medium.
    pub fn insert_incoherent_layer(
        &mut self,
        index: Arc<RefractiveIndex>,
        thickness: f64,
    ) -> Result<()> {
        self.insert(index, thickness, false)
    }

    fn insert(&mut self, index: Arc<RefractiveIndex>, thickness: f64, coherent: bool) -> Result<()> {
        validate_thickness(thickness)?;
        let position = self.layers.len() - 1;
        self.layers.insert(
            position,
            Layer {
                index,
                thickness,
                coherent,
            },
        );
        self.table = None;
        Ok(())
    }

    /// Changes the thickness of inner layer `i` (1 ..= num_layers - 2).
    pub fn change_thickness(&mut self, i: usize, thickness: f64) -> Result<()> {
        if i == 0 || i + 1 >= self.layers.len() {
            return Err(TraceError::Configuration(format!(
                "layer {} is not an inner layer of a {}-layer stack",
                i,
                self.layers.len()
            )));
        }
        validate_thickness(thickness)?;
        self.layers[i].thickness = thickness;
        self.table = None;
        Ok(())
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// True if any inner layer is incoherent.
    pub fn has_incoherent_layers(&self) -> bool {
        let n = self.layers.len();
        self.layers[1..n - 1].iter().any(|l| !l.coherent)
    }

    pub fn top(&self) -> &Arc<RefractiveIndex> {
        &self.layers[0].index
    }

    pub fn bottom(&self) -> &Arc<RefractiveIndex> {
        &self.layers[self.layers.len() - 1].index
    }

    /// The same stack seen from the bottom medium.
    pub fn reversed(&self) -> Self {
        Self {
            layers: self.layers.iter().rev().cloned().collect(),
            table: None,
        }
    }

    fn indices_at(&self, wavelength: f64) -> Vec<Complex64> {
        self.layers
            .iter()
            .map(|l| l.index.complex_refractive_index(wavelength))
            .collect()
    }

    fn thicknesses(&self) -> Vec<f64> {
        self.layers.iter().map(|l| l.thickness).collect()
    }

    /// Treats every layer as coherent. `angle` is measured in the top medium.
    pub fn coherent_tmm(&self, pol: Polarization, angle: f64, wavelength: f64) -> Result<TmmResult> {
        coh_tmm(
            pol,
            &self.indices_at(wavelength),
            &self.thicknesses(),
            Complex64::new(angle, 0.0),
            wavelength,
        )
    }

    /// Honours the coherence flag of each layer.
    pub fn incoherent_tmm(
        &self,
        pol: Polarization,
        angle: f64,
        wavelength: f64,
    ) -> Result<PowerResult> {
        let coherent: Vec<bool> = self.layers.iter().map(|l| l.coherent).collect();
        inc_tmm(
            pol,
            &self.indices_at(wavelength),
            &self.thicknesses(),
            &coherent,
            Complex64::new(angle, 0.0),
            wavelength,
        )
    }

    /// Unpolarized coherent result `((R_s + R_p)/2, (T_s + T_p)/2)`. Uses the
    /// precomputed table when one covers `(wavelength, angle)`.
    pub fn coherent_tmm_mixed(&self, angle: f64, wavelength: f64) -> Result<PowerResult> {
        if let Some(table) = &self.table {
            if table.reflectance.contains(wavelength, angle) {
                return Ok(PowerResult {
                    reflectance: table.reflectance.eval(wavelength, angle),
                    transmittance: table.transmittance.eval(wavelength, angle),
                });
            }
        }
        self.coherent_tmm_mixed_exact(angle, wavelength)
    }

    fn coherent_tmm_mixed_exact(&self, angle: f64, wavelength: f64) -> Result<PowerResult> {
        let s = self.coherent_tmm(Polarization::S, angle, wavelength)?;
        let p = self.coherent_tmm(Polarization::P, angle, wavelength)?;
        Ok(PowerResult::average(s.power(), p.power()))
    }

    pub fn incoherent_tmm_mixed(&self, angle: f64, wavelength: f64) -> Result<PowerResult> {
        let s = self.incoherent_tmm(Polarization::S, angle, wavelength)?;
        let p = self.incoherent_tmm(Polarization::P, angle, wavelength)?;
        Ok(PowerResult::average(s, p))
    }

    /// Coherent results for many wavelengths at a fixed angle, in input order.
    pub fn coherent_tmm_wavelengths(
        &self,
        pol: Polarization,
        angle: f64,
        wavelengths: &[f64],
    ) -> Result<Vec<TmmResult>> {
        wavelengths
            .par_iter()
            .map(|&wl| self.coherent_tmm(pol, angle, wl))
            .collect()
    }

    /// Coherent results for many angles at a fixed wavelength, in input order.
    pub fn coherent_tmm_angles(
        &self,
        pol: Polarization,
        angles: &[f64],
        wavelength: f64,
    ) -> Result<Vec<TmmResult>> {
        angles
            .par_iter()
            .map(|&angle| self.coherent_tmm(pol, angle, wavelength))
            .collect()
    }

    pub fn coherent_tmm_mixed_wavelengths(
        &self,
        angle: f64,
        wavelengths: &[f64],
    ) -> Result<Vec<PowerResult>> {
        wavelengths
            .par_iter()
            .map(|&wl| self.coherent_tmm_mixed(angle, wl))
            .collect()
    }

    pub fn coherent_tmm_mixed_angles(
        &self,
        angles: &[f64],
        wavelength: f64,
    ) -> Result<Vec<PowerResult>> {
        angles
            .par_iter()
            .map(|&angle| self.coherent_tmm_mixed(angle, wavelength))
            .collect()
    }

    /// Tabulates the unpolarized coherent result on a regular
    /// `n_wavelengths × n_angles` grid. Later [`Self::coherent_tmm_mixed`]
    /// calls inside the grid interpolate bilinearly instead of solving the
    /// stack. The table is discarded whenever the stack changes.
    pub fn pre_calculate_tmm(
        &mut self,
        n_wavelengths: usize,
        wavelength_min: f64,
        wavelength_max: f64,
        n_angles: usize,
        angle_min: f64,
        angle_max: f64,
    ) -> Result<()> {
        if n_wavelengths < 2 || n_angles < 2 {
            return Err(TraceError::Numerical(format!(
                "TMM table needs at least 2 samples per axis, got {}x{}",
                n_wavelengths, n_angles
            )));
        }
        if wavelength_min >= wavelength_max || angle_min >= angle_max {
            return Err(TraceError::Configuration(
                "TMM table ranges must be increasing".to_string(),
            ));
        }

        let wavelengths = Array1::linspace(wavelength_min, wavelength_max, n_wavelengths);
        let angles = Array1::linspace(angle_min, angle_max, n_angles);

        let values: Vec<PowerResult> = (0..n_wavelengths * n_angles)
            .into_par_iter()
            .map(|idx| {
                let (i, j) = (idx / n_angles, idx % n_angles);
                self.coherent_tmm_mixed_exact(angles[j], wavelengths[i])
            })
            .collect::<Result<_>>()?;

        let reflectance =
            Array2::from_shape_fn((n_wavelengths, n_angles), |(i, j)| values[i * n_angles + j].reflectance);
        let transmittance =
            Array2::from_shape_fn((n_wavelengths, n_angles), |(i, j)| values[i * n_angles + j].transmittance);

        self.table = Some(TmmTable {
            reflectance: Graph2D::new(wavelengths.to_vec(), angles.to_vec(), reflectance)?,
            transmittance: Graph2D::new(wavelengths.to_vec(), angles.to_vec(), transmittance)?,
        });
        debug!(
            "precalculated TMM table: {} wavelengths x {} angles",
            n_wavelengths, n_angles
        );
        Ok(())
    }

    pub fn has_table(&self) -> bool {
        self.table.is_some()
    }

    pub fn clear_table(&mut self) {
        self.table = None;
    }
}

fn validate_thickness(thickness: f64) -> Result<()> {
    if !thickness.is_finite() || thickness < 0.0 {
        return Err(TraceError::Configuration(format!(
            "layer thickness must be finite and non-negative, got {}",
            thickness
        )));
    }
    Ok(())
}
