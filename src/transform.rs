use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};


/// Z-Y-Z Euler angles in radians: rotate by `gamma` about z, then `beta`
/// about y, then `alpha` about z.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Euler {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl Euler {
    pub fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self { alpha, beta, gamma }
    }

    pub fn from_degrees(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self::new(alpha.to_radians(), beta.to_radians(), gamma.to_radians())
    }

    pub fn rotation(&self) -> UnitQuaternion<f64> {
        let z = Vector3::z_axis();
        let y = Vector3::y_axis();
        UnitQuaternion::from_axis_angle(&z, self.alpha)
            * UnitQuaternion::from_axis_angle(&y, self.beta)
            * UnitQuaternion::from_axis_angle(&z, self.gamma)
    }

    /// Rigid placement: this rotation followed by `translation`.
    pub fn placement(&self, translation: Vector3<f64>) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(translation), self.rotation())
    }
}

/// Placement by translation only.
pub fn translation(x: f64, y: f64, z: f64) -> Isometry3<f64> {
    Isometry3::translation(x, y, z)
}
