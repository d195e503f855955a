//! Photon state and collections of photons partitioned by status.

use std::fmt;
use std::sync::Arc;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::scene::NodeId;
use crate::surface::tangent_basis;


/// Terminal classification of a ray. `Running` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RayStatus {
    Running,
    /// Absorbed in a bulk medium or at a surface.
    Absorbed,
    /// Left the world volume.
    Exited,
    /// Detected at a focal surface.
    Focused,
    /// Blocked by an obscuration or rejected by a detector.
    Stopped,
    /// Reached the point limit or met a numerical anomaly.
    Suspended,
}

impl RayStatus {
    pub const ALL: [RayStatus; 6] = [
        RayStatus::Running,
        RayStatus::Absorbed,
        RayStatus::Exited,
        RayStatus::Focused,
        RayStatus::Stopped,
        RayStatus::Suspended,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for RayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RayStatus::Running => "running",
            RayStatus::Absorbed => "absorbed",
            RayStatus::Exited => "exited",
            RayStatus::Focused => "focused",
            RayStatus::Stopped => "stopped",
            RayStatus::Suspended => "suspended",
        };
        write!(f, "{}", name)
    }
}

/// Polarization carried by a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PolarizationState {
    Unpolarized,
    /// Linear polarization along a unit vector perpendicular to the direction.
    Linear(Vector3<f64>),
}

/// A recorded position of the ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayPoint {
    pub position: Point3<f64>,
    /// Seconds.
    pub time: f64,
}

/// A node the ray entered, with its path name.
#[derive(Debug, Clone, PartialEq)]
pub struct Visit {
    pub node: NodeId,
    pub path: Arc<str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ray {
    id: usize,
    wavelength: f64,
    direction: Vector3<f64>,
    polarization: PolarizationState,
    status: RayStatus,
    points: Vec<RayPoint>,
    history: Vec<Visit>,
}

impl Ray {
    /// A running ray at `origin`, time `t0`. The direction is normalised.
    pub fn new(id: usize, wavelength: f64, origin: Point3<f64>, direction: Vector3<f64>, t0: f64) -> Self {
        Self {
            id,
            wavelength,
            direction: direction.normalize(),
            polarization: PolarizationState::Unpolarized,
            status: RayStatus::Running,
            points: vec![RayPoint {
                position: origin,
                time: t0,
            }],
            history: Vec::new(),
        }
    }

    pub fn with_linear_polarization(mut self, e: Vector3<f64>) -> Self {
        self.polarization = PolarizationState::Linear(e);
        self.project_polarization();
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }

    pub fn direction(&self) -> &Vector3<f64> {
        &self.direction
    }

    pub fn polarization(&self) -> &PolarizationState {
        &self.polarization
    }

    pub fn status(&self) -> RayStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == RayStatus::Running
    }

    /// Last recorded position.
    pub fn position(&self) -> &Point3<f64> {
        // a ray always holds its starting point
        &self.points[self.points.len() - 1].position
    }

    pub fn time(&self) -> f64 {
        self.points[self.points.len() - 1].time
    }

    pub fn points(&self) -> &[RayPoint] {
        &self.points
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn history(&self) -> &[Visit] {
        &self.history
    }

    /// First visited node whose path starts with `prefix`.
    pub fn find_node_starting_with(&self, prefix: &str) -> Option<&Visit> {
        self.history.iter().find(|v| v.path.starts_with(prefix))
    }

    pub fn count_nodes_starting_with(&self, prefix: &str) -> usize {
        self.history
            .iter()
            .filter(|v| v.path.starts_with(prefix))
            .count()
    }

    pub(crate) fn add_point(&mut self, position: Point3<f64>, time: f64) {
        self.points.push(RayPoint { position, time });
    }

    pub(crate) fn set_direction(&mut self, direction: Vector3<f64>) {
        self.direction = direction.normalize();
        self.project_polarization();
    }

    pub(crate) fn set_status(&mut self, status: RayStatus) {
        self.status = status;
    }

    pub(crate) fn visit(&mut self, node: NodeId, path: Arc<str>) {
        self.history.push(Visit { node, path });
    }

    /// Keeps a linear polarization vector perpendicular to the direction.
    fn project_polarization(&mut self) {
        if let PolarizationState::Linear(e) = self.polarization {
            let d = self.direction;
            let mut projected = e - d * e.dot(&d);
            if projected.norm() < 1e-12 {
                projected = tangent_basis(&d).0;
            }
            self.polarization = PolarizationState::Linear(projected.normalize());
        }
    }
}

/// Rays partitioned by status, in insertion order within each partition.
#[derive(Debug, Clone, Default)]
pub struct RayCollection {
    partitions: [Vec<Ray>; 6],
}

impl RayCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, ray: Ray) {
        self.partitions[ray.status().slot()].push(ray);
    }

    pub fn merge(&mut self, other: RayCollection) {
        for (mine, theirs) in self.partitions.iter_mut().zip(other.partitions) {
            mine.extend(theirs);
        }
    }

    pub fn get(&self, status: RayStatus) -> &[Ray] {
        &self.partitions[status.slot()]
    }

    pub fn count(&self, status: RayStatus) -> usize {
        self.partitions[status.slot()].len()
    }

    pub fn len(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every ray, partition by partition.
    pub fn iter(&self) -> impl Iterator<Item = &Ray> {
        self.partitions.iter().flatten()
    }

    pub(crate) fn take(&mut self, status: RayStatus) -> Vec<Ray> {
        std::mem::take(&mut self.partitions[status.slot()])
    }
}

impl FromIterator<Ray> for RayCollection {
    fn from_iter<I: IntoIterator<Item = Ray>>(iter: I) -> Self {
        let mut rays = Self::new();
        for ray in iter {
            rays.add(ray);
        }
        rays
    }
}
