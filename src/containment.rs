//! Containment relationships between scene volumes.
//!
//! - [`ContainmentGraph`]: mother/daughter links of every node
//! - [`AABB`]: axis-aligned bounding boxes used to validate that a daughter
//!   fits inside its mother and to skip volumes a ray cannot reach

use nalgebra::{Isometry3, Point3, Vector3};

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion};

    #[test]
    fn parent_and_children() {
        let mut graph = ContainmentGraph::new(3);
        graph.set_parent(1, 0);
        graph.set_parent(2, 1);
        assert_eq!(graph.get_parent(2), Some(1));
        assert_eq!(graph.get_parent(0), None);
        assert_eq!(graph.children(1), &[2]);
        assert_eq!(graph.depth(2), 2);
        assert_eq!(graph.depth(0), 0);
    }

    #[test]
    fn aabb_containment() {
        let outer = AABB::from_half_lengths(&Vector3::new(1.0, 1.0, 1.0));
        let inner = AABB::from_half_lengths(&Vector3::new(0.5, 0.5, 0.5));
        assert!(outer.contains_aabb(&inner));
        assert!(!inner.contains_aabb(&outer));
        assert!(outer.contains_aabb(&outer));
    }

    #[test]
    fn transformed_box_grows() {
        let aabb = AABB::from_half_lengths(&Vector3::new(1.0, 1.0, 1.0));
        let rot = Isometry3::from_parts(
            Translation3::new(0.0, 0.0, 2.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_4),
        );
        let moved = aabb.transformed(&rot);
        assert!((moved.max.x - 2f64.sqrt()).abs() < 1e-12);
        assert!((moved.min.z - 1.0).abs() < 1e-12);
    }

    #[test]
    fn slab_hit() {
        let aabb = AABB::from_half_lengths(&Vector3::new(1.0, 1.0, 1.0));
        let origin = Point3::new(0.0, 0.0, 5.0);
        assert!(aabb.hit(&origin, &Vector3::new(0.0, 0.0, -1.0), f64::INFINITY));
        assert!(!aabb.hit(&origin, &Vector3::new(0.0, 0.0, 1.0), f64::INFINITY));
        assert!(!aabb.hit(&origin, &Vector3::new(0.0, 0.0, -1.0), 3.0));
    }
}

/// Mother/daughter relationships of scene nodes. Node 0 is the root.
///
/// **Context**: Volumes are nested: a lens sits in a housing which sits in
/// the world. When a ray leaves a volume it enters the mother, and when it
/// looks for the next border it only needs to consider the current volume and
/// its daughters.
///
/// **How it Works**: Each node stores at most one mother and the list of its
/// daughters in insertion order. Nodes are appended as the scene is built, so
/// a mother always has a smaller index than its daughters.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainmentGraph {
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
}

impl ContainmentGraph {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            parent: vec![None; num_nodes],
            children: vec![Vec::new(); num_nodes],
        }
    }

    /// Appends a node with no relationships and returns its index.
    pub fn push(&mut self) -> usize {
        self.parent.push(None);
        self.children.push(Vec::new());
        self.parent.len() - 1
    }

    pub fn set_parent(&mut self, child: usize, parent: usize) {
        assert!(
            child < self.parent.len() && parent < self.parent.len(),
            "node ids ({}, {}) out of range for {} nodes",
            child,
            parent,
            self.parent.len()
        );
        self.parent[child] = Some(parent);
        self.children[parent].push(child);
    }

    pub fn get_parent(&self, node: usize) -> Option<usize> {
        self.parent[node]
    }

    pub fn children(&self, node: usize) -> &[usize] {
        &self.children[node]
    }

    /// Number of mothers above `node`. The root has depth zero.
    pub fn depth(&self, node: usize) -> usize {
        std::iter::successors(self.parent[node], |&p| self.parent[p]).count()
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct AABB {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl AABB {
    pub fn from_half_lengths(half: &Vector3<f64>) -> Self {
        Self {
            min: Point3::from(-half),
            max: Point3::from(*half),
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Self {
        let mut min = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut max = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            min = min.inf(p);
            max = max.sup(p);
        }
        Self { min, max }
    }

    fn corners(&self) -> [Point3<f64>; 8] {
        let (a, b) = (self.min, self.max);
        [
            Point3::new(a.x, a.y, a.z),
            Point3::new(b.x, a.y, a.z),
            Point3::new(a.x, b.y, a.z),
            Point3::new(b.x, b.y, a.z),
            Point3::new(a.x, a.y, b.z),
            Point3::new(b.x, a.y, b.z),
            Point3::new(a.x, b.y, b.z),
            Point3::new(b.x, b.y, b.z),
        ]
    }

    /// Bounding box of this box after a rigid transform.
    pub fn transformed(&self, iso: &Isometry3<f64>) -> Self {
        let corners = self.corners().map(|c| iso.transform_point(&c));
        Self::from_points(corners.iter())
    }

    /// True if `other` lies inside this box, allowing shared faces.
    pub fn contains_aabb(&self, other: &AABB) -> bool {
        let tol = 1e-9 * (self.max - self.min).norm().max(1.0);
        (0..3).all(|i| {
            other.min[i] >= self.min[i] - tol && other.max[i] <= self.max[i] + tol
        })
    }

    /// Slab test: does the ray `origin + t·dir` meet the box for some `0 <= t <= t_max`.
    pub fn hit(&self, origin: &Point3<f64>, dir: &Vector3<f64>, t_max: f64) -> bool {
        let mut t0: f64 = 0.0;
        let mut t1 = t_max;
        for i in 0..3 {
            let inv = 1.0 / dir[i];
            let mut near = (self.min[i] - origin[i]) * inv;
            let mut far = (self.max[i] - origin[i]) * inv;
            if near > far {
                std::mem::swap(&mut near, &mut far);
            }
            // NaN from 0 * inf leaves the interval unchanged
            if near > t0 {
                t0 = near;
            }
            if far < t1 {
                t1 = far;
            }
            if t0 > t1 {
                return false;
            }
        }
        true
    }
}
