//! Volume hierarchy of an optical system.
//!
//! Volumes are added to a [`SceneBuilder`] and frozen into a [`Scene`] by
//! [`SceneBuilder::close`]. Only a closed scene can be traced, and it is
//! never mutated afterwards, so tracer threads share it freely.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use nalgebra::{Isometry3, Point3, Vector3};

use crate::containment::{ContainmentGraph, AABB};
use crate::error::{Result, TraceError};
use crate::geom::Shape;
use crate::role::OpticalRole;
use crate::settings::CROSSING_EPSILON;
use crate::surface::SurfaceCondition;


pub type NodeId = usize;

/// The world volume of every scene.
pub const WORLD: NodeId = 0;

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub shape: Shape,
    pub role: OpticalRole,
    /// Local frame to the mother's frame.
    pub placement: Isometry3<f64>,
    /// Local frame to the world frame.
    pub global: Isometry3<f64>,
    /// Bounding box in the local frame.
    pub bounds: AABB,
    pub path: Arc<str>,
}

/// Collects volumes and border conditions before the scene is closed.
#[derive(Debug, Clone)]
pub struct SceneBuilder {
    nodes: Vec<Node>,
    graph: ContainmentGraph,
    conditions: HashMap<(NodeId, NodeId), Arc<SurfaceCondition>>,
}

impl SceneBuilder {
    /// Starts a scene with a transparent world volume.
    pub fn new(world: Shape) -> Self {
        let bounds = world.aabb();
        Self {
            nodes: vec![Node {
                name: "world".to_string(),
                shape: world,
                role: OpticalRole::Transparent,
                placement: Isometry3::identity(),
                global: Isometry3::identity(),
                bounds,
                path: Arc::from("/world"),
            }],
            graph: ContainmentGraph::new(1),
            conditions: HashMap::new(),
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Places a daughter volume inside `parent`. Its bounding box in the
    /// mother's frame must lie within the mother's.
    pub fn add_node(
        &mut self,
        parent: NodeId,
        name: &str,
        shape: Shape,
        role: OpticalRole,
        placement: Isometry3<f64>,
    ) -> Result<NodeId> {
        let mother = self.nodes.get(parent).ok_or_else(|| {
            TraceError::Configuration(format!("no node {} to attach '{}' to", parent, name))
        })?;
        if name.is_empty() || name.contains('/') {
            return Err(TraceError::Configuration(format!(
                "invalid node name '{}'",
                name
            )));
        }
        let bounds = shape.aabb();
        if !mother.bounds.contains_aabb(&bounds.transformed(&placement)) {
            return Err(TraceError::Geometry(format!(
                "'{}' does not fit inside '{}'",
                name, mother.path
            )));
        }

        let node = Node {
            name: name.to_string(),
            shape,
            role,
            placement,
            global: mother.global * placement,
            bounds,
            path: Arc::from(format!("{}/{}", mother.path, name)),
        };
        let id = self.graph.push();
        self.graph.set_parent(id, parent);
        self.nodes.push(node);
        Ok(id)
    }

    pub fn set_role(&mut self, node: NodeId, role: OpticalRole) -> Result<()> {
        if node == WORLD {
            return Err(TraceError::Configuration(
                "the world volume is always transparent".to_string(),
            ));
        }
        let target = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| TraceError::Configuration(format!("no node {}", node)))?;
        target.role = role;
        Ok(())
    }

    /// Attaches a condition to the border crossed going from `from` into `to`.
    pub fn add_surface_condition(
        &mut self,
        from: NodeId,
        to: NodeId,
        condition: SurfaceCondition,
    ) -> Result<()> {
        if from >= self.nodes.len() || to >= self.nodes.len() || from == to {
            return Err(TraceError::Configuration(format!(
                "invalid border ({}, {}) for a scene of {} nodes",
                from,
                to,
                self.nodes.len()
            )));
        }
        self.conditions.insert((from, to), Arc::new(condition));
        Ok(())
    }

    /// Freezes the geometry.
    pub fn close(self) -> Result<Scene> {
        // rays never propagate inside terminal volumes
        if let Some(node) = (0..self.nodes.len())
            .find(|&id| self.nodes[id].role.is_terminal() && !self.graph.children(id).is_empty())
        {
            return Err(TraceError::Geometry(format!(
                "'{}' stops every ray but has daughter volumes",
                self.nodes[node].path
            )));
        }
        let depth = (0..self.nodes.len())
            .map(|id| self.graph.depth(id))
            .max()
            .unwrap_or(0);
        debug!(
            "closing scene with {} nodes nested {} deep and {} border conditions",
            self.nodes.len(),
            depth,
            self.conditions.len()
        );
        Ok(Scene {
            nodes: self.nodes,
            graph: self.graph,
            conditions: self.conditions,
        })
    }
}

/// A closed, immutable scene.
#[derive(Debug, Clone)]
pub struct Scene {
    nodes: Vec<Node>,
    graph: ContainmentGraph,
    conditions: HashMap<(NodeId, NodeId), Arc<SurfaceCondition>>,
}

impl Scene {
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.graph.get_parent(id)
    }

    /// Looks a node up by full path (`/world/lens`) or by bare name.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        if name.starts_with('/') {
            self.nodes.iter().position(|n| &*n.path == name)
        } else {
            self.nodes.iter().position(|n| n.name == name)
        }
    }

    pub fn path_name(&self, id: NodeId) -> &str {
        &self.nodes[id].path
    }

    pub fn path(&self, id: NodeId) -> Arc<str> {
        self.nodes[id].path.clone()
    }

    pub fn condition(&self, from: NodeId, to: NodeId) -> Option<&SurfaceCondition> {
        self.conditions.get(&(from, to)).map(|c| c.as_ref())
    }

    /// Deepest node containing `p`, or `None` outside the world.
    pub fn locate(&self, p: &Point3<f64>) -> Option<NodeId> {
        if !self.nodes[WORLD].shape.contains(p) {
            return None;
        }
        let mut current = WORLD;
        'descend: loop {
            for &child in self.graph.children(current) {
                let node = &self.nodes[child];
                if node.shape.contains(&node.global.inverse_transform_point(p)) {
                    current = child;
                    continue 'descend;
                }
            }
            return Some(current);
        }
    }

    /// Distance and world-frame normal of the nearest crossing ahead of `origin`
    /// among the surfaces of `current` and its daughters.
    pub fn nearest_crossing(
        &self,
        current: NodeId,
        origin: &Point3<f64>,
        dir: &Vector3<f64>,
    ) -> Option<(f64, Vector3<f64>)> {
        let mut best: Option<(f64, Vector3<f64>)> = None;
        let candidates = std::iter::once(current).chain(self.graph.children(current).iter().copied());
        for id in candidates {
            let node = &self.nodes[id];
            let local_origin = node.global.inverse_transform_point(origin);
            let local_dir = node.global.inverse_transform_vector(dir);
            let t_max = best.map_or(f64::INFINITY, |(t, _)| t);
            if id != current && !node.bounds.hit(&local_origin, &local_dir, t_max) {
                continue;
            }
            for crossing in node.shape.crossings(&local_origin, &local_dir) {
                if crossing.t > CROSSING_EPSILON && crossing.t < best.map_or(f64::INFINITY, |(t, _)| t) {
                    best = Some((crossing.t, node.global.transform_vector(&crossing.normal)));
                }
            }
        }
        best
    }
}
