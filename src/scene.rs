//! Scene graph and the renderer boundary.
//!
//! The orchestrator owns a [`Scene`] of positioned nodes and talks to the
//! backend only through [`Renderer`]. Meshes are created, updated in place and
//! disposed by handle; a renderer never sees a handle after it was disposed.

use std::collections::HashMap;
use std::fmt;

use glam::Vec3;

use crate::assets::{ModelAsset, PlaceholderShape};
use crate::coords::CameraRig;
use crate::error::{RenderError, Result};
use crate::occlusion::OcclusionMesh;
use crate::types::{Placement, Rotation};

/// Occluders write depth before any accessory is drawn.
pub const OCCLUDER_RENDER_ORDER: i32 = -100;
pub const ACCESSORY_RENDER_ORDER: i32 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub u64);

impl fmt::Display for MeshHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mesh#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MaterialKind {
    Shaded { color: [u8; 4] },
    /// Writes depth, never color.
    DepthOnly,
}

impl MaterialKind {
    pub fn writes_color(&self) -> bool {
        matches!(self, MaterialKind::Shaded { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Model(ModelAsset),
    Placeholder(PlaceholderShape),
    Occluder(OcclusionMesh),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometryKind {
    Model,
    Placeholder,
    Occluder,
}

impl Geometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Model(_) => GeometryKind::Model,
            Geometry::Placeholder(_) => GeometryKind::Placeholder,
            Geometry::Occluder(_) => GeometryKind::Occluder,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Rotation,
    pub scale: f32,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        position: Vec3::ZERO,
        rotation: Rotation::IDENTITY,
        scale: 1.0,
    };

    /// Transform of instance `index` of a placement.
    pub fn from_placement(placement: &Placement, index: usize) -> Option<Self> {
        Some(Self {
            position: *placement.positions.get(index)?,
            rotation: placement.rotation,
            scale: placement.scale,
        })
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SceneNode {
    pub id: NodeId,
    pub name: String,
    pub mesh: MeshHandle,
    pub material: MaterialKind,
    pub transform: Transform,
    pub visible: bool,
    pub render_order: i32,
}

#[derive(Debug, Default)]
pub struct Scene {
    nodes: Vec<SceneNode>,
    next_id: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        mesh: MeshHandle,
        material: MaterialKind,
        render_order: i32,
    ) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.push(SceneNode {
            id,
            name: name.into(),
            mesh,
            material,
            transform: Transform::IDENTITY,
            visible: false,
            render_order,
        });
        id
    }

    pub fn remove_node(&mut self, id: NodeId) -> Option<SceneNode> {
        let pos = self.nodes.iter().position(|node| node.id == id)?;
        Some(self.nodes.remove(pos))
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.iter_mut().find(|node| node.id == id)
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in the order they must be drawn. Ties keep insertion order.
    pub fn draw_order(&self) -> Vec<&SceneNode> {
        let mut ordered: Vec<&SceneNode> = self.nodes.iter().collect();
        ordered.sort_by_key(|node| node.render_order);
        ordered
    }
}

/// Rendering backend as seen by the orchestrator.
pub trait Renderer {
    fn create_mesh(&mut self, geometry: Geometry) -> Result<MeshHandle>;

    /// Replace the geometry behind `handle`. The kind must not change.
    fn update_mesh(&mut self, handle: MeshHandle, geometry: Geometry) -> Result<()>;

    fn dispose_mesh(&mut self, handle: MeshHandle) -> Result<()>;

    fn render(&mut self, scene: &Scene, camera: &CameraRig) -> Result<()>;

    fn live_meshes(&self) -> usize;
}

/// Handle allocation and geometry bookkeeping shared by renderer backends.
#[derive(Debug, Default)]
pub struct MeshRegistry {
    next: u64,
    meshes: HashMap<MeshHandle, Geometry>,
}

impl MeshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, geometry: Geometry) -> MeshHandle {
        self.next += 1;
        let handle = MeshHandle(self.next);
        self.meshes.insert(handle, geometry);
        handle
    }

    pub fn update(&mut self, handle: MeshHandle, geometry: Geometry) -> Result<()> {
        let slot = self
            .meshes
            .get_mut(&handle)
            .ok_or(RenderError::UnknownMesh(handle.0))?;
        if slot.kind() != geometry.kind() {
            return Err(RenderError::KindMismatch(handle.0).into());
        }
        *slot = geometry;
        Ok(())
    }

    pub fn remove(&mut self, handle: MeshHandle) -> Result<Geometry> {
        self.meshes
            .remove(&handle)
            .ok_or_else(|| RenderError::UnknownMesh(handle.0).into())
    }

    pub fn get(&self, handle: MeshHandle) -> Option<&Geometry> {
        self.meshes.get(&handle)
    }

    pub fn contains(&self, handle: MeshHandle) -> bool {
        self.meshes.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occluder() -> Geometry {
        Geometry::Occluder(OcclusionMesh {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            indices: vec![0, 1, 2],
        })
    }

    #[test]
    fn draw_order_puts_occluders_first() {
        let mut scene = Scene::new();
        let shaded = MaterialKind::Shaded {
            color: [255, 0, 0, 255],
        };
        scene.add_node("glasses", MeshHandle(1), shaded, ACCESSORY_RENDER_ORDER);
        scene.add_node("face", MeshHandle(2), MaterialKind::DepthOnly, OCCLUDER_RENDER_ORDER);
        scene.add_node("glasses-2", MeshHandle(3), shaded, ACCESSORY_RENDER_ORDER);

        let names: Vec<&str> = scene.draw_order().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["face", "glasses", "glasses-2"]);
    }

    #[test]
    fn removed_nodes_are_gone() {
        let mut scene = Scene::new();
        let id = scene.add_node("face", MeshHandle(1), MaterialKind::DepthOnly, 0);
        assert!(scene.remove_node(id).is_some());
        assert!(scene.node(id).is_none());
        assert!(scene.remove_node(id).is_none());
    }

    #[test]
    fn registry_rejects_kind_changes_and_stale_handles() {
        let mut registry = MeshRegistry::new();
        let handle = registry.insert(occluder());
        assert!(registry.update(handle, occluder()).is_ok());
        let placeholder = Geometry::Placeholder(PlaceholderShape::default());
        assert!(registry.update(handle, placeholder).is_err());

        registry.remove(handle).unwrap();
        assert!(registry.is_empty());
        assert!(registry.remove(handle).is_err());
        assert!(registry.update(handle, occluder()).is_err());
    }

    #[test]
    fn handles_are_never_reused() {
        let mut registry = MeshRegistry::new();
        let first = registry.insert(occluder());
        registry.remove(first).unwrap();
        let second = registry.insert(occluder());
        assert_ne!(first, second);
    }
}
