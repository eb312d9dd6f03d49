//! Headless software renderer.
//!
//! Depth-only occluders are rasterized into a depth buffer; accessories are
//! drawn as depth-tested wireframe gizmos (model files are opaque to this
//! backend). Frames can be written out as PNG snapshots.

use std::path::{Path, PathBuf};

use glam::{EulerRot, Quat, Vec2, Vec3};

use crate::coords::{CameraRig, project_depth};
use crate::error::{RenderError, Result};
use crate::occlusion::OcclusionMesh;
use crate::scene::{Geometry, MaterialKind, MeshHandle, MeshRegistry, Renderer, Scene, SceneNode};

const BACKGROUND: [u8; 4] = [18, 18, 24, 255];
const DEPTH_BIAS: f32 = 1e-5;
const MODEL_GIZMO_HALF_EXTENT: f32 = 0.04;
const BOX_EDGES: [(usize, usize); 12] = [
    (0, 1), (1, 3), (3, 2), (2, 0),
    (4, 5), (5, 7), (7, 6), (6, 4),
    (0, 4), (1, 5), (2, 6), (3, 7),
];

pub struct PreviewRenderer {
    canvas: Canvas,
    meshes: MeshRegistry,
    frames_rendered: u64,
    snapshot_dir: Option<PathBuf>,
    snapshot_every: u64,
}

impl PreviewRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: Canvas::new(width, height),
            meshes: MeshRegistry::new(),
            frames_rendered: 0,
            snapshot_dir: None,
            snapshot_every: 0,
        }
    }

    /// Write every `every`-th frame into `dir`; 0 disables.
    pub fn with_snapshots(mut self, dir: impl Into<PathBuf>, every: u64) -> Self {
        self.snapshot_dir = Some(dir.into());
        self.snapshot_every = every;
        self
    }

    pub fn size(&self) -> (u32, u32) {
        (self.canvas.width, self.canvas.height)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn color_buffer(&self) -> &[u8] {
        &self.canvas.color
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let idx = self.canvas.index(x as i32, y as i32)?;
        let px = &self.canvas.color[idx * 4..idx * 4 + 4];
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn depth_at(&self, x: u32, y: u32) -> Option<f32> {
        self.canvas
            .index(x as i32, y as i32)
            .map(|idx| self.canvas.depth[idx])
    }

    pub fn background() -> [u8; 4] {
        BACKGROUND
    }

    pub fn snapshot(&self, path: &Path) -> Result<()> {
        let snapshot_err = |message: String| RenderError::Snapshot {
            path: path.display().to_string(),
            message,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| snapshot_err(e.to_string()))?;
        }
        let (width, height) = self.size();
        let image = image::RgbaImage::from_raw(width, height, self.canvas.color.clone())
            .ok_or_else(|| snapshot_err("color buffer does not match frame size".to_string()))?;
        image.save(path).map_err(|e| snapshot_err(e.to_string()))?;
        Ok(())
    }

    fn draw_node(&mut self, node: &SceneNode, camera: &CameraRig) {
        let Some(geometry) = self.meshes.get(node.mesh) else {
            log::warn!("node {} references unknown {}", node.name, node.mesh);
            return;
        };
        let canvas = &mut self.canvas;
        match (geometry, node.material) {
            (Geometry::Occluder(mesh), MaterialKind::DepthOnly) => {
                canvas.draw_occluder(mesh, camera);
            }
            (_, MaterialKind::DepthOnly) => {}
            (Geometry::Occluder(_), MaterialKind::Shaded { .. }) => {
                log::debug!("occluder {} has a shaded material, skipping", node.name);
            }
            (Geometry::Placeholder(shape), MaterialKind::Shaded { color }) => {
                canvas.draw_gizmo(node, shape.half_extents, color, camera);
            }
            (Geometry::Model(_), MaterialKind::Shaded { color }) => {
                canvas.draw_gizmo(node, Vec3::splat(MODEL_GIZMO_HALF_EXTENT), color, camera);
            }
        }
    }
}

/// Color and depth targets of one frame.
struct Canvas {
    width: u32,
    height: u32,
    color: Vec<u8>,
    depth: Vec<f32>,
}

impl Canvas {
    fn new(width: u32, height: u32) -> Self {
        let pixels = width as usize * height as usize;
        Self {
            width,
            height,
            color: BACKGROUND.repeat(pixels),
            depth: vec![f32::INFINITY; pixels],
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    fn clear(&mut self) {
        for px in self.color.chunks_exact_mut(4) {
            px.copy_from_slice(&BACKGROUND);
        }
        self.depth.fill(f32::INFINITY);
    }

    fn to_pixels(&self, point: Vec3, camera: &CameraRig) -> Option<(Vec2, f32)> {
        let (uv, depth) = project_depth(point, camera)?;
        Some((
            Vec2::new(uv.x * self.width as f32, uv.y * self.height as f32),
            depth,
        ))
    }

    fn draw_occluder(&mut self, mesh: &OcclusionMesh, camera: &CameraRig) {
        let projected: Vec<Option<(Vec2, f32)>> = mesh
            .vertices
            .iter()
            .map(|v| self.to_pixels(*v, camera))
            .collect();
        for tri in mesh.indices.chunks_exact(3) {
            let corners = (
                projected.get(tri[0] as usize).copied().flatten(),
                projected.get(tri[1] as usize).copied().flatten(),
                projected.get(tri[2] as usize).copied().flatten(),
            );
            if let (Some(a), Some(b), Some(c)) = corners {
                self.fill_depth_triangle(a, b, c);
            }
        }
    }

    fn draw_gizmo(&mut self, node: &SceneNode, half_extents: Vec3, color: [u8; 4], camera: &CameraRig) {
        let t = &node.transform;
        let rotation = Quat::from_euler(EulerRot::YXZ, t.rotation.yaw, t.rotation.pitch, t.rotation.roll);
        let corners: Vec<Option<(Vec2, f32)>> = (0..8)
            .map(|i| {
                let sign = Vec3::new(
                    if i & 1 == 0 { -1.0 } else { 1.0 },
                    if i & 2 == 0 { -1.0 } else { 1.0 },
                    if i & 4 == 0 { -1.0 } else { 1.0 },
                );
                let local = sign * half_extents * t.scale;
                self.to_pixels(t.position + rotation * local, camera)
            })
            .collect();

        for (a, b) in BOX_EDGES {
            if let (Some(p0), Some(p1)) = (corners[a], corners[b]) {
                self.draw_line(p0, p1, color);
            }
        }
        if let Some((center, depth)) = self.to_pixels(t.position, camera) {
            self.draw_circle(center, depth, 2, color);
        }
    }

    fn put_pixel_tested(&mut self, x: i32, y: i32, depth: f32, color: [u8; 4]) {
        let Some(idx) = self.index(x, y) else {
            return;
        };
        if depth > self.depth[idx] + DEPTH_BIAS {
            return;
        }
        self.depth[idx] = depth;
        self.color[idx * 4..idx * 4 + 4].copy_from_slice(&color);
    }

    fn draw_line(&mut self, p0: (Vec2, f32), p1: (Vec2, f32), color: [u8; 4]) {
        let limit = 4.0 * self.width.max(self.height) as f32;
        if p0.0.abs().max_element() > limit || p1.0.abs().max_element() > limit {
            return;
        }
        let (mut x0, mut y0) = (p0.0.x as i32, p0.0.y as i32);
        let (x1, y1) = (p1.0.x as i32, p1.0.y as i32);
        let dx = (x1 - x0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let dy = -(y1 - y0).abs();
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let steps = dx.max(-dy).max(1) as f32;
        let mut step = 0.0;

        loop {
            let depth = p0.1 + (p1.1 - p0.1) * (step / steps).min(1.0);
            self.put_pixel_tested(x0, y0, depth, color);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
            step += 1.0;
        }
    }

    fn draw_circle(&mut self, center: Vec2, depth: f32, radius: i32, color: [u8; 4]) {
        let (cx, cy) = (center.x as i32, center.y as i32);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put_pixel_tested(cx + dx, cy + dy, depth, color);
                }
            }
        }
    }

    /// Depth-only triangle fill; either winding is accepted.
    fn fill_depth_triangle(&mut self, a: (Vec2, f32), b: (Vec2, f32), c: (Vec2, f32)) {
        let area = (b.0 - a.0).perp_dot(c.0 - a.0);
        if area.abs() < f32::EPSILON {
            return;
        }
        let min = a.0.min(b.0).min(c.0).floor().max(Vec2::ZERO);
        let max = a
            .0
            .max(b.0)
            .max(c.0)
            .ceil()
            .min(Vec2::new(self.width as f32 - 1.0, self.height as f32 - 1.0));

        for y in min.y as i32..=max.y as i32 {
            for x in min.x as i32..=max.x as i32 {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let w0 = (c.0 - b.0).perp_dot(p - b.0) / area;
                let w1 = (a.0 - c.0).perp_dot(p - c.0) / area;
                let w2 = 1.0 - w0 - w1;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let depth = w0 * a.1 + w1 * b.1 + w2 * c.1;
                if let Some(idx) = self.index(x, y) {
                    if depth < self.depth[idx] {
                        self.depth[idx] = depth;
                    }
                }
            }
        }
    }
}

impl Renderer for PreviewRenderer {
    fn create_mesh(&mut self, geometry: Geometry) -> Result<MeshHandle> {
        let handle = self.meshes.insert(geometry);
        log::debug!("created {handle}");
        Ok(handle)
    }

    fn update_mesh(&mut self, handle: MeshHandle, geometry: Geometry) -> Result<()> {
        self.meshes.update(handle, geometry)
    }

    fn dispose_mesh(&mut self, handle: MeshHandle) -> Result<()> {
        self.meshes.remove(handle)?;
        log::debug!("disposed {handle}");
        Ok(())
    }

    fn render(&mut self, scene: &Scene, camera: &CameraRig) -> Result<()> {
        self.canvas.clear();
        for node in scene.draw_order() {
            if node.visible {
                self.draw_node(node, camera);
            }
        }
        self.frames_rendered += 1;

        if self.snapshot_every > 0 && self.frames_rendered % self.snapshot_every == 0 {
            if let Some(dir) = &self.snapshot_dir {
                let path = dir.join(format!("frame_{:06}.png", self.frames_rendered));
                if let Err(err) = self.snapshot(&path) {
                    log::warn!("{err}");
                }
            }
        }
        Ok(())
    }

    fn live_meshes(&self) -> usize {
        self.meshes.len()
    }
}
