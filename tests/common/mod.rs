#![allow(dead_code)]

use std::time::Instant;

use glam::Vec3;
use tryon_universe::assets::{AssetLoader, ModelAsset};
use tryon_universe::catalog::AccessoryDescriptor;
use tryon_universe::error::{AssetError, Result};
use tryon_universe::landmarks::{FACE_LANDMARK_COUNT, POSE_LANDMARK_COUNT, face, pose};
use tryon_universe::scene::{MaterialKind, MeshRegistry};
use tryon_universe::{
    CameraRig, DetectedFrame, DetectorEvent, Geometry, Landmark, MeshHandle, RawDetection,
    Renderer, Scene,
};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;

pub fn camera() -> CameraRig {
    CameraRig::perspective(
        63.0,
        WIDTH as f32 / HEIGHT as f32,
        0.01,
        100.0,
        Vec3::new(0.0, 0.0, 2.0),
        Vec3::ZERO,
    )
}

/// Front-facing face in normalized coordinates, eye centers `eye_distance`
/// pixels apart once scaled to the frame.
pub fn normalized_face(eye_distance: f32) -> Vec<Landmark> {
    let (w, h) = (WIDTH as f32, HEIGHT as f32);
    let (cx, cy) = (w / 2.0, h / 2.0);
    let half = eye_distance / 2.0;
    let mut px: Vec<(f32, f32, f32)> = (0..FACE_LANDMARK_COUNT)
        .map(|i| {
            let angle = i as f32 * 2.399_963;
            let radius = eye_distance * 1.2 * ((i + 1) as f32 / FACE_LANDMARK_COUNT as f32).sqrt();
            (cx + angle.cos() * radius, cy + angle.sin() * radius * 1.3, -2.0)
        })
        .collect();

    let corner = eye_distance * 0.2;
    px[face::RIGHT_EYE_OUTER] = (cx - half - corner, cy, 0.0);
    px[face::RIGHT_EYE_INNER] = (cx - half + corner, cy, 0.0);
    px[face::LEFT_EYE_INNER] = (cx + half - corner, cy, 0.0);
    px[face::LEFT_EYE_OUTER] = (cx + half + corner, cy, 0.0);
    px[face::NOSE_TIP] = (cx, cy + eye_distance * 0.5, -10.0);

    px.into_iter()
        .map(|(x, y, z)| Landmark::new(x / w, y / h, z / w))
        .collect()
}

pub fn upright_pose() -> Vec<Option<Landmark>> {
    let mut points = vec![Some(Landmark::new(0.5, 0.5, 0.0)); POSE_LANDMARK_COUNT];
    points[pose::LEFT_SHOULDER] = Some(Landmark::new(0.65, 0.55, -0.1));
    points[pose::RIGHT_SHOULDER] = Some(Landmark::new(0.35, 0.55, -0.1));
    points[pose::LEFT_HIP] = Some(Landmark::new(0.6, 0.9, 0.0));
    points[pose::RIGHT_HIP] = Some(Landmark::new(0.4, 0.9, 0.0));
    points
}

pub fn detection(raw: RawDetection) -> DetectorEvent {
    DetectorEvent::Detection(DetectedFrame {
        detection: raw,
        frame_width: WIDTH,
        frame_height: HEIGHT,
        timestamp: Instant::now(),
    })
}

pub fn face_and_body() -> DetectorEvent {
    detection(RawDetection::NormalizedFaceBody {
        face: normalized_face(90.0),
        pose: upright_pose(),
    })
}

pub fn nobody() -> DetectorEvent {
    detection(RawDetection::NormalizedFace { face: Vec::new() })
}

/// One drawn node as seen by [`RecordingRenderer`].
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    pub name: String,
    pub mesh: MeshHandle,
    pub material: MaterialKind,
}

/// Renderer double that tracks mesh lifetimes and draw order.
#[derive(Default)]
pub struct RecordingRenderer {
    meshes: MeshRegistry,
    pub created: Vec<MeshHandle>,
    pub disposed: Vec<MeshHandle>,
    pub updates: usize,
    pub frames: Vec<Vec<DrawCall>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn geometry(&self, handle: MeshHandle) -> Option<&Geometry> {
        self.meshes.get(handle)
    }

    pub fn last_frame(&self) -> &[DrawCall] {
        self.frames.last().map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Renderer for RecordingRenderer {
    fn create_mesh(&mut self, geometry: Geometry) -> Result<MeshHandle> {
        let handle = self.meshes.insert(geometry);
        self.created.push(handle);
        Ok(handle)
    }

    fn update_mesh(&mut self, handle: MeshHandle, geometry: Geometry) -> Result<()> {
        self.updates += 1;
        self.meshes.update(handle, geometry)
    }

    fn dispose_mesh(&mut self, handle: MeshHandle) -> Result<()> {
        self.meshes.remove(handle)?;
        self.disposed.push(handle);
        Ok(())
    }

    fn render(&mut self, scene: &Scene, _camera: &CameraRig) -> Result<()> {
        let mut calls = Vec::new();
        for node in scene.draw_order() {
            assert!(
                self.meshes.contains(node.mesh),
                "node {} references disposed {}",
                node.name,
                node.mesh
            );
            if node.visible {
                calls.push(DrawCall {
                    name: node.name.clone(),
                    mesh: node.mesh,
                    material: node.material,
                });
            }
        }
        self.frames.push(calls);
        Ok(())
    }

    fn live_meshes(&self) -> usize {
        self.meshes.len()
    }
}

pub struct MemoryLoader;

impl AssetLoader for MemoryLoader {
    fn load(&self, descriptor: &AccessoryDescriptor) -> std::result::Result<ModelAsset, AssetError> {
        Ok(ModelAsset {
            path: descriptor.asset_path.clone(),
            bytes: b"glTF".to_vec(),
        })
    }
}

pub struct FailingLoader;

impl AssetLoader for FailingLoader {
    fn load(&self, descriptor: &AccessoryDescriptor) -> std::result::Result<ModelAsset, AssetError> {
        Err(AssetError::NotFound(descriptor.asset_path.display().to_string()))
    }
}
