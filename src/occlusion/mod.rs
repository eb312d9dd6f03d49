//! Depth-only face proxy.
//!
//! Every frame the face landmarks are unprojected into world space and
//! stitched together with a fixed triangle table. The resulting mesh writes
//! depth but no color, so accessory fragments behind the face are discarded.

mod canonical;
mod delaunay;
mod topology;

pub use delaunay::triangulate;
pub use topology::FaceTopology;

use glam::Vec3;

use crate::config::{OcclusionConfig, Triangulation};
use crate::coords::CameraRig;
use crate::landmarks::{FACE_LANDMARK_COUNT, FrameLandmarks};

#[derive(Clone, Debug, PartialEq)]
pub struct OcclusionMesh {
    pub vertices: Vec<Vec3>,
    /// Triangle list, always a multiple of 3.
    pub indices: Vec<u32>,
}

impl OcclusionMesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

pub struct OcclusionMeshBuilder {
    base_depth: f32,
    depth_scale: f32,
    /// `None` until a Delaunay table is derived from the first complete face.
    topology: Option<FaceTopology>,
}

impl OcclusionMeshBuilder {
    pub fn new(cfg: &OcclusionConfig) -> Self {
        let loaded = cfg.topology_path.as_ref().and_then(|path| {
            match FaceTopology::from_file(path) {
                Ok(topology) => {
                    log::info!(
                        "loaded face topology with {} triangles from {}",
                        topology.triangle_count(),
                        path.display()
                    );
                    Some(topology)
                }
                Err(err) => {
                    log::warn!("failed to load face topology {}: {err}", path.display());
                    None
                }
            }
        });
        let topology = loaded.or_else(|| match cfg.triangulation {
            Triangulation::Canonical => Some(FaceTopology::canonical()),
            Triangulation::Delaunay => None,
        });
        Self {
            base_depth: cfg.base_depth,
            depth_scale: cfg.depth_scale,
            topology,
        }
    }

    pub fn with_topology(mut self, topology: FaceTopology) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn topology(&self) -> Option<&FaceTopology> {
        self.topology.as_ref()
    }

    /// Rebuild the proxy for this frame.
    ///
    /// Returns `None` without a complete face or when any landmark fails to
    /// unproject; the caller keeps the previous geometry in that case.
    pub fn build(&mut self, landmarks: &FrameLandmarks, camera: &CameraRig) -> Option<OcclusionMesh> {
        let face = landmarks.face.as_ref()?;
        if face.len() < FACE_LANDMARK_COUNT {
            return None;
        }

        let width = landmarks.frame_width.max(1) as f32;
        let mut vertices = Vec::with_capacity(FACE_LANDMARK_COUNT);
        for idx in 0..FACE_LANDMARK_COUNT {
            let lm = face.get(idx)?;
            let (u, v) = landmarks.face_uv(&lm);
            // Detector z is negative toward the camera.
            let depth = self.base_depth - (lm.z / width) * self.depth_scale;
            match camera.unproject(u, v, depth) {
                Ok(point) => vertices.push(point),
                Err(err) => {
                    log::debug!("occlusion vertex {idx} failed to unproject: {err}");
                    return None;
                }
            }
        }

        if self.topology.is_none() {
            let derived = FaceTopology::derive(face)?;
            log::info!(
                "derived face topology with {} triangles",
                derived.triangle_count()
            );
            self.topology = Some(derived);
        }
        let indices = self.topology.as_ref()?.indices();

        Some(OcclusionMesh { vertices, indices })
    }
}
