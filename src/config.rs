//! Runtime configuration, read from TOML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, TryOnError};
use crate::smoothing::SmoothingFactors;

const CONFIG_SEARCH_PATHS: &[&str] = &["tryon.toml", "config/tryon.toml"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub detector: DetectorConfig,
    pub tracking: TrackingConfig,
    pub smoothing: SmoothingFactors,
    pub occlusion: OcclusionConfig,
    pub preview: PreviewConfig,
    pub catalog: CatalogConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TryOnError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_str(&contents)
    }

    pub fn from_str(s: &str) -> Result<Self, TryOnError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Load from an explicit path, else the first existing search path, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, TryOnError> {
        if let Some(path) = explicit {
            log::info!("loading config from {}", path.display());
            return Self::from_file(path);
        }

        for path in CONFIG_SEARCH_PATHS.iter().map(PathBuf::from) {
            if path.exists() {
                log::info!("loading config from {}", path.display());
                return Self::from_file(&path);
            }
        }

        log::info!("no config file found, using defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), TryOnError> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(invalid("camera.width", "frame dimensions must be non-zero"));
        }
        if !(1.0..179.0).contains(&self.camera.fov_y_degrees) {
            return Err(invalid("camera.fov_y_degrees", "must be between 1 and 179"));
        }
        if !(self.camera.near > 0.0 && self.camera.far > self.camera.near) {
            return Err(invalid("camera.near", "need 0 < near < far"));
        }

        for (field, value) in [
            ("smoothing.position", self.smoothing.position),
            ("smoothing.scale", self.smoothing.scale),
            ("smoothing.rotation", self.smoothing.rotation),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, "factor must be between 0.0 and 1.0"));
            }
        }

        if !(0.0..=1.0).contains(&self.tracking.min_pose_visibility) {
            return Err(invalid(
                "tracking.min_pose_visibility",
                "must be between 0.0 and 1.0",
            ));
        }

        if self.preview.target_fps == 0 {
            return Err(invalid("preview.target_fps", "must be greater than 0"));
        }

        if self.detector.backend == DetectorBackendKind::Udp && self.detector.udp_port == 0 {
            return Err(invalid("detector.udp_port", "must be greater than 0"));
        }

        if let Some(path) = &self.occlusion.topology_path {
            if !path.exists() {
                log::warn!(
                    "occlusion topology {} not found, falling back to the {:?} triangulation",
                    path.display(),
                    self.occlusion.triangulation
                );
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> TryOnError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// Capture device and the virtual camera that mirrors it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub eye: [f32; 3],
    pub target: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 640,
            height: 480,
            fov_y_degrees: 63.0,
            near: 0.01,
            far: 100.0,
            eye: [0.0, 0.0, 2.0],
            target: [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackendKind {
    Ort,
    Udp,
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub backend: DetectorBackendKind,
    pub model_path: PathBuf,
    /// Fetched when `model_path` does not exist yet.
    pub model_url: Option<String>,
    pub min_face_presence: f32,
    pub udp_listen_address: String,
    pub udp_port: u16,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            backend: DetectorBackendKind::Udp,
            model_path: PathBuf::from("models").join("face_landmark.onnx"),
            model_url: None,
            min_face_presence: 0.5,
            udp_listen_address: "127.0.0.1".to_string(),
            udp_port: 39540,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Consecutive non-visible frames before smoothing state is dropped.
    pub max_lost_frames: u32,
    pub min_pose_visibility: f32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_lost_frames: 10,
            min_pose_visibility: 0.3,
        }
    }
}

/// Where the face proxy's triangles come from when no table file is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Triangulation {
    /// The face mesh's own tessellation, built into the binary.
    #[default]
    Canonical,
    /// Delaunay over the first complete face of the session.
    Delaunay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcclusionConfig {
    pub enabled: bool,
    /// Triangle table for the 468-point face mesh, one `a b c` triple per line.
    /// Overrides `triangulation` when it loads.
    pub topology_path: Option<PathBuf>,
    pub triangulation: Triangulation,
    pub base_depth: f32,
    pub depth_scale: f32,
}

impl Default for OcclusionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            topology_path: None,
            triangulation: Triangulation::Canonical,
            base_depth: -0.22,
            depth_scale: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub target_fps: u32,
    /// Stop after this many rendered frames; run until the detector ends if unset.
    pub max_frames: Option<u64>,
    pub snapshot_dir: Option<PathBuf>,
    /// Write a PNG every N frames; 0 disables snapshots.
    pub snapshot_every: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            max_frames: None,
            snapshot_dir: None,
            snapshot_every: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// TOML accessory list; the built-in catalog is used when unset.
    pub path: Option<PathBuf>,
    pub asset_root: PathBuf,
    pub initial_accessory: Option<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: None,
            asset_root: PathBuf::from("assets"),
            initial_accessory: None,
        }
    }
}
