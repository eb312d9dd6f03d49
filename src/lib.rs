//! Virtual try-on: face and body landmarks drive accessory placement in 3D.
//!
//! Each frame, detector output is folded into canonical landmarks, a
//! category strategy derives a placement for the active accessory, smoothing
//! removes jitter, and a depth-only face proxy lets the face occlude the
//! accessory. [`orchestrator::FrameOrchestrator`] runs that cycle against any
//! [`scene::Renderer`].

pub mod alignment;
pub mod assets;
pub mod catalog;
pub mod config;
pub mod coords;
pub mod error;
pub mod landmarks;
#[cfg(feature = "detector-ort")]
pub mod model_download;
pub mod occlusion;
pub mod orchestrator;
pub mod pipeline;
pub mod scene;
pub mod simulate;
pub mod smoothing;
pub mod status;
pub mod types;

pub use alignment::{AlignResult, ScaleLimits};
pub use catalog::{AccessoryCategory, AccessoryDescriptor, Catalog};
pub use config::Config;
pub use coords::{CameraRig, project, unproject};
pub use error::{Result, TryOnError};
pub use landmarks::{FrameLandmarks, LandmarkAdapter, RawDetection};
pub use occlusion::{OcclusionMesh, OcclusionMeshBuilder};
pub use orchestrator::{DetectedFrame, DetectorEvent, FrameOrchestrator, Mode};
pub use scene::{Geometry, MaterialKind, MeshHandle, Renderer, Scene};
pub use smoothing::{SmoothingFactors, SmoothingState, smooth};
pub use types::{Landmark, LandmarkSet, LandmarkSpace, Placement, Rotation};
