use std::{
    path::Path,
    sync::{Arc, atomic::AtomicBool},
    thread,
};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::Receiver;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    DetectorHandle, EventSink, LandmarkDetector,
    common::{self, FACE_INPUT_SIZE, FaceRegion, InputMapping},
    run_worker_loop,
};
use crate::{
    config::DetectorConfig,
    landmarks::RawDetection,
    model_download::ensure_face_model_ready,
    orchestrator::DetectorEvent,
    types::Frame,
};

pub(super) fn start_worker(
    cfg: &DetectorConfig,
    frame_rx: Receiver<Frame>,
    events: EventSink,
) -> DetectorHandle {
    let model_path = cfg.model_path.clone();
    let model_url = cfg.model_url.clone();
    let min_presence = cfg.min_face_presence;
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::spawn(move || {
        if let Err(err) = ensure_face_model_ready(&model_path, model_url.as_deref(), |_evt| {}) {
            log::error!(
                "failed to prepare face mesh model at {}: {err:?}",
                model_path.display()
            );
            events.publish(DetectorEvent::Failed(format!("{err:#}")));
            return;
        }

        let engine = match FaceMeshEngine::new(&model_path, min_presence) {
            Ok(engine) => {
                log::info!("face mesh ORT backend ready using {}", model_path.display());
                engine
            }
            Err(err) => {
                log::error!("failed to load ORT face mesh model: {err:?}");
                events.publish(DetectorEvent::Failed(format!("{err:#}")));
                return;
            }
        };

        events.publish(DetectorEvent::Ready);
        run_worker_loop(engine, frame_rx, events, &stop_flag);
    });

    DetectorHandle::new("ort", stop, handle)
}

/// Growth of the landmark bounding box when it becomes the next crop.
const REGION_MARGIN: f32 = 1.5;

/// The face mesh model expects a face-centered square input. The first frame,
/// and any frame after the face is lost, goes through the whole letterboxed
/// frame; afterwards the crop follows the landmarks of the previous frame.
struct FaceMeshEngine {
    session: Session,
    min_presence: f32,
    region: Option<FaceRegion>,
}

impl FaceMeshEngine {
    fn new(model_path: &Path, min_presence: f32) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load ORT session from {}", model_path.display()))?;

        Ok(Self {
            session,
            min_presence,
            region: None,
        })
    }

    fn prepare_input(&self, frame: &Frame) -> Result<(ndarray::Array4<f32>, InputMapping)> {
        match self.region {
            Some(region) => {
                let (input, crop) = common::crop_region(frame, region, FACE_INPUT_SIZE)?;
                Ok((input, InputMapping::Crop(crop)))
            }
            None => {
                let (input, letterbox) = common::letterbox_frame(frame, FACE_INPUT_SIZE)?;
                Ok((input, InputMapping::Letterbox(letterbox)))
            }
        }
    }
}

impl LandmarkDetector for FaceMeshEngine {
    fn detect(&mut self, frame: &Frame) -> Result<RawDetection> {
        let (input, mapping) = self.prepare_input(frame)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("model returned no outputs"));
        }

        // Second output, when present, is the face-presence logit.
        let presence = if outputs.len() > 1 {
            outputs[1]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .map(common::sigmoid)
                .unwrap_or(1.0)
        } else {
            1.0
        };
        if presence < self.min_presence {
            if self.region.take().is_some() {
                log::debug!("face lost, searching the full frame");
            }
            return Ok(RawDetection::PixelFace {
                keypoints: Vec::new(),
            });
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let keypoints = common::decode_face_mesh(&flattened, &mapping)?;
        self.region = FaceRegion::around(&keypoints, REGION_MARGIN);
        Ok(RawDetection::PixelFace { keypoints })
    }
}
