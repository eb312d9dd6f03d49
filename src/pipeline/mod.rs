#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod detector;
pub mod preview;

use std::{
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, bounded};

use crate::{
    assets::FileAssetLoader,
    catalog::Catalog,
    config::Config,
    orchestrator::{DetectorEvent, FrameOrchestrator, Mode},
    scene::Renderer,
    status::{Status, StatusChannel},
    types::Frame,
};

pub use detector::{DetectorHandle, EventSink, needs_camera, start_detector};
pub use preview::PreviewRenderer;

/// Detector results queued ahead of the frame loop.
const EVENT_QUEUE: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub mode: Mode,
}

#[cfg(feature = "camera-nokhwa")]
type CameraHandle = camera::CameraStream;
/// No capture backend is compiled in, so no stream can exist.
#[cfg(not(feature = "camera-nokhwa"))]
enum CameraHandle {}

#[cfg(not(feature = "camera-nokhwa"))]
impl CameraHandle {
    fn stop(self) {
        match self {}
    }
}

#[cfg(feature = "camera-nokhwa")]
fn start_camera(config: &Config, frame_tx: Sender<Frame>) -> Result<CameraHandle> {
    let settings = camera::CaptureSettings::new(
        config.camera.index,
        config.camera.width,
        config.camera.height,
    );
    camera::start_camera_stream(settings, frame_tx).with_context(|| format!("failed to open camera {}", config.camera.index))
}

#[cfg(not(feature = "camera-nokhwa"))]
fn start_camera(_config: &Config, _frame_tx: Sender<Frame>) -> Result<CameraHandle> {
    Err(anyhow::anyhow!("camera support is not compiled in"))
}

/// Run the viewer until `preview.max_frames` is reached or the detector goes away.
pub fn run(config: &Config, catalog: &Catalog) -> Result<RunSummary> {
    let (status, status_rx) = StatusChannel::unbounded();
    let (frame_tx, frame_rx) = bounded::<Frame>(1);
    let (event_tx, event_rx) = bounded::<DetectorEvent>(EVENT_QUEUE);

    let events = EventSink::new(event_tx, event_rx.clone());

    let loader = FileAssetLoader::new(&config.catalog.asset_root);
    let mut orchestrator = FrameOrchestrator::new(config, event_rx, Box::new(loader), status);
    let mut renderer = PreviewRenderer::new(config.camera.width, config.camera.height);
    if let Some(dir) = &config.preview.snapshot_dir {
        renderer = renderer.with_snapshots(dir, config.preview.snapshot_every);
    }

    let mut camera_stream: Option<CameraHandle> = None;
    let mut camera_ok = true;
    if needs_camera(config.detector.backend) {
        match start_camera(config, frame_tx) {
            Ok(stream) => camera_stream = Some(stream),
            Err(err) => {
                log::error!("{err:#}");
                orchestrator.enter_simulated(format!("camera unavailable: {err}"));
                camera_ok = false;
            }
        }
    } else {
        drop(frame_tx);
    }

    let detector = if camera_ok {
        match start_detector(&config.detector, frame_rx, events) {
            Ok(Some(handle)) => Some(handle),
            Ok(None) => {
                orchestrator.enter_simulated("simulated backend selected");
                None
            }
            Err(err) => {
                log::error!("{err}");
                orchestrator.enter_simulated(err.to_string());
                None
            }
        }
    } else {
        None
    };

    let initial = match &config.catalog.initial_accessory {
        Some(id) => catalog.require(id)?,
        None => catalog.first(),
    };
    orchestrator
        .select_accessory(initial, &mut renderer)
        .context("failed to set up the initial accessory")?;

    let frames = frame_loop(config, &mut orchestrator, &mut renderer, &status_rx)?;
    let mode = orchestrator.mode();

    // Teardown: capture first, then inference, then renderer resources.
    if let Some(stream) = camera_stream {
        stream.stop();
    }
    if let Some(detector) = detector {
        detector.stop();
    }
    orchestrator
        .shutdown(&mut renderer)
        .context("failed to release renderer resources")?;
    log_status(&status_rx);
    log::info!(
        "rendered {frames} frames, {} meshes still live",
        renderer.live_meshes()
    );

    Ok(RunSummary { frames, mode })
}

fn frame_loop(
    config: &Config,
    orchestrator: &mut FrameOrchestrator,
    renderer: &mut PreviewRenderer,
    status_rx: &Receiver<Status>,
) -> Result<u64> {
    let frame_interval = Duration::from_secs_f64(1.0 / config.preview.target_fps.max(1) as f64);
    let mut frames = 0u64;

    loop {
        let tick_start = Instant::now();
        let outcome = orchestrator.tick(renderer).context("frame tick failed")?;
        frames += 1;
        log_status(status_rx);

        if config.preview.max_frames.is_some_and(|max| frames >= max) {
            break;
        }
        if outcome.detector_closed && orchestrator.mode() == Mode::Tracking {
            log::info!("detector finished, stopping");
            break;
        }

        if let Some(remaining) = frame_interval.checked_sub(tick_start.elapsed()) {
            thread::sleep(remaining);
        }
    }
    Ok(frames)
}

fn log_status(status_rx: &Receiver<Status>) {
    for status in status_rx.try_iter() {
        log::info!("status: {status}");
    }
}
