//! Webcam capture on a dedicated thread.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Sender, TrySendError};
use nokhwa::{
    Buffer, Camera,
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution},
};
use rayon::prelude::*;

use crate::types::Frame;

/// Formats the `decoding` feature handles without system codecs.
const DECODABLE_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
    FrameFormat::GRAY,
];

/// Consecutive failed reads before the capture thread gives up.
const MAX_READ_FAILURES: u32 = 30;
const READ_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Which device to open and the resolution the virtual camera was set up for.
#[derive(Clone, Debug)]
pub struct CaptureSettings {
    pub index: CameraIndex,
    pub width: u32,
    pub height: u32,
}

impl CaptureSettings {
    pub fn new(index: u32, width: u32, height: u32) -> Self {
        Self {
            index: CameraIndex::Index(index),
            width,
            height,
        }
    }

    /// Closest to the configured size first, then anything fast, then anything at all.
    fn format_candidates(&self) -> [RequestedFormat<'static>; 3] {
        let wanted = Resolution::new(self.width, self.height);
        [
            RequestedFormat::with_formats(
                RequestedFormatType::HighestResolution(wanted),
                DECODABLE_FORMATS,
            ),
            RequestedFormat::with_formats(
                RequestedFormatType::AbsoluteHighestFrameRate,
                DECODABLE_FORMATS,
            ),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
        ]
    }

    fn open(&self) -> Result<Camera> {
        let mut last_err = None;
        for requested in self.format_candidates() {
            let opened = Camera::new(self.index.clone(), requested).and_then(|mut camera| {
                camera.open_stream()?;
                Ok(camera)
            });
            match opened {
                Ok(camera) => {
                    let resolution = camera.resolution();
                    log::info!(
                        "camera {} streaming {} as {}",
                        self.index,
                        resolution,
                        camera.frame_format()
                    );
                    if (resolution.width(), resolution.height()) != (self.width, self.height) {
                        log::warn!(
                            "camera delivers {resolution}, configured for {}x{}; landmarks follow the delivered size",
                            self.width,
                            self.height
                        );
                    }
                    return Ok(camera);
                }
                Err(err) => {
                    log::debug!("camera {} rejected a format request: {err}", self.index);
                    last_err = Some(err);
                }
            }
        }
        Err(match last_err {
            Some(err) => anyhow!(err).context(format!("no usable format on camera {}", self.index)),
            None => anyhow!("camera {} offered no format", self.index),
        })
    }
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
}

pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let devices = query(ApiBackend::Auto).context("failed to enumerate cameras")?;
    Ok(devices
        .into_iter()
        .map(|info| CameraDevice {
            index: info.index().clone(),
            label: info.human_name(),
        })
        .collect())
}

fn log_available_cameras() {
    match available_cameras() {
        Ok(devices) if devices.is_empty() => log::warn!("no cameras detected"),
        Ok(devices) => {
            for device in devices {
                log::info!("available camera {}: {}", device.index, device.label);
            }
        }
        Err(err) => log::warn!("{err:#}"),
    }
}

/// Capture thread handle; stops and joins on drop.
#[derive(Debug)]
pub struct CameraStream {
    stop: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl CameraStream {
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("camera capture thread panicked");
            }
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Open the camera and forward frames until the stream is stopped.
///
/// Frames are offered with `try_send`, so a busy detector simply misses them.
pub fn start_camera_stream(settings: CaptureSettings, frame_tx: Sender<Frame>) -> Result<CameraStream> {
    // Probe on the caller's thread so a missing device fails the call itself.
    if let Err(err) = settings.open() {
        log_available_cameras();
        return Err(err);
    }

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let worker = thread::Builder::new()
        .name("camera-capture".to_string())
        .spawn(move || match settings.open() {
            Ok(camera) => capture_loop(camera, &frame_tx, &stop_flag),
            Err(err) => log::error!("camera reopen failed: {err:#}"),
        })
        .context("failed to spawn camera thread")?;

    Ok(CameraStream {
        stop,
        worker: Some(worker),
    })
}

#[derive(Debug, Default)]
struct CaptureStats {
    delivered: u64,
    skipped: u64,
    decode_errors: u64,
}

fn capture_loop(mut camera: Camera, frame_tx: &Sender<Frame>, stop: &AtomicBool) {
    let mut stats = CaptureStats::default();
    let mut failures = 0u32;

    while !stop.load(Ordering::Relaxed) {
        let buffer = match camera.frame() {
            Ok(buffer) => {
                failures = 0;
                buffer
            }
            Err(err) => {
                failures += 1;
                if failures >= MAX_READ_FAILURES {
                    log::error!("camera stopped delivering frames: {err}");
                    break;
                }
                log::debug!("camera read failed ({failures} in a row): {err}");
                thread::sleep(READ_RETRY_DELAY);
                continue;
            }
        };

        let frame = match decode_frame(&buffer, Instant::now()) {
            Ok(frame) => frame,
            Err(err) => {
                stats.decode_errors += 1;
                log::warn!("{err:#}");
                continue;
            }
        };
        match frame_tx.try_send(frame) {
            Ok(()) => stats.delivered += 1,
            Err(TrySendError::Full(_)) => stats.skipped += 1,
            Err(TrySendError::Disconnected(_)) => break,
        }
    }

    if let Err(err) = camera.stop_stream() {
        log::warn!("failed to stop camera stream: {err}");
    }
    log::info!(
        "camera capture ended: {} delivered, {} skipped while the detector was busy, {} undecodable",
        stats.delivered,
        stats.skipped,
        stats.decode_errors
    );
}

/// Decode a captured buffer into an RGBA [`Frame`].
fn decode_frame(buffer: &Buffer, timestamp: Instant) -> Result<Frame> {
    let rgb = buffer
        .decode_image::<RgbFormat>()
        .with_context(|| format!("failed to decode {} camera frame", buffer.source_frame_format()))?;
    let (width, height) = rgb.dimensions();
    Ok(Frame {
        rgba: rgb_to_rgba(rgb.as_raw()),
        width,
        height,
        timestamp,
    })
}

fn rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    let mut rgba = vec![u8::MAX; rgb.len() / 3 * 4];
    rgba.par_chunks_exact_mut(4)
        .zip(rgb.par_chunks_exact(3))
        .for_each(|(dst, src)| dst[..3].copy_from_slice(src));
    rgba
}
