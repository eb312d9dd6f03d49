#[cfg(feature = "detector-ort")]
mod common;
#[cfg(feature = "detector-ort")]
mod ort;
pub mod udp;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::{
    config::{DetectorBackendKind, DetectorConfig},
    error::DetectorError,
    landmarks::RawDetection,
    orchestrator::{DetectedFrame, DetectorEvent},
    types::Frame,
};

const FRAME_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Frame-driven landmark model.
#[cfg_attr(not(feature = "detector-ort"), allow(dead_code))]
pub(crate) trait LandmarkDetector: Send + 'static {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<RawDetection>;
}

/// Worker thread of a running detector backend; stops and joins on drop.
#[derive(Debug)]
pub struct DetectorHandle {
    label: &'static str,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl DetectorHandle {
    pub(crate) fn new(
        label: &'static str,
        stop: Arc<AtomicBool>,
        handle: thread::JoinHandle<()>,
    ) -> Self {
        Self {
            label,
            stop,
            handle: Some(handle),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("{} detector worker panicked", self.label);
            }
        }
    }
}

impl Drop for DetectorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Producer side of the detector event queue.
///
/// The queue is bounded. When it is full the oldest queued detection is
/// evicted, so the newest result always gets in and a slow frame loop sees
/// fresh landmarks. `Ready` and `Failed` are never evicted. Publishing never
/// blocks, and since the sink holds a receiver the queue never reports a
/// closed consumer; workers end through their stop flag instead.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: Sender<DetectorEvent>,
    evict: Receiver<DetectorEvent>,
}

impl EventSink {
    /// `evict` must be a receiver of the same channel as `tx`.
    pub fn new(tx: Sender<DetectorEvent>, evict: Receiver<DetectorEvent>) -> Self {
        Self { tx, evict }
    }

    pub fn publish(&self, event: DetectorEvent) {
        for control in self.push(event) {
            // Control events pushed out to make room go back in behind it.
            for lost in self.push(control) {
                log::debug!("detector event queue overflowed, dropping {lost:?}");
            }
        }
    }

    /// Queue `event`, returning the control events evicted on the way.
    fn push(&self, mut event: DetectorEvent) -> Vec<DetectorEvent> {
        let mut displaced = Vec::new();
        loop {
            match self.tx.try_send(event) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => return displaced,
                Err(TrySendError::Full(back)) => {
                    event = back;
                    match self.evict.try_recv() {
                        Ok(DetectorEvent::Detection(_)) => {}
                        Ok(control) => displaced.push(control),
                        // Drained by the consumer meanwhile, or a zero-capacity queue.
                        Err(_) => {
                            let _ = self.tx.try_send(event);
                            return displaced;
                        }
                    }
                }
            }
        }
    }
}

/// Whether the backend consumes camera frames.
pub fn needs_camera(kind: DetectorBackendKind) -> bool {
    matches!(kind, DetectorBackendKind::Ort)
}

/// Start the configured backend.
///
/// Returns `Ok(None)` for the simulated backend, which has no worker.
/// Failures after the worker is running arrive as [`DetectorEvent::Failed`].
pub fn start_detector(
    cfg: &DetectorConfig,
    frame_rx: Receiver<Frame>,
    events: EventSink,
) -> Result<Option<DetectorHandle>, DetectorError> {
    log::info!("starting detector backend: {:?}", cfg.backend);
    match cfg.backend {
        DetectorBackendKind::Simulated => Ok(None),
        DetectorBackendKind::Udp => udp::start_receiver(cfg, events).map(Some),
        #[cfg(feature = "detector-ort")]
        DetectorBackendKind::Ort => Ok(Some(ort::start_worker(cfg, frame_rx, events))),
        #[cfg(not(feature = "detector-ort"))]
        DetectorBackendKind::Ort => {
            drop((frame_rx, events));
            Err(DetectorError::BackendUnavailable("ort".to_string()))
        }
    }
}

#[cfg_attr(not(feature = "detector-ort"), allow(dead_code))]
fn run_worker_loop<D: LandmarkDetector>(
    mut detector: D,
    frame_rx: Receiver<Frame>,
    events: EventSink,
    stop: &AtomicBool,
) {
    while let Some(frame) = recv_latest_frame(&frame_rx, stop) {
        match detector.detect(&frame) {
            Ok(detection) => {
                let event = DetectorEvent::Detection(DetectedFrame {
                    detection,
                    frame_width: frame.width,
                    frame_height: frame.height,
                    timestamp: frame.timestamp,
                });
                events.publish(event);
            }
            Err(err) => {
                log::warn!("landmark inference failed: {err:?}");
            }
        }
    }
    log::debug!("detector worker exiting");
}

/// Block for the next frame, then skip ahead to the newest one queued.
fn recv_latest_frame(frame_rx: &Receiver<Frame>, stop: &AtomicBool) -> Option<Frame> {
    let mut frame = loop {
        if stop.load(Ordering::Relaxed) {
            return None;
        }
        match frame_rx.recv_timeout(FRAME_POLL_INTERVAL) {
            Ok(frame) => break frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    };
    while let Ok(newer) = frame_rx.try_recv() {
        frame = newer;
    }
    Some(frame)
}
