//! Landmark packets from an external tracker, JSON over UDP.
//!
//! Each datagram describes one camera frame:
//!
//! ```json
//! {"frame_width": 640, "frame_height": 480,
//!  "face_landmarks": [{"x": 0.5, "y": 0.4, "z": -0.02}, ...],
//!  "pose_landmarks": [{"x": 0.5, "y": 0.6, "z": 0.0, "visibility": 0.9}, null, ...]}
//! ```
//!
//! Older trackers send pixel-space `keypoints` (`{x, y, z, name}`) instead.

use std::{
    io::ErrorKind,
    net::UdpSocket,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use serde::Deserialize;

use super::{DetectorHandle, EventSink};
use crate::{
    config::DetectorConfig,
    error::DetectorError,
    landmarks::{Keypoint, RawDetection},
    orchestrator::{DetectedFrame, DetectorEvent},
    types::Landmark,
};

const READ_TIMEOUT: Duration = Duration::from_millis(100);
const MAX_DATAGRAM: usize = 65_536;

#[derive(Debug, Deserialize)]
struct Packet {
    frame_width: u32,
    frame_height: u32,
    #[serde(default)]
    face_landmarks: Option<Vec<Landmark>>,
    #[serde(default)]
    pose_landmarks: Option<Vec<Option<Landmark>>>,
    #[serde(default)]
    keypoints: Option<Vec<Keypoint>>,
}

/// Decode one datagram.
pub fn parse_packet(bytes: &[u8]) -> Result<DetectedFrame, DetectorError> {
    let packet: Packet =
        serde_json::from_slice(bytes).map_err(|e| DetectorError::Parse(e.to_string()))?;
    if packet.frame_width == 0 || packet.frame_height == 0 {
        return Err(DetectorError::Parse("frame dimensions must be non-zero".to_string()));
    }

    let detection = match (packet.keypoints, packet.face_landmarks, packet.pose_landmarks) {
        (Some(keypoints), _, _) if !keypoints.is_empty() => RawDetection::PixelFace { keypoints },
        (_, face, Some(pose)) => RawDetection::NormalizedFaceBody {
            face: face.unwrap_or_default(),
            pose,
        },
        (_, face, None) => RawDetection::NormalizedFace {
            face: face.unwrap_or_default(),
        },
    };

    Ok(DetectedFrame {
        detection,
        frame_width: packet.frame_width,
        frame_height: packet.frame_height,
        timestamp: Instant::now(),
    })
}

pub(super) fn start_receiver(
    cfg: &DetectorConfig,
    events: EventSink,
) -> Result<DetectorHandle, DetectorError> {
    let addr = format!("{}:{}", cfg.udp_listen_address, cfg.udp_port);
    let socket = UdpSocket::bind(&addr)
        .map_err(|e| DetectorError::Init(format!("failed to bind {addr}: {e}")))?;
    socket
        .set_read_timeout(Some(READ_TIMEOUT))
        .map_err(|e| DetectorError::Init(format!("failed to set read timeout: {e}")))?;
    log::info!("landmark receiver listening on {addr}");

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let handle = thread::spawn(move || {
        events.publish(DetectorEvent::Ready);
        receive_loop(&socket, &events, &stop_flag);
        log::info!("landmark receiver stopped");
    });

    Ok(DetectorHandle::new("udp", stop, handle))
}

fn receive_loop(socket: &UdpSocket, events: &EventSink, stop: &AtomicBool) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut parse_errors = 0u64;

    while !stop.load(Ordering::Relaxed) {
        let size = match socket.recv(&mut buf) {
            Ok(size) => size,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => {
                events.publish(DetectorEvent::Failed(format!("receive error: {e}")));
                return;
            }
        };

        match parse_packet(&buf[..size]) {
            Ok(frame) => {
                events.publish(DetectorEvent::Detection(frame));
            }
            Err(err) => {
                parse_errors += 1;
                // Log the first failure and then only occasionally.
                if parse_errors == 1 || parse_errors % 100 == 0 {
                    log::warn!("dropping packet ({parse_errors} so far): {err}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{FACE_LANDMARK_COUNT, POSE_LANDMARK_COUNT};

    fn point(x: f32, y: f32) -> serde_json::Value {
        serde_json::json!({"x": x, "y": y, "z": -0.01})
    }

    #[test]
    fn normalized_face_and_pose() {
        let face: Vec<_> = (0..FACE_LANDMARK_COUNT).map(|_| point(0.5, 0.4)).collect();
        let mut pose: Vec<serde_json::Value> = (0..POSE_LANDMARK_COUNT)
            .map(|_| serde_json::json!({"x": 0.5, "y": 0.6, "visibility": 0.9}))
            .collect();
        pose[5] = serde_json::Value::Null;
        let json = serde_json::json!({
            "frame_width": 1280,
            "frame_height": 720,
            "face_landmarks": face,
            "pose_landmarks": pose,
        })
        .to_string();

        let frame = parse_packet(json.as_bytes()).unwrap();
        assert_eq!((frame.frame_width, frame.frame_height), (1280, 720));
        match frame.detection {
            RawDetection::NormalizedFaceBody { face, pose } => {
                assert_eq!(face.len(), FACE_LANDMARK_COUNT);
                assert_eq!(pose.len(), POSE_LANDMARK_COUNT);
                assert!(pose[5].is_none());
                assert_eq!(pose[0].unwrap().visibility, Some(0.9));
                // z defaults to 0 when omitted
                assert_eq!(pose[0].unwrap().z, 0.0);
            }
            other => panic!("unexpected detection {other:?}"),
        }
    }

    #[test]
    fn face_only_packet() {
        let json = serde_json::json!({
            "frame_width": 640,
            "frame_height": 480,
            "face_landmarks": [point(0.1, 0.2)],
        })
        .to_string();
        let frame = parse_packet(json.as_bytes()).unwrap();
        assert!(matches!(frame.detection, RawDetection::NormalizedFace { ref face } if face.len() == 1));
    }

    #[test]
    fn legacy_pixel_keypoints() {
        let json = serde_json::json!({
            "frame_width": 640,
            "frame_height": 480,
            "keypoints": [{"x": 320.0, "y": 240.0, "z": -3.0, "name": "noseTip"}],
        })
        .to_string();
        let frame = parse_packet(json.as_bytes()).unwrap();
        match frame.detection {
            RawDetection::PixelFace { keypoints } => {
                assert_eq!(keypoints[0].x, 320.0);
                assert_eq!(keypoints[0].name.as_deref(), Some("noseTip"));
            }
            other => panic!("unexpected detection {other:?}"),
        }
    }

    #[test]
    fn empty_packet_is_an_empty_detection() {
        let frame = parse_packet(br#"{"frame_width": 640, "frame_height": 480}"#).unwrap();
        assert!(frame.detection.is_empty());
    }

    #[test]
    fn malformed_packets_are_rejected() {
        assert!(parse_packet(b"not json").is_err());
        assert!(parse_packet(br#"{"frame_width": 0, "frame_height": 480}"#).is_err());
    }

    fn free_port_config() -> DetectorConfig {
        // Borrow a free port from the OS.
        let spare = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = spare.local_addr().unwrap().port();
        drop(spare);
        DetectorConfig {
            udp_port: port,
            ..DetectorConfig::default()
        }
    }

    fn send_frame(width: u32, port: u16) {
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let packet = format!(r#"{{"frame_width": {width}, "frame_height": 240}}"#);
        sender.send_to(packet.as_bytes(), ("127.0.0.1", port)).unwrap();
    }

    #[test]
    fn receiver_forwards_packets() {
        let cfg = free_port_config();
        let (event_tx, event_rx) = crossbeam_channel::bounded(4);
        let handle = start_receiver(&cfg, EventSink::new(event_tx, event_rx.clone())).unwrap();
        assert!(matches!(
            event_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            DetectorEvent::Ready
        ));

        send_frame(320, cfg.udp_port);
        match event_rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            DetectorEvent::Detection(frame) => assert_eq!(frame.frame_width, 320),
            other => panic!("unexpected event {other:?}"),
        }
        handle.stop();
    }

    #[test]
    fn burst_keeps_the_newest_packet() {
        let cfg = free_port_config();
        let (event_tx, event_rx) = crossbeam_channel::bounded(2);
        let handle = start_receiver(&cfg, EventSink::new(event_tx, event_rx.clone())).unwrap();

        for width in 1..=6 {
            send_frame(width, cfg.udp_port);
        }
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut newest = None;
        while newest != Some(6) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
            let widths: Vec<u32> = event_rx
                .try_iter()
                .filter_map(|event| match event {
                    DetectorEvent::Detection(frame) => Some(frame.frame_width),
                    _ => None,
                })
                .collect();
            assert!(widths.len() <= 2, "queue held {widths:?}");
            newest = widths.last().copied().or(newest);
        }
        assert_eq!(newest, Some(6));
        handle.stop();
    }
}
