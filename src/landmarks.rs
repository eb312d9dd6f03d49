//! Canonical per-frame landmarks.
//!
//! Detectors report faces either in pixel space (named keypoints) or in
//! normalized space, optionally together with a body pose. Everything is
//! folded into [`FrameLandmarks`]: the face in pixel space, the pose left in
//! normalized space because the body strategies consume UV directly.

use serde::Deserialize;

use crate::types::{Landmark, LandmarkSet, LandmarkSpace};

pub const FACE_LANDMARK_COUNT: usize = 468;
pub const POSE_LANDMARK_COUNT: usize = 33;

/// Face mesh indices used by the alignment strategies.
pub mod face {
    pub const NOSE_TIP: usize = 1;
    pub const RIGHT_EYE_OUTER: usize = 33;
    pub const RIGHT_EYE_INNER: usize = 133;
    pub const LEFT_EYE_INNER: usize = 362;
    pub const LEFT_EYE_OUTER: usize = 263;
    pub const RIGHT_EAR: [usize; 4] = [234, 93, 132, 58];
    pub const LEFT_EAR: [usize; 4] = [454, 323, 361, 288];
}

/// Body pose indices.
pub mod pose {
    pub const LEFT_SHOULDER: usize = 11;
    pub const RIGHT_SHOULDER: usize = 12;
    pub const LEFT_HIP: usize = 23;
    pub const RIGHT_HIP: usize = 24;
}

/// Legacy pixel-space keypoint, optionally named by the detector.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    #[serde(default)]
    pub name: Option<String>,
}

/// What a detector hands over for one camera frame.
#[derive(Clone, Debug, PartialEq)]
pub enum RawDetection {
    PixelFace {
        keypoints: Vec<Keypoint>,
    },
    NormalizedFace {
        face: Vec<Landmark>,
    },
    NormalizedFaceBody {
        face: Vec<Landmark>,
        pose: Vec<Option<Landmark>>,
    },
}

impl RawDetection {
    pub fn is_empty(&self) -> bool {
        match self {
            RawDetection::PixelFace { keypoints } => keypoints.is_empty(),
            RawDetection::NormalizedFace { face } => face.is_empty(),
            RawDetection::NormalizedFaceBody { face, pose } => face.is_empty() && pose.is_empty(),
        }
    }
}

/// Canonical landmarks of one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameLandmarks {
    /// Pixel space, at least [`FACE_LANDMARK_COUNT`] slots.
    pub face: Option<LandmarkSet>,
    /// Normalized space, at least [`POSE_LANDMARK_COUNT`] slots.
    pub pose: Option<LandmarkSet>,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl FrameLandmarks {
    pub fn empty(frame_width: u32, frame_height: u32) -> Self {
        Self {
            face: None,
            pose: None,
            frame_width,
            frame_height,
        }
    }

    pub fn has_any(&self) -> bool {
        self.face.is_some() || self.pose.is_some()
    }

    /// Pixel-space face point as normalized screen UV.
    pub fn face_uv(&self, landmark: &Landmark) -> (f32, f32) {
        (
            landmark.x / self.frame_width.max(1) as f32,
            landmark.y / self.frame_height.max(1) as f32,
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LandmarkAdapter {
    frame_width: u32,
    frame_height: u32,
    min_pose_visibility: f32,
}

impl LandmarkAdapter {
    pub fn new(frame_width: u32, frame_height: u32, min_pose_visibility: f32) -> Self {
        Self {
            frame_width,
            frame_height,
            min_pose_visibility,
        }
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.frame_width, self.frame_height)
    }

    /// Frame dimensions follow the camera; a resolution switch re-targets the adapter.
    pub fn set_frame_size(&mut self, width: u32, height: u32) {
        self.frame_width = width;
        self.frame_height = height;
    }

    pub fn adapt(&self, raw: &RawDetection) -> FrameLandmarks {
        let mut out = FrameLandmarks::empty(self.frame_width, self.frame_height);
        match raw {
            RawDetection::PixelFace { keypoints } => {
                out.face = self.pixel_face(keypoints);
            }
            RawDetection::NormalizedFace { face } => {
                out.face = self.normalized_face(face);
            }
            RawDetection::NormalizedFaceBody { face, pose } => {
                out.face = self.normalized_face(face);
                out.pose = self.normalized_pose(pose);
            }
        }
        out
    }

    fn pixel_face(&self, keypoints: &[Keypoint]) -> Option<LandmarkSet> {
        if keypoints.len() < FACE_LANDMARK_COUNT {
            log::debug!(
                "dropping pixel face with {} keypoints (need {FACE_LANDMARK_COUNT})",
                keypoints.len()
            );
            return None;
        }
        let points = keypoints
            .iter()
            .map(|kp| Landmark::new(kp.x, kp.y, kp.z))
            .map(finite_or_none)
            .collect();
        Some(LandmarkSet::new(LandmarkSpace::Pixel, points))
    }

    fn normalized_face(&self, face: &[Landmark]) -> Option<LandmarkSet> {
        if face.len() < FACE_LANDMARK_COUNT {
            if !face.is_empty() {
                log::debug!(
                    "dropping normalized face with {} landmarks (need {FACE_LANDMARK_COUNT})",
                    face.len()
                );
            }
            return None;
        }
        let w = self.frame_width as f32;
        let h = self.frame_height as f32;
        let points = face
            .iter()
            .map(|lm| Landmark {
                x: lm.x * w,
                y: lm.y * h,
                z: lm.z * w,
                visibility: lm.visibility,
            })
            .map(finite_or_none)
            .collect();
        Some(LandmarkSet::new(LandmarkSpace::Pixel, points))
    }

    fn normalized_pose(&self, pose: &[Option<Landmark>]) -> Option<LandmarkSet> {
        if pose.len() < POSE_LANDMARK_COUNT {
            if !pose.is_empty() {
                log::debug!(
                    "dropping pose with {} landmarks (need {POSE_LANDMARK_COUNT})",
                    pose.len()
                );
            }
            return None;
        }
        let mut set = LandmarkSet::new(LandmarkSpace::Normalized, pose.to_vec());
        for slot in set.slots_mut() {
            let keep = match slot {
                Some(lm) => {
                    lm.is_finite()
                        && lm
                            .visibility
                            .map_or(true, |vis| vis >= self.min_pose_visibility)
                }
                None => false,
            };
            if !keep {
                *slot = None;
            }
        }
        Some(set)
    }
}

fn finite_or_none(lm: Landmark) -> Option<Landmark> {
    lm.is_finite().then_some(lm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized_face(n: usize) -> Vec<Landmark> {
        (0..n)
            .map(|i| Landmark::new(0.5, 0.25 + (i % 10) as f32 * 0.01, -0.01))
            .collect()
    }

    #[test]
    fn normalized_face_is_scaled_to_pixels() {
        let adapter = LandmarkAdapter::new(640, 480, 0.0);
        let out = adapter.adapt(&RawDetection::NormalizedFace {
            face: normalized_face(FACE_LANDMARK_COUNT),
        });
        let face = out.face.expect("face kept");
        assert_eq!(face.space(), LandmarkSpace::Pixel);
        let lm = face.get(0).unwrap();
        assert!((lm.x - 320.0).abs() < 1e-3);
        assert!((lm.y - 120.0).abs() < 1e-3);
        // z follows the frame width
        assert!((lm.z + 6.4).abs() < 1e-3);
    }

    #[test]
    fn short_face_is_treated_as_no_detection() {
        let adapter = LandmarkAdapter::new(640, 480, 0.0);
        let out = adapter.adapt(&RawDetection::NormalizedFace {
            face: normalized_face(467),
        });
        assert!(out.face.is_none());
        assert!(!out.has_any());
    }

    #[test]
    fn pixel_keypoints_pass_through() {
        let adapter = LandmarkAdapter::new(640, 480, 0.0);
        let keypoints = (0..FACE_LANDMARK_COUNT)
            .map(|i| Keypoint {
                x: i as f32,
                y: 10.0,
                z: 0.0,
                name: None,
            })
            .collect();
        let out = adapter.adapt(&RawDetection::PixelFace { keypoints });
        let face = out.face.unwrap();
        assert_eq!(face.get(100).unwrap().x, 100.0);
    }

    #[test]
    fn short_pose_is_dropped_but_face_survives() {
        let adapter = LandmarkAdapter::new(640, 480, 0.0);
        let out = adapter.adapt(&RawDetection::NormalizedFaceBody {
            face: normalized_face(FACE_LANDMARK_COUNT),
            pose: vec![Some(Landmark::new(0.5, 0.5, 0.0)); 20],
        });
        assert!(out.face.is_some());
        assert!(out.pose.is_none());
    }

    #[test]
    fn low_visibility_pose_points_become_empty() {
        let adapter = LandmarkAdapter::new(640, 480, 0.5);
        let mut points = vec![Some(Landmark::new(0.5, 0.5, 0.0)); POSE_LANDMARK_COUNT];
        points[pose::LEFT_HIP] = Some(Landmark {
            visibility: Some(0.1),
            ..Landmark::new(0.4, 0.8, 0.0)
        });
        let out = adapter.adapt(&RawDetection::NormalizedFaceBody {
            face: Vec::new(),
            pose: points,
        });
        let pose_set = out.pose.unwrap();
        assert_eq!(pose_set.space(), LandmarkSpace::Normalized);
        assert!(pose_set.get(pose::LEFT_HIP).is_none());
        assert!(pose_set.get(pose::LEFT_SHOULDER).is_some());
    }

    #[test]
    fn non_finite_points_become_empty() {
        let adapter = LandmarkAdapter::new(640, 480, 0.0);
        let mut points = normalized_face(FACE_LANDMARK_COUNT);
        points[face::NOSE_TIP] = Landmark::new(f32::NAN, 0.5, 0.0);
        let out = adapter.adapt(&RawDetection::NormalizedFace { face: points });
        assert!(out.face.unwrap().get(face::NOSE_TIP).is_none());
    }
}
