//! Per-category placement strategies.
//!
//! Every strategy is a pure function of the canonical landmarks and the camera.
//! A missing landmark is never an error: the strategy answers
//! [`Placement::hidden`] and the accessory is simply not drawn this frame.
//! Only numeric failures of the unprojection surface as `Err`, so the caller
//! can keep the previous placement instead of pushing NaN into the scene.

mod earrings;
mod glasses;
mod necklace;
mod shirt;

use crate::catalog::AccessoryCategory;
use crate::coords::CameraRig;
use crate::error::UnprojectError;
use crate::landmarks::FrameLandmarks;
use crate::types::{Landmark, LandmarkSet, Placement};

pub type AlignResult = Result<Placement, UnprojectError>;

/// Declared output range of a strategy's scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleLimits {
    pub min: f32,
    pub max: f32,
}

impl ScaleLimits {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

impl AccessoryCategory {
    pub fn align(&self, landmarks: &FrameLandmarks, camera: &CameraRig) -> AlignResult {
        match self {
            AccessoryCategory::Glasses => glasses::align(landmarks, camera),
            AccessoryCategory::Earrings => earrings::align(landmarks, camera),
            AccessoryCategory::Necklace => necklace::align(landmarks, camera),
            AccessoryCategory::Shirt => shirt::align(landmarks, camera),
        }
    }

    pub fn scale_limits(&self) -> ScaleLimits {
        match self {
            AccessoryCategory::Glasses => glasses::SCALE_LIMITS,
            AccessoryCategory::Earrings => earrings::SCALE_LIMITS,
            AccessoryCategory::Necklace => necklace::SCALE_LIMITS,
            AccessoryCategory::Shirt => shirt::SCALE_LIMITS,
        }
    }
}

/// Eye centers in pixel space: (image-left, image-right), i.e. the subject's
/// right eye first.
pub(crate) fn eye_centers(face: &LandmarkSet) -> Option<(Landmark, Landmark)> {
    use crate::landmarks::face::*;

    let right = face.get(RIGHT_EYE_OUTER)?.midpoint(&face.get(RIGHT_EYE_INNER)?);
    let left = face.get(LEFT_EYE_INNER)?.midpoint(&face.get(LEFT_EYE_OUTER)?);
    Some((right, left))
}

/// Roll of the eye line, converted from image (y down) to world (y up).
pub(crate) fn eye_roll(right: &Landmark, left: &Landmark) -> f32 {
    -(left.y - right.y).atan2(left.x - right.x)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::landmarks::{face, pose};
    use crate::types::LandmarkSpace;

    #[test]
    fn every_category_hides_without_landmarks() {
        let empty = FrameLandmarks::empty(WIDTH, HEIGHT);
        for category in AccessoryCategory::ALL {
            let placement = category.align(&empty, &camera()).unwrap();
            assert!(!placement.visible, "{category}");
        }
    }

    #[test]
    fn every_category_hides_when_a_named_index_is_missing() {
        let cam = camera();
        let mut face_points = front_face(80.0).points().to_vec();
        face_points[face::LEFT_EYE_OUTER] = None;
        face_points[face::LEFT_EAR[2]] = None;
        let mut pose_points = upright_pose().points().to_vec();
        pose_points[pose::RIGHT_SHOULDER] = None;

        let frame = FrameLandmarks {
            face: Some(LandmarkSet::new(LandmarkSpace::Pixel, face_points)),
            pose: Some(LandmarkSet::new(LandmarkSpace::Normalized, pose_points)),
            frame_width: WIDTH,
            frame_height: HEIGHT,
        };
        for category in AccessoryCategory::ALL {
            assert!(!category.align(&frame, &cam).unwrap().visible, "{category}");
        }
    }

    #[test]
    fn scale_limits_clamp_degenerate_values() {
        let limits = ScaleLimits::new(0.5, 4.0);
        assert_eq!(limits.clamp(0.0), 0.5);
        assert_eq!(limits.clamp(1e9), 4.0);
        assert_eq!(limits.clamp(f32::NAN), 0.5);
        assert!(limits.contains(2.0));
    }

    #[test]
    fn eye_roll_is_zero_for_a_level_face() {
        let face = front_face(100.0);
        let (right, left) = eye_centers(&face).unwrap();
        assert!(eye_roll(&right, &left).abs() < 1e-6);
        assert!((left.distance_2d(&right) - 100.0).abs() < 1e-3);
    }
}
