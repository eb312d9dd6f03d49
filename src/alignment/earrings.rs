use super::{AlignResult, ScaleLimits, eye_centers, eye_roll};
use crate::coords::CameraRig;
use crate::landmarks::{FrameLandmarks, face};
use crate::types::{Placement, Rotation};

pub(super) const SCALE_LIMITS: ScaleLimits = ScaleLimits::new(0.3, 3.0);

const DEPTH: f32 = -0.25;
const SCALE_GAIN: f32 = 8.0;
/// From the ear cluster center down toward the lobe, pushed slightly outward.
const RIGHT_LOBE_OFFSET: (f32, f32) = (-0.01, 0.03);
const LEFT_LOBE_OFFSET: (f32, f32) = (0.01, 0.03);

pub(super) fn align(landmarks: &FrameLandmarks, camera: &CameraRig) -> AlignResult {
    let Some(face_set) = landmarks.face.as_ref() else {
        return Ok(Placement::hidden());
    };
    let (Some((right_eye, left_eye)), Some(right_ear), Some(left_ear)) = (
        eye_centers(face_set),
        face_set.centroid(&face::RIGHT_EAR),
        face_set.centroid(&face::LEFT_EAR),
    ) else {
        return Ok(Placement::hidden());
    };

    let mut positions = Vec::with_capacity(2);
    for (ear, (du, dv)) in [(right_ear, RIGHT_LOBE_OFFSET), (left_ear, LEFT_LOBE_OFFSET)] {
        let (u, v) = landmarks.face_uv(&ear);
        positions.push(camera.unproject(u + du, v + dv, DEPTH)?);
    }

    let eye_distance = right_eye.distance_2d(&left_eye);
    let scale = SCALE_LIMITS.clamp(eye_distance / landmarks.frame_width.max(1) as f32 * SCALE_GAIN);

    Ok(Placement {
        positions,
        rotation: Rotation::new(0.0, 0.0, eye_roll(&right_eye, &left_eye)),
        scale,
        visible: true,
    })
}
