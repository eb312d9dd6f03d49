use super::{AlignResult, ScaleLimits, eye_centers, eye_roll};
use crate::coords::CameraRig;
use crate::landmarks::{FrameLandmarks, face};
use crate::types::{Landmark, Placement, Rotation};

pub(super) const SCALE_LIMITS: ScaleLimits = ScaleLimits::new(0.5, 4.0);

const DEPTH: f32 = -0.2;
const FORWARD_OFFSET: f32 = 0.05;
/// Bridge sits slightly above the eye line, as a fraction of the eye distance.
const UPWARD_OFFSET: f32 = 0.05;
const SCALE_GAIN: f32 = 20.0;
const YAW_GAIN: f32 = 0.8;
const PITCH_DISTANCE_SCALE: f32 = 1.2;
/// Resting nose-below-eyes angle of a level head.
const PITCH_BIAS: f32 = 0.4;

pub(super) fn align(landmarks: &FrameLandmarks, camera: &CameraRig) -> AlignResult {
    let Some(face_set) = landmarks.face.as_ref() else {
        return Ok(Placement::hidden());
    };
    let (Some((right, left)), Some(nose)) = (eye_centers(face_set), face_set.get(face::NOSE_TIP))
    else {
        return Ok(Placement::hidden());
    };

    let mid = right.midpoint(&left);
    let eye_distance = right.distance_2d(&left);

    let anchor = Landmark::new(mid.x, mid.y - eye_distance * UPWARD_OFFSET, mid.z);
    let (u, v) = landmarks.face_uv(&anchor);
    let position = camera.unproject(u, v, DEPTH + FORWARD_OFFSET)?;

    let rotation = head_rotation(&right, &left, &nose, eye_distance);
    let scale = SCALE_LIMITS.clamp(eye_distance / landmarks.frame_width.max(1) as f32 * SCALE_GAIN);

    Ok(Placement::single(position, rotation, scale))
}

fn head_rotation(right: &Landmark, left: &Landmark, nose: &Landmark, eye_distance: f32) -> Rotation {
    let mid = right.midpoint(left);
    // A zero eye distance would make both arctangents meaningless.
    let denom = eye_distance.max(f32::EPSILON);
    let yaw = (nose.x - mid.x).atan2(denom) * YAW_GAIN;
    let pitch = (nose.y - mid.y).atan2(denom * PITCH_DISTANCE_SCALE) - PITCH_BIAS;
    Rotation::new(pitch, yaw, eye_roll(right, left))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::fixtures::*;
    use crate::types::{LandmarkSet, LandmarkSpace};
    use approx::assert_relative_eq;

    #[test]
    fn front_face_is_level_and_scaled_by_eye_distance() {
        let d = 80.0;
        let placement = align(&with_face(front_face(d)), &camera()).unwrap();
        assert!(placement.visible);
        assert_relative_eq!(placement.rotation.roll, 0.0, epsilon = 1e-5);
        assert_relative_eq!(placement.rotation.yaw, 0.0, epsilon = 1e-5);
        let expected = (d / WIDTH as f32 * 20.0).clamp(0.5, 4.0);
        assert_relative_eq!(placement.scale, expected, epsilon = 1e-5);
    }

    #[test]
    fn anchor_is_centered_and_slightly_raised() {
        let placement = align(&with_face(front_face(80.0)), &camera()).unwrap();
        let pos = placement.position().unwrap();
        assert_relative_eq!(pos.x, 0.0, epsilon = 1e-4);
        assert!(pos.y > 0.0);
        assert_relative_eq!(pos.z, DEPTH + FORWARD_OFFSET, epsilon = 1e-4);
    }

    #[test]
    fn tilted_eyes_produce_roll() {
        let mut points = front_face(80.0).points().to_vec();
        // Raise the subject's left eye in the image (smaller y).
        for idx in [face::LEFT_EYE_INNER, face::LEFT_EYE_OUTER] {
            if let Some(lm) = points[idx].as_mut() {
                lm.y -= 20.0;
            }
        }
        let frame = with_face(LandmarkSet::new(LandmarkSpace::Pixel, points));
        let placement = align(&frame, &camera()).unwrap();
        assert!(placement.rotation.roll > 0.1);
    }

    #[test]
    fn nose_offset_turns_yaw() {
        let mut points = front_face(80.0).points().to_vec();
        if let Some(nose) = points[face::NOSE_TIP].as_mut() {
            nose.x += 30.0;
        }
        let frame = with_face(LandmarkSet::new(LandmarkSpace::Pixel, points));
        let placement = align(&frame, &camera()).unwrap();
        assert!(placement.rotation.yaw > 0.0);
        assert!(placement.rotation.yaw < std::f32::consts::FRAC_PI_2 * YAW_GAIN);
    }

    #[test]
    fn scale_is_clamped_for_extreme_eye_distances() {
        let tiny = align(&with_face(front_face(0.0)), &camera()).unwrap();
        assert_eq!(tiny.scale, 0.5);
        let huge = align(&with_face(front_face(5_000.0)), &camera()).unwrap();
        assert_eq!(huge.scale, 4.0);
    }
}
