use std::f32::consts::PI;

use super::{AlignResult, ScaleLimits};
use crate::coords::CameraRig;
use crate::landmarks::{FrameLandmarks, pose};
use crate::smoothing::wrap_angle;
use crate::types::{Placement, Rotation};

/// Unlike the other categories the shirt scale has no upper bound.
pub(super) const SCALE_LIMITS: ScaleLimits = ScaleLimits::new(0.0, f32::INFINITY);

const DEPTH: f32 = -0.4;
const FORWARD_OFFSET: f32 = 0.05;
const SHOULDER_WEIGHT: f32 = 0.6;
const WIDTH_GAIN: f32 = 4.0;
const HEIGHT_GAIN: f32 = 1.8;
/// The garment model faces away from the camera in its rest pose.
const FACING_CORRECTION: f32 = PI;

pub(super) fn align(landmarks: &FrameLandmarks, camera: &CameraRig) -> AlignResult {
    let Some(pose_set) = landmarks.pose.as_ref() else {
        return Ok(Placement::hidden());
    };
    let (Some(l_shoulder), Some(r_shoulder), Some(l_hip), Some(r_hip)) = (
        pose_set.get(pose::LEFT_SHOULDER),
        pose_set.get(pose::RIGHT_SHOULDER),
        pose_set.get(pose::LEFT_HIP),
        pose_set.get(pose::RIGHT_HIP),
    ) else {
        return Ok(Placement::hidden());
    };

    let shoulder_center = l_shoulder.midpoint(&r_shoulder).to_vec3();
    let hip_center = l_hip.midpoint(&r_hip).to_vec3();
    let torso = shoulder_center * SHOULDER_WEIGHT + hip_center * (1.0 - SHOULDER_WEIGHT);

    let position = camera.unproject(torso.x, torso.y, DEPTH + FORWARD_OFFSET)?;

    let shoulder_width = l_shoulder.distance_2d(&r_shoulder);
    let torso_height = (hip_center.y - shoulder_center.y).abs();
    let scale = SCALE_LIMITS.clamp((shoulder_width * WIDTH_GAIN).max(torso_height * HEIGHT_GAIN));

    // Shoulder line seen from above: depth difference against horizontal run.
    let dx = l_shoulder.x - r_shoulder.x;
    let dz = l_shoulder.z - r_shoulder.z;
    let yaw = wrap_angle(dz.atan2(dx) + FACING_CORRECTION);

    Ok(Placement::single(position, Rotation::new(0.0, yaw, 0.0), scale))
}
