use super::{AlignResult, ScaleLimits};
use crate::coords::CameraRig;
use crate::landmarks::{FrameLandmarks, pose};
use crate::types::{Placement, Rotation};

pub(super) const SCALE_LIMITS: ScaleLimits = ScaleLimits::new(0.1, 4.0);

const DEPTH: f32 = -0.3;
/// Neck base sits above the shoulder line (normalized units).
const UPWARD_OFFSET: f32 = 0.05;
const SCALE_GAIN: f32 = 6.0;

/// Pose landmarks are already normalized, so they are used as UV directly.
pub(super) fn align(landmarks: &FrameLandmarks, camera: &CameraRig) -> AlignResult {
    let Some(pose_set) = landmarks.pose.as_ref() else {
        return Ok(Placement::hidden());
    };
    let (Some(left), Some(right)) = (
        pose_set.get(pose::LEFT_SHOULDER),
        pose_set.get(pose::RIGHT_SHOULDER),
    ) else {
        return Ok(Placement::hidden());
    };

    let mid = left.midpoint(&right);
    let position = camera.unproject(mid.x, mid.y - UPWARD_OFFSET, DEPTH)?;
    let scale = SCALE_LIMITS.clamp(left.distance_2d(&right) * SCALE_GAIN);

    Ok(Placement::single(position, Rotation::IDENTITY, scale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::fixtures::*;
    use crate::landmarks::POSE_LANDMARK_COUNT;
    use crate::types::{Landmark, LandmarkSet, LandmarkSpace};
    use approx::assert_relative_eq;

    #[test]
    fn sits_between_the_shoulders() {
        let placement = align(&with_pose(upright_pose()), &camera()).unwrap();
        assert!(placement.visible);
        let pos = placement.position().unwrap();
        assert_relative_eq!(pos.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(pos.z, DEPTH, epsilon = 1e-4);
        assert_eq!(placement.rotation, Rotation::IDENTITY);
        // shoulders 0.3 apart
        assert_relative_eq!(placement.scale, 1.8, epsilon = 1e-4);
    }

    #[test]
    fn only_shoulders_are_required() {
        let mut points = vec![None; POSE_LANDMARK_COUNT];
        points[pose::LEFT_SHOULDER] = Some(Landmark::new(0.6, 0.5, 0.0));
        points[pose::RIGHT_SHOULDER] = Some(Landmark::new(0.4, 0.5, 0.0));
        let frame = with_pose(LandmarkSet::new(LandmarkSpace::Normalized, points));
        assert!(align(&frame, &camera()).unwrap().visible);
    }

    #[test]
    fn scale_clamps_for_coincident_and_distant_shoulders() {
        let mut points = vec![Some(Landmark::new(0.5, 0.5, 0.0)); POSE_LANDMARK_COUNT];
        let frame = with_pose(LandmarkSet::new(LandmarkSpace::Normalized, points.clone()));
        assert_eq!(align(&frame, &camera()).unwrap().scale, 0.1);

        points[pose::LEFT_SHOULDER] = Some(Landmark::new(50.0, 0.5, 0.0));
        let frame = with_pose(LandmarkSet::new(LandmarkSpace::Normalized, points));
        assert_eq!(align(&frame, &camera()).unwrap().scale, 4.0);
    }
}
