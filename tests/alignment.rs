mod common;

use approx::assert_relative_eq;
use common::*;
use tryon_universe::landmarks::{FACE_LANDMARK_COUNT, pose};
use tryon_universe::{AccessoryCategory, LandmarkAdapter, OcclusionMeshBuilder, RawDetection};

fn adapter() -> LandmarkAdapter {
    LandmarkAdapter::new(WIDTH, HEIGHT, 0.3)
}

#[test]
fn front_facing_glasses_from_normalized_detection() {
    let eye_distance = 90.0;
    let landmarks = adapter().adapt(&RawDetection::NormalizedFace {
        face: normalized_face(eye_distance),
    });

    let placement = AccessoryCategory::Glasses
        .align(&landmarks, &camera())
        .unwrap();
    assert!(placement.visible);
    assert_relative_eq!(placement.rotation.roll, 0.0, epsilon = 1e-4);
    let expected = (eye_distance / WIDTH as f32 * 20.0).clamp(0.5, 4.0);
    assert_relative_eq!(placement.scale, expected, epsilon = 1e-3);

    // Eyes are centered horizontally, so the anchor sits on the camera axis.
    let position = placement.position().unwrap();
    assert_relative_eq!(position.x, 0.0, epsilon = 1e-3);
}

#[test]
fn hips_out_of_frame_hide_the_shirt_but_not_the_necklace() {
    let mut body = upright_pose();
    body[pose::LEFT_HIP] = None;
    body[pose::RIGHT_HIP] = None;
    let landmarks = adapter().adapt(&RawDetection::NormalizedFaceBody {
        face: Vec::new(),
        pose: body,
    });

    let cam = camera();
    assert!(!AccessoryCategory::Shirt.align(&landmarks, &cam).unwrap().visible);
    assert!(AccessoryCategory::Necklace.align(&landmarks, &cam).unwrap().visible);
}

#[test]
fn low_visibility_hips_count_as_missing() {
    let mut body = upright_pose();
    for idx in [pose::LEFT_HIP, pose::RIGHT_HIP] {
        if let Some(hip) = body[idx].as_mut() {
            hip.visibility = Some(0.05);
        }
    }
    let landmarks = adapter().adapt(&RawDetection::NormalizedFaceBody {
        face: Vec::new(),
        pose: body,
    });
    assert!(!AccessoryCategory::Shirt.align(&landmarks, &camera()).unwrap().visible);
}

#[test]
fn earrings_come_in_pairs_either_side_of_the_face() {
    let landmarks = adapter().adapt(&RawDetection::NormalizedFace {
        face: normalized_face(90.0),
    });
    let placement = AccessoryCategory::Earrings
        .align(&landmarks, &camera())
        .unwrap();
    assert!(placement.visible);
    assert_eq!(placement.positions.len(), 2);
    for position in &placement.positions {
        assert!(position.is_finite());
    }
}

#[test]
fn scale_stays_within_declared_limits() {
    let cam = camera();
    for eye_distance in [0.0, 1.0, 90.0, 5000.0] {
        let landmarks = adapter().adapt(&RawDetection::NormalizedFace {
            face: normalized_face(eye_distance),
        });
        for category in [AccessoryCategory::Glasses, AccessoryCategory::Earrings] {
            let placement = category.align(&landmarks, &cam).unwrap();
            assert!(
                category.scale_limits().contains(placement.scale),
                "{category} scale {} at distance {eye_distance}",
                placement.scale
            );
        }
    }
}

#[test]
fn occlusion_mesh_from_a_detected_face() {
    let landmarks = adapter().adapt(&RawDetection::NormalizedFace {
        face: normalized_face(90.0),
    });
    let mut builder = OcclusionMeshBuilder::new(&Default::default());
    let mesh = builder.build(&landmarks, &camera()).unwrap();
    assert_eq!(mesh.vertices.len(), FACE_LANDMARK_COUNT);
    assert!(!mesh.indices.is_empty());
    assert_eq!(mesh.indices.len() % 3, 0);
    assert!(mesh.indices.iter().all(|&i| (i as usize) < FACE_LANDMARK_COUNT));
}

#[test]
fn short_face_yields_no_occlusion_mesh() {
    let mut face = normalized_face(90.0);
    face.truncate(FACE_LANDMARK_COUNT - 1);
    let landmarks = adapter().adapt(&RawDetection::NormalizedFace { face });
    let mut builder = OcclusionMeshBuilder::new(&Default::default());
    assert!(builder.build(&landmarks, &camera()).is_none());
}
