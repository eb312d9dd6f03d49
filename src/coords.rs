//! Screen <-> world mapping through the virtual camera.
//!
//! Screen coordinates are normalized with the origin at the top-left corner and
//! `v` growing downward, matching the landmark conventions of the detectors.
//! World space is right-handed with +y up; the default camera sits on +z and
//! looks toward the origin, so accessory depth planes are small negative `z`.

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::config::CameraConfig;
use crate::error::UnprojectError;

const PARALLEL_EPSILON: f32 = 1e-6;

/// Projection and view transforms of the render camera.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraRig {
    projection: Mat4,
    view: Mat4,
    view_projection: Mat4,
    inverse_view_projection: Mat4,
}

impl CameraRig {
    pub fn new(projection: Mat4, view: Mat4) -> Self {
        let view_projection = projection * view;
        Self {
            projection,
            view,
            view_projection,
            inverse_view_projection: view_projection.inverse(),
        }
    }

    pub fn perspective(
        fov_y_degrees: f32,
        aspect: f32,
        near: f32,
        far: f32,
        eye: Vec3,
        target: Vec3,
    ) -> Self {
        let projection = Mat4::perspective_rh(fov_y_degrees.to_radians(), aspect, near, far);
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        Self::new(projection, view)
    }

    pub fn from_config(cfg: &CameraConfig) -> Self {
        let aspect = cfg.width as f32 / cfg.height.max(1) as f32;
        Self::perspective(
            cfg.fov_y_degrees,
            aspect,
            cfg.near,
            cfg.far,
            Vec3::from_array(cfg.eye),
            Vec3::from_array(cfg.target),
        )
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn view_projection(&self) -> Mat4 {
        self.view_projection
    }

    /// Map a normalized screen position onto the world plane `z = plane_depth`.
    pub fn unproject(&self, u: f32, v: f32, plane_depth: f32) -> Result<Vec3, UnprojectError> {
        unproject(u, v, plane_depth, self)
    }

    pub fn project(&self, point: Vec3) -> Option<Vec2> {
        project(point, self)
    }
}

/// Normalized screen coordinates to normalized device coordinates (y flipped).
pub fn screen_to_ndc(u: f32, v: f32) -> Vec2 {
    Vec2::new(u * 2.0 - 1.0, -(v * 2.0 - 1.0))
}

pub fn ndc_to_screen(ndc: Vec2) -> Vec2 {
    Vec2::new((ndc.x + 1.0) / 2.0, (1.0 - ndc.y) / 2.0)
}

pub fn unproject(
    u: f32,
    v: f32,
    plane_depth: f32,
    camera: &CameraRig,
) -> Result<Vec3, UnprojectError> {
    let ndc = screen_to_ndc(u, v);
    let inv = camera.inverse_view_projection;

    // glam's right-handed perspective maps depth to [0, 1].
    let near = inv.project_point3(Vec3::new(ndc.x, ndc.y, 0.0));
    let far = inv.project_point3(Vec3::new(ndc.x, ndc.y, 1.0));
    if !near.is_finite() || !far.is_finite() {
        return Err(UnprojectError::NonFinite);
    }

    let dir = (far - near).normalize_or_zero();
    if dir.z.abs() < PARALLEL_EPSILON {
        return Err(UnprojectError::RayParallel(dir.z));
    }

    let distance = (plane_depth - near.z) / dir.z;
    if distance < 0.0 {
        return Err(UnprojectError::BehindCamera);
    }

    let point = near + dir * distance;
    if !point.is_finite() {
        return Err(UnprojectError::NonFinite);
    }
    Ok(point)
}

/// World point to normalized screen coordinates, `None` on or behind the camera.
pub fn project(point: Vec3, camera: &CameraRig) -> Option<Vec2> {
    let clip = camera.view_projection * Vec4::new(point.x, point.y, point.z, 1.0);
    if clip.w <= PARALLEL_EPSILON {
        return None;
    }
    let ndc = Vec2::new(clip.x / clip.w, clip.y / clip.w);
    Some(ndc_to_screen(ndc))
}

/// Normalized device depth of a world point, used for depth testing.
pub fn project_depth(point: Vec3, camera: &CameraRig) -> Option<(Vec2, f32)> {
    let clip = camera.view_projection * Vec4::new(point.x, point.y, point.z, 1.0);
    if clip.w <= PARALLEL_EPSILON {
        return None;
    }
    let ndc = Vec2::new(clip.x / clip.w, clip.y / clip.w);
    Some((ndc_to_screen(ndc), clip.z / clip.w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> CameraRig {
        CameraRig::perspective(63.0, 4.0 / 3.0, 0.01, 100.0, Vec3::new(0.0, 0.0, 2.0), Vec3::ZERO)
    }

    #[test]
    fn screen_center_lands_on_the_optical_axis() {
        let p = unproject(0.5, 0.5, -0.25, &camera()).unwrap();
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-4);
        assert_relative_eq!(p.z, -0.25, epsilon = 1e-4);
    }

    #[test]
    fn screen_top_maps_to_positive_world_y() {
        let p = unproject(0.5, 0.1, 0.0, &camera()).unwrap();
        assert!(p.y > 0.0);
        let left = unproject(0.1, 0.5, 0.0, &camera()).unwrap();
        assert!(left.x < 0.0);
    }

    #[test]
    fn round_trip_through_projection() {
        let cam = camera();
        let p = unproject(0.3, 0.7, -0.2, &cam).unwrap();
        let uv = project(p, &cam).unwrap();
        assert_relative_eq!(uv.x, 0.3, epsilon = 1e-4);
        assert_relative_eq!(uv.y, 0.7, epsilon = 1e-4);
    }

    #[test]
    fn ray_parallel_to_plane_is_rejected() {
        // Camera looking along +x: every ray has dir.z == 0 at the screen center.
        let cam = CameraRig::perspective(
            60.0,
            1.0,
            0.01,
            100.0,
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
        );
        let err = unproject(0.5, 0.5, -1.0, &cam).unwrap_err();
        assert!(matches!(err, UnprojectError::RayParallel(_)));
    }

    #[test]
    fn plane_behind_camera_is_rejected() {
        let err = unproject(0.5, 0.5, 5.0, &camera()).unwrap_err();
        assert_eq!(err, UnprojectError::BehindCamera);
    }

    #[test]
    fn points_behind_camera_do_not_project() {
        assert!(project(Vec3::new(0.0, 0.0, 3.0), &camera()).is_none());
    }
}
