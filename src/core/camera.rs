//! Camera state consumed by visibility selection

use crate::core::types::{DMat4, DQuat, DVec3, Result};
use crate::math::Frustum;

/// Camera with position, rotation, and projection parameters
///
/// Point clouds are georeferenced and routinely exceed `f32` precision, so the
/// camera works in double precision like the octree it looks at.
#[derive(Clone, Debug)]
pub struct Camera {
    /// World position
    pub position: DVec3,
    /// Rotation as quaternion
    pub rotation: DQuat,
    /// Vertical field of view in radians
    pub fov_y: f64,
    /// Aspect ratio (width / height)
    pub aspect: f64,
    /// Near clip plane
    pub near: f64,
    /// Far clip plane
    pub far: f64,
}

impl Camera {
    /// Create a new camera looking down -Z
    pub fn new(position: DVec3, fov_y_degrees: f64, aspect: f64) -> Self {
        Self {
            position,
            rotation: DQuat::IDENTITY,
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near: 0.1,
            far: 10_000.0,
        }
    }

    /// Create camera looking at a target
    pub fn look_at(position: DVec3, target: DVec3, up: DVec3) -> Self {
        let forward = (target - position).normalize();
        let right = forward.cross(up).normalize();
        let up = right.cross(forward);

        let rotation = DQuat::from_mat3(&glam::DMat3::from_cols(right, up, -forward));

        Self {
            position,
            rotation,
            ..Self::default()
        }
    }

    /// Get view matrix (world to camera space)
    pub fn view_matrix(&self) -> DMat4 {
        let rotation_matrix = DMat4::from_quat(self.rotation.conjugate());
        let translation_matrix = DMat4::from_translation(-self.position);
        rotation_matrix * translation_matrix
    }

    /// Get projection matrix (camera to clip space)
    pub fn projection_matrix(&self) -> DMat4 {
        DMat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    /// Get combined view-projection matrix
    pub fn view_projection(&self) -> DMat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Get forward direction (negative Z in camera space)
    pub fn forward(&self) -> DVec3 {
        self.rotation * -DVec3::Z
    }

    /// Update aspect ratio (call on window resize)
    pub fn set_aspect(&mut self, width: f64, height: f64) {
        self.aspect = width / height;
    }

    /// Snapshot of everything visibility selection needs for one tick
    pub fn view_state(&self, viewport_height_px: u32) -> Result<ViewState> {
        let frustum = Frustum::from_view_projection(&self.view_projection())?;
        Ok(ViewState {
            camera_position: self.position,
            viewport_height_px,
            fov_y: self.fov_y,
            frustum,
        })
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(DVec3::new(0.0, 0.0, 5.0), 60.0, 16.0 / 9.0)
    }
}

/// Per-tick camera snapshot handed to the visibility tester
#[derive(Clone, Copy, Debug)]
pub struct ViewState {
    pub camera_position: DVec3,
    pub viewport_height_px: u32,
    /// Vertical field of view in radians
    pub fov_y: f64,
    pub frustum: Frustum,
}
