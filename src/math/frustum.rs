//! View frustum for culling

use crate::core::error::Error;
use crate::core::types::{DMat4, DVec3, DVec4, Result};
use super::aabb::DAabb;

/// A plane defined by normal and distance from origin
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub normal: DVec3,
    pub distance: f64,
}

impl Plane {
    pub fn new(normal: DVec3, distance: f64) -> Self {
        Self { normal, distance }
    }

    /// Signed distance from point to plane (positive = in front)
    pub fn distance_to_point(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.distance
    }

    /// True unless the box lies entirely on the negative side
    pub fn inside_or_intersecting(&self, aabb: &DAabb) -> bool {
        // p-vertex: the corner furthest along the normal
        let p = DVec3::new(
            if self.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
            if self.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
            if self.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
        );
        self.distance_to_point(p) >= 0.0
    }
}

/// View frustum with 6 planes (Near, Far, Left, Right, Top, Bottom)
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    planes: [Plane; 6],
}

impl Frustum {
    /// Build a frustum from explicit planes, ordered near, far, left, right, top, bottom
    ///
    /// Normals are normalized; a zero-length or non-finite plane is rejected.
    pub fn from_planes(planes: [Plane; 6]) -> Result<Self> {
        let mut normalized = planes;
        for (i, plane) in normalized.iter_mut().enumerate() {
            let len = plane.normal.length();
            if !len.is_finite() || len <= f64::EPSILON || !plane.distance.is_finite() {
                return Err(Error::InvalidFrustum(format!(
                    "plane {i} is degenerate (normal {:?}, distance {})",
                    plane.normal, plane.distance
                )));
            }
            plane.normal /= len;
            plane.distance /= len;
        }
        Ok(Self { planes: normalized })
    }

    /// Extract frustum planes from view-projection matrix
    pub fn from_view_projection(vp: &DMat4) -> Result<Self> {
        let m = vp.to_cols_array_2d();
        let row = |i: usize| DVec4::new(m[0][i], m[1][i], m[2][i], m[3][i]);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        let plane = |v: DVec4| Plane::new(DVec3::new(v.x, v.y, v.z), v.w);

        // Depth is [0, 1] for glam's perspective_rh, so the near plane is row2 alone
        Self::from_planes([
            plane(r2),
            plane(r3 - r2),
            plane(r3 + r0),
            plane(r3 - r0),
            plane(r3 - r1),
            plane(r3 + r1),
        ])
    }

    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    /// Check if point is inside frustum
    pub fn contains_point(&self, point: DVec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(point) >= 0.0)
    }

    /// Conjunction of the six plane-vs-box tests (conservative)
    pub fn intersects_aabb(&self, aabb: &DAabb) -> bool {
        self.planes.iter().all(|plane| plane.inside_or_intersecting(aabb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perspective_frustum() -> Frustum {
        let proj = DMat4::perspective_rh(60f64.to_radians(), 1.0, 0.1, 1000.0);
        let view = DMat4::look_at_rh(DVec3::new(0.0, 0.0, 500.0), DVec3::ZERO, DVec3::Y);
        Frustum::from_view_projection(&(proj * view)).expect("valid frustum")
    }

    #[test]
    fn test_plane_distance() {
        let plane = Plane::new(DVec3::Y, 0.0);
        assert_eq!(plane.distance_to_point(DVec3::new(0.0, 5.0, 0.0)), 5.0);
        assert_eq!(plane.distance_to_point(DVec3::new(0.0, -3.0, 0.0)), -3.0);
    }

    #[test]
    fn test_frustum_contains_point() {
        let frustum = perspective_frustum();
        assert!(frustum.contains_point(DVec3::ZERO));
        // Behind the camera
        assert!(!frustum.contains_point(DVec3::new(0.0, 0.0, 600.0)));
        // Far off to the side
        assert!(!frustum.contains_point(DVec3::new(5000.0, 0.0, 0.0)));
    }

    #[test]
    fn test_intersects_aabb() {
        let frustum = perspective_frustum();
        let inside = DAabb::from_center_size(DVec3::ZERO, 100.0);
        let outside = DAabb::from_center_size(DVec3::new(2000.0, 0.0, 0.0), 100.0);
        // Straddles the left plane
        let straddling = DAabb::from_center_size(DVec3::new(-290.0, 0.0, 0.0), 100.0);

        assert!(frustum.intersects_aabb(&inside));
        assert!(!frustum.intersects_aabb(&outside));
        assert!(frustum.intersects_aabb(&straddling));
    }

    #[test]
    fn test_degenerate_plane_rejected() {
        let good = Plane::new(DVec3::X, 0.0);
        let bad = Plane::new(DVec3::ZERO, 1.0);
        let result = Frustum::from_planes([good, good, good, good, good, bad]);
        assert!(matches!(result, Err(Error::InvalidFrustum(_))));
    }

    #[test]
    fn test_from_planes_normalizes() {
        let p = Plane::new(DVec3::new(0.0, 2.0, 0.0), 4.0);
        let frustum = Frustum::from_planes([p; 6]).expect("valid planes");
        assert!((frustum.planes()[0].normal.length() - 1.0).abs() < 1e-12);
        assert!((frustum.planes()[0].distance - 2.0).abs() < 1e-12);
    }
}
