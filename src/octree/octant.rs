//! One cubic node of the point cloud octree

use serde::{Deserialize, Serialize};

use crate::core::types::DVec3;
use crate::math::{DAabb, Frustum, Ray};
use super::id::OctantId;

/// Distance used when the camera sits exactly on an octant center
pub const MIN_CAMERA_DISTANCE: f64 = 1e-4;

/// Octant node: structural data plus per-frame derived state
#[derive(Clone, Debug)]
pub struct Octant {
    id: OctantId,
    center: DVec3,
    size: f64,
    children: [Option<OctantId>; 8],
    point_count: u32,
    /// Recomputed every visibility tick, never persisted
    projected_screen_size: f64,
    /// Recomputed every visibility tick, never persisted
    is_visible: bool,
}

/// Serializable structural description of an octant, as delivered by a reader
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OctantDescriptor {
    pub id: OctantId,
    pub center: [f64; 3],
    pub size: f64,
    pub point_count: u32,
}

impl Octant {
    /// Create a leaf octant; children are attached by the octree
    pub fn new(id: OctantId, center: DVec3, size: f64, point_count: u32) -> Self {
        Self {
            id,
            center,
            size,
            children: [None; 8],
            point_count,
            projected_screen_size: 0.0,
            is_visible: false,
        }
    }

    pub fn from_descriptor(desc: &OctantDescriptor) -> Self {
        Self::new(desc.id, DVec3::from_array(desc.center), desc.size, desc.point_count)
    }

    pub fn id(&self) -> OctantId {
        self.id
    }

    pub fn center(&self) -> DVec3 {
        self.center
    }

    /// Cube edge length
    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn level(&self) -> u8 {
        self.id.level()
    }

    pub fn point_count(&self) -> u32 {
        self.point_count
    }

    pub fn children(&self) -> &[Option<OctantId>; 8] {
        &self.children
    }

    pub fn child_ids(&self) -> impl Iterator<Item = OctantId> + '_ {
        self.children.iter().flatten().copied()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }

    pub fn projected_screen_size(&self) -> f64 {
        self.projected_screen_size
    }

    pub fn is_visible(&self) -> bool {
        self.is_visible
    }

    pub(crate) fn set_visible(&mut self, visible: bool) {
        self.is_visible = visible;
    }

    pub(crate) fn set_child(&mut self, position: u8, child: OctantId) {
        self.children[position as usize] = Some(child);
    }

    pub fn min(&self) -> DVec3 {
        self.center - DVec3::splat(self.size * 0.5)
    }

    pub fn max(&self) -> DVec3 {
        self.center + DVec3::splat(self.size * 0.5)
    }

    pub fn bounds(&self) -> DAabb {
        DAabb::from_center_size(self.center, self.size)
    }

    /// Cube the child at `position` must occupy
    pub fn child_bounds(&self, position: u8) -> DAabb {
        self.bounds().child_octant(position)
    }

    /// Compute and store the apparent size on screen, in pixels
    pub fn compute_projected_size(&mut self, camera_position: DVec3, viewport_height_px: u32, fov_y: f64) -> f64 {
        self.projected_screen_size = projected_size(self.center, self.size, camera_position, viewport_height_px, fov_y);
        self.projected_screen_size
    }

    /// False only if the cube is fully outside one of the six planes
    pub fn intersects_or_inside_frustum(&self, frustum: &Frustum) -> bool {
        frustum.intersects_aabb(&self.bounds())
    }

    pub fn contains_point(&self, point: DVec3) -> bool {
        self.bounds().contains_point(point)
    }

    /// Entry distance along the ray, if it hits the cube
    pub fn intersects_ray(&self, ray: &Ray) -> Option<f64> {
        ray.intersects_aabb(&self.bounds()).map(|(t_near, _)| t_near)
    }
}

/// `viewport_height / 2 * size / (tan(fov / 2) * distance)`
pub fn projected_size(center: DVec3, size: f64, camera_position: DVec3, viewport_height_px: u32, fov_y: f64) -> f64 {
    let distance = center.distance(camera_position).max(MIN_CAMERA_DISTANCE);
    let slope = (fov_y / 2.0).tan().abs();
    f64::from(viewport_height_px) / 2.0 * size / (slope * distance)
}
