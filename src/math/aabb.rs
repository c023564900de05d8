//! Axis-aligned bounding boxes
//!
//! `Aabb` is single precision and describes GPU batches; `DAabb` is double
//! precision and describes octant cubes.

use crate::core::types::{DVec3, Vec3};

/// Single-precision box around the vertices of a batch
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Inverted box that absorbs the first expanded point
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_point(point: Vec3) -> Self {
        Self::new(point, point)
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn center(&self) -> Vec3 {
        self.min.lerp(self.max, 0.5)
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn expand(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Smallest box enclosing both
    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb::new(self.min.min(other.min), self.max.max(other.max))
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Double-precision box, used for octant cubes
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DAabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl DAabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Cube around `center` with edge length `size`
    pub fn from_center_size(center: DVec3, size: f64) -> Self {
        let half = DVec3::splat(size * 0.5);
        Self::new(center - half, center + half)
    }

    pub fn center(&self) -> DVec3 {
        self.min.lerp(self.max, 0.5)
    }

    pub fn extent(&self) -> DVec3 {
        self.max - self.min
    }

    /// Inclusive on every face
    pub fn contains_point(&self, p: DVec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// One of the eight equal sub-boxes; bit 0 selects +x, bit 1 +y, bit 2 +z
    pub fn child_octant(&self, index: u8) -> DAabb {
        let half = self.extent() * 0.5;
        let select = |bit: u8| if index & bit != 0 { 1.0 } else { 0.0 };
        let min = self.min + half * DVec3::new(select(1), select(2), select(4));
        DAabb::new(min, min + half)
    }
}
