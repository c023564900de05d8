//! Ray type used for picking octants

use crate::core::types::DVec3;
use super::aabb::DAabb;

/// A ray defined by origin and direction
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: DVec3,
    pub direction: DVec3,
    /// Precomputed 1/direction for fast AABB intersection
    pub inv_direction: DVec3,
}

impl Ray {
    /// Create a new ray (direction should be normalized)
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self {
            origin,
            direction,
            inv_direction: direction.recip(),
        }
    }

    /// Ray-AABB intersection using slab method
    /// Returns Some((t_near, t_far)) if intersection, None otherwise; t_near is 0 from inside
    pub fn intersects_aabb(&self, aabb: &DAabb) -> Option<(f64, f64)> {
        let t1 = (aabb.min - self.origin) * self.inv_direction;
        let t2 = (aabb.max - self.origin) * self.inv_direction;

        // 0 * inf on an axis-parallel ray yields NaN; treat that slab as unbounded
        let t_min = t1.min(t2);
        let t_max = t1.max(t2);

        let t_near = [t_min.x, t_min.y, t_min.z]
            .into_iter()
            .filter(|t| !t.is_nan())
            .fold(f64::NEG_INFINITY, f64::max);
        let t_far = [t_max.x, t_max.y, t_max.z]
            .into_iter()
            .filter(|t| !t.is_nan())
            .fold(f64::INFINITY, f64::min);

        if t_near <= t_far && t_far >= 0.0 {
            Some((t_near.max(0.0), t_far))
        } else {
            None
        }
    }
}
