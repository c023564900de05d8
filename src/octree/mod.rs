//! Static spatial hierarchy of a point cloud
//!
//! The octree is built once from a reader-supplied descriptor and is never
//! restructured afterwards. Only the per-frame derived fields of each octant
//! (projected size, visibility flag) change, written by the visibility tester.

pub mod id;
pub mod octant;

pub use id::{OctantId, MAX_LEVEL};
pub use octant::{Octant, OctantDescriptor, projected_size};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::{DVec3, Result};
use crate::math::Ray;

/// Relative tolerance for the child-partition checks
const PARTITION_EPSILON: f64 = 1e-9;

/// Flat list of octants as produced by a point cloud reader
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OctreeDescriptor {
    pub octants: Vec<OctantDescriptor>,
}

impl OctreeDescriptor {
    /// Complete octree of the given depth with a fixed point count per octant
    pub fn uniform(center: DVec3, size: f64, depth: u8, points_per_octant: u32) -> Self {
        let mut octants = Vec::new();
        let mut stack = vec![(OctantId::ROOT, center, size)];

        while let Some((id, center, size)) = stack.pop() {
            octants.push(OctantDescriptor {
                id,
                center: center.to_array(),
                size,
                point_count: points_per_octant,
            });

            if id.level() < depth {
                let bounds = crate::math::DAabb::from_center_size(center, size);
                for position in 0..8u8 {
                    let child = bounds.child_octant(position);
                    stack.push((id.child(position), child.center(), size * 0.5));
                }
            }
        }

        Self { octants }
    }
}

/// Octree of point cloud octants keyed by id
#[derive(Clone, Debug, Default)]
pub struct Octree {
    octants: HashMap<OctantId, Octant>,
}

impl Octree {
    /// Build and validate an octree
    ///
    /// Fails fast when the root is missing, an octant has no parent, ids are
    /// duplicated, or a child does not occupy its exact slot of the parent cube.
    pub fn from_descriptor(descriptor: &OctreeDescriptor) -> Result<Self> {
        Self::from_octants(descriptor.octants.iter().map(Octant::from_descriptor))
    }

    pub fn from_octants(octants: impl IntoIterator<Item = Octant>) -> Result<Self> {
        let mut map: HashMap<OctantId, Octant> = HashMap::new();
        for octant in octants {
            if !(octant.size() > 0.0 && octant.size().is_finite()) {
                return Err(Error::MalformedOctree(format!(
                    "octant {:?} has invalid size {}",
                    octant.id(),
                    octant.size()
                )));
            }
            if let Some(previous) = map.insert(octant.id(), octant) {
                return Err(Error::MalformedOctree(format!("duplicate octant {:?}", previous.id())));
            }
        }

        if !map.contains_key(&OctantId::ROOT) {
            return Err(Error::MissingRoot);
        }

        let ids: Vec<OctantId> = map.keys().copied().filter(|id| !id.is_root()).collect();
        for id in ids {
            let (parent_id, position) = match (id.parent(), id.position_in_parent()) {
                (Some(parent), Some(position)) => (parent, position),
                _ => continue,
            };

            let child = &map[&id];
            let parent = map.get(&parent_id).ok_or_else(|| {
                Error::MalformedOctree(format!("octant {id:?} has no parent {parent_id:?}"))
            })?;

            let expected = parent.child_bounds(position);
            let tolerance = parent.size() * PARTITION_EPSILON;
            let size_ok = (child.size() - parent.size() * 0.5).abs() <= tolerance;
            let center_ok = child.center().distance(expected.center()) <= tolerance;
            if !size_ok || !center_ok {
                return Err(Error::MalformedOctree(format!(
                    "octant {id:?} (center {:?}, size {}) does not fill slot {position} of {parent_id:?}",
                    child.center(),
                    child.size()
                )));
            }

            if let Some(parent) = map.get_mut(&parent_id) {
                parent.set_child(position, id);
            }
        }

        log::debug!("Octree built with {} octants", map.len());

        Ok(Self { octants: map })
    }

    /// Octree without any octants; visibility over it is always empty
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<&Octant> {
        self.octants.get(&OctantId::ROOT)
    }

    pub fn get(&self, id: OctantId) -> Option<&Octant> {
        self.octants.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: OctantId) -> Option<&mut Octant> {
        self.octants.get_mut(&id)
    }

    pub fn contains(&self, id: OctantId) -> bool {
        self.octants.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.octants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.octants.is_empty()
    }

    /// All octants in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = &Octant> {
        self.octants.values()
    }

    /// Existing children of an octant
    pub fn children(&self, id: OctantId) -> impl Iterator<Item = &Octant> {
        self.octants
            .get(&id)
            .into_iter()
            .flat_map(|octant| octant.child_ids())
            .filter_map(|child| self.octants.get(&child))
    }

    pub fn total_point_count(&self) -> u64 {
        self.octants.values().map(|o| u64::from(o.point_count())).sum()
    }

    /// Octants hit by a ray, nearest entry first
    ///
    /// Descends only into octants the ray actually enters, so the cost follows
    /// the hit path rather than the tree size.
    pub fn octants_along_ray(&self, ray: &Ray) -> Vec<(OctantId, f64)> {
        let mut hits = Vec::new();
        let mut stack: Vec<OctantId> = self.root().map(|root| root.id()).into_iter().collect();

        while let Some(id) = stack.pop() {
            let Some(octant) = self.octants.get(&id) else { continue };
            if let Some(t) = octant.intersects_ray(ray) {
                hits.push((id, t));
                stack.extend(octant.child_ids());
            }
        }

        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn octant(path: &str, center: DVec3, size: f64) -> Octant {
        Octant::new(path.parse().expect("valid path"), center, size, 10)
    }

    #[test]
    fn test_uniform_descriptor() {
        let desc = OctreeDescriptor::uniform(DVec3::ZERO, 100.0, 2, 5);
        assert_eq!(desc.octants.len(), 1 + 8 + 64);

        let tree = Octree::from_descriptor(&desc).expect("valid tree");
        assert_eq!(tree.len(), 73);
        assert_eq!(tree.total_point_count(), 73 * 5);

        let root = tree.root().expect("root");
        assert_eq!(root.child_ids().count(), 8);
        assert_eq!(tree.children(OctantId::ROOT).count(), 8);

        for octant in tree.iter() {
            assert_eq!(octant.size(), 100.0 / f64::from(1u32 << octant.level()));
        }
    }

    #[test]
    fn test_missing_root_fails() {
        let result = Octree::from_octants(vec![octant("0", DVec3::splat(-25.0), 50.0)]);
        assert!(matches!(result, Err(Error::MissingRoot)));
    }

    #[test]
    fn test_orphan_fails() {
        let result = Octree::from_octants(vec![
            octant("", DVec3::ZERO, 100.0),
            octant("00", DVec3::splat(-37.5), 25.0),
        ]);
        assert!(matches!(result, Err(Error::MalformedOctree(_))));
    }

    #[test]
    fn test_misplaced_child_fails() {
        // Slot 7 is the +x +y +z corner, not -x -y -z
        let result = Octree::from_octants(vec![
            octant("", DVec3::ZERO, 100.0),
            octant("7", DVec3::splat(-25.0), 50.0),
        ]);
        assert!(matches!(result, Err(Error::MalformedOctree(_))));
    }

    #[test]
    fn test_wrong_child_size_fails() {
        let result = Octree::from_octants(vec![
            octant("", DVec3::ZERO, 100.0),
            octant("0", DVec3::splat(-25.0), 40.0),
        ]);
        assert!(matches!(result, Err(Error::MalformedOctree(_))));
    }

    #[test]
    fn test_duplicate_fails() {
        let result = Octree::from_octants(vec![
            octant("", DVec3::ZERO, 100.0),
            octant("", DVec3::ZERO, 100.0),
        ]);
        assert!(matches!(result, Err(Error::MalformedOctree(_))));
    }

    #[test]
    fn test_sparse_children() {
        let tree = Octree::from_octants(vec![
            octant("", DVec3::ZERO, 100.0),
            octant("7", DVec3::splat(25.0), 50.0),
        ])
        .expect("valid tree");

        let root = tree.root().expect("root");
        assert_eq!(root.children()[7], Some("7".parse().expect("valid")));
        assert!(root.children()[0].is_none());
        assert!(tree.get("7".parse().expect("valid")).expect("child").is_leaf());
    }

    #[test]
    fn test_empty_tree() {
        let tree = Octree::empty();
        assert!(tree.is_empty());
        assert!(tree.root().is_none());
        let ray = Ray::new(DVec3::ZERO, DVec3::X);
        assert!(tree.octants_along_ray(&ray).is_empty());
    }

    #[test]
    fn test_octants_along_ray() {
        let tree = Octree::from_descriptor(&OctreeDescriptor::uniform(DVec3::ZERO, 2.0, 1, 1))
            .expect("valid tree");
        // Runs along +x through the -y -z half of the cube
        let ray = Ray::new(DVec3::new(-5.0, -0.5, -0.5), DVec3::X);
        let hits = tree.octants_along_ray(&ray);

        let ids: Vec<String> = hits.iter().map(|(id, _)| id.to_string()).collect();
        assert_eq!(ids, vec!["", "0", "1"]);
        assert!(hits[1].1 < hits[2].1);
    }
}
