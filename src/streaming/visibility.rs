//! Visibility and level-of-detail selection
//!
//! Each tick walks the octree top-down, always expanding the octant with the
//! largest projected screen size next, until the point budget is spent. An
//! octant outside the frustum or smaller than a fraction of the root's
//! projected size is pruned together with its whole subtree.

use std::time::Duration;

use crate::core::camera::ViewState;
use crate::core::config::StreamingConfig;
use crate::octree::{OctantId, Octree};
use super::priority::{OctantPriority, OctantPriorityQueue};

/// Receives a load request for every octant selected as visible
pub trait LoadTrigger {
    fn trigger_point_loading(&mut self, id: OctantId);
}

impl<F: FnMut(OctantId)> LoadTrigger for F {
    fn trigger_point_loading(&mut self, id: OctantId) {
        self(id)
    }
}

/// Per-tick visible set selection under a global point budget
pub struct VisibilityTester {
    point_threshold: u64,
    update_rate: Duration,
    min_proj_size_modifier: f64,
    /// Root projected size from the most recent update
    root_projected_size: f64,
    min_screen_projected_size: f64,
    /// Time since the last recomputation; starts due so the first update computes
    since_last_update: Duration,
    queue: OctantPriorityQueue,
    visible_nodes: Vec<OctantId>,
    number_of_visible_points: u64,
    was_updated: bool,
}

impl VisibilityTester {
    pub fn new(config: &StreamingConfig) -> Self {
        let update_rate = config.update_rate();
        Self {
            point_threshold: u64::from(config.point_threshold),
            update_rate,
            min_proj_size_modifier: f64::from(config.min_proj_size_modifier),
            root_projected_size: 0.0,
            min_screen_projected_size: 0.0,
            since_last_update: update_rate,
            queue: OctantPriorityQueue::new(0.0),
            visible_nodes: Vec::new(),
            number_of_visible_points: 0,
            was_updated: false,
        }
    }

    /// Visible octants of the most recent recomputation, largest first
    pub fn visible_nodes(&self) -> &[OctantId] {
        &self.visible_nodes
    }

    pub fn number_of_visible_points(&self) -> u64 {
        self.number_of_visible_points
    }

    /// True if the last call to `update` recomputed the visible set
    pub fn was_updated(&self) -> bool {
        self.was_updated
    }

    pub fn point_threshold(&self) -> u64 {
        self.point_threshold
    }

    pub fn set_point_threshold(&mut self, point_threshold: u32) {
        self.point_threshold = u64::from(point_threshold);
    }

    pub fn min_proj_size_modifier(&self) -> f64 {
        self.min_proj_size_modifier
    }

    /// Change the pruning fraction; the minimum size is recomputed immediately
    pub fn set_min_proj_size_modifier(&mut self, modifier: f64) {
        self.min_proj_size_modifier = modifier;
        self.min_screen_projected_size = self.root_projected_size * modifier;
    }

    /// Octants projecting smaller than this are pruned
    pub fn min_screen_projected_size(&self) -> f64 {
        self.min_screen_projected_size
    }

    /// Advance the clock and recompute the visible set if it is due
    ///
    /// Between recomputations the previous visible set stays authoritative.
    /// Returns `true` if this call recomputed.
    pub fn update<T: LoadTrigger + ?Sized>(
        &mut self,
        octree: &mut Octree,
        view: &ViewState,
        delta: Duration,
        trigger: &mut T,
    ) -> bool {
        self.was_updated = false;
        self.update_min_screen_projected_size(octree, view);

        if self.since_last_update < self.update_rate {
            self.since_last_update += delta;
            return false;
        }

        self.since_last_update = Duration::ZERO;
        self.determine_visibility(octree, view, trigger);
        self.was_updated = true;
        true
    }

    fn update_min_screen_projected_size(&mut self, octree: &mut Octree, view: &ViewState) {
        self.root_projected_size = match octree.get_mut(OctantId::ROOT) {
            Some(root) => root.compute_projected_size(view.camera_position, view.viewport_height_px, view.fov_y),
            None => 0.0,
        };
        self.min_screen_projected_size = self.root_projected_size * self.min_proj_size_modifier;
    }

    /// Rebuild the visible set from scratch, ignoring the update rate
    pub fn determine_visibility<T: LoadTrigger + ?Sized>(
        &mut self,
        octree: &mut Octree,
        view: &ViewState,
        trigger: &mut T,
    ) {
        for id in self.visible_nodes.drain(..) {
            if let Some(octant) = octree.get_mut(id) {
                octant.set_visible(false);
            }
        }
        self.number_of_visible_points = 0;
        self.queue.clear();

        if octree.root().is_none() {
            log::trace!("Visibility skipped: octree has no root");
            return;
        }

        self.update_min_screen_projected_size(octree, view);
        self.queue.set_min_projected_size(self.min_screen_projected_size);

        let mut pruned = 0usize;
        if !self.consider(octree, OctantId::ROOT, view) {
            pruned += 1;
        }

        while self.number_of_visible_points <= self.point_threshold {
            let Some(next) = self.queue.pop() else { break };

            trigger.trigger_point_loading(next.id);
            self.number_of_visible_points += u64::from(next.point_count);
            self.visible_nodes.push(next.id);

            let children: Vec<OctantId> = match octree.get_mut(next.id) {
                Some(octant) => {
                    octant.set_visible(true);
                    octant.child_ids().collect()
                }
                None => continue,
            };

            for child in children {
                if !self.consider(octree, child, view) {
                    pruned += 1;
                }
            }
        }

        log::debug!(
            "Visibility: {} octants, {} points (threshold {}), {} pruned, {} left queued",
            self.visible_nodes.len(),
            self.number_of_visible_points,
            self.point_threshold,
            pruned,
            self.queue.len()
        );
    }

    /// Score one octant and queue it if it is in view and large enough
    fn consider(&mut self, octree: &mut Octree, id: OctantId, view: &ViewState) -> bool {
        let Some(octant) = octree.get_mut(id) else { return false };

        let projected = octant.compute_projected_size(view.camera_position, view.viewport_height_px, view.fov_y);
        if !octant.intersects_or_inside_frustum(&view.frustum) {
            log::trace!("Octant {id:?} outside frustum");
            return false;
        }

        self.queue.push(OctantPriority::new(id, projected, octant.point_count()))
    }
}
