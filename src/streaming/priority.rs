//! Priority queue of octants ordered by projected screen size

use crate::octree::OctantId;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Priority information for an octant
#[derive(Clone, Copy, Debug)]
pub struct OctantPriority {
    pub id: OctantId,
    pub projected_size: f64, // Higher = more important
    pub point_count: u32,
}

impl OctantPriority {
    pub fn new(id: OctantId, projected_size: f64, point_count: u32) -> Self {
        Self { id, projected_size, point_count }
    }
}

// Implement Ord/PartialOrd for BinaryHeap (max-heap by default)
impl Eq for OctantPriority {}

impl PartialEq for OctantPriority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for OctantPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        // Use total_cmp for f64 to handle NaN/infinity properly;
        // equal sizes pop the smaller id first
        self.projected_size
            .total_cmp(&other.projected_size)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for OctantPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Max-heap of octants waiting to be visited during one visibility tick
pub struct OctantPriorityQueue {
    heap: BinaryHeap<OctantPriority>,
    min_projected_size: f64, // Don't queue octants smaller than this
}

impl OctantPriorityQueue {
    /// Create a queue that rejects octants below `min_projected_size`
    pub fn new(min_projected_size: f64) -> Self {
        Self {
            heap: BinaryHeap::new(),
            min_projected_size,
        }
    }

    pub fn min_projected_size(&self) -> f64 {
        self.min_projected_size
    }

    pub fn set_min_projected_size(&mut self, min_projected_size: f64) {
        self.min_projected_size = min_projected_size;
    }

    /// Clear all queued octants
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Add an octant to the queue
    ///
    /// Returns `false` if it was rejected for being too small on screen.
    pub fn push(&mut self, priority: OctantPriority) -> bool {
        if priority.projected_size >= self.min_projected_size {
            self.heap.push(priority);
            true
        } else {
            false
        }
    }

    /// Get the octant with the largest projected size
    pub fn pop(&mut self) -> Option<OctantPriority> {
        self.heap.pop()
    }

    pub fn peek(&self) -> Option<&OctantPriority> {
        self.heap.peek()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
