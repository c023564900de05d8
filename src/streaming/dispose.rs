//! Deferred, rate-limited release of evicted GPU data
//!
//! Evicted batch entries wait here before their handles are dropped. A node
//! that comes back into view before its turn is taken out again unchanged.
//! Releases are spread over frames so a burst of evictions does not cause a
//! frame spike.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::octree::OctantId;

/// FIFO of evicted entries awaiting release
pub struct DisposeQueue<V> {
    /// Release order; entries whose sequence no longer matches were un-evicted
    order: VecDeque<(OctantId, u64)>,
    entries: HashMap<OctantId, (u64, V)>,
    next_seq: u64,
    dispose_rate: Duration,
    max_per_pass: usize,
    since_last_pass: Duration,
}

impl<V> DisposeQueue<V> {
    /// # Arguments
    /// * `dispose_rate` - Minimum time between two release passes
    /// * `max_per_pass` - Entries released per pass
    pub fn new(dispose_rate: Duration, max_per_pass: usize) -> Self {
        Self {
            order: VecDeque::new(),
            entries: HashMap::new(),
            next_seq: 0,
            dispose_rate,
            max_per_pass: max_per_pass.max(1),
            since_last_pass: Duration::ZERO,
        }
    }

    /// Queue an entry for release; an older entry for the same id is returned
    pub fn push(&mut self, id: OctantId, value: V) -> Option<V> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.push_back((id, seq));
        self.entries.insert(id, (seq, value)).map(|(_, old)| old)
    }

    /// Take an entry back out before it is released
    pub fn un_evict(&mut self, id: OctantId) -> Option<V> {
        self.entries.remove(&id).map(|(_, value)| value)
    }

    pub fn contains(&self, id: OctantId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Advance the pass clock and, if a pass is due, take the oldest entries
    ///
    /// Dropping the returned values releases their resources.
    pub fn process(&mut self, delta: Duration) -> Vec<(OctantId, V)> {
        if self.since_last_pass < self.dispose_rate {
            self.since_last_pass += delta;
            return Vec::new();
        }
        self.since_last_pass = Duration::ZERO;
        self.pop_oldest(self.max_per_pass)
    }

    /// Take up to `count` of the oldest entries regardless of the pass clock
    pub fn pop_oldest(&mut self, count: usize) -> Vec<(OctantId, V)> {
        let mut released = Vec::new();
        while released.len() < count {
            let Some((id, seq)) = self.order.pop_front() else { break };
            let current = matches!(self.entries.get(&id), Some((s, _)) if *s == seq);
            if current {
                if let Some((_, value)) = self.entries.remove(&id) {
                    released.push((id, value));
                }
            }
        }
        released
    }

    /// Take every entry, oldest first
    pub fn drain(&mut self) -> Vec<(OctantId, V)> {
        let all = self.entries.len();
        let released = self.pop_oldest(all);
        self.order.clear();
        released
    }
}
