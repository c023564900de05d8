//! Expiring LRU cache keyed by octant
//!
//! Entries carry a last-access time. A periodic scan removes entries unused for
//! longer than the sliding expiration window, and the owner can force out the
//! least recently used entry under memory pressure. Removed values are handed
//! back to the caller with the reason, so each tier decides what eviction
//! means for it (drop raw points, queue GPU batches for disposal).

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Why an entry left the cache
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictionReason {
    /// Unused for longer than the sliding expiration window
    Expired,
    /// Forced out by memory pressure
    Budget,
    /// Explicitly evicted by the owner
    Removed,
}

/// An entry removed from the cache
#[derive(Debug)]
pub struct Evicted<K, V> {
    pub key: K,
    pub value: V,
    pub reason: EvictionReason,
}

struct CacheEntry<V> {
    value: V,
    last_access: Instant,
    /// Monotonic use counter; smallest = least recently used
    last_use: u64,
}

/// Cache with sliding expiration and LRU eviction on demand
pub struct ExpiringCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    sliding_expiration: Duration,
    scan_frequency: Duration,
    last_scan: Instant,
    use_counter: u64,
}

impl<K: Copy + Eq + Hash, V> ExpiringCache<K, V> {
    /// # Arguments
    /// * `sliding_expiration` - Entries unused for this long are removed by a scan
    /// * `scan_frequency` - Minimum time between two expiration scans
    pub fn new(sliding_expiration: Duration, scan_frequency: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            sliding_expiration,
            scan_frequency,
            last_scan: Instant::now(),
            use_counter: 0,
        }
    }

    fn next_use(&mut self) -> u64 {
        self.use_counter += 1;
        self.use_counter
    }

    /// Get an entry and mark it as used at `now`
    ///
    /// Entries only expire during a scan, so a stale entry that is still
    /// present is returned and refreshed.
    pub fn get(&mut self, key: K, now: Instant) -> Option<&V> {
        let tick = self.next_use();
        let entry = self.entries.get_mut(&key)?;
        entry.last_access = now;
        entry.last_use = tick;
        Some(&entry.value)
    }

    /// Get an entry without refreshing it
    pub fn peek(&self, key: K) -> Option<&V> {
        self.entries.get(&key).map(|e| &e.value)
    }

    /// Insert an entry used at `now`, returning the value it replaced
    pub fn insert(&mut self, key: K, value: V, now: Instant) -> Option<V> {
        let tick = self.next_use();
        self.entries
            .insert(key, CacheEntry { value, last_access: now, last_use: tick })
            .map(|old| old.value)
    }

    pub fn remove(&mut self, key: K) -> Option<V> {
        self.entries.remove(&key).map(|e| e.value)
    }

    pub fn contains(&self, key: K) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn least_recently_used(&self) -> Option<(K, Instant)> {
        self.entries
            .iter()
            .min_by_key(|(_, e)| e.last_use)
            .map(|(k, e)| (*k, e.last_access))
    }

    /// Remove the least recently used entry only if it was last used before `cutoff`
    pub fn pop_lru_before(&mut self, cutoff: Instant) -> Option<(K, V)> {
        match self.least_recently_used() {
            Some((key, last_access)) if last_access < cutoff => {
                self.entries.remove(&key).map(|e| (key, e.value))
            }
            _ => None,
        }
    }

    /// Run an expiration scan if the scan interval has elapsed
    pub fn scan_if_due(&mut self, now: Instant) -> Vec<Evicted<K, V>> {
        if now.saturating_duration_since(self.last_scan) < self.scan_frequency {
            return Vec::new();
        }
        self.collect_expired(now)
    }

    /// Remove every entry unused for at least the sliding expiration window
    pub fn collect_expired(&mut self, now: Instant) -> Vec<Evicted<K, V>> {
        self.last_scan = now;

        let window = self.sliding_expiration;
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, e)| now.saturating_duration_since(e.last_access) >= window)
            .map(|(k, _)| *k)
            .collect();

        expired
            .into_iter()
            .filter_map(|key| {
                self.entries.remove(&key).map(|e| Evicted {
                    key,
                    value: e.value,
                    reason: EvictionReason::Expired,
                })
            })
            .collect()
    }

    /// Remove all entries
    pub fn drain(&mut self) -> Vec<(K, V)> {
        self.entries.drain().map(|(k, e)| (k, e.value)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn cache() -> ExpiringCache<u32, &'static str> {
        ExpiringCache::new(secs(30), secs(31))
    }

    #[test]
    fn test_insert_and_get() {
        let mut cache = cache();
        let now = Instant::now();
        assert!(cache.is_empty());

        assert!(cache.insert(1, "a", now).is_none());
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(1));
        assert_eq!(cache.get(1, now), Some(&"a"));
        assert_eq!(cache.get(2, now), None);
    }

    #[test]
    fn test_insert_returns_replaced_value() {
        let mut cache = cache();
        let now = Instant::now();
        cache.insert(1, "a", now);

        assert_eq!(cache.insert(1, "b", now), Some("a"));
        assert_eq!(cache.peek(1), Some(&"b"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_refreshes_lru_order() {
        let mut cache = cache();
        let start = Instant::now();
        cache.insert(1, "a", start);
        cache.insert(2, "b", start);

        // Touch 1 so 2 becomes the oldest
        cache.get(1, start + secs(1));
        assert_eq!(cache.pop_lru_before(start + secs(2)), Some((2, "b")));
        assert!(cache.contains(1));
    }

    #[test]
    fn test_peek_does_not_refresh() {
        let mut cache = cache();
        let start = Instant::now();
        cache.insert(1, "a", start);
        cache.insert(2, "b", start);

        cache.peek(1);
        assert_eq!(cache.pop_lru_before(start + secs(1)), Some((1, "a")));
    }

    #[test]
    fn test_sliding_expiration() {
        let mut cache = cache();
        let start = Instant::now();
        cache.insert(1, "a", start);
        cache.insert(2, "b", start);

        // 2 is used at 20s and survives the scan at 32s
        cache.get(2, start + secs(20));
        let evicted = cache.collect_expired(start + secs(32));

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].key, 1);
        assert_eq!(evicted[0].reason, EvictionReason::Expired);
        assert!(cache.contains(2));
    }

    #[test]
    fn test_scan_frequency() {
        let mut cache = ExpiringCache::new(secs(15), secs(16));
        let start = Instant::now();
        cache.insert(7u32, 7u32, start);

        // Expired by age, but the scan is not due yet
        assert!(cache.scan_if_due(start + secs(15)).is_empty());
        assert!(cache.contains(7));

        let evicted = cache.scan_if_due(start + secs(17));
        assert_eq!(evicted.len(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_pop_lru_before() {
        let mut cache = cache();
        let start = Instant::now();
        cache.insert(1, "a", start);
        cache.insert(2, "b", start + secs(5));

        assert!(cache.pop_lru_before(start).is_none());
        assert_eq!(cache.pop_lru_before(start + secs(1)), Some((1, "a")));
        // 2 was used after the cutoff
        assert!(cache.pop_lru_before(start + secs(1)).is_none());
        assert_eq!(cache.pop_lru_before(start + secs(6)), Some((2, "b")));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_drain() {
        let mut cache = cache();
        let now = Instant::now();
        cache.insert(1, "a", now);
        cache.insert(2, "b", now);

        let mut drained = cache.drain();
        drained.sort();
        assert_eq!(drained, vec![(1, "a"), (2, "b")]);
        assert!(cache.is_empty());
    }
}
