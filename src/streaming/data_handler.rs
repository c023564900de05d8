//! Tiered streaming cache: raw points, GPU batches, deferred disposal
//!
//! The render thread asks `get_or_request` for every visible octant each
//! frame. The answer comes from the first tier that has the octant:
//!
//! 1. resident batches (refreshing their last access)
//! 2. the dispose queue (un-evicted at zero cost)
//! 3. resident raw points (converted to batches on the spot)
//! 4. nothing, in which case a background load is queued
//!
//! None of these steps blocks on I/O. Batches leave the resident tier through
//! sliding expiration or memory pressure and wait in the dispose queue until a
//! rate-limited pass drops their handles.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::config::StreamingConfig;
use crate::core::types::Result;
use crate::octree::OctantId;
use crate::points::{BatchBuilder, BatchOptions, PointBatch};
use super::budget::MemoryBudget;
use super::cache::{EvictionReason, ExpiringCache};
use super::dispose::DisposeQueue;
use super::gpu::BatchFactory;
use super::loader::{LoadStats, PointLoader};
use super::source::PointReader;
use super::visibility::LoadTrigger;

/// GPU handles of one octant plus the bytes they occupy
pub struct BatchEntry<H> {
    pub handles: Vec<H>,
    pub byte_size: usize,
}

/// Snapshot of cache activity
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamingStats {
    pub loads: LoadStats,
    pub loading: usize,
    pub resident_point_sets: usize,
    pub resident_batch_sets: usize,
    pub pending_dispose: usize,
    pub batches_built: u64,
    pub batch_failures: u64,
    pub un_evictions: u64,
    pub expired_batch_sets: u64,
    pub expired_point_sets: u64,
    pub budget_evictions: u64,
    pub disposed: u64,
    pub cpu_bytes: usize,
    pub gpu_bytes: usize,
}

/// Streaming cache for one point cloud
pub struct StreamingCache<F: BatchFactory> {
    loader: PointLoader,
    builder: BatchBuilder,
    factory: F,
    batches: ExpiringCache<OctantId, BatchEntry<F::Handle>>,
    dispose_queue: DisposeQueue<BatchEntry<F::Handle>>,
    budget: MemoryBudget,
    /// Entries used at or after this instant are never force-evicted
    frame_start: Instant,
    stats: StreamingStats,
}

impl<F: BatchFactory> StreamingCache<F> {
    /// Create a cache with a dedicated loader runtime
    pub fn new(reader: Arc<dyn PointReader>, factory: F, config: &StreamingConfig) -> Result<Self> {
        config.validate()?;
        let loader = PointLoader::new(reader, config)?;
        Self::with_loader(loader, factory, config)
    }

    /// Create a cache around an already configured loader
    pub fn with_loader(loader: PointLoader, factory: F, config: &StreamingConfig) -> Result<Self> {
        config.validate()?;
        let builder = BatchBuilder::new(loader.reader().point_schema(), BatchOptions::from_config(config))?;

        log::info!(
            "Streaming cache ready: schema {}, {} load slots, batch window {:?}",
            builder.schema(),
            config.max_nodes_to_load,
            config.sliding_expiration()
        );

        Ok(Self {
            loader,
            builder,
            factory,
            batches: ExpiringCache::new(config.sliding_expiration(), config.expiration_scan_frequency()),
            dispose_queue: DisposeQueue::new(config.dispose_rate(), config.max_disposals_per_pass as usize),
            budget: MemoryBudget::new(config.cpu_budget_mb, config.gpu_budget_mb),
            frame_start: Instant::now(),
            stats: StreamingStats::default(),
        })
    }

    pub fn loader(&self) -> &PointLoader {
        &self.loader
    }

    pub fn builder(&self) -> &BatchBuilder {
        &self.builder
    }

    /// Mark the start of a frame; entries used from now on are protected from forced eviction
    pub fn begin_frame(&mut self) {
        self.frame_start = Instant::now();
    }

    /// Whatever can be drawn for `id` right now
    ///
    /// Never blocks. `None` means nothing is resident yet and a background load
    /// has been queued if a slot was free.
    pub fn get_or_request(&mut self, id: OctantId) -> Option<&[F::Handle]> {
        let now = Instant::now();

        if self.batches.contains(id) {
            return self.batches.get(id, now).map(|entry| entry.handles.as_slice());
        }

        if let Some(entry) = self.dispose_queue.un_evict(id) {
            log::trace!("Un-evicted {id:?}");
            self.stats.un_evictions += 1;
            self.insert_batches(id, entry, now);
            return self.batches.get(id, now).map(|entry| entry.handles.as_slice());
        }

        if let Some(points) = self.loader.get_points(id) {
            let batches = self.builder.build(&points);
            let entry = self.create_entry(id, &batches)?;
            self.loader.take_points(id);
            self.insert_batches(id, entry, now);
            return self.batches.get(id, now).map(|entry| entry.handles.as_slice());
        }

        self.loader.trigger_point_loading(id);
        None
    }

    /// Queue a background load unless `id` is already held by any tier
    ///
    /// Returns `true` if a load was started.
    pub fn trigger_point_loading(&mut self, id: OctantId) -> bool {
        if self.batches.contains(id) || self.dispose_queue.contains(id) {
            return false;
        }
        self.loader.trigger_point_loading(id)
    }

    fn create_entry(&mut self, id: OctantId, batches: &[PointBatch]) -> Option<BatchEntry<F::Handle>> {
        let mut handles = Vec::with_capacity(batches.len());
        let mut byte_size = 0;
        for batch in batches {
            match self.factory.create_batch(batch) {
                Ok(handle) => {
                    handles.push(handle);
                    byte_size += batch.byte_size();
                }
                Err(e) => {
                    // Points stay resident, so a later frame retries
                    log::warn!("Failed to create GPU batch for {id:?}: {e}");
                    self.stats.batch_failures += 1;
                    return None;
                }
            }
        }
        self.stats.batches_built += handles.len() as u64;
        log::trace!("Built {} batches ({byte_size} bytes) for {id:?}", handles.len());
        Some(BatchEntry { handles, byte_size })
    }

    fn insert_batches(&mut self, id: OctantId, entry: BatchEntry<F::Handle>, now: Instant) {
        self.budget.add_gpu(entry.byte_size);
        // Callers only insert ids absent from the tier; a replaced entry is released at once
        if let Some(stale) = self.batches.insert(id, entry, now) {
            self.budget.remove_gpu(stale.byte_size);
        }
    }

    /// Move a batch entry out of the resident tier into the dispose queue
    fn retire(&mut self, id: OctantId, entry: BatchEntry<F::Handle>, reason: EvictionReason) {
        log::trace!("Batches of {id:?} evicted ({reason:?})");
        self.budget.remove_gpu(entry.byte_size);
        // A stale entry for the same id is dropped right away
        drop(self.dispose_queue.push(id, entry));
    }

    /// Explicitly evict an octant's batches into the dispose queue
    pub fn evict(&mut self, id: OctantId) -> bool {
        match self.batches.remove(id) {
            Some(entry) => {
                self.retire(id, entry, EvictionReason::Removed);
                true
            }
            None => false,
        }
    }

    /// Release evicted GPU data at a bounded rate; call once per frame
    ///
    /// Returns the number of octants whose handles were dropped.
    pub fn process_dispose_queue(&mut self, delta: Duration) -> usize {
        let released = self.dispose_queue.process(delta);
        let count = released.len();
        for (id, entry) in released {
            log::trace!("Disposing {} batches of {id:?}", entry.handles.len());
            drop(entry);
        }
        self.stats.disposed += count as u64;
        count
    }

    /// Run the expiration scans of both tiers if they are due
    pub fn collect_expired(&mut self, now: Instant) {
        for evicted in self.batches.scan_if_due(now) {
            self.stats.expired_batch_sets += 1;
            self.retire(evicted.key, evicted.value, evicted.reason);
        }
        self.stats.expired_point_sets += self.loader.collect_expired(now) as u64;
    }

    /// Evict least recently used entries while a non-zero budget is over 90%
    ///
    /// Entries used since `begin_frame` are kept even if that leaves the
    /// budget exceeded.
    pub fn enforce_budget(&mut self) {
        self.budget.set_cpu_used(self.loader.resident_bytes());
        while self.budget.should_evict_cpu() {
            if self.loader.evict_lru_before(self.frame_start).is_none() {
                break;
            }
            self.stats.budget_evictions += 1;
            self.budget.set_cpu_used(self.loader.resident_bytes());
        }

        while self.budget.should_evict_gpu() {
            let Some((id, entry)) = self.batches.pop_lru_before(self.frame_start) else { break };
            self.stats.budget_evictions += 1;
            self.retire(id, entry, EvictionReason::Budget);
        }
    }

    /// Per-frame housekeeping after drawables were collected
    pub fn end_frame(&mut self, now: Instant) {
        self.collect_expired(now);
        self.enforce_budget();
    }

    pub fn has_batches(&self, id: OctantId) -> bool {
        self.batches.contains(id)
    }

    /// Resident handles of `id` without refreshing or requesting anything
    pub fn batches(&self, id: OctantId) -> Option<&[F::Handle]> {
        self.batches.peek(id).map(|entry| entry.handles.as_slice())
    }

    pub fn is_pending_dispose(&self, id: OctantId) -> bool {
        self.dispose_queue.contains(id)
    }

    pub fn budget(&self) -> &MemoryBudget {
        &self.budget
    }

    pub fn stats(&self) -> StreamingStats {
        StreamingStats {
            loads: self.loader.stats(),
            loading: self.loader.loading_count(),
            resident_point_sets: self.loader.resident_point_sets(),
            resident_batch_sets: self.batches.len(),
            pending_dispose: self.dispose_queue.len(),
            cpu_bytes: self.loader.resident_bytes(),
            gpu_bytes: self.budget.gpu_used(),
            ..self.stats.clone()
        }
    }
}

impl<F: BatchFactory> LoadTrigger for StreamingCache<F> {
    fn trigger_point_loading(&mut self, id: OctantId) {
        StreamingCache::trigger_point_loading(self, id);
    }
}

impl<F: BatchFactory> Drop for StreamingCache<F> {
    fn drop(&mut self) {
        let resident = self.batches.drain().len();
        let pending = self.dispose_queue.drain().len();
        log::info!("Streaming cache dropped: released {resident} resident and {pending} pending batch sets");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::core::error::Error;
    use crate::streaming::loader::tests::{GatedReader, wait_until};

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// GPU handle that counts its own releases
    struct TestHandle {
        serial: usize,
        released: Arc<AtomicUsize>,
    }

    impl Drop for TestHandle {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct TestFactory {
        created: usize,
        released: Arc<AtomicUsize>,
        fail: bool,
    }

    impl TestFactory {
        fn new() -> (Self, Arc<AtomicUsize>) {
            let released = Arc::new(AtomicUsize::new(0));
            (Self { created: 0, released: released.clone(), fail: false }, released)
        }
    }

    impl BatchFactory for TestFactory {
        type Handle = TestHandle;

        fn create_batch(&mut self, _batch: &PointBatch) -> Result<TestHandle> {
            if self.fail {
                return Err(Error::Batch("device lost".into()));
            }
            self.created += 1;
            Ok(TestHandle { serial: self.created, released: self.released.clone() })
        }
    }

    fn config() -> StreamingConfig {
        StreamingConfig { dispose_rate_secs: 0.0, ..Default::default() }
    }

    fn cache_with(reader: Arc<GatedReader>, config: &StreamingConfig) -> (StreamingCache<TestFactory>, Arc<AtomicUsize>) {
        let (factory, released) = TestFactory::new();
        (StreamingCache::new(reader, factory, config).expect("cache"), released)
    }

    fn id(path: &str) -> OctantId {
        path.parse().expect("valid path")
    }

    /// Request until batches are resident
    fn load(cache: &mut StreamingCache<TestFactory>, id: OctantId) -> usize {
        assert!(cache.get_or_request(id).is_none());
        assert!(wait_until(TIMEOUT, || cache.loader().has_points(id)));
        cache.get_or_request(id).expect("batches after load")[0].serial
    }

    #[test]
    fn test_absent_id_queues_load_and_returns_none() {
        let reader = GatedReader::new(false);
        let (mut cache, _) = cache_with(reader.clone(), &config());

        assert!(cache.get_or_request(id("1")).is_none());
        assert!(cache.loader().is_loading(id("1")));

        // Asking again while loading starts nothing new
        assert!(cache.get_or_request(id("1")).is_none());
        assert_eq!(cache.stats().loads.started, 1);

        reader.gate.add_permits(1);
        assert!(wait_until(TIMEOUT, || cache.loader().has_points(id("1"))));
        assert_eq!(reader.calls(), 1);
    }

    #[test]
    fn test_points_become_batches() {
        let (mut cache, _) = cache_with(GatedReader::new(true), &config());

        let serial = load(&mut cache, id("1"));
        assert_eq!(serial, 1);
        assert!(cache.has_batches(id("1")));
        // Converted points leave the point tier
        assert!(!cache.loader().has_points(id("1")));

        // Subsequent frames reuse the same handles
        assert_eq!(cache.get_or_request(id("1")).expect("resident")[0].serial, 1);
        let stats = cache.stats();
        assert_eq!(stats.batches_built, 1);
        assert_eq!(stats.resident_batch_sets, 1);
        assert!(stats.gpu_bytes > 0);
    }

    #[test]
    fn test_un_eviction_returns_same_handle() {
        let (mut cache, released) = cache_with(GatedReader::new(true), &config());
        load(&mut cache, id("2"));

        assert!(cache.evict(id("2")));
        assert!(cache.is_pending_dispose(id("2")));
        assert!(!cache.has_batches(id("2")));

        let handles = cache.get_or_request(id("2")).expect("un-evicted");
        assert_eq!(handles[0].serial, 1);
        assert!(!cache.is_pending_dispose(id("2")));
        assert!(cache.has_batches(id("2")));
        assert_eq!(released.load(Ordering::SeqCst), 0);
        assert_eq!(cache.stats().un_evictions, 1);
    }

    #[test]
    fn test_dispose_pass_releases_handles() {
        let (mut cache, released) = cache_with(GatedReader::new(true), &config());
        load(&mut cache, id("3"));
        load(&mut cache, id("4"));

        cache.evict(id("3"));
        cache.evict(id("4"));
        assert_eq!(cache.stats().gpu_bytes, 0);

        // One entry per pass
        assert_eq!(cache.process_dispose_queue(Duration::from_millis(16)), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(cache.process_dispose_queue(Duration::from_millis(16)), 1);
        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert_eq!(cache.process_dispose_queue(Duration::from_millis(16)), 0);

        // Released ids are loaded again from scratch
        assert!(cache.trigger_point_loading(id("3")));
    }

    #[test]
    fn test_dispose_rate_limits_passes() {
        let config = StreamingConfig { dispose_rate_secs: 0.1, ..Default::default() };
        let (mut cache, released) = cache_with(GatedReader::new(true), &config);
        load(&mut cache, id("5"));
        cache.evict(id("5"));

        let frame = Duration::from_millis(40);
        assert_eq!(cache.process_dispose_queue(frame), 0);
        assert_eq!(cache.process_dispose_queue(frame), 0);
        assert_eq!(cache.process_dispose_queue(frame), 0);
        assert_eq!(cache.process_dispose_queue(frame), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_expiration_moves_batches_to_dispose_queue() {
        let (mut cache, released) = cache_with(GatedReader::new(true), &config());
        load(&mut cache, id("6"));

        let now = Instant::now();
        cache.collect_expired(now + Duration::from_secs(10));
        assert!(cache.has_batches(id("6")));

        cache.collect_expired(now + Duration::from_secs(32));
        assert!(!cache.has_batches(id("6")));
        assert!(cache.is_pending_dispose(id("6")));
        assert_eq!(cache.stats().expired_batch_sets, 1);
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_trigger_skips_ids_held_by_any_tier() {
        let reader = GatedReader::new(true);
        let (mut cache, _) = cache_with(reader.clone(), &config());
        load(&mut cache, id("7"));

        assert!(!cache.trigger_point_loading(id("7")));
        cache.evict(id("7"));
        assert!(!cache.trigger_point_loading(id("7")));
        assert_eq!(reader.calls(), 1);
    }

    #[test]
    fn test_seven_requests_start_five_loads() {
        let reader = GatedReader::new(false);
        let (mut cache, _) = cache_with(reader.clone(), &config());
        let ids: Vec<OctantId> = (0..7u8).map(|d| OctantId::ROOT.child(d)).collect();

        for id in &ids {
            LoadTrigger::trigger_point_loading(&mut cache, *id);
        }

        assert_eq!(cache.stats().loading, 5);
        assert!(wait_until(TIMEOUT, || reader.calls() == 5));
        assert!(!cache.loader().is_loading(ids[5]));
        assert!(!cache.loader().is_loading(ids[6]));
        reader.gate.add_permits(7);
    }

    #[test]
    fn test_factory_failure_keeps_points() {
        let (mut cache, _) = cache_with(GatedReader::new(true), &config());
        cache.factory.fail = true;

        assert!(cache.get_or_request(id("1")).is_none());
        assert!(wait_until(TIMEOUT, || cache.loader().has_points(id("1"))));
        assert!(cache.get_or_request(id("1")).is_none());
        assert!(cache.loader().has_points(id("1")));
        assert_eq!(cache.stats().batch_failures, 1);

        cache.factory.fail = false;
        assert!(cache.get_or_request(id("1")).is_some());
    }

    #[test]
    fn test_gpu_budget_forces_eviction() {
        // A budget far below one batch set
        let (mut cache, _) = cache_with(GatedReader::new(true), &config());
        cache.budget = MemoryBudget::from_bytes(0, 64);

        load(&mut cache, id("1"));
        load(&mut cache, id("2"));

        // Both were used this frame and are protected
        cache.enforce_budget();
        assert!(cache.has_batches(id("1")));
        assert!(cache.has_batches(id("2")));

        std::thread::sleep(Duration::from_millis(2));
        cache.begin_frame();
        cache.enforce_budget();
        assert!(!cache.has_batches(id("1")));
        assert!(!cache.has_batches(id("2")));
        assert_eq!(cache.stats().budget_evictions, 2);
        assert_eq!(cache.stats().pending_dispose, 2);
    }

    #[test]
    fn test_drop_releases_everything() {
        let (mut cache, released) = cache_with(GatedReader::new(true), &config());
        load(&mut cache, id("1"));
        load(&mut cache, id("2"));
        cache.evict(id("2"));

        drop(cache);
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }
}
