//! Background point loading and the raw point tier
//!
//! Loads run as tokio tasks, one per octant, on either a dedicated runtime
//! owned by the loader or a runtime handle supplied by the host. The loading
//! set and the point tier share one lock, so "not loading and not resident"
//! and "mark as loading" happen in a single critical section and no octant is
//! ever loaded twice concurrently.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::runtime::{Handle, Runtime};

use crate::core::config::StreamingConfig;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::octree::OctantId;
use crate::points::{PointRecord, points_byte_size};
use super::cache::ExpiringCache;
use super::source::PointReader;

/// Raw points of one octant, shared between the tier and batch building
pub type PointSet = Arc<Vec<PointRecord>>;

/// Counters for background loads
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadStats {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    /// Message of the most recent failed load
    pub last_error: Option<String>,
    /// Duration of the most recent successful load
    pub last_load_time_ms: f32,
}

struct SharedState {
    loading: HashSet<OctantId>,
    points: ExpiringCache<OctantId, PointSet>,
    resident_bytes: usize,
    stats: LoadStats,
}

impl SharedState {
    fn remove_points(&mut self, id: OctantId) -> Option<PointSet> {
        let points = self.points.remove(id)?;
        self.resident_bytes = self.resident_bytes.saturating_sub(points_byte_size(&points));
        Some(points)
    }
}

/// Occupies one loading slot until dropped
///
/// The slot is freed even if the load task panics or is abandoned at shutdown.
struct LoadSlot {
    shared: Arc<Mutex<SharedState>>,
    id: OctantId,
    settled: bool,
}

impl LoadSlot {
    fn settle(mut self, result: Result<Vec<PointRecord>>, started: Instant) {
        let id = self.id;
        let mut state = self.shared.lock();
        match result {
            Ok(points) => {
                let bytes = points_byte_size(&points);
                if let Some(old) = state.points.insert(id, Arc::new(points), Instant::now()) {
                    state.resident_bytes = state.resident_bytes.saturating_sub(points_byte_size(&old));
                }
                state.resident_bytes += bytes;
                state.stats.completed += 1;
                state.stats.last_load_time_ms = started.elapsed().as_secs_f32() * 1000.0;
            }
            Err(e) => {
                log::warn!("Failed to load points for {id:?}: {e}");
                state.stats.failed += 1;
                state.stats.last_error = Some(e.to_string());
            }
        }
        state.loading.remove(&id);
        drop(state);
        self.settled = true;
    }
}

impl Drop for LoadSlot {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.shared.lock();
        state.loading.remove(&self.id);
        if std::thread::panicking() {
            log::warn!("Load task for {:?} panicked", self.id);
            state.stats.failed += 1;
            state.stats.last_error = Some(format!("load task for {:?} panicked", self.id));
        }
    }
}

/// Concurrent point loader owning the raw point tier
pub struct PointLoader {
    reader: Arc<dyn PointReader>,
    shared: Arc<Mutex<SharedState>>,
    max_nodes_to_load: usize,
    handle: Handle,
    /// Dedicated runtime (None when running on a host runtime)
    runtime: Option<Runtime>,
}

impl PointLoader {
    /// Create a loader with its own multi-threaded runtime
    pub fn new(reader: Arc<dyn PointReader>, config: &StreamingConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("pointstream-loader")
            .build()?;
        let handle = runtime.handle().clone();
        log::info!("Point loader started with a dedicated runtime");
        Ok(Self::build(reader, config, handle, Some(runtime)))
    }

    /// Create a loader that spawns onto an existing runtime
    pub fn with_handle(reader: Arc<dyn PointReader>, config: &StreamingConfig, handle: Handle) -> Self {
        Self::build(reader, config, handle, None)
    }

    /// Create a loader on the runtime the caller is running in
    pub fn with_current_runtime(reader: Arc<dyn PointReader>, config: &StreamingConfig) -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| Error::Runtime(e.to_string()))?;
        Ok(Self::with_handle(reader, config, handle))
    }

    fn build(
        reader: Arc<dyn PointReader>,
        config: &StreamingConfig,
        handle: Handle,
        runtime: Option<Runtime>,
    ) -> Self {
        let points = ExpiringCache::new(
            config.point_sliding_expiration(),
            config.point_expiration_scan_frequency(),
        );
        Self {
            reader,
            shared: Arc::new(Mutex::new(SharedState {
                loading: HashSet::new(),
                points,
                resident_bytes: 0,
                stats: LoadStats::default(),
            })),
            max_nodes_to_load: config.max_nodes_to_load as usize,
            handle,
            runtime,
        }
    }

    pub fn reader(&self) -> &Arc<dyn PointReader> {
        &self.reader
    }

    pub fn max_nodes_to_load(&self) -> usize {
        self.max_nodes_to_load
    }

    /// Start a background load unless the octant is loading, resident, or all slots are busy
    ///
    /// Returns `true` if a load was started. Never blocks on I/O.
    pub fn trigger_point_loading(&self, id: OctantId) -> bool {
        {
            let mut state = self.shared.lock();
            if state.loading.contains(&id) || state.points.contains(id) {
                return false;
            }
            if state.loading.len() >= self.max_nodes_to_load {
                log::trace!("Load slots full, dropping request for {id:?}");
                return false;
            }
            state.loading.insert(id);
            state.stats.started += 1;
        }

        log::trace!("Loading points for {id:?}");
        let reader = Arc::clone(&self.reader);
        let slot = LoadSlot { shared: Arc::clone(&self.shared), id, settled: false };
        self.handle.spawn(async move {
            let started = Instant::now();
            let result = reader.load_points_async(id).await;
            slot.settle(result, started);
        });

        true
    }

    pub fn is_loading(&self, id: OctantId) -> bool {
        self.shared.lock().loading.contains(&id)
    }

    pub fn loading_count(&self) -> usize {
        self.shared.lock().loading.len()
    }

    pub fn has_points(&self, id: OctantId) -> bool {
        self.shared.lock().points.contains(id)
    }

    /// Resident points of an octant, marking them as used
    pub fn get_points(&self, id: OctantId) -> Option<PointSet> {
        self.shared.lock().points.get(id, Instant::now()).cloned()
    }

    /// Remove an octant's points from the tier
    pub fn take_points(&self, id: OctantId) -> Option<PointSet> {
        self.shared.lock().remove_points(id)
    }

    pub fn resident_point_sets(&self) -> usize {
        self.shared.lock().points.len()
    }

    /// Bytes held by the point tier
    pub fn resident_bytes(&self) -> usize {
        self.shared.lock().resident_bytes
    }

    /// Drop point sets unused for the sliding window, if a scan is due
    ///
    /// Returns the number of dropped sets.
    pub fn collect_expired(&self, now: Instant) -> usize {
        let mut state = self.shared.lock();
        let expired = state.points.scan_if_due(now);
        for evicted in &expired {
            let bytes = points_byte_size(&evicted.value);
            state.resident_bytes = state.resident_bytes.saturating_sub(bytes);
            log::trace!("Point set {:?} expired", evicted.key);
        }
        expired.len()
    }

    /// Drop the least recently used point set if it was last used before `cutoff`
    pub fn evict_lru_before(&self, cutoff: Instant) -> Option<OctantId> {
        let mut state = self.shared.lock();
        let (id, points) = state.points.pop_lru_before(cutoff)?;
        state.resident_bytes = state.resident_bytes.saturating_sub(points_byte_size(&points));
        Some(id)
    }

    pub fn stats(&self) -> LoadStats {
        self.shared.lock().stats.clone()
    }
}

impl Drop for PointLoader {
    fn drop(&mut self) {
        // In-flight loads are abandoned, not awaited
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        log::debug!("Point loader shut down");
    }
}
