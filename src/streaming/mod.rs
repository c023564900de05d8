//! Out-of-core streaming: visibility selection, background loading and tiered caching

pub mod source;
pub mod gpu;
pub mod priority;
pub mod visibility;
pub mod cache;
pub mod loader;
pub mod dispose;
pub mod budget;
pub mod data_handler;

pub use source::{LoadFuture, MemoryPointReader, PointReader};
pub use gpu::{BatchFactory, factory_fn};
pub use priority::{OctantPriority, OctantPriorityQueue};
pub use visibility::{LoadTrigger, VisibilityTester};
pub use cache::{Evicted, EvictionReason, ExpiringCache};
pub use loader::{LoadStats, PointLoader, PointSet};
pub use dispose::DisposeQueue;
pub use budget::{EVICTION_PRESSURE, MemoryBudget};
pub use data_handler::{BatchEntry, StreamingCache, StreamingStats};
