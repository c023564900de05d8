//! Pointstream - out-of-core, visibility-driven streaming of massive point clouds

pub mod core;
pub mod math;
pub mod octree;
pub mod points;
pub mod streaming;
pub mod cloud;

pub use crate::core::{Camera, Error, Result, StreamingConfig, ViewState};
pub use cloud::PointCloud;
pub use octree::{OctantId, Octree, OctreeDescriptor};
pub use points::{BatchBuilder, PointBatch, PointRecord, PointSchema};
pub use streaming::{BatchFactory, MemoryPointReader, PointReader, StreamingCache, VisibilityTester};
