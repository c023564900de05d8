//! GPU batch factory interface
//!
//! The cache never looks inside GPU objects. It asks a factory to create one
//! handle per batch and releases a handle by dropping it, so a handle type must
//! free its GPU resources in `Drop`.

use crate::core::types::Result;
use crate::points::PointBatch;

/// Creates GPU-side objects for point batches
pub trait BatchFactory {
    /// Owned GPU resource; dropping it releases the resource
    type Handle;

    fn create_batch(&mut self, batch: &PointBatch) -> Result<Self::Handle>;
}

impl<H, F> BatchFactory for F
where
    F: FnMut(&PointBatch) -> Result<H>,
{
    type Handle = H;

    fn create_batch(&mut self, batch: &PointBatch) -> Result<H> {
        self(batch)
    }
}

/// Pin a closure's signature so it can be passed where a `BatchFactory` is expected
pub fn factory_fn<H, F>(f: F) -> F
where
    F: FnMut(&PointBatch) -> Result<H>,
{
    f
}
