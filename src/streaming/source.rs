//! Point reader interface
//!
//! The on-disk format is not this crate's concern. A reader supplies the
//! cloud's point layout, its octree, and the raw points of one octant.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::core::error::Error;
use crate::core::types::{DVec3, Result, Vec3};
use crate::octree::{OctantId, OctreeDescriptor};
use crate::points::{PointRecord, PointSchema};

/// Boxed future returned by asynchronous point loads
pub type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<PointRecord>>> + Send + 'a>>;

/// Source of point cloud data
pub trait PointReader: Send + Sync + 'static {
    /// Attribute layout of every point in the cloud
    fn point_schema(&self) -> PointSchema;

    /// Structure of the cloud's octree
    fn octree(&self) -> Result<OctreeDescriptor>;

    /// Load the raw points of one octant
    fn load_points(&self, id: OctantId) -> Result<Vec<PointRecord>>;

    /// Load the raw points of one octant asynchronously
    ///
    /// Defaults to running `load_points` on tokio's blocking pool so slow
    /// reads never stall runtime workers. Must be polled inside a runtime.
    fn load_points_async(self: Arc<Self>, id: OctantId) -> LoadFuture<'static> {
        Box::pin(async move {
            tokio::task::spawn_blocking(move || self.load_points(id))
                .await
                .map_err(|e| Error::load(id, format!("reader task failed: {e}")))?
        })
    }
}

/// Reader over points held in memory
pub struct MemoryPointReader {
    schema: PointSchema,
    octree: OctreeDescriptor,
    points: HashMap<OctantId, Vec<PointRecord>>,
}

impl MemoryPointReader {
    pub fn new(
        schema: PointSchema,
        octree: OctreeDescriptor,
        points: HashMap<OctantId, Vec<PointRecord>>,
    ) -> Self {
        Self { schema, octree, points }
    }

    /// Fill every octant of `octree` with its declared number of points
    ///
    /// Points follow a deterministic low-discrepancy pattern inside each cube,
    /// with colors and intensities derived from position.
    pub fn synthetic(schema: PointSchema, octree: OctreeDescriptor) -> Self {
        let points = octree
            .octants
            .iter()
            .map(|desc| {
                let center = DVec3::from_array(desc.center);
                let half = desc.size * 0.5;
                let records = (0..desc.point_count)
                    .map(|i| synthetic_point(center, half, i))
                    .collect();
                (desc.id, records)
            })
            .collect();

        Self { schema, octree, points }
    }

    pub fn octant_count(&self) -> usize {
        self.points.len()
    }
}

fn synthetic_point(center: DVec3, half: f64, i: u32) -> PointRecord {
    // Additive recurrence with irrational steps; fills the cube evenly
    const STEPS: [f64; 3] = [0.819_172_513_396_164_4, 0.671_043_606_703_789_2, 0.549_700_477_901_970_5];
    let n = f64::from(i) + 0.5;
    let unit = DVec3::new((n * STEPS[0]).fract(), (n * STEPS[1]).fract(), (n * STEPS[2]).fract());
    let position = center + (unit * 2.0 - DVec3::ONE) * half;

    let channel = |t: f64| (t * 65535.0) as u16;
    PointRecord::new(position)
        .with_color([channel(unit.x), channel(unit.y), channel(unit.z)])
        .with_normal(Vec3::Y)
        .with_intensity((unit.y * 4095.0) as u16)
        .with_label((i % 8) as u8)
}

impl PointReader for MemoryPointReader {
    fn point_schema(&self) -> PointSchema {
        self.schema
    }

    fn octree(&self) -> Result<OctreeDescriptor> {
        Ok(self.octree.clone())
    }

    fn load_points(&self, id: OctantId) -> Result<Vec<PointRecord>> {
        self.points
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::load(id, "no points stored for octant"))
    }
}
