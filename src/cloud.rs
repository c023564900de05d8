//! Per-frame point cloud facade
//!
//! Owns the octree, the visibility tester and the streaming cache of one
//! cloud. The host calls `update` once per frame and then draws whatever
//! `drawables` yields.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::camera::ViewState;
use crate::core::config::StreamingConfig;
use crate::core::error::Error;
use crate::core::types::{DVec3, Result};
use crate::octree::{OctantId, Octree};
use crate::streaming::{BatchFactory, PointReader, StreamingCache, StreamingStats, VisibilityTester};

/// One streamed point cloud
pub struct PointCloud<F: BatchFactory> {
    octree: Octree,
    visibility: VisibilityTester,
    cache: StreamingCache<F>,
    /// Visible octants whose batches are resident this frame
    drawables: Vec<OctantId>,
    center: DVec3,
    size: f64,
}

impl<F: BatchFactory> PointCloud<F> {
    /// Read the cloud's layout and hierarchy and set up streaming
    ///
    /// Fails if the schema is undefined, the octree is malformed or the
    /// configuration is invalid.
    pub fn new(reader: Arc<dyn PointReader>, factory: F, config: &StreamingConfig) -> Result<Self> {
        config.validate()?;
        reader.point_schema().validate()?;
        let octree = Octree::from_descriptor(&reader.octree()?)?;
        let cache = StreamingCache::new(reader, factory, config)?;
        Self::from_parts(octree, cache, config)
    }

    /// Assemble a cloud from an already built octree and cache
    pub fn from_parts(octree: Octree, cache: StreamingCache<F>, config: &StreamingConfig) -> Result<Self> {
        let root = octree.root().ok_or(Error::MissingRoot)?;
        let (center, size) = (root.center(), root.size());

        log::info!(
            "Point cloud: {} octants, {} points, root size {size:.2} at {center:?}",
            octree.len(),
            octree.total_point_count()
        );

        Ok(Self {
            octree,
            visibility: VisibilityTester::new(config),
            cache,
            drawables: Vec::new(),
            center,
            size,
        })
    }

    /// Advance one frame
    ///
    /// Runs the dispose pass, the rate-limited visibility tick and collects
    /// the batches that can be drawn for the current visible set. Returns
    /// `true` if the visible set was recomputed.
    pub fn update(&mut self, view: &ViewState, delta: Duration) -> bool {
        self.cache.begin_frame();
        self.cache.process_dispose_queue(delta);

        let recomputed = self.visibility.update(&mut self.octree, view, delta, &mut self.cache);

        self.drawables.clear();
        for &id in self.visibility.visible_nodes() {
            if self.cache.get_or_request(id).is_some() {
                self.drawables.push(id);
            }
        }

        self.cache.end_frame(Instant::now());

        if recomputed {
            log::debug!(
                "Cloud tick: {} visible, {} drawable, {} loading",
                self.visibility.visible_nodes().len(),
                self.drawables.len(),
                self.cache.loader().loading_count()
            );
        }
        recomputed
    }

    /// Batches to draw this frame, per octant
    pub fn drawables(&self) -> impl Iterator<Item = (OctantId, &[F::Handle])> + '_ {
        self.drawables
            .iter()
            .filter_map(|&id| self.cache.batches(id).map(|handles| (id, handles)))
    }

    pub fn drawable_count(&self) -> usize {
        self.drawables.len()
    }

    /// Center of the root octant
    pub fn center(&self) -> DVec3 {
        self.center
    }

    /// Edge length of the root octant
    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn octree(&self) -> &Octree {
        &self.octree
    }

    pub fn visibility(&self) -> &VisibilityTester {
        &self.visibility
    }

    pub fn visibility_mut(&mut self) -> &mut VisibilityTester {
        &mut self.visibility
    }

    pub fn cache(&self) -> &StreamingCache<F> {
        &self.cache
    }

    pub fn stats(&self) -> StreamingStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::core::camera::Camera;
    use crate::octree::OctreeDescriptor;
    use crate::points::{PointBatch, PointSchema};
    use crate::streaming::{MemoryPointReader, factory_fn};

    fn reader(depth: u8) -> Arc<MemoryPointReader> {
        let desc = OctreeDescriptor::uniform(DVec3::new(10.0, 0.0, 0.0), 100.0, depth, 50);
        Arc::new(MemoryPointReader::synthetic(PointSchema::POS_D3_COL_F3, desc))
    }

    fn view() -> ViewState {
        let camera = Camera::look_at(DVec3::new(10.0, 0.0, 400.0), DVec3::new(10.0, 0.0, 0.0), DVec3::Y);
        camera.view_state(1080).expect("valid view")
    }

    fn counting_factory() -> impl FnMut(&PointBatch) -> Result<usize> {
        factory_fn(|batch: &PointBatch| Ok(batch.len()))
    }

    #[test]
    fn test_root_geometry_exposed() {
        let cloud = PointCloud::new(reader(1), counting_factory(), &StreamingConfig::default())
            .expect("cloud");
        assert_eq!(cloud.center(), DVec3::new(10.0, 0.0, 0.0));
        assert_eq!(cloud.size(), 100.0);
        assert_eq!(cloud.octree().len(), 9);
        assert_eq!(cloud.drawable_count(), 0);
    }

    #[test]
    fn test_missing_root_fails_fast() {
        let reader = Arc::new(MemoryPointReader::new(
            PointSchema::POS_D3,
            OctreeDescriptor::default(),
            HashMap::new(),
        ));
        let result = PointCloud::new(reader, counting_factory(), &StreamingConfig::default());
        assert!(matches!(result, Err(Error::MissingRoot)));
    }

    #[test]
    fn test_undefined_schema_fails_fast() {
        let desc = OctreeDescriptor::uniform(DVec3::ZERO, 10.0, 0, 1);
        let reader = Arc::new(MemoryPointReader::synthetic(PointSchema::UNDEFINED, desc));
        let result = PointCloud::new(reader, counting_factory(), &StreamingConfig::default());
        assert!(matches!(result, Err(Error::UndefinedPointSchema)));
    }

    #[test]
    fn test_frames_converge_to_full_visible_set() {
        let mut cloud = PointCloud::new(reader(1), counting_factory(), &StreamingConfig::default())
            .expect("cloud");
        let view = view();

        // The first call always recomputes
        assert!(cloud.update(&view, Duration::from_millis(16)));
        assert_eq!(cloud.visibility().visible_nodes().len(), 9);
        assert_eq!(cloud.visibility().number_of_visible_points(), 450);

        let deadline = Instant::now() + Duration::from_secs(5);
        while cloud.drawable_count() < 9 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
            cloud.update(&view, Duration::from_millis(16));
        }

        assert_eq!(cloud.drawable_count(), 9);
        let drawn: usize = cloud.drawables().flat_map(|(_, handles)| handles.iter()).sum();
        assert_eq!(drawn, 450);

        let stats = cloud.stats();
        assert_eq!(stats.loads.completed, 9);
        assert_eq!(stats.resident_batch_sets, 9);
        assert_eq!(stats.resident_point_sets, 0);
    }

    #[test]
    fn test_point_threshold_limits_drawables() {
        let config = StreamingConfig { point_threshold: 100, ..Default::default() };
        let mut cloud = PointCloud::new(reader(1), counting_factory(), &config).expect("cloud");
        let view = view();

        cloud.update(&view, Duration::from_millis(16));
        // Root and two children; the second child crosses the budget
        assert_eq!(cloud.visibility().visible_nodes().len(), 3);

        let deadline = Instant::now() + Duration::from_secs(5);
        while cloud.drawable_count() < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
            cloud.update(&view, Duration::from_millis(16));
        }
        assert_eq!(cloud.drawable_count(), 3);
        assert_eq!(cloud.stats().loads.started, 3);
    }
}
