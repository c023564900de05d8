//! Headless streaming demo: orbits a camera around a synthetic point cloud.
//!
//! Usage: cargo run --release --bin stream_demo -- [OPTIONS]
//!
//! Options:
//!   --depth <N>       Octree depth (default: 5)
//!   --points <N>      Points per octant (default: 2000)
//!   --size <METERS>   Root edge length (default: 500)
//!   --frames <N>      Frames to simulate (default: 600)
//!   --config <PATH>   Streaming configuration JSON (default: built-in defaults)

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use glam::DVec3;

use pointstream::core::logging;
use pointstream::octree::OctreeDescriptor;
use pointstream::points::{PointBatch, PointSchema};
use pointstream::streaming::{MemoryPointReader, factory_fn};
use pointstream::{Camera, PointCloud, StreamingConfig};

const FRAME: Duration = Duration::from_millis(16);

static LIVE_BATCHES: AtomicUsize = AtomicUsize::new(0);

/// Stand-in for a GPU vertex buffer
struct HeadlessBatch {
    vertices: usize,
}

impl HeadlessBatch {
    fn upload(batch: &PointBatch) -> Self {
        LIVE_BATCHES.fetch_add(1, Ordering::Relaxed);
        Self { vertices: batch.len() }
    }
}

impl Drop for HeadlessBatch {
    fn drop(&mut self) {
        LIVE_BATCHES.fetch_sub(1, Ordering::Relaxed);
    }
}

fn main() {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let depth = parse_arg::<u8>(&args, "--depth").unwrap_or(5);
    let points = parse_arg::<u32>(&args, "--points").unwrap_or(2000);
    let size = parse_arg::<f64>(&args, "--size").unwrap_or(500.0);
    let frames = parse_arg::<u32>(&args, "--frames").unwrap_or(600);

    let config = match parse_arg::<String>(&args, "--config") {
        Some(path) => StreamingConfig::from_json_file(&path).expect("Failed to load streaming config"),
        None => StreamingConfig::default(),
    };

    log::info!("Generating synthetic cloud: depth {depth}, {points} points per octant, size {size}m");
    let start = Instant::now();
    let descriptor = OctreeDescriptor::uniform(DVec3::ZERO, size, depth, points);
    let reader = Arc::new(MemoryPointReader::synthetic(PointSchema::POS_D3_COL_F3_IN_US, descriptor));
    log::info!("Generated {} octants in {:.2?}", reader.octant_count(), start.elapsed());

    let factory = factory_fn(|batch: &PointBatch| Ok(HeadlessBatch::upload(batch)));
    let mut cloud = PointCloud::new(reader, factory, &config).expect("Failed to open point cloud");

    let radius = cloud.size() * 1.5;
    let center = cloud.center();

    for frame in 0..frames {
        let angle = f64::from(frame) * 0.01;
        let eye = center + DVec3::new(angle.cos() * radius, cloud.size() * 0.4, angle.sin() * radius);
        let camera = Camera::look_at(eye, center, DVec3::Y);
        let view = camera.view_state(1080).expect("Camera produced a degenerate frustum");

        cloud.update(&view, FRAME);
        if frame % 30 == 0 {
            let stats = cloud.stats();
            let drawn: usize = cloud
                .drawables()
                .flat_map(|(_, batches)| batches.iter())
                .map(|b| b.vertices)
                .sum();
            log::info!(
                "frame {frame}: {} visible ({} pts), {} drawable ({drawn} pts), {} loading, {} batch sets, {} pending dispose, {} live batches, gpu {:.1} MB",
                cloud.visibility().visible_nodes().len(),
                cloud.visibility().number_of_visible_points(),
                cloud.drawable_count(),
                stats.loading,
                stats.resident_batch_sets,
                stats.pending_dispose,
                LIVE_BATCHES.load(Ordering::Relaxed),
                stats.gpu_bytes as f64 / (1024.0 * 1024.0),
            );
        }

        std::thread::sleep(FRAME);
    }

    let stats = cloud.stats();
    log::info!(
        "Done: {} loads ({} failed), {} batches built, {} un-evictions, {} disposed",
        stats.loads.completed,
        stats.loads.failed,
        stats.batches_built,
        stats.un_evictions,
        stats.disposed
    );
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}
