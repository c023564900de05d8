use criterion::{criterion_group, criterion_main, Criterion, black_box};

use pointstream::octree::{OctantId, Octree, OctreeDescriptor};
use pointstream::points::{BatchBuilder, BatchOptions, PointSchema};
use pointstream::streaming::{MemoryPointReader, PointReader, VisibilityTester};
use pointstream::{Camera, StreamingConfig};

use glam::DVec3;

fn synthetic_points(schema: PointSchema, count: u32) -> Vec<pointstream::PointRecord> {
    let desc = OctreeDescriptor::uniform(DVec3::ZERO, 100.0, 0, count);
    let reader = MemoryPointReader::synthetic(schema, desc);
    reader.load_points(OctantId::ROOT).expect("root points")
}

fn bench_batch_build_positions(c: &mut Criterion) {
    let points = synthetic_points(PointSchema::POS_D3, 200_000);
    let builder = BatchBuilder::new(PointSchema::POS_D3, BatchOptions::default()).expect("builder");

    c.bench_function("batch_build_200k_positions", |b| {
        b.iter(|| builder.build(black_box(&points)));
    });
}

fn bench_batch_build_all_attributes(c: &mut Criterion) {
    let schema = PointSchema::POS_D3_NOR_F3_COL_F3_IN_US;
    let points = synthetic_points(schema, 200_000);
    let options = BatchOptions { exchange_yz: true, translation: DVec3::new(1000.0, 0.0, 500.0), ..Default::default() };
    let builder = BatchBuilder::new(schema, options).expect("builder");

    c.bench_function("batch_build_200k_all_attributes", |b| {
        b.iter(|| builder.build(black_box(&points)));
    });
}

fn bench_visibility_depth(c: &mut Criterion, depth: u8) {
    let desc = OctreeDescriptor::uniform(DVec3::ZERO, 1000.0, depth, 5000);
    let mut octree = Octree::from_descriptor(&desc).expect("octree");
    let config = StreamingConfig::default();
    let mut tester = VisibilityTester::new(&config);
    let camera = Camera::look_at(DVec3::new(300.0, 200.0, 1200.0), DVec3::ZERO, DVec3::Y);
    let view = camera.view_state(1080).expect("view");

    c.bench_function(&format!("determine_visibility_depth_{depth}"), |b| {
        b.iter(|| {
            tester.determine_visibility(&mut octree, black_box(&view), &mut |_: OctantId| {});
            black_box(tester.number_of_visible_points());
        });
    });
}

fn bench_visibility_depth_4(c: &mut Criterion) {
    bench_visibility_depth(c, 4);
}

fn bench_visibility_depth_6(c: &mut Criterion) {
    bench_visibility_depth(c, 6);
}

criterion_group!(
    benches,
    bench_batch_build_positions,
    bench_batch_build_all_attributes,
    bench_visibility_depth_4,
    bench_visibility_depth_6,
);
criterion_main!(benches);
