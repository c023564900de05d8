//! Point records, layouts and batch conversion

pub mod schema;
pub mod record;
pub mod batch;

pub use schema::PointSchema;
pub use record::{PointRecord, points_byte_size};
pub use batch::{
    BatchBuilder, BatchOptions, PointBatch, PrimitiveType,
    pack_rgba, color_to_rgba, intensity_to_rgba,
};
