//! Conversion of raw points into GPU-ready batches
//!
//! A batch is the unit handed to the GPU factory: flat attribute arrays plus a
//! `u16` index buffer, so no batch may hold more than `MAX_VERTICES_PER_BATCH`
//! points. Building is pure and deterministic; chunks are converted in
//! parallel with rayon.

use rayon::prelude::*;

use crate::core::config::{StreamingConfig, MAX_VERTICES_PER_BATCH};
use crate::core::error::Error;
use crate::core::types::{DVec3, Result, Vec3};
use crate::math::Aabb;
use super::record::PointRecord;
use super::schema::PointSchema;

/// Primitive topology of a batch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Points,
}

/// Renderable point batch in single precision
#[derive(Clone, Debug, PartialEq)]
pub struct PointBatch {
    pub primitive: PrimitiveType,
    pub positions: Vec<Vec3>,
    /// `0..n`, one index per point
    pub indices: Vec<u16>,
    pub normals: Option<Vec<Vec3>>,
    /// RGBA packed as `0xAABBGGRR`
    pub colors: Option<Vec<u32>>,
    /// Intensity as a grey RGBA color
    pub intensities: Option<Vec<u32>>,
    pub labels: Option<Vec<u8>>,
    pub bounds: Aabb,
}

impl PointBatch {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Positions as raw bytes for upload
    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Total size of all attribute arrays in bytes
    pub fn byte_size(&self) -> usize {
        std::mem::size_of_val(self.positions.as_slice())
            + std::mem::size_of_val(self.indices.as_slice())
            + self.normals.as_ref().map_or(0, |v| std::mem::size_of_val(v.as_slice()))
            + self.colors.as_ref().map_or(0, |v| std::mem::size_of_val(v.as_slice()))
            + self.intensities.as_ref().map_or(0, |v| std::mem::size_of_val(v.as_slice()))
            + self.labels.as_ref().map_or(0, |v| v.len())
    }
}

/// Pack 8-bit channels into `0xAABBGGRR`
pub fn pack_rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    (u32::from(a) << 24) | (u32::from(b) << 16) | (u32::from(g) << 8) | u32::from(r)
}

/// 16-bit RGB to an opaque packed color
pub fn color_to_rgba(color: [u16; 3]) -> u32 {
    let channel = |c: u16| (c / 256) as u8;
    pack_rgba(channel(color[0]), channel(color[1]), channel(color[2]), 255)
}

/// 12-bit intensity range mapped to an opaque grey, saturating at white
pub fn intensity_to_rgba(intensity: u16) -> u32 {
    let grey = (f32::from(intensity) / 4096.0 * 256.0).min(255.0) as u8;
    pack_rgba(grey, grey, grey, 255)
}

/// Options applied to every converted position
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatchOptions {
    pub max_vertices_per_batch: usize,
    /// Swap the y and z axes of every position
    pub exchange_yz: bool,
    /// Subtracted from every position after the optional swap
    pub translation: DVec3,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_vertices_per_batch: MAX_VERTICES_PER_BATCH,
            exchange_yz: false,
            translation: DVec3::ZERO,
        }
    }
}

impl BatchOptions {
    pub fn from_config(config: &StreamingConfig) -> Self {
        Self {
            max_vertices_per_batch: config.max_vertices_per_batch,
            exchange_yz: config.exchange_yz,
            translation: DVec3::from_array(config.translation.map(f64::from)),
        }
    }
}

/// Converts point arrays of one schema into batches
#[derive(Clone, Copy, Debug)]
pub struct BatchBuilder {
    schema: PointSchema,
    options: BatchOptions,
}

impl BatchBuilder {
    pub fn new(schema: PointSchema, options: BatchOptions) -> Result<Self> {
        schema.validate()?;
        if options.max_vertices_per_batch == 0 || options.max_vertices_per_batch > MAX_VERTICES_PER_BATCH {
            return Err(Error::Batch(format!(
                "max vertices per batch must be in 1..={MAX_VERTICES_PER_BATCH}, got {}",
                options.max_vertices_per_batch
            )));
        }
        Ok(Self { schema, options })
    }

    pub fn schema(&self) -> PointSchema {
        self.schema
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Number of batches `n` points produce
    pub fn batch_count(&self, n: usize) -> usize {
        n.div_ceil(self.options.max_vertices_per_batch)
    }

    /// Split `points` into consecutive batches of at most the configured size
    ///
    /// Zero points yield zero batches.
    pub fn build(&self, points: &[PointRecord]) -> Vec<PointBatch> {
        points
            .par_chunks(self.options.max_vertices_per_batch)
            .map(|chunk| self.build_one(chunk))
            .collect()
    }

    fn transform(&self, position: DVec3) -> Vec3 {
        let p = if self.options.exchange_yz {
            DVec3::new(position.x, position.z, position.y)
        } else {
            position
        };
        (p - self.options.translation).as_vec3()
    }

    fn build_one(&self, chunk: &[PointRecord]) -> PointBatch {
        let n = chunk.len();
        let schema = self.schema;

        let mut positions = Vec::with_capacity(n);
        let mut bounds = Aabb::EMPTY;
        for point in chunk {
            let p = self.transform(point.position);
            bounds.expand(p);
            positions.push(p);
        }

        // chunk length is bounded by MAX_VERTICES_PER_BATCH, which fits in u16
        let indices: Vec<u16> = (0..n as u16).collect();

        let normals = schema.normal.then(|| {
            chunk
                .iter()
                .map(|p| {
                    if self.options.exchange_yz {
                        Vec3::new(p.normal.x, p.normal.z, p.normal.y)
                    } else {
                        p.normal
                    }
                })
                .collect()
        });
        let colors = schema.color.then(|| chunk.iter().map(|p| color_to_rgba(p.color)).collect());
        let intensities = schema.intensity.then(|| chunk.iter().map(|p| intensity_to_rgba(p.intensity)).collect());
        let labels = schema.label.then(|| chunk.iter().map(|p| p.label).collect());

        PointBatch {
            primitive: PrimitiveType::Points,
            positions,
            indices,
            normals,
            colors,
            intensities,
            labels,
            bounds,
        }
    }
}
