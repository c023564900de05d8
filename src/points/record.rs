//! Raw point records as delivered by a point reader

use serde::{Deserialize, Serialize};

use crate::core::types::{DVec3, Vec3};

/// One raw point
///
/// Attributes not named by the cloud's `PointSchema` are left at their
/// defaults and ignored when building batches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub position: DVec3,
    /// 16-bit RGB channels
    pub color: [u16; 3],
    pub normal: Vec3,
    pub intensity: u16,
    /// Classification label
    pub label: u8,
}

impl PointRecord {
    pub fn new(position: DVec3) -> Self {
        Self { position, ..Default::default() }
    }

    pub fn with_color(mut self, color: [u16; 3]) -> Self {
        self.color = color;
        self
    }

    pub fn with_normal(mut self, normal: Vec3) -> Self {
        self.normal = normal;
        self
    }

    pub fn with_intensity(mut self, intensity: u16) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn with_label(mut self, label: u8) -> Self {
        self.label = label;
        self
    }
}

/// Approximate resident size of a point array, used for memory accounting
pub fn points_byte_size(points: &[PointRecord]) -> usize {
    std::mem::size_of_val(points)
}
