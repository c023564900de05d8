//! Streaming configuration
//!
//! All tunables of the visibility tester and the streaming cache live in one
//! serde-backed struct so a host application can load them from JSON.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;

/// Hard GPU index-range limit for a single batch (`u16::MAX - 1`)
pub const MAX_VERTICES_PER_BATCH: usize = u16::MAX as usize - 1;

/// Configuration for visibility selection and the streaming cache
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Maximum number of points selected for display in one visibility tick
    pub point_threshold: u32,
    /// Milliseconds between two visibility recomputations
    pub update_rate_ms: f32,
    /// Fraction of the root's projected size below which octants are skipped
    pub min_proj_size_modifier: f32,
    /// Maximum number of octants loading in the background at once
    pub max_nodes_to_load: u32,
    /// Seconds between two disposal passes
    pub dispose_rate_secs: f32,
    /// Dispose-queue entries released per disposal pass
    pub max_disposals_per_pass: u32,
    /// Unused batches are evicted after this many seconds
    pub sliding_expiration_secs: f32,
    /// How often the batch tier is scanned for expired entries
    pub expiration_scan_frequency_secs: f32,
    /// Unused raw points are dropped after this many seconds
    pub point_sliding_expiration_secs: f32,
    /// How often the point tier is scanned for expired entries
    pub point_expiration_scan_frequency_secs: f32,
    /// Maximum vertices per GPU batch
    pub max_vertices_per_batch: usize,
    /// Swap Y and Z of every position while building batches
    pub exchange_yz: bool,
    /// Subtracted from every position while building batches
    pub translation: [f32; 3],
    /// CPU budget for resident raw points in MB (0 = unlimited)
    pub cpu_budget_mb: usize,
    /// GPU budget for resident batches in MB (0 = unlimited)
    pub gpu_budget_mb: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            point_threshold: 2_000_000,
            update_rate_ms: 1000.0 / 30.0,
            min_proj_size_modifier: 0.1,
            max_nodes_to_load: 5,
            dispose_rate_secs: 1.0 / 3.0,
            max_disposals_per_pass: 1,
            sliding_expiration_secs: 30.0,
            expiration_scan_frequency_secs: 31.0,
            point_sliding_expiration_secs: 15.0,
            point_expiration_scan_frequency_secs: 16.0,
            max_vertices_per_batch: MAX_VERTICES_PER_BATCH,
            exchange_yz: false,
            translation: [0.0; 3],
            cpu_budget_mb: 0,
            gpu_budget_mb: 0,
        }
    }
}

impl StreamingConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check that every option is inside its meaningful range
    pub fn validate(&self) -> Result<()> {
        if self.point_threshold == 0 {
            return Err(Error::Config("point_threshold must be positive".into()));
        }
        if !(self.min_proj_size_modifier > 0.0 && self.min_proj_size_modifier <= 1.0) {
            return Err(Error::Config(format!(
                "min_proj_size_modifier must be in (0, 1], got {}",
                self.min_proj_size_modifier
            )));
        }
        if self.max_nodes_to_load == 0 {
            return Err(Error::Config("max_nodes_to_load must be positive".into()));
        }
        if self.max_disposals_per_pass == 0 {
            return Err(Error::Config("max_disposals_per_pass must be positive".into()));
        }
        if self.max_vertices_per_batch == 0 || self.max_vertices_per_batch > MAX_VERTICES_PER_BATCH {
            return Err(Error::Config(format!(
                "max_vertices_per_batch must be in 1..={}, got {}",
                MAX_VERTICES_PER_BATCH, self.max_vertices_per_batch
            )));
        }

        let durations = [
            ("update_rate_ms", self.update_rate_ms),
            ("dispose_rate_secs", self.dispose_rate_secs),
            ("sliding_expiration_secs", self.sliding_expiration_secs),
            ("expiration_scan_frequency_secs", self.expiration_scan_frequency_secs),
            ("point_sliding_expiration_secs", self.point_sliding_expiration_secs),
            ("point_expiration_scan_frequency_secs", self.point_expiration_scan_frequency_secs),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Config(format!("{name} must be a finite, non-negative number, got {value}")));
            }
        }

        Ok(())
    }

    pub fn update_rate(&self) -> Duration {
        Duration::from_secs_f32(self.update_rate_ms / 1000.0)
    }

    pub fn dispose_rate(&self) -> Duration {
        Duration::from_secs_f32(self.dispose_rate_secs)
    }

    pub fn sliding_expiration(&self) -> Duration {
        Duration::from_secs_f32(self.sliding_expiration_secs)
    }

    pub fn expiration_scan_frequency(&self) -> Duration {
        Duration::from_secs_f32(self.expiration_scan_frequency_secs)
    }

    pub fn point_sliding_expiration(&self) -> Duration {
        Duration::from_secs_f32(self.point_sliding_expiration_secs)
    }

    pub fn point_expiration_scan_frequency(&self) -> Duration {
        Duration::from_secs_f32(self.point_expiration_scan_frequency_secs)
    }
}
