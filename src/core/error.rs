//! Error types for point cloud streaming

use thiserror::Error;

use crate::octree::OctantId;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Octree has no root octant")]
    MissingRoot,

    #[error("Malformed octree: {0}")]
    MalformedOctree(String),

    #[error("Invalid octant id: {0}")]
    InvalidOctantId(String),

    #[error("Invalid frustum: {0}")]
    InvalidFrustum(String),

    #[error("Point schema is undefined")]
    UndefinedPointSchema,

    #[error("Failed to load points for octant {id}: {message}")]
    Load { id: OctantId, message: String },

    #[error("Batch error: {0}")]
    Batch(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl Error {
    /// Shorthand for a load failure of a single octant
    pub fn load(id: OctantId, message: impl Into<String>) -> Self {
        Self::Load { id, message: message.into() }
    }
}
