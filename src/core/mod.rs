//! Core types, errors, configuration and camera state

pub mod types;
pub mod error;
pub mod logging;
pub mod config;
pub mod camera;

pub use types::*;
pub use error::Error;
pub use config::StreamingConfig;
pub use camera::{Camera, ViewState};
