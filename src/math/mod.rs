//! Geometric primitives for octant scoring and batch bounds

pub mod aabb;
pub mod ray;
pub mod frustum;

pub use aabb::{Aabb, DAabb};
pub use ray::Ray;
pub use frustum::{Plane, Frustum};
