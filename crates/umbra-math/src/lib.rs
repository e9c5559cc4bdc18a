//! Bounding volumes and plane math shared by the Umbra rendering crates.

mod aabb;
mod plane;

pub use aabb::{Aabb, PLANAR_EPSILON};
pub use plane::Plane;
