//! Geometry primitives used by culling, scene aggregates and picking.

pub mod boundary;
pub mod frustum;
pub mod sphere;
pub mod viewport;

pub use boundary::BoundaryHelper;
pub use frustum::{Frustum, Plane};
pub use sphere::Sphere3D;
pub use viewport::{unproject, Viewport};
