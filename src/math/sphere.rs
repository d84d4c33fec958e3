//! Bounding spheres.

use glam::{Mat4, Vec3};

/// Sphere in 3D space. A radius of zero marks an empty sphere.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sphere3D {
    /// Sphere center.
    pub center: Vec3,
    /// Sphere radius.
    pub radius: f32,
}

/// Relative slack for containment tests, absorbing float round-off.
const EPS: f32 = 1e-5;

impl Sphere3D {
    /// The empty sphere at the origin.
    pub const EMPTY: Self = Self {
        center: Vec3::ZERO,
        radius: 0.0,
    };

    /// Sphere with the given center and radius.
    #[must_use]
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Whether the sphere has no extent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.radius <= 0.0
    }

    /// Whether `other` lies entirely inside `self`.
    #[must_use]
    pub fn includes(&self, other: &Sphere3D) -> bool {
        let slack = EPS * self.radius.max(1.0);
        self.center.distance(other.center) + other.radius
            <= self.radius + slack
    }

    /// Whether the two spheres intersect or touch.
    #[must_use]
    pub fn overlaps(&self, other: &Sphere3D) -> bool {
        self.center.distance(other.center) <= self.radius + other.radius
    }

    /// Whether `point` lies inside the sphere.
    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.center.distance(point) <= self.radius
    }

    /// Sphere grown by `delta` (clamped at zero).
    #[must_use]
    pub fn expand(&self, delta: f32) -> Sphere3D {
        Sphere3D::new(self.center, (self.radius + delta).max(0.0))
    }

    /// Transform by an affine matrix. The radius scales by the largest axis
    /// scale so the result still bounds the transformed object.
    #[must_use]
    pub fn transform(&self, m: &Mat4) -> Sphere3D {
        let center = m.transform_point3(self.center);
        let scale = m
            .x_axis
            .truncate()
            .length()
            .max(m.y_axis.truncate().length())
            .max(m.z_axis.truncate().length());
        Sphere3D::new(center, self.radius * scale)
    }

    /// Whether the center and radius differ by more than `tolerance`.
    #[must_use]
    pub fn differs(&self, other: &Sphere3D, tolerance: f32) -> bool {
        self.center.distance(other.center) > tolerance
            || (self.radius - other.radius).abs() > tolerance
    }
}
