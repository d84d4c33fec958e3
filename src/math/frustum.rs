//! View frustum and planes for culling
//!
//! Extracts frustum planes from the view-projection matrix and provides
//! intersection tests for points and spheres.

use glam::{Mat4, Vec3, Vec4};

use super::sphere::Sphere3D;

/// A plane in 3D space, represented as (normal.x, normal.y, normal.z, distance)
/// where the plane equation is: ax + by + cz + d = 0
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Plane {
    /// Unit normal pointing into the positive half-space.
    pub normal: Vec3,
    /// Signed distance from origin (`n · p + d = 0`).
    pub distance: f32,
}

impl Plane {
    /// Create a plane from coefficients and normalize it
    #[must_use]
    pub fn from_coefficients(a: f32, b: f32, c: f32, d: f32) -> Self {
        let len = (a * a + b * b + c * c).sqrt();
        if len > 0.0 {
            Self {
                normal: Vec3::new(a / len, b / len, c / len),
                distance: d / len,
            }
        } else {
            Self {
                normal: Vec3::ZERO,
                distance: 0.0,
            }
        }
    }

    /// Plane through `point` facing along `normal` (normalized here).
    #[must_use]
    pub fn from_normal_and_point(normal: Vec3, point: Vec3) -> Self {
        let n = normal.normalize_or_zero();
        Self {
            normal: n,
            distance: -n.dot(point),
        }
    }

    /// Signed distance from point to plane (positive = in front, negative =
    /// behind)
    #[inline]
    #[must_use]
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// View frustum consisting of 6 planes
#[derive(Debug, Clone, Default)]
pub struct Frustum {
    /// Six clipping planes: left, right, bottom, top, near, far.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix.
    /// Uses the Gribb/Hartmann method for plane extraction.
    /// Planes point inward (positive half-space is inside the frustum).
    #[must_use]
    pub fn from_view_projection(vp: Mat4) -> Self {
        let row0 = vp.row(0);
        let row1 = vp.row(1);
        let row2 = vp.row(2);
        let row3 = vp.row(3);

        // Right-handed system with [0,1] depth range (wgpu/Vulkan)
        let planes: [Vec4; 6] = [
            row3 + row0,
            row3 - row0,
            row3 + row1,
            row3 - row1,
            row2,
            row3 - row2,
        ];
        Self {
            planes: planes
                .map(|p| Plane::from_coefficients(p.x, p.y, p.z, p.w)),
        }
    }

    /// Test if a point is inside the frustum
    #[inline]
    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|p| p.distance_to_point(point) >= 0.0)
    }

    /// Test if a sphere intersects or is inside the frustum
    #[inline]
    #[must_use]
    pub fn intersects_sphere(&self, sphere: &Sphere3D) -> bool {
        self.planes
            .iter()
            .all(|p| p.distance_to_point(sphere.center) >= -sphere.radius)
    }

    /// Test if a sphere is completely inside the frustum (not just
    /// intersecting)
    #[inline]
    #[must_use]
    pub fn contains_sphere(&self, sphere: &Sphere3D) -> bool {
        self.planes
            .iter()
            .all(|p| p.distance_to_point(sphere.center) >= sphere.radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frustum() -> Frustum {
        let proj = Mat4::perspective_rh(45.0_f32.to_radians(), 1.0, 0.1, 100.0);
        let view =
            Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
        Frustum::from_view_projection(proj * view)
    }

    #[test]
    fn test_frustum_contains_origin() {
        let frustum = frustum();
        assert!(frustum.contains_point(Vec3::ZERO));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 20.0)));
    }

    #[test]
    fn test_sphere_intersection() {
        let frustum = frustum();
        assert!(frustum.intersects_sphere(&Sphere3D::new(Vec3::ZERO, 1.0)));
        assert!(frustum.contains_sphere(&Sphere3D::new(Vec3::ZERO, 1.0)));
        assert!(!frustum
            .intersects_sphere(&Sphere3D::new(Vec3::new(0.0, 0.0, 50.0), 1.0)));
    }

    #[test]
    fn plane_from_normal_and_point() {
        let plane = Plane::from_normal_and_point(Vec3::Z * 2.0, Vec3::Z);
        assert!((plane.distance_to_point(Vec3::new(3.0, 1.0, 4.0)) - 3.0).abs()
            < 1e-6);
    }
}
