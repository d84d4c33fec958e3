//! Two-pass bounding-sphere fitting.
//!
//! The first pass records the extreme points of every included sphere along
//! a fixed set of directions and takes their centroid as the center. The
//! second pass grows the radius until every sphere is contained. The result
//! always contains all inputs but is not the minimal enclosing sphere.

use glam::Vec3;

use super::sphere::Sphere3D;

/// Axis, face-diagonal and body-diagonal directions (unnormalized).
const DIRECTIONS: [[f32; 3]; 13] = [
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 1.0, 0.0],
    [1.0, -1.0, 0.0],
    [1.0, 0.0, 1.0],
    [1.0, 0.0, -1.0],
    [0.0, 1.0, 1.0],
    [0.0, 1.0, -1.0],
    [1.0, 1.0, 1.0],
    [1.0, 1.0, -1.0],
    [1.0, -1.0, 1.0],
    [-1.0, 1.0, 1.0],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Include,
    Radius,
}

#[derive(Debug, Clone, Copy)]
struct Extremum {
    min: f32,
    max: f32,
    min_point: Vec3,
    max_point: Vec3,
}

impl Extremum {
    const RESET: Self = Self {
        min: f32::INFINITY,
        max: f32::NEG_INFINITY,
        min_point: Vec3::ZERO,
        max_point: Vec3::ZERO,
    };
}

/// Incremental helper for fitting a sphere around many spheres.
///
/// Usage: [`include_sphere`](Self::include_sphere) for every input, then
/// [`finished_include_step`](Self::finished_include_step), then
/// [`radius_sphere`](Self::radius_sphere) for every input again, then
/// [`sphere`](Self::sphere).
#[derive(Debug, Clone)]
pub struct BoundaryHelper {
    dirs: [Vec3; 13],
    extrema: [Extremum; 13],
    count: usize,
    center: Vec3,
    radius: f32,
    step: Step,
}

impl BoundaryHelper {
    /// Helper in its initial include step.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dirs: DIRECTIONS.map(|d| Vec3::from_array(d).normalize()),
            extrema: [Extremum::RESET; 13],
            count: 0,
            center: Vec3::ZERO,
            radius: 0.0,
            step: Step::Include,
        }
    }

    /// Forget all included spheres.
    pub fn reset(&mut self) {
        self.extrema = [Extremum::RESET; 13];
        self.count = 0;
        self.center = Vec3::ZERO;
        self.radius = 0.0;
        self.step = Step::Include;
    }

    /// First pass: record the sphere's extent along every direction.
    pub fn include_sphere(&mut self, sphere: &Sphere3D) {
        debug_assert_eq!(self.step, Step::Include);
        for (dir, ext) in self.dirs.iter().zip(self.extrema.iter_mut()) {
            let d = dir.dot(sphere.center);
            if d - sphere.radius < ext.min {
                ext.min = d - sphere.radius;
                ext.min_point = sphere.center - *dir * sphere.radius;
            }
            if d + sphere.radius > ext.max {
                ext.max = d + sphere.radius;
                ext.max_point = sphere.center + *dir * sphere.radius;
            }
        }
        self.count += 1;
    }

    /// Close the first pass and derive the center from the extreme points.
    pub fn finished_include_step(&mut self) {
        if self.count > 0 {
            let sum: Vec3 = self
                .extrema
                .iter()
                .map(|e| e.min_point + e.max_point)
                .sum();
            self.center = sum / (2.0 * self.extrema.len() as f32);
        }
        self.radius = 0.0;
        self.step = Step::Radius;
    }

    /// Second pass: grow the radius to contain `sphere`.
    pub fn radius_sphere(&mut self, sphere: &Sphere3D) {
        debug_assert_eq!(self.step, Step::Radius);
        let r = self.center.distance(sphere.center) + sphere.radius;
        if r > self.radius {
            self.radius = r;
        }
    }

    /// The fitted sphere, or [`Sphere3D::EMPTY`] when nothing was included.
    #[must_use]
    pub fn sphere(&self) -> Sphere3D {
        if self.count == 0 {
            Sphere3D::EMPTY
        } else {
            Sphere3D::new(self.center, self.radius)
        }
    }

    /// Convenience: fit a sphere around all of `spheres` in two passes.
    #[must_use]
    pub fn fit(spheres: &[Sphere3D]) -> Sphere3D {
        let mut helper = Self::new();
        for s in spheres {
            helper.include_sphere(s);
        }
        helper.finished_include_step();
        for s in spheres {
            helper.radius_sphere(s);
        }
        helper.sphere()
    }
}

impl Default for BoundaryHelper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_gives_empty_sphere() {
        assert_eq!(BoundaryHelper::fit(&[]), Sphere3D::EMPTY);
    }

    #[test]
    fn single_sphere_is_reproduced() {
        let s = Sphere3D::new(Vec3::new(1.0, 2.0, 3.0), 4.0);
        let fitted = BoundaryHelper::fit(&[s]);
        assert!(fitted.center.distance(s.center) < 1e-4);
        assert!((fitted.radius - 4.0).abs() < 1e-4);
    }

    #[test]
    fn fitted_sphere_contains_every_input() {
        let spheres: Vec<Sphere3D> = (0..50)
            .map(|i| {
                let f = i as f32;
                Sphere3D::new(
                    Vec3::new(f.sin() * 30.0, (f * 0.7).cos() * 12.0, f),
                    1.0 + (f * 0.3).sin().abs() * 5.0,
                )
            })
            .collect();
        let fitted = BoundaryHelper::fit(&spheres);
        for s in &spheres {
            assert!(fitted.includes(s));
        }
    }
}
