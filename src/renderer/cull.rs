//! Per-renderable visibility tests run before every draw.
//!
//! Order: whole bounding sphere against the frustum, LOD distance range
//! against the camera plane, then either per-cell instance-grid culling or
//! the occlusion callback on the whole sphere.

use crate::math::{Frustum, Plane, Sphere3D};
use crate::scene::{LodRange, RenderableValues};

/// Host-supplied test that reports a sphere as hidden behind other geometry.
pub type OcclusionTest = Box<dyn Fn(&Sphere3D) -> bool>;

/// Camera-derived inputs shared by every test in a pass.
pub struct CullInputs<'a> {
    /// View frustum.
    pub frustum: &'a Frustum,
    /// Plane through the eye facing along the view direction.
    pub camera_plane: &'a Plane,
    /// Optional occlusion test.
    pub occlusion: Option<&'a dyn Fn(&Sphere3D) -> bool>,
}

/// Result of culling one renderable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    /// Nothing to draw.
    Hidden,
    /// Draw every instance.
    All,
    /// Draw only these instances.
    Instances {
        /// Visible instance indices.
        visible: Vec<u32>,
        /// Number of instances dropped.
        culled: u32,
    },
}

impl CullInputs<'_> {
    fn in_lod(&self, lod: &LodRange, sphere: &Sphere3D) -> bool {
        lod.includes(self.camera_plane.distance_to_point(sphere.center), sphere.radius)
    }

    fn occluded(&self, sphere: &Sphere3D) -> bool {
        self.occlusion.is_some_and(|test| test(sphere))
    }

    fn sphere_visible(&self, lod: &LodRange, sphere: &Sphere3D) -> bool {
        self.frustum.intersects_sphere(sphere) && self.in_lod(lod, sphere)
    }

    /// Decide what of a renderable to draw.
    #[must_use]
    pub fn cull(&self, values: &RenderableValues) -> Visibility {
        let sphere = values.bounding_sphere.value();
        let lod = values.lod.value();
        if !self.sphere_visible(&lod, &sphere) {
            return Visibility::Hidden;
        }
        let Some(grid) = values.instance_grid.get() else {
            return if self.occluded(&sphere) {
                Visibility::Hidden
            } else {
                Visibility::All
            };
        };
        let mut visible = Vec::new();
        for cell in &grid.cells {
            if self.sphere_visible(&lod, &cell.sphere) && !self.occluded(&cell.sphere) {
                if let Some(instances) = grid.instances.get(cell.range.clone()) {
                    visible.extend_from_slice(instances);
                }
            }
        }
        let total = grid.instances.len();
        if visible.is_empty() {
            Visibility::Hidden
        } else if visible.len() == total {
            Visibility::All
        } else {
            visible.sort_unstable();
            Visibility::Instances {
                culled: (total - visible.len()) as u32,
                visible,
            }
        }
    }
}
