//! The drawable unit the scene stores and the renderer iterates.
//!
//! A [`Renderable`] owns its GPU buffers and exposes a fixed set of
//! versioned [`RenderableValues`] the core reads for sorting, culling,
//! filtering and aggregation. Nothing here inspects domain data.

use std::ops::Range;

use crate::error::CanvasError;
use crate::gpu::{GpuContext, ProgramId, TextureBinding};
use crate::math::Sphere3D;
use crate::util::ValueCell;

/// Scene-assigned stable identity of a renderable.
pub type RenderableId = u32;

/// Which buffer a pick pass writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PickType {
    /// Every buffer at once (multi-render-target pass).
    All,
    /// Object ids.
    Object,
    /// Instance ids.
    Instance,
    /// Group ids.
    Group,
    /// Packed depth.
    Depth,
}

impl PickType {
    /// Value written to the `pick_type` global uniform.
    #[must_use]
    pub fn as_uniform(self) -> i32 {
        match self {
            Self::All => 0,
            Self::Object => 1,
            Self::Instance => 2,
            Self::Group => 3,
            Self::Depth => 4,
        }
    }
}

/// Which part of the marking effect a marking pass writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkingType {
    /// Depth of marked geometry.
    Depth,
    /// Mask of marked geometry, depth-tested against the marking depth.
    Mask,
}

/// Shader variant a renderable is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderVariant {
    /// Lit color, blended transparency.
    ColorBlended,
    /// Lit color, weighted blended OIT output.
    ColorWboit,
    /// Lit color, dual depth peeling output.
    ColorDpoit,
    /// Id or depth output for picking.
    Pick(PickType),
    /// Packed depth only.
    Depth,
    /// Marking depth or mask.
    Marking(MarkingType),
    /// Emissive contribution.
    Emissive,
    /// Input for path-traced effects.
    Tracing,
}

/// Geometry type tag used by the transparency filters and averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GeometryKind {
    /// Triangle mesh.
    #[default]
    Mesh,
    /// Point sprites.
    Points,
    /// Sphere impostors.
    Spheres,
    /// Cylinder impostors.
    Cylinders,
    /// Text quads.
    Text,
    /// Line segments.
    Lines,
    /// Ray-marched volume.
    DirectVolume,
    /// Textured quad.
    Image,
    /// Mesh sourced from a texture.
    TextureMesh,
}

/// X-ray shading mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum XrayShaded {
    /// Regular shading.
    #[default]
    Off,
    /// Opacity follows the view angle.
    On,
    /// Inverse of `On`.
    Inverted,
}

impl XrayShaded {
    /// Whether any x-ray mode is active.
    #[must_use]
    pub fn is_on(self) -> bool {
        self != Self::Off
    }
}

/// Point sprite style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PointStyle {
    /// Square sprites.
    #[default]
    Square,
    /// Round sprites.
    Circle,
    /// Soft-edged sprites, always blended.
    Fuzzy,
}

/// Camera-plane distance range a renderable is drawn in. All zeros disables
/// the check.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LodRange {
    /// Nearest distance drawn.
    pub min: f32,
    /// Farthest distance drawn.
    pub max: f32,
    /// Extra distance on both ends where neighbouring levels overlap.
    pub overlap: f32,
}

impl LodRange {
    /// Whether LOD culling applies.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.min != 0.0 || self.max != 0.0
    }

    /// Whether a sphere at `distance` from the camera plane (with `radius`)
    /// falls inside the range.
    #[must_use]
    pub fn includes(&self, distance: f32, radius: f32) -> bool {
        !self.is_enabled()
            || (distance + radius >= self.min - self.overlap
                && distance - radius <= self.max + self.overlap)
    }
}

/// A spatial bucket of instances with a shared bounding sphere.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceCell {
    /// Bounds of every instance in the cell.
    pub sphere: Sphere3D,
    /// Indices into [`InstanceGrid::instances`].
    pub range: Range<usize>,
}

/// Instances grouped into cells so large instanced renderables can be culled
/// per cell instead of all-or-nothing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InstanceGrid {
    /// Cells in any order.
    pub cells: Vec<InstanceCell>,
    /// Instance indices, cell by cell.
    pub instances: Vec<u32>,
}

impl InstanceGrid {
    /// Grid with a single cell per instance sphere.
    #[must_use]
    pub fn from_spheres(spheres: &[Sphere3D]) -> Self {
        Self {
            cells: spheres
                .iter()
                .enumerate()
                .map(|(i, s)| InstanceCell {
                    sphere: *s,
                    range: i..i + 1,
                })
                .collect(),
            instances: (0..spheres.len() as u32).collect(),
        }
    }
}

/// Uniform-like values every renderable carries, each in a versioned cell.
#[derive(Debug, Clone)]
pub struct RenderableValues {
    /// Base opacity in `[0, 1]`.
    pub alpha: ValueCell<f32>,
    /// Mean transparency over groups, 0 fully opaque, 1 fully transparent.
    pub transparency_average: ValueCell<f32>,
    /// Mean marker (highlight/select) level over groups.
    pub marker_average: ValueCell<f32>,
    /// Mean emissive level over groups.
    pub emissive_average: ValueCell<f32>,
    /// Geometry type tag.
    pub geometry_kind: ValueCell<GeometryKind>,
    /// LOD distance range.
    pub lod: ValueCell<LodRange>,
    /// Vertex or index count; zero means nothing is drawn.
    pub draw_count: ValueCell<u32>,
    /// Number of instances.
    pub instance_count: ValueCell<u32>,
    /// World-space bounds including all instances.
    pub bounding_sphere: ValueCell<Sphere3D>,
    /// Object-space bounds of a single instance.
    pub invariant_bounding_sphere: ValueCell<Sphere3D>,
    /// X-ray mode.
    pub xray_shaded: ValueCell<XrayShaded>,
    /// Point style (points geometry only).
    pub point_style: ValueCell<PointStyle>,
    /// Draw both faces.
    pub double_sided: ValueCell<bool>,
    /// Swap front and back faces.
    pub flip_sided: ValueCell<bool>,
    /// Optional per-cell instance culling data.
    pub instance_grid: ValueCell<Option<InstanceGrid>>,
}

impl Default for RenderableValues {
    fn default() -> Self {
        Self {
            alpha: ValueCell::new(1.0),
            transparency_average: ValueCell::new(0.0),
            marker_average: ValueCell::new(0.0),
            emissive_average: ValueCell::new(0.0),
            geometry_kind: ValueCell::default(),
            lod: ValueCell::default(),
            draw_count: ValueCell::new(0),
            instance_count: ValueCell::new(1),
            bounding_sphere: ValueCell::default(),
            invariant_bounding_sphere: ValueCell::default(),
            xray_shaded: ValueCell::default(),
            point_style: ValueCell::default(),
            double_sided: ValueCell::new(false),
            flip_sided: ValueCell::new(false),
            instance_grid: ValueCell::new(None),
        }
    }
}

/// Mutable per-renderable flags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderableState {
    /// GPU resources released.
    pub disposed: bool,
    /// Drawn at all.
    pub visible: bool,
    /// Drawn into pick buffers.
    pub pickable: bool,
    /// Only drawn in color passes (not depth, pick or marking).
    pub color_only: bool,
    /// Multiplier on `alpha`.
    pub alpha_factor: f32,
    /// Derived: effective alpha is 1. See [`RenderableState::derive_opaque`].
    pub opaque: bool,
    /// Whether blended passes write depth for this renderable.
    pub write_depth: bool,
}

impl Default for RenderableState {
    fn default() -> Self {
        Self {
            disposed: false,
            visible: true,
            pickable: true,
            color_only: false,
            alpha_factor: 1.0,
            opaque: true,
            write_depth: true,
        }
    }
}

impl RenderableState {
    /// Effective alpha, `alpha * alpha_factor` clamped to `[0, 1]`.
    #[must_use]
    pub fn effective_alpha(&self, values: &RenderableValues) -> f32 {
        (values.alpha.value() * self.alpha_factor).clamp(0.0, 1.0)
    }

    /// Recompute `opaque` from the values.
    pub fn derive_opaque(&mut self, values: &RenderableValues) {
        self.opaque = self.effective_alpha(values) >= 1.0;
    }
}

/// One GPU-drawable unit.
pub trait Renderable {
    /// Stable identity assigned when the scene created it.
    fn id(&self) -> RenderableId;

    /// Material identity; second sort key.
    fn material_id(&self) -> u32;

    /// Program used for `variant`, `None` if the variant is unsupported.
    fn program_id(&self, variant: RenderVariant) -> Option<ProgramId>;

    /// Flags.
    fn state(&self) -> &RenderableState;

    /// Mutable flags.
    fn state_mut(&mut self) -> &mut RenderableState;

    /// Values.
    fn values(&self) -> &RenderableValues;

    /// Mutable values.
    fn values_mut(&mut self) -> &mut RenderableValues;

    /// Issue the draw for `variant`. The renderer has already selected the
    /// program, uploaded globals and set fixed-function state; `shared` holds
    /// pass inputs such as a prior depth texture, in binding order after the
    /// renderable's own textures.
    ///
    /// # Errors
    ///
    /// Backend errors from the draw.
    fn render(
        &mut self,
        ctx: &mut dyn GpuContext,
        variant: RenderVariant,
        shared: &[TextureBinding],
    ) -> Result<(), CanvasError>;

    /// Upload values whose versions changed since the last update.
    ///
    /// # Errors
    ///
    /// Backend errors from buffer writes.
    fn update(&mut self, ctx: &mut dyn GpuContext) -> Result<(), CanvasError>;

    /// Limit subsequent draws to the given instances.
    fn cull(&mut self, _visible_instances: &[u32]) {}

    /// Draw every instance again.
    fn uncull(&mut self) {}

    /// Release GPU resources. Called exactly once.
    fn dispose(&mut self, ctx: &mut dyn GpuContext);
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn lod_range_with_overlap() {
        let lod = LodRange {
            min: 10.0,
            max: 50.0,
            overlap: 2.0,
        };
        assert!(lod.includes(30.0, 0.0));
        assert!(lod.includes(7.0, 1.5));
        assert!(!lod.includes(5.0, 1.0));
        assert!(lod.includes(53.0, 0.0));
        assert!(!lod.includes(60.0, 1.0));
        assert!(LodRange::default().includes(1e9, 0.0));
    }

    #[test]
    fn opaque_follows_effective_alpha() {
        let mut values = RenderableValues::default();
        let mut state = RenderableState::default();
        values.alpha.update(0.5);
        state.derive_opaque(&values);
        assert!(!state.opaque);
        state.alpha_factor = 2.0;
        state.derive_opaque(&values);
        assert!(state.opaque);
    }

    #[test]
    fn grid_from_spheres_has_one_cell_per_instance() {
        let grid = InstanceGrid::from_spheres(&[
            Sphere3D::new(Vec3::ZERO, 1.0),
            Sphere3D::new(Vec3::X, 1.0),
        ]);
        assert_eq!(grid.cells.len(), 2);
        assert_eq!(grid.instances, vec![0, 1]);
        assert_eq!(grid.cells[1].range, 1..2);
    }
}
