//! Render objects and renderables for unit tests.
//!
//! The headless backend does not rasterize, so [`TestRenderable`] writes its
//! pick ids straight into the bound pick target when drawn with a pick
//! variant.

use std::cell::Cell;
use std::rc::Rc;

use glam::Vec3;

use crate::error::CanvasError;
use crate::gpu::{
    BufferId, BufferUsage, DrawCall, GpuContext, ProgramDescriptor, ProgramId, TextureBinding,
};
use crate::math::{Sphere3D, Viewport};
use crate::util::packing::{pack_depth_to_rgba, pack_int_to_rgb};

use super::object::{GraphicsRenderObject, ObjectId};
use super::renderable::{
    GeometryKind, PickType, Renderable, RenderableId, RenderableState, RenderableValues,
    RenderVariant,
};

/// What a [`TestRenderable`] writes into pick buffers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickFootprint {
    /// Covered pixels, in pick-target coordinates.
    pub rect: Viewport,
    /// Instance id written.
    pub instance: u32,
    /// Group id written.
    pub group: u32,
    /// Depth written.
    pub depth: f32,
}

/// Configurable render object.
#[derive(Debug, Clone)]
pub struct TestObject {
    pub id: ObjectId,
    pub program: &'static str,
    pub program_id: Option<ProgramId>,
    pub material: u32,
    pub sphere: Sphere3D,
    pub alpha: f32,
    pub transparency: f32,
    pub marker: f32,
    pub emissive: f32,
    pub kind: GeometryKind,
    pub draw_count: u32,
    pub footprint: Option<PickFootprint>,
    pub fail: bool,
    pub created: Rc<Cell<u32>>,
}

impl TestObject {
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            program: "mesh",
            program_id: None,
            material: 0,
            sphere: Sphere3D::new(Vec3::ZERO, 1.0),
            alpha: 1.0,
            transparency: 0.0,
            marker: 0.0,
            emissive: 0.0,
            kind: GeometryKind::Mesh,
            draw_count: 3,
            footprint: None,
            fail: false,
            created: Rc::new(Cell::new(0)),
        }
    }

    pub fn rc(id: ObjectId) -> Rc<dyn GraphicsRenderObject> {
        Rc::new(Self::new(id))
    }

    pub fn into_rc(self) -> Rc<dyn GraphicsRenderObject> {
        Rc::new(self)
    }

    pub fn at(mut self, center: Vec3, radius: f32) -> Self {
        self.sphere = Sphere3D::new(center, radius);
        self
    }
}

impl GraphicsRenderObject for TestObject {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn create_renderable(
        &self,
        ctx: &mut dyn GpuContext,
        id: RenderableId,
    ) -> Result<Box<dyn Renderable>, CanvasError> {
        if self.fail {
            return Err(CanvasError::Program(format!("object {} refused", self.id)));
        }
        self.created.set(self.created.get() + 1);
        let program = match self.program_id {
            Some(id) => id,
            None => ctx.register_program(&ProgramDescriptor::screen_space(self.program, ""))?,
        };
        let vertices = ctx.create_buffer(BufferUsage::Vertex, &[0; 36]);
        let mut values = RenderableValues::default();
        values.alpha.update(self.alpha);
        values.transparency_average.update(self.transparency);
        values.marker_average.update(self.marker);
        values.emissive_average.update(self.emissive);
        values.geometry_kind.update(self.kind);
        values.draw_count.update(self.draw_count);
        values.bounding_sphere.update(self.sphere);
        values.invariant_bounding_sphere.update(self.sphere);
        let mut state = RenderableState::default();
        state.derive_opaque(&values);
        Ok(Box::new(TestRenderable {
            id,
            object_id: self.id,
            material: self.material,
            program,
            vertices,
            state,
            values,
            footprint: self.footprint,
            culled: None,
            variants: Vec::new(),
            updates: 0,
        }))
    }
}

/// Renderable built by [`TestObject`].
pub struct TestRenderable {
    pub id: RenderableId,
    pub object_id: ObjectId,
    pub material: u32,
    pub program: ProgramId,
    pub vertices: BufferId,
    pub state: RenderableState,
    pub values: RenderableValues,
    pub footprint: Option<PickFootprint>,
    pub culled: Option<Vec<u32>>,
    pub variants: Vec<RenderVariant>,
    pub updates: u32,
}

impl TestRenderable {
    fn write_pick(&self, ctx: &mut dyn GpuContext, pick: PickType) -> Result<(), CanvasError> {
        let (Some(fp), Some(target)) = (self.footprint, ctx.bound_render_target()) else {
            return Ok(());
        };
        let rgb = |v: u32| {
            let [r, g, b] = pack_int_to_rgb(v);
            [r, g, b, 255]
        };
        let outputs = [
            (PickType::Object, rgb(self.object_id)),
            (PickType::Instance, rgb(fp.instance)),
            (PickType::Group, rgb(fp.group)),
            (PickType::Depth, pack_depth_to_rgba(fp.depth)),
        ];
        let pixels = (fp.rect.width * fp.rect.height) as usize;
        for (attachment, (kind, px)) in outputs.iter().enumerate() {
            let slot = match pick {
                PickType::All => attachment as u32,
                p if p == *kind => 0,
                _ => continue,
            };
            let data: Vec<u8> = px.iter().copied().cycle().take(pixels * 4).collect();
            ctx.write_pixels(target, slot, fp.rect, &data)?;
        }
        Ok(())
    }
}

impl Renderable for TestRenderable {
    fn id(&self) -> RenderableId {
        self.id
    }

    fn material_id(&self) -> u32 {
        self.material
    }

    fn program_id(&self, _variant: RenderVariant) -> Option<ProgramId> {
        Some(self.program)
    }

    fn state(&self) -> &RenderableState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RenderableState {
        &mut self.state
    }

    fn values(&self) -> &RenderableValues {
        &self.values
    }

    fn values_mut(&mut self) -> &mut RenderableValues {
        &mut self.values
    }

    fn render(
        &mut self,
        ctx: &mut dyn GpuContext,
        variant: RenderVariant,
        shared: &[TextureBinding],
    ) -> Result<(), CanvasError> {
        self.variants.push(variant);
        let instance_count = self
            .culled
            .as_ref()
            .map_or(self.values.instance_count.value(), |v| v.len() as u32);
        ctx.draw(&DrawCall {
            program: self.program,
            vertex_buffers: &[self.vertices],
            index_buffer: None,
            uniform_buffer: None,
            textures: shared,
            count: self.values.draw_count.value(),
            instance_count,
            first_instance: 0,
        })?;
        if let RenderVariant::Pick(pick) = variant {
            self.write_pick(ctx, pick)?;
        }
        Ok(())
    }

    fn update(&mut self, _ctx: &mut dyn GpuContext) -> Result<(), CanvasError> {
        self.updates += 1;
        Ok(())
    }

    fn cull(&mut self, visible_instances: &[u32]) {
        self.culled = Some(visible_instances.to_vec());
    }

    fn uncull(&mut self) {
        self.culled = None;
    }

    fn dispose(&mut self, ctx: &mut dyn GpuContext) {
        ctx.destroy_buffer(self.vertices);
        self.state.disposed = true;
    }
}
