//! Multi-pass renderer.
//!
//! [`Renderer`] walks a scene group in draw order once per pass and, per
//! renderable, applies visibility culling, a pass filter, program and global
//! uniform binding, and the face-culling table before asking the renderable
//! to draw. It never picks a transparency technique or composes passes;
//! that is [`DrawPass`](crate::passes::DrawPass)'s job.

/// Frustum, LOD, occlusion and instance-grid culling.
pub mod cull;
/// Opaque/transparent pass membership and face culling.
pub mod filter;
/// Draw counters.
pub mod stats;
/// The global uniform block.
pub mod uniforms;

use crate::camera::CameraView;
use crate::error::CanvasError;
use crate::gpu::{BlendMode, DepthFunc, GpuContext, ProgramId, TextureBinding};
use crate::math::{Frustum, Plane, Viewport};
use crate::options::RendererProps;
use crate::scene::{Group, MarkingType, PickType, RenderVariant, Renderable, Scene};
use crate::util::ValueCell;

pub use cull::{CullInputs, OcclusionTest, Visibility};
pub use filter::{face_culling, is_opaque, is_transparent, FaceFlag};
pub use stats::RendererStats;
pub use uniforms::{GlobalUniforms, RenderMask};

const BOTH_FACES: &[FaceFlag] = &[FaceFlag::BlendedBack, FaceFlag::BlendedFront];
const DEFAULT_FACES: &[FaceFlag] = &[FaceFlag::None];
const BACK_FACES: &[FaceFlag] = &[FaceFlag::BlendedBack];

/// Depth-write policy of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DepthWrite {
    On,
    Off,
    PerRenderable,
}

/// Fixed-function and uniform setup applied at the start of a pass.
#[derive(Debug, Clone, Copy)]
struct PassSetup {
    blend: BlendMode,
    depth_test: bool,
    depth_write: DepthWrite,
    mask: RenderMask,
    pick_type: PickType,
    marking_type: Option<MarkingType>,
}

impl PassSetup {
    const OPAQUE: Self = Self {
        blend: BlendMode::Disabled,
        depth_test: true,
        depth_write: DepthWrite::On,
        mask: RenderMask::All,
        pick_type: PickType::All,
        marking_type: None,
    };

    fn mask(self, mask: RenderMask) -> Self {
        Self { mask, ..self }
    }
}

/// Pass sequencer bound to one GPU context.
pub struct Renderer {
    props: RendererProps,
    globals: GlobalUniforms,
    globals_need_update: bool,
    current_program: Option<ProgramId>,
    viewport: ValueCell<Viewport>,
    pixel_ratio: ValueCell<f32>,
    drawing_buffer_size: ValueCell<(u32, u32)>,
    transparent_background: ValueCell<bool>,
    frustum: Frustum,
    camera_plane: Plane,
    depth_write: DepthWrite,
    occlusion: Option<OcclusionTest>,
    stats: RendererStats,
}

impl Renderer {
    /// Renderer sized to the context's drawing buffer.
    #[must_use]
    pub fn new(ctx: &dyn GpuContext, props: RendererProps) -> Self {
        let (width, height) = ctx.drawing_buffer_size();
        let mut globals = GlobalUniforms::default();
        globals.apply_props(&props);
        globals.viewport = [0.0, 0.0, width as f32, height as f32];
        globals.draw_buffer = [
            width as f32,
            height as f32,
            ctx.pixel_ratio(),
            globals.draw_buffer[3],
        ];
        Self {
            transparent_background: ValueCell::new(props.transparent_background),
            props,
            globals,
            globals_need_update: true,
            current_program: None,
            viewport: ValueCell::new(Viewport::new(0, 0, width, height)),
            pixel_ratio: ValueCell::new(ctx.pixel_ratio()),
            drawing_buffer_size: ValueCell::new((width, height)),
            frustum: Frustum::default(),
            camera_plane: Plane::default(),
            depth_write: DepthWrite::On,
            occlusion: None,
            stats: RendererStats::default(),
        }
    }

    /// Current props.
    #[must_use]
    pub fn props(&self) -> &RendererProps {
        &self.props
    }

    /// Apply new props; uniforms are re-uploaded only if something changed.
    pub fn set_props(&mut self, props: &RendererProps) {
        if *props == self.props {
            return;
        }
        self.props = props.clone();
        self.globals.apply_props(props);
        let _ = self.transparent_background.update_if_changed(props.transparent_background);
        self.globals_need_update = true;
    }

    /// Current global uniform values.
    #[must_use]
    pub fn globals(&self) -> &GlobalUniforms {
        &self.globals
    }

    /// Counters since the last [`reset_stats`](Self::reset_stats).
    #[must_use]
    pub fn stats(&self) -> &RendererStats {
        &self.stats
    }

    /// Zero the counters.
    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Install or remove the occlusion test consulted while culling.
    pub fn set_occlusion_test(&mut self, test: Option<OcclusionTest>) {
        self.occlusion = test;
    }

    /// Viewport set by [`set_viewport`](Self::set_viewport).
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport.value()
    }

    /// Take camera matrices, frustum and camera plane from `camera`.
    pub fn update(&mut self, camera: &dyn CameraView) {
        self.globals.apply_camera(camera);
        self.frustum = Frustum::from_view_projection(camera.projection_view());
        self.camera_plane = Plane::from_normal_and_point(camera.direction(), camera.position());
        self.globals_need_update = true;
    }

    /// Set the GL-style viewport and scissor.
    pub fn set_viewport(&mut self, ctx: &mut dyn GpuContext, viewport: Viewport) {
        ctx.set_viewport(viewport);
        ctx.set_scissor(Some(viewport));
        if self.viewport.update_if_changed(viewport) {
            self.globals.viewport = [
                viewport.x as f32,
                viewport.y as f32,
                viewport.width as f32,
                viewport.height as f32,
            ];
            self.globals_need_update = true;
        }
    }

    /// Set the device pixel ratio.
    pub fn set_pixel_ratio(&mut self, ratio: f32) {
        if self.pixel_ratio.update_if_changed(ratio) {
            self.globals.draw_buffer[2] = ratio;
            self.globals_need_update = true;
        }
    }

    /// Set the drawing buffer size.
    pub fn set_drawing_buffer_size(&mut self, width: u32, height: u32) {
        if self.drawing_buffer_size.update_if_changed((width, height)) {
            self.globals.draw_buffer[0] = width as f32;
            self.globals.draw_buffer[1] = height as f32;
            self.globals_need_update = true;
        }
    }

    /// Clear to transparent black instead of the background color.
    pub fn set_transparent_background(&mut self, value: bool) {
        if self.transparent_background.update_if_changed(value) {
            self.props.transparent_background = value;
            self.globals.draw_buffer[3] = if value { 1.0 } else { 0.0 };
            self.globals_need_update = true;
        }
    }

    /// Clear color and depth of the bound target inside the viewport.
    ///
    /// Transparent black when the background is transparent (unless
    /// `ignore_transparent_background`) or `force_to_transparency`, else the
    /// background color when `to_background_color`, else opaque white.
    pub fn clear(
        &mut self,
        ctx: &mut dyn GpuContext,
        to_background_color: bool,
        ignore_transparent_background: bool,
        force_to_transparency: bool,
    ) {
        ctx.set_scissor(Some(self.viewport.value()));
        ctx.set_depth_write(true);
        ctx.set_color_mask([true; 4]);
        let color = if (self.transparent_background.value() && !ignore_transparent_background)
            || force_to_transparency
        {
            [0.0, 0.0, 0.0, 0.0]
        } else if to_background_color {
            let [r, g, b] = self.props.background_color;
            [r, g, b, 1.0]
        } else {
            [1.0, 1.0, 1.0, 1.0]
        };
        ctx.clear(Some(color), Some(1.0));
    }

    /// Clear depth only, or with `packed` the packed-depth color buffer to
    /// the far value.
    pub fn clear_depth(&mut self, ctx: &mut dyn GpuContext, packed: bool) {
        ctx.set_scissor(Some(self.viewport.value()));
        if packed {
            ctx.set_color_mask([true; 4]);
            ctx.clear(Some([1.0, 1.0, 1.0, 1.0]), None);
        } else {
            ctx.set_depth_write(true);
            ctx.clear(None, Some(1.0));
        }
    }

    fn begin(&mut self, ctx: &mut dyn GpuContext, camera: &dyn CameraView, setup: PassSetup) {
        self.update(camera);
        self.globals.set_render_mask(setup.mask);
        self.globals.pick_type = setup.pick_type.as_uniform();
        self.globals.marking_type = match setup.marking_type {
            None => 0,
            Some(MarkingType::Depth) => 1,
            Some(MarkingType::Mask) => 2,
        };
        self.globals_need_update = true;
        self.current_program = None;
        self.depth_write = setup.depth_write;
        ctx.set_blend(setup.blend);
        ctx.set_depth_test(setup.depth_test);
        ctx.set_depth_func(DepthFunc::Less);
        ctx.set_depth_write(setup.depth_write != DepthWrite::Off);
        ctx.set_color_mask([true; 4]);
    }

    fn render_object(
        &mut self,
        ctx: &mut dyn GpuContext,
        r: &mut dyn Renderable,
        variant: RenderVariant,
        flag: FaceFlag,
        shared: &[TextureBinding],
    ) -> Result<(), CanvasError> {
        let state = *r.state();
        let color_variant = matches!(
            variant,
            RenderVariant::ColorBlended
                | RenderVariant::ColorWboit
                | RenderVariant::ColorDpoit
                | RenderVariant::Emissive
                | RenderVariant::Tracing
        );
        if state.disposed
            || !state.visible
            || r.values().draw_count.value() == 0
            || (matches!(variant, RenderVariant::Pick(_)) && !state.pickable)
            || (state.color_only && !color_variant)
        {
            return Ok(());
        }
        let Some(program) = r.program_id(variant) else {
            return Ok(());
        };

        let visibility = CullInputs {
            frustum: &self.frustum,
            camera_plane: &self.camera_plane,
            occlusion: self.occlusion.as_deref(),
        }
        .cull(r.values());
        let instances = match visibility {
            Visibility::Hidden => {
                self.stats.culled_renderables += 1;
                return Ok(());
            }
            Visibility::All => {
                r.uncull();
                r.values().instance_count.value()
            }
            Visibility::Instances { visible, culled } => {
                self.stats.culled_instances += culled;
                r.cull(&visible);
                visible.len() as u32
            }
        };

        if self.current_program != Some(program) {
            ctx.use_program(program);
            self.current_program = Some(program);
            self.stats.program_switches += 1;
            self.globals_need_update = true;
        }
        if self.globals_need_update {
            ctx.set_globals(bytemuck::bytes_of(&self.globals));
            self.globals_need_update = false;
        }

        let values = r.values();
        let (cull, front) = face_culling(
            flag,
            values.double_sided.value(),
            values.flip_sided.value(),
            values.xray_shaded.value().is_on(),
        );
        ctx.set_cull_face(cull);
        ctx.set_front_face(front);
        if self.depth_write == DepthWrite::PerRenderable {
            ctx.set_depth_write(state.write_depth);
        }

        r.render(ctx, variant, shared)?;
        self.stats.draw_calls += 1;
        self.stats.instances_drawn += instances;
        Ok(())
    }

    /// Render every renderable of `group` for which `select` returns face
    /// flags, once per flag.
    fn render_selected(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &mut Scene,
        group: Group,
        variant: RenderVariant,
        shared: &[TextureBinding],
        select: impl Fn(&dyn Renderable) -> Option<&'static [FaceFlag]>,
    ) -> Result<(), CanvasError> {
        for entry in scene.entries_mut() {
            let r = entry.renderable.as_mut();
            if !group.contains(r) {
                continue;
            }
            let Some(flags) = select(r) else {
                continue;
            };
            for &flag in flags {
                self.render_object(ctx, r, variant, flag, shared)?;
            }
        }
        log::trace!("{variant:?} pass: {:?}", self.stats);
        Ok(())
    }

    fn transparent_faces(r: &dyn Renderable) -> Option<&'static [FaceFlag]> {
        if !is_transparent(r) {
            return None;
        }
        let values = r.values();
        Some(if values.double_sided.value() && !values.xray_shaded.value().is_on() {
            BOTH_FACES
        } else {
            DEFAULT_FACES
        })
    }

    /// Opaque fragments of opaque renderables.
    ///
    /// # Errors
    ///
    /// Backend errors from draws.
    pub fn render_opaque(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &mut Scene,
        group: Group,
        camera: &dyn CameraView,
        depth: Option<TextureBinding>,
    ) -> Result<(), CanvasError> {
        self.begin(ctx, camera, PassSetup::OPAQUE.mask(RenderMask::Opaque));
        let shared: Vec<TextureBinding> = depth.into_iter().collect();
        self.render_selected(ctx, scene, group, RenderVariant::ColorBlended, &shared, |r| {
            is_opaque(r).then_some(DEFAULT_FACES)
        })
    }

    /// Transparent fragments, premultiplied blending in scene order.
    /// Double-sided renderables draw back faces, then front faces.
    ///
    /// # Errors
    ///
    /// Backend errors from draws.
    pub fn render_blended_transparent(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &mut Scene,
        group: Group,
        camera: &dyn CameraView,
        depth: Option<TextureBinding>,
    ) -> Result<(), CanvasError> {
        self.begin(
            ctx,
            camera,
            PassSetup {
                blend: BlendMode::Premultiplied,
                depth_write: DepthWrite::PerRenderable,
                mask: RenderMask::Transparent,
                ..PassSetup::OPAQUE
            },
        );
        let shared: Vec<TextureBinding> = depth.into_iter().collect();
        self.render_selected(
            ctx,
            scene,
            group,
            RenderVariant::ColorBlended,
            &shared,
            Self::transparent_faces,
        )
    }

    /// Opaque pass if the scene has opaque parts, then the transparent pass
    /// if its opacity average is below 1.
    ///
    /// # Errors
    ///
    /// Backend errors from draws.
    pub fn render_blended(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &mut Scene,
        camera: &dyn CameraView,
    ) -> Result<(), CanvasError> {
        if scene.has_opaque() {
            self.render_opaque(ctx, scene, Group::Primitives, camera, None)?;
        }
        if scene.opacity_average() < 1.0 {
            self.render_blended_transparent(ctx, scene, Group::Primitives, camera, None)?;
        }
        Ok(())
    }

    fn render_depth_selected(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &mut Scene,
        group: Group,
        camera: &dyn CameraView,
        select: impl Fn(&dyn Renderable) -> Option<&'static [FaceFlag]>,
    ) -> Result<(), CanvasError> {
        self.begin(ctx, camera, PassSetup::OPAQUE);
        self.render_selected(ctx, scene, group, RenderVariant::Depth, &[], select)
    }

    /// Packed depth of everything.
    ///
    /// # Errors
    ///
    /// Backend errors from draws.
    pub fn render_depth(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &mut Scene,
        group: Group,
        camera: &dyn CameraView,
    ) -> Result<(), CanvasError> {
        self.render_depth_selected(ctx, scene, group, camera, |_| Some(DEFAULT_FACES))
    }

    /// Packed depth of opaque renderables.
    ///
    /// # Errors
    ///
    /// Backend errors from draws.
    pub fn render_depth_opaque(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &mut Scene,
        group: Group,
        camera: &dyn CameraView,
    ) -> Result<(), CanvasError> {
        self.render_depth_selected(ctx, scene, group, camera, |r| {
            is_opaque(r).then_some(DEFAULT_FACES)
        })
    }

    /// Packed depth of transparent renderables.
    ///
    /// # Errors
    ///
    /// Backend errors from draws.
    pub fn render_depth_transparent(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &mut Scene,
        group: Group,
        camera: &dyn CameraView,
    ) -> Result<(), CanvasError> {
        self.render_depth_selected(ctx, scene, group, camera, |r| {
            is_transparent(r).then_some(DEFAULT_FACES)
        })
    }

    /// Packed depth of the back faces of opaque renderables.
    ///
    /// # Errors
    ///
    /// Backend errors from draws.
    pub fn render_depth_opaque_back(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &mut Scene,
        group: Group,
        camera: &dyn CameraView,
    ) -> Result<(), CanvasError> {
        self.render_depth_selected(ctx, scene, group, camera, |r| {
            is_opaque(r).then_some(BACK_FACES)
        })
    }

    /// Object, instance, group or depth ids of pickable renderables.
    /// [`PickType::All`] writes every buffer at once.
    ///
    /// # Errors
    ///
    /// Backend errors from draws.
    pub fn render_pick(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &mut Scene,
        group: Group,
        camera: &dyn CameraView,
        pick_type: PickType,
    ) -> Result<(), CanvasError> {
        self.begin(ctx, camera, PassSetup { pick_type, ..PassSetup::OPAQUE });
        self.render_selected(ctx, scene, group, RenderVariant::Pick(pick_type), &[], |_| {
            Some(DEFAULT_FACES)
        })
    }

    /// Depth of geometry that is not fully marked.
    ///
    /// # Errors
    ///
    /// Backend errors from draws.
    pub fn render_marking_depth(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &mut Scene,
        group: Group,
        camera: &dyn CameraView,
    ) -> Result<(), CanvasError> {
        self.begin(
            ctx,
            camera,
            PassSetup { marking_type: Some(MarkingType::Depth), ..PassSetup::OPAQUE },
        );
        self.render_selected(
            ctx,
            scene,
            group,
            RenderVariant::Marking(MarkingType::Depth),
            &[],
            |r| (r.values().marker_average.value() < 1.0).then_some(DEFAULT_FACES),
        )
    }

    /// Mask of marked geometry, tested against the marking depth.
    ///
    /// # Errors
    ///
    /// Backend errors from draws.
    pub fn render_marking_mask(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &mut Scene,
        group: Group,
        camera: &dyn CameraView,
        depth: Option<TextureBinding>,
    ) -> Result<(), CanvasError> {
        self.begin(
            ctx,
            camera,
            PassSetup { marking_type: Some(MarkingType::Mask), ..PassSetup::OPAQUE },
        );
        let shared: Vec<TextureBinding> = depth.into_iter().collect();
        self.render_selected(
            ctx,
            scene,
            group,
            RenderVariant::Marking(MarkingType::Mask),
            &shared,
            |r| (r.values().marker_average.value() > 0.0).then_some(DEFAULT_FACES),
        )
    }

    /// Emissive contribution of renderables with emissive groups.
    ///
    /// # Errors
    ///
    /// Backend errors from draws.
    pub fn render_emissive(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &mut Scene,
        group: Group,
        camera: &dyn CameraView,
        depth: Option<TextureBinding>,
    ) -> Result<(), CanvasError> {
        self.begin(ctx, camera, PassSetup::OPAQUE);
        let shared: Vec<TextureBinding> = depth.into_iter().collect();
        self.render_selected(ctx, scene, group, RenderVariant::Emissive, &shared, |r| {
            (r.values().emissive_average.value() > 0.0).then_some(DEFAULT_FACES)
        })
    }

    /// Inputs for path-traced effects.
    ///
    /// # Errors
    ///
    /// Backend errors from draws.
    pub fn render_tracing(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &mut Scene,
        group: Group,
        camera: &dyn CameraView,
    ) -> Result<(), CanvasError> {
        self.begin(ctx, camera, PassSetup::OPAQUE);
        self.render_selected(ctx, scene, group, RenderVariant::Tracing, &[], |_| {
            Some(DEFAULT_FACES)
        })
    }

    /// Direct volumes, blended over the opaque depth.
    ///
    /// # Errors
    ///
    /// Backend errors from draws.
    pub fn render_volume(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &mut Scene,
        camera: &dyn CameraView,
        depth: Option<TextureBinding>,
    ) -> Result<(), CanvasError> {
        self.begin(
            ctx,
            camera,
            PassSetup {
                blend: BlendMode::Premultiplied,
                depth_write: DepthWrite::Off,
                ..PassSetup::OPAQUE
            },
        );
        let shared: Vec<TextureBinding> = depth.into_iter().collect();
        self.render_selected(ctx, scene, Group::Volumes, RenderVariant::ColorBlended, &shared, |_| {
            Some(DEFAULT_FACES)
        })
    }

    /// Opaque fragments with the WBOIT program variant.
    ///
    /// # Errors
    ///
    /// Backend errors from draws.
    pub fn render_wboit_opaque(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &mut Scene,
        group: Group,
        camera: &dyn CameraView,
    ) -> Result<(), CanvasError> {
        self.begin(ctx, camera, PassSetup::OPAQUE.mask(RenderMask::Opaque));
        self.render_selected(ctx, scene, group, RenderVariant::ColorWboit, &[], |r| {
            is_opaque(r).then_some(DEFAULT_FACES)
        })
    }

    /// Transparent fragments accumulated into the WBOIT targets.
    ///
    /// # Errors
    ///
    /// Backend errors from draws.
    pub fn render_wboit_transparent(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &mut Scene,
        group: Group,
        camera: &dyn CameraView,
        depth: Option<TextureBinding>,
    ) -> Result<(), CanvasError> {
        self.begin(
            ctx,
            camera,
            PassSetup {
                blend: BlendMode::Wboit,
                depth_write: DepthWrite::Off,
                mask: RenderMask::Transparent,
                ..PassSetup::OPAQUE
            },
        );
        let shared: Vec<TextureBinding> = depth.into_iter().collect();
        self.render_selected(ctx, scene, group, RenderVariant::ColorWboit, &shared, |r| {
            is_transparent(r).then_some(DEFAULT_FACES)
        })
    }

    /// Opaque fragments with the DPOIT program variant.
    ///
    /// # Errors
    ///
    /// Backend errors from draws.
    pub fn render_dpoit_opaque(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &mut Scene,
        group: Group,
        camera: &dyn CameraView,
    ) -> Result<(), CanvasError> {
        self.begin(ctx, camera, PassSetup::OPAQUE.mask(RenderMask::Opaque));
        self.render_selected(ctx, scene, group, RenderVariant::ColorDpoit, &[], |r| {
            is_opaque(r).then_some(DEFAULT_FACES)
        })
    }

    /// One depth-peeling iteration over transparent fragments. `peel` holds
    /// the previous iteration's depth and color textures.
    ///
    /// # Errors
    ///
    /// Backend errors from draws.
    pub fn render_dpoit_transparent(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &mut Scene,
        group: Group,
        camera: &dyn CameraView,
        depth: Option<TextureBinding>,
        peel: &[TextureBinding],
    ) -> Result<(), CanvasError> {
        self.begin(
            ctx,
            camera,
            PassSetup {
                blend: BlendMode::Max,
                depth_write: DepthWrite::Off,
                mask: RenderMask::Transparent,
                ..PassSetup::OPAQUE
            },
        );
        let shared: Vec<TextureBinding> = depth.into_iter().chain(peel.iter().copied()).collect();
        self.render_selected(ctx, scene, group, RenderVariant::ColorDpoit, &shared, |r| {
            is_transparent(r).then_some(DEFAULT_FACES)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use glam::Vec3;

    use super::*;
    use crate::camera::{Camera, CameraSnapshot};
    use crate::gpu::{CullFace, GpuCommand, HeadlessContext, ProgramDescriptor};
    use crate::scene::test_support::TestObject;
    use crate::scene::GraphicsRenderObject;

    fn camera() -> Camera {
        let snapshot = CameraSnapshot {
            position: Vec3::new(0.0, 0.0, 50.0),
            radius: 10.0,
            radius_max: 10.0,
            ..CameraSnapshot::default()
        };
        Camera::new(snapshot, Viewport::new(0, 0, 64, 64))
    }

    fn setup(objects: Vec<Rc<dyn GraphicsRenderObject>>) -> (HeadlessContext, Scene, Renderer) {
        let mut ctx = HeadlessContext::new(64, 64);
        let mut scene = Scene::default();
        for o in objects {
            scene.add(o);
        }
        assert!(scene.commit(&mut ctx, None).unwrap());
        let renderer = Renderer::new(&ctx, RendererProps::default());
        let _ = ctx.take_log();
        (ctx, scene, renderer)
    }

    fn draw_blends(ctx: &HeadlessContext) -> Vec<BlendMode> {
        ctx.log()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::Draw { state, .. } => Some(state.blend),
                _ => None,
            })
            .collect()
    }

    fn translucent(id: u32, alpha: f32) -> TestObject {
        let mut o = TestObject::new(id);
        o.alpha = alpha;
        o
    }

    #[test]
    fn opaque_only_scene_skips_transparent_pass() {
        let (mut ctx, mut scene, mut renderer) = setup(vec![TestObject::rc(1), TestObject::rc(2)]);
        renderer.render_blended(&mut ctx, &mut scene, &camera()).unwrap();
        assert_eq!(draw_blends(&ctx), vec![BlendMode::Disabled; 2]);
    }

    #[test]
    fn transparent_only_scene_skips_opaque_pass() {
        let (mut ctx, mut scene, mut renderer) = setup(vec![translucent(1, 0.5).into_rc()]);
        assert!(!scene.has_opaque());
        renderer.render_blended(&mut ctx, &mut scene, &camera()).unwrap();
        assert_eq!(draw_blends(&ctx), vec![BlendMode::Premultiplied]);
    }

    #[test]
    fn mixed_scene_runs_both_passes() {
        let (mut ctx, mut scene, mut renderer) =
            setup(vec![TestObject::rc(1), translucent(2, 0.5).into_rc()]);
        assert!(scene.has_opaque());
        let opacity = scene.opacity_average();
        assert!(opacity > 0.0 && opacity < 1.0);
        renderer.render_blended(&mut ctx, &mut scene, &camera()).unwrap();
        assert_eq!(draw_blends(&ctx), vec![BlendMode::Disabled, BlendMode::Premultiplied]);
    }

    #[test]
    fn globals_rebound_only_on_program_change() {
        let mut ctx = HeadlessContext::new(64, 64);
        let shared = ctx.register_program(&ProgramDescriptor::screen_space("mesh", "")).unwrap();
        let mut scene = Scene::default();
        for id in 1..=3 {
            let mut o = TestObject::new(id);
            o.program_id = Some(shared);
            scene.add(o.into_rc());
        }
        assert!(scene.commit(&mut ctx, None).unwrap());
        let mut renderer = Renderer::new(&ctx, RendererProps::default());
        let _ = ctx.take_log();
        renderer
            .render_opaque(&mut ctx, &mut scene, Group::Primitives, &camera(), None)
            .unwrap();
        let uses = ctx.log().iter().filter(|c| matches!(c, GpuCommand::UseProgram(_))).count();
        let globals = ctx.log().iter().filter(|c| matches!(c, GpuCommand::SetGlobals)).count();
        assert_eq!((uses, globals, ctx.draw_count()), (1, 1, 3));
        assert_eq!(renderer.stats().program_switches, 1);
    }

    #[test]
    fn culls_renderables_outside_the_frustum() {
        let (mut ctx, mut scene, mut renderer) = setup(vec![
            TestObject::rc(1),
            TestObject::new(2).at(Vec3::new(0.0, 0.0, 500.0), 1.0).into_rc(),
        ]);
        renderer
            .render_opaque(&mut ctx, &mut scene, Group::Primitives, &camera(), None)
            .unwrap();
        assert_eq!(ctx.draw_count(), 1);
        assert_eq!(renderer.stats().culled_renderables, 1);
    }

    #[test]
    fn occlusion_test_rejects_renderables() {
        let (mut ctx, mut scene, mut renderer) = setup(vec![TestObject::rc(1)]);
        renderer.set_occlusion_test(Some(Box::new(|_| true)));
        renderer
            .render_opaque(&mut ctx, &mut scene, Group::Primitives, &camera(), None)
            .unwrap();
        assert_eq!(ctx.draw_count(), 0);
    }

    #[test]
    fn pick_pass_skips_unpickable_and_color_only() {
        let (mut ctx, mut scene, mut renderer) =
            setup(vec![TestObject::rc(1), TestObject::rc(2), TestObject::rc(3)]);
        scene.renderable_mut(1).unwrap().state_mut().pickable = false;
        scene.renderable_mut(2).unwrap().state_mut().color_only = true;
        renderer
            .render_pick(&mut ctx, &mut scene, Group::All, &camera(), PickType::Object)
            .unwrap();
        assert_eq!(ctx.draw_count(), 1);
        assert_eq!(renderer.globals().pick_type, PickType::Object.as_uniform());
    }

    #[test]
    fn empty_renderables_are_skipped_by_every_pass() {
        let mut empty = TestObject::new(1);
        empty.draw_count = 0;
        let mut empty_translucent = translucent(2, 0.5);
        empty_translucent.draw_count = 0;
        let (mut ctx, mut scene, mut renderer) =
            setup(vec![empty.into_rc(), empty_translucent.into_rc()]);
        renderer
            .render_opaque(&mut ctx, &mut scene, Group::Primitives, &camera(), None)
            .unwrap();
        renderer
            .render_blended_transparent(&mut ctx, &mut scene, Group::Primitives, &camera(), None)
            .unwrap();
        renderer
            .render_pick(&mut ctx, &mut scene, Group::All, &camera(), PickType::All)
            .unwrap();
        assert_eq!(ctx.draw_count(), 0);
        assert_eq!(renderer.stats().draw_calls, 0);
    }

    #[test]
    fn double_sided_transparent_draws_back_then_front() {
        let (mut ctx, mut scene, mut renderer) = setup(vec![translucent(1, 0.5).into_rc()]);
        scene.renderable_mut(1).unwrap().values_mut().double_sided.update(true);
        renderer
            .render_blended_transparent(&mut ctx, &mut scene, Group::Primitives, &camera(), None)
            .unwrap();
        let culls: Vec<CullFace> = ctx
            .log()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::Draw { state, .. } => Some(state.cull),
                _ => None,
            })
            .collect();
        assert_eq!(culls, vec![CullFace::Front, CullFace::Back]);
    }

    #[test]
    fn marking_passes_filter_by_marker_average() {
        let mut marked = TestObject::new(1);
        marked.marker = 1.0;
        let (mut ctx, mut scene, mut renderer) = setup(vec![marked.into_rc(), TestObject::rc(2)]);
        renderer
            .render_marking_depth(&mut ctx, &mut scene, Group::Primitives, &camera())
            .unwrap();
        assert_eq!(ctx.draw_count(), 1);
        let _ = ctx.take_log();
        renderer
            .render_marking_mask(&mut ctx, &mut scene, Group::Primitives, &camera(), None)
            .unwrap();
        assert_eq!(ctx.draw_count(), 1);
        assert_eq!(renderer.globals().marking_type, 2);
    }

    #[test]
    fn volumes_only_drawn_by_volume_pass() {
        let mut volume = TestObject::new(1);
        volume.kind = crate::scene::GeometryKind::DirectVolume;
        let (mut ctx, mut scene, mut renderer) = setup(vec![volume.into_rc(), TestObject::rc(2)]);
        renderer.render_blended(&mut ctx, &mut scene, &camera()).unwrap();
        assert_eq!(ctx.draw_count(), 1);
        let _ = ctx.take_log();
        renderer.render_volume(&mut ctx, &mut scene, &camera(), None).unwrap();
        assert_eq!(draw_blends(&ctx), vec![BlendMode::Premultiplied]);
    }

    #[test]
    fn setters_only_change_on_new_values() {
        let (mut ctx, _, mut renderer) = setup(vec![]);
        renderer.set_viewport(&mut ctx, Viewport::new(0, 0, 64, 64));
        assert_eq!(renderer.viewport.version(), 0);
        renderer.set_viewport(&mut ctx, Viewport::new(0, 0, 32, 64));
        assert_eq!(renderer.viewport.version(), 1);
        renderer.set_pixel_ratio(1.0);
        assert_eq!(renderer.pixel_ratio.version(), 0);
        renderer.set_transparent_background(true);
        assert_eq!(renderer.globals().draw_buffer[3], 1.0);
    }

    #[test]
    fn clear_colors() {
        let (mut ctx, _, mut renderer) = setup(vec![]);
        renderer.set_props(&RendererProps {
            background_color: [0.25, 0.5, 0.75],
            ..RendererProps::default()
        });
        renderer.clear(&mut ctx, true, false, false);
        renderer.set_transparent_background(true);
        renderer.clear(&mut ctx, true, false, false);
        renderer.clear(&mut ctx, true, true, false);
        renderer.clear(&mut ctx, false, true, false);
        let colors: Vec<_> = ctx
            .log()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::Clear { color, .. } => *color,
                _ => None,
            })
            .collect();
        assert_eq!(
            colors,
            vec![
                [0.25, 0.5, 0.75, 1.0],
                [0.0, 0.0, 0.0, 0.0],
                [0.25, 0.5, 0.75, 1.0],
                [1.0, 1.0, 1.0, 1.0],
            ]
        );
    }
}
