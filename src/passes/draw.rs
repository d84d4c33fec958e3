//! Color pass sequencing for one frame.
//!
//! Everything is drawn into an offscreen color target. Transparency uses the
//! configured technique, falling back to plain blending when the context
//! lacks float or multi-render targets. Volumes, marking edges and emissive
//! contributions are composed on top, and [`DrawPass::present`] copies the
//! result to the output.

use super::{compose, ComposeStep, CompositeKind, CompositePrograms};
use crate::camera::{CameraView, ViewCamera};
use crate::error::CanvasError;
use crate::gpu::{
    Attachment, BlendMode, GpuCapabilities, GpuContext, RenderTargetDescriptor, RenderTargetId,
    TextureBinding, TextureFormat,
};
use crate::math::Viewport;
use crate::options::TransparencyMode;
use crate::renderer::Renderer;
use crate::scene::{Group, Scene};

/// Transparency technique that `caps` can actually run.
#[must_use]
pub fn effective_transparency(caps: &GpuCapabilities, mode: TransparencyMode) -> TransparencyMode {
    let oit = caps.float_textures && caps.multi_render_targets;
    match mode {
        TransparencyMode::Wboit if !(oit && caps.max_draw_buffers >= 2) => TransparencyMode::Blended,
        TransparencyMode::Dpoit if !(oit && caps.max_draw_buffers >= 3) => TransparencyMode::Blended,
        m => m,
    }
}

fn color(target: RenderTargetId, index: u32) -> TextureBinding {
    TextureBinding {
        target,
        attachment: Attachment::Color(index),
    }
}

/// Lazily created offscreen targets.
#[derive(Debug, Default, Clone, Copy)]
struct Targets {
    color: Option<RenderTargetId>,
    depth: Option<RenderTargetId>,
    wboit: Option<RenderTargetId>,
    peel: Option<[RenderTargetId; 2]>,
    marking_depth: Option<RenderTargetId>,
    marking_mask: Option<RenderTargetId>,
    emissive: Option<RenderTargetId>,
}

impl Targets {
    fn all(&self) -> Vec<RenderTargetId> {
        let peel = self.peel.into_iter().flatten();
        [
            self.color,
            self.depth,
            self.wboit,
            self.marking_depth,
            self.marking_mask,
            self.emissive,
        ]
        .into_iter()
        .flatten()
        .chain(peel)
        .collect()
    }
}

/// Sequences the color passes of a frame.
#[derive(Debug)]
pub struct DrawPass {
    width: u32,
    height: u32,
    transparency: TransparencyMode,
    dpoit_iterations: u32,
    marking: bool,
    targets: Targets,
    /// Full-screen programs used for composition.
    pub composite: CompositePrograms,
}

fn ensure(
    ctx: &mut dyn GpuContext,
    slot: &mut Option<RenderTargetId>,
    desc: &RenderTargetDescriptor,
) -> Result<RenderTargetId, CanvasError> {
    if let Some(id) = *slot {
        return Ok(id);
    }
    let id = ctx.create_render_target(desc)?;
    *slot = Some(id);
    Ok(id)
}

impl DrawPass {
    /// Draw pass for a `width`x`height` drawing buffer.
    ///
    /// # Errors
    ///
    /// [`CanvasError::TextureTooLarge`] and other creation failures.
    pub fn new(ctx: &mut dyn GpuContext, width: u32, height: u32) -> Result<Self, CanvasError> {
        let mut pass = Self {
            width,
            height,
            transparency: TransparencyMode::Blended,
            dpoit_iterations: 2,
            marking: true,
            targets: Targets::default(),
            composite: CompositePrograms::default(),
        };
        let _ = pass.color_target(ctx)?;
        Ok(pass)
    }

    /// Apply transparency and marking settings.
    pub fn set_props(&mut self, transparency: TransparencyMode, dpoit_iterations: u32, marking: bool) {
        self.transparency = transparency;
        self.dpoit_iterations = dpoit_iterations.max(1);
        self.marking = marking;
    }

    /// Configured transparency technique.
    #[must_use]
    pub fn transparency(&self) -> TransparencyMode {
        self.transparency
    }

    /// Drawing buffer size the targets follow.
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn full_viewport(&self) -> Viewport {
        Viewport::new(0, 0, self.width, self.height)
    }

    /// The offscreen color target holding the last frame.
    ///
    /// # Errors
    ///
    /// Creation failures.
    pub fn color_target(&mut self, ctx: &mut dyn GpuContext) -> Result<RenderTargetId, CanvasError> {
        let desc = RenderTargetDescriptor::rgba8("draw color", self.width, self.height, true);
        ensure(ctx, &mut self.targets.color, &desc)
    }

    fn depth_target(&mut self, ctx: &mut dyn GpuContext) -> Result<RenderTargetId, CanvasError> {
        let desc = RenderTargetDescriptor::rgba8("draw depth", self.width, self.height, true);
        ensure(ctx, &mut self.targets.depth, &desc)
    }

    fn wboit_target(&mut self, ctx: &mut dyn GpuContext) -> Result<RenderTargetId, CanvasError> {
        let desc = RenderTargetDescriptor {
            label: "wboit",
            width: self.width,
            height: self.height,
            color: vec![TextureFormat::Rgba16Float; 2],
            depth: true,
        };
        ensure(ctx, &mut self.targets.wboit, &desc)
    }

    fn peel_targets(&mut self, ctx: &mut dyn GpuContext) -> Result<[RenderTargetId; 2], CanvasError> {
        if let Some(ids) = self.targets.peel {
            return Ok(ids);
        }
        let desc = |label| RenderTargetDescriptor {
            label,
            width: self.width,
            height: self.height,
            color: vec![TextureFormat::Rgba16Float; 3],
            depth: false,
        };
        let ids = [
            ctx.create_render_target(&desc("dpoit peel a"))?,
            ctx.create_render_target(&desc("dpoit peel b"))?,
        ];
        self.targets.peel = Some(ids);
        Ok(ids)
    }

    /// Resize every created target.
    ///
    /// # Errors
    ///
    /// [`CanvasError::TextureTooLarge`] when the new size exceeds the limit.
    pub fn set_size(&mut self, ctx: &mut dyn GpuContext, width: u32, height: u32) -> Result<(), CanvasError> {
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        self.width = width;
        self.height = height;
        for id in self.targets.all() {
            ctx.resize_render_target(id, width, height)?;
        }
        Ok(())
    }

    /// Forget targets and programs lost with the context and recreate the
    /// color target.
    ///
    /// # Errors
    ///
    /// Creation failures.
    pub fn reset(&mut self, ctx: &mut dyn GpuContext) -> Result<(), CanvasError> {
        self.targets = Targets::default();
        self.composite.clear();
        let _ = self.color_target(ctx)?;
        Ok(())
    }

    /// Release every target.
    pub fn dispose(&mut self, ctx: &mut dyn GpuContext) {
        for id in self.targets.all() {
            ctx.destroy_render_target(id);
        }
        self.targets = Targets::default();
    }

    /// Bind `target` and clear it over the full drawing buffer.
    fn bind_clear(
        &self,
        ctx: &mut dyn GpuContext,
        renderer: &mut Renderer,
        target: RenderTargetId,
        color: [f32; 4],
    ) {
        ctx.bind_render_target(Some(target));
        renderer.set_viewport(ctx, self.full_viewport());
        ctx.set_scissor(None);
        ctx.set_depth_write(true);
        ctx.set_color_mask([true; 4]);
        ctx.clear(Some(color), Some(1.0));
    }

    /// Draw a frame into the color target.
    ///
    /// # Errors
    ///
    /// Target creation failures and backend errors from draws.
    pub fn render(
        &mut self,
        ctx: &mut dyn GpuContext,
        renderer: &mut Renderer,
        scene: &mut Scene,
        camera: ViewCamera<'_>,
    ) -> Result<(), CanvasError> {
        let eyes = camera.eyes();
        let color_target = self.color_target(ctx)?;
        ctx.bind_render_target(Some(color_target));
        renderer.set_viewport(ctx, self.full_viewport());
        renderer.clear(ctx, true, false, false);

        let mode = effective_transparency(ctx.capabilities(), self.transparency);
        if mode != self.transparency {
            log::debug!("{:?} transparency unsupported, using {mode:?}", self.transparency);
        }
        let transparent = scene.opacity_average() < 1.0;

        match mode {
            TransparencyMode::Blended => {
                if scene.has_opaque() {
                    each_eye(ctx, renderer, &eyes, |ctx, r, eye| {
                        r.render_opaque(ctx, scene, Group::Primitives, eye, None)
                    })?;
                }
                self.render_volumes(ctx, renderer, scene, &eyes)?;
                if transparent {
                    ctx.bind_render_target(Some(color_target));
                    each_eye(ctx, renderer, &eyes, |ctx, r, eye| {
                        r.render_blended_transparent(ctx, scene, Group::Primitives, eye, None)
                    })?;
                }
            }
            TransparencyMode::Wboit => {
                each_eye(ctx, renderer, &eyes, |ctx, r, eye| {
                    r.render_wboit_opaque(ctx, scene, Group::Primitives, eye)
                })?;
                self.render_volumes(ctx, renderer, scene, &eyes)?;
                if transparent {
                    self.render_wboit(ctx, renderer, scene, &eyes, color_target)?;
                }
            }
            TransparencyMode::Dpoit => {
                each_eye(ctx, renderer, &eyes, |ctx, r, eye| {
                    r.render_dpoit_opaque(ctx, scene, Group::Primitives, eye)
                })?;
                self.render_volumes(ctx, renderer, scene, &eyes)?;
                if transparent {
                    self.render_dpoit(ctx, renderer, scene, &eyes, color_target)?;
                }
            }
        }

        if self.marking && scene.marker_average() > 0.0 {
            self.render_marking(ctx, renderer, scene, &eyes, color_target)?;
        }
        if scene.emissive_average() > 0.0 {
            self.render_emissive(ctx, renderer, scene, &eyes, color_target)?;
        }
        log::trace!("draw pass: {:?}", renderer.stats());
        Ok(())
    }

    /// Packed depth of the opaque primitives, for passes that test against
    /// it while drawing into another target.
    fn render_opaque_depth(
        &mut self,
        ctx: &mut dyn GpuContext,
        renderer: &mut Renderer,
        scene: &mut Scene,
        eyes: &[&dyn CameraView],
    ) -> Result<TextureBinding, CanvasError> {
        let target = self.depth_target(ctx)?;
        self.bind_clear(ctx, renderer, target, [1.0; 4]);
        each_eye(ctx, renderer, eyes, |ctx, r, eye| {
            r.render_depth_opaque(ctx, scene, Group::Primitives, eye)
        })?;
        Ok(color(target, 0))
    }

    fn render_volumes(
        &mut self,
        ctx: &mut dyn GpuContext,
        renderer: &mut Renderer,
        scene: &mut Scene,
        eyes: &[&dyn CameraView],
    ) -> Result<(), CanvasError> {
        if scene.group(Group::Volumes).next().is_none() {
            return Ok(());
        }
        let depth = self.render_opaque_depth(ctx, renderer, scene, eyes)?;
        let color_target = self.color_target(ctx)?;
        ctx.bind_render_target(Some(color_target));
        each_eye(ctx, renderer, eyes, |ctx, r, eye| {
            r.render_volume(ctx, scene, eye, Some(depth))
        })
    }

    fn render_wboit(
        &mut self,
        ctx: &mut dyn GpuContext,
        renderer: &mut Renderer,
        scene: &mut Scene,
        eyes: &[&dyn CameraView],
        color_target: RenderTargetId,
    ) -> Result<(), CanvasError> {
        let depth = self.render_opaque_depth(ctx, renderer, scene, eyes)?;
        let wboit = self.wboit_target(ctx)?;
        self.bind_clear(ctx, renderer, wboit, [0.0, 0.0, 0.0, 1.0]);
        each_eye(ctx, renderer, eyes, |ctx, r, eye| {
            r.render_wboit_transparent(ctx, scene, Group::Primitives, eye, Some(depth))
        })?;
        let _ = compose(
            ctx,
            &self.composite,
            &ComposeStep {
                kind: CompositeKind::WboitResolve,
                target: Some(color_target),
                viewport: self.full_viewport(),
                blend: BlendMode::Premultiplied,
                textures: &[color(wboit, 0), color(wboit, 1)],
                uniforms: None,
            },
        )?;
        Ok(())
    }

    fn render_dpoit(
        &mut self,
        ctx: &mut dyn GpuContext,
        renderer: &mut Renderer,
        scene: &mut Scene,
        eyes: &[&dyn CameraView],
        color_target: RenderTargetId,
    ) -> Result<(), CanvasError> {
        let depth = self.render_opaque_depth(ctx, renderer, scene, eyes)?;
        let peel = self.peel_targets(ctx)?;
        // The first iteration reads an empty previous layer.
        ctx.bind_render_target(Some(peel[1]));
        ctx.set_scissor(None);
        ctx.clear(Some([0.0; 4]), None);
        let mut current = peel[0];
        for i in 0..self.dpoit_iterations {
            current = peel[(i % 2) as usize];
            let previous = peel[((i + 1) % 2) as usize];
            let inputs = [color(previous, 0), color(previous, 1), color(previous, 2)];
            self.bind_clear(ctx, renderer, current, [0.0; 4]);
            each_eye(ctx, renderer, eyes, |ctx, r, eye| {
                r.render_dpoit_transparent(ctx, scene, Group::Primitives, eye, Some(depth), &inputs)
            })?;
            let _ = compose(
                ctx,
                &self.composite,
                &ComposeStep {
                    kind: CompositeKind::DpoitBlendBack,
                    target: Some(color_target),
                    viewport: self.full_viewport(),
                    blend: BlendMode::Premultiplied,
                    textures: &[color(current, 2)],
                    uniforms: None,
                },
            )?;
        }
        let _ = compose(
            ctx,
            &self.composite,
            &ComposeStep {
                kind: CompositeKind::DpoitResolve,
                target: Some(color_target),
                viewport: self.full_viewport(),
                blend: BlendMode::Premultiplied,
                textures: &[color(current, 1)],
                uniforms: None,
            },
        )?;
        Ok(())
    }

    fn render_marking(
        &mut self,
        ctx: &mut dyn GpuContext,
        renderer: &mut Renderer,
        scene: &mut Scene,
        eyes: &[&dyn CameraView],
        color_target: RenderTargetId,
    ) -> Result<(), CanvasError> {
        let (w, h) = (self.width, self.height);
        let depth_target = ensure(
            ctx,
            &mut self.targets.marking_depth,
            &RenderTargetDescriptor::rgba8("marking depth", w, h, true),
        )?;
        let mask_target = ensure(
            ctx,
            &mut self.targets.marking_mask,
            &RenderTargetDescriptor::rgba8("marking mask", w, h, true),
        )?;

        self.bind_clear(ctx, renderer, depth_target, [1.0; 4]);
        each_eye(ctx, renderer, eyes, |ctx, r, eye| {
            r.render_marking_depth(ctx, scene, Group::Primitives, eye)
        })?;
        self.bind_clear(ctx, renderer, mask_target, [0.0; 4]);
        let depth = color(depth_target, 0);
        each_eye(ctx, renderer, eyes, |ctx, r, eye| {
            r.render_marking_mask(ctx, scene, Group::Primitives, eye, Some(depth))
        })?;
        let _ = compose(
            ctx,
            &self.composite,
            &ComposeStep {
                kind: CompositeKind::MarkingEdge,
                target: Some(color_target),
                viewport: self.full_viewport(),
                blend: BlendMode::Premultiplied,
                textures: &[color(mask_target, 0), depth],
                uniforms: None,
            },
        )?;
        Ok(())
    }

    fn render_emissive(
        &mut self,
        ctx: &mut dyn GpuContext,
        renderer: &mut Renderer,
        scene: &mut Scene,
        eyes: &[&dyn CameraView],
        color_target: RenderTargetId,
    ) -> Result<(), CanvasError> {
        let (w, h) = (self.width, self.height);
        let target = ensure(
            ctx,
            &mut self.targets.emissive,
            &RenderTargetDescriptor::rgba8("emissive", w, h, true),
        )?;
        self.bind_clear(ctx, renderer, target, [0.0, 0.0, 0.0, 1.0]);
        each_eye(ctx, renderer, eyes, |ctx, r, eye| {
            r.render_emissive(ctx, scene, Group::Primitives, eye, None)
        })?;
        let _ = compose(
            ctx,
            &self.composite,
            &ComposeStep {
                kind: CompositeKind::Emissive,
                target: Some(color_target),
                viewport: self.full_viewport(),
                blend: BlendMode::Additive,
                textures: &[color(target, 0)],
                uniforms: None,
            },
        )?;
        Ok(())
    }

    /// Copy the color target to `output` (`None` is the drawing buffer).
    /// Returns whether a copy program was available.
    ///
    /// # Errors
    ///
    /// Backend errors from the copy draw.
    pub fn present(
        &mut self,
        ctx: &mut dyn GpuContext,
        output: Option<RenderTargetId>,
    ) -> Result<bool, CanvasError> {
        let color_target = self.color_target(ctx)?;
        compose(
            ctx,
            &self.composite,
            &ComposeStep {
                kind: CompositeKind::Copy,
                target: output,
                viewport: self.full_viewport(),
                blend: BlendMode::Disabled,
                textures: &[color(color_target, 0)],
                uniforms: None,
            },
        )
    }
}

/// Run `f` once per eye with the renderer viewport set to the eye's.
fn each_eye(
    ctx: &mut dyn GpuContext,
    renderer: &mut Renderer,
    eyes: &[&dyn CameraView],
    mut f: impl FnMut(&mut dyn GpuContext, &mut Renderer, &dyn CameraView) -> Result<(), CanvasError>,
) -> Result<(), CanvasError> {
    for eye in eyes {
        renderer.set_viewport(ctx, eye.viewport());
        f(ctx, renderer, *eye)?;
    }
    Ok(())
}
