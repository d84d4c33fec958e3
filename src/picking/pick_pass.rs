//! Offscreen id/depth buffers at reduced resolution.
//!
//! With multi-render-target support a single target with four color
//! attachments is drawn once; otherwise four single-attachment targets are
//! drawn in turn. Both produce the same buffers.

use crate::camera::ViewCamera;
use crate::error::CanvasError;
use crate::gpu::{GpuContext, RenderTargetDescriptor, RenderTargetId, TextureFormat};
use crate::math::Viewport;
use crate::renderer::Renderer;
use crate::scene::{Group, PickType, Scene};

/// One of the four pick buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickBuffer {
    /// Object ids, RGB packed.
    Object,
    /// Instance ids, RGB packed.
    Instance,
    /// Group ids, RGB packed.
    Group,
    /// Depth, RGBA packed.
    Depth,
}

impl PickBuffer {
    /// All buffers in attachment order.
    pub const ALL: [PickBuffer; 4] = [Self::Object, Self::Instance, Self::Group, Self::Depth];

    /// Attachment slot of this buffer.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Object => 0,
            Self::Instance => 1,
            Self::Group => 2,
            Self::Depth => 3,
        }
    }

    fn pick_type(self) -> PickType {
        match self {
            Self::Object => PickType::Object,
            Self::Instance => PickType::Instance,
            Self::Group => PickType::Group,
            Self::Depth => PickType::Depth,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PickTargets {
    Mrt(RenderTargetId),
    Separate([RenderTargetId; 4]),
}

/// Renders the pick buffers.
#[derive(Debug)]
pub struct PickPass {
    targets: PickTargets,
    pick_scale: f32,
    drawing_size: (u32, u32),
    width: u32,
    height: u32,
}

fn pick_dimensions(drawing_size: (u32, u32), scale: f32) -> (u32, u32) {
    let s = |v: u32| ((v as f32 * scale).ceil() as u32).max(1);
    (s(drawing_size.0), s(drawing_size.1))
}

fn create_targets(
    ctx: &mut dyn GpuContext,
    width: u32,
    height: u32,
) -> Result<PickTargets, CanvasError> {
    let caps = ctx.capabilities();
    if caps.multi_render_targets && caps.max_draw_buffers >= 4 {
        let desc = RenderTargetDescriptor {
            label: "pick",
            width,
            height,
            color: vec![TextureFormat::Rgba8; 4],
            depth: true,
        };
        Ok(PickTargets::Mrt(ctx.create_render_target(&desc)?))
    } else {
        let labels = ["pick object", "pick instance", "pick group", "pick depth"];
        let mut ids = [RenderTargetId(0); 4];
        for (id, label) in ids.iter_mut().zip(labels) {
            *id = ctx.create_render_target(&RenderTargetDescriptor::rgba8(label, width, height, true))?;
        }
        Ok(PickTargets::Separate(ids))
    }
}

impl PickPass {
    /// Pick targets for a `drawing_size` drawing buffer at `pick_scale`.
    ///
    /// # Errors
    ///
    /// [`CanvasError::TextureTooLarge`] and other creation failures.
    pub fn new(
        ctx: &mut dyn GpuContext,
        drawing_size: (u32, u32),
        pick_scale: f32,
    ) -> Result<Self, CanvasError> {
        let (width, height) = pick_dimensions(drawing_size, pick_scale);
        let targets = create_targets(ctx, width, height)?;
        log::debug!(
            "pick pass {width}x{height} ({})",
            if matches!(targets, PickTargets::Mrt(_)) { "mrt" } else { "4 targets" }
        );
        Ok(Self {
            targets,
            pick_scale,
            drawing_size,
            width,
            height,
        })
    }

    /// Whether the single-target multi-attachment backend is used.
    #[must_use]
    pub fn is_mrt(&self) -> bool {
        matches!(self.targets, PickTargets::Mrt(_))
    }

    /// Pick buffer resolution relative to the drawing buffer.
    #[must_use]
    pub fn pick_scale(&self) -> f32 {
        self.pick_scale
    }

    /// Pick buffer size in pixels.
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Resize to `drawing_size` at `scale`. The size limit is checked before
    /// any target changes, so a failure leaves the pass as it was.
    fn resize_targets(
        &mut self,
        ctx: &mut dyn GpuContext,
        drawing_size: (u32, u32),
        scale: f32,
    ) -> Result<(), CanvasError> {
        let (width, height) = pick_dimensions(drawing_size, scale);
        let max = ctx.capabilities().max_texture_size;
        if width > max || height > max {
            return Err(CanvasError::TextureTooLarge { width, height, max });
        }
        if (width, height) != (self.width, self.height) {
            match self.targets {
                PickTargets::Mrt(id) => ctx.resize_render_target(id, width, height)?,
                PickTargets::Separate(ids) => {
                    for id in ids {
                        ctx.resize_render_target(id, width, height)?;
                    }
                }
            }
            self.width = width;
            self.height = height;
        }
        self.drawing_size = drawing_size;
        self.pick_scale = scale;
        Ok(())
    }

    /// Follow a drawing buffer resize.
    ///
    /// # Errors
    ///
    /// [`CanvasError::TextureTooLarge`] when the new size exceeds the limit.
    pub fn set_size(
        &mut self,
        ctx: &mut dyn GpuContext,
        width: u32,
        height: u32,
    ) -> Result<(), CanvasError> {
        self.resize_targets(ctx, (width, height), self.pick_scale)
    }

    /// Change the resolution factor.
    ///
    /// # Errors
    ///
    /// [`CanvasError::TextureTooLarge`] when the new size exceeds the limit.
    pub fn set_pick_scale(&mut self, ctx: &mut dyn GpuContext, scale: f32) -> Result<(), CanvasError> {
        self.resize_targets(ctx, self.drawing_size, scale)
    }

    /// Recreate the targets after the context lost them.
    ///
    /// # Errors
    ///
    /// Creation failures.
    pub fn reset(&mut self, ctx: &mut dyn GpuContext) -> Result<(), CanvasError> {
        self.targets = create_targets(ctx, self.width, self.height)?;
        Ok(())
    }

    /// Draw every pickable renderable into the pick buffers, once per eye.
    ///
    /// # Errors
    ///
    /// Backend errors from draws.
    pub fn render(
        &self,
        ctx: &mut dyn GpuContext,
        renderer: &mut Renderer,
        scene: &mut Scene,
        camera: ViewCamera<'_>,
    ) -> Result<(), CanvasError> {
        match self.targets {
            PickTargets::Mrt(id) => self.render_variant(ctx, renderer, scene, camera, id, PickType::All)?,
            PickTargets::Separate(ids) => {
                for buffer in PickBuffer::ALL {
                    self.render_variant(
                        ctx,
                        renderer,
                        scene,
                        camera,
                        ids[buffer.index()],
                        buffer.pick_type(),
                    )?;
                }
            }
        }
        ctx.bind_render_target(None);
        Ok(())
    }

    fn render_variant(
        &self,
        ctx: &mut dyn GpuContext,
        renderer: &mut Renderer,
        scene: &mut Scene,
        camera: ViewCamera<'_>,
        target: RenderTargetId,
        pick_type: PickType,
    ) -> Result<(), CanvasError> {
        ctx.bind_render_target(Some(target));
        ctx.set_scissor(None);
        ctx.set_color_mask([true; 4]);
        ctx.set_depth_write(true);
        ctx.clear(Some([1.0; 4]), Some(1.0));
        for eye in camera.eyes() {
            renderer.set_viewport(ctx, self.scaled(eye.viewport()));
            renderer.render_pick(ctx, scene, Group::All, eye, pick_type)?;
        }
        Ok(())
    }

    fn scaled(&self, viewport: Viewport) -> Viewport {
        viewport.scaled(self.pick_scale)
    }

    /// Read `rect` of one buffer as RGBA8 into `out`.
    ///
    /// # Errors
    ///
    /// [`CanvasError::ReadPixels`] on size mismatch or readback failure.
    pub fn read(
        &self,
        ctx: &mut dyn GpuContext,
        buffer: PickBuffer,
        rect: Viewport,
        out: &mut [u8],
    ) -> Result<(), CanvasError> {
        let (target, attachment) = match self.targets {
            PickTargets::Mrt(id) => (id, buffer.index() as u32),
            PickTargets::Separate(ids) => (ids[buffer.index()], 0),
        };
        ctx.read_pixels(target, attachment, rect, out)
    }

    /// Release the targets.
    pub fn dispose(&self, ctx: &mut dyn GpuContext) {
        match self.targets {
            PickTargets::Mrt(id) => ctx.destroy_render_target(id),
            PickTargets::Separate(ids) => {
                for id in ids {
                    ctx.destroy_render_target(id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCapabilities, HeadlessContext};

    #[test]
    fn backend_follows_capability() {
        let mut ctx = HeadlessContext::new(100, 80);
        let pass = PickPass::new(&mut ctx, (100, 80), 0.25).unwrap();
        assert!(pass.is_mrt());
        assert_eq!(pass.size(), (25, 20));
        assert_eq!(ctx.render_target_count(), 1);

        let caps = GpuCapabilities {
            multi_render_targets: false,
            ..GpuCapabilities::default()
        };
        let mut ctx = HeadlessContext::with_capabilities(100, 80, caps);
        let pass = PickPass::new(&mut ctx, (100, 80), 0.25).unwrap();
        assert!(!pass.is_mrt());
        assert_eq!(ctx.render_target_count(), 4);
        pass.dispose(&mut ctx);
        assert_eq!(ctx.render_target_count(), 0);
    }

    #[test]
    fn oversized_pick_buffer_is_an_error() {
        let caps = GpuCapabilities {
            max_texture_size: 64,
            ..GpuCapabilities::default()
        };
        let mut ctx = HeadlessContext::with_capabilities(100, 100, caps);
        let mut pass = PickPass::new(&mut ctx, (100, 100), 0.5).unwrap();
        assert!(matches!(
            pass.set_pick_scale(&mut ctx, 1.0),
            Err(CanvasError::TextureTooLarge { .. })
        ));
        assert!((pass.pick_scale() - 0.5).abs() < f32::EPSILON);
        assert_eq!(pass.size(), (50, 50));
        assert!(pass.set_size(&mut ctx, 200, 200).is_err());
        assert_eq!(pass.size(), (50, 50));
        pass.set_size(&mut ctx, 120, 120).unwrap();
        assert_eq!(pass.size(), (60, 60));
    }

    #[test]
    fn failed_rescale_keeps_separate_targets_in_step() {
        let caps = GpuCapabilities {
            max_texture_size: 64,
            multi_render_targets: false,
            ..GpuCapabilities::default()
        };
        let mut ctx = HeadlessContext::with_capabilities(100, 100, caps);
        let mut pass = PickPass::new(&mut ctx, (100, 100), 0.5).unwrap();
        assert!(!pass.is_mrt());
        assert!(pass.set_pick_scale(&mut ctx, 1.0).is_err());
        assert!((pass.pick_scale() - 0.5).abs() < f32::EPSILON);
        let PickTargets::Separate(ids) = pass.targets else {
            panic!("expected separate targets");
        };
        for id in ids {
            assert_eq!(ctx.render_target_size(id), Some((50, 50)));
        }
    }

    #[test]
    fn resize_follows_drawing_buffer() {
        let mut ctx = HeadlessContext::new(100, 80);
        let mut pass = PickPass::new(&mut ctx, (100, 80), 0.5).unwrap();
        pass.set_size(&mut ctx, 200, 100).unwrap();
        assert_eq!(pass.size(), (100, 50));
    }
}
