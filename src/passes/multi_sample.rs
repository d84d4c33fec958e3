//! Jittered multi-sample anti-aliasing.
//!
//! Each sample shifts the camera by a sub-pixel view offset, draws a frame
//! and folds it into a running average. `On` takes every sample in one call;
//! `Temporal` takes one sample per call while the view rests.

use std::mem;

use super::{compose, ComposeStep, CompositeKind, DrawPass};
use crate::camera::{Camera, CameraView, ViewCamera};
use crate::error::CanvasError;
use crate::gpu::{
    Attachment, BlendMode, BufferId, BufferUsage, GpuContext, RenderTargetDescriptor,
    RenderTargetId, TextureBinding, TextureFormat,
};
use crate::math::Viewport;
use crate::options::{MultiSampleMode, MultiSampleProps};
use crate::renderer::Renderer;
use crate::scene::Scene;

/// Highest supported sample level.
pub const MAX_SAMPLE_LEVEL: u32 = 5;

fn halton(mut index: u32, base: u32) -> f32 {
    let mut f = 1.0;
    let mut r = 0.0;
    while index > 0 {
        f /= base as f32;
        r += f * (index % base) as f32;
        index /= base;
    }
    r
}

/// Sub-pixel offsets for `2^sample_level` samples, in pixels within
/// `[-0.5, 0.5)`. The first sample is unjittered.
#[must_use]
pub fn jitter_offsets(sample_level: u32) -> Vec<[f32; 2]> {
    let count = 1_u32 << sample_level.min(MAX_SAMPLE_LEVEL);
    (0..count)
        .map(|i| {
            if i == 0 {
                [0.0, 0.0]
            } else {
                [halton(i + 1, 2) - 0.5, halton(i + 1, 3) - 0.5]
            }
        })
        .collect()
}

/// Accumulates jittered frames.
#[derive(Debug)]
pub struct MultiSamplePass {
    props: MultiSampleProps,
    offsets: Vec<[f32; 2]>,
    sample_index: usize,
    width: u32,
    height: u32,
    accumulate: Option<RenderTargetId>,
    weight: Option<BufferId>,
    resample_all: bool,
}

impl MultiSamplePass {
    /// Pass for a `width`x`height` drawing buffer. Targets are created on
    /// first use.
    #[must_use]
    pub fn new(width: u32, height: u32, props: MultiSampleProps) -> Self {
        Self {
            offsets: jitter_offsets(props.sample_level),
            props,
            sample_index: 0,
            width,
            height,
            accumulate: None,
            weight: None,
            resample_all: false,
        }
    }

    /// Current settings.
    #[must_use]
    pub fn props(&self) -> &MultiSampleProps {
        &self.props
    }

    /// Number of samples per converged image.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.offsets.len()
    }

    /// Next temporal sample.
    #[must_use]
    pub fn sample_index(&self) -> usize {
        self.sample_index
    }

    /// Whether jittered sampling happens at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.props.mode != MultiSampleMode::Off && self.offsets.len() > 1
    }

    /// Apply `props` and restart accumulation when `changed` (the view or
    /// scene changed since the last frame). Returns whether temporal
    /// samples remain to be drawn.
    pub fn update(&mut self, changed: bool, props: &MultiSampleProps) -> bool {
        if *props != self.props {
            self.offsets = jitter_offsets(props.sample_level);
            self.props = props.clone();
            self.sample_index = 0;
        }
        if changed {
            self.sample_index = 0;
        }
        self.props.mode == MultiSampleMode::Temporal
            && self.is_enabled()
            && self.sample_index < self.offsets.len()
    }

    /// Take every sample on the next temporal render instead of restarting
    /// the one-per-frame schedule, so a marking change does not flash an
    /// unconverged image.
    pub fn resample_all(&mut self) {
        self.resample_all = true;
    }

    /// Resize the accumulation target.
    ///
    /// # Errors
    ///
    /// [`CanvasError::TextureTooLarge`] when the new size exceeds the limit.
    pub fn set_size(&mut self, ctx: &mut dyn GpuContext, width: u32, height: u32) -> Result<(), CanvasError> {
        self.width = width;
        self.height = height;
        self.sample_index = 0;
        if let Some(id) = self.accumulate {
            ctx.resize_render_target(id, width, height)?;
        }
        Ok(())
    }

    /// Forget resources lost with the context.
    pub fn reset(&mut self) {
        self.accumulate = None;
        self.weight = None;
        self.sample_index = 0;
    }

    /// Release the accumulation target and weight buffer.
    pub fn dispose(&mut self, ctx: &mut dyn GpuContext) {
        if let Some(id) = self.accumulate.take() {
            ctx.destroy_render_target(id);
        }
        if let Some(id) = self.weight.take() {
            ctx.destroy_buffer(id);
        }
    }

    fn resources(&mut self, ctx: &mut dyn GpuContext) -> Result<(RenderTargetId, BufferId), CanvasError> {
        let target = match self.accumulate {
            Some(id) => id,
            None => {
                let format = if ctx.capabilities().float_textures {
                    TextureFormat::Rgba16Float
                } else {
                    TextureFormat::Rgba8
                };
                let id = ctx.create_render_target(&RenderTargetDescriptor {
                    label: "multi-sample accumulate",
                    width: self.width,
                    height: self.height,
                    color: vec![format],
                    depth: false,
                })?;
                self.accumulate = Some(id);
                id
            }
        };
        let weight = match self.weight {
            Some(id) => id,
            None => {
                let id = ctx.create_buffer(BufferUsage::Uniform, &[0; 16]);
                self.weight = Some(id);
                id
            }
        };
        Ok((target, weight))
    }

    /// Draw one frame (`Off`, or no accumulate program), every sample
    /// (`On`) or the next sample (`Temporal`), and present it to `output`.
    ///
    /// # Errors
    ///
    /// Target creation failures and backend errors from draws.
    pub fn render(
        &mut self,
        ctx: &mut dyn GpuContext,
        renderer: &mut Renderer,
        scene: &mut Scene,
        camera: &mut Camera,
        draw: &mut DrawPass,
        output: Option<RenderTargetId>,
    ) -> Result<(), CanvasError> {
        if !self.is_enabled() || draw.composite.get(CompositeKind::Accumulate).is_none() {
            draw.render(ctx, renderer, scene, ViewCamera::Mono(camera))?;
            let _ = draw.present(ctx, output)?;
            return Ok(());
        }
        let (target, weight) = self.resources(ctx)?;
        let samples = match self.props.mode {
            MultiSampleMode::Temporal if !mem::take(&mut self.resample_all) => {
                if self.sample_index >= self.offsets.len() {
                    self.sample_index = 0;
                }
                self.sample_index..self.sample_index + 1
            }
            _ => 0..self.offsets.len(),
        };
        let viewport = camera.viewport();
        for i in samples {
            let [ox, oy] = self.offsets[i];
            let (w, h) = (viewport.width as f32, viewport.height as f32);
            camera.set_view_offset(w, h, (ox, oy), w, h);
            let _ = camera.update();
            draw.render(ctx, renderer, scene, ViewCamera::Mono(camera))?;
            self.accumulate(ctx, draw, target, weight, i)?;
            self.sample_index = i + 1;
        }
        camera.clear_view_offset();
        let _ = camera.update();
        let _ = compose(
            ctx,
            &draw.composite,
            &ComposeStep {
                kind: CompositeKind::Copy,
                target: output,
                viewport: Viewport::new(0, 0, self.width, self.height),
                blend: BlendMode::Disabled,
                textures: &[TextureBinding {
                    target,
                    attachment: Attachment::Color(0),
                }],
                uniforms: None,
            },
        )?;
        Ok(())
    }

    /// Fold sample `index` into the running average: weight `1 / (index + 1)`
    /// blended "over" the accumulated image.
    fn accumulate(
        &self,
        ctx: &mut dyn GpuContext,
        draw: &mut DrawPass,
        target: RenderTargetId,
        weight: BufferId,
        index: usize,
    ) -> Result<(), CanvasError> {
        let w = 1.0 / (index + 1) as f32;
        ctx.write_buffer(weight, 0, bytemuck::bytes_of(&[w, 0.0, 0.0, 0.0]))?;
        let color = draw.color_target(ctx)?;
        let _ = compose(
            ctx,
            &draw.composite,
            &ComposeStep {
                kind: CompositeKind::Accumulate,
                target: Some(target),
                viewport: Viewport::new(0, 0, self.width, self.height),
                blend: if index == 0 { BlendMode::Disabled } else { BlendMode::Premultiplied },
                textures: &[TextureBinding {
                    target: color,
                    attachment: Attachment::Color(0),
                }],
                uniforms: Some(weight),
            },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::camera::CameraSnapshot;
    use crate::gpu::{GpuCommand, HeadlessContext, ProgramDescriptor, ProgramId};
    use crate::options::RendererProps;
    use crate::scene::test_support::TestObject;

    const SIZE: u32 = 16;

    struct Fixture {
        ctx: HeadlessContext,
        scene: Scene,
        renderer: Renderer,
        draw: DrawPass,
        camera: Camera,
        accumulate: ProgramId,
    }

    fn fixture() -> Fixture {
        let mut ctx = HeadlessContext::new(SIZE, SIZE);
        let mut scene = Scene::default();
        scene.add(TestObject::rc(1));
        assert!(scene.commit(&mut ctx, None).unwrap());
        let renderer = Renderer::new(&ctx, RendererProps::default());
        let mut draw = DrawPass::new(&mut ctx, SIZE, SIZE).unwrap();
        let accumulate = ctx
            .register_program(&ProgramDescriptor::screen_space("accumulate", ""))
            .unwrap();
        draw.composite.register(CompositeKind::Accumulate, accumulate);
        let snapshot = CameraSnapshot {
            position: Vec3::new(0.0, 0.0, 50.0),
            radius: 10.0,
            ..CameraSnapshot::default()
        };
        let camera = Camera::new(snapshot, Viewport::new(0, 0, SIZE, SIZE));
        Fixture {
            ctx,
            scene,
            renderer,
            draw,
            camera,
            accumulate,
        }
    }

    fn props(mode: MultiSampleMode, sample_level: u32) -> MultiSampleProps {
        MultiSampleProps {
            mode,
            sample_level,
            ..MultiSampleProps::default()
        }
    }

    fn accumulate_blends(ctx: &HeadlessContext, program: ProgramId) -> Vec<BlendMode> {
        ctx.log()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::Draw { program: p, state, .. } if *p == program => Some(state.blend),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn offsets_are_distinct_and_sub_pixel() {
        assert_eq!(jitter_offsets(0), vec![[0.0, 0.0]]);
        let offsets = jitter_offsets(3);
        assert_eq!(offsets.len(), 8);
        for (i, a) in offsets.iter().enumerate() {
            assert!(a.iter().all(|v| (-0.5..0.5).contains(v)));
            assert!(offsets[i + 1..].iter().all(|b| a != b));
        }
        assert_eq!(jitter_offsets(9).len(), 32);
    }

    #[test]
    fn on_mode_takes_every_sample() {
        let mut f = fixture();
        let mut pass = MultiSamplePass::new(SIZE, SIZE, props(MultiSampleMode::On, 2));
        pass.render(&mut f.ctx, &mut f.renderer, &mut f.scene, &mut f.camera, &mut f.draw, None)
            .unwrap();
        assert_eq!(
            accumulate_blends(&f.ctx, f.accumulate),
            vec![
                BlendMode::Disabled,
                BlendMode::Premultiplied,
                BlendMode::Premultiplied,
                BlendMode::Premultiplied
            ]
        );
        assert!(!f.camera.view_offset().enabled);
    }

    #[test]
    fn temporal_mode_converges_one_sample_per_frame() {
        let mut f = fixture();
        let p = props(MultiSampleMode::Temporal, 1);
        let mut pass = MultiSamplePass::new(SIZE, SIZE, p.clone());
        assert!(pass.update(true, &p));
        pass.render(&mut f.ctx, &mut f.renderer, &mut f.scene, &mut f.camera, &mut f.draw, None)
            .unwrap();
        assert_eq!(pass.sample_index(), 1);
        assert!(pass.update(false, &p));
        pass.render(&mut f.ctx, &mut f.renderer, &mut f.scene, &mut f.camera, &mut f.draw, None)
            .unwrap();
        assert!(!pass.update(false, &p));
        assert_eq!(accumulate_blends(&f.ctx, f.accumulate).len(), 2);

        // a view change restarts accumulation
        assert!(pass.update(true, &p));
        assert_eq!(pass.sample_index(), 0);
    }

    #[test]
    fn resample_all_converges_in_one_frame() {
        let mut f = fixture();
        let p = props(MultiSampleMode::Temporal, 2);
        let mut pass = MultiSamplePass::new(SIZE, SIZE, p.clone());
        pass.resample_all();
        assert!(pass.update(true, &p));
        pass.render(&mut f.ctx, &mut f.renderer, &mut f.scene, &mut f.camera, &mut f.draw, None)
            .unwrap();
        assert_eq!(accumulate_blends(&f.ctx, f.accumulate).len(), 4);
        assert!(!pass.update(false, &p));
    }

    #[test]
    fn off_mode_draws_once_without_accumulation() {
        let mut f = fixture();
        let p = props(MultiSampleMode::Off, 2);
        let mut pass = MultiSamplePass::new(SIZE, SIZE, p.clone());
        assert!(!pass.update(true, &p));
        pass.render(&mut f.ctx, &mut f.renderer, &mut f.scene, &mut f.camera, &mut f.draw, None)
            .unwrap();
        assert!(accumulate_blends(&f.ctx, f.accumulate).is_empty());
        assert_eq!(f.ctx.draw_count(), 1);
    }

    #[test]
    fn changed_props_restart_sampling() {
        let p = props(MultiSampleMode::Temporal, 1);
        let mut pass = MultiSamplePass::new(SIZE, SIZE, p.clone());
        assert_eq!(pass.sample_count(), 2);
        assert!(pass.update(false, &props(MultiSampleMode::Temporal, 2)));
        assert_eq!(pass.sample_count(), 4);
    }
}
