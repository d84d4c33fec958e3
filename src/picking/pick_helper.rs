//! Screen pixel to object identity.

use glam::Vec3;

use super::pick_pass::{PickBuffer, PickPass};
use super::{PickData, PickingId};
use crate::camera::ViewCamera;
use crate::error::CanvasError;
use crate::gpu::GpuContext;
use crate::math::{unproject, Viewport};
use crate::renderer::Renderer;
use crate::scene::Scene;
use crate::util::packing::{is_no_hit, unpack_rgb_to_int, unpack_rgba_to_depth};
use crate::util::spiral::spiral2d;

/// CPU copies of the four pick buffers.
#[derive(Debug, Default)]
struct PickBuffers {
    width: u32,
    height: u32,
    data: [Vec<u8>; 4],
}

impl PickBuffers {
    fn pixel(&self, buffer: usize, x: u32, y: u32) -> Option<[u8; 4]> {
        let i = ((y * self.width + x) * 4) as usize;
        let px = self.data[buffer].get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    fn id(&self, buffer: usize, x: u32, y: u32) -> Option<u32> {
        self.pixel(buffer, x, y).map(|[r, g, b, _]| unpack_rgb_to_int(r, g, b))
    }
}

/// Resolves window coordinates to [`PickData`], re-rendering the pick
/// buffers only when marked dirty.
#[derive(Debug)]
pub struct PickHelper {
    pass: PickPass,
    /// Set whenever the scene or camera may have changed since the last
    /// pick render.
    pub dirty: bool,
    pick_padding: u32,
    spiral: Vec<[i32; 2]>,
    buffers: PickBuffers,
}

fn spiral_for(pick_scale: f32, pick_padding: u32) -> Vec<[i32; 2]> {
    spiral2d((pick_padding as f32 * pick_scale).ceil() as u32)
}

/// Rectangle covering every eye.
fn full_viewport(camera: ViewCamera<'_>) -> Viewport {
    let eyes = camera.eyes();
    let mut iter = eyes.iter().map(|e| e.viewport());
    let Some(first) = iter.next() else {
        return Viewport::default();
    };
    iter.fold(first, |acc, v| {
        let x = acc.x.min(v.x);
        let y = acc.y.min(v.y);
        let right = (acc.x + acc.width).max(v.x + v.width);
        let bottom = (acc.y + acc.height).max(v.y + v.height);
        Viewport::new(x, y, right - x, bottom - y)
    })
}

impl PickHelper {
    /// Helper owning `pass`, searching up to `pick_padding` window pixels
    /// around a missed pixel.
    #[must_use]
    pub fn new(pass: PickPass, pick_padding: u32) -> Self {
        Self {
            spiral: spiral_for(pass.pick_scale(), pick_padding),
            pass,
            dirty: true,
            pick_padding,
            buffers: PickBuffers::default(),
        }
    }

    /// The underlying pass.
    #[must_use]
    pub fn pass(&self) -> &PickPass {
        &self.pass
    }

    /// Mutable access to the underlying pass. Marks the buffers dirty.
    pub fn pass_mut(&mut self) -> &mut PickPass {
        self.dirty = true;
        &mut self.pass
    }

    /// Change resolution and search radius.
    ///
    /// # Errors
    ///
    /// [`CanvasError::TextureTooLarge`] when the new pick buffer is too big.
    pub fn set_props(
        &mut self,
        ctx: &mut dyn GpuContext,
        pick_scale: f32,
        pick_padding: u32,
    ) -> Result<(), CanvasError> {
        if pick_scale != self.pass.pick_scale() {
            self.pass.set_pick_scale(ctx, pick_scale)?;
            self.dirty = true;
        }
        self.pick_padding = pick_padding;
        self.spiral = spiral_for(pick_scale, pick_padding);
        Ok(())
    }

    fn render(
        &mut self,
        ctx: &mut dyn GpuContext,
        renderer: &mut Renderer,
        scene: &mut Scene,
        camera: ViewCamera<'_>,
    ) -> Result<(), CanvasError> {
        self.pass.render(ctx, renderer, scene, camera)?;
        let (width, height) = self.pass.size();
        let rect = Viewport::new(0, 0, width, height);
        let len = (width * height * 4) as usize;
        self.buffers.width = width;
        self.buffers.height = height;
        for buffer in PickBuffer::ALL {
            let data = &mut self.buffers.data[buffer.index()];
            data.resize(len, 0);
            self.pass.read(ctx, buffer, rect, data)?;
        }
        self.dirty = false;
        Ok(())
    }

    /// Identify what is drawn at window position `(x, y)` (CSS pixels,
    /// top-left origin).
    ///
    /// Returns `Ok(None)` outside the viewport, while the context is lost,
    /// or when neither the pixel nor any offset of the search spiral hits.
    ///
    /// # Errors
    ///
    /// Backend errors while rendering or reading back the pick buffers.
    pub fn identify(
        &mut self,
        ctx: &mut dyn GpuContext,
        renderer: &mut Renderer,
        scene: &mut Scene,
        camera: ViewCamera<'_>,
        x: f32,
        y: f32,
    ) -> Result<Option<PickData>, CanvasError> {
        if ctx.is_context_lost() {
            return Ok(None);
        }
        let ratio = ctx.pixel_ratio();
        let (x, y) = (x * ratio, y * ratio);
        if !full_viewport(camera).contains(x, y) {
            return Ok(None);
        }
        if self.dirty {
            self.render(ctx, renderer, scene, camera)?;
        }

        let scale = self.pass.pick_scale();
        let px = (x * scale).floor() as i32;
        let py = (y * scale).floor() as i32;
        for [dx, dy] in &self.spiral {
            let (sx, sy) = (px + dx, py + dy);
            if sx < 0
                || sy < 0
                || sx as u32 >= self.buffers.width
                || sy as u32 >= self.buffers.height
            {
                continue;
            }
            let (wx, wy) = (x + *dx as f32 / scale, y + *dy as f32 / scale);
            if let Some(data) = self.decode(camera, sx as u32, sy as u32, wx, wy) {
                return Ok(Some(data));
            }
        }
        log::debug!("pick miss at ({x}, {y}) after {} offsets", self.spiral.len());
        Ok(None)
    }

    fn decode(
        &self,
        camera: ViewCamera<'_>,
        px: u32,
        py: u32,
        x: f32,
        y: f32,
    ) -> Option<PickData> {
        let object_id = self.buffers.id(PickBuffer::Object.index(), px, py)?;
        if is_no_hit(object_id) {
            return None;
        }
        let instance_id = self.buffers.id(PickBuffer::Instance.index(), px, py)?;
        let group_id = self.buffers.id(PickBuffer::Group.index(), px, py)?;
        let [r, g, b, a] = self.buffers.pixel(PickBuffer::Depth.index(), px, py)?;
        let z = unpack_rgba_to_depth(r, g, b, a);
        let eye = camera.eye_at(x);
        let position =
            unproject(Vec3::new(x, y, z), &eye.inverse_projection_view(), &eye.viewport());
        Some(PickData {
            id: PickingId {
                object_id,
                instance_id,
                group_id,
            },
            position,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use glam::Vec3;

    use super::*;
    use crate::camera::{Camera, CameraSnapshot, StereoCamera, StereoProps};
    use crate::gpu::{GpuCapabilities, HeadlessContext};
    use crate::options::RendererProps;
    use crate::scene::test_support::{PickFootprint, TestObject};
    use crate::scene::GraphicsRenderObject;

    const SIZE: u32 = 64;

    fn camera() -> Camera {
        let snapshot = CameraSnapshot {
            position: Vec3::new(0.0, 0.0, 50.0),
            radius: 10.0,
            ..CameraSnapshot::default()
        };
        Camera::new(snapshot, Viewport::new(0, 0, SIZE, SIZE))
    }

    fn picked(rect: Viewport, id: u32, instance: u32, group: u32) -> Rc<dyn GraphicsRenderObject> {
        let mut o = TestObject::new(id);
        o.footprint = Some(PickFootprint {
            rect,
            instance,
            group,
            depth: 0.5,
        });
        o.into_rc()
    }

    fn setup(caps: GpuCapabilities, objects: Vec<Rc<dyn GraphicsRenderObject>>) -> (HeadlessContext, Scene, Renderer, PickHelper) {
        let mut ctx = HeadlessContext::with_capabilities(SIZE, SIZE, caps);
        let mut scene = Scene::default();
        for o in objects {
            scene.add(o);
        }
        assert!(scene.commit(&mut ctx, None).unwrap());
        let renderer = Renderer::new(&ctx, RendererProps::default());
        let pass = PickPass::new(&mut ctx, (SIZE, SIZE), 0.25).unwrap();
        (ctx, scene, renderer, PickHelper::new(pass, 4))
    }

    fn identify_with(caps: GpuCapabilities) {
        // pick buffer is 16x16; object 7 covers pick pixels 4..8
        let (mut ctx, mut scene, mut renderer, mut helper) =
            setup(caps, vec![picked(Viewport::new(4, 4, 4, 4), 7, 2, 11)]);
        let cam = camera();
        let hit = helper
            .identify(&mut ctx, &mut renderer, &mut scene, ViewCamera::Mono(&cam), 20.0, 20.0)
            .unwrap()
            .unwrap();
        assert_eq!(
            hit.id,
            PickingId {
                object_id: 7,
                instance_id: 2,
                group_id: 11
            }
        );
        assert!(hit.position.is_finite());
        assert!(!helper.dirty);
    }

    #[test]
    fn identifies_with_multi_render_targets() {
        identify_with(GpuCapabilities::default());
    }

    #[test]
    fn identifies_with_four_targets() {
        identify_with(GpuCapabilities {
            multi_render_targets: false,
            ..GpuCapabilities::default()
        });
    }

    #[test]
    fn spiral_finds_nearby_geometry() {
        let (mut ctx, mut scene, mut renderer, mut helper) =
            setup(GpuCapabilities::default(), vec![picked(Viewport::new(4, 4, 1, 1), 3, 0, 0)]);
        let cam = camera();
        // pick pixel (5, 5) misses, (4, 4) is one step away
        let hit = helper
            .identify(&mut ctx, &mut renderer, &mut scene, ViewCamera::Mono(&cam), 21.0, 21.0)
            .unwrap();
        assert_eq!(hit.map(|h| h.id.object_id), Some(3));
    }

    #[test]
    fn empty_region_and_outside_viewport_miss() {
        let (mut ctx, mut scene, mut renderer, mut helper) =
            setup(GpuCapabilities::default(), vec![picked(Viewport::new(0, 0, 2, 2), 3, 0, 0)]);
        let cam = camera();
        let view = ViewCamera::Mono(&cam);
        assert!(helper.identify(&mut ctx, &mut renderer, &mut scene, view, 60.0, 60.0).unwrap().is_none());
        assert!(helper.identify(&mut ctx, &mut renderer, &mut scene, view, -1.0, 5.0).unwrap().is_none());
        assert!(helper.identify(&mut ctx, &mut renderer, &mut scene, view, 70.0, 5.0).unwrap().is_none());
    }

    #[test]
    fn pick_buffers_render_only_when_dirty() {
        let (mut ctx, mut scene, mut renderer, mut helper) =
            setup(GpuCapabilities::default(), vec![picked(Viewport::new(0, 0, 16, 16), 1, 0, 0)]);
        let cam = camera();
        let view = ViewCamera::Mono(&cam);
        assert!(helper.identify(&mut ctx, &mut renderer, &mut scene, view, 5.0, 5.0).unwrap().is_some());
        let _ = ctx.take_log();
        assert!(helper.identify(&mut ctx, &mut renderer, &mut scene, view, 9.0, 9.0).unwrap().is_some());
        assert_eq!(ctx.draw_count(), 0);
        helper.dirty = true;
        assert!(helper.identify(&mut ctx, &mut renderer, &mut scene, view, 9.0, 9.0).unwrap().is_some());
        assert_eq!(ctx.draw_count(), 1);
    }

    #[test]
    fn lost_context_misses() {
        let (mut ctx, mut scene, mut renderer, mut helper) =
            setup(GpuCapabilities::default(), vec![picked(Viewport::new(0, 0, 16, 16), 1, 0, 0)]);
        ctx.lose_context();
        let cam = camera();
        assert!(helper
            .identify(&mut ctx, &mut renderer, &mut scene, ViewCamera::Mono(&cam), 5.0, 5.0)
            .unwrap()
            .is_none());
    }

    #[test]
    fn stereo_draws_each_eye_into_its_half() {
        let (mut ctx, mut scene, mut renderer, mut helper) =
            setup(GpuCapabilities::default(), vec![picked(Viewport::new(12, 0, 2, 2), 9, 0, 0)]);
        let cam = camera();
        let mut stereo = StereoCamera::new(StereoProps::default());
        stereo.update(&cam);
        let view = ViewCamera::Stereo(&stereo);
        let hit = helper
            .identify(&mut ctx, &mut renderer, &mut scene, view, 50.0, 2.0)
            .unwrap()
            .unwrap();
        assert_eq!(hit.id.object_id, 9);
        let viewports: Vec<Viewport> = ctx
            .log()
            .iter()
            .filter_map(|c| match c {
                crate::gpu::GpuCommand::Draw { viewport, .. } => Some(*viewport),
                _ => None,
            })
            .collect();
        assert_eq!(viewports, vec![Viewport::new(0, 0, 8, 16), Viewport::new(8, 0, 8, 16)]);
    }
}
