//! Frame controller tying scene, renderer, passes and picking to a host
//! animation loop.
//!
//! A host calls [`Canvas3D::tick`] from its animation-frame callback. Each
//! tick commits pending scene changes (bounded in time unless synchronous),
//! advances camera transitions, and draws only when something visible
//! changed. The camera is reframed only after a commit fully drains.

/// Broadcast notification streams.
pub mod events;
/// Representation trait and registry.
pub mod representation;

use std::mem;

pub use events::{CanvasEvents, EventStream};
pub use representation::{Loci, MarkerAction, ReprId, ReprLoci, ReprRegistry, Representation};

use crate::camera::{Camera, CameraSnapshot, StereoCamera, ViewCamera};
use crate::error::CanvasError;
use crate::gpu::{FenceId, GpuContext, RenderTargetId};
use crate::math::{Sphere3D, Viewport};
use crate::options::Canvas3DProps;
use crate::passes::{DrawPass, MultiSamplePass};
use crate::picking::{PickData, PickHelper, PickPass, PickingId};
use crate::renderer::Renderer;
use crate::scene::Scene;
use crate::util::frame_timing::FrameTiming;

/// Forced redraws issued after a context restore.
const RESTORE_REDRAWS: u32 = 2;

/// Per-tick options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOptions {
    /// Commit without a time budget.
    pub synchronous: bool,
    /// Skip the draw; the host calls [`Canvas3D::draw`] itself.
    pub manual_draw: bool,
}

/// Camera snapshot for a fresh canvas, from the configured props.
fn initial_snapshot(props: &Canvas3DProps) -> CameraSnapshot {
    let c = &props.camera;
    CameraSnapshot {
        mode: c.mode,
        fov: c.fov_degrees.to_radians(),
        fog: c.fog,
        clip_far: c.clip_far,
        min_near: c.min_near,
        ..CameraSnapshot::default()
    }
}

fn view_camera<'a>(camera: &'a Camera, stereo: &'a StereoCamera, enabled: bool) -> ViewCamera<'a> {
    if enabled {
        ViewCamera::Stereo(stereo)
    } else {
        ViewCamera::Mono(camera)
    }
}

/// Whether the camera looking at `view` should be reframed after a commit.
///
/// `previous` is the visible bounds of the last full commit and `visible`
/// holds the world bounds of every visible renderable now. Resets when
/// nothing was visible before, when the view overlaps no visible
/// renderable, or when a renderable lies outside both the previous bounds
/// and the view.
#[must_use]
pub fn should_reset_camera(view: &Sphere3D, previous: &Sphere3D, visible: &[Sphere3D]) -> bool {
    if visible.is_empty() {
        return false;
    }
    if previous.is_empty() || !visible.iter().any(|s| view.overlaps(s)) {
        return true;
    }
    visible
        .iter()
        .any(|s| !previous.includes(s) && !view.includes(s))
}

/// Interactive 3D canvas over a [`GpuContext`].
pub struct Canvas3D<C: GpuContext> {
    ctx: C,
    props: Canvas3DProps,
    scene: Scene,
    renderer: Renderer,
    camera: Camera,
    stereo: StereoCamera,
    draw_pass: DrawPass,
    multi_sample: MultiSamplePass,
    pick_helper: PickHelper,
    reprs: ReprRegistry,
    events: CanvasEvents,
    timing: FrameTiming,
    output: Option<RenderTargetId>,
    committed_visible: Sphere3D,

    current_time: f64,
    paused: bool,
    animating: bool,
    force_next_draw: bool,
    marking_updated: bool,
    camera_reset_requested: Option<f64>,
    fence: Option<FenceId>,
    context_lost: bool,
    restore_redraws: u32,
    resize_requested: bool,
}

impl<C: GpuContext> std::fmt::Debug for Canvas3D<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canvas3D")
            .field("size", &self.draw_pass.size())
            .field("renderables", &self.scene.count())
            .field("reprs", &self.reprs)
            .field("paused", &self.paused)
            .field("context_lost", &self.context_lost)
            .finish_non_exhaustive()
    }
}

impl<C: GpuContext> Canvas3D<C> {
    /// Canvas drawing into the default drawing buffer of `ctx`.
    ///
    /// # Errors
    ///
    /// [`CanvasError::MissingCapability`] for a context that is lost at
    /// creation, and target creation failures.
    pub fn new(mut ctx: C, props: Canvas3DProps) -> Result<Self, CanvasError> {
        if ctx.is_context_lost() {
            return Err(CanvasError::MissingCapability("live GPU context"));
        }
        let (width, height) = ctx.drawing_buffer_size();
        let viewport = Viewport::new(0, 0, width, height);

        let mut renderer = Renderer::new(&ctx, props.renderer.clone());
        renderer.set_pixel_ratio(ctx.pixel_ratio());
        renderer.set_drawing_buffer_size(width, height);
        renderer.set_transparent_background(props.renderer.transparent_background);

        let mut draw_pass = DrawPass::new(&mut ctx, width, height)?;
        draw_pass.set_props(props.transparency, props.dpoit_iterations, props.marking.enabled);
        let multi_sample = MultiSamplePass::new(width, height, props.multi_sample.clone());
        let pick_pass = PickPass::new(&mut ctx, (width, height), props.picking.pick_scale)?;
        let pick_helper = PickHelper::new(pick_pass, props.picking.pick_padding);

        let camera = Camera::new(initial_snapshot(&props), viewport);
        let mut stereo = StereoCamera::new(props.camera.stereo);
        stereo.update(&camera);

        log::info!("canvas {width}x{height} created");
        Ok(Self {
            scene: Scene::new(props.opacity_weights),
            ctx,
            renderer,
            camera,
            stereo,
            draw_pass,
            multi_sample,
            pick_helper,
            reprs: ReprRegistry::default(),
            events: CanvasEvents::default(),
            timing: FrameTiming::default(),
            output: None,
            committed_visible: Sphere3D::EMPTY,
            current_time: 0.0,
            paused: false,
            animating: false,
            force_next_draw: true,
            marking_updated: false,
            camera_reset_requested: None,
            fence: None,
            context_lost: false,
            restore_redraws: 0,
            resize_requested: false,
            props,
        })
    }

    /// The GPU context.
    #[must_use]
    pub fn ctx(&self) -> &C {
        &self.ctx
    }

    /// Mutable GPU context, e.g. to register composite programs.
    pub fn ctx_mut(&mut self) -> &mut C {
        &mut self.ctx
    }

    /// Current props.
    #[must_use]
    pub fn props(&self) -> &Canvas3DProps {
        &self.props
    }

    /// The scene.
    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// The camera.
    #[must_use]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Mutable scene, e.g. to change renderable state before
    /// [`update`](Self::update).
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// Mutable camera. Changes show on the next draw.
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// The renderer.
    #[must_use]
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Mutable renderer, e.g. to install an occlusion test.
    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    /// The draw pass, whose composite programs the host registers.
    pub fn draw_pass_mut(&mut self) -> &mut DrawPass {
        &mut self.draw_pass
    }

    /// Event streams to subscribe to.
    pub fn events_mut(&mut self) -> &mut CanvasEvents {
        &mut self.events
    }

    /// Smoothed frames per second over rendered frames.
    #[must_use]
    pub fn fps(&self) -> f32 {
        self.timing.fps()
    }

    /// Draw into `target` instead of the drawing buffer.
    pub fn set_output(&mut self, target: Option<RenderTargetId>) {
        self.output = target;
        self.force_next_draw = true;
    }

    /// Register or replace a representation; only the render objects that
    /// differ from its previous registration are queued.
    pub fn add(&mut self, repr: Box<dyn Representation>) {
        let diff = self.reprs.insert(repr);
        for object in diff.removed {
            self.scene.remove(object);
        }
        for object in diff.added {
            self.scene.add(object);
        }
        self.events.repr_count.emit(self.reprs.len());
    }

    /// Queue removal of every render object of `repr`.
    pub fn remove(&mut self, repr: ReprId) {
        if !self.reprs.contains(repr) {
            return;
        }
        for object in self.reprs.remove(repr) {
            self.scene.remove(object);
        }
        self.events.repr_count.emit(self.reprs.len());
    }

    /// Queue removal of every representation.
    pub fn clear(&mut self) {
        for object in self.reprs.clear() {
            self.scene.remove(object);
        }
        self.events.repr_count.emit(0);
    }

    /// Whether `repr` is registered.
    #[must_use]
    pub fn has(&self, repr: ReprId) -> bool {
        self.reprs.contains(repr)
    }

    /// Stop drawing on ticks; commits continue.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume drawing and redraw on the next tick.
    pub fn resume(&mut self) {
        self.paused = false;
        self.force_next_draw = true;
    }

    /// Whether drawing is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Let [`frame`](Self::frame) drive ticks.
    pub fn animate(&mut self) {
        self.animating = true;
        self.resume();
    }

    /// Stop [`frame`](Self::frame) from ticking.
    pub fn stop(&mut self) {
        self.animating = false;
    }

    /// Host animation-frame callback: ticks while animating. Returns
    /// whether a frame rendered.
    ///
    /// # Errors
    ///
    /// See [`tick`](Self::tick).
    pub fn frame(&mut self, t: f64) -> Result<bool, CanvasError> {
        if !self.animating {
            return Ok(false);
        }
        self.tick(t, TickOptions::default())
    }

    /// Force a redraw on the next draw.
    pub fn request_draw(&mut self) {
        self.force_next_draw = true;
    }

    /// Reframe the camera on the visible scene, with `duration_ms` or the
    /// configured reset duration. Applied after the next full commit, or
    /// on the next tick when nothing is pending.
    pub fn request_camera_reset(&mut self, duration_ms: Option<f64>) {
        self.camera_reset_requested =
            Some(duration_ms.unwrap_or(self.props.camera_reset_duration_ms));
    }

    /// One host frame at time `t` (ms): commit, advance the camera, draw.
    /// Returns whether a frame rendered.
    ///
    /// # Errors
    ///
    /// Renderable creation failures during commit, resource recreation
    /// failures after a context restore, and backend draw errors.
    pub fn tick(&mut self, t: f64, options: TickOptions) -> Result<bool, CanvasError> {
        self.current_time = t;
        let _ = self.commit(options.synchronous)?;
        if !self.context_lost {
            let _ = self.sync_visibility();
        }
        self.camera.transition_tick(t);
        if !self.scene.needs_commit() {
            self.resolve_camera_reset();
        }
        if options.manual_draw {
            return Ok(false);
        }
        self.draw(false)
    }

    /// Re-sync the renderables of `repr` (all when `None`) after their
    /// values or state changed, and schedule a redraw.
    ///
    /// # Errors
    ///
    /// Backend errors from renderable uploads.
    pub fn update(
        &mut self,
        repr: Option<ReprId>,
        keep_bounding_sphere: bool,
    ) -> Result<(), CanvasError> {
        let ids = repr.map(|id| self.reprs.object_ids(Some(id)));
        self.scene
            .update(&mut self.ctx, ids.as_deref(), keep_bounding_sphere)?;
        self.pick_helper.dirty = true;
        self.force_next_draw = true;
        Ok(())
    }

    /// Show or hide every renderable of `repr`. Takes effect on the next
    /// tick.
    pub fn set_visibility(&mut self, repr: ReprId, visible: bool) {
        for id in self.reprs.object_ids(Some(repr)) {
            if let Some(r) = self.scene.renderable_mut(id) {
                r.state_mut().visible = visible;
            }
        }
    }

    /// Pick up visibility changes made directly on renderables. Returns
    /// whether the visible set changed.
    fn sync_visibility(&mut self) -> bool {
        if !self.scene.sync_visibility() {
            return false;
        }
        log::debug!("visible set changed");
        self.pick_helper.dirty = true;
        self.force_next_draw = true;
        true
    }

    /// Apply pending scene changes. Returns whether the queue fully drained
    /// in this call.
    ///
    /// # Errors
    ///
    /// See [`tick`](Self::tick).
    pub fn commit(&mut self, synchronous: bool) -> Result<bool, CanvasError> {
        self.poll_context()?;
        if self.context_lost || !self.scene.needs_commit() {
            return Ok(false);
        }
        let budget = (!synchronous).then_some(self.props.commit_timeout_ms);
        if !self.scene.commit(&mut self.ctx, budget)? {
            log::debug!("partial commit, {} pending", self.scene.commit_queue_size());
            return Ok(false);
        }
        self.events.commited.emit(self.current_time);
        self.on_full_commit();
        Ok(true)
    }

    fn on_full_commit(&mut self) {
        let _ = self.sync_visibility();
        let factor = self.props.scene_radius_factor;
        self.camera
            .set_radius_max(self.scene.bounding_sphere().radius * factor);
        let new_visible = self.scene.bounding_sphere_visible();
        let spheres = self.scene.visible_spheres();
        if !self.props.camera.manual_reset
            && should_reset_camera(&self.camera.view_sphere(), &self.committed_visible, &spheres)
        {
            log::debug!("camera reset after commit: {new_visible:?}");
            self.request_camera_reset(None);
        }
        self.committed_visible = new_visible;
        self.resolve_camera_reset();
        self.pick_helper.dirty = true;
        self.force_next_draw = true;
    }

    /// Apply a requested reset unless a transition is running.
    fn resolve_camera_reset(&mut self) {
        let Some(duration) = self.camera_reset_requested else {
            return;
        };
        if self.camera.in_transition() {
            return;
        }
        self.camera_reset_requested = None;
        let sphere = self.scene.bounding_sphere_visible();
        if sphere.is_empty() {
            return;
        }
        let radius = sphere.radius * self.props.scene_radius_factor;
        let focus = self.camera.get_focus(sphere.center, radius);
        self.camera.set_state(focus, duration);
        self.force_next_draw = true;
    }

    /// Render if anything changed (or `force`), unless paused. Fires
    /// `did_draw` when a frame rendered.
    ///
    /// # Errors
    ///
    /// Backend draw errors and target resize failures.
    pub fn draw(&mut self, force: bool) -> Result<bool, CanvasError> {
        if self.paused && !force {
            return Ok(false);
        }
        let drew = self.render(force)?;
        if drew {
            let _ = self.timing.end_frame(self.current_time);
            self.events.did_draw.emit(self.current_time);
        }
        Ok(drew)
    }

    fn render(&mut self, force: bool) -> Result<bool, CanvasError> {
        if self.ctx.is_context_lost() {
            return Ok(false);
        }
        if let Some(fence) = self.fence {
            if !self.ctx.is_fence_signaled(fence) {
                return Ok(false);
            }
            self.ctx.delete_fence(fence);
            self.fence = None;
        }

        let resized = self.sync_size()?;
        let camera_changed = self.camera.update();
        let stereo = self.props.camera.stereo_enabled;
        if stereo {
            self.stereo.update(&self.camera);
        }
        let marking = mem::take(&mut self.marking_updated);
        let forced = force || mem::take(&mut self.force_next_draw) || self.restore_redraws > 0;
        let changed = forced || camera_changed || resized || marking;
        if marking && !(forced || camera_changed || resized) && self.props.multi_sample.reduce_flicker {
            self.multi_sample.resample_all();
        }
        let multi_sample_changed =
            !stereo && self.multi_sample.update(changed, &self.props.multi_sample);
        if !changed && !multi_sample_changed {
            return Ok(false);
        }
        if changed {
            self.pick_helper.dirty = true;
        }

        self.renderer.reset_stats();
        if stereo {
            let camera = ViewCamera::Stereo(&self.stereo);
            self.draw_pass.render(&mut self.ctx, &mut self.renderer, &mut self.scene, camera)?;
            let _ = self.draw_pass.present(&mut self.ctx, self.output)?;
        } else {
            self.multi_sample.render(
                &mut self.ctx,
                &mut self.renderer,
                &mut self.scene,
                &mut self.camera,
                &mut self.draw_pass,
                self.output,
            )?;
        }
        self.ctx.flush();
        self.fence = self.ctx.create_fence();
        self.restore_redraws = self.restore_redraws.saturating_sub(1);
        Ok(true)
    }

    /// Follow the context's drawing buffer size. Returns whether it changed.
    fn sync_size(&mut self) -> Result<bool, CanvasError> {
        let (width, height) = self.ctx.drawing_buffer_size();
        if !mem::take(&mut self.resize_requested) && (width, height) == self.draw_pass.size() {
            return Ok(false);
        }
        log::debug!("resize to {width}x{height}");
        self.draw_pass.set_size(&mut self.ctx, width, height)?;
        self.multi_sample.set_size(&mut self.ctx, width, height)?;
        self.pick_helper.pass_mut().set_size(&mut self.ctx, width, height)?;
        self.renderer.set_drawing_buffer_size(width, height);
        self.renderer.set_pixel_ratio(self.ctx.pixel_ratio());
        self.camera.set_viewport(Viewport::new(0, 0, width, height));
        self.events.resized.emit((width, height));
        Ok(true)
    }

    /// Resize the drawing buffer. Picked up by the next draw.
    ///
    /// # Errors
    ///
    /// [`CanvasError::TextureTooLarge`] when the size exceeds the limit.
    pub fn set_size(&mut self, width: u32, height: u32) -> Result<(), CanvasError> {
        self.ctx.set_drawing_buffer_size(width.max(1), height.max(1))
    }

    /// Re-read drawing buffer size and pixel ratio on the next draw, e.g.
    /// after the host changed the pixel ratio without resizing.
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    /// Apply new props, touching only the parts that changed.
    ///
    /// # Errors
    ///
    /// [`CanvasError::TextureTooLarge`] when a new pick scale needs a pick
    /// buffer beyond the limit.
    pub fn set_props(&mut self, props: Canvas3DProps) -> Result<(), CanvasError> {
        if props.picking != self.props.picking {
            self.pick_helper
                .set_props(&mut self.ctx, props.picking.pick_scale, props.picking.pick_padding)?;
        }
        if props.camera != self.props.camera {
            let c = &props.camera;
            let state = &mut self.camera.state;
            state.mode = c.mode;
            state.fov = c.fov_degrees.to_radians();
            state.fog = c.fog;
            state.clip_far = c.clip_far;
            state.min_near = c.min_near;
            self.stereo.props = c.stereo;
        }
        self.renderer.set_props(&props.renderer);
        self.renderer
            .set_transparent_background(props.renderer.transparent_background);
        self.draw_pass
            .set_props(props.transparency, props.dpoit_iterations, props.marking.enabled);
        if props.opacity_weights != self.props.opacity_weights {
            self.scene.set_opacity_weights(props.opacity_weights);
        }
        self.props = props;
        self.pick_helper.dirty = true;
        self.force_next_draw = true;
        Ok(())
    }

    /// Identify what is drawn at window position `(x, y)`.
    ///
    /// # Errors
    ///
    /// Backend errors while rendering or reading the pick buffers.
    pub fn identify(&mut self, x: f32, y: f32) -> Result<Option<PickData>, CanvasError> {
        if self.ctx.is_context_lost() {
            return Ok(None);
        }
        let camera = view_camera(&self.camera, &self.stereo, self.props.camera.stereo_enabled);
        self.pick_helper
            .identify(&mut self.ctx, &mut self.renderer, &mut self.scene, camera, x, y)
    }

    /// Representation and loci behind a pick result.
    #[must_use]
    pub fn get_loci(&self, id: &PickingId) -> Option<ReprLoci> {
        self.reprs.get_loci(id)
    }

    /// Apply a marking action. Returns whether any marker changed; if so
    /// the affected renderables are re-synced and a redraw is scheduled.
    ///
    /// # Errors
    ///
    /// Backend errors from renderable uploads.
    pub fn mark(&mut self, target: &ReprLoci, action: MarkerAction) -> Result<bool, CanvasError> {
        let changed = self.reprs.mark(target, action);
        if changed.is_empty() {
            return Ok(false);
        }
        let objects: Vec<_> = changed
            .iter()
            .flat_map(|&id| self.reprs.object_ids(Some(id)))
            .collect();
        self.scene.update(&mut self.ctx, Some(objects.as_slice()), true)?;
        self.marking_updated = true;
        Ok(true)
    }

    /// Track context loss and rebuild everything on restore.
    fn poll_context(&mut self) -> Result<(), CanvasError> {
        let lost = self.ctx.is_context_lost();
        if lost && !self.context_lost {
            log::info!("GPU context lost, drawing suspended");
            self.context_lost = true;
            self.fence = None;
        } else if !lost && self.context_lost {
            self.restore()?;
        }
        Ok(())
    }

    fn restore(&mut self) -> Result<(), CanvasError> {
        log::info!("GPU context restored, recreating resources");
        self.context_lost = false;
        self.scene.clear(&mut self.ctx);
        self.committed_visible = Sphere3D::EMPTY;
        for object in self.reprs.objects() {
            self.scene.add(object.clone());
        }
        self.renderer = Renderer::new(&self.ctx, self.props.renderer.clone());
        let (width, height) = self.ctx.drawing_buffer_size();
        self.renderer.set_pixel_ratio(self.ctx.pixel_ratio());
        self.renderer.set_drawing_buffer_size(width, height);
        self.renderer
            .set_transparent_background(self.props.renderer.transparent_background);
        self.draw_pass.reset(&mut self.ctx)?;
        self.multi_sample.reset();
        self.pick_helper.pass_mut().reset(&mut self.ctx)?;
        self.restore_redraws = RESTORE_REDRAWS;
        self.events.context_restored.emit(());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use glam::Vec3;

    use super::representation::test_repr::TestRepr;
    use super::*;
    use crate::camera::CameraView;
    use crate::gpu::HeadlessContext;
    use crate::math::Viewport;
    use crate::options::MultiSampleMode;
    use crate::scene::test_support::{PickFootprint, TestObject};
    use crate::scene::GraphicsRenderObject;

    const SIZE: u32 = 64;

    fn props() -> Canvas3DProps {
        let mut props = Canvas3DProps::default();
        props.camera_reset_duration_ms = 0.0;
        props.multi_sample.mode = MultiSampleMode::Off;
        props
    }

    fn canvas(props: Canvas3DProps) -> Canvas3D<HeadlessContext> {
        Canvas3D::new(HeadlessContext::new(SIZE, SIZE), props).unwrap()
    }

    fn sync() -> TickOptions {
        TickOptions {
            synchronous: true,
            manual_draw: false,
        }
    }

    fn object_at(id: u32, center: Vec3) -> Rc<dyn GraphicsRenderObject> {
        TestObject::new(id).at(center, 2.0).into_rc()
    }

    #[test]
    fn draws_only_when_something_changed() {
        let mut c = canvas(props());
        let drawn = c.events_mut().did_draw.subscribe();
        assert!(c.tick(0.0, sync()).unwrap());
        assert!(!c.tick(16.0, sync()).unwrap());
        c.request_draw();
        assert!(c.tick(32.0, sync()).unwrap());
        assert_eq!(drawn.try_iter().collect::<Vec<_>>(), vec![0.0, 32.0]);
    }

    #[test]
    fn full_commit_frames_new_content() {
        let mut c = canvas(props());
        let commits = c.events_mut().commited.subscribe();
        c.add(Box::new(TestRepr::with_objects(1, vec![object_at(1, Vec3::new(100.0, 0.0, 0.0))])));
        assert!(c.tick(0.0, sync()).unwrap());
        assert_eq!(commits.try_recv(), Ok(0.0));
        assert_eq!(c.camera().state.target, Vec3::new(100.0, 0.0, 0.0));
        assert!(c.camera().state.radius_max >= 2.0);
    }

    #[test]
    fn manual_reset_keeps_the_camera() {
        let mut p = props();
        p.camera.manual_reset = true;
        let mut c = canvas(p);
        let before = c.camera().state.target;
        c.add(Box::new(TestRepr::with_objects(1, vec![object_at(1, Vec3::new(100.0, 0.0, 0.0))])));
        let _ = c.tick(0.0, sync()).unwrap();
        assert_eq!(c.camera().state.target, before);
    }

    #[test]
    fn partial_commit_defers_camera_reset() {
        let mut p = props();
        p.commit_timeout_ms = -1.0;
        let mut c = canvas(p);
        let objects: Vec<_> = (0..150).map(|i| object_at(i, Vec3::new(100.0, 0.0, 0.0))).collect();
        c.add(Box::new(TestRepr::with_objects(1, objects)));
        let _ = c.tick(0.0, TickOptions::default()).unwrap();
        assert!(c.scene().needs_commit());
        assert_eq!(c.camera().state.target, Vec3::ZERO);
        let _ = c.tick(16.0, TickOptions::default()).unwrap();
        assert!(!c.scene().needs_commit());
        assert_eq!(c.scene().count(), 150);
        assert_eq!(c.camera().state.target, Vec3::new(100.0, 0.0, 0.0));
    }

    #[test]
    fn reset_waits_for_running_transition() {
        let mut c = canvas(props());
        let mut goal = c.camera().state;
        goal.position = Vec3::new(0.0, 0.0, 200.0);
        c.camera_mut().set_state(goal, 100.0);
        c.camera_mut().transition_tick(0.0);
        c.add(Box::new(TestRepr::with_objects(1, vec![object_at(1, Vec3::new(50.0, 0.0, 0.0))])));
        let _ = c.tick(10.0, sync()).unwrap();
        assert!(c.camera().in_transition());
        assert_eq!(c.camera().state.target, Vec3::ZERO);
        let _ = c.tick(200.0, sync()).unwrap();
        assert_eq!(c.camera().state.target, Vec3::new(50.0, 0.0, 0.0));
    }

    #[test]
    fn repr_diffing_queues_only_changes() {
        let mut c = canvas(props());
        let counts = c.events_mut().repr_count.subscribe();
        c.add(Box::new(TestRepr::new(1, &[1, 2])));
        let _ = c.tick(0.0, sync()).unwrap();
        c.add(Box::new(TestRepr::new(1, &[2, 3])));
        assert_eq!(c.scene().commit_queue_size(), 2);
        let _ = c.tick(16.0, sync()).unwrap();
        assert!(c.scene().has(2) && c.scene().has(3) && !c.scene().has(1));
        c.remove(1);
        let _ = c.tick(32.0, sync()).unwrap();
        assert_eq!(c.scene().count(), 0);
        assert_eq!(counts.try_iter().collect::<Vec<_>>(), vec![1, 1, 0]);
    }

    #[test]
    fn paused_canvas_commits_but_does_not_draw() {
        let mut c = canvas(props());
        c.pause();
        c.add(Box::new(TestRepr::new(1, &[1])));
        assert!(!c.tick(0.0, sync()).unwrap());
        assert_eq!(c.scene().count(), 1);
        c.resume();
        assert!(c.tick(16.0, sync()).unwrap());
    }

    #[test]
    fn fence_gates_the_next_frame() {
        let mut c = canvas(props());
        c.ctx_mut().set_fence_latency(1);
        assert!(c.tick(0.0, sync()).unwrap());
        c.request_draw();
        assert!(!c.tick(16.0, sync()).unwrap());
        assert!(c.tick(32.0, sync()).unwrap());
    }

    #[test]
    fn context_loss_suspends_and_restore_redraws_twice() {
        let mut c = canvas(props());
        let restored = c.events_mut().context_restored.subscribe();
        c.add(Box::new(TestRepr::new(1, &[1, 2])));
        let _ = c.tick(0.0, sync()).unwrap();

        c.ctx_mut().lose_context();
        c.request_draw();
        assert!(!c.tick(16.0, sync()).unwrap());
        assert!(c.identify(10.0, 10.0).unwrap().is_none());

        c.ctx_mut().restore_context();
        assert!(c.tick(32.0, sync()).unwrap());
        assert_eq!(restored.try_recv(), Ok(()));
        assert_eq!(c.scene().count(), 2);
        assert!(c.tick(48.0, sync()).unwrap());
        assert!(!c.tick(64.0, sync()).unwrap());
    }

    #[test]
    fn identify_and_mark_round_trip() {
        let mut c = canvas(props());
        let mut object = TestObject::new(7);
        // pick buffer is 16x16 at the default 0.25 scale
        object.footprint = Some(PickFootprint {
            rect: Viewport::new(0, 0, 16, 16),
            instance: 1,
            group: 4,
            depth: 0.5,
        });
        let repr = TestRepr::with_objects(3, vec![object.into_rc()]);
        let actions = Rc::clone(&repr.actions);
        c.add(Box::new(repr));
        let _ = c.tick(0.0, sync()).unwrap();

        let hit = c.identify(20.0, 20.0).unwrap().unwrap();
        assert_eq!(hit.id.object_id, 7);
        let loci = c.get_loci(&hit.id).unwrap();
        assert_eq!(loci.repr, Some(3));

        assert!(c.mark(&loci, MarkerAction::Highlight).unwrap());
        assert_eq!(*actions.borrow(), vec![MarkerAction::Highlight]);
        assert!(c.tick(16.0, sync()).unwrap());
        assert!(!c.mark(&ReprLoci::default(), MarkerAction::Select).unwrap());
    }

    #[test]
    fn resize_is_picked_up_by_the_next_draw() {
        let mut c = canvas(props());
        let resized = c.events_mut().resized.subscribe();
        let _ = c.tick(0.0, sync()).unwrap();
        c.set_size(128, 32).unwrap();
        assert!(c.tick(16.0, sync()).unwrap());
        assert_eq!(resized.try_recv(), Ok((128, 32)));
        assert_eq!(c.camera().viewport(), Viewport::new(0, 0, 128, 32));
    }

    #[test]
    fn requested_resize_redraws_at_the_same_size() {
        let mut c = canvas(props());
        let resized = c.events_mut().resized.subscribe();
        let _ = c.tick(0.0, sync()).unwrap();
        c.ctx_mut().set_pixel_ratio(2.0);
        c.request_resize();
        assert!(c.tick(16.0, sync()).unwrap());
        assert_eq!(resized.try_recv(), Ok((SIZE, SIZE)));
    }

    #[test]
    fn frame_ticks_only_while_animating() {
        let mut c = canvas(props());
        assert!(!c.frame(0.0).unwrap());
        c.animate();
        assert!(c.frame(16.0).unwrap());
        c.stop();
        c.request_draw();
        assert!(!c.frame(32.0).unwrap());
    }

    #[test]
    fn reset_rule() {
        let view = Sphere3D::new(Vec3::ZERO, 10.0);
        let near = Sphere3D::new(Vec3::new(5.0, 0.0, 0.0), 1.0);
        let far = Sphere3D::new(Vec3::new(100.0, 0.0, 0.0), 1.0);
        assert!(should_reset_camera(&view, &Sphere3D::EMPTY, &[near]));
        assert!(!should_reset_camera(&view, &near, &[near]));
        assert!(should_reset_camera(&view, &near, &[far]));
        assert!(should_reset_camera(&view, &near, &[near, far]));
        assert!(!should_reset_camera(&view, &near, &[]));
        let everything = Sphere3D::new(Vec3::new(50.0, 0.0, 0.0), 60.0);
        assert!(!should_reset_camera(&view, &everything, &[near, far]));
    }

    #[test]
    fn hiding_a_repr_redraws_and_shrinks_visible_bounds() {
        let mut c = canvas(props());
        c.add(Box::new(TestRepr::with_objects(1, vec![object_at(1, Vec3::ZERO)])));
        c.add(Box::new(TestRepr::with_objects(
            2,
            vec![object_at(2, Vec3::new(50.0, 0.0, 0.0))],
        )));
        let _ = c.tick(0.0, sync()).unwrap();
        let before = c.scene().bounding_sphere_visible();
        assert!(!c.tick(16.0, sync()).unwrap());

        c.set_visibility(2, false);
        assert!(c.tick(32.0, sync()).unwrap());
        let after = c.scene().bounding_sphere_visible();
        assert!(after.radius < before.radius);
        assert!(after.includes(&Sphere3D::new(Vec3::ZERO, 2.0)));
        assert!(!c.tick(48.0, sync()).unwrap());
    }

    #[test]
    fn update_after_value_change_redraws() {
        let mut c = canvas(props());
        c.add(Box::new(TestRepr::with_objects(1, vec![object_at(1, Vec3::ZERO)])));
        let _ = c.tick(0.0, sync()).unwrap();
        assert!(!c.tick(16.0, sync()).unwrap());
        c.scene_mut().renderable_mut(1).unwrap().values_mut().alpha.update(0.5);
        c.update(Some(1), true).unwrap();
        assert!(c.tick(32.0, sync()).unwrap());
        assert!(c.scene().opacity_average() < 1.0);
    }

    #[test]
    fn distant_addition_reframes_the_camera() {
        let mut c = canvas(props());
        c.add(Box::new(TestRepr::with_objects(1, vec![object_at(1, Vec3::ZERO)])));
        let _ = c.tick(0.0, sync()).unwrap();
        assert_eq!(c.camera().state.target, Vec3::ZERO);

        c.add(Box::new(TestRepr::with_objects(
            1,
            vec![object_at(1, Vec3::ZERO), object_at(2, Vec3::new(1000.0, 0.0, 0.0))],
        )));
        let _ = c.tick(16.0, sync()).unwrap();
        let visible = c.scene().bounding_sphere_visible();
        assert_eq!(c.camera().state.target, visible.center);
        assert!(c.camera().view_sphere().includes(&Sphere3D::new(Vec3::new(1000.0, 0.0, 0.0), 2.0)));
    }
}
