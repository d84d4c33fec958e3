//! Scene camera: persistent snapshot state, derived matrices and clipping.

use std::f32::consts::FRAC_PI_4;

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use super::transition::CameraTransitionManager;
use super::CameraView;
use crate::math::{Plane, Sphere3D, Viewport};

/// Projection kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum CameraMode {
    /// Off-axis perspective projection.
    #[default]
    Perspective,
    /// Parallel projection sized to the target distance.
    Orthographic,
}

/// Everything needed to reproduce a camera framing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSnapshot {
    /// Projection kind.
    pub mode: CameraMode,
    /// Eye position in world space.
    pub position: Vec3,
    /// Look-at target.
    pub target: Vec3,
    /// Up direction.
    pub up: Vec3,
    /// Radius of the region of interest around `target`.
    pub radius: f32,
    /// Radius of the whole scene, bounds the far plane when `clip_far` is off.
    pub radius_max: f32,
    /// Vertical field of view in radians.
    pub fov: f32,
    /// Fog intensity in `[0, 100]`; 50 puts fog start at the target.
    pub fog: f32,
    /// Clip the far plane at the region of interest instead of the scene.
    pub clip_far: bool,
    /// Lower bound for the near plane in perspective mode.
    pub min_near: f32,
}

impl Default for CameraSnapshot {
    fn default() -> Self {
        Self {
            mode: CameraMode::Perspective,
            position: Vec3::new(0.0, 0.0, 100.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            radius: 0.0,
            radius_max: 10.0,
            fov: FRAC_PI_4,
            fog: 50.0,
            clip_far: true,
            min_near: 5.0,
        }
    }
}

/// Sub-rectangle of a larger virtual view, used for jittered sampling and
/// tiled rendering. Same meaning as the usual `setViewOffset` convention.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewOffset {
    /// Whether the offset is applied.
    pub enabled: bool,
    /// Full virtual view width.
    pub full_width: f32,
    /// Full virtual view height.
    pub full_height: f32,
    /// Horizontal offset of the sub-view.
    pub offset_x: f32,
    /// Vertical offset of the sub-view.
    pub offset_y: f32,
    /// Sub-view width.
    pub width: f32,
    /// Sub-view height.
    pub height: f32,
}

/// Smallest radius used for distance fitting.
const MIN_RADIUS: f32 = 0.01;

/// Camera with derived view/projection matrices.
///
/// Mutate [`state`](Self::state) or call [`set_state`](Self::set_state), then
/// call [`update`](Self::update) to recompute the matrices.
#[derive(Debug, Clone)]
pub struct Camera {
    /// Current framing.
    pub state: CameraSnapshot,
    viewport: Viewport,
    view_offset: ViewOffset,
    view: Mat4,
    projection: Mat4,
    projection_view: Mat4,
    inverse_projection_view: Mat4,
    near: f32,
    far: f32,
    fog_near: f32,
    fog_far: f32,
    transition: CameraTransitionManager,
}

impl Camera {
    /// Create a camera with the given initial framing and viewport.
    #[must_use]
    pub fn new(state: CameraSnapshot, viewport: Viewport) -> Self {
        let mut camera = Self {
            state,
            viewport,
            view_offset: ViewOffset::default(),
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            projection_view: Mat4::IDENTITY,
            inverse_projection_view: Mat4::IDENTITY,
            near: 1.0,
            far: 10_000.0,
            fog_near: 5_000.0,
            fog_far: 10_000.0,
            transition: CameraTransitionManager::default(),
        };
        let _ = camera.update();
        camera
    }

    /// Replace the viewport. Takes effect on the next [`update`](Self::update).
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Current view offset.
    #[must_use]
    pub fn view_offset(&self) -> &ViewOffset {
        &self.view_offset
    }

    /// Render only the `width`x`height` sub-rectangle at (`x`, `y`) of a
    /// `full_width`x`full_height` virtual view.
    pub fn set_view_offset(
        &mut self,
        full_width: f32,
        full_height: f32,
        offset: (f32, f32),
        width: f32,
        height: f32,
    ) {
        self.view_offset = ViewOffset {
            enabled: true,
            full_width,
            full_height,
            offset_x: offset.0,
            offset_y: offset.1,
            width,
            height,
        };
    }

    /// Stop applying the view offset.
    pub fn clear_view_offset(&mut self) {
        self.view_offset.enabled = false;
    }

    /// Distance from eye to target.
    #[must_use]
    pub fn distance(&self) -> f32 {
        self.state.position.distance(self.state.target)
    }

    /// Plane through the eye facing along the view direction. Signed
    /// distances from it are view depths.
    #[must_use]
    pub fn camera_plane(&self) -> Plane {
        Plane::from_normal_and_point(self.direction(), self.state.position)
    }

    /// Whether an eased camera transition is running.
    #[must_use]
    pub fn in_transition(&self) -> bool {
        self.transition.in_transition()
    }

    /// Move to `snapshot`, immediately or eased over `duration_ms`.
    pub fn set_state(&mut self, snapshot: CameraSnapshot, duration_ms: f64) {
        if duration_ms > 0.0 {
            self.transition.start(self.state, snapshot, duration_ms);
        } else {
            self.transition.cancel();
            self.state = snapshot;
        }
    }

    /// Advance a running transition to host time `t` (ms).
    pub fn transition_tick(&mut self, t: f64) {
        if let Some(state) = self.transition.tick(t) {
            self.state = state;
        }
    }

    /// Keep the far-plane bound in sync with the scene extent.
    pub fn set_radius_max(&mut self, radius_max: f32) {
        self.state.radius_max = radius_max.max(MIN_RADIUS);
    }

    /// Eye distance at which a sphere of `radius` fills the view.
    #[must_use]
    pub fn target_distance(&self, radius: f32) -> f32 {
        let r = radius.max(MIN_RADIUS);
        let aspect = self.viewport.aspect();
        let aspect_factor = if aspect > 1.0 { 1.0 } else { aspect };
        let half_fov = self.state.fov / 2.0;
        let d = match self.state.mode {
            CameraMode::Orthographic => (r / aspect_factor) / half_fov.tan(),
            CameraMode::Perspective => (r / aspect_factor) / half_fov.sin(),
        };
        d.abs()
    }

    /// Snapshot that frames a sphere at `target` with `radius`, keeping the
    /// current viewing direction and up vector.
    #[must_use]
    pub fn get_focus(&self, target: Vec3, radius: f32) -> CameraSnapshot {
        let dir = (self.state.position - self.state.target).normalize_or(Vec3::Z);
        CameraSnapshot {
            position: target + dir * self.target_distance(radius),
            target,
            radius,
            ..self.state
        }
    }

    /// Sphere currently framed by the camera.
    #[must_use]
    pub fn view_sphere(&self) -> Sphere3D {
        Sphere3D::new(self.state.target, self.state.radius)
    }

    /// Recompute clip planes and matrices. Returns whether the
    /// projection-view matrix changed.
    pub fn update(&mut self) -> bool {
        self.update_clip();
        let (eye, up) = self.safe_eye_up();
        let view = Mat4::look_at_rh(eye, self.state.target, up);
        let projection = match self.state.mode {
            CameraMode::Perspective => self.perspective(),
            CameraMode::Orthographic => self.orthographic(),
        };
        let projection_view = projection * view;
        let changed = projection_view != self.projection_view;
        self.view = view;
        self.projection = projection;
        self.projection_view = projection_view;
        self.inverse_projection_view = projection_view.inverse();
        changed
    }

    fn safe_eye_up(&self) -> (Vec3, Vec3) {
        let mut eye = self.state.position;
        if eye.distance_squared(self.state.target) < 1e-12 {
            eye = self.state.target + Vec3::Z;
        }
        let dir = (self.state.target - eye).normalize();
        let mut up = self.state.up.normalize_or(Vec3::Y);
        if dir.cross(up).length_squared() < 1e-10 {
            up = if dir.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
        }
        (eye, up)
    }

    fn update_clip(&mut self) {
        let s = &self.state;
        let radius = s.radius.max(MIN_RADIUS);
        let distance = s.position.distance(s.target);
        let mut near = distance - radius;
        let mut far = distance + if s.clip_far { radius } else { s.radius_max };
        let fog_near_factor = -(50.0 - s.fog) / 50.0;
        let fog_near = distance - fog_near_factor * radius;
        match s.mode {
            CameraMode::Perspective => {
                near = near.max(s.radius_max.min(s.min_near));
            }
            CameraMode::Orthographic => {
                near = near.max(0.0);
            }
        }
        if far <= near {
            far = near + 0.01;
        }
        self.near = near;
        self.far = far;
        self.fog_near = fog_near.max(near);
        self.fog_far = far;
    }

    /// `[left, right, bottom, top]` extents, cropped by the view offset.
    fn extents(&self, half_height: f32) -> [f32; 4] {
        let mut top = half_height;
        let mut height = 2.0 * half_height;
        let mut width = self.viewport.aspect() * height;
        let mut left = -0.5 * width;
        let o = &self.view_offset;
        if o.enabled && o.full_width > 0.0 && o.full_height > 0.0 {
            left += o.offset_x * width / o.full_width;
            top -= o.offset_y * height / o.full_height;
            width *= o.width / o.full_width;
            height *= o.height / o.full_height;
        }
        [left, left + width, top - height, top]
    }

    fn perspective(&self) -> Mat4 {
        let half = self.near * (self.state.fov / 2.0).tan();
        let [l, r, b, t] = self.extents(half);
        off_axis_perspective(l, r, b, t, self.near, self.far)
    }

    fn orthographic(&self) -> Mat4 {
        let half = self.distance() * (self.state.fov / 2.0).tan();
        let [l, r, b, t] = self.extents(half);
        Mat4::orthographic_rh(l, r, b, t, self.near, self.far)
    }
}

/// Right-handed off-axis perspective with `[0, 1]` depth.
#[must_use]
pub fn off_axis_perspective(
    left: f32,
    right: f32,
    bottom: f32,
    top: f32,
    near: f32,
    far: f32,
) -> Mat4 {
    let w = right - left;
    let h = top - bottom;
    let d = near - far;
    Mat4::from_cols_array(&[
        2.0 * near / w,
        0.0,
        0.0,
        0.0,
        0.0,
        2.0 * near / h,
        0.0,
        0.0,
        (right + left) / w,
        (top + bottom) / h,
        far / d,
        -1.0,
        0.0,
        0.0,
        near * far / d,
        0.0,
    ])
}

impl CameraView for Camera {
    fn view(&self) -> Mat4 {
        self.view
    }

    fn projection(&self) -> Mat4 {
        self.projection
    }

    fn projection_view(&self) -> Mat4 {
        self.projection_view
    }

    fn inverse_projection_view(&self) -> Mat4 {
        self.inverse_projection_view
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn mode(&self) -> CameraMode {
        self.state.mode
    }

    fn near(&self) -> f32 {
        self.near
    }

    fn far(&self) -> f32 {
        self.far
    }

    fn fog_near(&self) -> f32 {
        self.fog_near
    }

    fn fog_far(&self) -> f32 {
        self.fog_far
    }

    fn position(&self) -> Vec3 {
        self.state.position
    }

    fn direction(&self) -> Vec3 {
        (self.state.target - self.state.position).normalize_or(Vec3::NEG_Z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        Camera::new(
            CameraSnapshot {
                radius: 10.0,
                radius_max: 10.0,
                ..CameraSnapshot::default()
            },
            Viewport::new(0, 0, 800, 600),
        )
    }

    #[test]
    fn off_axis_matches_symmetric_perspective() {
        let near = 0.5;
        let far = 100.0;
        let fov = 60.0_f32.to_radians();
        let aspect = 1.5;
        let t = near * (fov / 2.0).tan();
        let m = off_axis_perspective(-t * aspect, t * aspect, -t, t, near, far);
        let reference = Mat4::perspective_rh(fov, aspect, near, far);
        assert!(m.abs_diff_eq(reference, 1e-5));
    }

    #[test]
    fn target_projects_to_viewport_center() {
        let cam = camera();
        let ndc = cam.projection_view().project_point3(Vec3::ZERO);
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn clip_planes_bracket_region_of_interest() {
        let cam = camera();
        assert!((cam.near() - 90.0).abs() < 1e-3);
        assert!((cam.far() - 110.0).abs() < 1e-3);
    }

    #[test]
    fn update_reports_change_only_when_matrices_move() {
        let mut cam = camera();
        assert!(!cam.update());
        cam.state.position = Vec3::new(0.0, 0.0, 50.0);
        assert!(cam.update());
        assert!(!cam.update());
    }

    #[test]
    fn focus_keeps_direction_and_fits_radius() {
        let cam = camera();
        let focus = cam.get_focus(Vec3::new(5.0, 0.0, 0.0), 20.0);
        assert_eq!(focus.target, Vec3::new(5.0, 0.0, 0.0));
        let dir = (focus.position - focus.target).normalize();
        assert!(dir.abs_diff_eq(Vec3::Z, 1e-6));
        let expected = 20.0 / (FRAC_PI_4 / 2.0).sin();
        assert!((focus.position.distance(focus.target) - expected).abs() < 1e-3);
    }

    #[test]
    fn view_offset_narrows_frustum() {
        let mut cam = camera();
        let full = cam.projection();
        cam.set_view_offset(800.0, 600.0, (0.0, 0.0), 400.0, 600.0);
        assert!(cam.update());
        assert!(!cam.projection().abs_diff_eq(full, 1e-6));
        cam.clear_view_offset();
        assert!(cam.update());
        assert!(cam.projection().abs_diff_eq(full, 1e-6));
    }
}
