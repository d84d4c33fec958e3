//! Side-by-side stereo rendering derived from a mono camera.

use glam::{Mat4, Vec3};

use super::core::{off_axis_perspective, Camera, CameraMode};
use super::CameraView;
use crate::math::Viewport;

/// Stereo rig parameters.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
#[serde(default)]
pub struct StereoProps {
    /// Eye separation as a fraction of the camera distance.
    pub eye_separation: f32,
    /// Zero-parallax distance as a multiple of the camera distance.
    pub focus: f32,
}

impl Default for StereoProps {
    fn default() -> Self {
        Self {
            eye_separation: 0.062,
            focus: 1.0,
        }
    }
}

/// One eye of a [`StereoCamera`].
#[derive(Debug, Clone)]
pub struct StereoEye {
    viewport: Viewport,
    view: Mat4,
    projection: Mat4,
    projection_view: Mat4,
    inverse_projection_view: Mat4,
    position: Vec3,
    direction: Vec3,
    mode: CameraMode,
    near: f32,
    far: f32,
    fog_near: f32,
    fog_far: f32,
}

impl StereoEye {
    fn new() -> Self {
        Self {
            viewport: Viewport::default(),
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            projection_view: Mat4::IDENTITY,
            inverse_projection_view: Mat4::IDENTITY,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            mode: CameraMode::Perspective,
            near: 1.0,
            far: 100.0,
            fog_near: 50.0,
            fog_far: 100.0,
        }
    }
}

/// Left/right eye pair splitting the parent camera's viewport in halves.
#[derive(Debug, Clone)]
pub struct StereoCamera {
    /// Rig parameters.
    pub props: StereoProps,
    /// Left eye, drawn into the left half.
    pub left: StereoEye,
    /// Right eye, drawn into the right half.
    pub right: StereoEye,
}

impl StereoCamera {
    /// Rig with the given parameters; call [`update`](Self::update) before use.
    #[must_use]
    pub fn new(props: StereoProps) -> Self {
        Self {
            props,
            left: StereoEye::new(),
            right: StereoEye::new(),
        }
    }

    /// Re-derive both eyes from the (already updated) parent camera.
    pub fn update(&mut self, camera: &Camera) {
        let vp = camera.viewport();
        let half = vp.width / 2;
        let distance = camera.distance().max(1e-3);
        let separation = self.props.eye_separation * distance;
        let focus = (self.props.focus * distance).max(camera.near());

        let left_vp = Viewport::new(vp.x, vp.y, half, vp.height);
        let right_vp = Viewport::new(vp.x + half, vp.y, vp.width - half, vp.height);
        update_eye(&mut self.left, camera, left_vp, -0.5 * separation, focus);
        update_eye(&mut self.right, camera, right_vp, 0.5 * separation, focus);
    }

    /// Eye whose viewport contains window x coordinate `x`.
    #[must_use]
    pub fn eye_at(&self, x: f32) -> &StereoEye {
        let right_start = self.right.viewport.x as f32;
        if x >= right_start {
            &self.right
        } else {
            &self.left
        }
    }
}

fn update_eye(eye: &mut StereoEye, camera: &Camera, viewport: Viewport, offset: f32, focus: f32) {
    let near = camera.near();
    let far = camera.far();
    let aspect = viewport.aspect();
    let shift = -offset * near / focus;

    eye.viewport = viewport;
    eye.view = Mat4::from_translation(Vec3::new(-offset, 0.0, 0.0)) * camera.view();
    eye.projection = match camera.mode() {
        CameraMode::Perspective => {
            let top = near * (camera.state.fov / 2.0).tan();
            let right = top * aspect;
            off_axis_perspective(-right + shift, right + shift, -top, top, near, far)
        }
        CameraMode::Orthographic => {
            let top = camera.distance() * (camera.state.fov / 2.0).tan();
            let right = top * aspect;
            Mat4::orthographic_rh(-right, right, -top, top, near, far)
        }
    };
    eye.projection_view = eye.projection * eye.view;
    eye.inverse_projection_view = eye.projection_view.inverse();
    eye.position = eye.view.inverse().transform_point3(Vec3::ZERO);
    eye.direction = camera.direction();
    eye.mode = camera.mode();
    eye.near = near;
    eye.far = far;
    eye.fog_near = camera.fog_near();
    eye.fog_far = camera.fog_far();
}

impl CameraView for StereoEye {
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
        self.mode
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
        self.position
    }

    fn direction(&self) -> Vec3 {
        self.direction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::core::CameraSnapshot;

    #[test]
    fn eyes_split_viewport_and_straddle_camera() {
        let camera = Camera::new(
            CameraSnapshot {
                radius: 10.0,
                ..CameraSnapshot::default()
            },
            Viewport::new(0, 0, 801, 600),
        );
        let mut stereo = StereoCamera::new(StereoProps::default());
        stereo.update(&camera);

        assert_eq!(stereo.left.viewport(), Viewport::new(0, 0, 400, 600));
        assert_eq!(stereo.right.viewport(), Viewport::new(400, 0, 401, 600));
        assert!(stereo.left.position().x < 0.0);
        assert!(stereo.right.position().x > 0.0);
        assert!(std::ptr::eq(stereo.eye_at(500.0), &stereo.right));
        assert!(std::ptr::eq(stereo.eye_at(10.0), &stereo.left));
    }

    #[test]
    fn focus_point_has_zero_parallax() {
        let camera = Camera::new(
            CameraSnapshot {
                radius: 10.0,
                ..CameraSnapshot::default()
            },
            Viewport::new(0, 0, 800, 600),
        );
        let mut stereo = StereoCamera::new(StereoProps::default());
        stereo.update(&camera);
        let l = stereo.left.projection_view().project_point3(Vec3::ZERO);
        let r = stereo.right.projection_view().project_point3(Vec3::ZERO);
        assert!((l.x - r.x).abs() < 1e-4);
    }
}
