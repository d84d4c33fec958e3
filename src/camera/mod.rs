//! Camera system for 3D scene viewing.
//!
//! Provides the scene [`Camera`] with snapshot-based framing and eased
//! transitions, a side-by-side [`StereoCamera`], and the [`CameraView`]
//! trait through which the renderer and picking read matrices.

/// Core camera struct, snapshots and projection math.
pub mod core;
/// Side-by-side stereo eyes.
pub mod stereo;
/// Eased snapshot-to-snapshot transitions.
pub mod transition;

use glam::{Mat4, Vec3};

pub use self::core::{Camera, CameraMode, CameraSnapshot, ViewOffset};
pub use stereo::{StereoCamera, StereoEye, StereoProps};
pub use transition::CameraTransitionManager;

use crate::math::Viewport;

/// Read-only view of a camera as consumed by render passes and picking.
pub trait CameraView {
    /// World-to-view matrix.
    fn view(&self) -> Mat4;
    /// View-to-clip matrix (`[0, 1]` depth).
    fn projection(&self) -> Mat4;
    /// `projection * view`.
    fn projection_view(&self) -> Mat4;
    /// Inverse of [`projection_view`](Self::projection_view).
    fn inverse_projection_view(&self) -> Mat4;
    /// Target pixel rectangle.
    fn viewport(&self) -> Viewport;
    /// Projection kind.
    fn mode(&self) -> CameraMode;
    /// Near plane distance.
    fn near(&self) -> f32;
    /// Far plane distance.
    fn far(&self) -> f32;
    /// Fog start distance.
    fn fog_near(&self) -> f32;
    /// Fog end distance.
    fn fog_far(&self) -> f32;
    /// Eye position in world space.
    fn position(&self) -> Vec3;
    /// Normalized viewing direction.
    fn direction(&self) -> Vec3;
}

/// The camera a frame is drawn or picked with.
#[derive(Debug, Clone, Copy)]
pub enum ViewCamera<'a> {
    /// Single full-viewport camera.
    Mono(&'a Camera),
    /// Two half-viewport eyes.
    Stereo(&'a StereoCamera),
}

impl<'a> ViewCamera<'a> {
    /// Every eye to draw, in draw order.
    #[must_use]
    pub fn eyes(&self) -> Vec<&'a dyn CameraView> {
        match *self {
            Self::Mono(camera) => {
                let eye: &'a dyn CameraView = camera;
                vec![eye]
            }
            Self::Stereo(stereo) => {
                let left: &'a dyn CameraView = &stereo.left;
                let right: &'a dyn CameraView = &stereo.right;
                vec![left, right]
            }
        }
    }

    /// Eye responsible for window x coordinate `x`.
    #[must_use]
    pub fn eye_at(&self, x: f32) -> &'a dyn CameraView {
        match *self {
            Self::Mono(camera) => camera,
            Self::Stereo(stereo) => stereo.eye_at(x),
        }
    }
}
