use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::camera::{CameraMode, StereoProps};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Camera", inline)]
#[serde(default)]
/// Camera projection and framing parameters.
pub struct CameraProps {
    /// Perspective or orthographic projection.
    #[schemars(title = "Projection")]
    pub mode: CameraMode,
    /// Vertical field of view in degrees.
    #[schemars(title = "Field of View", range(min = 10.0, max = 120.0), extend("step" = 1.0))]
    pub fov_degrees: f32,
    /// Lower bound for the near plane distance.
    #[schemars(skip)]
    pub min_near: f32,
    /// Fog intensity, 0 disables fog.
    #[schemars(title = "Fog", range(min = 0.0, max = 100.0), extend("step" = 1.0))]
    pub fog: f32,
    /// Clip the far plane at the scene bounds.
    #[schemars(title = "Clip Far")]
    pub clip_far: bool,
    /// Never reframe the camera automatically after a commit.
    #[schemars(title = "Manual Reset")]
    pub manual_reset: bool,
    /// Draw side-by-side stereo.
    #[schemars(title = "Stereo")]
    pub stereo_enabled: bool,
    /// Stereo eye parameters.
    #[schemars(skip)]
    pub stereo: StereoProps,
}

impl Default for CameraProps {
    fn default() -> Self {
        Self {
            mode: CameraMode::Perspective,
            fov_degrees: 45.0,
            min_near: 5.0,
            fog: 50.0,
            clip_far: true,
            manual_reset: false,
            stereo_enabled: false,
            stereo: StereoProps::default(),
        }
    }
}
