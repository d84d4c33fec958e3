//! Global uniform block shared by every program.
//!
//! One `#[repr(C)]` struct uploaded as raw bytes through
//! [`GpuContext::set_globals`](crate::gpu::GpuContext::set_globals). The
//! layout is std140-compatible: matrices first, then `vec4`s, then the
//! integer switches padded to a full `vec4`.

use bytemuck::{Pod, Zeroable};

use crate::camera::{CameraMode, CameraView};
use crate::gpu::context::MAX_GLOBALS_SIZE;
use crate::options::RendererProps;

/// Values every program reads.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GlobalUniforms {
    /// World-to-view.
    pub view: [[f32; 4]; 4],
    /// View-to-clip.
    pub projection: [[f32; 4]; 4],
    /// World-to-clip.
    pub projection_view: [[f32; 4]; 4],
    /// Clip-to-world.
    pub inverse_projection_view: [[f32; 4]; 4],
    /// Eye position, `w` is 1 for orthographic projection.
    pub camera_position: [f32; 4],
    /// Viewing direction.
    pub camera_direction: [f32; 4],
    /// Viewport `x, y, width, height` in pixels.
    pub viewport: [f32; 4],
    /// Drawing buffer width, height, pixel ratio, transparent background flag.
    pub draw_buffer: [f32; 4],
    /// Near, far, fog near, fog far.
    pub clip: [f32; 4],
    /// Background/fog color.
    pub fog_color: [f32; 4],
    /// Highlight color, `w` is the strength.
    pub highlight_color: [f32; 4],
    /// Select color, `w` is the strength.
    pub select_color: [f32; 4],
    /// Exposure, ambient intensity, interior darkening, x-ray edge falloff.
    pub shading: [f32; 4],
    /// Picking alpha threshold, marker priority, unused, unused.
    pub picking: [f32; 4],
    /// Which pick buffer to write (see [`PickType::as_uniform`](crate::scene::PickType::as_uniform)).
    pub pick_type: i32,
    /// 1 marking depth, 2 marking mask.
    pub marking_type: i32,
    /// 0 everything, 1 opaque fragments only, 2 transparent fragments only.
    pub render_mask: i32,
    /// Padding to a full `vec4`.
    pub _pad: i32,
}

const _: () = assert!(size_of::<GlobalUniforms>() <= MAX_GLOBALS_SIZE);

/// Fragment subset a color pass writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMask {
    /// All fragments.
    All,
    /// Only fragments with full opacity.
    Opaque,
    /// Only fragments with partial opacity.
    Transparent,
}

impl RenderMask {
    fn as_uniform(self) -> i32 {
        match self {
            Self::All => 0,
            Self::Opaque => 1,
            Self::Transparent => 2,
        }
    }
}

impl Default for GlobalUniforms {
    fn default() -> Self {
        let mut globals = Self::zeroed();
        globals.apply_props(&RendererProps::default());
        globals
    }
}

impl GlobalUniforms {
    /// Copy camera matrices and clip distances.
    pub fn apply_camera(&mut self, camera: &dyn CameraView) {
        self.view = camera.view().to_cols_array_2d();
        self.projection = camera.projection().to_cols_array_2d();
        self.projection_view = camera.projection_view().to_cols_array_2d();
        self.inverse_projection_view = camera.inverse_projection_view().to_cols_array_2d();
        let ortho = if camera.mode() == CameraMode::Orthographic { 1.0 } else { 0.0 };
        self.camera_position = camera.position().extend(ortho).to_array();
        self.camera_direction = camera.direction().extend(0.0).to_array();
        self.clip = [camera.near(), camera.far(), camera.fog_near(), camera.fog_far()];
    }

    /// Copy color and shading parameters.
    pub fn apply_props(&mut self, props: &RendererProps) {
        let [r, g, b] = props.background_color;
        self.fog_color = [r, g, b, 1.0];
        let [r, g, b] = props.highlight_color;
        self.highlight_color = [r, g, b, props.highlight_strength];
        let [r, g, b] = props.select_color;
        self.select_color = [r, g, b, props.select_strength];
        self.shading = [
            props.exposure,
            props.ambient_intensity,
            props.interior_darkening,
            props.xray_edge_falloff,
        ];
        self.picking = [props.picking_alpha_threshold, props.marker_priority as f32, 0.0, 0.0];
        self.draw_buffer[3] = if props.transparent_background { 1.0 } else { 0.0 };
    }

    /// Set the fragment subset.
    pub fn set_render_mask(&mut self, mask: RenderMask) {
        self.render_mask = mask.as_uniform();
    }
}
