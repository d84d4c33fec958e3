use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Renderer", inline)]
#[serde(default)]
/// Colors and shading parameters uploaded as global uniforms.
pub struct RendererProps {
    /// Clear color (linear RGB).
    #[schemars(title = "Background")]
    pub background_color: [f32; 3],
    /// Clear to transparent black instead of the background color.
    #[schemars(title = "Transparent Background")]
    pub transparent_background: bool,
    /// Fragments below this alpha are not pickable.
    #[schemars(title = "Picking Alpha Threshold", range(min = 0.0, max = 1.0), extend("step" = 0.01))]
    pub picking_alpha_threshold: f32,
    /// Darkening of back-facing interiors.
    #[schemars(title = "Interior Darkening", range(min = 0.0, max = 1.0), extend("step" = 0.01))]
    pub interior_darkening: f32,
    /// Highlight overlay color.
    #[schemars(title = "Highlight Color")]
    pub highlight_color: [f32; 3],
    /// Selection overlay color.
    #[schemars(title = "Select Color")]
    pub select_color: [f32; 3],
    /// Highlight overlay strength.
    #[schemars(title = "Highlight Strength", range(min = 0.0, max = 1.0), extend("step" = 0.05))]
    pub highlight_strength: f32,
    /// Selection overlay strength.
    #[schemars(title = "Select Strength", range(min = 0.0, max = 1.0), extend("step" = 0.05))]
    pub select_strength: f32,
    /// Which marker wins where highlight and selection overlap (1 = highlight).
    #[schemars(skip)]
    pub marker_priority: u32,
    /// Falloff exponent of x-ray shaded edges.
    #[schemars(title = "X-ray Edge Falloff", range(min = 0.0, max = 3.0), extend("step" = 0.1))]
    pub xray_edge_falloff: f32,
    /// Tone-mapping exposure.
    #[schemars(title = "Exposure", range(min = 0.0, max = 3.0), extend("step" = 0.01))]
    pub exposure: f32,
    /// Ambient light intensity.
    #[schemars(title = "Ambient Intensity", range(min = 0.0, max = 2.0), extend("step" = 0.01))]
    pub ambient_intensity: f32,
}

impl Default for RendererProps {
    fn default() -> Self {
        Self {
            background_color: [1.0, 1.0, 1.0],
            transparent_background: false,
            picking_alpha_threshold: 0.5,
            interior_darkening: 0.5,
            highlight_color: [1.0, 0.4, 0.6],
            select_color: [0.2, 1.0, 0.1],
            highlight_strength: 0.3,
            select_strength: 0.3,
            marker_priority: 1,
            xray_edge_falloff: 1.0,
            exposure: 1.0,
            ambient_intensity: 0.4,
        }
    }
}
