use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Transparency technique used by the draw pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransparencyMode {
    /// Premultiplied alpha blending in scene order.
    #[default]
    Blended,
    /// Weighted blended order-independent transparency.
    Wboit,
    /// Dual depth peeling.
    Dpoit,
}

/// Multi-sample anti-aliasing schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MultiSampleMode {
    /// Single sample per frame.
    Off,
    /// All samples every frame.
    On,
    /// One sample per tick while the camera rests.
    #[default]
    Temporal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Multi-sample", inline)]
#[serde(default)]
/// Multi-sample anti-aliasing parameters.
pub struct MultiSampleProps {
    /// Schedule.
    #[schemars(title = "Mode")]
    pub mode: MultiSampleMode,
    /// Sample count is `2^sample_level` (level 0 disables jitter).
    #[schemars(title = "Sample Level", range(min = 0, max = 5))]
    pub sample_level: u32,
    /// Re-sample after marking changes while the camera rests.
    #[schemars(title = "Reduce Flicker")]
    pub reduce_flicker: bool,
}

impl Default for MultiSampleProps {
    fn default() -> Self {
        Self {
            mode: MultiSampleMode::Temporal,
            sample_level: 2,
            reduce_flicker: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Marking", inline)]
#[serde(default)]
/// Highlight/select edge effect parameters.
pub struct MarkingProps {
    /// Draw marking edges.
    #[schemars(title = "Enabled")]
    pub enabled: bool,
    /// Edge color for highlighted geometry.
    #[schemars(title = "Highlight Edge Color")]
    pub highlight_edge_color: [f32; 3],
    /// Edge color for selected geometry.
    #[schemars(title = "Select Edge Color")]
    pub select_edge_color: [f32; 3],
    /// Edge width in pixels.
    #[schemars(title = "Edge Scale", range(min = 1, max = 5))]
    pub edge_scale: u32,
    /// Strength of edges hidden behind other geometry.
    #[schemars(title = "Ghost Edge Strength", range(min = 0.0, max = 1.0), extend("step" = 0.05))]
    pub ghost_edge_strength: f32,
    /// Relative strength of edges inside marked regions.
    #[schemars(title = "Inner Edge Factor", range(min = 0.0, max = 3.0), extend("step" = 0.1))]
    pub inner_edge_factor: f32,
}

impl Default for MarkingProps {
    fn default() -> Self {
        Self {
            enabled: true,
            highlight_edge_color: [1.0, 0.4, 0.6],
            select_edge_color: [0.2, 1.0, 0.1],
            edge_scale: 1,
            ghost_edge_strength: 0.3,
            inner_edge_factor: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Picking", inline)]
#[serde(default)]
/// Pick buffer parameters.
pub struct PickingProps {
    /// Pick buffer resolution relative to the drawing buffer.
    #[schemars(title = "Pick Scale", range(min = 0.1, max = 1.0), extend("step" = 0.05))]
    pub pick_scale: f32,
    /// Spiral search radius in window pixels around a missed pick.
    #[schemars(title = "Pick Padding", range(min = 0, max = 10))]
    pub pick_padding: u32,
}

impl Default for PickingProps {
    fn default() -> Self {
        Self {
            pick_scale: 0.25,
            pick_padding: 3,
        }
    }
}
