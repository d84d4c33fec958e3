//! Canvas configuration with TOML preset support.
//!
//! [`Canvas3DProps`] gathers camera, transparency, picking, multi-sample,
//! marking and renderer settings. Every section uses `#[serde(default)]`,
//! so a preset only has to name what it overrides.

mod camera;
mod passes;
mod renderer;

use std::path::Path;

pub use camera::CameraProps;
pub use passes::{MarkingProps, MultiSampleMode, MultiSampleProps, PickingProps, TransparencyMode};
pub use renderer::RendererProps;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::CanvasError;
use crate::scene::OpacityWeights;

/// Top-level canvas options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct Canvas3DProps {
    /// Camera projection and framing.
    pub camera: CameraProps,
    /// Duration of automatic camera resets.
    #[schemars(title = "Camera Reset Duration (ms)", range(min = 0.0, max = 1000.0))]
    pub camera_reset_duration_ms: f64,
    /// Scale applied to the scene radius when framing.
    #[schemars(skip)]
    pub scene_radius_factor: f32,
    /// Transparency technique.
    pub transparency: TransparencyMode,
    /// Peeling iterations for [`TransparencyMode::Dpoit`].
    #[schemars(title = "DPOIT Iterations", range(min = 1, max = 10))]
    pub dpoit_iterations: u32,
    /// Pick buffer settings.
    pub picking: PickingProps,
    /// Anti-aliasing schedule.
    pub multi_sample: MultiSampleProps,
    /// Highlight/select edges.
    pub marking: MarkingProps,
    /// Global uniform values.
    pub renderer: RendererProps,
    /// Opacity discounts for softly blended geometry.
    #[schemars(skip)]
    pub opacity_weights: OpacityWeights,
    /// Commit time budget per non-synchronous tick.
    #[schemars(skip)]
    pub commit_timeout_ms: f64,
}

impl Default for Canvas3DProps {
    fn default() -> Self {
        Self {
            camera: CameraProps::default(),
            camera_reset_duration_ms: 250.0,
            scene_radius_factor: 1.0,
            transparency: TransparencyMode::default(),
            dpoit_iterations: 2,
            picking: PickingProps::default(),
            multi_sample: MultiSampleProps::default(),
            marking: MarkingProps::default(),
            renderer: RendererProps::default(),
            opacity_weights: OpacityWeights::default(),
            commit_timeout_ms: 250.0,
        }
    }
}

impl Canvas3DProps {
    /// Generate JSON Schema describing the UI-exposed options.
    #[must_use]
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(Canvas3DProps)
    }

    /// Load options from a TOML file. Missing fields use defaults.
    ///
    /// # Errors
    ///
    /// I/O failures and malformed TOML.
    pub fn load(path: &Path) -> Result<Self, CanvasError> {
        let content = std::fs::read_to_string(path).map_err(CanvasError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse options from TOML text.
    ///
    /// # Errors
    ///
    /// Malformed TOML.
    pub fn from_toml(content: &str) -> Result<Self, CanvasError> {
        toml::from_str(content).map_err(|e| CanvasError::OptionsParse(e.to_string()))
    }

    /// Save options to a TOML file (pretty-printed).
    ///
    /// # Errors
    ///
    /// I/O and serialization failures.
    pub fn save(&self, path: &Path) -> Result<(), CanvasError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| CanvasError::OptionsParse(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(CanvasError::Io)?;
        }
        std::fs::write(path, content).map_err(CanvasError::Io)
    }

    /// Copy with one field replaced, as sent by an options panel: `section`
    /// names a nested struct (empty for a top-level field) and `value` is
    /// its JSON value.
    ///
    /// # Errors
    ///
    /// [`CanvasError::OptionsParse`] for an unknown section or a value of
    /// the wrong shape.
    pub fn with_option(
        &self,
        section: &str,
        field: &str,
        value: serde_json::Value,
    ) -> Result<Self, CanvasError> {
        let parse = |e: serde_json::Error| CanvasError::OptionsParse(e.to_string());
        let mut root = serde_json::to_value(self).map_err(parse)?;
        let target = if section.is_empty() {
            Some(&mut root)
        } else {
            root.get_mut(section)
        };
        let Some(serde_json::Value::Object(map)) = target else {
            return Err(CanvasError::OptionsParse(format!("unknown section `{section}`")));
        };
        let _ = map.insert(field.to_owned(), value);
        serde_json::from_value(root).map_err(parse)
    }

    /// List available preset names (TOML file stems) in a directory.
    #[must_use]
    pub fn list_presets(dir: &Path) -> Vec<String> {
        let mut names = Vec::new();
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        names.push(stem.to_owned());
                    }
                }
            }
        }
        names.sort();
        names
    }
}
