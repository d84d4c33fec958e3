//! Capability contract between the rendering core and a GPU backend.
//!
//! The renderer, scene renderables and picking only talk to the GPU through
//! [`GpuContext`]: render targets with stable handles, bind/clear/draw,
//! fixed-function state setters, pixel readback and fence sync. Two
//! backends implement it, [`HeadlessContext`](super::headless::HeadlessContext)
//! and [`WgpuContext`](super::render_context::WgpuContext).

use crate::error::CanvasError;
use crate::math::Viewport;

/// Largest global uniform block a backend accepts in
/// [`GpuContext::set_globals`]; larger blocks are truncated.
pub const MAX_GLOBALS_SIZE: usize = 512;

/// Feature flags and limits reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuCapabilities {
    /// Fragment shaders can write several color attachments in one pass.
    pub multi_render_targets: bool,
    /// Float color attachments can be rendered to.
    pub float_textures: bool,
    /// Depth attachments can be sampled as textures.
    pub depth_textures: bool,
    /// Fence objects are available to observe GPU completion.
    pub fence_sync: bool,
    /// Largest texture dimension.
    pub max_texture_size: u32,
    /// Largest number of simultaneous color attachments.
    pub max_draw_buffers: u32,
}

impl Default for GpuCapabilities {
    fn default() -> Self {
        Self {
            multi_render_targets: true,
            float_textures: true,
            depth_textures: true,
            fence_sync: true,
            max_texture_size: 8192,
            max_draw_buffers: 8,
        }
    }
}

macro_rules! handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(
            /// Raw handle value.
            pub u32,
        );
    };
}

handle!(
    /// Off-screen render target owned by a context.
    RenderTargetId
);
handle!(
    /// Registered shader program.
    ProgramId
);
handle!(
    /// Vertex, index or uniform buffer.
    BufferId
);
handle!(
    /// Fence inserted after submitted GPU work.
    FenceId
);

/// Color attachment storage format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit normalized RGBA. The only readable format.
    Rgba8,
    /// Half-float RGBA.
    Rgba16Float,
    /// Full-float RGBA.
    Rgba32Float,
}

/// Shape of a render target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTargetDescriptor {
    /// Debug label.
    pub label: &'static str,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// One entry per color attachment.
    pub color: Vec<TextureFormat>,
    /// Whether a depth attachment is created.
    pub depth: bool,
}

impl RenderTargetDescriptor {
    /// Single RGBA8 attachment with optional depth.
    #[must_use]
    pub fn rgba8(label: &'static str, width: u32, height: u32, depth: bool) -> Self {
        Self {
            label,
            width,
            height,
            color: vec![TextureFormat::Rgba8],
            depth,
        }
    }
}

/// Attachment of a render target bound as a shader texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    /// Color attachment by index.
    Color(u32),
    /// The depth attachment.
    Depth,
}

/// Texture input of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureBinding {
    /// Render target providing the texture.
    pub target: RenderTargetId,
    /// Which of its attachments.
    pub attachment: Attachment,
}

/// Color blending presets covering every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Overwrite.
    #[default]
    Disabled,
    /// Premultiplied-alpha "over".
    Premultiplied,
    /// `src + dst` on every channel.
    Additive,
    /// Weighted blended OIT: additive accumulation on attachment 0,
    /// multiplicative revealage on attachment 1.
    Wboit,
    /// Component-wise max, used by depth peeling.
    Max,
}

/// Depth comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthFunc {
    /// Pass when closer.
    #[default]
    Less,
    /// Pass when closer or equal.
    LessEqual,
    /// Pass when farther.
    Greater,
    /// Pass when equal.
    Equal,
    /// Always pass.
    Always,
}

/// Which faces are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullFace {
    /// Keep both.
    #[default]
    None,
    /// Discard front faces.
    Front,
    /// Discard back faces.
    Back,
}

/// Winding that counts as front-facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    /// Counter-clockwise.
    #[default]
    Ccw,
    /// Clockwise.
    Cw,
}

/// Fixed-function pipeline state applied to subsequent draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawState {
    /// Blend preset.
    pub blend: BlendMode,
    /// Depth testing enabled.
    pub depth_test: bool,
    /// Depth writes enabled.
    pub depth_write: bool,
    /// Depth comparison.
    pub depth_func: DepthFunc,
    /// Face culling.
    pub cull: CullFace,
    /// Front-face winding.
    pub front_face: FrontFace,
    /// Per-channel color write mask.
    pub color_mask: [bool; 4],
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            blend: BlendMode::Disabled,
            depth_test: true,
            depth_write: true,
            depth_func: DepthFunc::Less,
            cull: CullFace::None,
            front_face: FrontFace::Ccw,
            color_mask: [true; 4],
        }
    }
}

/// One float vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader location.
    pub location: u32,
    /// Byte offset inside the vertex.
    pub offset: u32,
    /// Number of f32 components (1 to 4).
    pub components: u32,
}

/// Layout of one vertex buffer slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    /// Bytes between consecutive elements.
    pub stride: u32,
    /// Advance per instance instead of per vertex.
    pub per_instance: bool,
    /// Attributes read from this slot.
    pub attributes: Vec<VertexAttribute>,
}

/// Kind of texture a program samples at a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// Float color texture.
    Color,
    /// Depth texture.
    Depth,
}

/// Shader program source and interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDescriptor {
    /// Debug label.
    pub label: String,
    /// WGSL source with `vs_main` / `fs_main` entry points.
    pub source: String,
    /// Vertex buffer slots.
    pub vertex_layouts: Vec<VertexLayout>,
    /// Whether the program reads a per-draw uniform buffer at group 1,
    /// binding 0.
    pub uniform_buffer: bool,
    /// Textures at group 1, bindings 1 and up.
    pub textures: Vec<TextureKind>,
}

impl ProgramDescriptor {
    /// Program without vertex inputs (full-screen triangle or procedural).
    #[must_use]
    pub fn screen_space(label: &str, source: &str) -> Self {
        Self {
            label: label.to_owned(),
            source: source.to_owned(),
            vertex_layouts: Vec::new(),
            uniform_buffer: false,
            textures: Vec::new(),
        }
    }
}

/// Buffer role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Vertex attributes.
    Vertex,
    /// `u32` indices.
    Index,
    /// Per-draw uniforms.
    Uniform,
}

/// Everything a single draw needs besides the current state.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    /// Program to draw with; must be the one last passed to
    /// [`GpuContext::use_program`].
    pub program: ProgramId,
    /// Vertex buffer per layout slot.
    pub vertex_buffers: &'a [BufferId],
    /// Optional `u32` index buffer.
    pub index_buffer: Option<BufferId>,
    /// Optional per-draw uniform buffer.
    pub uniform_buffer: Option<BufferId>,
    /// Texture inputs in binding order.
    pub textures: &'a [TextureBinding],
    /// Vertex count, or index count when indexed.
    pub count: u32,
    /// Number of instances.
    pub instance_count: u32,
    /// First instance drawn.
    pub first_instance: u32,
}

/// The GPU abstraction consumed by the rendering core.
///
/// Setup-time failures are returned as [`CanvasError`]. Once
/// [`is_context_lost`](Self::is_context_lost) reports `true`, callers skip
/// all work until it reports `false` again, after which every resource
/// must be recreated.
pub trait GpuContext {
    /// Reported features and limits.
    fn capabilities(&self) -> &GpuCapabilities;

    /// Whether the device is currently lost.
    fn is_context_lost(&self) -> bool;

    /// Device pixels per CSS/logical pixel.
    fn pixel_ratio(&self) -> f32;

    /// Size of the default (presented) drawing buffer.
    fn drawing_buffer_size(&self) -> (u32, u32);

    /// Resize the default drawing buffer.
    ///
    /// # Errors
    ///
    /// [`CanvasError::TextureTooLarge`] if either side exceeds the limit.
    fn set_drawing_buffer_size(&mut self, width: u32, height: u32) -> Result<(), CanvasError>;

    /// Create an off-screen render target.
    ///
    /// # Errors
    ///
    /// [`CanvasError::TextureTooLarge`] if either side exceeds the limit,
    /// [`CanvasError::MissingCapability`] for float or multi-attachment
    /// targets the device cannot render to.
    fn create_render_target(
        &mut self,
        desc: &RenderTargetDescriptor,
    ) -> Result<RenderTargetId, CanvasError>;

    /// Resize a render target, discarding its contents.
    ///
    /// # Errors
    ///
    /// [`CanvasError::TextureTooLarge`] or [`CanvasError::UnknownResource`].
    fn resize_render_target(
        &mut self,
        id: RenderTargetId,
        width: u32,
        height: u32,
    ) -> Result<(), CanvasError>;

    /// Release a render target. Unknown handles are ignored.
    fn destroy_render_target(&mut self, id: RenderTargetId);

    /// Route subsequent clears and draws to `target`, or to the default
    /// drawing buffer for `None`.
    fn bind_render_target(&mut self, target: Option<RenderTargetId>);

    /// Currently bound target.
    fn bound_render_target(&self) -> Option<RenderTargetId>;

    /// Set the pixel rectangle draws map to.
    fn set_viewport(&mut self, viewport: Viewport);

    /// Current viewport.
    fn viewport(&self) -> Viewport;

    /// Restrict clears and draws to a rectangle, or lift the restriction.
    fn set_scissor(&mut self, scissor: Option<Viewport>);

    /// Clear color attachments and/or depth of the bound target.
    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>);

    /// Current fixed-function state.
    fn draw_state(&self) -> &DrawState;

    /// Mutable fixed-function state.
    fn draw_state_mut(&mut self) -> &mut DrawState;

    /// Compile and register a program.
    ///
    /// # Errors
    ///
    /// Backend-specific compilation failure.
    fn register_program(&mut self, desc: &ProgramDescriptor) -> Result<ProgramId, CanvasError>;

    /// Make `program` current for subsequent draws.
    fn use_program(&mut self, program: ProgramId);

    /// Upload the frame-global uniform block for the current program.
    fn set_globals(&mut self, data: &[u8]);

    /// Create a buffer initialized with `data`.
    fn create_buffer(&mut self, usage: BufferUsage, data: &[u8]) -> BufferId;

    /// Overwrite part of a buffer.
    ///
    /// # Errors
    ///
    /// [`CanvasError::UnknownResource`] for an unknown handle.
    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), CanvasError>;

    /// Release a buffer. Unknown handles are ignored.
    fn destroy_buffer(&mut self, id: BufferId);

    /// Record a draw with the current target, viewport and state.
    ///
    /// # Errors
    ///
    /// [`CanvasError::UnknownResource`] for unknown handles.
    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), CanvasError>;

    /// Upload RGBA8 pixels into a color attachment.
    ///
    /// # Errors
    ///
    /// [`CanvasError::UnknownResource`] for unknown handles or attachments.
    fn write_pixels(
        &mut self,
        target: RenderTargetId,
        attachment: u32,
        rect: Viewport,
        rgba: &[u8],
    ) -> Result<(), CanvasError>;

    /// Read RGBA8 pixels of a color attachment into `out`
    /// (`rect.width * rect.height * 4` bytes, rows top to bottom).
    ///
    /// # Errors
    ///
    /// [`CanvasError::UnknownResource`] or [`CanvasError::ReadPixels`].
    fn read_pixels(
        &mut self,
        target: RenderTargetId,
        attachment: u32,
        rect: Viewport,
        out: &mut [u8],
    ) -> Result<(), CanvasError>;

    /// Submit recorded work.
    fn flush(&mut self);

    /// Insert a fence after all submitted work, if supported.
    fn create_fence(&mut self) -> Option<FenceId>;

    /// Whether the GPU has passed the fence. Unknown fences count as
    /// signaled.
    fn is_fence_signaled(&mut self, fence: FenceId) -> bool;

    /// Release a fence.
    fn delete_fence(&mut self, fence: FenceId);

    /// Set the blend preset.
    fn set_blend(&mut self, blend: BlendMode) {
        self.draw_state_mut().blend = blend;
    }

    /// Enable or disable depth testing.
    fn set_depth_test(&mut self, enabled: bool) {
        self.draw_state_mut().depth_test = enabled;
    }

    /// Enable or disable depth writes.
    fn set_depth_write(&mut self, enabled: bool) {
        self.draw_state_mut().depth_write = enabled;
    }

    /// Set the depth comparison.
    fn set_depth_func(&mut self, func: DepthFunc) {
        self.draw_state_mut().depth_func = func;
    }

    /// Set face culling.
    fn set_cull_face(&mut self, cull: CullFace) {
        self.draw_state_mut().cull = cull;
    }

    /// Set the front-face winding.
    fn set_front_face(&mut self, front: FrontFace) {
        self.draw_state_mut().front_face = front;
    }

    /// Set the color write mask.
    fn set_color_mask(&mut self, mask: [bool; 4]) {
        self.draw_state_mut().color_mask = mask;
    }
}

/// Reject dimensions above the device limit.
///
/// # Errors
///
/// [`CanvasError::TextureTooLarge`] if either side exceeds `caps`.
pub fn check_texture_size(caps: &GpuCapabilities, width: u32, height: u32) -> Result<(), CanvasError> {
    let max = caps.max_texture_size;
    if width > max || height > max {
        return Err(CanvasError::TextureTooLarge { width, height, max });
    }
    Ok(())
}

/// Reject targets the device cannot render.
///
/// # Errors
///
/// [`CanvasError::MissingCapability`] or [`CanvasError::TextureTooLarge`].
pub fn check_render_target(
    caps: &GpuCapabilities,
    desc: &RenderTargetDescriptor,
) -> Result<(), CanvasError> {
    check_texture_size(caps, desc.width, desc.height)?;
    if desc.color.len() > 1 && !caps.multi_render_targets {
        return Err(CanvasError::MissingCapability("multiple render targets"));
    }
    if desc.color.len() as u32 > caps.max_draw_buffers {
        return Err(CanvasError::MissingCapability("draw buffer count"));
    }
    if desc.color.iter().any(|f| *f != TextureFormat::Rgba8) && !caps.float_textures {
        return Err(CanvasError::MissingCapability("float textures"));
    }
    Ok(())
}

/// Convert a `[0, 1]` color to RGBA8 bytes.
#[must_use]
pub fn color_to_rgba8(color: [f32; 4]) -> [u8; 4] {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_targets_are_rejected() {
        let caps = GpuCapabilities {
            max_texture_size: 1024,
            ..GpuCapabilities::default()
        };
        let desc = RenderTargetDescriptor::rgba8("t", 2048, 16, false);
        assert!(matches!(
            check_render_target(&caps, &desc),
            Err(CanvasError::TextureTooLarge { max: 1024, .. })
        ));
    }

    #[test]
    fn mrt_requires_capability() {
        let caps = GpuCapabilities {
            multi_render_targets: false,
            ..GpuCapabilities::default()
        };
        let desc = RenderTargetDescriptor {
            label: "mrt",
            width: 4,
            height: 4,
            color: vec![TextureFormat::Rgba8; 4],
            depth: true,
        };
        assert!(matches!(
            check_render_target(&caps, &desc),
            Err(CanvasError::MissingCapability(_))
        ));
    }

    #[test]
    fn color_conversion_rounds_and_clamps() {
        assert_eq!(color_to_rgba8([1.0, 0.5, -1.0, 2.0]), [255, 128, 0, 255]);
    }
}
