//! GPU abstraction layer.
//!
//! The rendering core depends only on the [`GpuContext`] capability trait.
//! [`HeadlessContext`] runs it on the CPU; [`WgpuContext`] drives a wgpu
//! device, with growable buffers, render-target textures and pipeline
//! helpers as its building blocks.

/// Capability trait, handles and fixed-function state types.
pub mod context;
/// Growable GPU buffers and the dynamic-offset uniform arena.
pub mod dynamic_buffer;
/// CPU backend with a command log.
pub mod headless;
/// Shared wgpu boilerplate for pipelines built from program descriptors.
pub mod pipeline_helpers;
/// wgpu device, surface and queue ownership plus the wgpu backend.
pub mod render_context;
/// wgpu render-target textures.
pub mod texture;

pub use context::{
    Attachment, BlendMode, BufferId, BufferUsage, CullFace, DepthFunc, DrawCall, DrawState,
    FenceId, FrontFace, GpuCapabilities, GpuContext, ProgramDescriptor, ProgramId,
    RenderTargetDescriptor, RenderTargetId, TextureBinding, TextureFormat, TextureKind,
    VertexAttribute, VertexLayout,
};
pub use headless::{GpuCommand, HeadlessContext};
pub use render_context::{RenderContextError, WgpuContext};
