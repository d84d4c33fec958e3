//! Frame-level pass sequencing on top of the [`Renderer`](crate::renderer::Renderer).
//!
//! [`DrawPass`] orders the color, transparency, volume, marking and emissive
//! passes for one frame; [`MultiSamplePass`] repeats it with sub-pixel
//! jitter. Screen-space composition uses host-registered programs looked up
//! by [`CompositeKind`]; a missing program skips its compose step.

/// Per-frame color pass sequencing.
pub mod draw;
/// Jittered multi-sample accumulation.
pub mod multi_sample;

pub use draw::DrawPass;
pub use multi_sample::{jitter_offsets, MultiSamplePass};

use rustc_hash::FxHashMap;

use crate::error::CanvasError;
use crate::gpu::{
    BlendMode, BufferId, CullFace, DrawCall, GpuContext, ProgramId, RenderTargetId, TextureBinding,
};
use crate::math::Viewport;

/// Full-screen composition steps a host can supply programs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeKind {
    /// Resolve WBOIT accumulation and revealage over the opaque color.
    WboitResolve,
    /// Blend one peeling iteration's back color under the result.
    DpoitBlendBack,
    /// Blend the accumulated front color over the result.
    DpoitResolve,
    /// Outline marked geometry from the marking mask and depth.
    MarkingEdge,
    /// Add the emissive buffer.
    Emissive,
    /// Weighted add of one jittered sample into the accumulation buffer.
    Accumulate,
    /// Plain texture copy.
    Copy,
}

/// Programs registered per [`CompositeKind`].
#[derive(Debug, Clone, Default)]
pub struct CompositePrograms {
    programs: FxHashMap<CompositeKind, ProgramId>,
}

impl CompositePrograms {
    /// Use `program` for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: CompositeKind, program: ProgramId) {
        let _ = self.programs.insert(kind, program);
    }

    /// Program for `kind`, if registered.
    #[must_use]
    pub fn get(&self, kind: CompositeKind) -> Option<ProgramId> {
        self.programs.get(&kind).copied()
    }

    /// Forget every program, e.g. after context loss.
    pub fn clear(&mut self) {
        self.programs.clear();
    }
}

/// One full-screen composition draw.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ComposeStep<'a> {
    pub kind: CompositeKind,
    pub target: Option<RenderTargetId>,
    pub viewport: Viewport,
    pub blend: BlendMode,
    pub textures: &'a [TextureBinding],
    pub uniforms: Option<BufferId>,
}

/// Draw a full-screen triangle with the step's program. Returns whether
/// anything was drawn.
pub(crate) fn compose(
    ctx: &mut dyn GpuContext,
    programs: &CompositePrograms,
    step: &ComposeStep<'_>,
) -> Result<bool, CanvasError> {
    let Some(program) = programs.get(step.kind) else {
        log::trace!("no {:?} program, compose skipped", step.kind);
        return Ok(false);
    };
    ctx.bind_render_target(step.target);
    ctx.set_viewport(step.viewport);
    ctx.set_scissor(None);
    ctx.set_blend(step.blend);
    ctx.set_depth_test(false);
    ctx.set_depth_write(false);
    ctx.set_cull_face(CullFace::None);
    ctx.set_color_mask([true; 4]);
    ctx.use_program(program);
    ctx.draw(&DrawCall {
        program,
        vertex_buffers: &[],
        index_buffer: None,
        uniform_buffer: step.uniforms,
        textures: step.textures,
        count: 3,
        instance_count: 1,
        first_instance: 0,
    })?;
    Ok(true)
}
