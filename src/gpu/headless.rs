//! CPU-side [`GpuContext`] backend.
//!
//! Keeps RGBA8 color attachments in memory, applies clears and pixel uploads
//! to them, and records every command together with the state it ran under.
//! No rasterization happens: draws are only logged. Used for tests, for
//! benchmarking the orchestration without a device, and for hosts that only
//! need scene bookkeeping.

use rustc_hash::FxHashMap;

use super::context::{
    check_render_target, check_texture_size, color_to_rgba8, BufferId, BufferUsage, DrawCall,
    DrawState, FenceId, GpuCapabilities, GpuContext, ProgramDescriptor, ProgramId,
    RenderTargetDescriptor, RenderTargetId,
};
use crate::error::CanvasError;
use crate::math::Viewport;

/// A command as observed by the headless backend.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    /// Render target binding changed.
    BindTarget(Option<RenderTargetId>),
    /// Clear of the bound target.
    Clear {
        /// Cleared target.
        target: Option<RenderTargetId>,
        /// Clear color, if colors were cleared.
        color: Option<[f32; 4]>,
        /// Clear depth, if depth was cleared.
        depth: Option<f32>,
    },
    /// Program switch.
    UseProgram(ProgramId),
    /// Global uniform upload.
    SetGlobals,
    /// A draw.
    Draw {
        /// Program drawn with.
        program: ProgramId,
        /// Target drawn into.
        target: Option<RenderTargetId>,
        /// Viewport at draw time.
        viewport: Viewport,
        /// State at draw time.
        state: DrawState,
        /// Instances drawn.
        instance_count: u32,
    },
    /// Pixel readback.
    ReadPixels {
        /// Source target.
        target: RenderTargetId,
        /// Rectangle read.
        rect: Viewport,
    },
    /// Work submitted.
    Flush,
}

#[derive(Debug, Clone)]
struct Target {
    width: u32,
    height: u32,
    color: Vec<Vec<u8>>,
    depth: Option<Vec<f32>>,
}

impl Target {
    fn new(width: u32, height: u32, attachments: usize, depth: bool) -> Self {
        let len = (width * height) as usize;
        Self {
            width,
            height,
            color: vec![vec![0; len * 4]; attachments],
            depth: depth.then(|| vec![1.0; len]),
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        *self = Self::new(width, height, self.color.len(), self.depth.is_some());
    }

    /// Intersection of `rect` with the target bounds.
    fn clip(&self, rect: Viewport) -> Viewport {
        let x0 = rect.x.min(self.width);
        let y0 = rect.y.min(self.height);
        let x1 = (rect.x + rect.width).min(self.width);
        let y1 = (rect.y + rect.height).min(self.height);
        Viewport::new(x0, y0, x1 - x0, y1 - y0)
    }

    fn clear(&mut self, rect: Viewport, color: Option<[u8; 4]>, depth: Option<f32>) {
        let rect = self.clip(rect);
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                let i = (y * self.width + x) as usize;
                if let Some(rgba) = color {
                    for att in &mut self.color {
                        att[i * 4..i * 4 + 4].copy_from_slice(&rgba);
                    }
                }
                if let (Some(d), Some(buf)) = (depth, self.depth.as_mut()) {
                    buf[i] = d;
                }
            }
        }
    }
}

/// In-memory backend with a command log.
#[derive(Debug)]
pub struct HeadlessContext {
    caps: GpuCapabilities,
    lost: bool,
    pixel_ratio: f32,
    drawing_buffer: Target,
    targets: FxHashMap<u32, Target>,
    programs: FxHashMap<u32, String>,
    buffers: FxHashMap<u32, Vec<u8>>,
    fences: FxHashMap<u32, u32>,
    fence_latency: u32,
    next_id: u32,
    bound: Option<RenderTargetId>,
    viewport: Viewport,
    scissor: Option<Viewport>,
    state: DrawState,
    program: Option<ProgramId>,
    log: Vec<GpuCommand>,
}

impl HeadlessContext {
    /// Context with a `width`x`height` drawing buffer and default
    /// capabilities.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_capabilities(width, height, GpuCapabilities::default())
    }

    /// Context with explicit capabilities.
    #[must_use]
    pub fn with_capabilities(width: u32, height: u32, caps: GpuCapabilities) -> Self {
        Self {
            caps,
            lost: false,
            pixel_ratio: 1.0,
            drawing_buffer: Target::new(width, height, 1, true),
            targets: FxHashMap::default(),
            programs: FxHashMap::default(),
            buffers: FxHashMap::default(),
            fences: FxHashMap::default(),
            fence_latency: 0,
            next_id: 1,
            bound: None,
            viewport: Viewport::new(0, 0, width, height),
            scissor: None,
            state: DrawState::default(),
            program: None,
            log: Vec::new(),
        }
    }

    /// Set the reported pixel ratio.
    pub fn set_pixel_ratio(&mut self, ratio: f32) {
        self.pixel_ratio = ratio.max(f32::EPSILON);
    }

    /// Number of [`is_fence_signaled`](GpuContext::is_fence_signaled) polls
    /// a new fence stays unsignaled for.
    pub fn set_fence_latency(&mut self, polls: u32) {
        self.fence_latency = polls;
    }

    /// Simulate device loss.
    pub fn lose_context(&mut self) {
        log::info!("headless context lost");
        self.lost = true;
    }

    /// Simulate device restore. Like a real restore, every resource created
    /// before the loss is gone.
    pub fn restore_context(&mut self) {
        log::info!("headless context restored");
        self.lost = false;
        self.targets.clear();
        self.programs.clear();
        self.buffers.clear();
        self.fences.clear();
        self.bound = None;
        self.program = None;
        self.state = DrawState::default();
    }

    /// Recorded commands since the last [`take_log`](Self::take_log).
    #[must_use]
    pub fn log(&self) -> &[GpuCommand] {
        &self.log
    }

    /// Drain the command log.
    pub fn take_log(&mut self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.log)
    }

    /// Number of draws in the log.
    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.log
            .iter()
            .filter(|c| matches!(c, GpuCommand::Draw { .. }))
            .count()
    }

    /// Label of a registered program.
    #[must_use]
    pub fn program_label(&self, id: ProgramId) -> Option<&str> {
        self.programs.get(&id.0).map(String::as_str)
    }

    /// Number of live render targets.
    #[must_use]
    pub fn render_target_count(&self) -> usize {
        self.targets.len()
    }

    /// Size of a live render target.
    #[must_use]
    pub fn render_target_size(&self, id: RenderTargetId) -> Option<(u32, u32)> {
        self.targets.get(&id.0).map(|t| (t.width, t.height))
    }

    /// Contents of a live buffer.
    #[must_use]
    pub fn buffer_data(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(&id.0).map(Vec::as_slice)
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn bound_target_mut(&mut self) -> Option<&mut Target> {
        match self.bound {
            None => Some(&mut self.drawing_buffer),
            Some(id) => self.targets.get_mut(&id.0),
        }
    }

    fn target(&self, id: RenderTargetId) -> Result<&Target, CanvasError> {
        self.targets
            .get(&id.0)
            .ok_or(CanvasError::UnknownResource("render target", id.0))
    }
}

impl GpuContext for HeadlessContext {
    fn capabilities(&self) -> &GpuCapabilities {
        &self.caps
    }

    fn is_context_lost(&self) -> bool {
        self.lost
    }

    fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        (self.drawing_buffer.width, self.drawing_buffer.height)
    }

    fn set_drawing_buffer_size(&mut self, width: u32, height: u32) -> Result<(), CanvasError> {
        check_texture_size(&self.caps, width, height)?;
        self.drawing_buffer.resize(width, height);
        Ok(())
    }

    fn create_render_target(
        &mut self,
        desc: &RenderTargetDescriptor,
    ) -> Result<RenderTargetId, CanvasError> {
        check_render_target(&self.caps, desc)?;
        let id = self.alloc_id();
        let _ = self.targets.insert(
            id,
            Target::new(desc.width, desc.height, desc.color.len(), desc.depth),
        );
        Ok(RenderTargetId(id))
    }

    fn resize_render_target(
        &mut self,
        id: RenderTargetId,
        width: u32,
        height: u32,
    ) -> Result<(), CanvasError> {
        check_texture_size(&self.caps, width, height)?;
        let target = self
            .targets
            .get_mut(&id.0)
            .ok_or(CanvasError::UnknownResource("render target", id.0))?;
        target.resize(width, height);
        Ok(())
    }

    fn destroy_render_target(&mut self, id: RenderTargetId) {
        let _ = self.targets.remove(&id.0);
        if self.bound == Some(id) {
            self.bound = None;
        }
    }

    fn bind_render_target(&mut self, target: Option<RenderTargetId>) {
        self.bound = target;
        self.log.push(GpuCommand::BindTarget(target));
    }

    fn bound_render_target(&self) -> Option<RenderTargetId> {
        self.bound
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_scissor(&mut self, scissor: Option<Viewport>) {
        self.scissor = scissor;
    }

    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>) {
        let target = self.bound;
        let scissor = self.scissor;
        let rgba = color.map(color_to_rgba8);
        if let Some(t) = self.bound_target_mut() {
            let rect = scissor.unwrap_or(Viewport::new(0, 0, t.width, t.height));
            t.clear(rect, rgba, depth);
        }
        self.log.push(GpuCommand::Clear {
            target,
            color,
            depth,
        });
    }

    fn draw_state(&self) -> &DrawState {
        &self.state
    }

    fn draw_state_mut(&mut self) -> &mut DrawState {
        &mut self.state
    }

    fn register_program(&mut self, desc: &ProgramDescriptor) -> Result<ProgramId, CanvasError> {
        let id = self.alloc_id();
        let _ = self.programs.insert(id, desc.label.clone());
        Ok(ProgramId(id))
    }

    fn use_program(&mut self, program: ProgramId) {
        self.program = Some(program);
        self.log.push(GpuCommand::UseProgram(program));
    }

    fn set_globals(&mut self, _data: &[u8]) {
        self.log.push(GpuCommand::SetGlobals);
    }

    fn create_buffer(&mut self, _usage: BufferUsage, data: &[u8]) -> BufferId {
        let id = self.alloc_id();
        let _ = self.buffers.insert(id, data.to_vec());
        BufferId(id)
    }

    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), CanvasError> {
        let buf = self
            .buffers
            .get_mut(&id.0)
            .ok_or(CanvasError::UnknownResource("buffer", id.0))?;
        let start = offset as usize;
        if buf.len() < start + data.len() {
            buf.resize(start + data.len(), 0);
        }
        buf[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        let _ = self.buffers.remove(&id.0);
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), CanvasError> {
        if !self.programs.contains_key(&call.program.0) {
            return Err(CanvasError::UnknownResource("program", call.program.0));
        }
        for id in call
            .vertex_buffers
            .iter()
            .chain(call.index_buffer.iter())
            .chain(call.uniform_buffer.iter())
        {
            if !self.buffers.contains_key(&id.0) {
                return Err(CanvasError::UnknownResource("buffer", id.0));
            }
        }
        for tex in call.textures {
            let _ = self.target(tex.target)?;
        }
        self.log.push(GpuCommand::Draw {
            program: call.program,
            target: self.bound,
            viewport: self.viewport,
            state: self.state,
            instance_count: call.instance_count,
        });
        Ok(())
    }

    fn write_pixels(
        &mut self,
        target: RenderTargetId,
        attachment: u32,
        rect: Viewport,
        rgba: &[u8],
    ) -> Result<(), CanvasError> {
        let t = self
            .targets
            .get_mut(&target.0)
            .ok_or(CanvasError::UnknownResource("render target", target.0))?;
        let width = t.width;
        let clipped = t.clip(rect);
        let att = t
            .color
            .get_mut(attachment as usize)
            .ok_or(CanvasError::UnknownResource("attachment", attachment))?;
        for y in clipped.y..clipped.y + clipped.height {
            for x in clipped.x..clipped.x + clipped.width {
                let src = (((y - rect.y) * rect.width + (x - rect.x)) * 4) as usize;
                let dst = ((y * width + x) * 4) as usize;
                if let Some(px) = rgba.get(src..src + 4) {
                    att[dst..dst + 4].copy_from_slice(px);
                }
            }
        }
        Ok(())
    }

    fn read_pixels(
        &mut self,
        target: RenderTargetId,
        attachment: u32,
        rect: Viewport,
        out: &mut [u8],
    ) -> Result<(), CanvasError> {
        let t = self.target(target)?;
        let att = t
            .color
            .get(attachment as usize)
            .ok_or(CanvasError::UnknownResource("attachment", attachment))?;
        let needed = (rect.width * rect.height * 4) as usize;
        if out.len() < needed {
            return Err(CanvasError::ReadPixels(format!(
                "output holds {} bytes, {needed} needed",
                out.len()
            )));
        }
        if rect.x + rect.width > t.width || rect.y + rect.height > t.height {
            return Err(CanvasError::ReadPixels(format!(
                "rect {rect:?} outside {}x{} target",
                t.width, t.height
            )));
        }
        for row in 0..rect.height {
            let src = (((rect.y + row) * t.width + rect.x) * 4) as usize;
            let dst = (row * rect.width * 4) as usize;
            let len = (rect.width * 4) as usize;
            out[dst..dst + len].copy_from_slice(&att[src..src + len]);
        }
        self.log.push(GpuCommand::ReadPixels { target, rect });
        Ok(())
    }

    fn flush(&mut self) {
        self.log.push(GpuCommand::Flush);
    }

    fn create_fence(&mut self) -> Option<FenceId> {
        if !self.caps.fence_sync {
            return None;
        }
        let id = self.alloc_id();
        let _ = self.fences.insert(id, self.fence_latency);
        Some(FenceId(id))
    }

    fn is_fence_signaled(&mut self, fence: FenceId) -> bool {
        match self.fences.get_mut(&fence.0) {
            Some(0) | None => true,
            Some(remaining) => {
                *remaining -= 1;
                false
            }
        }
    }

    fn delete_fence(&mut self, fence: FenceId) {
        let _ = self.fences.remove(&fence.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::context::TextureFormat;

    #[test]
    fn clear_fills_every_attachment_inside_scissor() {
        let mut ctx = HeadlessContext::new(8, 8);
        let desc = RenderTargetDescriptor {
            label: "mrt",
            width: 4,
            height: 4,
            color: vec![TextureFormat::Rgba8; 2],
            depth: true,
        };
        let rt = ctx.create_render_target(&desc).unwrap_or(RenderTargetId(0));
        ctx.bind_render_target(Some(rt));
        ctx.clear(Some([1.0, 1.0, 1.0, 1.0]), Some(1.0));
        ctx.set_scissor(Some(Viewport::new(0, 0, 2, 4)));
        ctx.clear(Some([0.0, 0.0, 0.0, 0.0]), None);

        let mut px = [0u8; 16];
        for att in 0..2 {
            ctx.read_pixels(rt, att, Viewport::new(1, 2, 2, 1), &mut px[..8])
                .unwrap_or_default();
            assert_eq!(&px[..8], &[0, 0, 0, 0, 255, 255, 255, 255]);
        }
    }

    #[test]
    fn pixels_round_trip() {
        let mut ctx = HeadlessContext::new(8, 8);
        let rt = ctx
            .create_render_target(&RenderTargetDescriptor::rgba8("rt", 4, 4, false))
            .unwrap_or(RenderTargetId(0));
        let data: Vec<u8> = (0..16).collect();
        assert!(ctx
            .write_pixels(rt, 0, Viewport::new(2, 1, 2, 2), &data)
            .is_ok());
        let mut out = [0u8; 16];
        assert!(ctx
            .read_pixels(rt, 0, Viewport::new(2, 1, 2, 2), &mut out)
            .is_ok());
        assert_eq!(out.to_vec(), data);
    }

    #[test]
    fn restore_drops_resources() {
        let mut ctx = HeadlessContext::new(8, 8);
        let rt = ctx
            .create_render_target(&RenderTargetDescriptor::rgba8("rt", 4, 4, false))
            .unwrap_or(RenderTargetId(0));
        ctx.lose_context();
        assert!(ctx.is_context_lost());
        ctx.restore_context();
        assert!(!ctx.is_context_lost());
        let mut out = [0u8; 4];
        assert!(matches!(
            ctx.read_pixels(rt, 0, Viewport::new(0, 0, 1, 1), &mut out),
            Err(CanvasError::UnknownResource(..))
        ));
    }

    #[test]
    fn fence_signals_after_latency() {
        let mut ctx = HeadlessContext::new(1, 1);
        ctx.set_fence_latency(2);
        let fence = ctx.create_fence();
        assert!(fence.is_some());
        if let Some(f) = fence {
            assert!(!ctx.is_fence_signaled(f));
            assert!(!ctx.is_fence_signaled(f));
            assert!(ctx.is_fence_signaled(f));
        }
    }

    #[test]
    fn draws_with_unknown_program_fail() {
        let mut ctx = HeadlessContext::new(1, 1);
        let call = DrawCall {
            program: ProgramId(99),
            vertex_buffers: &[],
            index_buffer: None,
            uniform_buffer: None,
            textures: &[],
            count: 3,
            instance_count: 1,
            first_instance: 0,
        };
        assert!(ctx.draw(&call).is_err());
        assert_eq!(ctx.draw_count(), 0);
    }
}
