//! wgpu implementation of [`GpuContext`].
//!
//! State setters and draws are recorded and encoded into render passes on
//! [`flush`](GpuContext::flush): consecutive commands for one target share a
//! pass, and a clear starts a new pass with clear load ops. Pipelines are
//! cached per (program, draw state, target shape). Global uniforms live in a
//! single buffer and are selected per draw with a dynamic offset.

use std::borrow::Cow;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;

use super::context::{
    check_render_target, check_texture_size, Attachment, BufferId, BufferUsage, DrawCall,
    DrawState, FenceId, GpuCapabilities, GpuContext, ProgramDescriptor, ProgramId,
    RenderTargetDescriptor, RenderTargetId, TextureBinding, MAX_GLOBALS_SIZE,
};
use super::dynamic_buffer::{DynamicBuffer, UniformArena};
use super::pipeline_helpers::{self, PipelineInputs};
use super::texture::{wgpu_format, RenderTarget};
use crate::error::CanvasError;
use crate::math::Viewport;

/// Errors that can occur during GPU context initialization.
#[derive(Debug)]
pub enum RenderContextError {
    /// Failed to create a wgpu surface from the window handle.
    SurfaceCreation(wgpu::CreateSurfaceError),
    /// No compatible GPU adapter found.
    AdapterRequest(wgpu::RequestAdapterError),
    /// GPU device request failed (limits or features not met).
    DeviceRequest(wgpu::RequestDeviceError),
    /// Surface configuration not supported by the selected adapter.
    UnsupportedSurface,
}

impl fmt::Display for RenderContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SurfaceCreation(e) => {
                write!(f, "surface creation failed: {e}")
            }
            Self::AdapterRequest(e) => {
                write!(f, "no compatible GPU adapter found: {e}")
            }
            Self::DeviceRequest(e) => write!(f, "device request failed: {e}"),
            Self::UnsupportedSurface => {
                write!(f, "surface configuration not supported by adapter")
            }
        }
    }
}

impl std::error::Error for RenderContextError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SurfaceCreation(e) => Some(e),
            Self::AdapterRequest(e) => Some(e),
            Self::DeviceRequest(e) => Some(e),
            Self::UnsupportedSurface => None,
        }
    }
}

struct Program {
    desc: ProgramDescriptor,
    shader: wgpu::ShaderModule,
    draw_layout: wgpu::BindGroupLayout,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    state: DrawState,
    formats: Vec<wgpu::TextureFormat>,
    depth: bool,
}

#[derive(Debug, Clone)]
struct RecordedDraw {
    target: Option<RenderTargetId>,
    viewport: Viewport,
    scissor: Option<Viewport>,
    state: DrawState,
    program: ProgramId,
    globals_offset: u32,
    vertex_buffers: Vec<BufferId>,
    index_buffer: Option<BufferId>,
    uniform_buffer: Option<BufferId>,
    textures: Vec<TextureBinding>,
    count: u32,
    instance_count: u32,
    first_instance: u32,
}

#[derive(Debug, Clone)]
enum Recorded {
    Clear {
        target: Option<RenderTargetId>,
        color: Option<[f32; 4]>,
        depth: Option<f32>,
    },
    Draw(RecordedDraw),
}

impl Recorded {
    fn target(&self) -> Option<RenderTargetId> {
        match self {
            Self::Clear { target, .. } => *target,
            Self::Draw(d) => d.target,
        }
    }
}

/// Owns the core wgpu resources and implements [`GpuContext`] on them.
pub struct WgpuContext {
    /// The wgpu logical device.
    pub device: wgpu::Device,
    /// The wgpu command queue.
    pub queue: wgpu::Queue,
    /// The window surface for presentation (`None` in texture-only mode).
    pub surface: Option<wgpu::Surface<'static>>,
    /// Current surface configuration (format, size, present mode).
    pub config: wgpu::SurfaceConfiguration,
    caps: GpuCapabilities,
    lost: Arc<AtomicBool>,
    pixel_ratio: f32,
    drawing_buffer: RenderTarget,
    targets: FxHashMap<u32, RenderTarget>,
    programs: FxHashMap<u32, Program>,
    buffers: FxHashMap<u32, wgpu::Buffer>,
    fences: FxHashMap<u32, Arc<AtomicBool>>,
    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
    globals_layout: wgpu::BindGroupLayout,
    globals_buffer: DynamicBuffer,
    globals_bind_group: wgpu::BindGroup,
    arena: UniformArena,
    current_globals: Option<u32>,
    commands: Vec<Recorded>,
    next_id: u32,
    bound: Option<RenderTargetId>,
    viewport: Viewport,
    scissor: Option<Viewport>,
    state: DrawState,
}

impl WgpuContext {
    /// Create a context presenting to the given window surface target.
    ///
    /// # Errors
    ///
    /// Returns `RenderContextError` if surface creation, adapter request,
    /// device request, or surface configuration fails.
    pub async fn new(
        window: impl Into<wgpu::SurfaceTarget<'static>>,
        initial_size: (u32, u32),
    ) -> Result<Self, RenderContextError> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window)
            .map_err(RenderContextError::SurfaceCreation)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                compatible_surface: Some(&surface),
                power_preference: wgpu::PowerPreference::HighPerformance,
                ..Default::default()
            })
            .await
            .map_err(RenderContextError::AdapterRequest)?;

        let (device, queue) = request_device(&adapter).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        if !surface_caps.usages.contains(wgpu::TextureUsages::COPY_DST) {
            return Err(RenderContextError::UnsupportedSurface);
        }
        let mut config = surface
            .get_default_config(&adapter, initial_size.0, initial_size.1)
            .ok_or(RenderContextError::UnsupportedSurface)?;
        config.width = initial_size.0.max(1);
        config.height = initial_size.1.max(1);
        config.usage |= wgpu::TextureUsages::COPY_DST;
        config.present_mode = wgpu::PresentMode::Fifo;

        surface.configure(&device, &config);
        log::info!(
            "wgpu context ready ({:?}, {}x{})",
            config.format,
            config.width,
            config.height
        );

        Ok(Self::assemble(device, queue, Some(surface), config))
    }

    /// Create a context without a surface, rendering into an owned
    /// drawing buffer only.
    ///
    /// # Errors
    ///
    /// Returns `RenderContextError` if adapter or device request fails.
    pub async fn new_offscreen(width: u32, height: u32) -> Result<Self, RenderContextError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                ..Default::default()
            })
            .await
            .map_err(RenderContextError::AdapterRequest)?;
        let (device, queue) = request_device(&adapter).await?;
        log::info!("offscreen wgpu context ready ({width}x{height})");
        Ok(Self::from_device(
            device,
            queue,
            wgpu::TextureFormat::Rgba8Unorm,
            width,
            height,
        ))
    }

    /// Create a context from an externally-owned device and queue
    /// (no surface, for texture-only or embedded rendering).
    #[must_use]
    pub fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
        };
        Self::assemble(device, queue, None, config)
    }

    fn assemble(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface: Option<wgpu::Surface<'static>>,
        config: wgpu::SurfaceConfiguration,
    ) -> Self {
        let limits = device.limits();
        let caps = GpuCapabilities {
            multi_render_targets: limits.max_color_attachments > 1,
            float_textures: true,
            depth_textures: true,
            fence_sync: true,
            max_texture_size: limits.max_texture_dimension_2d,
            max_draw_buffers: limits.max_color_attachments,
        };

        let lost = Arc::new(AtomicBool::new(false));
        let lost_flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::info!("wgpu device lost ({reason:?}): {message}");
            lost_flag.store(true, Ordering::SeqCst);
        });

        let arena = UniformArena::new(
            MAX_GLOBALS_SIZE,
            limits.min_uniform_buffer_offset_alignment as usize,
        );
        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Globals Layout"),
            entries: &[pipeline_helpers::dynamic_uniform_buffer(0)],
        });
        let globals_buffer = DynamicBuffer::new(
            &device,
            "Globals",
            arena.stride() * 64,
            wgpu::BufferUsages::UNIFORM,
        );
        let globals_bind_group =
            globals_bind_group(&device, &globals_layout, &globals_buffer, arena.block_size());

        let drawing_buffer = RenderTarget::new(
            &device,
            "Drawing Buffer",
            config.width,
            config.height,
            &[config.format],
            true,
        );

        Self {
            device,
            queue,
            surface,
            viewport: Viewport::new(0, 0, config.width, config.height),
            config,
            caps,
            lost,
            pixel_ratio: 1.0,
            drawing_buffer,
            targets: FxHashMap::default(),
            programs: FxHashMap::default(),
            buffers: FxHashMap::default(),
            fences: FxHashMap::default(),
            pipelines: FxHashMap::default(),
            globals_layout,
            globals_buffer,
            globals_bind_group,
            arena,
            current_globals: None,
            commands: Vec::new(),
            next_id: 1,
            bound: None,
            scissor: None,
            state: DrawState::default(),
        }
    }

    /// Set the reported pixel ratio (window DPI scale).
    pub fn set_pixel_ratio(&mut self, ratio: f32) {
        self.pixel_ratio = ratio.max(f32::EPSILON);
    }

    /// Returns `true` if this context has a presentation surface.
    #[must_use]
    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    /// The default drawing buffer's color texture, for hosts that composite
    /// it themselves.
    #[must_use]
    pub fn drawing_buffer_view(&self) -> Option<&wgpu::TextureView> {
        self.drawing_buffer.color.first().map(|t| &t.view)
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn target_ref(&self, id: Option<RenderTargetId>) -> Option<&RenderTarget> {
        match id {
            None => Some(&self.drawing_buffer),
            Some(id) => self.targets.get(&id.0),
        }
    }

    fn ensure_pipeline(&mut self, draw: &RecordedDraw) -> Option<PipelineKey> {
        let (formats, depth) = {
            let target = self.target_ref(draw.target)?;
            (target.color_formats(), target.depth.is_some())
        };
        let key = PipelineKey {
            program: draw.program,
            state: draw.state,
            formats,
            depth,
        };
        if !self.pipelines.contains_key(&key) {
            let program = self.programs.get(&draw.program.0)?;
            let pipeline = pipeline_helpers::create_program_pipeline(
                &self.device,
                &PipelineInputs {
                    desc: &program.desc,
                    shader: &program.shader,
                    layouts: [&self.globals_layout, &program.draw_layout],
                    color_formats: &key.formats,
                    has_depth: key.depth,
                    state: &key.state,
                },
            );
            let _ = self.pipelines.insert(key.clone(), pipeline);
        }
        Some(key)
    }

    fn upload_globals(&mut self) {
        if self.arena.is_empty() {
            return;
        }
        if self
            .globals_buffer
            .write_bytes(&self.device, &self.queue, self.arena.bytes())
        {
            self.globals_bind_group = globals_bind_group(
                &self.device,
                &self.globals_layout,
                &self.globals_buffer,
                self.arena.block_size(),
            );
        }
    }

    fn draw_bind_group(&self, draw: &RecordedDraw) -> Option<wgpu::BindGroup> {
        let program = self.programs.get(&draw.program.0)?;
        let mut entries = Vec::with_capacity(draw.textures.len() + 1);
        if program.desc.uniform_buffer {
            let buffer = self.buffers.get(&draw.uniform_buffer?.0)?;
            entries.push(wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            });
        }
        for (i, tex) in draw.textures.iter().enumerate() {
            let target = self.targets.get(&tex.target.0)?;
            let view = match tex.attachment {
                Attachment::Color(index) => &target.color.get(index as usize)?.view,
                Attachment::Depth => &target.depth.as_ref()?.view,
            };
            entries.push(wgpu::BindGroupEntry {
                binding: i as u32 + 1,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&program.desc.label),
            layout: &program.draw_layout,
            entries: &entries,
        }))
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target_id: Option<RenderTargetId>,
        clear: (Option<[f32; 4]>, Option<f32>),
        draws: &[(&RecordedDraw, PipelineKey)],
    ) {
        let Some(target) = self.target_ref(target_id) else {
            log::warn!("skipping pass for released render target {target_id:?}");
            return;
        };
        let color_load = |c: Option<[f32; 4]>| match c {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: f64::from(r),
                g: f64::from(g),
                b: f64::from(b),
                a: f64::from(a),
            }),
            None => wgpu::LoadOp::Load,
        };
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment<'_>>> = target
            .color
            .iter()
            .map(|tex| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &tex.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load(clear.0),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();
        let depth_attachment =
            target
                .depth
                .as_ref()
                .map(|depth| wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: clear.1.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(target.label),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth_attachment,
            ..Default::default()
        });

        for (draw, key) in draws {
            let (Some(pipeline), Some(bind_group)) =
                (self.pipelines.get(key), self.draw_bind_group(draw))
            else {
                log::warn!("skipping draw with unresolved resources");
                continue;
            };
            let vp = clamp_rect(draw.viewport, target.width, target.height);
            if vp.is_empty() {
                continue;
            }
            pass.set_viewport(
                vp.x as f32,
                vp.y as f32,
                vp.width as f32,
                vp.height as f32,
                0.0,
                1.0,
            );
            let scissor = clamp_rect(
                draw.scissor
                    .unwrap_or(Viewport::new(0, 0, target.width, target.height)),
                target.width,
                target.height,
            );
            pass.set_scissor_rect(scissor.x, scissor.y, scissor.width, scissor.height);
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.globals_bind_group, &[draw.globals_offset]);
            pass.set_bind_group(1, &bind_group, &[]);
            for (slot, id) in draw.vertex_buffers.iter().enumerate() {
                if let Some(buffer) = self.buffers.get(&id.0) {
                    pass.set_vertex_buffer(slot as u32, buffer.slice(..));
                }
            }
            let instances = draw.first_instance..draw.first_instance + draw.instance_count;
            match draw.index_buffer.and_then(|id| self.buffers.get(&id.0)) {
                Some(index) => {
                    pass.set_index_buffer(index.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..draw.count, 0, instances);
                }
                None => pass.draw(0..draw.count, instances),
            }
        }
    }

    fn present(&self, encoder: &mut wgpu::CommandEncoder) -> Option<wgpu::SurfaceTexture> {
        let surface = self.surface.as_ref()?;
        let frame = match surface.get_current_texture() {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("surface frame unavailable: {e}");
                return None;
            }
        };
        let color = self.drawing_buffer.color.first()?;
        encoder.copy_texture_to_texture(
            color.texture.as_image_copy(),
            frame.texture.as_image_copy(),
            wgpu::Extent3d {
                width: self.config.width.min(frame.texture.width()),
                height: self.config.height.min(frame.texture.height()),
                depth_or_array_layers: 1,
            },
        );
        Some(frame)
    }

    fn submit_recorded(&mut self, present: bool) {
        self.upload_globals();
        let commands = std::mem::take(&mut self.commands);

        let mut keys = Vec::with_capacity(commands.len());
        for cmd in &commands {
            keys.push(match cmd {
                Recorded::Draw(d) => self.ensure_pipeline(d),
                Recorded::Clear { .. } => None,
            });
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        let mut i = 0;
        while i < commands.len() {
            let target = commands[i].target();
            let mut clear = (None, None);
            while let Some(Recorded::Clear { target: t, color, depth }) = commands.get(i) {
                if *t != target {
                    break;
                }
                clear.0 = color.or(clear.0);
                clear.1 = depth.or(clear.1);
                i += 1;
            }
            let mut draws = Vec::new();
            while let Some(Recorded::Draw(d)) = commands.get(i) {
                if d.target != target {
                    break;
                }
                if let Some(key) = keys[i].clone() {
                    draws.push((d, key));
                }
                i += 1;
            }
            self.encode_pass(&mut encoder, target, clear, &draws);
        }

        let frame = if present { self.present(&mut encoder) } else { None };
        let _ = self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(frame) = frame {
            frame.present();
        }
        self.arena.reset();
        self.current_globals = None;
    }
}

async fn request_device(
    adapter: &wgpu::Adapter,
) -> Result<(wgpu::Device, wgpu::Queue), RenderContextError> {
    adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("Primary Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            ..Default::default()
        })
        .await
        .map_err(RenderContextError::DeviceRequest)
}

fn globals_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &DynamicBuffer,
    block_size: usize,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Globals Bind Group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: buffer.buffer(),
                offset: 0,
                size: NonZeroU64::new(block_size as u64),
            }),
        }],
    })
}

fn clamp_rect(rect: Viewport, width: u32, height: u32) -> Viewport {
    let x = rect.x.min(width);
    let y = rect.y.min(height);
    Viewport::new(
        x,
        y,
        rect.width.min(width - x),
        rect.height.min(height - y),
    )
}

impl GpuContext for WgpuContext {
    fn capabilities(&self) -> &GpuCapabilities {
        &self.caps
    }

    fn is_context_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn set_drawing_buffer_size(&mut self, width: u32, height: u32) -> Result<(), CanvasError> {
        check_texture_size(&self.caps, width, height)?;
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.submit_recorded(false);
        self.config.width = width;
        self.config.height = height;
        if let Some(ref surface) = self.surface {
            surface.configure(&self.device, &self.config);
        }
        self.drawing_buffer.resize(&self.device, width, height);
        Ok(())
    }

    fn create_render_target(
        &mut self,
        desc: &RenderTargetDescriptor,
    ) -> Result<RenderTargetId, CanvasError> {
        check_render_target(&self.caps, desc)?;
        let formats: Vec<_> = desc.color.iter().map(|f| wgpu_format(*f)).collect();
        let target = RenderTarget::new(
            &self.device,
            desc.label,
            desc.width,
            desc.height,
            &formats,
            desc.depth,
        );
        let id = self.alloc_id();
        let _ = self.targets.insert(id, target);
        Ok(RenderTargetId(id))
    }

    fn resize_render_target(
        &mut self,
        id: RenderTargetId,
        width: u32,
        height: u32,
    ) -> Result<(), CanvasError> {
        check_texture_size(&self.caps, width, height)?;
        if !self.targets.contains_key(&id.0) {
            return Err(CanvasError::UnknownResource("render target", id.0));
        }
        self.submit_recorded(false);
        if let Some(target) = self.targets.get_mut(&id.0) {
            target.resize(&self.device, width, height);
        }
        Ok(())
    }

    fn destroy_render_target(&mut self, id: RenderTargetId) {
        self.submit_recorded(false);
        let _ = self.targets.remove(&id.0);
        if self.bound == Some(id) {
            self.bound = None;
        }
    }

    fn bind_render_target(&mut self, target: Option<RenderTargetId>) {
        self.bound = target;
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

    /// Clears always cover the whole bound target on this backend.
    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>) {
        self.commands.push(Recorded::Clear {
            target: self.bound,
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
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&desc.label),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(desc.source.clone())),
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(CanvasError::Program(format!("{}: {err}", desc.label)));
        }
        let draw_layout = pipeline_helpers::draw_bind_group_layout(&self.device, desc);
        let id = self.alloc_id();
        let _ = self.programs.insert(
            id,
            Program {
                desc: desc.clone(),
                shader,
                draw_layout,
            },
        );
        Ok(ProgramId(id))
    }

    fn use_program(&mut self, _program: ProgramId) {
        self.current_globals = None;
    }

    fn set_globals(&mut self, data: &[u8]) {
        self.current_globals = Some(self.arena.push(data));
    }

    fn create_buffer(&mut self, usage: BufferUsage, data: &[u8]) -> BufferId {
        let usage = match usage {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Index => wgpu::BufferUsages::INDEX,
            BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM,
        } | wgpu::BufferUsages::COPY_DST;
        let mut contents = data.to_vec();
        contents.resize(data.len().max(4).next_multiple_of(4), 0);
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Renderable Buffer"),
                contents: &contents,
                usage,
            });
        let id = self.alloc_id();
        let _ = self.buffers.insert(id, buffer);
        BufferId(id)
    }

    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), CanvasError> {
        let buffer = self
            .buffers
            .get(&id.0)
            .ok_or(CanvasError::UnknownResource("buffer", id.0))?;
        self.queue.write_buffer(buffer, offset, data);
        Ok(())
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        self.submit_recorded(false);
        if let Some(buffer) = self.buffers.remove(&id.0) {
            buffer.destroy();
        }
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), CanvasError> {
        if !self.programs.contains_key(&call.program.0) {
            return Err(CanvasError::UnknownResource("program", call.program.0));
        }
        let globals_offset = match self.current_globals {
            Some(offset) => offset,
            None => {
                let offset = self.arena.push(&[]);
                self.current_globals = Some(offset);
                offset
            }
        };
        self.commands.push(Recorded::Draw(RecordedDraw {
            target: self.bound,
            viewport: self.viewport,
            scissor: self.scissor,
            state: self.state,
            program: call.program,
            globals_offset,
            vertex_buffers: call.vertex_buffers.to_vec(),
            index_buffer: call.index_buffer,
            uniform_buffer: call.uniform_buffer,
            textures: call.textures.to_vec(),
            count: call.count,
            instance_count: call.instance_count,
            first_instance: call.first_instance,
        }));
        Ok(())
    }

    fn write_pixels(
        &mut self,
        target: RenderTargetId,
        attachment: u32,
        rect: Viewport,
        rgba: &[u8],
    ) -> Result<(), CanvasError> {
        self.submit_recorded(false);
        let texture = self
            .targets
            .get(&target.0)
            .and_then(|t| t.color.get(attachment as usize))
            .ok_or(CanvasError::UnknownResource("render target", target.0))?;
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x,
                    y: rect.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(rect.width * 4),
                rows_per_image: Some(rect.height),
            },
            wgpu::Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn read_pixels(
        &mut self,
        target: RenderTargetId,
        attachment: u32,
        rect: Viewport,
        out: &mut [u8],
    ) -> Result<(), CanvasError> {
        let row_bytes = rect.width * 4;
        let needed = (row_bytes * rect.height) as usize;
        if out.len() < needed {
            return Err(CanvasError::ReadPixels(format!(
                "output holds {} bytes, {needed} needed",
                out.len()
            )));
        }
        if rect.is_empty() {
            return Ok(());
        }
        self.submit_recorded(false);

        let texture = self
            .targets
            .get(&target.0)
            .and_then(|t| t.color.get(attachment as usize))
            .ok_or(CanvasError::UnknownResource("render target", target.0))?;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = row_bytes.div_ceil(align) * align;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size: u64::from(padded * rect.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x,
                    y: rect.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(rect.height),
                },
            },
            wgpu::Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );
        let _ = self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::PollType::Wait);
        match receiver.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(CanvasError::ReadPixels(e.to_string())),
            Err(e) => return Err(CanvasError::ReadPixels(e.to_string())),
        }
        {
            let data = slice.get_mapped_range();
            for row in 0..rect.height as usize {
                let src = row * padded as usize;
                let dst = row * row_bytes as usize;
                out[dst..dst + row_bytes as usize]
                    .copy_from_slice(&data[src..src + row_bytes as usize]);
            }
        }
        staging.unmap();
        Ok(())
    }

    fn flush(&mut self) {
        self.submit_recorded(true);
    }

    fn create_fence(&mut self) -> Option<FenceId> {
        let done = Arc::new(AtomicBool::new(false));
        let signal = Arc::clone(&done);
        self.queue.on_submitted_work_done(move || {
            signal.store(true, Ordering::SeqCst);
        });
        let id = self.alloc_id();
        let _ = self.fences.insert(id, done);
        Some(FenceId(id))
    }

    fn is_fence_signaled(&mut self, fence: FenceId) -> bool {
        let _ = self.device.poll(wgpu::PollType::Poll);
        self.fences
            .get(&fence.0)
            .is_none_or(|done| done.load(Ordering::SeqCst))
    }

    fn delete_fence(&mut self, fence: FenceId) {
        let _ = self.fences.remove(&fence.0);
    }
}
