//! Shared wgpu boilerplate for building pipelines from program descriptors.

use super::context::{
    BlendMode, CullFace, DepthFunc, DrawState, FrontFace, ProgramDescriptor, TextureKind,
};
use super::texture::DEPTH_FORMAT;

/// Vertex+fragment visible uniform buffer with a dynamic offset (globals).
pub fn dynamic_uniform_buffer(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: true,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Vertex+fragment visible uniform buffer binding.
pub fn uniform_buffer(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Fragment-visible, **non-filterable** float 2D texture binding.
pub fn texture_2d_unfilterable(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

/// Fragment-visible depth 2D texture binding.
pub fn depth_texture_2d(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Depth,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

/// Layout for per-draw inputs: optional uniform buffer at binding 0, then
/// textures from binding 1.
pub fn draw_bind_group_layout(
    device: &wgpu::Device,
    desc: &ProgramDescriptor,
) -> wgpu::BindGroupLayout {
    let mut entries = Vec::with_capacity(desc.textures.len() + 1);
    if desc.uniform_buffer {
        entries.push(uniform_buffer(0));
    }
    for (i, kind) in desc.textures.iter().enumerate() {
        let binding = i as u32 + 1;
        entries.push(match kind {
            TextureKind::Color => texture_2d_unfilterable(binding),
            TextureKind::Depth => depth_texture_2d(binding),
        });
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("{} Draw Layout", desc.label)),
        entries: &entries,
    })
}

/// Blend state of color attachment `index` under `mode`.
#[must_use]
pub fn blend_state(mode: BlendMode, index: usize) -> Option<wgpu::BlendState> {
    let add = |src, dst| wgpu::BlendComponent {
        src_factor: src,
        dst_factor: dst,
        operation: wgpu::BlendOperation::Add,
    };
    match mode {
        BlendMode::Disabled => None,
        BlendMode::Premultiplied => Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
        BlendMode::Additive => Some(wgpu::BlendState {
            color: add(wgpu::BlendFactor::One, wgpu::BlendFactor::One),
            alpha: add(wgpu::BlendFactor::One, wgpu::BlendFactor::One),
        }),
        BlendMode::Wboit if index == 0 => Some(wgpu::BlendState {
            color: add(wgpu::BlendFactor::One, wgpu::BlendFactor::One),
            alpha: add(wgpu::BlendFactor::One, wgpu::BlendFactor::One),
        }),
        BlendMode::Wboit => Some(wgpu::BlendState {
            color: add(wgpu::BlendFactor::Zero, wgpu::BlendFactor::OneMinusSrc),
            alpha: add(wgpu::BlendFactor::Zero, wgpu::BlendFactor::OneMinusSrc),
        }),
        BlendMode::Max => {
            let max = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Max,
            };
            Some(wgpu::BlendState {
                color: max,
                alpha: max,
            })
        }
    }
}

/// wgpu primitive state for the cull/winding part of `state`.
#[must_use]
pub fn primitive_state(state: &DrawState) -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        front_face: match state.front_face {
            FrontFace::Ccw => wgpu::FrontFace::Ccw,
            FrontFace::Cw => wgpu::FrontFace::Cw,
        },
        cull_mode: match state.cull {
            CullFace::None => None,
            CullFace::Front => Some(wgpu::Face::Front),
            CullFace::Back => Some(wgpu::Face::Back),
        },
        ..Default::default()
    }
}

/// wgpu depth state for `state`, `None` when the target has no depth.
#[must_use]
pub fn depth_stencil_state(state: &DrawState, has_depth: bool) -> Option<wgpu::DepthStencilState> {
    has_depth.then(|| wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: state.depth_write,
        depth_compare: if state.depth_test {
            match state.depth_func {
                DepthFunc::Less => wgpu::CompareFunction::Less,
                DepthFunc::LessEqual => wgpu::CompareFunction::LessEqual,
                DepthFunc::Greater => wgpu::CompareFunction::Greater,
                DepthFunc::Equal => wgpu::CompareFunction::Equal,
                DepthFunc::Always => wgpu::CompareFunction::Always,
            }
        } else {
            wgpu::CompareFunction::Always
        },
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    })
}

/// Color write mask from per-channel flags.
#[must_use]
pub fn color_writes(mask: [bool; 4]) -> wgpu::ColorWrites {
    let mut writes = wgpu::ColorWrites::empty();
    for (on, bit) in mask.iter().zip([
        wgpu::ColorWrites::RED,
        wgpu::ColorWrites::GREEN,
        wgpu::ColorWrites::BLUE,
        wgpu::ColorWrites::ALPHA,
    ]) {
        if *on {
            writes |= bit;
        }
    }
    writes
}

/// Float vertex format with `components` lanes.
#[must_use]
pub fn float_format(components: u32) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

/// Inputs for [`create_program_pipeline`].
pub struct PipelineInputs<'a> {
    /// Program interface.
    pub desc: &'a ProgramDescriptor,
    /// Compiled WGSL module.
    pub shader: &'a wgpu::ShaderModule,
    /// Group 0 (globals) and group 1 (per-draw) layouts.
    pub layouts: [&'a wgpu::BindGroupLayout; 2],
    /// Color formats of the target.
    pub color_formats: &'a [wgpu::TextureFormat],
    /// Whether the target has depth.
    pub has_depth: bool,
    /// Fixed-function state.
    pub state: &'a DrawState,
}

/// Create a render pipeline with `vs_main` / `fs_main` entry points for one
/// (program, target shape, state) combination.
pub fn create_program_pipeline(device: &wgpu::Device, inputs: &PipelineInputs<'_>) -> wgpu::RenderPipeline {
    let label = &inputs.desc.label;
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{label} Pipeline Layout")),
        bind_group_layouts: &inputs.layouts,
        push_constant_ranges: &[],
    });
    let attributes: Vec<Vec<wgpu::VertexAttribute>> = inputs
        .desc
        .vertex_layouts
        .iter()
        .map(|layout| {
            layout
                .attributes
                .iter()
                .map(|a| wgpu::VertexAttribute {
                    format: float_format(a.components),
                    offset: u64::from(a.offset),
                    shader_location: a.location,
                })
                .collect()
        })
        .collect();
    let buffers: Vec<wgpu::VertexBufferLayout<'_>> = inputs
        .desc
        .vertex_layouts
        .iter()
        .zip(&attributes)
        .map(|(layout, attrs)| wgpu::VertexBufferLayout {
            array_stride: u64::from(layout.stride),
            step_mode: if layout.per_instance {
                wgpu::VertexStepMode::Instance
            } else {
                wgpu::VertexStepMode::Vertex
            },
            attributes: attrs,
        })
        .collect();
    let writes = color_writes(inputs.state.color_mask);
    let targets: Vec<Option<wgpu::ColorTargetState>> = inputs
        .color_formats
        .iter()
        .enumerate()
        .map(|(i, format)| {
            Some(wgpu::ColorTargetState {
                format: *format,
                blend: blend_state(inputs.state.blend, i),
                write_mask: writes,
            })
        })
        .collect();

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&format!("{label} Pipeline")),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: inputs.shader,
            entry_point: Some("vs_main"),
            buffers: &buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: inputs.shader,
            entry_point: Some("fs_main"),
            targets: &targets,
            compilation_options: Default::default(),
        }),
        primitive: primitive_state(inputs.state),
        depth_stencil: depth_stencil_state(inputs.state, inputs.has_depth),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
