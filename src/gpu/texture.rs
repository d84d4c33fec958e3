//! wgpu textures backing render targets.

use super::context::TextureFormat;

/// Depth attachment format for every render target.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// wgpu format for a color attachment format.
#[must_use]
pub fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
    }
}

/// A texture and its default view.
///
/// Created with `RENDER_ATTACHMENT | TEXTURE_BINDING | COPY_SRC | COPY_DST`
/// so it can be drawn into, sampled by later passes, read back, and
/// uploaded to.
pub struct RenderTexture {
    /// The underlying GPU texture.
    pub texture: wgpu::Texture,
    /// A default full-texture view.
    pub view: wgpu::TextureView,
    /// Texel format.
    pub format: wgpu::TextureFormat,
}

impl RenderTexture {
    /// Create a texture with the given dimensions and format.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC;
        if format != DEPTH_FORMAT {
            usage |= wgpu::TextureUsages::COPY_DST;
        }
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            format,
        }
    }
}

/// Color attachments plus an optional depth attachment of equal size.
pub struct RenderTarget {
    /// Debug label.
    pub label: &'static str,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Color attachments in location order.
    pub color: Vec<RenderTexture>,
    /// Depth attachment.
    pub depth: Option<RenderTexture>,
}

impl RenderTarget {
    /// Allocate all attachments.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        label: &'static str,
        width: u32,
        height: u32,
        color: &[wgpu::TextureFormat],
        depth: bool,
    ) -> Self {
        Self {
            label,
            width,
            height,
            color: color
                .iter()
                .map(|f| RenderTexture::new(device, label, width, height, *f))
                .collect(),
            depth: depth.then(|| RenderTexture::new(device, label, width, height, DEPTH_FORMAT)),
        }
    }

    /// Reallocate every attachment at a new size.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        let formats: Vec<_> = self.color.iter().map(|t| t.format).collect();
        *self = Self::new(
            device,
            self.label,
            width,
            height,
            &formats,
            self.depth.is_some(),
        );
    }

    /// Color formats in location order, used as part of pipeline keys.
    #[must_use]
    pub fn color_formats(&self) -> Vec<wgpu::TextureFormat> {
        self.color.iter().map(|t| t.format).collect()
    }
}
