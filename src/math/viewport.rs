//! Pixel viewports and screen-to-world unprojection.
//!
//! All window coordinates use a top-left origin, matching wgpu texture
//! addressing, and depth runs over `[0, 1]`.

use glam::{Mat4, Vec3};

/// Rectangle of pixels in a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Viewport {
    /// Viewport from its four edges.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Width over height, 1.0 for degenerate viewports.
    #[must_use]
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// Whether the viewport covers no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the window-space point lies inside the viewport.
    #[must_use]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x as f32
            && y >= self.y as f32
            && x < (self.x + self.width) as f32
            && y < (self.y + self.height) as f32
    }

    /// Viewport with every edge multiplied by `factor` and rounded down.
    #[must_use]
    pub fn scaled(&self, factor: f32) -> Self {
        let s = |v: u32| (v as f32 * factor).floor() as u32;
        Self::new(s(self.x), s(self.y), s(self.width), s(self.height))
    }
}

/// Map a window-space point (`x`, `y` in pixels, `z` as depth in `[0, 1]`)
/// back into world space using the inverse projection-view matrix.
#[must_use]
pub fn unproject(point: Vec3, inverse_projection_view: &Mat4, viewport: &Viewport) -> Vec3 {
    if viewport.is_empty() {
        return Vec3::ZERO;
    }
    let ndc = Vec3::new(
        2.0 * (point.x - viewport.x as f32) / viewport.width as f32 - 1.0,
        1.0 - 2.0 * (point.y - viewport.y as f32) / viewport.height as f32,
        point.z,
    );
    inverse_projection_view.project_point3(ndc)
}
