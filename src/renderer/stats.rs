//! Per-frame draw counters.

/// Counters accumulated by the renderer until [`reset`](RendererStats::reset).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RendererStats {
    /// Renderable draws issued.
    pub draw_calls: u32,
    /// Instances drawn over all draws.
    pub instances_drawn: u32,
    /// Renderables skipped by frustum, LOD or occlusion culling.
    pub culled_renderables: u32,
    /// Instances skipped by instance-grid culling.
    pub culled_instances: u32,
    /// Program changes.
    pub program_switches: u32,
}

impl RendererStats {
    /// Zero every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
