//! GPU picking: id buffers rendered offscreen and decoded on the CPU.

/// Pick buffer sampling and spiral search.
pub mod pick_helper;
/// Offscreen pick targets.
pub mod pick_pass;

use glam::Vec3;

pub use pick_helper::PickHelper;
pub use pick_pass::{PickBuffer, PickPass};

/// Identity of a picked fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PickingId {
    /// Render object id.
    pub object_id: u32,
    /// Instance within the object.
    pub instance_id: u32,
    /// Group (e.g. element) within the instance.
    pub group_id: u32,
}

/// A pick hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickData {
    /// What was hit.
    pub id: PickingId,
    /// World position of the hit, reconstructed from the pick depth.
    pub position: Vec3,
}
