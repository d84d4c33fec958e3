//! Host-side render objects: the description a renderable is built from.

use crate::error::CanvasError;
use crate::gpu::GpuContext;

use super::renderable::{Renderable, RenderableId};

/// Identity of a render object. Also the object id written to pick buffers.
pub type ObjectId = u32;

/// Something the scene can turn into a [`Renderable`].
///
/// Implementations are owned by the host (usually behind an `Rc` shared with
/// a representation) and may be committed, removed and re-committed any
/// number of times.
pub trait GraphicsRenderObject {
    /// Stable identity, unique among live objects.
    fn id(&self) -> ObjectId;

    /// Allocate GPU resources and build the drawable.
    ///
    /// # Errors
    ///
    /// Resource creation failures, e.g. a texture above the size limit.
    fn create_renderable(
        &self,
        ctx: &mut dyn GpuContext,
        id: RenderableId,
    ) -> Result<Box<dyn Renderable>, CanvasError>;
}
