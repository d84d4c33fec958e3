//! Pass membership tests and the face-culling table.

use crate::gpu::{CullFace, FrontFace};
use crate::scene::{GeometryKind, PointStyle, Renderable};

/// Whether `r` has fragments for the opaque color pass.
#[must_use]
pub fn is_opaque(r: &dyn Renderable) -> bool {
    let values = r.values();
    r.state().opaque
        && values.transparency_average.value() < 1.0
        && !values.xray_shaded.value().is_on()
        && values.point_style.value() != PointStyle::Fuzzy
        && values.geometry_kind.value() != GeometryKind::DirectVolume
}

/// Whether `r` has fragments for a transparent color pass.
#[must_use]
pub fn is_transparent(r: &dyn Renderable) -> bool {
    let values = r.values();
    !r.state().opaque
        || values.transparency_average.value() > 0.0
        || values.xray_shaded.value().is_on()
        || values.point_style.value() == PointStyle::Fuzzy
}

/// Which faces a draw keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceFlag {
    /// Per-renderable default: double-sided draws both faces.
    None,
    /// Front faces only.
    BlendedFront,
    /// Back faces only.
    BlendedBack,
}

/// Cull mode and winding for a draw.
///
/// | flag | culled face | culled face when flipped |
/// |---|---|---|
/// | `None` (single-sided) | back | front |
/// | `None` (double-sided, no x-ray) | none | none |
/// | `BlendedFront` | back | front |
/// | `BlendedBack` | front | back |
///
/// Flipped renderables also use clockwise front faces.
#[must_use]
pub fn face_culling(flag: FaceFlag, double_sided: bool, flip_sided: bool, xray: bool) -> (CullFace, FrontFace) {
    let front = if flip_sided { FrontFace::Cw } else { FrontFace::Ccw };
    let cull_back = if flip_sided { CullFace::Front } else { CullFace::Back };
    let cull_front = if flip_sided { CullFace::Back } else { CullFace::Front };
    let cull = match flag {
        FaceFlag::None if double_sided && !xray => CullFace::None,
        FaceFlag::None | FaceFlag::BlendedFront => cull_back,
        FaceFlag::BlendedBack => cull_front,
    };
    (cull, front)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_table() {
        use FaceFlag::{BlendedBack, BlendedFront};
        assert_eq!(face_culling(FaceFlag::None, true, false, false), (CullFace::None, FrontFace::Ccw));
        assert_eq!(face_culling(FaceFlag::None, true, false, true).0, CullFace::Back);
        assert_eq!(face_culling(FaceFlag::None, false, false, false).0, CullFace::Back);
        assert_eq!(face_culling(FaceFlag::None, false, true, false), (CullFace::Front, FrontFace::Cw));
        assert_eq!(face_culling(BlendedFront, true, false, false).0, CullFace::Back);
        assert_eq!(face_culling(BlendedBack, true, false, false).0, CullFace::Front);
        assert_eq!(face_culling(BlendedBack, true, true, false), (CullFace::Back, FrontFace::Cw));
    }
}
