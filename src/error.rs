//! Crate-level error types.

use std::fmt;

use crate::gpu::render_context::RenderContextError;

/// Errors produced by the canvas3d crate.
///
/// Only setup-time and resource-limit failures are errors. Expected misses
/// (an empty pick, an empty loci) are reported as `None` / `false`, and a
/// lost GPU context is a polled flag rather than an error.
#[derive(Debug)]
pub enum CanvasError {
    /// GPU context initialization failure.
    Gpu(RenderContextError),
    /// A GPU capability required by the caller is not available.
    MissingCapability(&'static str),
    /// Requested texture dimensions exceed the device limit.
    TextureTooLarge {
        /// Requested width in pixels.
        width: u32,
        /// Requested height in pixels.
        height: u32,
        /// Largest supported dimension.
        max: u32,
    },
    /// A resource handle that the context does not own.
    UnknownResource(&'static str, u32),
    /// Shader program creation failed.
    Program(String),
    /// Reading pixels back from the GPU failed.
    ReadPixels(String),
    /// TOML props parsing/serialization failure.
    OptionsParse(String),
    /// Generic I/O failure.
    Io(std::io::Error),
}

impl fmt::Display for CanvasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu(e) => write!(f, "GPU error: {e}"),
            Self::MissingCapability(what) => {
                write!(f, "missing GPU capability: {what}")
            }
            Self::TextureTooLarge { width, height, max } => write!(
                f,
                "texture {width}x{height} exceeds maximum dimension {max}"
            ),
            Self::UnknownResource(kind, id) => {
                write!(f, "unknown {kind} handle {id}")
            }
            Self::Program(msg) => write!(f, "program creation failed: {msg}"),
            Self::ReadPixels(msg) => write!(f, "read pixels failed: {msg}"),
            Self::OptionsParse(msg) => {
                write!(f, "options parse error: {msg}")
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CanvasError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Gpu(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RenderContextError> for CanvasError {
    fn from(e: RenderContextError) -> Self {
        Self::Gpu(e)
    }
}

impl From<std::io::Error> for CanvasError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_too_large_message_names_limit() {
        let err = CanvasError::TextureTooLarge {
            width: 9000,
            height: 10,
            max: 8192,
        };
        assert_eq!(
            err.to_string(),
            "texture 9000x10 exceeds maximum dimension 8192"
        );
    }

    #[test]
    fn io_error_has_source() {
        use std::error::Error;
        let err = CanvasError::from(std::io::Error::other("disk"));
        assert!(err.source().is_some());
        assert!(CanvasError::MissingCapability("fence sync")
            .source()
            .is_none());
    }
}
