// -- Lint policy ---------------------------------------------------------
// This is the single source of truth for crate-wide lints.

// Broad lint groups
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
// Documentation
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::bare_urls)]
// No panicking in library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
// No debug/print artifacts
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
// Import hygiene
#![deny(clippy::wildcard_imports)]
// Complexity limits
#![deny(clippy::excessive_nesting)]
// Function signature hygiene
#![deny(clippy::fn_params_excessive_bools)]
// Clone / pass-by-value hygiene
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::implicit_clone)]
// String hygiene
#![deny(clippy::inefficient_to_string)]
#![deny(clippy::redundant_closure_for_method_calls)]
#![deny(clippy::manual_string_new)]
#![deny(clippy::str_to_string)]
// Cargo lints (warn, not deny since cargo lints can be noisy)
#![warn(clippy::cargo)]
// Unused / redundant code
#![deny(unused_results)]
#![deny(unused_qualifications)]
// Cast hygiene
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]

//! Incremental scene graph, multi-pass renderer and GPU picking for large
//! molecular scenes.
//!
//! canvas3d keeps thousands of renderables on the GPU, commits scene changes
//! across frames under a time budget, draws them with blended or
//! order-independent transparency, and identifies what is under the cursor
//! by reading back encoded pick buffers.
//!
//! # Key entry points
//!
//! - [`canvas::Canvas3D`] - frame controller driven by the host's animation
//!   loop
//! - [`scene::Scene`] - committed renderables and their aggregates
//! - [`renderer::Renderer`] - per-pass draw orchestration
//! - [`picking::PickHelper`] - pixel to object/instance/group resolution
//! - [`gpu::GpuContext`] - the backend seam, implemented by
//!   [`gpu::HeadlessContext`] and [`gpu::WgpuContext`]
//! - [`options::Canvas3DProps`] - runtime configuration
//!
//! # Frame flow
//!
//! Each tick commits queued scene changes, advances camera transitions and
//! draws only if the camera, the scene, the size or the marking changed.
//! A draw runs the opaque, volume and transparent passes through
//! [`passes::DrawPass`], optionally accumulating jittered samples in
//! [`passes::MultiSamplePass`], and ends with a fence the next frame waits
//! on.

pub mod camera;
pub mod canvas;
pub mod error;
pub mod gpu;
pub mod math;
pub mod options;
pub mod passes;
pub mod picking;
pub mod renderer;
pub mod scene;
pub mod util;

pub use canvas::{Canvas3D, TickOptions};
pub use error::CanvasError;
pub use options::Canvas3DProps;
