//! Shared utilities for the canvas.
//!
//! Helpers for versioned value cells, pick-buffer packing, spiral search
//! offsets, visibility hashing, easing curves, and frame timing.

pub mod easing;
pub mod frame_timing;
pub mod hash;
pub mod packing;
pub mod spiral;
pub mod value_cell;

pub use value_cell::ValueCell;
