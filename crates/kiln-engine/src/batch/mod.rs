//! Draw batching.
//!
//! Per-primitive instances are grouped by `(shader, raster mode)` in call
//! order; the frame executor consumes the groups at the end of the frame.

mod batcher;
mod group;

pub use batcher::{BakedFrame, Batcher};
pub use group::DrawGroup;
