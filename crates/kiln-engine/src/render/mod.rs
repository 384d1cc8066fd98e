//! Frame recording.
//!
//! Baked draw groups are turned into a [`CommandList`] that a backend replays
//! into a single render pass. Conventions:
//! - CPU geometry is in logical pixels (top-left origin, +Y down).
//! - The vertex stage converts to NDC with the group 0 viewport uniform.
//! - Group 1 holds the frame's object table, bound for every draw call.

mod commands;
mod executor;
mod pipelines;
mod staging;
mod stats;

pub use commands::{BufferSlice, CommandList, RenderCommand};
pub use executor::FrameExecutor;
pub use pipelines::PipelineCache;
pub use staging::{FrameBindings, GlobalUniform, ObjectData, ObjectId, UniformStaging};
pub use stats::{FlushStats, FrameStats};
