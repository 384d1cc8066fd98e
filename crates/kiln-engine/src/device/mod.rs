//! Graphics-API boundary.
//!
//! - `GpuBackend`: the operations the heap and frame executor need
//! - `WgpuBackend`: wgpu implementation over a window surface
//! - `RecordingBackend`: in-memory implementation for tests and headless use

mod backend;
mod context;
mod error;
mod frame;
mod init;
mod recording;
mod surface;
mod wgpu_backend;

pub use backend::{BufferDesc, BufferId, FrameBegin, GpuBackend, MemoryKind, PipelineId};
pub use context::Gpu;
pub use error::SurfaceErrorAction;
pub use frame::GpuFrame;
pub use init::GpuInit;
pub use recording::{CopyRecord, RecordingBackend};
pub use wgpu_backend::WgpuBackend;
