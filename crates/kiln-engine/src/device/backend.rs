use core::fmt;

use anyhow::Result;

use crate::heap::BufferKind;
use crate::render::CommandList;
use crate::shader::{RasterMode, Shader};

/// Handle to a physical buffer owned by a [`GpuBackend`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BufferId(pub(crate) u32);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

/// Handle to a render pipeline owned by a [`GpuBackend`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PipelineId(pub(crate) u32);

/// Where a buffer's memory lives.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MemoryKind {
    /// CPU-visible; written directly.
    HostVisible,
    /// Device-local; only reachable through copies.
    DeviceLocal,
    /// CPU-visible copy source.
    Staging,
}

#[derive(Debug, Clone)]
pub struct BufferDesc {
    pub label: String,
    /// Size in bytes; a multiple of `wgpu::COPY_BUFFER_ALIGNMENT`.
    pub size: u64,
    pub kind: BufferKind,
    pub memory: MemoryKind,
}

/// Result of acquiring the next drawable.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameBegin {
    /// A drawable is available; commands may be submitted.
    Ready,
    /// Transient failure; skip this frame.
    Skip,
    /// The surface was reconfigured; frame-scoped resources must be rebuilt.
    Rebuild,
}

/// The graphics-API boundary.
///
/// Every fallible call returns a `Result`; callers escalate failures to the
/// frame loop instead of retrying.
pub trait GpuBackend {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId>;

    fn destroy_buffer(&mut self, buffer: BufferId);

    /// Writes `bytes` into CPU-visible memory at `offset`.
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, bytes: &[u8]) -> Result<()>;

    /// Records and submits a one-shot copy. The copy is ordered before any
    /// later submission when this returns.
    fn copy_buffer(
        &mut self,
        src: BufferId,
        src_offset: u64,
        dst: BufferId,
        dst_offset: u64,
        size: u64,
    ) -> Result<()>;

    fn create_pipeline(&mut self, shader: &Shader, mode: RasterMode) -> Result<PipelineId>;

    fn destroy_pipeline(&mut self, pipeline: PipelineId);

    /// Acquires the next drawable and opens the frame's command buffer.
    fn begin_frame(&mut self) -> Result<FrameBegin>;

    /// Encodes `commands` into the open frame, submits and presents it.
    fn submit(&mut self, commands: &CommandList) -> Result<()>;

    /// Applies a new drawable size.
    fn resize(&mut self, width: u32, height: u32);

    /// Number of frames that may be queued on the GPU at once.
    fn frames_in_flight(&self) -> u32;
}
