use std::time::Duration;

use crate::heap::HeapStats;

/// Outcome of one [`FrameExecutor::flush`](super::FrameExecutor::flush).
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct FlushStats {
    pub groups: usize,
    /// Vertex chunks written.
    pub chunks: usize,
    /// Low-level draw commands, indexed or not.
    pub draw_calls: usize,
    pub unique_shaders: usize,
    pub instances: u64,
}

/// Per-frame telemetry, handed to the stats callback after submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    /// Monotonic count of submitted frames.
    pub frame_index: u64,
    /// `frame_index % frames_in_flight`.
    pub frame_slot: u32,
    pub groups: usize,
    pub draw_calls: usize,
    pub unique_shaders: usize,
    pub instances: u64,
    /// Instances rejected by the group cap.
    pub dropped_instances: u32,
    /// Primitives skipped by the offscreen check.
    pub culled: u32,
    /// Heap occupancy after the frame's collection.
    pub heap: HeapStats,
    /// CPU time from `frame_start` to submission.
    pub cpu_time: Duration,
}
