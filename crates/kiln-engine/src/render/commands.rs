use core::ops::Range;

use crate::device::{BufferId, PipelineId};
use crate::paint::Color;

/// A bound byte range of a buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BufferSlice {
    pub buffer: BufferId,
    pub offset: u64,
    pub size: u64,
}

/// One recorded GPU command. Backends replay these into a render pass.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    SetPipeline(PipelineId),
    /// 16-bit indices.
    SetIndexBuffer(BufferSlice),
    SetVertexBuffer(BufferSlice),
    /// Group 0: frame-wide uniforms.
    SetGlobals(BufferSlice),
    /// Group 1: per-call object table.
    SetObjects(BufferSlice),
    DrawIndexed { indices: Range<u32>, base_vertex: i32 },
    Draw { vertices: Range<u32> },
}

impl RenderCommand {
    /// The buffer range this command binds, if any.
    pub fn buffer_slice(&self) -> Option<BufferSlice> {
        match *self {
            RenderCommand::SetIndexBuffer(s)
            | RenderCommand::SetVertexBuffer(s)
            | RenderCommand::SetGlobals(s)
            | RenderCommand::SetObjects(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn pipeline(&self) -> Option<PipelineId> {
        match *self {
            RenderCommand::SetPipeline(p) => Some(p),
            _ => None,
        }
    }
}

/// Commands of one frame, recorded into a single render pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandList {
    pub clear: Option<Color>,
    commands: Vec<RenderCommand>,
}

impl CommandList {
    pub fn new(clear: Option<Color>) -> Self {
        Self { clear, commands: Vec::new() }
    }

    #[inline]
    pub fn push(&mut self, cmd: RenderCommand) {
        self.commands.push(cmd);
    }

    #[inline]
    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of draw commands (indexed or not).
    pub fn draw_calls(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::DrawIndexed { .. } | RenderCommand::Draw { .. }))
            .count()
    }
}
