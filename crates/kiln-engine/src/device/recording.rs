use std::collections::{BTreeMap, VecDeque};

use anyhow::{Context, Result, bail, ensure};

use crate::render::CommandList;
use crate::shader::{RasterMode, Shader, ShaderId};

use super::backend::{BufferDesc, BufferId, FrameBegin, GpuBackend, MemoryKind, PipelineId};

/// One buffer-to-buffer copy issued through [`GpuBackend::copy_buffer`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CopyRecord {
    pub src: BufferId,
    pub src_offset: u64,
    pub dst: BufferId,
    pub dst_offset: u64,
    pub size: u64,
}

struct RecordedBuffer {
    desc: BufferDesc,
    bytes: Vec<u8>,
}

/// Headless [`GpuBackend`] that keeps buffer contents in memory and records
/// every submitted command list.
///
/// Used by the test suites and usable wherever no surface exists.
pub struct RecordingBackend {
    next_id: u32,
    buffers: BTreeMap<BufferId, RecordedBuffer>,
    pipelines: BTreeMap<PipelineId, (ShaderId, RasterMode)>,
    copies: Vec<CopyRecord>,
    submitted: Vec<CommandList>,
    resizes: Vec<(u32, u32)>,
    scripted_frames: VecDeque<FrameBegin>,
    frames_in_flight: u32,
    fail_buffers: bool,
    fail_submit: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::with_frames_in_flight(2)
    }

    pub fn with_frames_in_flight(frames_in_flight: u32) -> Self {
        Self {
            next_id: 0,
            buffers: BTreeMap::new(),
            pipelines: BTreeMap::new(),
            copies: Vec::new(),
            submitted: Vec::new(),
            resizes: Vec::new(),
            scripted_frames: VecDeque::new(),
            frames_in_flight: frames_in_flight.max(1),
            fail_buffers: false,
            fail_submit: false,
        }
    }

    // ── failure injection ─────────────────────────────────────────────────

    /// Makes every subsequent `create_buffer` fail.
    pub fn fail_buffer_creation(&mut self, fail: bool) {
        self.fail_buffers = fail;
    }

    /// Makes every subsequent `submit` fail.
    pub fn fail_submit(&mut self, fail: bool) {
        self.fail_submit = fail;
    }

    /// Queues the results of the next `begin_frame` calls. Once drained,
    /// frames are `Ready`.
    pub fn script_frames(&mut self, results: impl IntoIterator<Item = FrameBegin>) {
        self.scripted_frames.extend(results);
    }

    // ── inspection ────────────────────────────────────────────────────────

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    pub fn buffer_size(&self, id: BufferId) -> Option<u64> {
        self.buffers.get(&id).map(|b| b.desc.size)
    }

    pub fn buffer_desc(&self, id: BufferId) -> Option<&BufferDesc> {
        self.buffers.get(&id).map(|b| &b.desc)
    }

    pub fn buffer_bytes(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(&id).map(|b| b.bytes.as_slice())
    }

    /// Shader and raster mode a live pipeline was built for.
    pub fn pipeline(&self, id: PipelineId) -> Option<(ShaderId, RasterMode)> {
        self.pipelines.get(&id).copied()
    }

    pub fn copies(&self) -> &[CopyRecord] {
        &self.copies
    }

    pub fn submitted(&self) -> &[CommandList] {
        &self.submitted
    }

    pub fn last_submitted(&self) -> Option<&CommandList> {
        self.submitted.last()
    }

    pub fn resizes(&self) -> &[(u32, u32)] {
        &self.resizes
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn buffer_mut(&mut self, id: BufferId) -> Result<&mut RecordedBuffer> {
        self.buffers.get_mut(&id).with_context(|| format!("unknown {id}"))
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for RecordingBackend {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId> {
        if self.fail_buffers {
            bail!("buffer creation disabled ({})", desc.label);
        }
        ensure!(
            desc.size % wgpu::COPY_BUFFER_ALIGNMENT == 0,
            "buffer size {} is not a multiple of {}",
            desc.size,
            wgpu::COPY_BUFFER_ALIGNMENT
        );
        let id = BufferId(self.next_id());
        self.buffers.insert(
            id,
            RecordedBuffer {
                desc: desc.clone(),
                bytes: vec![0; desc.size as usize],
            },
        );
        Ok(id)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(&buffer).is_none() {
            log::warn!("destroy of unknown {buffer}");
        }
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, bytes: &[u8]) -> Result<()> {
        let target = self.buffer_mut(buffer)?;
        ensure!(target.desc.memory != MemoryKind::DeviceLocal, "{buffer} is not CPU-visible");
        let start = offset as usize;
        let end = start + bytes.len();
        ensure!(end <= target.bytes.len(), "write {start}..{end} out of bounds of {buffer}");
        target.bytes[start..end].copy_from_slice(bytes);
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        src: BufferId,
        src_offset: u64,
        dst: BufferId,
        dst_offset: u64,
        size: u64,
    ) -> Result<()> {
        let (s, n) = (src_offset as usize, size as usize);
        let chunk = {
            let source = self.buffer_mut(src)?;
            ensure!(s + n <= source.bytes.len(), "copy source out of bounds of {src}");
            source.bytes[s..s + n].to_vec()
        };
        let target = self.buffer_mut(dst)?;
        let d = dst_offset as usize;
        ensure!(d + n <= target.bytes.len(), "copy destination out of bounds of {dst}");
        target.bytes[d..d + n].copy_from_slice(&chunk);

        self.copies.push(CopyRecord {
            src,
            src_offset,
            dst,
            dst_offset,
            size,
        });
        Ok(())
    }

    fn create_pipeline(&mut self, shader: &Shader, mode: RasterMode) -> Result<PipelineId> {
        let id = PipelineId(self.next_id());
        self.pipelines.insert(id, (shader.id, mode));
        Ok(id)
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        self.pipelines.remove(&pipeline);
    }

    fn begin_frame(&mut self) -> Result<FrameBegin> {
        Ok(self.scripted_frames.pop_front().unwrap_or(FrameBegin::Ready))
    }

    fn submit(&mut self, commands: &CommandList) -> Result<()> {
        if self.fail_submit {
            bail!("submission disabled");
        }
        for cmd in commands.commands() {
            if let Some(slice) = cmd.buffer_slice() {
                ensure!(self.buffers.contains_key(&slice.buffer), "{cmd:?} references a destroyed buffer");
            }
            if let Some(p) = cmd.pipeline() {
                ensure!(self.pipelines.contains_key(&p), "{cmd:?} references a destroyed pipeline");
            }
        }
        self.submitted.push(commands.clone());
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.resizes.push((width, height));
    }

    fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::BufferKind;

    fn desc(size: u64, memory: MemoryKind) -> BufferDesc {
        BufferDesc {
            label: "test".into(),
            size,
            kind: BufferKind::Vertex,
            memory,
        }
    }

    #[test]
    fn write_then_copy_moves_bytes() {
        let mut gpu = RecordingBackend::new();
        let src = gpu.create_buffer(&desc(8, MemoryKind::Staging)).unwrap();
        let dst = gpu.create_buffer(&desc(16, MemoryKind::DeviceLocal)).unwrap();

        gpu.write_buffer(src, 0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        gpu.copy_buffer(src, 4, dst, 8, 4).unwrap();

        assert_eq!(&gpu.buffer_bytes(dst).unwrap()[8..12], &[5, 6, 7, 8]);
        assert_eq!(gpu.copies().len(), 1);
    }

    #[test]
    fn device_local_rejects_cpu_writes() {
        let mut gpu = RecordingBackend::new();
        let dst = gpu.create_buffer(&desc(16, MemoryKind::DeviceLocal)).unwrap();
        assert!(gpu.write_buffer(dst, 0, &[0; 4]).is_err());
    }

    #[test]
    fn out_of_bounds_write_fails() {
        let mut gpu = RecordingBackend::new();
        let b = gpu.create_buffer(&desc(8, MemoryKind::HostVisible)).unwrap();
        assert!(gpu.write_buffer(b, 4, &[0; 8]).is_err());
    }

    #[test]
    fn unaligned_size_is_rejected() {
        let mut gpu = RecordingBackend::new();
        assert!(gpu.create_buffer(&desc(10, MemoryKind::HostVisible)).is_err());
    }

    #[test]
    fn scripted_frames_drain_to_ready() {
        let mut gpu = RecordingBackend::new();
        gpu.script_frames([FrameBegin::Skip, FrameBegin::Rebuild]);
        assert_eq!(gpu.begin_frame().unwrap(), FrameBegin::Skip);
        assert_eq!(gpu.begin_frame().unwrap(), FrameBegin::Rebuild);
        assert_eq!(gpu.begin_frame().unwrap(), FrameBegin::Ready);
    }
}
