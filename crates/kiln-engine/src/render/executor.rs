use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

use anyhow::{Context, Result};

use crate::batch::DrawGroup;
use crate::device::GpuBackend;
use crate::heap::{Allocation, BufferKind, Heap, PageFlags, StorageTarget};
use crate::shader::{BakedIndices, Shader, ShaderId, ShaderRegistry, bake_indices};

use super::{CommandList, FlushStats, FrameBindings, PipelineCache, RenderCommand};

/// A shader's pre-baked index buffer.
#[derive(Debug)]
struct IndexBuffer {
    alloc: Allocation,
    /// Instances one indexed draw may cover.
    capacity: u32,
    indices_per_instance: u32,
}

/// One chunk of a group, resident in a single vertex allocation.
#[derive(Debug)]
struct DrawCall {
    vertices: Allocation,
    instances: u32,
}

/// Turns baked draw groups into recorded commands.
///
/// Owns the pipeline cache and one index buffer per shader; both live until
/// [`release`](Self::release).
#[derive(Debug, Default)]
pub struct FrameExecutor {
    pipelines: PipelineCache,
    /// `None` marks a shader without an index pattern (non-indexed path).
    index_buffers: HashMap<ShaderId, Option<IndexBuffer>>,
}

impl FrameExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Records every group into `out`, in order.
    ///
    /// Instance bytes go to temporary vertex pages and stay valid until the
    /// heap's next collection.
    pub fn flush(
        &mut self,
        backend: &mut dyn GpuBackend,
        heap: &mut Heap,
        shaders: &ShaderRegistry,
        groups: &[DrawGroup],
        bindings: &FrameBindings,
        out: &mut CommandList,
    ) -> Result<FlushStats> {
        let mut stats = FlushStats::default();
        let mut used_shaders = BTreeSet::new();

        for group in groups.iter().filter(|g| !g.is_empty()) {
            let shader = shaders
                .get(group.shader())
                .with_context(|| format!("draw group references unknown shader {:?}", group.shader()))?;

            let pipeline = self.pipelines.resolve(backend, shader, group.raster_mode())?;
            self.ensure_indices(backend, heap, shader)?;

            for call in write_chunks(backend, heap, shader, group)? {
                out.push(RenderCommand::SetPipeline(pipeline));
                let indexed = self.index_buffers.get(&shader.id).and_then(Option::as_ref);
                if let Some(ib) = indexed {
                    out.push(RenderCommand::SetIndexBuffer(ib.alloc.slice()));
                }
                out.push(RenderCommand::SetVertexBuffer(call.vertices.slice()));
                out.push(RenderCommand::SetGlobals(bindings.globals.slice()));
                out.push(RenderCommand::SetObjects(bindings.objects.slice()));

                stats.draw_calls += match indexed {
                    Some(ib) => record_indexed(out, ib, shader.vertices_per_instance, call.instances),
                    None => record_fallback(out, shader.vertices_per_instance, call.instances),
                };
                stats.chunks += 1;
            }

            used_shaders.insert(shader.id);
            stats.groups += 1;
            stats.instances += u64::from(group.instance_count());
        }

        stats.unique_shaders = used_shaders.len();
        Ok(stats)
    }

    /// Destroys cached pipelines. Index buffers survive.
    pub fn invalidate_pipelines(&mut self, backend: &mut dyn GpuBackend) {
        if !self.pipelines.is_empty() {
            log::info!("dropping {} cached pipelines", self.pipelines.len());
        }
        self.pipelines.clear(backend);
    }

    /// Releases pipelines and index buffers.
    pub fn release(&mut self, backend: &mut dyn GpuBackend, heap: &mut Heap) {
        self.pipelines.clear(backend);
        for ib in self.index_buffers.drain().filter_map(|(_, ib)| ib) {
            heap.free(ib.alloc);
        }
    }

    fn ensure_indices(&mut self, backend: &mut dyn GpuBackend, heap: &mut Heap, shader: &Shader) -> Result<()> {
        if self.index_buffers.contains_key(&shader.id) {
            return Ok(());
        }

        let entry = match &shader.index_pattern {
            Some(pattern) => {
                let BakedIndices { indices, capacity, indices_per_instance } =
                    bake_indices(pattern, shader.vertices_per_instance, shader.topology);
                let alloc = heap
                    .write(
                        backend,
                        bytemuck::cast_slice(&indices),
                        BufferKind::Index,
                        StorageTarget::Immutable,
                        PageFlags::NONE,
                    )
                    .with_context(|| format!("failed to upload index buffer for {}", shader.label))?;
                log::debug!(
                    "baked {} indices for {} ({capacity} instances per draw)",
                    indices.len(),
                    shader.label
                );
                Some(IndexBuffer { alloc, capacity, indices_per_instance })
            }
            None => {
                log::debug!("{} has no index pattern; using non-indexed draws", shader.label);
                None
            }
        };
        self.index_buffers.insert(shader.id, entry);
        Ok(())
    }
}

/// Writes a group's instances in chunks that fit one default-sized vertex
/// buffer.
fn write_chunks(
    backend: &mut dyn GpuBackend,
    heap: &mut Heap,
    shader: &Shader,
    group: &DrawGroup,
) -> Result<Vec<DrawCall>> {
    let per_chunk = chunk_instances(heap.page_capacity(BufferKind::Vertex), group.instance_size());
    let total = group.instance_count();

    let mut calls = Vec::new();
    let mut first = 0;
    while first < total {
        let end = total.min(first.saturating_add(per_chunk));
        let vertices = heap
            .write(
                backend,
                group.instance_bytes(first..end),
                BufferKind::Vertex,
                StorageTarget::Coherent,
                PageFlags::TEMPORARY,
            )
            .with_context(|| format!("failed to write instances {first}..{end} of {}", shader.label))?;
        calls.push(DrawCall { vertices, instances: end - first });
        first = end;
    }
    Ok(calls)
}

/// Instances per vertex chunk. Oversized instances still get one each.
fn chunk_instances(page_capacity: u64, instance_size: usize) -> u32 {
    let n = page_capacity / (instance_size.max(1) as u64);
    n.clamp(1, u64::from(u32::MAX)) as u32
}

/// Indexed draws of at most `capacity` instances each. Returns the number of
/// draws recorded.
fn record_indexed(out: &mut CommandList, ib: &IndexBuffer, vertices_per_instance: u32, instances: u32) -> usize {
    let mut draws = 0;
    for range in split_instances(instances, ib.capacity) {
        out.push(RenderCommand::DrawIndexed {
            indices: 0..range.len() as u32 * ib.indices_per_instance,
            base_vertex: (range.start * vertices_per_instance) as i32,
        });
        draws += 1;
    }
    draws
}

/// One non-indexed draw per instance.
fn record_fallback(out: &mut CommandList, vertices_per_instance: u32, instances: u32) -> usize {
    for i in 0..instances {
        out.push(RenderCommand::Draw {
            vertices: i * vertices_per_instance..(i + 1) * vertices_per_instance,
        });
    }
    instances as usize
}

/// Splits `0..instances` into consecutive ranges of at most `capacity`.
fn split_instances(instances: u32, capacity: u32) -> impl Iterator<Item = Range<u32>> {
    let capacity = capacity.max(1);
    (0..instances.div_ceil(capacity)).map(move |k| {
        let start = k * capacity;
        start..instances.min(start + capacity)
    })
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use proptest::prelude::*;

    use super::*;
    use crate::coords::Viewport;
    use crate::device::RecordingBackend;
    use crate::heap::{HeapConfig, PageConfig};
    use crate::render::UniformStaging;
    use crate::shader::{AttributeFormat, RasterMode, ShaderDesc, Topology, VertexAttribute};

    struct Fixture {
        gpu: RecordingBackend,
        heap: Heap,
        shaders: ShaderRegistry,
        exec: FrameExecutor,
        bindings: FrameBindings,
    }

    impl Fixture {
        fn new(config: HeapConfig) -> Self {
            let mut gpu = RecordingBackend::new();
            let mut heap = Heap::new(config);
            let bindings = UniformStaging::new()
                .write(&mut heap, &mut gpu, Viewport::new(800.0, 600.0))
                .unwrap();
            Self {
                gpu,
                heap,
                shaders: ShaderRegistry::new(),
                exec: FrameExecutor::new(),
                bindings,
            }
        }

        fn register(&mut self, vertices: u32, pattern: Option<Vec<u16>>) -> ShaderId {
            self.shaders
                .register(ShaderDesc {
                    label: format!("test {vertices}v"),
                    source: Cow::Borrowed(""),
                    topology: Topology::TriangleList,
                    vertex_stride: 4,
                    attributes: vec![VertexAttribute { location: 0, offset: 0, format: AttributeFormat::Uint32 }],
                    index_pattern: pattern,
                    vertices_per_instance: vertices,
                })
                .unwrap()
        }

        fn group(&self, shader: ShaderId, instances: u32) -> DrawGroup {
            let size = self.shaders.get(shader).unwrap().instance_size();
            let mut g = DrawGroup::new(shader, RasterMode::Fill, size);
            for i in 0..instances {
                g.push(&vec![(i % 251) as u8; size]);
            }
            g
        }

        fn flush(&mut self, groups: &[DrawGroup]) -> (FlushStats, CommandList) {
            let mut out = CommandList::new(None);
            let stats = self
                .exec
                .flush(&mut self.gpu, &mut self.heap, &self.shaders, groups, &self.bindings, &mut out)
                .unwrap();
            (stats, out)
        }
    }

    fn draws(list: &CommandList) -> Vec<&RenderCommand> {
        list.commands()
            .iter()
            .filter(|c| matches!(c, RenderCommand::DrawIndexed { .. } | RenderCommand::Draw { .. }))
            .collect()
    }

    // ── splitting ─────────────────────────────────────────────────────────

    #[test]
    fn split_covers_every_instance() {
        let ranges: Vec<_> = split_instances(10, 4).collect();
        assert_eq!(ranges, vec![0..4, 4..8, 8..10]);
        assert_eq!(split_instances(0, 4).count(), 0);
        assert_eq!(split_instances(8, 4).count(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn indexed_draws_respect_instance_capacity(instances in 1u32..200) {
            // 4096 vertices per instance: 16 instances per 16-bit index buffer.
            let mut fx = Fixture::new(HeapConfig::default());
            let shader = fx.register(4096, Some(vec![0, 1, 2]));
            let group = fx.group(shader, instances);
            let (stats, out) = fx.flush(&[group]);

            let mut covered = 0;
            for cmd in draws(&out) {
                let RenderCommand::DrawIndexed { indices, .. } = cmd else {
                    panic!("expected indexed draw, got {cmd:?}");
                };
                let n = indices.len() as u32 / 3;
                prop_assert!(n >= 1 && n <= 16);
                covered += n;
            }
            prop_assert_eq!(covered, instances);
            prop_assert_eq!(stats.draw_calls, instances.div_ceil(16) as usize);
        }
    }

    #[test]
    fn base_vertex_advances_per_split() {
        let mut fx = Fixture::new(HeapConfig::default());
        let shader = fx.register(4096, Some(vec![0, 1, 2]));
        let group = fx.group(shader, 20);
        let (_, out) = fx.flush(&[group]);

        assert_eq!(
            draws(&out),
            vec![
                &RenderCommand::DrawIndexed { indices: 0..48, base_vertex: 0 },
                &RenderCommand::DrawIndexed { indices: 0..12, base_vertex: 16 * 4096 },
            ]
        );
    }

    // ── fallback ──────────────────────────────────────────────────────────

    #[test]
    fn shader_without_pattern_draws_per_instance() {
        let mut fx = Fixture::new(HeapConfig::default());
        let shader = fx.register(3, None);
        let group = fx.group(shader, 3);
        let (stats, out) = fx.flush(&[group]);

        assert_eq!(stats.draw_calls, 3);
        assert!(!out.commands().iter().any(|c| matches!(c, RenderCommand::SetIndexBuffer(_))));
        assert_eq!(
            draws(&out),
            vec![
                &RenderCommand::Draw { vertices: 0..3 },
                &RenderCommand::Draw { vertices: 3..6 },
                &RenderCommand::Draw { vertices: 6..9 },
            ]
        );
    }

    // ── chunking ──────────────────────────────────────────────────────────

    #[test]
    fn groups_are_chunked_by_vertex_page_capacity() {
        let mut fx = Fixture::new(HeapConfig {
            vertex: PageConfig::new(256, 16),
            ..HeapConfig::default()
        });
        // 3 vertices * 4 bytes = 12 bytes per instance: 21 per chunk.
        let shader = fx.register(3, Some(vec![0, 1, 2]));
        let group = fx.group(shader, 50);
        let (stats, out) = fx.flush(&[group]);

        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.draw_calls, 3);
        let vertex_sizes: Vec<u64> = out
            .commands()
            .iter()
            .filter_map(|c| match c {
                RenderCommand::SetVertexBuffer(s) => Some(s.size),
                _ => None,
            })
            .collect();
        assert_eq!(vertex_sizes, vec![21 * 12, 21 * 12, 8 * 12]);
    }

    #[test]
    fn vertex_bytes_land_in_bound_slice() {
        let mut fx = Fixture::new(HeapConfig::default());
        let rect = fx.shaders.builtins().rect;
        let group = fx.group(rect, 2);
        let expected = group.bytes().to_vec();
        let (_, out) = fx.flush(&[group]);

        let slice = out
            .commands()
            .iter()
            .find_map(|c| match c {
                RenderCommand::SetVertexBuffer(s) => Some(*s),
                _ => None,
            })
            .unwrap();
        let bytes = fx.gpu.buffer_bytes(slice.buffer).unwrap();
        let start = slice.offset as usize;
        assert_eq!(&bytes[start..start + expected.len()], expected.as_slice());
    }

    // ── binding ───────────────────────────────────────────────────────────

    #[test]
    fn every_call_binds_pipeline_buffers_and_descriptors() {
        let mut fx = Fixture::new(HeapConfig::default());
        let b = fx.shaders.builtins();
        let groups = [fx.group(b.rect, 1), fx.group(b.line, 1)];
        let (stats, out) = fx.flush(&groups);

        assert_eq!(stats.groups, 2);
        assert_eq!(stats.unique_shaders, 2);
        assert_eq!(stats.instances, 2);

        let kinds: Vec<&'static str> = out
            .commands()
            .iter()
            .map(|c| match c {
                RenderCommand::SetPipeline(_) => "pipeline",
                RenderCommand::SetIndexBuffer(_) => "index",
                RenderCommand::SetVertexBuffer(_) => "vertex",
                RenderCommand::SetGlobals(_) => "globals",
                RenderCommand::SetObjects(_) => "objects",
                RenderCommand::DrawIndexed { .. } => "draw",
                RenderCommand::Draw { .. } => "draw",
            })
            .collect();
        let call = ["pipeline", "index", "vertex", "globals", "objects", "draw"];
        assert_eq!(kinds, [call, call].concat());
    }

    #[test]
    fn pipelines_and_index_buffers_are_cached() {
        let mut fx = Fixture::new(HeapConfig::default());
        let rect = fx.shaders.builtins().rect;
        let groups = [fx.group(rect, 1), fx.group(rect, 1)];
        fx.flush(&groups);
        let buffers = fx.gpu.live_buffers();
        fx.flush(&groups);

        assert_eq!(fx.exec.pipeline_count(), 1);
        assert_eq!(fx.gpu.live_pipelines(), 1);
        assert_eq!(fx.gpu.live_buffers(), buffers);
    }

    #[test]
    fn strip_shader_binds_sentinel_terminated_indices() {
        let mut fx = Fixture::new(HeapConfig::default());
        let outline = fx.shaders.builtins().rect_outline;
        let group = fx.group(outline, 2);
        let (_, out) = fx.flush(&[group]);

        assert_eq!(draws(&out), vec![&RenderCommand::DrawIndexed { indices: 0..12, base_vertex: 0 }]);
        let ib = out
            .commands()
            .iter()
            .find_map(|c| match c {
                RenderCommand::SetIndexBuffer(s) => Some(*s),
                _ => None,
            })
            .unwrap();
        let bytes = fx.gpu.buffer_bytes(ib.buffer).unwrap();
        let first: Vec<u16> = bytes[ib.offset as usize..ib.offset as usize + 24]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(first, [0, 1, 2, 3, 0, 0xFFFF, 4, 5, 6, 7, 4, 0xFFFF]);
    }

    #[test]
    fn release_frees_everything() {
        let mut fx = Fixture::new(HeapConfig::default());
        let b = fx.shaders.builtins();
        let groups = [fx.group(b.rect, 1), fx.group(b.circle, 1)];
        fx.flush(&groups);

        fx.exec.release(&mut fx.gpu, &mut fx.heap);
        fx.heap.garbage_collect(&mut fx.gpu);
        assert_eq!(fx.gpu.live_pipelines(), 0);
        assert_eq!(fx.heap.stats().kind(BufferKind::Index).used, 0);
    }

    #[test]
    fn unknown_shader_is_an_error() {
        let mut fx = Fixture::new(HeapConfig::default());
        let mut g = DrawGroup::new(ShaderId(99), RasterMode::Fill, 4);
        g.push(&[0; 4]);
        let mut out = CommandList::new(None);
        let err = fx
            .exec
            .flush(&mut fx.gpu, &mut fx.heap, &fx.shaders, &[g], &fx.bindings, &mut out)
            .unwrap_err();
        assert!(err.to_string().contains("unknown shader"));
    }
}
