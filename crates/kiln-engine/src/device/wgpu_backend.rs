use std::collections::{HashMap, HashSet};
use std::num::NonZeroU64;

use anyhow::{Context, Result, anyhow, bail};
use winit::dpi::PhysicalSize;

use crate::heap::BufferKind;
use crate::render::{BufferSlice, CommandList, RenderCommand};
use crate::shader::{AttributeFormat, RasterMode, Shader, Topology};

use super::backend::{BufferDesc, BufferId, FrameBegin, GpuBackend, MemoryKind, PipelineId};
use super::{Gpu, GpuFrame, SurfaceErrorAction};

/// [`GpuBackend`] over a window surface.
///
/// Buffers and pipelines live in id-keyed tables; bind groups are rebuilt for
/// every submission since the slices they cover are frame-scoped.
pub struct WgpuBackend<'w> {
    gpu: Gpu<'w>,
    globals_layout: wgpu::BindGroupLayout,
    objects_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    pipelines: HashMap<PipelineId, wgpu::RenderPipeline>,
    next_id: u32,
    frame: Option<GpuFrame>,
    /// Raster modes already reported as unsupported.
    warned_raster: HashSet<RasterMode>,
}

impl<'w> WgpuBackend<'w> {
    pub fn new(gpu: Gpu<'w>) -> Self {
        let device = gpu.device();

        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kiln globals bgl"),
            entries: &[bgl_uniform(0, wgpu::ShaderStages::VERTEX_FRAGMENT)],
        });
        let objects_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kiln objects bgl"),
            entries: &[bgl_storage_ro(0, wgpu::ShaderStages::VERTEX)],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("kiln pipeline layout"),
            bind_group_layouts: &[&globals_layout, &objects_layout],
            immediate_size: 0,
        });

        Self {
            gpu,
            globals_layout,
            objects_layout,
            pipeline_layout,
            buffers: HashMap::new(),
            pipelines: HashMap::new(),
            next_id: 0,
            frame: None,
            warned_raster: HashSet::new(),
        }
    }

    #[inline]
    pub fn gpu(&self) -> &Gpu<'w> {
        &self.gpu
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    fn buffer(&self, id: BufferId) -> Result<&wgpu::Buffer> {
        self.buffers.get(&id).with_context(|| format!("unknown {id}"))
    }

    /// Requested polygon mode, or `Fill` with a one-time warning when the
    /// device lacks the feature.
    fn polygon_mode(&mut self, mode: RasterMode) -> wgpu::PolygonMode {
        let (wanted, feature) = match mode {
            RasterMode::Fill => return wgpu::PolygonMode::Fill,
            RasterMode::Line => (wgpu::PolygonMode::Line, wgpu::Features::POLYGON_MODE_LINE),
            RasterMode::Point => (wgpu::PolygonMode::Point, wgpu::Features::POLYGON_MODE_POINT),
        };
        if self.gpu.features().contains(feature) {
            return wanted;
        }
        if self.warned_raster.insert(mode) {
            log::warn!("{feature:?} unavailable; drawing {mode:?} raster mode as fill");
        }
        wgpu::PolygonMode::Fill
    }

    fn bind_group(
        &self,
        layout: &wgpu::BindGroupLayout,
        label: &str,
        slice: BufferSlice,
    ) -> Result<wgpu::BindGroup> {
        let buffer = self.buffer(slice.buffer)?;
        Ok(self.gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset: slice.offset,
                    size: NonZeroU64::new(slice.size),
                }),
            }],
        }))
    }
}

impl GpuBackend for WgpuBackend<'_> {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId> {
        let limit = self.gpu.device().limits().max_buffer_size;
        if desc.size > limit {
            bail!("{} of {} bytes exceeds the device limit of {limit}", desc.label, desc.size);
        }

        let buffer = self.gpu.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label.as_str()),
            size: desc.size,
            usage: buffer_usage(desc.kind, desc.memory),
            mapped_at_creation: false,
        });
        let id = BufferId(self.next_id());
        log::debug!("{id}: {} ({} bytes, {:?})", desc.label, desc.size, desc.memory);
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(b) = self.buffers.remove(&buffer) {
            b.destroy();
        }
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, bytes: &[u8]) -> Result<()> {
        let target = self.buffer(buffer)?;
        self.gpu.queue().write_buffer(target, offset, bytes);
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
        let source = self.buffer(src)?;
        let target = self.buffer(dst)?;
        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kiln copy encoder"),
            });
        encoder.copy_buffer_to_buffer(source, src_offset, target, dst_offset, size);
        self.gpu.queue().submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn create_pipeline(&mut self, shader: &Shader, mode: RasterMode) -> Result<PipelineId> {
        let polygon_mode = self.polygon_mode(mode);
        let device = self.gpu.device();

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(shader.label.as_str()),
            source: wgpu::ShaderSource::Wgsl(shader.source.clone()),
        });
        let info = pollster::block_on(module.get_compilation_info());
        if let Some(err) = info
            .messages
            .iter()
            .find(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
        {
            bail!("{} failed to compile: {}", shader.label, err.message);
        }

        let attributes: Vec<wgpu::VertexAttribute> = shader
            .attributes
            .iter()
            .map(|a| wgpu::VertexAttribute {
                format: vertex_format(a.format),
                offset: u64::from(a.offset),
                shader_location: a.location,
            })
            .collect();

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(shader.label.as_str()),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: u64::from(shader.vertex_stride),
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &attributes,
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.gpu.surface_format(),
                    blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: primitive_topology(shader.topology),
                strip_index_format: shader.topology.is_strip().then_some(wgpu::IndexFormat::Uint16),
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let id = PipelineId(self.next_id());
        self.pipelines.insert(id, pipeline);
        Ok(id)
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        self.pipelines.remove(&pipeline);
    }

    fn begin_frame(&mut self) -> Result<FrameBegin> {
        if self.frame.take().is_some() {
            log::warn!("previous frame was never submitted; discarding it");
        }
        let size = self.gpu.size();
        if size.width == 0 || size.height == 0 {
            return Ok(FrameBegin::Skip);
        }

        match self.gpu.acquire() {
            Ok(frame) => {
                self.frame = Some(frame);
                Ok(FrameBegin::Ready)
            }
            Err(err) => match SurfaceErrorAction::classify(&err) {
                SurfaceErrorAction::Reconfigured => {
                    log::info!("surface {err}; reconfiguring");
                    self.gpu.reconfigure();
                    Ok(FrameBegin::Rebuild)
                }
                SurfaceErrorAction::SkipFrame => {
                    log::debug!("surface {err}; skipping frame");
                    Ok(FrameBegin::Skip)
                }
                SurfaceErrorAction::Fatal => Err(anyhow!(err).context("failed to acquire surface texture")),
            },
        }
    }

    fn submit(&mut self, commands: &CommandList) -> Result<()> {
        let frame = self.frame.take().context("submit without an acquired frame")?;

        // Bind groups must exist before the pass starts recording.
        let mut globals = HashMap::new();
        let mut objects = HashMap::new();
        for cmd in commands.commands() {
            match *cmd {
                RenderCommand::SetGlobals(s) if !globals.contains_key(&s) => {
                    globals.insert(s, self.bind_group(&self.globals_layout, "kiln globals", s)?);
                }
                RenderCommand::SetObjects(s) if !objects.contains_key(&s) => {
                    objects.insert(s, self.bind_group(&self.objects_layout, "kiln objects", s)?);
                }
                _ => {}
            }
        }

        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kiln frame encoder"),
            });

        {
            let load = match commands.clear {
                Some(c) => wgpu::LoadOp::Clear(c.to_wgpu()),
                None => wgpu::LoadOp::Load,
            };
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("kiln pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            for cmd in commands.commands() {
                match cmd {
                    RenderCommand::SetPipeline(id) => {
                        let pipeline = self
                            .pipelines
                            .get(id)
                            .with_context(|| format!("unknown pipeline {id:?}"))?;
                        rpass.set_pipeline(pipeline);
                    }
                    RenderCommand::SetIndexBuffer(s) => {
                        let b = self.buffer(s.buffer)?;
                        rpass.set_index_buffer(b.slice(s.offset..s.offset + s.size), wgpu::IndexFormat::Uint16);
                    }
                    RenderCommand::SetVertexBuffer(s) => {
                        let b = self.buffer(s.buffer)?;
                        rpass.set_vertex_buffer(0, b.slice(s.offset..s.offset + s.size));
                    }
                    RenderCommand::SetGlobals(s) => rpass.set_bind_group(0, &globals[s], &[]),
                    RenderCommand::SetObjects(s) => rpass.set_bind_group(1, &objects[s], &[]),
                    RenderCommand::DrawIndexed { indices, base_vertex } => {
                        rpass.draw_indexed(indices.clone(), *base_vertex, 0..1);
                    }
                    RenderCommand::Draw { vertices } => rpass.draw(vertices.clone(), 0..1),
                }
            }
        }

        self.gpu.queue().submit(std::iter::once(encoder.finish()));
        frame.surface_texture.present();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        // Any acquired texture belongs to the old configuration.
        self.frame = None;
        self.gpu.resize(PhysicalSize::new(width, height));
    }

    fn frames_in_flight(&self) -> u32 {
        self.gpu.frame_latency().max(1)
    }
}

fn buffer_usage(kind: BufferKind, memory: MemoryKind) -> wgpu::BufferUsages {
    use wgpu::BufferUsages as U;

    if memory == MemoryKind::Staging {
        return U::COPY_SRC | U::COPY_DST;
    }
    let usage = match kind {
        BufferKind::Vertex => U::VERTEX,
        BufferKind::Index => U::INDEX,
        BufferKind::Uniform => U::UNIFORM,
        BufferKind::Storage => U::STORAGE,
    };
    usage | U::COPY_DST
}

fn vertex_format(format: AttributeFormat) -> wgpu::VertexFormat {
    match format {
        AttributeFormat::Float32 => wgpu::VertexFormat::Float32,
        AttributeFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        AttributeFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
        AttributeFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
        AttributeFormat::Uint32 => wgpu::VertexFormat::Uint32,
    }
}

fn primitive_topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::PointList => wgpu::PrimitiveTopology::PointList,
        Topology::LineList => wgpu::PrimitiveTopology::LineList,
        Topology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Topology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

fn bgl_uniform(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bgl_storage_ro(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
