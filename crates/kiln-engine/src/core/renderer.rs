use std::time::Instant;

use anyhow::{Context, Result};

use crate::batch::{Batcher, DrawGroup};
use crate::config::RendererConfig;
use crate::coords::{Rect, Vec2, Viewport};
use crate::device::{FrameBegin, GpuBackend};
use crate::draw::{Vertex, primitives};
use crate::heap::{Allocation, BufferKind, Heap, HeapStats, PageFlags, StorageTarget};
use crate::paint::Color;
use crate::render::{
    CommandList, FlushStats, FrameExecutor, FrameStats, ObjectData, ObjectId, UniformStaging,
};
use crate::shader::{Builtins, RasterMode, ShaderDesc, ShaderId, ShaderRegistry};

use super::{FrameControl, RendererEvent};

type StatsCallback = Box<dyn FnMut(&FrameStats)>;

#[derive(Debug, Copy, Clone)]
enum FrameState {
    Idle,
    /// `frame_start` acquired a drawable.
    Recording { started: Instant },
    /// `frame_start` was told to skip; draws are discarded until `frame_end`.
    Skipped,
}

/// Immediate-mode 2D renderer.
///
/// Owns the backend and every subsystem built on it. Teardown order is
/// pipelines, then heap buffers, then the backend itself.
pub struct Renderer<B: GpuBackend> {
    heap: Heap,
    shaders: ShaderRegistry,
    batcher: Batcher,
    executor: FrameExecutor,
    staging: UniformStaging,
    config: RendererConfig,

    viewport: Viewport,
    physical_size: (u32, u32),
    scale_factor: f32,
    raster_mode: RasterMode,
    object: ObjectId,

    pending: Vec<RendererEvent>,
    state: FrameState,
    frame_index: u64,
    frames_in_flight: u32,
    culled: u32,

    on_stats: Option<StatsCallback>,
    last_stats: Option<FrameStats>,
    shut_down: bool,

    // Declared last: dropped after everything that may still reference it.
    backend: B,
}

impl<B: GpuBackend> Renderer<B> {
    /// Creates a renderer for a drawable of `width` x `height` physical pixels.
    pub fn new(backend: B, config: RendererConfig, width: u32, height: u32, scale_factor: f32) -> Self {
        let frames_in_flight = config
            .frames_in_flight
            .unwrap_or_else(|| backend.frames_in_flight())
            .max(1);
        log::debug!("renderer: {width}x{height} @ {scale_factor}, {frames_in_flight} frames in flight");

        Self {
            heap: Heap::new(config.heap.clone()),
            shaders: ShaderRegistry::new(),
            batcher: Batcher::new(config.max_groups),
            executor: FrameExecutor::new(),
            staging: UniformStaging::new(),
            viewport: Viewport::from_physical(width, height, scale_factor),
            physical_size: (width, height),
            scale_factor,
            raster_mode: RasterMode::Fill,
            object: ObjectId::IDENTITY,
            pending: Vec::new(),
            state: FrameState::Idle,
            frame_index: 0,
            frames_in_flight,
            culled: 0,
            on_stats: None,
            last_stats: None,
            shut_down: false,
            config,
            backend,
        }
    }

    // ── accessors ─────────────────────────────────────────────────────────

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Logical drawable size.
    #[inline]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[inline]
    pub fn shaders(&self) -> &ShaderRegistry {
        &self.shaders
    }

    #[inline]
    pub fn builtins(&self) -> Builtins {
        self.shaders.builtins()
    }

    pub fn register_shader(&mut self, desc: ShaderDesc) -> Result<ShaderId> {
        self.shaders.register(desc)
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Stores bytes in the renderer's heap. Temporary allocations are
    /// collected after the current frame is submitted.
    pub fn heap_write(
        &mut self,
        bytes: &[u8],
        kind: BufferKind,
        target: StorageTarget,
        flags: PageFlags,
    ) -> Result<Allocation> {
        self.heap.write(&mut self.backend, bytes, kind, target, flags)
    }

    pub fn heap_free(&mut self, alloc: Allocation) {
        self.heap.free(alloc);
    }

    /// Registers the per-frame stats callback, replacing any previous one.
    pub fn on_stats(&mut self, callback: impl FnMut(&FrameStats) + 'static) {
        self.on_stats = Some(Box::new(callback));
    }

    #[inline]
    pub fn last_stats(&self) -> Option<&FrameStats> {
        self.last_stats.as_ref()
    }

    #[inline]
    pub fn is_recording(&self) -> bool {
        matches!(self.state, FrameState::Recording { .. })
    }

    // ── draw state ────────────────────────────────────────────────────────

    /// Sets the raster mode for subsequent draws; returns the previous one.
    pub fn set_raster_mode(&mut self, mode: RasterMode) -> RasterMode {
        std::mem::replace(&mut self.raster_mode, mode)
    }

    #[inline]
    pub fn raster_mode(&self) -> RasterMode {
        self.raster_mode
    }

    /// Adds an entry to this frame's object table. The table is reset after
    /// every frame.
    pub fn push_object(&mut self, data: ObjectData) -> ObjectId {
        self.staging.push_object(data)
    }

    /// Selects the object subsequent primitives are transformed by.
    ///
    /// # Panics
    /// Panics if `id` was not pushed during the current frame.
    pub fn set_object(&mut self, id: ObjectId) {
        assert!(self.staging.contains(id), "object {id:?} is not in this frame's object table");
        self.object = id;
    }

    #[inline]
    pub fn object(&self) -> ObjectId {
        self.object
    }

    // ── primitives ────────────────────────────────────────────────────────

    pub fn point(&mut self, p: Vec2, color: Color) -> bool {
        let shader = self.shaders.builtins().point;
        self.primitive(shader, &primitives::point(p, color, self.object))
    }

    pub fn line(&mut self, a: Vec2, b: Vec2, color: Color) -> bool {
        let shader = self.shaders.builtins().line;
        self.primitive(shader, &primitives::line(a, b, color, self.object))
    }

    pub fn triangle(&mut self, a: Vec2, b: Vec2, c: Vec2, color: Color) -> bool {
        let shader = self.shaders.builtins().triangle;
        self.primitive(shader, &primitives::triangle(a, b, c, color, self.object))
    }

    pub fn rect(&mut self, rect: Rect, color: Color) -> bool {
        let shader = self.shaders.builtins().rect;
        self.primitive(shader, &primitives::quad(rect, color, self.object))
    }

    pub fn rect_outline(&mut self, rect: Rect, color: Color) -> bool {
        let shader = self.shaders.builtins().rect_outline;
        self.primitive(shader, &primitives::quad(rect, color, self.object))
    }

    pub fn circle(&mut self, center: Vec2, radius: f32, color: Color) -> bool {
        let shader = self.shaders.builtins().circle;
        self.primitive(shader, &primitives::circle(center, radius, color, self.object))
    }

    /// Queues one instance of `shader`. Returns `false` when the draw was
    /// discarded (no frame recording, or the group cap was hit).
    ///
    /// # Panics
    /// Panics if `shader` is unknown or `instance` is not exactly one
    /// instance long.
    pub fn enqueue(&mut self, shader: ShaderId, raster_mode: RasterMode, instance: &[u8]) -> bool {
        let shader = self
            .shaders
            .get(shader)
            .unwrap_or_else(|| panic!("enqueue of unknown shader {shader:?}"));
        if !matches!(self.state, FrameState::Recording { .. }) {
            return false;
        }
        self.batcher.enqueue(shader, raster_mode, instance)
    }

    fn primitive(&mut self, shader: ShaderId, vertices: &[Vertex]) -> bool {
        if !self.is_recording() {
            return false;
        }
        if self.config.cull_offscreen
            && self.object == ObjectId::IDENTITY
            && !primitives::bounds(vertices).overlaps(self.viewport.rect())
        {
            self.culled += 1;
            return false;
        }
        self.enqueue(shader, self.raster_mode, bytemuck::cast_slice(vertices))
    }

    // ── lifecycle ─────────────────────────────────────────────────────────

    /// Queues an event for the next `frame_start`.
    pub fn handle_event(&mut self, event: RendererEvent) {
        self.pending.push(event);
    }

    /// Applies pending events and acquires the next drawable.
    ///
    /// Returns `false` when the frame should be skipped; `frame_end` must
    /// still be called and returns `None`.
    ///
    /// # Panics
    /// Panics if a frame is already open.
    pub fn frame_start(&mut self) -> Result<bool> {
        assert!(
            matches!(self.state, FrameState::Idle),
            "frame_start called while a frame is open"
        );
        self.apply_events();

        let started = Instant::now();
        let begin = self.backend.begin_frame().context("failed to begin frame")?;
        match begin {
            FrameBegin::Ready => {
                self.state = FrameState::Recording { started };
                Ok(true)
            }
            FrameBegin::Skip => {
                self.state = FrameState::Skipped;
                Ok(false)
            }
            FrameBegin::Rebuild => {
                log::info!("surface rebuilt; recreating pipelines");
                self.executor.invalidate_pipelines(&mut self.backend);
                self.state = FrameState::Skipped;
                Ok(false)
            }
        }
    }

    /// Bakes, records and submits the frame, then collects frame-scoped
    /// memory.
    ///
    /// # Panics
    /// Panics without a preceding `frame_start`.
    pub fn frame_end(&mut self) -> Result<Option<FrameStats>> {
        let state = std::mem::replace(&mut self.state, FrameState::Idle);
        let started = match state {
            FrameState::Idle => panic!("frame_end called without frame_start"),
            FrameState::Skipped => {
                self.discard_frame();
                return Ok(None);
            }
            FrameState::Recording { started } => started,
        };

        let baked = self.batcher.finish();
        let submitted = self.submit(&baked.groups);
        self.heap.garbage_collect(&mut self.backend);
        self.reset_draw_state();
        let flush = submitted?;

        let culled = std::mem::take(&mut self.culled);
        let stats = FrameStats {
            frame_index: self.frame_index,
            frame_slot: (self.frame_index % u64::from(self.frames_in_flight)) as u32,
            groups: flush.groups,
            draw_calls: flush.draw_calls,
            unique_shaders: flush.unique_shaders,
            instances: flush.instances,
            dropped_instances: baked.dropped,
            culled,
            heap: self.heap.stats(),
            cpu_time: started.elapsed(),
        };
        self.frame_index += 1;

        if let Some(callback) = self.on_stats.as_mut() {
            callback(&stats);
        }
        self.last_stats = Some(stats.clone());
        Ok(Some(stats))
    }

    /// Runs one frame: start, `draw`, end. Any error is logged here and
    /// turned into [`FrameControl::Exit`].
    pub fn render_frame(&mut self, draw: impl FnOnce(&mut Self)) -> FrameControl {
        match self.run_frame(draw) {
            Ok(()) => FrameControl::Continue,
            Err(err) => {
                log::error!("fatal render error: {err:#}");
                FrameControl::Exit
            }
        }
    }

    fn run_frame(&mut self, draw: impl FnOnce(&mut Self)) -> Result<()> {
        if self.frame_start()? {
            draw(self);
        }
        self.frame_end()?;
        Ok(())
    }

    /// Releases every GPU resource. Called by `Drop`; idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.executor.release(&mut self.backend, &mut self.heap);
        self.heap.destroy(&mut self.backend);
        log::debug!("renderer shut down after {} frames", self.frame_index);
    }

    fn submit(&mut self, groups: &[DrawGroup]) -> Result<FlushStats> {
        let bindings = self
            .staging
            .write(&mut self.heap, &mut self.backend, self.viewport)?;

        let mut list = CommandList::new(self.config.clear_color);
        let flush = self
            .executor
            .flush(&mut self.backend, &mut self.heap, &self.shaders, groups, &bindings, &mut list)
            .context("failed to record frame")?;

        self.backend.submit(&list).context("failed to submit frame")?;
        Ok(flush)
    }

    fn discard_frame(&mut self) {
        let baked = self.batcher.finish();
        if !baked.groups.is_empty() {
            log::debug!("discarded {} draw groups of a skipped frame", baked.groups.len());
        }
        self.culled = 0;
        self.reset_draw_state();
    }

    fn reset_draw_state(&mut self) {
        self.staging.reset();
        self.object = ObjectId::IDENTITY;
    }

    fn apply_events(&mut self) {
        for event in std::mem::take(&mut self.pending) {
            match event {
                RendererEvent::Resized { width, height } => {
                    self.physical_size = (width, height);
                    self.backend.resize(width, height);
                    self.viewport = Viewport::from_physical(width, height, self.scale_factor);
                }
                RendererEvent::ScaleFactorChanged { scale_factor } => {
                    self.scale_factor = scale_factor;
                    let (w, h) = self.physical_size;
                    self.viewport = Viewport::from_physical(w, h, scale_factor);
                }
                RendererEvent::SurfaceInvalidated => {
                    log::info!("surface invalidated; recreating pipelines");
                    self.executor.invalidate_pipelines(&mut self.backend);
                }
                RendererEvent::DeviceInvalidated => {
                    log::info!("device invalidated; releasing all GPU resources");
                    self.executor.release(&mut self.backend, &mut self.heap);
                    self.heap.destroy(&mut self.backend);
                }
            }
        }
    }
}

impl<B: GpuBackend> Drop for Renderer<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
