use std::borrow::Cow;
use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};

use crate::device::{BufferDesc, BufferId, GpuBackend, MemoryKind};

use super::arena::Arena;
use super::{Feature, PageConfig, StorageTarget};

/// Location of one claimed range, as handed out by a [`Page`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct PageAlloc {
    pub buffer: BufferId,
    pub offset: u64,
    pub size: u64,
    pub generation: u32,
}

/// Occupancy summary of one page.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct PageStats {
    pub areas: usize,
    pub capacity: u64,
    pub used: u64,
    pub allocations: usize,
}

/// One physical buffer and its allocator.
struct Area {
    arena: Arena,
    /// Persistent staging buffer (writable pages only), created on first write.
    staging: Option<BufferId>,
    /// Consecutive garbage collections this area has been idle for.
    idle: u32,
    /// Written since the last collection. Temporary areas are always empty
    /// at collection time, so emptiness alone does not mean idle.
    touched: bool,
}

/// Allocation strategy for one feature triple.
///
/// Owns every physical buffer ("area") of that feature and routes writes to
/// them through one [`Arena`] per buffer.
pub struct Page {
    feature: Feature,
    config: PageConfig,
    max_buffer_size: u64,
    release_after: u32,
    areas: BTreeMap<BufferId, Area>,
    /// Allocations of a temporary page awaiting the next collection.
    garbage: Vec<PageAlloc>,
}

impl Page {
    pub(crate) fn new(
        feature: Feature,
        config: PageConfig,
        max_buffer_size: u64,
        release_after: u32,
    ) -> Self {
        let alignment = config.alignment.max(wgpu::COPY_BUFFER_ALIGNMENT);
        assert!(alignment.is_power_of_two(), "{feature} page alignment {alignment} is not a power of two");

        Self {
            feature,
            config: PageConfig::new(config.default_capacity.next_multiple_of(alignment), alignment),
            max_buffer_size,
            release_after,
            areas: BTreeMap::new(),
            garbage: Vec::new(),
        }
    }

    #[inline]
    pub fn feature(&self) -> Feature {
        self.feature
    }

    #[inline]
    pub fn config(&self) -> PageConfig {
        self.config
    }

    /// Claims space for `bytes` and uploads them with the page's storage strategy.
    pub(crate) fn write(&mut self, backend: &mut dyn GpuBackend, bytes: &[u8]) -> Result<PageAlloc> {
        let size = bytes.len() as u64;
        anyhow::ensure!(size > 0, "empty write to {} page", self.feature);

        let (buffer, node) = match self.claim(size) {
            Some(found) => found,
            None => {
                let buffer = self.grow(backend, size)?;
                let area = self.areas.get_mut(&buffer).context("new area missing")?;
                let node = area
                    .arena
                    .claim(size)
                    .with_context(|| format!("fresh {} buffer cannot hold {size} bytes", self.feature))?;
                (buffer, node)
            }
        };

        let alloc = PageAlloc {
            buffer,
            offset: node.offset,
            size,
            generation: node.generation,
        };

        if let Err(err) = self.upload(backend, &alloc, bytes) {
            self.release(&alloc);
            return Err(err);
        }

        if let Some(area) = self.areas.get_mut(&buffer) {
            area.touched = true;
        }
        if self.feature.flags.is_temporary() {
            self.garbage.push(alloc);
        }
        Ok(alloc)
    }

    /// Releases an allocation returned by [`write`](Self::write).
    ///
    /// # Panics
    /// Panics if the allocation is unknown, stale, already freed, or belongs
    /// to a temporary page.
    pub(crate) fn free(&mut self, alloc: &PageAlloc) {
        assert!(
            !self.feature.flags.is_temporary(),
            "{} allocation at {}+{} is collected automatically and must not be freed",
            self.feature,
            alloc.buffer,
            alloc.offset,
        );
        self.release(alloc);
    }

    /// Frees every pending temporary allocation, then releases idle areas.
    ///
    /// Returns the number of allocations collected.
    pub(crate) fn garbage_collect(&mut self, backend: &mut dyn GpuBackend) -> usize {
        let collected = self.garbage.len();
        for alloc in std::mem::take(&mut self.garbage) {
            self.release(&alloc);
        }
        self.shrink(backend);
        collected
    }

    /// Destroys every buffer of this page.
    pub(crate) fn destroy(&mut self, backend: &mut dyn GpuBackend) {
        for (buffer, area) in std::mem::take(&mut self.areas) {
            destroy_area(backend, buffer, area);
        }
        self.garbage.clear();
    }

    pub fn stats(&self) -> PageStats {
        self.areas.values().fold(PageStats::default(), |mut s, area| {
            s.areas += 1;
            s.capacity += area.arena.capacity();
            s.used += area.arena.used();
            s.allocations += area.arena.claimed();
            s
        })
    }

    /// Pending temporary allocations.
    #[inline]
    pub fn pending_garbage(&self) -> usize {
        self.garbage.len()
    }

    fn claim(&mut self, size: u64) -> Option<(BufferId, super::NodeInfo)> {
        self.areas
            .iter_mut()
            .find_map(|(&buffer, area)| area.arena.claim(size).map(|node| (buffer, node)))
    }

    fn release(&mut self, alloc: &PageAlloc) {
        let feature = self.feature;
        let area = self.areas.get_mut(&alloc.buffer).unwrap_or_else(|| {
            panic!("free of {}+{} in {feature} page: buffer not owned by this page", alloc.buffer, alloc.offset)
        });

        match area.arena.get(alloc.offset) {
            Some(node) if node.generation == alloc.generation => {
                area.arena.free(alloc.offset);
            }
            _ => panic!(
                "free of {}+{} in {feature} page: allocation is stale or already freed",
                alloc.buffer, alloc.offset
            ),
        }
    }

    /// Allocates a new physical buffer large enough for `size` bytes.
    fn grow(&mut self, backend: &mut dyn GpuBackend, size: u64) -> Result<BufferId> {
        let aligned = size
            .checked_next_multiple_of(self.config.alignment)
            .context("allocation size overflows")?;
        let capacity = aligned.max(self.config.default_capacity);

        if capacity > self.max_buffer_size {
            bail!(
                "{} request of {size} bytes exceeds the maximum buffer size of {} bytes",
                self.feature,
                self.max_buffer_size
            );
        }

        let buffer = backend
            .create_buffer(&BufferDesc {
                label: format!("kiln {} area", self.feature),
                size: capacity,
                kind: self.feature.kind,
                memory: match self.feature.target {
                    StorageTarget::Coherent => MemoryKind::HostVisible,
                    StorageTarget::Writable | StorageTarget::Immutable => MemoryKind::DeviceLocal,
                },
            })
            .with_context(|| format!("failed to create {} buffer of {capacity} bytes", self.feature))?;

        log::debug!("{} page: new area {buffer} ({capacity} bytes)", self.feature);

        self.areas.insert(
            buffer,
            Area {
                arena: Arena::new(capacity, self.config.alignment),
                staging: None,
                idle: 0,
                touched: false,
            },
        );
        Ok(buffer)
    }

    fn upload(&mut self, backend: &mut dyn GpuBackend, alloc: &PageAlloc, bytes: &[u8]) -> Result<()> {
        let payload = pad_to_copy_alignment(bytes);
        let len = payload.len() as u64;

        match self.feature.target {
            StorageTarget::Coherent => backend.write_buffer(alloc.buffer, alloc.offset, &payload),

            StorageTarget::Writable => {
                let staging = self.staging_for(backend, alloc.buffer)?;
                backend.write_buffer(staging, alloc.offset, &payload)?;
                backend.copy_buffer(staging, alloc.offset, alloc.buffer, alloc.offset, len)
            }

            StorageTarget::Immutable => {
                let staging = backend.create_buffer(&BufferDesc {
                    label: format!("kiln {} upload", self.feature),
                    size: len,
                    kind: self.feature.kind,
                    memory: MemoryKind::Staging,
                })?;
                let copied = backend
                    .write_buffer(staging, 0, &payload)
                    .and_then(|()| backend.copy_buffer(staging, 0, alloc.buffer, alloc.offset, len));
                backend.destroy_buffer(staging);
                copied
            }
        }
        .with_context(|| format!("upload of {} bytes to {} failed", bytes.len(), self.feature))
    }

    fn staging_for(&mut self, backend: &mut dyn GpuBackend, buffer: BufferId) -> Result<BufferId> {
        let feature = self.feature;
        let area = self.areas.get_mut(&buffer).context("area missing for staging")?;
        if let Some(staging) = area.staging {
            return Ok(staging);
        }

        let staging = backend.create_buffer(&BufferDesc {
            label: format!("kiln {feature} staging"),
            size: area.arena.capacity(),
            kind: feature.kind,
            memory: MemoryKind::Staging,
        })?;
        log::debug!("{feature} page: staging {staging} for {buffer}");
        area.staging = Some(staging);
        Ok(staging)
    }

    /// Releases areas that stayed idle (empty and unwritten) for more than
    /// `release_after` collections.
    ///
    /// A page with no busy area keeps one default-sized area.
    fn shrink(&mut self, backend: &mut dyn GpuBackend) {
        let default_capacity = self.config.default_capacity;
        let mut kept_default = self
            .areas
            .values()
            .any(|area| area.touched || !area.arena.is_empty());
        let mut released = Vec::new();

        for (&buffer, area) in self.areas.iter_mut() {
            let touched = std::mem::take(&mut area.touched);
            if touched || !area.arena.is_empty() {
                area.idle = 0;
                continue;
            }
            area.idle = area.idle.saturating_add(1);

            let is_default = area.arena.capacity() == default_capacity;
            if is_default && !kept_default {
                kept_default = true;
                continue;
            }
            if area.idle > self.release_after {
                released.push(buffer);
            }
        }

        for buffer in released {
            if let Some(area) = self.areas.remove(&buffer) {
                log::debug!("{} page: releasing idle area {buffer}", self.feature);
                destroy_area(backend, buffer, area);
            }
        }
    }
}

fn destroy_area(backend: &mut dyn GpuBackend, buffer: BufferId, area: Area) {
    if let Some(staging) = area.staging {
        backend.destroy_buffer(staging);
    }
    backend.destroy_buffer(buffer);
}

/// GPU copies and queue writes need a length multiple of four.
fn pad_to_copy_alignment(bytes: &[u8]) -> Cow<'_, [u8]> {
    let padded = (bytes.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT) as usize;
    if padded == bytes.len() {
        Cow::Borrowed(bytes)
    } else {
        let mut v = Vec::with_capacity(padded);
        v.extend_from_slice(bytes);
        v.resize(padded, 0);
        Cow::Owned(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingBackend;
    use crate::heap::{BufferKind, PageFlags};

    fn page(target: StorageTarget, flags: PageFlags) -> Page {
        Page::new(
            Feature::new(BufferKind::Vertex, target, flags),
            PageConfig::new(256, 32),
            4096,
            2,
        )
    }

    // ── growth ────────────────────────────────────────────────────────────

    #[test]
    fn first_write_creates_default_area() {
        let mut gpu = RecordingBackend::new();
        let mut p = page(StorageTarget::Coherent, PageFlags::NONE);

        let a = p.write(&mut gpu, &[1; 40]).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(a.size, 40);
        assert_eq!(gpu.buffer_size(a.buffer), Some(256));
        assert_eq!(p.stats().areas, 1);
    }

    #[test]
    fn writes_share_an_area_until_full() {
        let mut gpu = RecordingBackend::new();
        let mut p = page(StorageTarget::Coherent, PageFlags::NONE);

        let a = p.write(&mut gpu, &[0; 128]).unwrap();
        let b = p.write(&mut gpu, &[0; 100]).unwrap();
        assert_eq!(a.buffer, b.buffer);
        assert_eq!(b.offset, 128);

        let c = p.write(&mut gpu, &[0; 64]).unwrap();
        assert_ne!(c.buffer, a.buffer);
        assert_eq!(p.stats().areas, 2);
    }

    #[test]
    fn oversized_request_gets_dedicated_area() {
        let mut gpu = RecordingBackend::new();
        let mut p = page(StorageTarget::Coherent, PageFlags::NONE);

        let a = p.write(&mut gpu, &[0; 1000]).unwrap();
        assert_eq!(gpu.buffer_size(a.buffer), Some(1024));
    }

    #[test]
    fn request_beyond_max_buffer_size_is_an_error() {
        let mut gpu = RecordingBackend::new();
        let mut p = page(StorageTarget::Coherent, PageFlags::NONE);

        let err = p.write(&mut gpu, &vec![0; 5000]).unwrap_err();
        assert!(err.to_string().contains("maximum buffer size"));
        assert_eq!(gpu.live_buffers(), 0);
    }

    #[test]
    fn empty_write_is_an_error() {
        let mut gpu = RecordingBackend::new();
        let mut p = page(StorageTarget::Coherent, PageFlags::NONE);
        assert!(p.write(&mut gpu, &[]).is_err());
    }

    #[test]
    fn backend_failure_propagates() {
        let mut gpu = RecordingBackend::new();
        gpu.fail_buffer_creation(true);
        let mut p = page(StorageTarget::Coherent, PageFlags::NONE);
        assert!(p.write(&mut gpu, &[1; 8]).is_err());
        assert_eq!(p.stats().areas, 0);
    }

    // ── storage strategies ────────────────────────────────────────────────

    #[test]
    fn coherent_write_lands_directly() {
        let mut gpu = RecordingBackend::new();
        let mut p = page(StorageTarget::Coherent, PageFlags::NONE);

        p.write(&mut gpu, &[7; 32]).unwrap();
        let b = p.write(&mut gpu, &[9, 8, 7]).unwrap();

        let bytes = gpu.buffer_bytes(b.buffer).unwrap();
        assert_eq!(&bytes[32..35], &[9, 8, 7]);
        assert_eq!(gpu.copies().len(), 0);
    }

    #[test]
    fn writable_reuses_one_staging_buffer() {
        let mut gpu = RecordingBackend::new();
        let mut p = page(StorageTarget::Writable, PageFlags::NONE);

        let a = p.write(&mut gpu, &[1; 16]).unwrap();
        let b = p.write(&mut gpu, &[2; 16]).unwrap();

        assert_eq!(gpu.copies().len(), 2);
        assert_eq!(gpu.copies()[0].src, gpu.copies()[1].src);
        assert_eq!(gpu.copies()[1].dst_offset, b.offset);
        assert_eq!(gpu.live_buffers(), 2, "destination + one staging buffer");

        let bytes = gpu.buffer_bytes(a.buffer).unwrap();
        assert_eq!(&bytes[..16], &[1; 16]);
        assert_eq!(&bytes[32..48], &[2; 16]);
    }

    #[test]
    fn immutable_destroys_staging_after_copy() {
        let mut gpu = RecordingBackend::new();
        let mut p = page(StorageTarget::Immutable, PageFlags::NONE);

        let a = p.write(&mut gpu, &[5; 10]).unwrap();
        assert_eq!(gpu.copies().len(), 1);
        assert_eq!(gpu.copies()[0].size, 12, "padded to copy alignment");
        assert_eq!(gpu.live_buffers(), 1);
        assert_eq!(&gpu.buffer_bytes(a.buffer).unwrap()[..10], &[5; 10]);
    }

    // ── free / collection ─────────────────────────────────────────────────

    #[test]
    fn free_returns_space() {
        let mut gpu = RecordingBackend::new();
        let mut p = page(StorageTarget::Coherent, PageFlags::NONE);

        let a = p.write(&mut gpu, &[0; 200]).unwrap();
        p.free(&a);
        let b = p.write(&mut gpu, &[0; 200]).unwrap();
        assert_eq!((a.buffer, a.offset), (b.buffer, b.offset));
    }

    #[test]
    #[should_panic(expected = "stale or already freed")]
    fn double_free_panics() {
        let mut gpu = RecordingBackend::new();
        let mut p = page(StorageTarget::Coherent, PageFlags::NONE);
        let a = p.write(&mut gpu, &[0; 8]).unwrap();
        p.free(&a);
        p.free(&a);
    }

    #[test]
    #[should_panic(expected = "collected automatically")]
    fn freeing_temporary_allocation_panics() {
        let mut gpu = RecordingBackend::new();
        let mut p = page(StorageTarget::Coherent, PageFlags::TEMPORARY);
        let a = p.write(&mut gpu, &[0; 8]).unwrap();
        p.free(&a);
    }

    #[test]
    fn temporary_allocations_are_collected() {
        let mut gpu = RecordingBackend::new();
        let mut p = page(StorageTarget::Coherent, PageFlags::TEMPORARY);

        p.write(&mut gpu, &[0; 64]).unwrap();
        p.write(&mut gpu, &[0; 64]).unwrap();
        assert_eq!(p.pending_garbage(), 2);

        assert_eq!(p.garbage_collect(&mut gpu), 2);
        assert_eq!(p.pending_garbage(), 0);
        assert_eq!(p.stats().used, 0);
    }

    #[test]
    fn idle_areas_are_released_but_one_is_kept() {
        let mut gpu = RecordingBackend::new();
        let mut p = page(StorageTarget::Writable, PageFlags::TEMPORARY);

        for _ in 0..3 {
            p.write(&mut gpu, &[0; 200]).unwrap();
        }
        p.write(&mut gpu, &[0; 600]).unwrap();
        assert_eq!(p.stats().areas, 4);

        // The first collection still sees this frame's writes; after that,
        // release_after = 2 lets areas go on the third idle collection.
        for _ in 0..3 {
            p.garbage_collect(&mut gpu);
            assert_eq!(p.stats().areas, 4);
        }
        p.garbage_collect(&mut gpu);
        assert_eq!(p.stats().areas, 1);
        assert_eq!(p.stats().capacity, 256);
        assert_eq!(gpu.live_buffers(), 2, "kept area + its staging buffer");
    }

    #[test]
    fn busy_area_resets_idle_counter() {
        let mut gpu = RecordingBackend::new();
        let mut p = page(StorageTarget::Coherent, PageFlags::NONE);

        let a = p.write(&mut gpu, &[0; 200]).unwrap();
        let b = p.write(&mut gpu, &[0; 200]).unwrap();
        p.free(&b);
        for _ in 0..5 {
            p.garbage_collect(&mut gpu);
        }
        // `b`'s area is the second default-sized one; `a`'s is busy.
        assert_eq!(p.stats().areas, 1);
        assert_eq!(p.stats().allocations, 1);
        p.free(&a);
    }

    #[test]
    fn temporary_areas_in_use_are_kept() {
        let mut gpu = RecordingBackend::new();
        let mut p = page(StorageTarget::Coherent, PageFlags::TEMPORARY);

        for _ in 0..10 {
            p.write(&mut gpu, &[0; 200]).unwrap();
            p.write(&mut gpu, &[0; 200]).unwrap();
            p.garbage_collect(&mut gpu);
            assert_eq!(p.stats().areas, 2);
        }
        assert_eq!(gpu.live_buffers(), 2);
    }

    #[test]
    fn destroy_releases_everything() {
        let mut gpu = RecordingBackend::new();
        let mut p = page(StorageTarget::Writable, PageFlags::NONE);
        p.write(&mut gpu, &[0; 64]).unwrap();
        p.write(&mut gpu, &[0; 512]).unwrap();
        p.destroy(&mut gpu);
        assert_eq!(gpu.live_buffers(), 0);
        assert_eq!(p.stats(), PageStats::default());
    }
}
