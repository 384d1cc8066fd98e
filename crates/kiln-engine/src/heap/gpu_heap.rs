use std::collections::BTreeMap;

use anyhow::Result;

use crate::device::{BufferId, GpuBackend};
use crate::render::BufferSlice;

use super::page::{Page, PageAlloc};
use super::{BufferKind, Feature, HeapConfig, PageFlags, StorageTarget};

/// Handle to bytes stored in the [`Heap`].
///
/// Not `Copy`: [`Heap::free`] consumes it. Allocations from temporary pages
/// stay valid until the next [`Heap::garbage_collect`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Allocation {
    feature: Feature,
    inner: PageAlloc,
}

impl Allocation {
    #[inline]
    pub fn feature(&self) -> Feature {
        self.feature
    }

    #[inline]
    pub fn buffer(&self) -> BufferId {
        self.inner.buffer
    }

    #[inline]
    pub fn offset(&self) -> u64 {
        self.inner.offset
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.inner.size
    }

    /// The bound range of this allocation.
    #[inline]
    pub fn slice(&self) -> BufferSlice {
        BufferSlice {
            buffer: self.inner.buffer,
            offset: self.inner.offset,
            size: self.inner.size,
        }
    }
}

/// Aggregated occupancy of all pages of one buffer kind.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct KindStats {
    pub pages: usize,
    pub areas: usize,
    pub capacity: u64,
    pub used: u64,
}

/// Heap occupancy, per buffer kind. Telemetry only.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct HeapStats {
    pub kinds: BTreeMap<BufferKind, KindStats>,
}

impl HeapStats {
    pub fn kind(&self, kind: BufferKind) -> KindStats {
        self.kinds.get(&kind).copied().unwrap_or_default()
    }

    pub fn total_capacity(&self) -> u64 {
        self.kinds.values().map(|k| k.capacity).sum()
    }

    pub fn total_used(&self) -> u64 {
        self.kinds.values().map(|k| k.used).sum()
    }
}

/// Registry of pages keyed by feature triple.
///
/// This is the only allocation surface callers see. The heap never owns the
/// backend; every call that may touch GPU resources borrows it.
pub struct Heap {
    config: HeapConfig,
    pages: BTreeMap<Feature, Page>,
}

impl Heap {
    pub fn new(config: HeapConfig) -> Self {
        Self {
            config,
            pages: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Stores `bytes` in a page matching `(kind, target, flags)`, creating the
    /// page on first use.
    pub fn write(
        &mut self,
        backend: &mut dyn GpuBackend,
        bytes: &[u8],
        kind: BufferKind,
        target: StorageTarget,
        flags: PageFlags,
    ) -> Result<Allocation> {
        let feature = Feature::new(kind, target, flags);
        let page = self.page_mut(feature);
        let inner = page.write(backend, bytes)?;
        Ok(Allocation { feature, inner })
    }

    /// Releases an allocation.
    ///
    /// # Panics
    /// Panics on stale, already freed, foreign, or temporary allocations.
    pub fn free(&mut self, alloc: Allocation) {
        let page = self
            .pages
            .get_mut(&alloc.feature)
            .unwrap_or_else(|| panic!("free of {:?}: no {} page exists", alloc.inner, alloc.feature));
        page.free(&alloc.inner);
    }

    /// Collects every temporary allocation and releases idle areas.
    ///
    /// Runs once per frame, after submission. Returns the number of
    /// allocations collected.
    pub fn garbage_collect(&mut self, backend: &mut dyn GpuBackend) -> usize {
        self.pages
            .values_mut()
            .map(|page| page.garbage_collect(backend))
            .sum()
    }

    /// Largest buffer a page of `kind` creates by default.
    ///
    /// Writes no larger than this never need a dedicated buffer.
    pub fn page_capacity(&self, kind: BufferKind) -> u64 {
        let page = self.config.page(kind);
        page.default_capacity.next_multiple_of(page.alignment.max(wgpu::COPY_BUFFER_ALIGNMENT))
    }

    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats::default();
        for (feature, page) in &self.pages {
            let s = page.stats();
            let entry = stats.kinds.entry(feature.kind).or_default();
            entry.pages += 1;
            entry.areas += s.areas;
            entry.capacity += s.capacity;
            entry.used += s.used;
        }
        stats
    }

    /// Destroys every buffer. The heap stays usable and regrows on demand.
    pub fn destroy(&mut self, backend: &mut dyn GpuBackend) {
        for page in self.pages.values_mut() {
            page.destroy(backend);
        }
        self.pages.clear();
        log::debug!("heap destroyed");
    }

    fn page_mut(&mut self, feature: Feature) -> &mut Page {
        let config = &self.config;
        self.pages.entry(feature).or_insert_with(|| {
            log::debug!("heap: new {feature} page");
            Page::new(
                feature,
                config.page(feature.kind),
                config.max_buffer_size,
                config.release_after_idle_collections,
            )
        })
    }
}
