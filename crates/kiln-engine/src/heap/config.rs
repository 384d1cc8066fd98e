use super::BufferKind;

/// Sizing policy for the pages of one buffer kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PageConfig {
    /// Size of a new physical buffer unless a single request needs more.
    pub default_capacity: u64,

    /// Alignment of every allocation offset and capacity.
    ///
    /// Uniform and storage bindings need the device's offset alignment
    /// (256 bytes on most adapters).
    pub alignment: u64,
}

impl PageConfig {
    #[inline]
    pub const fn new(default_capacity: u64, alignment: u64) -> Self {
        Self { default_capacity, alignment }
    }
}

/// Heap configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapConfig {
    pub vertex: PageConfig,
    pub index: PageConfig,
    pub uniform: PageConfig,
    pub storage: PageConfig,

    /// Requests that would need a larger buffer are rejected.
    pub max_buffer_size: u64,

    /// Garbage collections an area may stay empty before it is released.
    ///
    /// One default-sized empty area per page is always retained.
    pub release_after_idle_collections: u32,
}

impl HeapConfig {
    pub fn page(&self, kind: BufferKind) -> PageConfig {
        match kind {
            BufferKind::Vertex => self.vertex,
            BufferKind::Index => self.index,
            BufferKind::Uniform => self.uniform,
            BufferKind::Storage => self.storage,
        }
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            vertex: PageConfig::new(1 << 20, 16),
            index: PageConfig::new(1 << 20, 16),
            uniform: PageConfig::new(64 << 10, 256),
            storage: PageConfig::new(256 << 10, 256),
            max_buffer_size: 256 << 20,
            release_after_idle_collections: 3,
        }
    }
}
