use core::fmt;
use core::ops::BitOr;

/// What a buffer is bound as.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
    Uniform,
    Storage,
}

impl BufferKind {
    pub fn name(self) -> &'static str {
        match self {
            BufferKind::Vertex => "vertex",
            BufferKind::Index => "index",
            BufferKind::Uniform => "uniform",
            BufferKind::Storage => "storage",
        }
    }
}

/// How CPU-side writes reach device memory.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum StorageTarget {
    /// Direct write into CPU-visible memory.
    Coherent,
    /// Staged through a persistent per-buffer staging buffer, then GPU-copied.
    Writable,
    /// Staged once through a throwaway staging buffer; never rewritten.
    Immutable,
}

impl StorageTarget {
    pub fn name(self) -> &'static str {
        match self {
            StorageTarget::Coherent => "coherent",
            StorageTarget::Writable => "writable",
            StorageTarget::Immutable => "immutable",
        }
    }
}

/// Lifetime flags of a page.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct PageFlags(u8);

impl PageFlags {
    pub const NONE: PageFlags = PageFlags(0);

    /// Every allocation is released by the next `garbage_collect`.
    pub const TEMPORARY: PageFlags = PageFlags(1 << 0);

    #[inline]
    pub const fn contains(self, other: PageFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn is_temporary(self) -> bool {
        self.contains(PageFlags::TEMPORARY)
    }
}

impl BitOr for PageFlags {
    type Output = PageFlags;

    #[inline]
    fn bitor(self, rhs: PageFlags) -> PageFlags {
        PageFlags(self.0 | rhs.0)
    }
}

/// The triple every buffer of one page satisfies.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Feature {
    pub kind: BufferKind,
    pub target: StorageTarget,
    pub flags: PageFlags,
}

impl Feature {
    #[inline]
    pub const fn new(kind: BufferKind, target: StorageTarget, flags: PageFlags) -> Self {
        Self { kind, target, flags }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.name(), self.target.name())?;
        if self.flags.is_temporary() {
            f.write_str("/temporary")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine() {
        let flags = PageFlags::NONE | PageFlags::TEMPORARY;
        assert!(flags.is_temporary());
        assert!(!PageFlags::NONE.is_temporary());
        assert!(flags.contains(PageFlags::NONE));
    }

    #[test]
    fn feature_display_names_all_parts() {
        let f = Feature::new(BufferKind::Vertex, StorageTarget::Coherent, PageFlags::TEMPORARY);
        assert_eq!(f.to_string(), "vertex/coherent/temporary");

        let f = Feature::new(BufferKind::Index, StorageTarget::Immutable, PageFlags::NONE);
        assert_eq!(f.to_string(), "index/immutable");
    }
}
