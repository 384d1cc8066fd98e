//! GPU memory heap.
//!
//! Byte ranges inside physical buffers, grouped by feature triple
//! (buffer kind, storage target, lifetime flags):
//! - `Arena`: free-list allocator over one buffer
//! - `Page`: every buffer of one feature, plus the upload strategy
//! - `Heap`: feature → page registry; the only surface callers use

mod arena;
mod config;
mod feature;
mod gpu_heap;
mod page;

pub use arena::{Arena, NodeInfo};
pub use config::{HeapConfig, PageConfig};
pub use feature::{BufferKind, Feature, PageFlags, StorageTarget};
pub use gpu_heap::{Allocation, Heap, HeapStats, KindStats};
pub use page::PageStats;
