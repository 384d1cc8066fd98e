//! Kiln engine crate.
//!
//! Immediate-mode 2D drawing over wgpu: a paged GPU memory heap, a batch
//! engine that groups consecutive draws by shader and raster mode, and a
//! frame executor that turns those groups into chunked, indexed draw calls.

pub mod batch;
pub mod config;
pub mod coords;
pub mod core;
pub mod device;
pub mod draw;
pub mod heap;
pub mod logging;
pub mod paint;
pub mod render;
pub mod shader;
pub mod window;
