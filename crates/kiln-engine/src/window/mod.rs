//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and Window, and wires them to a
//! [`Renderer`](crate::core::Renderer) over the wgpu backend.

mod runtime;

pub use runtime::{App, Runtime, RuntimeConfig, WindowRenderer};
