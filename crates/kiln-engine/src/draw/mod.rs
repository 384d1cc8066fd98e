//! Primitive geometry.
//!
//! Builders produce one instance worth of [`Vertex`] data for the built-in
//! shaders; `core::Renderer` exposes them as `point`, `line`, `rect`, ...

pub mod primitives;
mod vertex;

pub use vertex::Vertex;
