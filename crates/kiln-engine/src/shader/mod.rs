//! Shader collaborator.
//!
//! Shaders carry everything the batching and execution stages need besides
//! the program itself: topology, vertex layout, the per-instance index
//! pattern and how many vertices one instance spans.

mod indices;
mod registry;
mod types;

pub use indices::{BakedIndices, RESTART_INDEX, bake_indices, instance_capacity};
pub use registry::{Builtins, ShaderRegistry};
pub use types::{
    AttributeFormat, RasterMode, Shader, ShaderDesc, ShaderId, Topology, VertexAttribute,
};
