use std::borrow::Cow;

/// Identifier of a registered [`Shader`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ShaderId(pub(crate) u32);

impl ShaderId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Topology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

impl Topology {
    /// Strip topologies honour the primitive-restart sentinel.
    #[inline]
    pub fn is_strip(self) -> bool {
        matches!(self, Topology::LineStrip | Topology::TriangleStrip)
    }
}

/// Rasterization mode of a pipeline.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub enum RasterMode {
    #[default]
    Fill,
    Line,
    Point,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AttributeFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
}

impl AttributeFormat {
    #[inline]
    pub fn size(self) -> u32 {
        match self {
            AttributeFormat::Float32 | AttributeFormat::Uint32 => 4,
            AttributeFormat::Float32x2 => 8,
            AttributeFormat::Float32x3 => 12,
            AttributeFormat::Float32x4 => 16,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub offset: u32,
    pub format: AttributeFormat,
}

/// Registration input for a shader.
#[derive(Debug, Clone)]
pub struct ShaderDesc {
    pub label: String,
    /// WGSL with `vs_main` / `fs_main` entry points.
    pub source: Cow<'static, str>,
    pub topology: Topology,
    pub vertex_stride: u32,
    pub attributes: Vec<VertexAttribute>,
    /// Indices of one instance, relative to its first vertex. `None` selects
    /// the non-indexed path.
    pub index_pattern: Option<Vec<u16>>,
    pub vertices_per_instance: u32,
}

/// A compiled program plus the vertex layout metadata the executor needs.
#[derive(Debug, Clone)]
pub struct Shader {
    pub id: ShaderId,
    pub label: String,
    pub source: Cow<'static, str>,
    pub topology: Topology,
    pub vertex_stride: u32,
    pub attributes: Vec<VertexAttribute>,
    pub index_pattern: Option<Vec<u16>>,
    pub vertices_per_instance: u32,
}

impl Shader {
    /// Bytes of one instance: every vertex of one primitive.
    #[inline]
    pub fn instance_size(&self) -> usize {
        self.vertex_stride as usize * self.vertices_per_instance as usize
    }
}
