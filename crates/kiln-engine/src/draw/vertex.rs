use bytemuck::{Pod, Zeroable};

use crate::shader::{AttributeFormat, VertexAttribute};

/// Vertex format shared by the built-in shaders.
///
/// Positions are logical pixels (top-left origin, +Y down); `object` indexes
/// the frame's object table.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f32; 4], // premultiplied
    pub object: u32,
}

impl Vertex {
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

    pub const ATTRIBUTES: [VertexAttribute; 4] = [
        VertexAttribute { location: 0, offset: 0, format: AttributeFormat::Float32x2 },
        VertexAttribute { location: 1, offset: 8, format: AttributeFormat::Float32x2 },
        VertexAttribute { location: 2, offset: 16, format: AttributeFormat::Float32x4 },
        VertexAttribute { location: 3, offset: 32, format: AttributeFormat::Uint32 },
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_struct() {
        assert_eq!(Vertex::STRIDE, 36);
        let last = Vertex::ATTRIBUTES[3];
        assert_eq!(last.offset + last.format.size(), Vertex::STRIDE);
    }
}
