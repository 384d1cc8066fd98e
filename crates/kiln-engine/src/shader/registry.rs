use std::borrow::Cow;

use anyhow::{Result, bail, ensure};

use crate::draw::Vertex;

use super::indices::RESTART_INDEX;
use super::{Shader, ShaderDesc, ShaderId, Topology};

const SOLID_WGSL: &str = concat!(include_str!("shaders/common.wgsl"), include_str!("shaders/solid.wgsl"));
const CIRCLE_WGSL: &str = concat!(include_str!("shaders/common.wgsl"), include_str!("shaders/circle.wgsl"));

/// Ids of the shaders every registry starts with.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Builtins {
    pub point: ShaderId,
    pub line: ShaderId,
    pub triangle: ShaderId,
    pub rect: ShaderId,
    pub rect_outline: ShaderId,
    pub circle: ShaderId,
}

/// Shaders known to the renderer. Registration is append-only; shaders live
/// for the renderer's lifetime.
#[derive(Debug)]
pub struct ShaderRegistry {
    shaders: Vec<Shader>,
    builtins: Builtins,
}

impl ShaderRegistry {
    /// Creates a registry holding the built-in shaders.
    pub fn new() -> Self {
        let mut shaders = Vec::new();
        let mut add = |label: &str, source: &'static str, topology, pattern: &[u16], vertices| {
            insert(
                &mut shaders,
                ShaderDesc {
                    label: label.to_string(),
                    source: Cow::Borrowed(source),
                    topology,
                    vertex_stride: Vertex::STRIDE,
                    attributes: Vertex::ATTRIBUTES.to_vec(),
                    index_pattern: Some(pattern.to_vec()),
                    vertices_per_instance: vertices,
                },
            )
        };

        let builtins = Builtins {
            point: add("kiln point", SOLID_WGSL, Topology::PointList, &[0], 1),
            line: add("kiln line", SOLID_WGSL, Topology::LineList, &[0, 1], 2),
            triangle: add("kiln triangle", SOLID_WGSL, Topology::TriangleList, &[0, 1, 2], 3),
            rect: add("kiln rect", SOLID_WGSL, Topology::TriangleList, &[0, 1, 2, 0, 2, 3], 4),
            rect_outline: add("kiln rect outline", SOLID_WGSL, Topology::LineStrip, &[0, 1, 2, 3, 0], 4),
            circle: add("kiln circle", CIRCLE_WGSL, Topology::TriangleList, &[0, 1, 2, 0, 2, 3], 4),
        };

        Self { shaders, builtins }
    }

    #[inline]
    pub fn builtins(&self) -> Builtins {
        self.builtins
    }

    /// Validates and registers a shader.
    pub fn register(&mut self, desc: ShaderDesc) -> Result<ShaderId> {
        validate(&desc)?;
        let id = insert(&mut self.shaders, desc);
        log::debug!("registered shader {:?} ({})", id, self.shaders[id.index()].label);
        Ok(id)
    }

    #[inline]
    pub fn get(&self, id: ShaderId) -> Option<&Shader> {
        self.shaders.get(id.index())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shader> {
        self.shaders.iter()
    }
}

impl Default for ShaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn insert(shaders: &mut Vec<Shader>, desc: ShaderDesc) -> ShaderId {
    let id = ShaderId(shaders.len() as u32);
    shaders.push(Shader {
        id,
        label: desc.label,
        source: desc.source,
        topology: desc.topology,
        vertex_stride: desc.vertex_stride,
        attributes: desc.attributes,
        index_pattern: desc.index_pattern,
        vertices_per_instance: desc.vertices_per_instance,
    });
    id
}

fn validate(desc: &ShaderDesc) -> Result<()> {
    ensure!(desc.vertex_stride > 0, "{}: vertex stride must be non-zero", desc.label);
    ensure!(desc.vertex_stride % 4 == 0, "{}: vertex stride must be a multiple of 4", desc.label);
    ensure!(desc.vertices_per_instance > 0, "{}: vertices_per_instance must be non-zero", desc.label);
    ensure!(
        desc.vertices_per_instance <= u32::from(u16::MAX),
        "{}: an instance must fit the 16-bit index space",
        desc.label
    );

    for attr in &desc.attributes {
        ensure!(
            attr.offset + attr.format.size() <= desc.vertex_stride,
            "{}: attribute at location {} overruns the vertex stride",
            desc.label,
            attr.location
        );
    }

    if let Some(pattern) = &desc.index_pattern {
        ensure!(!pattern.is_empty(), "{}: index pattern is empty", desc.label);
        for &i in pattern {
            if i == RESTART_INDEX {
                if !desc.topology.is_strip() {
                    bail!("{}: restart index in a list topology", desc.label);
                }
                continue;
            }
            ensure!(
                u32::from(i) < desc.vertices_per_instance,
                "{}: index {i} is outside the instance's {} vertices",
                desc.label,
                desc.vertices_per_instance
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{AttributeFormat, VertexAttribute};

    fn desc(pattern: Option<Vec<u16>>, topology: Topology) -> ShaderDesc {
        ShaderDesc {
            label: "test".into(),
            source: Cow::Borrowed(SOLID_WGSL),
            topology,
            vertex_stride: 16,
            attributes: vec![VertexAttribute { location: 0, offset: 0, format: AttributeFormat::Float32x4 }],
            index_pattern: pattern,
            vertices_per_instance: 3,
        }
    }

    #[test]
    fn builtins_are_registered_and_valid() {
        let reg = ShaderRegistry::new();
        assert_eq!(reg.len(), 6);
        for shader in reg.iter() {
            let d = ShaderDesc {
                label: shader.label.clone(),
                source: shader.source.clone(),
                topology: shader.topology,
                vertex_stride: shader.vertex_stride,
                attributes: shader.attributes.clone(),
                index_pattern: shader.index_pattern.clone(),
                vertices_per_instance: shader.vertices_per_instance,
            };
            validate(&d).unwrap();
        }
        let b = reg.builtins();
        assert_eq!(reg.get(b.rect).unwrap().instance_size(), 4 * 36);
        assert_eq!(reg.get(b.line).unwrap().instance_size(), 2 * 36);
    }

    #[test]
    fn register_assigns_sequential_ids() {
        let mut reg = ShaderRegistry::new();
        let a = reg.register(desc(Some(vec![0, 1, 2]), Topology::TriangleList)).unwrap();
        let b = reg.register(desc(None, Topology::TriangleList)).unwrap();
        assert_eq!(a.index(), 6);
        assert_eq!(b.index(), 7);
        assert!(reg.get(b).unwrap().index_pattern.is_none());
    }

    #[test]
    fn pattern_outside_instance_is_rejected() {
        let mut reg = ShaderRegistry::new();
        assert!(reg.register(desc(Some(vec![0, 1, 3]), Topology::TriangleList)).is_err());
    }

    #[test]
    fn restart_only_allowed_for_strips() {
        let mut reg = ShaderRegistry::new();
        assert!(reg.register(desc(Some(vec![0, 1, RESTART_INDEX]), Topology::TriangleList)).is_err());
        assert!(reg.register(desc(Some(vec![0, 1, 2, RESTART_INDEX]), Topology::TriangleStrip)).is_ok());
    }

    #[test]
    fn attribute_overrun_is_rejected() {
        let mut reg = ShaderRegistry::new();
        let mut d = desc(None, Topology::TriangleList);
        d.attributes.push(VertexAttribute { location: 1, offset: 12, format: AttributeFormat::Float32x2 });
        assert!(reg.register(d).is_err());
    }
}
