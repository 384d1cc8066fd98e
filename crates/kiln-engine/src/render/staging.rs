//! Per-frame descriptor data.
//!
//! Group 0 carries the viewport; group 1 carries the object table that
//! vertices index through their `object` attribute. Both are written once per
//! frame into temporary heap pages and collected after submission.

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};

use crate::coords::{Vec2, Viewport};
use crate::device::GpuBackend;
use crate::heap::{Allocation, BufferKind, Heap, PageFlags, StorageTarget};
use crate::paint::Color;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct GlobalUniform {
    pub viewport: [f32; 2],
    pub inv_viewport: [f32; 2],
}

impl GlobalUniform {
    pub fn new(viewport: Viewport) -> Self {
        let w = viewport.width.max(1.0);
        let h = viewport.height.max(1.0);
        Self {
            viewport: [w, h],
            inv_viewport: [1.0 / w, 1.0 / h],
        }
    }
}

/// Per-object transform and tint, applied in the vertex stage.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ObjectData {
    pub offset: [f32; 2],
    pub scale: [f32; 2],
    pub tint: [f32; 4], // premultiplied
}

impl ObjectData {
    pub const IDENTITY: ObjectData = ObjectData {
        offset: [0.0, 0.0],
        scale: [1.0, 1.0],
        tint: [1.0, 1.0, 1.0, 1.0],
    };

    #[inline]
    pub fn translated(offset: Vec2) -> Self {
        Self { offset: [offset.x, offset.y], ..Self::IDENTITY }
    }

    #[inline]
    pub fn with_scale(self, scale: Vec2) -> Self {
        Self { scale: [scale.x, scale.y], ..self }
    }

    #[inline]
    pub fn with_tint(self, tint: Color) -> Self {
        Self { tint: [tint.r, tint.g, tint.b, tint.a], ..self }
    }
}

impl Default for ObjectData {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Index into the frame's object table.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct ObjectId(pub(crate) u32);

impl ObjectId {
    /// Object 0: no transform, no tint.
    pub const IDENTITY: ObjectId = ObjectId(0);

    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Heap allocations bound by every draw call of a frame.
#[derive(Debug, Clone)]
pub struct FrameBindings {
    pub globals: Allocation,
    pub objects: Allocation,
}

/// Collects object data during a frame and uploads it at flush.
#[derive(Debug)]
pub struct UniformStaging {
    objects: Vec<ObjectData>,
}

impl UniformStaging {
    pub fn new() -> Self {
        Self {
            objects: vec![ObjectData::IDENTITY],
        }
    }

    pub fn push_object(&mut self, data: ObjectData) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(data);
        id
    }

    #[inline]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn contains(&self, id: ObjectId) -> bool {
        (id.0 as usize) < self.objects.len()
    }

    /// Writes the frame's uniforms and object table, then resets the table
    /// to the identity object.
    pub fn write(
        &mut self,
        heap: &mut Heap,
        backend: &mut dyn GpuBackend,
        viewport: Viewport,
    ) -> Result<FrameBindings> {
        let globals = heap
            .write(
                backend,
                bytemuck::bytes_of(&GlobalUniform::new(viewport)),
                BufferKind::Uniform,
                StorageTarget::Coherent,
                PageFlags::TEMPORARY,
            )
            .context("failed to stage global uniforms")?;

        let objects = heap
            .write(
                backend,
                bytemuck::cast_slice(&self.objects),
                BufferKind::Storage,
                StorageTarget::Coherent,
                PageFlags::TEMPORARY,
            )
            .context("failed to stage object table")?;

        self.objects.truncate(1);
        Ok(FrameBindings { globals, objects })
    }

    /// Drops every object except the identity.
    pub fn reset(&mut self) {
        self.objects.truncate(1);
    }
}

impl Default for UniformStaging {
    fn default() -> Self {
        Self::new()
    }
}
