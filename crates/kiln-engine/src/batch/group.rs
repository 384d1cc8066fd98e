use crate::shader::{RasterMode, ShaderId};

/// Instances sharing one shader and raster mode, in enqueue order.
///
/// Instance bytes are stored back to back; every instance has the same size.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawGroup {
    shader: ShaderId,
    raster_mode: RasterMode,
    instance_size: usize,
    bytes: Vec<u8>,
    instances: u32,
}

impl DrawGroup {
    pub fn new(shader: ShaderId, raster_mode: RasterMode, instance_size: usize) -> Self {
        Self {
            shader,
            raster_mode,
            instance_size,
            bytes: Vec::new(),
            instances: 0,
        }
    }

    #[inline]
    pub fn shader(&self) -> ShaderId {
        self.shader
    }

    #[inline]
    pub fn raster_mode(&self) -> RasterMode {
        self.raster_mode
    }

    #[inline]
    pub fn instance_size(&self) -> usize {
        self.instance_size
    }

    #[inline]
    pub fn instance_count(&self) -> u32 {
        self.instances
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instances == 0
    }

    /// All instance bytes, in enqueue order.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes of instances `range.start..range.end`.
    pub fn instance_bytes(&self, range: core::ops::Range<u32>) -> &[u8] {
        let start = range.start as usize * self.instance_size;
        let end = range.end as usize * self.instance_size;
        &self.bytes[start..end]
    }

    #[inline]
    pub fn accepts(&self, shader: ShaderId, raster_mode: RasterMode) -> bool {
        self.shader == shader && self.raster_mode == raster_mode
    }

    /// Appends one instance.
    ///
    /// # Panics
    /// Panics if `instance` is not exactly one instance long.
    pub fn push(&mut self, instance: &[u8]) {
        assert_eq!(
            instance.len(),
            self.instance_size,
            "instance for shader {:?} must be {} bytes",
            self.shader,
            self.instance_size
        );
        self.bytes.extend_from_slice(instance);
        self.instances += 1;
    }
}
