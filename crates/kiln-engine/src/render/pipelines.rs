use std::collections::HashMap;

use anyhow::{Context, Result};

use crate::device::{GpuBackend, PipelineId};
use crate::shader::{RasterMode, Shader, ShaderId};

/// Pipelines keyed by `(shader, raster mode)`, created on first use and kept
/// until the surface or device is invalidated.
#[derive(Debug, Default)]
pub struct PipelineCache {
    pipelines: HashMap<(ShaderId, RasterMode), PipelineId>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(
        &mut self,
        backend: &mut dyn GpuBackend,
        shader: &Shader,
        mode: RasterMode,
    ) -> Result<PipelineId> {
        let key = (shader.id, mode);
        if let Some(&pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline);
        }

        let pipeline = backend
            .create_pipeline(shader, mode)
            .with_context(|| format!("failed to create pipeline for {} ({mode:?})", shader.label))?;
        log::debug!("pipeline {pipeline:?} for {} ({mode:?})", shader.label);
        self.pipelines.insert(key, pipeline);
        Ok(pipeline)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Destroys every cached pipeline.
    pub fn clear(&mut self, backend: &mut dyn GpuBackend) {
        for (_, pipeline) in self.pipelines.drain() {
            backend.destroy_pipeline(pipeline);
        }
    }
}
