//! Renderer configuration.

use crate::heap::HeapConfig;
use crate::paint::Color;

/// Construction parameters for [`Renderer`](crate::core::Renderer).
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Page sizes and alignments per buffer kind.
    pub heap: HeapConfig,

    /// Draw groups per frame. Draws that would open a group beyond this are
    /// dropped (with a warning) until the next frame.
    pub max_groups: usize,

    /// Frames the CPU may record ahead of the GPU. `None` asks the backend.
    pub frames_in_flight: Option<u32>,

    /// Color the frame is cleared to; `None` keeps the previous contents.
    pub clear_color: Option<Color>,

    /// Skip primitives whose bounds miss the viewport. Only applied while the
    /// identity object is current, since object transforms move geometry.
    pub cull_offscreen: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            heap: HeapConfig::default(),
            max_groups: 1024,
            frames_in_flight: None,
            clear_color: Some(Color::BLACK),
            cull_offscreen: true,
        }
    }
}
