use winit::event::WindowEvent;

/// Out-of-band notifications.
///
/// Queued by [`Renderer::handle_event`](super::Renderer::handle_event) and
/// applied at the next `frame_start`, never in the middle of a frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum RendererEvent {
    /// New drawable size in physical pixels.
    Resized { width: u32, height: u32 },
    /// New DPI scale; the logical viewport is `physical / scale_factor`.
    ScaleFactorChanged { scale_factor: f32 },
    /// Surface format or configuration changed; pipelines are rebuilt.
    SurfaceInvalidated,
    /// Every GPU resource is gone; pipelines, index buffers and heap pages
    /// are rebuilt on demand.
    DeviceInvalidated,
}

impl RendererEvent {
    /// Translates the window events the renderer cares about.
    pub fn from_window_event(event: &WindowEvent) -> Option<Self> {
        match event {
            WindowEvent::Resized(size) => Some(RendererEvent::Resized {
                width: size.width,
                height: size.height,
            }),
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => Some(RendererEvent::ScaleFactorChanged {
                scale_factor: *scale_factor as f32,
            }),
            _ => None,
        }
    }
}
