/// Directive returned by [`Renderer::render_frame`](super::Renderer::render_frame).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameControl {
    Continue,
    /// A fatal error was logged; the host loop should shut down.
    Exit,
}
