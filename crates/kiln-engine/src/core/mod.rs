//! The renderer container and its frame lifecycle.
//!
//! `Renderer` owns the backend and every subsystem built on it; host loops
//! drive it through `frame_start` / `frame_end` or `render_frame`.

mod control;
mod event;
mod renderer;

pub use control::FrameControl;
pub use event::RendererEvent;
pub use renderer::Renderer;
