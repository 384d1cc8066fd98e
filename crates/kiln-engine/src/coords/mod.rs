//! Geometry types for the primitive API.
//!
//! Canonical CPU space:
//! - logical pixels
//! - origin top-left, +X right, +Y down
//!
//! The vertex stage converts to NDC with the frame's viewport uniform.

mod rect;
mod vec2;
mod viewport;

pub use rect::Rect;
pub use vec2::Vec2;
pub use viewport::Viewport;
