//! Color representation shared by primitives, object tints and the clear
//! color. Colors are linear with premultiplied alpha; the pipelines blend
//! with `PREMULTIPLIED_ALPHA_BLENDING`.

mod color;

pub use color::Color;
