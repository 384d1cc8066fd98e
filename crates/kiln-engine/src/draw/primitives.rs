//! Vertex builders for the built-in shaders.
//!
//! Each builder returns exactly one instance of its shader: the vertex count
//! matches the shader's `vertices_per_instance` and the order matches its
//! index pattern.

use crate::coords::{Rect, Vec2};
use crate::paint::Color;
use crate::render::ObjectId;

use super::Vertex;

#[inline]
fn vertex(pos: Vec2, uv: [f32; 2], color: Color, object: ObjectId) -> Vertex {
    Vertex {
        pos: pos.to_array(),
        uv,
        color: color.to_array(),
        object: object.index(),
    }
}

pub fn point(p: Vec2, color: Color, object: ObjectId) -> [Vertex; 1] {
    [vertex(p, [0.0, 0.0], color, object)]
}

pub fn line(a: Vec2, b: Vec2, color: Color, object: ObjectId) -> [Vertex; 2] {
    [vertex(a, [0.0, 0.0], color, object), vertex(b, [1.0, 0.0], color, object)]
}

pub fn triangle(a: Vec2, b: Vec2, c: Vec2, color: Color, object: ObjectId) -> [Vertex; 3] {
    [
        vertex(a, [0.0, 0.0], color, object),
        vertex(b, [1.0, 0.0], color, object),
        vertex(c, [0.0, 1.0], color, object),
    ]
}

/// Corners clockwise from the top-left, uv spanning `[0, 1]`. Serves both
/// the filled rect and the outline.
pub fn quad(rect: Rect, color: Color, object: ObjectId) -> [Vertex; 4] {
    let [tl, tr, br, bl] = rect.normalized().corners();
    [
        vertex(tl, [0.0, 0.0], color, object),
        vertex(tr, [1.0, 0.0], color, object),
        vertex(br, [1.0, 1.0], color, object),
        vertex(bl, [0.0, 1.0], color, object),
    ]
}

/// Bounding quad of a circle, uv spanning `[-1, 1]` for the SDF.
pub fn circle(center: Vec2, radius: f32, color: Color, object: ObjectId) -> [Vertex; 4] {
    let r = radius.abs();
    let [tl, tr, br, bl] = Rect::from_min_max(center - Vec2::splat(r), center + Vec2::splat(r)).corners();
    [
        vertex(tl, [-1.0, -1.0], color, object),
        vertex(tr, [1.0, -1.0], color, object),
        vertex(br, [1.0, 1.0], color, object),
        vertex(bl, [-1.0, 1.0], color, object),
    ]
}

/// Axis-aligned bounds of an instance.
pub fn bounds(vertices: &[Vertex]) -> Rect {
    let points: Vec<Vec2> = vertices.iter().map(|v| Vec2::new(v.pos[0], v.pos[1])).collect();
    Rect::bounding(&points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_winds_clockwise_with_unit_uv() {
        let q = quad(Rect::new(10.0, 20.0, 30.0, 40.0), Color::WHITE, ObjectId::IDENTITY);
        assert_eq!(q[0].pos, [10.0, 20.0]);
        assert_eq!(q[2].pos, [40.0, 60.0]);
        assert_eq!(q[2].uv, [1.0, 1.0]);
        assert!(q.iter().all(|v| v.object == 0));
    }

    #[test]
    fn negative_extent_is_normalized() {
        let q = quad(Rect::new(40.0, 60.0, -30.0, -40.0), Color::WHITE, ObjectId::IDENTITY);
        assert_eq!(q[0].pos, [10.0, 20.0]);
    }

    #[test]
    fn circle_quad_spans_radius() {
        let c = circle(Vec2::new(50.0, 50.0), 10.0, Color::BLACK, ObjectId(2));
        assert_eq!(bounds(&c), Rect::new(40.0, 40.0, 20.0, 20.0));
        assert_eq!(c[0].uv, [-1.0, -1.0]);
        assert_eq!(c[3].object, 2);
    }

    #[test]
    fn line_bounds_can_be_degenerate() {
        let l = line(Vec2::new(5.0, 0.0), Vec2::new(5.0, 100.0), Color::WHITE, ObjectId::IDENTITY);
        assert_eq!(bounds(&l), Rect::new(5.0, 0.0, 0.0, 100.0));
    }
}
