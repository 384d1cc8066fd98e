use super::Vec2;

/// Axis-aligned rectangle in logical pixels (top-left origin).
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Rect {
    #[inline]
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            origin: Vec2::new(x, y),
            size: Vec2::new(w, h),
        }
    }

    #[inline]
    pub fn from_min_max(min: Vec2, max: Vec2) -> Self {
        Self { origin: min, size: max - min }
    }

    /// Smallest rectangle containing every point. Empty input yields the
    /// zero rectangle.
    pub fn bounding(points: &[Vec2]) -> Self {
        let Some((&first, rest)) = points.split_first() else {
            return Rect::default();
        };
        let (min, max) = rest.iter().fold((first, first), |(lo, hi), &p| (lo.min(p), hi.max(p)));
        Rect::from_min_max(min, max)
    }

    #[inline]
    pub fn min(self) -> Vec2 {
        self.origin
    }

    #[inline]
    pub fn max(self) -> Vec2 {
        self.origin + self.size
    }

    /// Normalizes the rectangle so width/height are non-negative.
    #[inline]
    pub fn normalized(self) -> Self {
        let a = self.origin;
        let b = self.origin + self.size;
        Rect::from_min_max(a.min(b), a.max(b))
    }

    /// Grows every edge by `amount`.
    #[inline]
    pub fn inflate(self, amount: f32) -> Self {
        let r = self.normalized();
        Rect::from_min_max(r.min() - Vec2::splat(amount), r.max() + Vec2::splat(amount))
    }

    /// Closed-interval overlap test; touching edges and degenerate
    /// (zero-width) rectangles count as overlapping.
    #[inline]
    pub fn overlaps(self, other: Rect) -> bool {
        let a = self.normalized();
        let b = other.normalized();
        a.min().x <= b.max().x && b.min().x <= a.max().x && a.min().y <= b.max().y && b.min().y <= a.max().y
    }

    /// The four corners, clockwise from the top-left.
    #[inline]
    pub fn corners(self) -> [Vec2; 4] {
        let (lo, hi) = (self.min(), self.max());
        [lo, Vec2::new(hi.x, lo.y), hi, Vec2::new(lo.x, hi.y)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(x: f32, y: f32, w: f32, h: f32) -> Rect {
        Rect::new(x, y, w, h)
    }

    #[test]
    fn normalized_flips_negative_extent() {
        let n = r(10.0, 10.0, -4.0, -3.0).normalized();
        assert_eq!(n, r(6.0, 7.0, 4.0, 3.0));
    }

    #[test]
    fn bounding_covers_points() {
        let b = Rect::bounding(&[Vec2::new(3.0, -1.0), Vec2::new(-2.0, 4.0), Vec2::new(0.0, 0.0)]);
        assert_eq!(b, r(-2.0, -1.0, 5.0, 5.0));
        assert_eq!(Rect::bounding(&[]), Rect::default());
    }

    #[test]
    fn overlaps_includes_touching_and_degenerate() {
        let view = r(0.0, 0.0, 100.0, 100.0);
        assert!(view.overlaps(r(50.0, 50.0, 100.0, 100.0)));
        assert!(view.overlaps(r(100.0, 0.0, 10.0, 10.0)));
        assert!(view.overlaps(r(10.0, 10.0, 0.0, 50.0)), "vertical line");
        assert!(!view.overlaps(r(101.0, 0.0, 10.0, 10.0)));
        assert!(!view.overlaps(r(-20.0, -20.0, 10.0, 10.0)));
    }

    #[test]
    fn inflate_grows_all_edges() {
        assert_eq!(r(0.0, 0.0, 10.0, 10.0).inflate(1.0), r(-1.0, -1.0, 12.0, 12.0));
    }

    #[test]
    fn corners_are_clockwise() {
        let c = r(1.0, 2.0, 3.0, 4.0).corners();
        assert_eq!(c, [Vec2::new(1.0, 2.0), Vec2::new(4.0, 2.0), Vec2::new(4.0, 6.0), Vec2::new(1.0, 6.0)]);
    }
}
