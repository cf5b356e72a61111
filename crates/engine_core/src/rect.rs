//! Integer rectangles over height-map coordinate space.

/// Axis-aligned integer rectangle, half-open: a point `(x, y)` is inside when
/// `x1 <= x < x2` and `y1 <= y < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IRect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl IRect {
    /// Create a rectangle from its corners.
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Create a rectangle from an origin and a size.
    pub const fn from_origin_size(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }

    /// Covered area in cells. Zero for degenerate rectangles.
    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// True when the rectangle covers no cell.
    pub fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }

    /// True when both rectangles share at least one cell.
    pub fn overlaps(&self, other: &IRect) -> bool {
        self.x1 < other.x2 && other.x1 < self.x2 && self.y1 < other.y2 && other.y1 < self.y2
    }

    /// Overlapping part of both rectangles, `None` when they share no cell.
    pub fn intersection(&self, other: &IRect) -> Option<IRect> {
        let r = IRect::new(
            self.x1.max(other.x1),
            self.y1.max(other.y1),
            self.x2.min(other.x2),
            self.y2.min(other.y2),
        );
        (!r.is_empty()).then_some(r)
    }

    /// Smallest rectangle containing both.
    pub fn union_bounds(&self, other: &IRect) -> IRect {
        IRect::new(
            self.x1.min(other.x1),
            self.y1.min(other.y1),
            self.x2.max(other.x2),
            self.y2.max(other.y2),
        )
    }

    /// Grow every side by `margin` cells.
    pub fn expanded(&self, margin: i32) -> IRect {
        IRect::new(self.x1 - margin, self.y1 - margin, self.x2 + margin, self.y2 + margin)
    }

    /// Same rectangle with x and y swapped.
    pub fn transposed(&self) -> IRect {
        IRect::new(self.y1, self.x1, self.y2, self.x2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_area_and_empty() {
        assert_eq!(IRect::new(0, 0, 10, 5).area(), 50);
        assert!(IRect::new(3, 3, 3, 8).is_empty());
        assert!(IRect::new(5, 0, 2, 4).is_empty());
        assert_eq!(IRect::new(5, 0, 2, 4).area(), 0);
    }

    #[test]
    fn rect_overlap_is_exclusive_of_shared_edges() {
        let a = IRect::new(0, 0, 10, 10);
        let b = IRect::new(10, 0, 20, 10);
        assert!(!a.overlaps(&b));
        assert!(a.intersection(&b).is_none());
        let c = IRect::new(5, 5, 15, 15);
        assert_eq!(a.intersection(&c), Some(IRect::new(5, 5, 10, 10)));
    }

    #[test]
    fn rect_expand_and_transpose() {
        let r = IRect::new(10, 20, 30, 40);
        assert_eq!(r.expanded(2), IRect::new(8, 18, 32, 42));
        assert_eq!(r.transposed(), IRect::new(20, 10, 40, 30));
        assert_eq!(r.transposed().transposed(), r);
    }
}
