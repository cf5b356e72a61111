//! Height sampling seam between terrain producers and consumers.

use crate::rect::IRect;

/// Read-only access to a grid of terrain heights.
///
/// Cell `(x, y)` covers the unit square `[x, x + 1) x [y, y + 1)` of world
/// space, so update rectangles and world coordinates share one unit.
pub trait HeightField {
    /// Grid size in cells, `(width, depth)`.
    fn size(&self) -> (u32, u32);

    /// Height of cell `(x, y)`. Callers stay inside `size()`.
    fn height(&self, x: u32, y: u32) -> f32;

    /// Height of the cell containing world point `(x, y)`, clamped to the grid.
    fn sample_nearest(&self, x: f32, y: f32) -> f32 {
        let (w, h) = self.size();
        if w == 0 || h == 0 {
            return 0.0;
        }
        let cx = (x.floor().max(0.0) as u32).min(w - 1);
        let cy = (y.floor().max(0.0) as u32).min(h - 1);
        self.height(cx, cy)
    }

    /// Rectangle covering the whole grid.
    fn bounds(&self) -> IRect {
        let (w, h) = self.size();
        IRect::new(0, 0, w as i32, h as i32)
    }
}

/// Plain row-major height grid.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightGrid {
    width: u32,
    depth: u32,
    heights: Vec<f32>,
}

impl HeightGrid {
    /// Flat grid at `height`.
    pub fn flat(width: u32, depth: u32, height: f32) -> Self {
        Self {
            width,
            depth,
            heights: vec![height; (width * depth) as usize],
        }
    }

    /// Grid whose cell heights come from `f(x, y)`.
    pub fn from_fn(width: u32, depth: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let mut heights = Vec::with_capacity((width * depth) as usize);
        for y in 0..depth {
            for x in 0..width {
                heights.push(f(x, y));
            }
        }
        Self { width, depth, heights }
    }

    pub fn set(&mut self, x: u32, y: u32, height: f32) {
        if x < self.width && y < self.depth {
            self.heights[(y * self.width + x) as usize] = height;
        }
    }

    /// Set every cell inside `rect` (clipped to the grid) and return the
    /// clipped rectangle, `None` when nothing was touched.
    pub fn fill_rect(&mut self, rect: IRect, height: f32) -> Option<IRect> {
        let clipped = rect.intersection(&self.bounds())?;
        for y in clipped.y1..clipped.y2 {
            for x in clipped.x1..clipped.x2 {
                self.set(x as u32, y as u32, height);
            }
        }
        Some(clipped)
    }

    pub fn heights(&self) -> &[f32] {
        &self.heights
    }
}

impl HeightField for HeightGrid {
    fn size(&self) -> (u32, u32) {
        (self.width, self.depth)
    }

    fn height(&self, x: u32, y: u32) -> f32 {
        self.heights[(y * self.width + x) as usize]
    }
}

impl<T: HeightField + ?Sized> HeightField for &T {
    fn size(&self) -> (u32, u32) {
        (**self).size()
    }

    fn height(&self, x: u32, y: u32) -> f32 {
        (**self).height(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_sampling_clamps_to_grid() {
        let grid = HeightGrid::from_fn(4, 4, |x, y| (x + 10 * y) as f32);
        assert_eq!(grid.sample_nearest(2.7, 1.2), 12.0);
        assert_eq!(grid.sample_nearest(-5.0, -1.0), 0.0);
        assert_eq!(grid.sample_nearest(99.0, 99.0), 33.0);
    }

    #[test]
    fn fill_rect_reports_clipped_region() {
        let mut grid = HeightGrid::flat(8, 8, 0.0);
        let touched = grid.fill_rect(IRect::new(6, -2, 12, 3), 5.0);
        assert_eq!(touched, Some(IRect::new(6, 0, 8, 3)));
        assert_eq!(grid.height(7, 2), 5.0);
        assert_eq!(grid.height(5, 2), 0.0);
        assert_eq!(grid.fill_rect(IRect::new(20, 20, 30, 30), 1.0), None);
    }
}
