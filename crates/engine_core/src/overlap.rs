//! Accumulates height-map update rectangles and turns them into a
//! non-overlapping cover of their union.
//!
//! Edits arrive as an append-only queue of possibly overlapping rectangles.
//! Consumers (coast distance fields, terrain caches) want each affected cell
//! processed exactly once, so [`RectangleOverlapHandler::get_merged_rects`]
//! sweeps the pending set into disjoint rectangles.

use crate::rect::IRect;

/// Append-only queue of update rectangles with on-demand merging.
#[derive(Debug, Default, Clone)]
pub struct RectangleOverlapHandler {
    pending: Vec<IRect>,
}

impl RectangleOverlapHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an update rectangle. Rectangles covering no cell are dropped.
    pub fn push(&mut self, rect: IRect) {
        if !rect.is_empty() {
            self.pending.push(rect);
        }
    }

    /// Number of rectangles pushed since the last merge.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop everything pushed since the last merge.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Disjoint rectangles whose union equals the union of every rectangle
    /// pushed since the last call. Clears the pending queue.
    pub fn get_merged_rects(&mut self) -> Vec<IRect> {
        let pending = std::mem::take(&mut self.pending);
        merge_cover(&pending)
    }
}

/// Cover the union of `rects` with disjoint rectangles.
///
/// Both sweep directions are tried and the one yielding fewer rectangles wins
/// (row sweep on ties). The result is sorted by `(y1, x1)`.
pub fn merge_cover(rects: &[IRect]) -> Vec<IRect> {
    let rects: Vec<IRect> = rects.iter().copied().filter(|r| !r.is_empty()).collect();
    match rects.as_slice() {
        [] => Vec::new(),
        [single] => vec![*single],
        _ => {
            let rows = sweep_rows(&rects);
            let transposed: Vec<IRect> = rects.iter().map(IRect::transposed).collect();
            let columns: Vec<IRect> = sweep_rows(&transposed)
                .iter()
                .map(IRect::transposed)
                .collect();

            let mut cover = if columns.len() < rows.len() { columns } else { rows };
            cover.sort_unstable_by_key(|r| (r.y1, r.x1, r.y2, r.x2));
            cover
        }
    }
}

/// Split the plane into horizontal bands at every distinct y edge, merge the
/// x spans inside each band, then grow rectangles downward while consecutive
/// bands carry an identical span.
fn sweep_rows(rects: &[IRect]) -> Vec<IRect> {
    let mut edges: Vec<i32> = rects.iter().flat_map(|r| [r.y1, r.y2]).collect();
    edges.sort_unstable();
    edges.dedup();

    let mut closed = Vec::new();
    let mut open: Vec<IRect> = Vec::new();

    for band in edges.windows(2) {
        let (top, bottom) = (band[0], band[1]);
        let spans = merge_spans(
            rects
                .iter()
                .filter(|r| r.y1 <= top && r.y2 >= bottom)
                .map(|r| (r.x1, r.x2))
                .collect(),
        );

        let mut next_open = Vec::with_capacity(spans.len());
        for (x1, x2) in spans {
            let continued = open
                .iter()
                .position(|r| r.x1 == x1 && r.x2 == x2 && r.y2 == top);
            match continued {
                Some(index) => {
                    let mut rect = open.swap_remove(index);
                    rect.y2 = bottom;
                    next_open.push(rect);
                }
                None => next_open.push(IRect::new(x1, top, x2, bottom)),
            }
        }
        closed.append(&mut open);
        open = next_open;
    }

    closed.append(&mut open);
    closed
}

/// Merge overlapping or touching half-open spans.
fn merge_spans(mut spans: Vec<(i32, i32)>) -> Vec<(i32, i32)> {
    spans.sort_unstable();
    let mut merged: Vec<(i32, i32)> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const GRID: i32 = 48;

    fn rasterize(rects: &[IRect]) -> Vec<u32> {
        let mut cells = vec![0u32; (GRID * GRID) as usize];
        for r in rects {
            for y in r.y1.max(0)..r.y2.min(GRID) {
                for x in r.x1.max(0)..r.x2.min(GRID) {
                    cells[(y * GRID + x) as usize] += 1;
                }
            }
        }
        cells
    }

    #[test]
    fn empty_pending_set_yields_nothing() {
        let mut handler = RectangleOverlapHandler::new();
        assert!(handler.get_merged_rects().is_empty());
        handler.push(IRect::new(4, 4, 4, 9));
        assert!(handler.is_empty());
        assert!(handler.get_merged_rects().is_empty());
    }

    #[test]
    fn single_rect_is_returned_unchanged() {
        let mut handler = RectangleOverlapHandler::new();
        handler.push(IRect::new(3, 7, 19, 11));
        assert_eq!(handler.get_merged_rects(), vec![IRect::new(3, 7, 19, 11)]);
    }

    #[test]
    fn merge_clears_pending_state() {
        let mut handler = RectangleOverlapHandler::new();
        handler.push(IRect::new(0, 0, 5, 5));
        handler.push(IRect::new(2, 2, 8, 8));
        assert_eq!(handler.pending_len(), 2);
        assert!(!handler.get_merged_rects().is_empty());
        assert_eq!(handler.pending_len(), 0);
        assert!(handler.get_merged_rects().is_empty());
    }

    #[test]
    fn two_overlapping_squares_cover_their_union() {
        let mut handler = RectangleOverlapHandler::new();
        handler.push(IRect::new(0, 0, 50, 50));
        handler.push(IRect::new(30, 30, 80, 80));
        let merged = handler.get_merged_rects();

        // The union is a staircase with two reflex corners: three is minimal.
        assert_eq!(merged.len(), 3);
        let area: i64 = merged.iter().map(IRect::area).sum();
        assert_eq!(area, 50 * 50 * 2 - 20 * 20);
        for (i, a) in merged.iter().enumerate() {
            for b in &merged[i + 1..] {
                assert!(!a.overlaps(b), "{:?} overlaps {:?}", a, b);
            }
        }
        assert!(merged.iter().any(|r| r.contains(0, 0)));
        assert!(merged.iter().any(|r| r.contains(79, 79)));
        assert!(!merged.iter().any(|r| r.contains(79, 0)));
    }

    #[test]
    fn touching_rects_merge_into_one() {
        let horizontal = merge_cover(&[IRect::new(0, 0, 10, 10), IRect::new(10, 0, 20, 10)]);
        assert_eq!(horizontal, vec![IRect::new(0, 0, 20, 10)]);

        let vertical = merge_cover(&[IRect::new(0, 0, 10, 10), IRect::new(0, 10, 10, 20)]);
        assert_eq!(vertical, vec![IRect::new(0, 0, 10, 20)]);
    }

    #[test]
    fn contained_rect_is_absorbed() {
        let merged = merge_cover(&[
            IRect::new(0, 0, 40, 40),
            IRect::new(10, 10, 20, 20),
            IRect::new(0, 0, 40, 40),
        ]);
        assert_eq!(merged, vec![IRect::new(0, 0, 40, 40)]);
    }

    #[test]
    fn column_sweep_wins_when_it_needs_fewer_rects() {
        // Row bands would give three pieces; column bands give two.
        let merged = merge_cover(&[IRect::new(0, 0, 10, 30), IRect::new(10, 10, 20, 20)]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.iter().map(IRect::area).sum::<i64>(), 300 + 100);
    }

    #[test]
    fn random_sets_cover_union_without_overlap() {
        let mut rng = StdRng::seed_from_u64(0x5eed_2024);
        for _ in 0..200 {
            let count = rng.gen_range(1..12);
            let input: Vec<IRect> = (0..count)
                .map(|_| {
                    let x = rng.gen_range(0..GRID - 1);
                    let y = rng.gen_range(0..GRID - 1);
                    let w = rng.gen_range(1..=(GRID - x).min(20));
                    let h = rng.gen_range(1..=(GRID - y).min(20));
                    IRect::from_origin_size(x, y, w, h)
                })
                .collect();

            let merged = merge_cover(&input);
            let expected: Vec<bool> = rasterize(&input).iter().map(|&c| c > 0).collect();
            let covered = rasterize(&merged);

            assert!(covered.iter().all(|&c| c <= 1), "output rects overlap: {:?}", merged);
            let actual: Vec<bool> = covered.iter().map(|&c| c == 1).collect();
            assert_eq!(actual, expected, "union mismatch for {:?}", input);
            assert!(merged.len() <= input.len() * 4 + 1);
        }
    }
}
