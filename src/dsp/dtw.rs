//! Dynamic-Time-Warping engine used across the detection pipeline.
//!
//!  * One-time allocation: the cost matrix is flattened into a single
//!    `Vec<f32>` instead of a `Vec<Vec<f32>>`.
//!  * Optional Sakoe-Chiba band; the effective half-width is
//!    `max(w, |m - n|)` so sequences of different lengths always stay
//!    reachable inside the band.
//!  * The struct is *re-usable*: allocate once, call many times.

use std::cmp;

/// 2-D index helper for a flattened `(rows × cols)` buffer.
#[inline(always)]
fn idx(row: usize, col: usize, cols: usize) -> usize {
    row * cols + col
}

pub struct Dtw<T: Copy> {
    rows: usize,
    cols: usize,
    distance_fn: fn(T, T) -> f32,
    /// Last accumulated cost matrix (flattened).
    cost: Vec<f32>,
    cost_valid: bool,
}

impl<T: Copy> Dtw<T> {
    /// Create a new reusable DTW instance with the supplied distance function.
    pub fn new(distance_fn: fn(T, T) -> f32) -> Self {
        Self {
            rows: 0,
            cols: 0,
            distance_fn,
            cost: Vec::new(),
            cost_valid: false,
        }
    }

    /* ─────────────────────────── public API ────────────────────────── */

    /// Classic DTW (no global constraint).
    pub fn compute(&mut self, a: &[T], b: &[T]) -> f32 {
        self.compute_inner(a, b, None)
    }

    /// DTW constrained to a Sakoe-Chiba band of half-width
    /// `max(w, |a.len() - b.len()|)` around the diagonal.
    pub fn compute_windowed(&mut self, a: &[T], b: &[T], w: u16) -> f32 {
        self.compute_inner(a, b, Some(w as usize))
    }

    /// Optimal alignment path of the *last* `compute_*` call, in forward
    /// order from `(0, 0)` to `(rows-1, cols-1)`. Diagonal steps win ties.
    pub fn path(&self) -> Option<Vec<[usize; 2]>> {
        if !self.cost_valid {
            return None;
        }
        let cols = self.cols;
        let cost = &self.cost;
        let mut r = self.rows - 1;
        let mut c = self.cols - 1;
        let mut path = vec![[r, c]];
        while r > 0 || c > 0 {
            if r > 0 && c > 0 {
                let up = cost[idx(r - 1, c, cols)];
                let left = cost[idx(r, c - 1, cols)];
                let diag = cost[idx(r - 1, c - 1, cols)];
                if diag <= up && diag <= left {
                    r -= 1;
                    c -= 1;
                } else if up <= left {
                    r -= 1;
                } else {
                    c -= 1;
                }
            } else if r > 0 {
                r -= 1;
            } else {
                c -= 1;
            }
            path.push([r, c]);
        }
        path.reverse();
        Some(path)
    }

    /* ───────────────────────── internal impl ───────────────────────── */

    fn compute_inner(&mut self, a: &[T], b: &[T], window_opt: Option<usize>) -> f32 {
        self.rows = a.len();
        self.cols = b.len();
        self.cost_valid = false;

        if self.rows == 0 || self.cols == 0 {
            return f32::INFINITY;
        }

        let needed = self.rows * self.cols;
        if self.cost.len() < needed {
            self.cost.resize(needed, f32::INFINITY);
        }
        let cost = &mut self.cost[..needed];
        cost.fill(f32::INFINITY);

        // Effective band: wide enough that the corner cell stays reachable.
        let w = window_opt
            .map(|w| cmp::max(w, self.rows.abs_diff(self.cols)))
            .unwrap_or(usize::MAX);

        cost[0] = (self.distance_fn)(a[0], b[0]);

        // First column / first row: cumulative sums, gated by the band.
        for r in 1..cmp::min(self.rows, w.saturating_add(1)) {
            cost[idx(r, 0, self.cols)] =
                (self.distance_fn)(a[r], b[0]) + cost[idx(r - 1, 0, self.cols)];
        }
        for c in 1..cmp::min(self.cols, w.saturating_add(1)) {
            cost[idx(0, c, self.cols)] =
                (self.distance_fn)(a[0], b[c]) + cost[idx(0, c - 1, self.cols)];
        }

        for r in 1..self.rows {
            let start = cmp::max(1, r.saturating_sub(w));
            let end = cmp::min(self.cols - 1, r.saturating_add(w));
            for c in start..=end {
                let d = (self.distance_fn)(a[r], b[c]);

                // min(↑, ←, ↖)
                let m1 = cost[idx(r - 1, c, self.cols)];
                let m2 = cost[idx(r, c - 1, self.cols)];
                let m3 = cost[idx(r - 1, c - 1, self.cols)];

                cost[idx(r, c, self.cols)] = d + m1.min(m2).min(m3);
            }
        }

        self.cost_valid = true;
        cost[idx(self.rows - 1, self.cols - 1, self.cols)]
    }
}

/* ───────────────────────────── tests ──────────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;

    fn abs(a: f32, b: f32) -> f32 {
        (a - b).abs()
    }

    #[test]
    fn identical_sequences_cost_zero() {
        let xs = [0.0f32, 1.0, 2.0, 3.0, 2.0];
        let mut dtw = Dtw::new(abs);
        let cost = dtw.compute(&xs, &xs);
        assert!(cost.abs() < 1e-6, "cost was {cost}");
    }

    #[test]
    fn elastic_alignment_absorbs_stretching() {
        let xs = [0.0f32, 1.0, 1.0, 2.0, 3.0];
        let ys = [0.0f32, 1.0, 2.0, 3.0];
        let mut dtw = Dtw::new(abs);
        let cost = dtw.compute(&xs, &ys);
        assert!(cost < 1e-6, "cost was {cost}");
    }

    #[test]
    fn windowed_matches_unwindowed_for_large_band() {
        let a: Vec<f32> = (0..100).map(|i| (i as f32 * 0.3).sin()).collect();
        let b: Vec<f32> = (0..80).map(|i| (i as f32 * 0.35).sin()).collect();

        let mut d1 = Dtw::new(abs);
        let mut d2 = Dtw::new(abs);
        let unbanded = d1.compute(&a, &b);
        let banded = d2.compute_windowed(&a, &b, 200);
        assert!((unbanded - banded).abs() < 1e-5);
    }

    #[test]
    fn band_widens_to_length_difference() {
        // band of 1 against a length gap of 5 must still reach the corner
        let a: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let b: Vec<f32> = (0..5).map(|i| i as f32).collect();
        let mut dtw = Dtw::new(abs);
        let cost = dtw.compute_windowed(&a, &b, 1);
        assert!(cost.is_finite());
    }

    #[test]
    fn path_is_monotone_and_spans_corners() {
        let a: Vec<f32> = (0..12).map(|i| (i as f32).sqrt()).collect();
        let b: Vec<f32> = (0..9).map(|i| i as f32 * 0.5).collect();
        let mut dtw = Dtw::new(abs);
        dtw.compute(&a, &b);
        let path = dtw.path().expect("path after compute");

        assert_eq!(path.first(), Some(&[0, 0]));
        assert_eq!(path.last(), Some(&[a.len() - 1, b.len() - 1]));
        for pair in path.windows(2) {
            assert!(pair[1][0] >= pair[0][0]);
            assert!(pair[1][1] >= pair[0][1]);
            let step = (pair[1][0] - pair[0][0]) + (pair[1][1] - pair[0][1]);
            assert!(step >= 1 && step <= 2);
        }
    }

    #[test]
    fn empty_input_is_infinite_and_pathless() {
        let mut dtw = Dtw::new(abs);
        assert!(dtw.compute(&[], &[1.0]).is_infinite());
        assert!(dtw.path().is_none());
    }

    #[test]
    fn identical_sequences_walk_the_diagonal() {
        let xs = [0.5f32, 0.25, 0.75, 0.1];
        let mut dtw = Dtw::new(abs);
        dtw.compute(&xs, &xs);
        let path = dtw.path().expect("path after compute");
        assert_eq!(path.len(), xs.len());
        for (i, cell) in path.iter().enumerate() {
            assert_eq!(*cell, [i, i]);
        }
    }
}
