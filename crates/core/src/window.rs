//! Fixed spatial windows shared by the spatial and spatio-temporal filters.
//!
//! 3x3 neighbors are numbered
//! ```text
//! a1 a2 a3
//! a4 c  a5
//! a6 a7 a8
//! ```
//! and stored as `a[0]..a[7]`. Opposite pairs are (a1,a8), (a2,a7),
//! (a3,a6), (a4,a5), i.e. pair `i` is `(a[i], a[7 - i])`.

use crate::sample::SampleGrid;
use crate::types::SampleFormat;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window3 {
    pub c: f32,
    pub a: [f32; 8],
}

impl Window3 {
    #[inline]
    pub fn load(grid: &SampleGrid, x: usize, y: usize) -> Self {
        let (x, y) = (x as isize, y as isize);
        let at = |dx: isize, dy: isize| grid.at_mirrored(x + dx, y + dy);
        Self {
            c: at(0, 0),
            a: [
                at(-1, -1),
                at(0, -1),
                at(1, -1),
                at(-1, 0),
                at(1, 0),
                at(-1, 1),
                at(0, 1),
                at(1, 1),
            ],
        }
    }

    /// Pair `i` (0-based: pair 1 is `0`) as `(min, max)`.
    #[inline]
    pub fn pair_bounds(&self, i: usize) -> (f32, f32) {
        let (p, q) = (self.a[i], self.a[7 - i]);
        (p.min(q), p.max(q))
    }

    #[inline]
    pub fn pair(&self, i: usize) -> (f32, f32) {
        (self.a[i], self.a[7 - i])
    }

    pub fn sorted(&self) -> [f32; 8] {
        let mut sorted = self.a;
        sort_samples(&mut sorted);
        sorted
    }
}

/// Tie-break order used by every "pick the best pair" mode: pair 4, 2, 3, 1.
pub const PAIR_ORDER: [usize; 4] = [3, 1, 2, 0];

/// Index of the pair with the smallest score, ties resolved by [`PAIR_ORDER`].
#[inline]
pub fn best_pair(scores: [f32; 4]) -> usize {
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    PAIR_ORDER
        .into_iter()
        .find(|&i| scores[i] == min)
        .unwrap_or(PAIR_ORDER[3])
}

/// `min(max(v, lo), hi)`; never panics when `lo > hi`.
#[inline]
pub fn clamp(v: f32, lo: f32, hi: f32) -> f32 {
    v.max(lo).min(hi)
}

#[inline]
pub fn sort_samples(values: &mut [f32]) {
    values.sort_unstable_by(f32::total_cmp);
}

/// Median of three.
#[inline]
pub fn median3(a: f32, b: f32, c: f32) -> f32 {
    a.min(b).max(a.max(b).min(c))
}

/// Largest square window any filter reads (radius 3).
pub const MAX_SQUARE: usize = 49;

/// Copy the `(2r+1)^2` square around `(x, y)` into `out` and return the
/// number of samples written. `out` must hold at least that many.
pub fn gather_square(
    grid: &SampleGrid,
    x: usize,
    y: usize,
    radius: usize,
    out: &mut [f32],
) -> usize {
    let r = radius as isize;
    let (x, y) = (x as isize, y as isize);
    let mut count = 0;
    for dy in -r..=r {
        for dx in -r..=r {
            out[count] = grid.at_mirrored(x + dx, y + dy);
            count += 1;
        }
    }
    count
}

/// Numeric range and rounding rules for intermediate results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRange {
    pub lo: f32,
    pub hi: f32,
    pub integer: bool,
}

impl PixelRange {
    pub fn of(format: SampleFormat) -> Self {
        let (lo, hi) = format.bounds();
        Self {
            lo,
            hi,
            integer: !format.is_float(),
        }
    }

    #[inline]
    pub fn clamp(&self, v: f32) -> f32 {
        clamp(v, self.lo, self.hi)
    }

    /// `(a + b) / 2`, rounded down for integer formats.
    #[inline]
    pub fn floor_avg(&self, a: f32, b: f32) -> f32 {
        if self.integer {
            ((a + b) * 0.5).floor()
        } else {
            (a + b) * 0.5
        }
    }

    /// `(a + b) / 2`, rounded up for integer formats.
    #[inline]
    pub fn ceil_avg(&self, a: f32, b: f32) -> f32 {
        if self.integer {
            ((a + b) * 0.5).ceil()
        } else {
            (a + b) * 0.5
        }
    }
}
