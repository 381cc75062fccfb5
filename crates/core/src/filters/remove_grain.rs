//! `RemoveGrain`: 3x3 gradient-clipping filters selected per plane by mode.
//!
//! Each mode is an independent formula over the [`Window3`] neighborhood;
//! [`MODES`] maps the mode index to its kernel.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::dispatch::{any_selected, dispatch_planes};
use crate::error::{FilterError, FilterResult};
use crate::filter::{Filter, FilterInputs, ParamDefinition, ParamType};
use crate::params::{check_all, fill_forward, ParamReader};
use crate::sample::{render_plane, Plane};
use crate::source::{fetch_checked, ClipSource};
use crate::types::{Frame, VideoInfo};
use crate::window::{best_pair, clamp, PixelRange, Window3};

pub type Kernel = fn(&Window3, &PixelRange) -> f32;

pub const MODES: [Kernel; 25] = [
    passthrough,
    mode01,
    mode02,
    mode03,
    mode04,
    mode05,
    mode06,
    mode07,
    mode08,
    mode09,
    mode10,
    mode11,
    mode11,
    field_interpolate,
    field_interpolate,
    field_interpolate_weighted,
    field_interpolate_weighted,
    mode17,
    mode18,
    mode19,
    mode20,
    mode21,
    mode22,
    mode23,
    mode24,
];

/// Row parity rebuilt by the field modes; other rows are copied.
pub fn field_parity(mode: usize) -> Option<usize> {
    match mode {
        13 | 15 => Some(0),
        14 | 16 => Some(1),
        _ => None,
    }
}

fn passthrough(w: &Window3, _: &PixelRange) -> f32 {
    w.c
}

fn mode01(w: &Window3, _: &PixelRange) -> f32 {
    let lo = w.a.iter().copied().fold(f32::INFINITY, f32::min);
    let hi = w.a.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    clamp(w.c, lo, hi)
}

fn mode02(w: &Window3, _: &PixelRange) -> f32 {
    let s = w.sorted();
    clamp(w.c, s[1], s[6])
}

fn mode03(w: &Window3, _: &PixelRange) -> f32 {
    let s = w.sorted();
    clamp(w.c, s[2], s[5])
}

fn mode04(w: &Window3, _: &PixelRange) -> f32 {
    let s = w.sorted();
    clamp(w.c, s[3], s[4])
}

/// Clamp the center into the pair whose `score(c, lo, hi)` is smallest.
#[inline]
fn clip_to_best_pair(w: &Window3, score: impl Fn(f32, f32, f32) -> f32) -> f32 {
    let scores = [0, 1, 2, 3].map(|i| {
        let (lo, hi) = w.pair_bounds(i);
        score(w.c, lo, hi)
    });
    let (lo, hi) = w.pair_bounds(best_pair(scores));
    clamp(w.c, lo, hi)
}

fn mode05(w: &Window3, _: &PixelRange) -> f32 {
    clip_to_best_pair(w, |c, lo, hi| (c - clamp(c, lo, hi)).abs())
}

fn mode06(w: &Window3, range: &PixelRange) -> f32 {
    clip_to_best_pair(w, |c, lo, hi| {
        range.clamp((c - clamp(c, lo, hi)).abs() * 2.0 + (hi - lo))
    })
}

fn mode07(w: &Window3, _: &PixelRange) -> f32 {
    clip_to_best_pair(w, |c, lo, hi| (c - clamp(c, lo, hi)).abs() + (hi - lo))
}

fn mode08(w: &Window3, range: &PixelRange) -> f32 {
    clip_to_best_pair(w, |c, lo, hi| {
        range.clamp((c - clamp(c, lo, hi)).abs() + (hi - lo) * 2.0)
    })
}

fn mode09(w: &Window3, _: &PixelRange) -> f32 {
    clip_to_best_pair(w, |_, lo, hi| hi - lo)
}

/// Neighbor preference on equal distance: a7, a8, a6, a2, a3, a1, a5, a4.
const NEAREST_ORDER: [usize; 8] = [6, 7, 5, 1, 2, 0, 4, 3];

fn mode10(w: &Window3, _: &PixelRange) -> f32 {
    let diffs = w.a.map(|a| (w.c - a).abs());
    let min = diffs.iter().copied().fold(f32::INFINITY, f32::min);
    NEAREST_ORDER
        .into_iter()
        .find(|&i| diffs[i] == min)
        .map_or(w.c, |i| w.a[i])
}

fn mode11(w: &Window3, _: &PixelRange) -> f32 {
    let a = &w.a;
    let edges = a[1] + a[3] + a[4] + a[6];
    let corners = a[0] + a[2] + a[5] + a[7];
    (4.0 * w.c + 2.0 * edges + corners) / 16.0
}

/// Pair (as indices into `a`) with the smallest vertical/diagonal difference,
/// ties resolved a2-a7, a3-a6, a1-a8.
#[inline]
fn smoothest_field_pair(w: &Window3) -> usize {
    let d = |i: usize| (w.a[i] - w.a[7 - i]).abs();
    let (d1, d2, d3) = (d(0), d(1), d(2));
    let min = d1.min(d2).min(d3);
    if min == d2 {
        1
    } else if min == d3 {
        2
    } else {
        0
    }
}

fn field_interpolate(w: &Window3, _: &PixelRange) -> f32 {
    let (p, q) = w.pair(smoothest_field_pair(w));
    (p + q) * 0.5
}

fn field_interpolate_weighted(w: &Window3, _: &PixelRange) -> f32 {
    let a = &w.a;
    let average = (2.0 * (a[1] + a[6]) + a[0] + a[2] + a[5] + a[7]) / 8.0;
    let (lo, hi) = w.pair_bounds(smoothest_field_pair(w));
    clamp(average, lo, hi)
}

fn mode17(w: &Window3, _: &PixelRange) -> f32 {
    let mut lower = f32::NEG_INFINITY;
    let mut upper = f32::INFINITY;
    for i in 0..4 {
        let (lo, hi) = w.pair_bounds(i);
        lower = lower.max(lo);
        upper = upper.min(hi);
    }
    clamp(w.c, lower.min(upper), lower.max(upper))
}

fn mode18(w: &Window3, _: &PixelRange) -> f32 {
    let scores = [0, 1, 2, 3].map(|i| {
        let (p, q) = w.pair(i);
        (w.c - p).abs().max((w.c - q).abs())
    });
    let (lo, hi) = w.pair_bounds(best_pair(scores));
    clamp(w.c, lo, hi)
}

fn mode19(w: &Window3, _: &PixelRange) -> f32 {
    w.a.iter().sum::<f32>() / 8.0
}

fn mode20(w: &Window3, _: &PixelRange) -> f32 {
    (w.a.iter().sum::<f32>() + w.c) / 9.0
}

fn mode21(w: &Window3, range: &PixelRange) -> f32 {
    let mut lower = f32::INFINITY;
    let mut upper = f32::NEG_INFINITY;
    for i in 0..4 {
        let (p, q) = w.pair(i);
        lower = lower.min(range.floor_avg(p, q));
        upper = upper.max(range.ceil_avg(p, q));
    }
    clamp(w.c, lower, upper)
}

fn mode22(w: &Window3, range: &PixelRange) -> f32 {
    let mut lower = f32::INFINITY;
    let mut upper = f32::NEG_INFINITY;
    for i in 0..4 {
        let (p, q) = w.pair(i);
        let average = range.ceil_avg(p, q);
        lower = lower.min(average);
        upper = upper.max(average);
    }
    clamp(w.c, lower, upper)
}

fn mode23(w: &Window3, range: &PixelRange) -> f32 {
    let mut up = 0.0f32;
    let mut down = 0.0f32;
    for i in 0..4 {
        let (lo, hi) = w.pair_bounds(i);
        let spread = hi - lo;
        up = up.max((w.c - hi).min(spread));
        down = down.max((lo - w.c).min(spread));
    }
    range.clamp(w.c - up + down)
}

fn mode24(w: &Window3, range: &PixelRange) -> f32 {
    let mut up = 0.0f32;
    let mut down = 0.0f32;
    for i in 0..4 {
        let (lo, hi) = w.pair_bounds(i);
        let spread = hi - lo;
        let above = w.c - hi;
        up = up.max(above.min(spread - above));
        let below = lo - w.c;
        down = down.max(below.min(spread - below));
    }
    range.clamp(w.c - up + down)
}

/// Apply a 3x3 mode kernel to a whole plane. Shared with `Repair`'s
/// plane loop through [`render_plane`].
pub fn remove_grain_plane(plane: &Plane, mode: usize) -> Plane {
    let grid = plane.grid();
    let range = PixelRange::of(plane.format());
    let kernel = MODES[mode];
    let field = field_parity(mode);
    render_plane(plane.format(), plane.width(), plane.height(), |x, y| {
        if let Some(parity) = field {
            if y % 2 != parity {
                return grid.at(x, y);
            }
        }
        kernel(&Window3::load(&grid, x, y), &range)
    })
}

pub struct RemoveGrain {
    clip: Arc<dyn ClipSource>,
    info: VideoInfo,
    modes: Vec<usize>,
    process: Vec<bool>,
}

impl RemoveGrain {
    pub fn new(clip: Arc<dyn ClipSource>, mode: &[i64]) -> FilterResult<Self> {
        if mode.is_empty() {
            return Err(FilterError::invalid("mode", "at least one mode is required"));
        }
        check_all("mode", mode, 0, 24)?;
        let info = clip.info();
        let modes: Vec<usize> = fill_forward(mode, info.format.num_planes(), &[0])
            .into_iter()
            .map(|m| m as usize)
            .collect();
        let process = modes.iter().map(|m| *m != 0).collect();

        debug!(?modes, "configured RemoveGrain");
        Ok(Self {
            clip,
            info,
            modes,
            process,
        })
    }

    pub fn from_inputs(inputs: &FilterInputs) -> FilterResult<Self> {
        let reader = ParamReader::new(&inputs.params);
        reader.ensure_known(&["mode"])?;
        let mode = reader
            .int_list("mode")?
            .ok_or_else(|| FilterError::invalid("mode", "parameter is required"))?;
        Self::new(inputs.clip.clone(), &mode)
    }

    pub fn definitions() -> Vec<ParamDefinition> {
        vec![ParamDefinition::required("mode", ParamType::IntList)]
    }
}

impl ClipSource for RemoveGrain {
    fn name(&self) -> &str {
        "RemoveGrain"
    }

    fn info(&self) -> VideoInfo {
        self.info
    }

    fn get_frame(&self, n: usize) -> FilterResult<Arc<Frame>> {
        let src = fetch_checked(self.clip.as_ref(), n, &self.info)?;
        if !any_selected(&self.process) {
            return Ok(src);
        }
        trace!(frame = n, "RemoveGrain");
        let out = dispatch_planes(&src, &self.process, |index, plane| {
            Ok(remove_grain_plane(plane, self.modes[index]))
        })?;
        Ok(Arc::new(out))
    }
}

impl Filter for RemoveGrain {
    fn filter_type(&self) -> &str {
        "RemoveGrain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{clip, gray8, gray_from_values};
    use crate::types::SampleFormat;

    fn center(mode: i64, data: &[u8]) -> f32 {
        let filter = RemoveGrain::new(clip(vec![gray8(3, 3, data)]), &[mode]).unwrap();
        filter.get_frame(0).unwrap().plane(0).read(1, 1)
    }

    const RAMP_SPIKE: [u8; 9] = [1, 2, 3, 4, 100, 6, 7, 8, 9];

    #[test]
    fn test_mode1_clips_spike_into_flat_neighborhood() {
        let mut data = [128u8; 9];
        data[4] = 200;
        assert_eq!(center(1, &data), 128.0);
    }

    #[test]
    fn test_rank_clipping_modes() {
        assert_eq!(center(1, &RAMP_SPIKE), 9.0);
        assert_eq!(center(2, &RAMP_SPIKE), 8.0);
        assert_eq!(center(3, &RAMP_SPIKE), 7.0);
        assert_eq!(center(4, &RAMP_SPIKE), 6.0);
    }

    #[test]
    fn test_line_sensitive_modes() {
        // Pairs: (1,9) (2,8) (3,7) (4,6). Mode 5 prefers the smallest change.
        assert_eq!(center(5, &RAMP_SPIKE), 9.0);
        // Mode 9 prefers the tightest pair.
        assert_eq!(center(9, &RAMP_SPIKE), 6.0);
        // Mode 18 scores max(|c-p|, |c-q|): (4,6) -> 96 is the smallest.
        assert_eq!(center(18, &RAMP_SPIKE), 6.0);
    }

    #[test]
    fn test_mode10_tie_prefers_a5_over_a4() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8, 9];
        assert_eq!(center(10, &data), 6.0);
    }

    #[test]
    fn test_averaging_modes() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8, 9];
        assert_eq!(center(11, &data), 5.0);
        assert_eq!(center(12, &data), 5.0);

        let mut spike = [10u8; 9];
        spike[4] = 100;
        assert_eq!(center(19, &spike), 10.0);
        assert_eq!(center(20, &spike), 20.0);
    }

    #[test]
    fn test_mode21_and_22_rounding() {
        let data = [1, 10, 10, 10, 0, 10, 10, 10, 2];
        assert_eq!(center(21, &data), 1.0);
        assert_eq!(center(22, &data), 2.0);

        let values: Vec<f32> = data.iter().map(|v| *v as f32).collect();
        for mode in [21, 22] {
            let frame = gray_from_values(SampleFormat::F32, 3, 3, &values);
            let filter = RemoveGrain::new(clip(vec![frame]), &[mode]).unwrap();
            assert_eq!(filter.get_frame(0).unwrap().plane(0).read(1, 1), 1.5);
        }
    }

    #[test]
    fn test_mode17_keeps_value_inside_common_band() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8, 9];
        assert_eq!(center(17, &data), 5.0);
        assert_eq!(center(17, &RAMP_SPIKE), 6.0);
    }

    #[test]
    fn test_modes_23_and_24() {
        let data = [10, 10, 10, 10, 100, 10, 10, 10, 30];
        assert_eq!(center(23, &data), 80.0);
        assert_eq!(center(24, &data), 100.0);
    }

    #[test]
    fn test_field_modes_rebuild_one_parity() {
        let rows = [[0u8; 3], [100; 3], [0; 3], [100; 3]].concat();
        let frame = gray8(3, 4, &rows);

        let out = RemoveGrain::new(clip(vec![frame.clone()]), &[13])
            .unwrap()
            .get_frame(0)
            .unwrap();
        let column: Vec<f32> = (0..4).map(|y| out.plane(0).read(1, y)).collect();
        assert_eq!(column, vec![50.0, 100.0, 100.0, 100.0]);

        let out = RemoveGrain::new(clip(vec![frame]), &[14])
            .unwrap()
            .get_frame(0)
            .unwrap();
        let column: Vec<f32> = (0..4).map(|y| out.plane(0).read(1, y)).collect();
        assert_eq!(column, vec![0.0, 0.0, 0.0, 50.0]);
    }

    #[test]
    fn test_mode0_is_identity_and_modes_are_validated() {
        let frame = gray8(3, 3, &RAMP_SPIKE);
        let filter = RemoveGrain::new(clip(vec![frame.clone()]), &[0]).unwrap();
        assert_eq!(*filter.get_frame(0).unwrap(), frame);

        assert!(RemoveGrain::new(clip(vec![frame.clone()]), &[25]).is_err());
        assert!(RemoveGrain::new(clip(vec![frame]), &[]).is_err());
    }

    #[test]
    fn test_every_mode_stays_in_range_at_edges() {
        let data: Vec<u8> = (0..20u8).map(|v| v.wrapping_mul(37)).collect();
        let frame = gray8(5, 4, &data);
        for mode in 1..=24 {
            let out = RemoveGrain::new(clip(vec![frame.clone()]), &[mode])
                .unwrap()
                .get_frame(0)
                .unwrap();
            assert_eq!(out.plane(0).width(), 5);
            assert_eq!(out.plane(0).height(), 4);
        }
    }
}
