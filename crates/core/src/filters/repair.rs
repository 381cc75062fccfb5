//! `Repair`: limit a processed clip to what a reference ("repair") clip
//! allows in the same 3x3 neighborhood.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::dispatch::{any_selected, dispatch_planes};
use crate::error::{FilterError, FilterResult};
use crate::filter::{Filter, FilterInputs, ParamDefinition, ParamType};
use crate::params::{check_all, fill_forward, ParamReader};
use crate::sample::{render_plane, Plane};
use crate::source::{ensure_same_layout, fetch_checked, ClipSource};
use crate::types::{Frame, VideoInfo};
use crate::window::{best_pair, clamp, sort_samples, PixelRange, Window3};

/// `(c, repair window, range) -> output`. `w.c` is the repair center `cr`.
pub type RepairKernel = fn(f32, &Window3, &PixelRange) -> f32;

pub const REPAIR_MODES: [RepairKernel; 25] = [
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
    mode12,
    mode13,
    mode14,
    mode15,
    mode16,
    mode17,
    mode18,
    mode19,
    mode20,
    mode21,
    mode22,
    mode23,
    mode24,
];

fn passthrough(c: f32, _: &Window3, _: &PixelRange) -> f32 {
    c
}

fn sorted9(w: &Window3) -> [f32; 9] {
    let mut s = [0.0f32; 9];
    s[..8].copy_from_slice(&w.a);
    s[8] = w.c;
    sort_samples(&mut s);
    s
}

fn rank_clip(c: f32, w: &Window3, k: usize) -> f32 {
    let s = sorted9(w);
    clamp(c, s[k], s[8 - k])
}

fn mode01(c: f32, w: &Window3, _: &PixelRange) -> f32 {
    rank_clip(c, w, 0)
}

fn mode02(c: f32, w: &Window3, _: &PixelRange) -> f32 {
    rank_clip(c, w, 1)
}

fn mode03(c: f32, w: &Window3, _: &PixelRange) -> f32 {
    rank_clip(c, w, 2)
}

fn mode04(c: f32, w: &Window3, _: &PixelRange) -> f32 {
    rank_clip(c, w, 3)
}

/// Rank bounds over the eight neighbors only, widened to include the
/// repair center.
fn rank_clip_extended(c: f32, w: &Window3, k: usize) -> f32 {
    let s = w.sorted();
    clamp(c, s[k].min(w.c), s[7 - k].max(w.c))
}

fn mode11(c: f32, w: &Window3, _: &PixelRange) -> f32 {
    rank_clip_extended(c, w, 0)
}

fn mode12(c: f32, w: &Window3, _: &PixelRange) -> f32 {
    rank_clip_extended(c, w, 1)
}

fn mode13(c: f32, w: &Window3, _: &PixelRange) -> f32 {
    rank_clip_extended(c, w, 2)
}

fn mode14(c: f32, w: &Window3, _: &PixelRange) -> f32 {
    rank_clip_extended(c, w, 3)
}

/// Pair `i` widened to include the repair center.
#[inline]
fn extended_bounds(w: &Window3, i: usize) -> (f32, f32) {
    let (lo, hi) = w.pair_bounds(i);
    (lo.min(w.c), hi.max(w.c))
}

/// Score every extended pair against `c`, then clamp `c` into the winner.
#[inline]
fn clip_to_best_extended_pair(c: f32, w: &Window3, score: impl Fn(f32, f32, f32) -> f32) -> f32 {
    let scores = [0, 1, 2, 3].map(|i| {
        let (lo, hi) = extended_bounds(w, i);
        score(c, lo, hi)
    });
    let (lo, hi) = extended_bounds(w, best_pair(scores));
    clamp(c, lo, hi)
}

fn mode05(c: f32, w: &Window3, _: &PixelRange) -> f32 {
    clip_to_best_extended_pair(c, w, |c, lo, hi| (c - clamp(c, lo, hi)).abs())
}

fn mode06(c: f32, w: &Window3, range: &PixelRange) -> f32 {
    clip_to_best_extended_pair(c, w, |c, lo, hi| {
        range.clamp((c - clamp(c, lo, hi)).abs() * 2.0 + (hi - lo))
    })
}

fn mode07(c: f32, w: &Window3, _: &PixelRange) -> f32 {
    clip_to_best_extended_pair(c, w, |c, lo, hi| (c - clamp(c, lo, hi)).abs() + (hi - lo))
}

fn mode08(c: f32, w: &Window3, range: &PixelRange) -> f32 {
    clip_to_best_extended_pair(c, w, |c, lo, hi| {
        range.clamp((c - clamp(c, lo, hi)).abs() + (hi - lo) * 2.0)
    })
}

fn mode09(c: f32, w: &Window3, _: &PixelRange) -> f32 {
    clip_to_best_extended_pair(c, w, |_, lo, hi| hi - lo)
}

fn mode10(c: f32, w: &Window3, _: &PixelRange) -> f32 {
    // a7, a8, a6, a2, a3, a1, a5, cr, a4
    let candidates = [
        w.a[6], w.a[7], w.a[5], w.a[1], w.a[2], w.a[0], w.a[4], w.c, w.a[3],
    ];
    let min = candidates
        .iter()
        .map(|v| (c - v).abs())
        .fold(f32::INFINITY, f32::min);
    candidates
        .into_iter()
        .find(|v| (c - v).abs() == min)
        .unwrap_or(c)
}

/// Pick a pair by looking at the repair center only, then clamp `c` into
/// that pair widened by `cr`.
#[inline]
fn clip_by_repair_center(c: f32, w: &Window3, score: impl Fn(f32, f32, f32) -> f32) -> f32 {
    let cr = w.c;
    let scores = [0, 1, 2, 3].map(|i| {
        let (lo, hi) = w.pair_bounds(i);
        score(cr, lo, hi)
    });
    let (lo, hi) = extended_bounds(w, best_pair(scores));
    clamp(c, lo, hi)
}

fn mode15(c: f32, w: &Window3, _: &PixelRange) -> f32 {
    clip_by_repair_center(c, w, |cr, lo, hi| (cr - clamp(cr, lo, hi)).abs())
}

fn mode16(c: f32, w: &Window3, range: &PixelRange) -> f32 {
    clip_by_repair_center(c, w, |cr, lo, hi| {
        range.clamp((cr - clamp(cr, lo, hi)).abs() * 2.0 + (hi - lo))
    })
}

fn mode17(c: f32, w: &Window3, _: &PixelRange) -> f32 {
    let mut lower = f32::NEG_INFINITY;
    let mut upper = f32::INFINITY;
    for i in 0..4 {
        let (lo, hi) = w.pair_bounds(i);
        lower = lower.max(lo);
        upper = upper.min(hi);
    }
    clamp(c, lower.min(upper).min(w.c), lower.max(upper).max(w.c))
}

fn mode18(c: f32, w: &Window3, _: &PixelRange) -> f32 {
    let cr = w.c;
    let scores = [0, 1, 2, 3].map(|i| {
        let (p, q) = w.pair(i);
        (cr - p).abs().max((cr - q).abs())
    });
    let (lo, hi) = extended_bounds(w, best_pair(scores));
    clamp(c, lo, hi)
}

/// The two smallest values of `|center - a_i|`.
#[inline]
fn two_smallest_distances(center: f32, w: &Window3) -> (f32, f32) {
    let mut distances = w.a.map(|a| (center - a).abs());
    sort_samples(&mut distances);
    (distances[0], distances[1])
}

#[inline]
fn clamp_around(v: f32, center: f32, d: f32, range: &PixelRange) -> f32 {
    clamp(v, range.clamp(center - d), range.clamp(center + d))
}

fn mode19(c: f32, w: &Window3, range: &PixelRange) -> f32 {
    let (d, _) = two_smallest_distances(w.c, w);
    clamp_around(c, w.c, d, range)
}

fn mode20(c: f32, w: &Window3, range: &PixelRange) -> f32 {
    let (_, d) = two_smallest_distances(w.c, w);
    clamp_around(c, w.c, d, range)
}

/// `min_i max(mal_i - center, center - mil_i)`.
#[inline]
fn tightest_spread(center: f32, w: &Window3) -> f32 {
    (0..4)
        .map(|i| {
            let (lo, hi) = w.pair_bounds(i);
            (hi - center).max(center - lo)
        })
        .fold(f32::INFINITY, f32::min)
}

fn mode21(c: f32, w: &Window3, range: &PixelRange) -> f32 {
    clamp_around(c, w.c, tightest_spread(w.c, w), range)
}

fn mode22(c: f32, w: &Window3, range: &PixelRange) -> f32 {
    let (d, _) = two_smallest_distances(c, w);
    clamp_around(w.c, c, d, range)
}

fn mode23(c: f32, w: &Window3, range: &PixelRange) -> f32 {
    let (_, d) = two_smallest_distances(c, w);
    clamp_around(w.c, c, d, range)
}

fn mode24(c: f32, w: &Window3, range: &PixelRange) -> f32 {
    clamp_around(w.c, c, tightest_spread(c, w), range)
}

pub fn repair_plane(plane: &Plane, repair: &Plane, mode: usize) -> Plane {
    let grid = plane.grid();
    let repair_grid = repair.grid();
    let range = PixelRange::of(plane.format());
    let kernel = REPAIR_MODES[mode];
    render_plane(plane.format(), plane.width(), plane.height(), |x, y| {
        kernel(grid.at(x, y), &Window3::load(&repair_grid, x, y), &range)
    })
}

pub struct Repair {
    clip: Arc<dyn ClipSource>,
    repair_clip: Arc<dyn ClipSource>,
    info: VideoInfo,
    modes: Vec<usize>,
    process: Vec<bool>,
}

impl Repair {
    pub fn new(
        clip: Arc<dyn ClipSource>,
        repair_clip: Arc<dyn ClipSource>,
        mode: &[i64],
    ) -> FilterResult<Self> {
        if mode.is_empty() {
            return Err(FilterError::invalid("mode", "at least one mode is required"));
        }
        check_all("mode", mode, 0, 24)?;
        ensure_same_layout(clip.as_ref(), repair_clip.as_ref(), "repairclip")?;

        let info = clip.info();
        let modes: Vec<usize> = fill_forward(mode, info.format.num_planes(), &[0])
            .into_iter()
            .map(|m| m as usize)
            .collect();
        let process = modes.iter().map(|m| *m != 0).collect();

        debug!(?modes, repairclip = repair_clip.name(), "configured Repair");
        Ok(Self {
            clip,
            repair_clip,
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
        let repair_clip = inputs
            .named_clip("repairclip")
            .ok_or_else(|| FilterError::invalid("repairclip", "clip is required"))?;
        Self::new(inputs.clip.clone(), repair_clip, &mode)
    }

    pub fn definitions() -> Vec<ParamDefinition> {
        vec![
            ParamDefinition::required("repairclip", ParamType::Clip),
            ParamDefinition::required("mode", ParamType::IntList),
        ]
    }
}

impl ClipSource for Repair {
    fn name(&self) -> &str {
        "Repair"
    }

    fn info(&self) -> VideoInfo {
        self.info
    }

    fn get_frame(&self, n: usize) -> FilterResult<Arc<Frame>> {
        let src = fetch_checked(self.clip.as_ref(), n, &self.info)?;
        if !any_selected(&self.process) {
            return Ok(src);
        }
        let repair = fetch_checked(self.repair_clip.as_ref(), n, &self.info)?;
        trace!(frame = n, "Repair");
        let out = dispatch_planes(&src, &self.process, |index, plane| {
            Ok(repair_plane(plane, repair.plane(index), self.modes[index]))
        })?;
        Ok(Arc::new(out))
    }
}

impl Filter for Repair {
    fn filter_type(&self) -> &str {
        "Repair"
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::test_support::{clip, flat_gray8, gray8, random_frame};
    use crate::types::SampleFormat;

    const RAMP: [u8; 9] = [1, 2, 3, 4, 5, 6, 7, 8, 9];

    fn center(mode: i64, c: u8, repair: &[u8]) -> f32 {
        let filter = Repair::new(
            clip(vec![flat_gray8(3, 3, c)]),
            clip(vec![gray8(3, 3, repair)]),
            &[mode],
        )
        .unwrap();
        filter.get_frame(0).unwrap().plane(0).read(1, 1)
    }

    #[test]
    fn test_flat_repair_clip_pulls_spike_back() {
        assert_eq!(center(1, 200, &[128; 9]), 128.0);
    }

    #[test]
    fn test_rank_modes_include_repair_center() {
        assert_eq!(center(1, 100, &RAMP), 9.0);
        assert_eq!(center(2, 100, &RAMP), 8.0);
        assert_eq!(center(4, 100, &RAMP), 6.0);
        assert_eq!(center(4, 0, &RAMP), 4.0);
    }

    #[test]
    fn test_extended_rank_modes_rank_neighbors_only() {
        // The repair center is the window minimum.
        const LOW_CENTER: [u8; 9] = [1, 2, 3, 4, 0, 5, 6, 7, 8];
        for (mode, ranked) in [(11, 0.0), (12, 1.0), (13, 2.0), (14, 3.0)] {
            assert_eq!(center(mode, 0, &LOW_CENTER), 0.0, "mode {mode}");
            assert_eq!(center(mode - 10, 0, &LOW_CENTER), ranked, "mode {}", mode - 10);
        }
        // Above the window both families agree: s8[7 - k] equals s9[8 - k].
        assert_eq!(center(12, 100, &LOW_CENTER), 7.0);
        assert_eq!(center(14, 100, &RAMP), 6.0);
    }

    #[test]
    fn test_distance_modes() {
        // Repair center 5, closest neighbors 4 and 6.
        assert_eq!(center(19, 100, &RAMP), 6.0);
        assert_eq!(center(20, 100, &RAMP), 6.0);
        assert_eq!(center(21, 100, &RAMP), 6.0);
        assert_eq!(center(17, 100, &RAMP), 6.0);
        assert_eq!(center(10, 100, &RAMP), 9.0);
    }

    #[test]
    fn test_reverse_modes_move_repair_center() {
        // d = min |100 - a_i| = 91, so cr = 5 is pulled up to 9.
        assert_eq!(center(22, 100, &RAMP), 9.0);
        // u = 96 keeps cr = 5 inside [4, 196].
        assert_eq!(center(24, 100, &RAMP), 5.0);
    }

    #[test]
    fn test_self_repair_mode1_is_identity() {
        let mut rng = StdRng::seed_from_u64(7);
        let frame = random_frame(SampleFormat::U8, 6, 5, &mut rng);
        let input = clip(vec![frame.clone()]);
        let filter = Repair::new(input.clone(), input, &[1]).unwrap();
        assert_eq!(*filter.get_frame(0).unwrap(), frame);
    }

    #[test]
    fn test_mode0_copies_and_layout_is_checked() {
        let frame = gray8(3, 3, &RAMP);
        let filter = Repair::new(clip(vec![frame.clone()]), clip(vec![flat_gray8(3, 3, 0)]), &[0])
            .unwrap();
        assert_eq!(*filter.get_frame(0).unwrap(), frame);

        let result = Repair::new(clip(vec![frame]), clip(vec![flat_gray8(4, 3, 0)]), &[1]);
        assert!(matches!(result, Err(FilterError::FormatMismatch(_))));
    }
}
