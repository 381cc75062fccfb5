//! `VerticalCleaner`: vertical median-style cleanup using the samples
//! directly above and below.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::dispatch::{any_selected, dispatch_planes};
use crate::error::{FilterError, FilterResult};
use crate::filter::{Filter, FilterInputs, ParamDefinition, ParamType};
use crate::params::{check_all, fill_forward, ParamReader};
use crate::sample::{render_plane, Plane, SampleGrid};
use crate::source::{fetch_checked, ClipSource};
use crate::types::{Frame, VideoInfo};
use crate::window::clamp;

fn vertical_median(grid: &SampleGrid, x: usize, y: usize) -> f32 {
    let (p1, n1) = (grid.at(x, y - 1), grid.at(x, y + 1));
    clamp(grid.at(x, y), p1.min(n1), p1.max(n1))
}

fn relaxed_vertical_median(grid: &SampleGrid, x: usize, y: usize) -> f32 {
    let (p1, p2) = (grid.at(x, y - 1), grid.at(x, y - 2));
    let (n1, n2) = (grid.at(x, y + 1), grid.at(x, y + 2));
    let (dp, dn) = (p1 - p2, n1 - n2);

    let mut upper = p1.max(n1);
    let mut lower = p1.min(n1);
    if dp > 0.0 && dn > 0.0 {
        upper = upper.max((p1 + dp).min(n1 + dn));
    }
    if dp < 0.0 && dn < 0.0 {
        lower = lower.min((p1 + dp).max(n1 + dn));
    }
    clamp(grid.at(x, y), lower, upper)
}

/// Rows closer than `margin` to the top or bottom edge are copied.
pub fn vertical_clean_plane(plane: &Plane, mode: usize) -> Plane {
    let grid = plane.grid();
    let height = plane.height();
    let margin = mode;
    render_plane(plane.format(), plane.width(), height, |x, y| {
        if y < margin || y + margin >= height {
            return grid.at(x, y);
        }
        match mode {
            1 => vertical_median(&grid, x, y),
            _ => relaxed_vertical_median(&grid, x, y),
        }
    })
}

pub struct VerticalCleaner {
    clip: Arc<dyn ClipSource>,
    info: VideoInfo,
    modes: Vec<usize>,
    process: Vec<bool>,
}

impl VerticalCleaner {
    pub fn new(clip: Arc<dyn ClipSource>, mode: &[i64]) -> FilterResult<Self> {
        if mode.is_empty() {
            return Err(FilterError::invalid("mode", "at least one mode is required"));
        }
        check_all("mode", mode, 0, 2)?;
        let info = clip.info();
        let modes: Vec<usize> = fill_forward(mode, info.format.num_planes(), &[0])
            .into_iter()
            .map(|m| m as usize)
            .collect();
        let process = modes.iter().map(|m| *m != 0).collect();
        debug!(?modes, "configured VerticalCleaner");
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

impl ClipSource for VerticalCleaner {
    fn name(&self) -> &str {
        "VerticalCleaner"
    }

    fn info(&self) -> VideoInfo {
        self.info
    }

    fn get_frame(&self, n: usize) -> FilterResult<Arc<Frame>> {
        let src = fetch_checked(self.clip.as_ref(), n, &self.info)?;
        if !any_selected(&self.process) {
            return Ok(src);
        }
        trace!(frame = n, "VerticalCleaner");
        let out = dispatch_planes(&src, &self.process, |index, plane| {
            Ok(vertical_clean_plane(plane, self.modes[index]))
        })?;
        Ok(Arc::new(out))
    }
}

impl Filter for VerticalCleaner {
    fn filter_type(&self) -> &str {
        "VerticalCleaner"
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::test_support::{clip, gray8, random_frame, ALL_FORMATS};

    fn column(mode: i64, values: &[u8]) -> Vec<f32> {
        let frame = gray8(1, values.len(), values);
        let out = VerticalCleaner::new(clip(vec![frame]), &[mode])
            .unwrap()
            .get_frame(0)
            .unwrap();
        (0..values.len()).map(|y| out.plane(0).read(0, y)).collect()
    }

    #[test]
    fn test_mode1_clamps_between_vertical_neighbors() {
        assert_eq!(column(1, &[10, 50, 20]), vec![10.0, 20.0, 20.0]);
        assert_eq!(column(1, &[10, 15, 20]), vec![10.0, 15.0, 20.0]);
    }

    #[test]
    fn test_mode2_keeps_straight_bound_without_trend() {
        assert_eq!(
            column(2, &[0, 10, 100, 30, 40]),
            vec![0.0, 10.0, 30.0, 30.0, 40.0]
        );
    }

    #[test]
    fn test_mode2_widens_along_consistent_slopes() {
        assert_eq!(
            column(2, &[0, 10, 100, 10, 0]),
            vec![0.0, 10.0, 20.0, 10.0, 0.0]
        );
        assert_eq!(
            column(2, &[100, 90, 0, 90, 100]),
            vec![100.0, 90.0, 80.0, 90.0, 100.0]
        );
    }

    #[test]
    fn test_short_planes_pass_through() {
        assert_eq!(column(1, &[0, 255]), vec![0.0, 255.0]);
        assert_eq!(column(2, &[0, 255, 0]), vec![0.0, 255.0, 0.0]);
    }

    #[test]
    fn test_mode0_is_bit_exact_identity() {
        let mut rng = StdRng::seed_from_u64(11);
        for format in ALL_FORMATS {
            let frame = random_frame(format, 7, 6, &mut rng);
            let filter = VerticalCleaner::new(clip(vec![frame.clone()]), &[0]).unwrap();
            assert_eq!(*filter.get_frame(0).unwrap(), frame, "{format:?}");
        }
    }

    #[test]
    fn test_mode_out_of_range() {
        let frame = gray8(1, 3, &[1, 2, 3]);
        assert!(VerticalCleaner::new(clip(vec![frame]), &[3]).is_err());
    }
}
