use std::sync::Arc;

use tracing::{debug, trace};

use crate::dispatch::{any_selected, dispatch_planes};
use crate::error::FilterResult;
use crate::filter::{Filter, FilterInputs, ParamDefinition, ParamType};
use crate::filters::median::median_of;
use crate::params::{check_range, resolve_planes, ParamReader};
use crate::sample::{render_plane, Plane};
use crate::source::{fetch_checked, ClipSource};
use crate::types::{Frame, VideoInfo};

const MAX_RADIUS: usize = 10;

/// Per-pixel median over `2 * radius + 1` consecutive frames. Frames closer
/// than `radius` to either end of the clip are passed through.
pub struct TemporalMedian {
    clip: Arc<dyn ClipSource>,
    info: VideoInfo,
    radius: usize,
    process: Vec<bool>,
}

impl TemporalMedian {
    pub fn new(
        clip: Arc<dyn ClipSource>,
        radius: i64,
        planes: Option<&[i64]>,
    ) -> FilterResult<Self> {
        let radius = check_range("radius", radius, 1, MAX_RADIUS as i64)? as usize;
        let info = clip.info();
        let process = resolve_planes(planes, info.format.num_planes())?;
        debug!(radius, ?process, "configured TemporalMedian");
        Ok(Self {
            clip,
            info,
            radius,
            process,
        })
    }

    pub fn from_inputs(inputs: &FilterInputs) -> FilterResult<Self> {
        let reader = ParamReader::new(&inputs.params);
        reader.ensure_known(&["radius", "planes"])?;
        let radius = reader.int("radius")?.unwrap_or(1);
        let planes = reader.int_list("planes")?;
        Self::new(inputs.clip.clone(), radius, planes.as_deref())
    }

    pub fn definitions() -> Vec<ParamDefinition> {
        vec![
            ParamDefinition::optional("radius", ParamType::Int, serde_json::json!(1)),
            ParamDefinition::unset("planes", ParamType::IntList),
        ]
    }
}

pub fn temporal_median_plane(planes: &[&Plane]) -> Plane {
    let first = planes[0];
    render_plane(first.format(), first.width(), first.height(), |x, y| {
        let mut values = [0.0f32; 2 * MAX_RADIUS + 1];
        for (slot, plane) in values.iter_mut().zip(planes) {
            *slot = plane.read(x, y);
        }
        median_of(&mut values[..planes.len()])
    })
}

impl ClipSource for TemporalMedian {
    fn name(&self) -> &str {
        "TemporalMedian"
    }

    fn info(&self) -> VideoInfo {
        self.info
    }

    fn get_frame(&self, n: usize) -> FilterResult<Arc<Frame>> {
        let src = fetch_checked(self.clip.as_ref(), n, &self.info)?;
        let r = self.radius;
        if n < r || n + r >= self.info.num_frames || !any_selected(&self.process) {
            return Ok(src);
        }
        trace!(frame = n, "TemporalMedian");

        let window = (n - r..=n + r)
            .map(|t| fetch_checked(self.clip.as_ref(), t, &self.info))
            .collect::<FilterResult<Vec<_>>>()?;
        let out = dispatch_planes(&src, &self.process, |index, _| {
            let planes: Vec<&Plane> = window.iter().map(|frame| frame.plane(index)).collect();
            Ok(temporal_median_plane(&planes))
        })?;
        Ok(Arc::new(out))
    }
}

impl Filter for TemporalMedian {
    fn filter_type(&self) -> &str {
        "TemporalMedian"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FilterError;
    use crate::test_support::{clip, flat_gray8, truncated_clip};

    #[test]
    fn test_spike_in_middle_frame_is_removed() {
        let mut spike = flat_gray8(3, 3, 128);
        spike.planes[0].write(1, 1, 255.0);
        let input = clip(vec![flat_gray8(3, 3, 128), spike, flat_gray8(3, 3, 128)]);
        let filter = TemporalMedian::new(input, 1, None).unwrap();
        let out = filter.get_frame(1).unwrap();
        assert_eq!(out.plane(0).read(1, 1), 128.0);
    }

    #[test]
    fn test_boundary_frames_pass_through_on_ramp() {
        // Frame t is flat with value 10 * t, but frame 3 is an outlier.
        let values = [0u8, 10, 20, 250, 40, 50, 60];
        let input = clip(values.iter().map(|v| flat_gray8(2, 2, *v)).collect());
        let filter = TemporalMedian::new(input, 2, None).unwrap();
        let out: Vec<f32> = (0..values.len())
            .map(|n| filter.get_frame(n).unwrap().plane(0).read(0, 0))
            .collect();
        assert_eq!(out, vec![0.0, 10.0, 20.0, 40.0, 50.0, 50.0, 60.0]);
    }

    #[test]
    fn test_radius_larger_than_clip_passes_everything() {
        let input = clip(vec![flat_gray8(2, 2, 1), flat_gray8(2, 2, 9)]);
        let filter = TemporalMedian::new(input, 3, None).unwrap();
        assert_eq!(filter.get_frame(1).unwrap().plane(0).read(0, 0), 9.0);
    }

    #[test]
    fn test_radius_is_validated() {
        let input = clip(vec![flat_gray8(2, 2, 0)]);
        assert!(TemporalMedian::new(input.clone(), 0, None).is_err());
        assert!(TemporalMedian::new(input, 11, None).is_err());
    }

    #[test]
    fn test_missing_neighbor_frame_is_an_error() {
        let input = truncated_clip(vec![flat_gray8(2, 2, 1), flat_gray8(2, 2, 2)], 3);
        let filter = TemporalMedian::new(input, 1, None).unwrap();
        assert!(matches!(
            filter.get_frame(1),
            Err(FilterError::MissingNeighborFrame { frame: 2, .. })
        ));
        assert!(filter.get_frame(0).is_ok());
    }
}
