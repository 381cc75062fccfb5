use std::sync::Arc;

use tracing::{debug, trace};

use crate::dispatch::{any_selected, dispatch_planes};
use crate::error::FilterResult;
use crate::filter::{Filter, FilterInputs, ParamDefinition, ParamType};
use crate::filters::scene_detect::{cut_provider, gated_window, window_span, SceneCutProvider};
use crate::params::{
    check_all, check_range, normalize_thresholds, resolve_planes, threshold_limit, ParamReader,
};
use crate::sample::{render_plane, Plane};
use crate::source::{fetch_checked, fetch_range, ClipSource};
use crate::types::{Frame, VideoInfo};

/// Averages each sample with the temporal neighbors that lie within
/// `threshold` of it, inside a scene-gated window.
pub struct TemporalSoften {
    clip: Arc<dyn ClipSource>,
    info: VideoInfo,
    radius: usize,
    thresholds: Vec<f32>,
    process: Vec<bool>,
    cuts: Arc<dyn SceneCutProvider>,
}

#[derive(Debug, Clone, Default)]
pub struct TemporalSoftenParams {
    pub radius: Option<i64>,
    pub threshold: Vec<f64>,
    pub scenechange: bool,
    pub scthresh: Option<f64>,
    pub planes: Option<Vec<i64>>,
    pub scalep: bool,
}

impl TemporalSoften {
    pub fn new(clip: Arc<dyn ClipSource>, params: &TemporalSoftenParams) -> FilterResult<Self> {
        let info = clip.info();
        let format = info.format.sample;
        let plane_count = info.format.num_planes();

        let radius = check_range("radius", params.radius.unwrap_or(1), 1, 7)? as usize;
        let limit = threshold_limit(params.scalep, format) as f64;
        check_all("threshold", &params.threshold, 0.0, limit)?;
        let requested: Vec<f32> = params.threshold.iter().map(|t| *t as f32).collect();
        let thresholds =
            normalize_thresholds(&requested, plane_count, params.scalep, format, &[4.0, 8.0]);

        let mut process = resolve_planes(params.planes.as_deref(), plane_count)?;
        for (selected, threshold) in process.iter_mut().zip(&thresholds) {
            *selected &= *threshold > 0.0;
        }
        let cuts = cut_provider(&clip, params.scenechange, params.scthresh)?;

        debug!(radius, ?thresholds, ?process, "configured TemporalSoften");
        Ok(Self {
            clip,
            info,
            radius,
            thresholds,
            process,
            cuts,
        })
    }

    pub fn from_inputs(inputs: &FilterInputs) -> FilterResult<Self> {
        let reader = ParamReader::new(&inputs.params);
        reader.ensure_known(&[
            "radius",
            "threshold",
            "scenechange",
            "scthresh",
            "planes",
            "scalep",
        ])?;
        let params = TemporalSoftenParams {
            radius: reader.int("radius")?,
            threshold: reader.float_list("threshold")?.unwrap_or_default(),
            scenechange: reader.bool("scenechange")?.unwrap_or(false),
            scthresh: reader.float("scthresh")?,
            planes: reader.int_list("planes")?,
            scalep: reader.bool("scalep")?.unwrap_or(false),
        };
        Self::new(inputs.clip.clone(), &params)
    }

    pub fn definitions() -> Vec<ParamDefinition> {
        vec![
            ParamDefinition::optional("radius", ParamType::Int, serde_json::json!(1)),
            ParamDefinition::optional("threshold", ParamType::FloatList, serde_json::json!([4, 8])),
            ParamDefinition::optional("scenechange", ParamType::Bool, serde_json::json!(false)),
            ParamDefinition::unset("scthresh", ParamType::Float),
            ParamDefinition::unset("planes", ParamType::IntList),
            ParamDefinition::optional("scalep", ParamType::Bool, serde_json::json!(false)),
        ]
    }
}

pub fn soften_plane(center: &Plane, neighbors: &[&Plane], threshold: f32) -> Plane {
    render_plane(center.format(), center.width(), center.height(), |x, y| {
        let c = center.read(x, y);
        let mut sum = c;
        let mut count = 1.0f32;
        for plane in neighbors {
            let v = plane.read(x, y);
            if (v - c).abs() <= threshold {
                sum += v;
                count += 1.0;
            }
        }
        sum / count
    })
}

impl ClipSource for TemporalSoften {
    fn name(&self) -> &str {
        "TemporalSoften"
    }

    fn info(&self) -> VideoInfo {
        self.info
    }

    fn get_frame(&self, n: usize) -> FilterResult<Arc<Frame>> {
        if !any_selected(&self.process) {
            return fetch_checked(self.clip.as_ref(), n, &self.info);
        }
        let (lo, hi) = window_span(n, self.radius, self.info.num_frames);
        let frames = fetch_range(self.clip.as_ref(), lo, hi, &self.info)?;
        let (start, end) = gated_window(n, lo, &frames, self.cuts.as_ref());
        let src = &frames[n - lo];
        if start == end {
            return Ok(src.clone());
        }
        trace!(frame = n, start, end, "TemporalSoften");

        let neighbors: Vec<&Arc<Frame>> = (start..=end)
            .filter(|t| *t != n)
            .map(|t| &frames[t - lo])
            .collect();
        let out = dispatch_planes(src, &self.process, |index, plane| {
            let planes: Vec<&Plane> = neighbors.iter().map(|frame| frame.plane(index)).collect();
            Ok(soften_plane(plane, &planes, self.thresholds[index]))
        })?;
        Ok(Arc::new(out))
    }
}

impl Filter for TemporalSoften {
    fn filter_type(&self) -> &str {
        "TemporalSoften"
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::FilterError;
    use crate::test_support::{
        clip, flat_gray8, gray_from_values, params, truncated_clip, CountingClip,
    };
    use crate::types::{Frame, SampleFormat};

    fn flat_clip(values: &[u8]) -> Arc<dyn ClipSource> {
        clip(values.iter().map(|v| flat_gray8(2, 2, *v)).collect())
    }

    fn soften(input: Arc<dyn ClipSource>, map: serde_json::Value) -> TemporalSoften {
        TemporalSoften::from_inputs(&FilterInputs::new(input, params(map))).unwrap()
    }

    fn at(filter: &TemporalSoften, n: usize) -> f32 {
        filter.get_frame(n).unwrap().plane(0).read(0, 0)
    }

    #[test]
    fn test_only_close_neighbors_are_averaged() {
        let filter = soften(flat_clip(&[100, 102, 200]), json!({"threshold": 4}));
        assert_eq!(at(&filter, 1), 101.0);
        // Frame 0: window [0, 1], 102 is within 4.
        assert_eq!(at(&filter, 0), 101.0);
        assert_eq!(at(&filter, 2), 200.0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let filter = soften(flat_clip(&[96, 100, 104]), json!({"threshold": 4}));
        assert_eq!(at(&filter, 1), 100.0);
        let filter = soften(flat_clip(&[96, 100, 106]), json!({"threshold": 4}));
        assert_eq!(at(&filter, 1), 98.0);
    }

    #[test]
    fn test_threshold_zero_copies_plane() {
        let input = flat_clip(&[0, 3, 6]);
        let filter = soften(input.clone(), json!({"threshold": 0}));
        for n in 0..3 {
            assert_eq!(*filter.get_frame(n).unwrap(), *input.get_frame(n).unwrap());
        }
    }

    #[test]
    fn test_scene_cut_props_stop_the_window() {
        let mut frames: Vec<Frame> = [100u8, 102, 104]
            .iter()
            .map(|v| flat_gray8(2, 2, *v))
            .collect();
        frames[1].props.scene_change_prev = true;
        frames[0].props.scene_change_next = true;
        let input = clip(frames);

        let ignoring = soften(input.clone(), json!({"threshold": 4}));
        assert_eq!(at(&ignoring, 1), 102.0);
        assert_eq!(at(&ignoring, 0), 101.0);

        let honoring = soften(input, json!({"threshold": 4, "scenechange": true}));
        assert_eq!(at(&honoring, 1), 103.0);
        assert_eq!(at(&honoring, 0), 100.0);
    }

    #[test]
    fn test_internal_detector_finds_cut() {
        let filter = soften(
            flat_clip(&[10, 12, 250, 252]),
            json!({"threshold": 255, "radius": 2, "scthresh": 20}),
        );
        assert_eq!(at(&filter, 1), 11.0);
        assert_eq!(at(&filter, 2), 251.0);
    }

    #[test]
    fn test_scalep_converts_reference_threshold() {
        let ten = SampleFormat::U16 { bits: 10 };
        let frames = [400.0, 408.0, 420.0]
            .iter()
            .map(|v| gray_from_values(ten, 1, 1, &[*v]))
            .collect();
        let input = clip(frames);
        // 2 on the 8-bit scale is 8 native units at 10 bits.
        let filter = soften(input.clone(), json!({"threshold": 2, "scalep": true}));
        assert_eq!(at(&filter, 1), 404.0);
        let filter = soften(input, json!({"threshold": 2}));
        assert_eq!(at(&filter, 1), 408.0);
        assert!(TemporalSoften::from_inputs(&FilterInputs::new(
            flat_clip(&[0]),
            params(json!({"threshold": 300, "scalep": true}))
        ))
        .is_err());
    }

    #[test]
    fn test_detector_reuses_window_frames() {
        let counting = CountingClip::new(flat_clip(&[10, 12, 250, 252, 254]));
        let filter = soften(
            counting.clone(),
            json!({"threshold": 255, "radius": 2, "scthresh": 20}),
        );
        assert_eq!(at(&filter, 2), 252.0);
        assert_eq!(counting.calls(), 5);
    }

    #[test]
    fn test_missing_neighbor_frame_is_an_error() {
        let input = truncated_clip(vec![flat_gray8(2, 2, 1), flat_gray8(2, 2, 2)], 3);
        let filter = soften(input, json!({"threshold": 4}));
        assert!(matches!(
            filter.get_frame(1),
            Err(FilterError::MissingNeighborFrame { frame: 2, .. })
        ));
    }
}
