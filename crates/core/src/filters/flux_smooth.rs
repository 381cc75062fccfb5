//! FluxSmooth: smooth only samples that fluctuate, i.e. are a local
//! temporal extremum (both neighbors strictly above or strictly below).

use std::sync::Arc;

use tracing::{debug, trace};

use crate::dispatch::{any_selected, dispatch_planes};
use crate::error::FilterResult;
use crate::filter::{Filter, FilterInputs, ParamDefinition, ParamType};
use crate::params::{check_all, normalize_thresholds, resolve_planes, threshold_limit, ParamReader};
use crate::sample::{render_plane, Plane};
use crate::source::{fetch_checked, ClipSource};
use crate::types::{Frame, VideoInfo};

const DEFAULT_THRESHOLD: f32 = 7.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluxKind {
    Temporal,
    SpatioTemporal,
}

impl FluxKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Temporal => "FluxSmoothT",
            Self::SpatioTemporal => "FluxSmoothST",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FluxParams {
    pub temporal_threshold: Vec<f64>,
    pub spatial_threshold: Vec<f64>,
    pub planes: Option<Vec<i64>>,
    pub scalep: bool,
}

pub struct FluxSmooth {
    kind: FluxKind,
    clip: Arc<dyn ClipSource>,
    info: VideoInfo,
    temporal: Vec<f32>,
    /// Negative entries disable the spatial part for that plane.
    spatial: Vec<f32>,
    process: Vec<bool>,
}

#[inline]
fn fluctuates(p: f32, c: f32, n: f32) -> bool {
    (p > c && n > c) || (p < c && n < c)
}

pub fn flux_plane(prev: &Plane, cur: &Plane, next: &Plane, tt: f32) -> Plane {
    render_plane(cur.format(), cur.width(), cur.height(), |x, y| {
        let (p, c, n) = (prev.read(x, y), cur.read(x, y), next.read(x, y));
        if !fluctuates(p, c, n) {
            return c;
        }
        let mut sum = c;
        let mut count = 1.0f32;
        for v in [p, n] {
            if (v - c).abs() <= tt {
                sum += v;
                count += 1.0;
            }
        }
        sum / count
    })
}

/// The outermost one-sample border is copied.
pub fn flux_spatial_plane(prev: &Plane, cur: &Plane, next: &Plane, tt: f32, st: f32) -> Plane {
    let (width, height) = (cur.width(), cur.height());
    render_plane(cur.format(), width, height, |x, y| {
        let c = cur.read(x, y);
        if x == 0 || y == 0 || x + 1 >= width || y + 1 >= height {
            return c;
        }
        let (p, n) = (prev.read(x, y), next.read(x, y));
        if !fluctuates(p, c, n) {
            return c;
        }
        let mut sum = c;
        let mut count = 1.0f32;
        for v in [p, n] {
            if (v - c).abs() <= tt {
                sum += v;
                count += 1.0;
            }
        }
        for sy in y - 1..=y + 1 {
            for sx in x - 1..=x + 1 {
                if sx == x && sy == y {
                    continue;
                }
                let v = cur.read(sx, sy);
                if (v - c).abs() <= st {
                    sum += v;
                    count += 1.0;
                }
            }
        }
        sum / count
    })
}

impl FluxSmooth {
    pub fn new(
        kind: FluxKind,
        clip: Arc<dyn ClipSource>,
        params: &FluxParams,
    ) -> FilterResult<Self> {
        let info = clip.info();
        let format = info.format.sample;
        let plane_count = info.format.num_planes();
        let limit = threshold_limit(params.scalep, format) as f64;

        check_all("temporal_threshold", &params.temporal_threshold, -1.0, limit)?;
        check_all("spatial_threshold", &params.spatial_threshold, -1.0, limit)?;
        let as_f32 = |values: &[f64]| values.iter().map(|v| *v as f32).collect::<Vec<_>>();
        let temporal = normalize_thresholds(
            &as_f32(&params.temporal_threshold),
            plane_count,
            params.scalep,
            format,
            &[DEFAULT_THRESHOLD],
        );
        let spatial = match kind {
            FluxKind::Temporal => vec![-1.0; plane_count],
            FluxKind::SpatioTemporal => normalize_thresholds(
                &as_f32(&params.spatial_threshold),
                plane_count,
                params.scalep,
                format,
                &[DEFAULT_THRESHOLD],
            ),
        };

        let mut process = resolve_planes(params.planes.as_deref(), plane_count)?;
        for (index, selected) in process.iter_mut().enumerate() {
            *selected &= temporal[index] >= 0.0 || spatial[index] >= 0.0;
        }

        debug!(filter = kind.name(), ?temporal, ?spatial, ?process, "configured FluxSmooth");
        Ok(Self {
            kind,
            clip,
            info,
            temporal,
            spatial,
            process,
        })
    }

    pub fn from_inputs(kind: FluxKind, inputs: &FilterInputs) -> FilterResult<Self> {
        let reader = ParamReader::new(&inputs.params);
        match kind {
            FluxKind::Temporal => {
                reader.ensure_known(&["temporal_threshold", "planes", "scalep"])?
            }
            FluxKind::SpatioTemporal => reader.ensure_known(&[
                "temporal_threshold",
                "spatial_threshold",
                "planes",
                "scalep",
            ])?,
        }
        let params = FluxParams {
            temporal_threshold: reader.float_list("temporal_threshold")?.unwrap_or_default(),
            spatial_threshold: reader.float_list("spatial_threshold")?.unwrap_or_default(),
            planes: reader.int_list("planes")?,
            scalep: reader.bool("scalep")?.unwrap_or(false),
        };
        Self::new(kind, inputs.clip.clone(), &params)
    }

    pub fn definitions(kind: FluxKind) -> Vec<ParamDefinition> {
        let mut definitions = vec![ParamDefinition::optional(
            "temporal_threshold",
            ParamType::FloatList,
            serde_json::json!(7),
        )];
        if kind == FluxKind::SpatioTemporal {
            definitions.push(ParamDefinition::optional(
                "spatial_threshold",
                ParamType::FloatList,
                serde_json::json!(7),
            ));
        }
        definitions.push(ParamDefinition::unset("planes", ParamType::IntList));
        definitions.push(ParamDefinition::optional(
            "scalep",
            ParamType::Bool,
            serde_json::json!(false),
        ));
        definitions
    }
}

impl ClipSource for FluxSmooth {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn info(&self) -> VideoInfo {
        self.info
    }

    fn get_frame(&self, n: usize) -> FilterResult<Arc<Frame>> {
        let src = fetch_checked(self.clip.as_ref(), n, &self.info)?;
        if n == 0 || n + 1 >= self.info.num_frames || !any_selected(&self.process) {
            return Ok(src);
        }
        trace!(filter = self.kind.name(), frame = n, "processing frame");

        let prev = fetch_checked(self.clip.as_ref(), n - 1, &self.info)?;
        let next = fetch_checked(self.clip.as_ref(), n + 1, &self.info)?;
        let out = dispatch_planes(&src, &self.process, |index, plane| {
            let (p, q) = (prev.plane(index), next.plane(index));
            let tt = self.temporal[index];
            let st = self.spatial[index];
            Ok(if st < 0.0 {
                flux_plane(p, plane, q, tt)
            } else {
                flux_spatial_plane(p, plane, q, tt, st)
            })
        })?;
        Ok(Arc::new(out))
    }
}

impl Filter for FluxSmooth {
    fn filter_type(&self) -> &str {
        self.kind.name()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_support::{clip, flat_gray8, params};

    fn flat_clip(values: &[u8]) -> Arc<dyn ClipSource> {
        clip(values.iter().map(|v| flat_gray8(3, 3, *v)).collect())
    }

    fn flux(kind: FluxKind, input: Arc<dyn ClipSource>, map: serde_json::Value) -> FluxSmooth {
        FluxSmooth::from_inputs(kind, &FilterInputs::new(input, params(map))).unwrap()
    }

    fn center(filter: &FluxSmooth, n: usize) -> f32 {
        filter.get_frame(n).unwrap().plane(0).read(1, 1)
    }

    #[test]
    fn test_temporal_smooths_only_fluctuating_samples() {
        let filter = flux(FluxKind::Temporal, flat_clip(&[100, 110, 104]), json!({}));
        // 100 is 10 away (excluded), 104 is 6 away (included).
        assert_eq!(center(&filter, 1), 107.0);
        assert_eq!(center(&filter, 0), 100.0);
        assert_eq!(center(&filter, 2), 104.0);

        let filter = flux(FluxKind::Temporal, flat_clip(&[100, 105, 110]), json!({}));
        assert_eq!(center(&filter, 1), 105.0);
    }

    #[test]
    fn test_disabled_threshold_copies_plane() {
        let input = flat_clip(&[100, 110, 104]);
        let filter = flux(FluxKind::Temporal, input.clone(), json!({"temporal_threshold": -1}));
        assert_eq!(*filter.get_frame(1).unwrap(), *input.get_frame(1).unwrap());

        let filter = flux(
            FluxKind::SpatioTemporal,
            input.clone(),
            json!({"temporal_threshold": -1, "spatial_threshold": -1}),
        );
        assert_eq!(*filter.get_frame(1).unwrap(), *input.get_frame(1).unwrap());
    }

    fn spatial_clip() -> Arc<dyn ClipSource> {
        let mut cur = flat_gray8(3, 3, 108);
        cur.planes[0].write(1, 1, 110.0);
        clip(vec![flat_gray8(3, 3, 100), cur, flat_gray8(3, 3, 104)])
    }

    #[test]
    fn test_spatio_temporal_adds_close_spatial_neighbors() {
        let filter = flux(FluxKind::SpatioTemporal, spatial_clip(), json!({}));
        let out = filter.get_frame(1).unwrap();
        // (110 + 104 + 8 * 108) / 10 = 107.8
        assert_eq!(out.plane(0).read(1, 1), 108.0);
        assert_eq!(out.plane(0).read(0, 0), 108.0);

        let filter = flux(
            FluxKind::SpatioTemporal,
            spatial_clip(),
            json!({"spatial_threshold": -1}),
        );
        assert_eq!(center(&filter, 1), 107.0);
    }

    #[test]
    fn test_spatial_threshold_is_rejected_for_temporal_only() {
        let result = FluxSmooth::from_inputs(
            FluxKind::Temporal,
            &FilterInputs::new(flat_clip(&[0]), params(json!({"spatial_threshold": 3}))),
        );
        assert!(result.is_err());
        let result = FluxSmooth::from_inputs(
            FluxKind::Temporal,
            &FilterInputs::new(flat_clip(&[0]), params(json!({"temporal_threshold": -2}))),
        );
        assert!(result.is_err());
    }
}
