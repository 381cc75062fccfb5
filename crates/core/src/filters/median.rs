//! Square-window rank filters: `Median` and `InterQuartileMean`.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::dispatch::{any_selected, dispatch_planes};
use crate::error::FilterResult;
use crate::filter::{Filter, FilterInputs, ParamDefinition, ParamType};
use crate::params::{check_all, fill_forward, ParamReader};
use crate::sample::{render_plane, Plane};
use crate::source::{fetch_checked, ClipSource};
use crate::types::{Frame, VideoInfo};
use crate::window::{gather_square, sort_samples, MAX_SQUARE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankKind {
    Median,
    InterQuartileMean,
}

impl RankKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Median => "Median",
            Self::InterQuartileMean => "InterQuartileMean",
        }
    }
}

pub struct RankFilter {
    kind: RankKind,
    clip: Arc<dyn ClipSource>,
    info: VideoInfo,
    radii: Vec<usize>,
    process: Vec<bool>,
}

impl RankFilter {
    pub fn new(
        kind: RankKind,
        clip: Arc<dyn ClipSource>,
        radius: &[i64],
        planes: Option<&[i64]>,
    ) -> FilterResult<Self> {
        let info = clip.info();
        let plane_count = info.format.num_planes();
        check_all("radius", radius, 0, 3)?;

        let radii: Vec<usize> = fill_forward(radius, plane_count, &[1])
            .into_iter()
            .map(|r| r as usize)
            .collect();
        let mut process = crate::params::resolve_planes(planes, plane_count)?;
        for (selected, radius) in process.iter_mut().zip(&radii) {
            *selected &= *radius > 0;
        }

        debug!(filter = kind.name(), ?radii, ?process, "configured rank filter");
        Ok(Self {
            kind,
            clip,
            info,
            radii,
            process,
        })
    }

    pub fn from_inputs(kind: RankKind, inputs: &FilterInputs) -> FilterResult<Self> {
        let reader = ParamReader::new(&inputs.params);
        reader.ensure_known(&["radius", "planes"])?;
        let radius = reader.int_list("radius")?.unwrap_or_default();
        let planes = reader.int_list("planes")?;
        Self::new(kind, inputs.clip.clone(), &radius, planes.as_deref())
    }

    pub fn definitions() -> Vec<ParamDefinition> {
        vec![
            ParamDefinition::optional("radius", ParamType::IntList, serde_json::json!(1)),
            ParamDefinition::unset("planes", ParamType::IntList),
        ]
    }

    fn filter_plane(&self, plane: &Plane, radius: usize) -> Plane {
        let grid = plane.grid();
        let kind = self.kind;
        render_plane(plane.format(), plane.width(), plane.height(), |x, y| {
            let mut window = [0.0f32; MAX_SQUARE];
            let n = gather_square(&grid, x, y, radius, &mut window);
            match kind {
                RankKind::Median => median_of(&mut window[..n]),
                RankKind::InterQuartileMean => interquartile_mean(&mut window[..n]),
            }
        })
    }
}

/// Middle order statistic of an odd-length window.
pub fn median_of(values: &mut [f32]) -> f32 {
    let mid = values.len() / 2;
    let (_, median, _) = values.select_nth_unstable_by(mid, f32::total_cmp);
    *median
}

/// Mean after discarding `floor(n / 4)` samples from each end of the sorted window.
///
/// This is a whole-sample trimmed mean (2 of 9, 6 of 25, 12 of 49 dropped per
/// side); boundary samples are never fractionally weighted.
pub fn interquartile_mean(values: &mut [f32]) -> f32 {
    sort_samples(values);
    let quarter = values.len() / 4;
    let kept = &values[quarter..values.len() - quarter];
    kept.iter().sum::<f32>() / kept.len() as f32
}

impl ClipSource for RankFilter {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn info(&self) -> VideoInfo {
        self.info
    }

    fn get_frame(&self, n: usize) -> FilterResult<Arc<Frame>> {
        let src = fetch_checked(self.clip.as_ref(), n, &self.info)?;
        if !any_selected(&self.process) {
            return Ok(src);
        }
        trace!(filter = self.kind.name(), frame = n, "processing frame");
        let out = dispatch_planes(&src, &self.process, |index, plane| {
            Ok(self.filter_plane(plane, self.radii[index]))
        })?;
        Ok(Arc::new(out))
    }
}

impl Filter for RankFilter {
    fn filter_type(&self) -> &str {
        self.kind.name()
    }
}
