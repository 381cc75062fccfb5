//! Temporal clense filters: a pixel is limited by its temporal neighbors.
//!
//! * `Clense` takes the median of the previous, current and next frame.
//! * `ForwardClense` / `BackwardClense` extrapolate from the two following
//!   (or preceding) frames and clamp the current value against that trend.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::dispatch::{any_selected, dispatch_planes};
use crate::error::FilterResult;
use crate::filter::{Filter, FilterInputs, ParamDefinition, ParamType};
use crate::params::ParamReader;
use crate::sample::{render_plane, Plane};
use crate::source::{ensure_same_layout, fetch_checked, ClipSource};
use crate::types::{Frame, VideoInfo};
use crate::window::{clamp, median3, PixelRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClenseKind {
    Both,
    Forward,
    Backward,
}

impl ClenseKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Both => "Clense",
            Self::Forward => "ForwardClense",
            Self::Backward => "BackwardClense",
        }
    }
}

pub fn clense_plane(prev: &Plane, cur: &Plane, next: &Plane) -> Plane {
    render_plane(cur.format(), cur.width(), cur.height(), |x, y| {
        median3(prev.read(x, y), cur.read(x, y), next.read(x, y))
    })
}

/// `n1` is the nearer neighbor, `n2` the one after it, in whichever
/// direction the filter looks.
pub fn directional_clense_plane(cur: &Plane, n1: &Plane, n2: &Plane) -> Plane {
    let range = PixelRange::of(cur.format());
    render_plane(cur.format(), cur.width(), cur.height(), |x, y| {
        let near = n1.read(x, y);
        let trend = range.clamp(near * 2.0 - n2.read(x, y));
        clamp(cur.read(x, y), near.min(trend), near.max(trend))
    })
}

pub struct Clense {
    kind: ClenseKind,
    clip: Arc<dyn ClipSource>,
    previous: Arc<dyn ClipSource>,
    next: Arc<dyn ClipSource>,
    info: VideoInfo,
    process: Vec<bool>,
}

impl Clense {
    pub fn new(
        kind: ClenseKind,
        clip: Arc<dyn ClipSource>,
        previous: Option<Arc<dyn ClipSource>>,
        next: Option<Arc<dyn ClipSource>>,
        planes: Option<&[i64]>,
    ) -> FilterResult<Self> {
        let info = clip.info();
        let previous = previous.unwrap_or_else(|| clip.clone());
        let next = next.unwrap_or_else(|| clip.clone());
        ensure_same_layout(clip.as_ref(), previous.as_ref(), "previous")?;
        ensure_same_layout(clip.as_ref(), next.as_ref(), "next")?;
        let process = crate::params::resolve_planes(planes, info.format.num_planes())?;

        debug!(filter = kind.name(), ?process, "configured clense");
        Ok(Self {
            kind,
            clip,
            previous,
            next,
            info,
            process,
        })
    }

    pub fn from_inputs(kind: ClenseKind, inputs: &FilterInputs) -> FilterResult<Self> {
        let reader = ParamReader::new(&inputs.params);
        reader.ensure_known(&["planes"])?;
        let planes = reader.int_list("planes")?;
        let (previous, next) = match kind {
            ClenseKind::Both => (inputs.named_clip("previous"), inputs.named_clip("next")),
            _ => (None, None),
        };
        Self::new(kind, inputs.clip.clone(), previous, next, planes.as_deref())
    }

    pub fn definitions(kind: ClenseKind) -> Vec<ParamDefinition> {
        let mut definitions = Vec::new();
        if kind == ClenseKind::Both {
            definitions.push(ParamDefinition::unset("previous", ParamType::Clip));
            definitions.push(ParamDefinition::unset("next", ParamType::Clip));
        }
        definitions.push(ParamDefinition::unset("planes", ParamType::IntList));
        definitions
    }

    /// Frames whose neighbors would fall outside the clip are returned as is.
    fn passes_through(&self, n: usize) -> bool {
        let last = self.info.num_frames.saturating_sub(1);
        match self.kind {
            ClenseKind::Both => n == 0 || n >= last,
            ClenseKind::Forward => n + 2 > last,
            ClenseKind::Backward => n < 2,
        }
    }
}

impl ClipSource for Clense {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn info(&self) -> VideoInfo {
        self.info
    }

    fn get_frame(&self, n: usize) -> FilterResult<Arc<Frame>> {
        let src = fetch_checked(self.clip.as_ref(), n, &self.info)?;
        if self.passes_through(n) || !any_selected(&self.process) {
            return Ok(src);
        }
        trace!(filter = self.kind.name(), frame = n, "processing frame");

        let out = match self.kind {
            ClenseKind::Both => {
                let prev = fetch_checked(self.previous.as_ref(), n - 1, &self.info)?;
                let next = fetch_checked(self.next.as_ref(), n + 1, &self.info)?;
                dispatch_planes(&src, &self.process, |index, plane| {
                    Ok(clense_plane(prev.plane(index), plane, next.plane(index)))
                })?
            }
            ClenseKind::Forward | ClenseKind::Backward => {
                let (near, far) = match self.kind {
                    ClenseKind::Forward => (n + 1, n + 2),
                    _ => (n - 1, n - 2),
                };
                let n1 = fetch_checked(self.clip.as_ref(), near, &self.info)?;
                let n2 = fetch_checked(self.clip.as_ref(), far, &self.info)?;
                dispatch_planes(&src, &self.process, |index, plane| {
                    Ok(directional_clense_plane(plane, n1.plane(index), n2.plane(index)))
                })?
            }
        };
        Ok(Arc::new(out))
    }
}

impl Filter for Clense {
    fn filter_type(&self) -> &str {
        self.kind.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FilterError;
    use crate::test_support::{clip, flat_gray8, gray8};

    fn column_clip(values: &[u8]) -> Arc<dyn ClipSource> {
        clip(values.iter().map(|v| flat_gray8(2, 2, *v)).collect())
    }

    fn outputs(filter: &Clense) -> Vec<f32> {
        (0..filter.info().num_frames)
            .map(|n| filter.get_frame(n).unwrap().plane(0).read(0, 0))
            .collect()
    }

    #[test]
    fn test_clense_median_of_three_frames() {
        let input = column_clip(&[10, 200, 20, 30]);
        let filter = Clense::new(ClenseKind::Both, input, None, None, None).unwrap();
        assert_eq!(outputs(&filter), vec![10.0, 20.0, 30.0, 30.0]);
    }

    #[test]
    fn test_clense_with_separate_neighbor_clips() {
        let previous = column_clip(&[0, 0, 0]);
        let next = column_clip(&[90, 90, 90]);
        let filter = Clense::new(
            ClenseKind::Both,
            column_clip(&[50, 100, 50]),
            Some(previous),
            Some(next),
            None,
        )
        .unwrap();
        assert_eq!(outputs(&filter), vec![50.0, 90.0, 50.0]);
    }

    #[test]
    fn test_forward_clense_follows_trend() {
        // Frame 0: n1 = 20, n2 = 30, e = 10 -> clamp(100, 10, 20) = 20.
        let filter = Clense::new(
            ClenseKind::Forward,
            column_clip(&[100, 20, 30, 40]),
            None,
            None,
            None,
        )
        .unwrap();
        assert_eq!(outputs(&filter), vec![20.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_backward_clense_mirrors_forward() {
        let filter = Clense::new(
            ClenseKind::Backward,
            column_clip(&[40, 30, 20, 100]),
            None,
            None,
            None,
        )
        .unwrap();
        assert_eq!(outputs(&filter), vec![40.0, 30.0, 20.0, 20.0]);
    }

    #[test]
    fn test_trend_is_clamped_to_range() {
        // e = 2 * 250 - 0 = 500 -> 255, so the window is [250, 255].
        let filter = Clense::new(ClenseKind::Forward, column_clip(&[255, 250, 0]), None, None, None)
            .unwrap();
        assert_eq!(filter.get_frame(0).unwrap().plane(0).read(0, 0), 255.0);
    }

    #[test]
    fn test_unselected_planes_and_layout_checks() {
        let filter = Clense::new(
            ClenseKind::Both,
            column_clip(&[10, 200, 20]),
            None,
            None,
            Some(&[]),
        )
        .unwrap();
        assert_eq!(filter.get_frame(1).unwrap().plane(0).read(0, 0), 200.0);

        let odd = clip(vec![gray8(3, 1, &[0, 0, 0])]);
        let result = Clense::new(ClenseKind::Both, column_clip(&[1, 2, 3]), Some(odd), None, None);
        assert!(matches!(result, Err(FilterError::FormatMismatch(_))));
    }
}
