//! Scene-cut capability: where the temporal filters stop their windows.
//!
//! Cuts come either from frame properties (written by the host or by the
//! [`SceneDetect`] filter) or from [`SceneDetector`], which compares
//! downscaled first planes of adjacent frames.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::FilterResult;
use crate::filter::{Filter, FilterInputs, ParamDefinition, ParamType};
use crate::params::{check_range, ParamReader};
use crate::sample::Plane;
use crate::source::{fetch_checked, fetch_range, ClipSource};
use crate::types::{Frame, SceneCuts, VideoInfo};

const DOWNSCALE_WIDTH: usize = 160;
const DOWNSCALE_HEIGHT: usize = 90;

/// Default detector threshold, in percent of the full sample range.
pub const DEFAULT_SCENE_THRESHOLD: f64 = 12.0;

pub trait SceneCutProvider: Send + Sync {
    /// Cut flags for frame `n`, fetching whatever the provider needs.
    fn scene_cuts(&self, n: usize) -> FilterResult<SceneCuts>;

    /// True when a cut separates two adjacent frames the caller already
    /// fetched from the clip this provider inspects.
    fn cut_between(&self, before: &Frame, after: &Frame) -> bool;
}

/// Never reports a cut.
pub struct NoSceneCuts;

impl SceneCutProvider for NoSceneCuts {
    fn scene_cuts(&self, _n: usize) -> FilterResult<SceneCuts> {
        Ok(SceneCuts::default())
    }

    fn cut_between(&self, _before: &Frame, _after: &Frame) -> bool {
        false
    }
}

/// Reads the cut flags carried on the clip's frames.
pub struct FramePropsCuts {
    clip: Arc<dyn ClipSource>,
}

impl FramePropsCuts {
    pub fn new(clip: Arc<dyn ClipSource>) -> Self {
        Self { clip }
    }
}

impl SceneCutProvider for FramePropsCuts {
    fn scene_cuts(&self, n: usize) -> FilterResult<SceneCuts> {
        Ok(self.clip.get_frame(n)?.props.scene_cuts())
    }

    fn cut_between(&self, before: &Frame, after: &Frame) -> bool {
        before.props.scene_change_next || after.props.scene_change_prev
    }
}

/// Flags a cut between two frames when the mean absolute difference of
/// their downscaled first planes exceeds `threshold` (a fraction of the
/// sample peak).
pub struct SceneDetector {
    clip: Arc<dyn ClipSource>,
    info: VideoInfo,
    threshold: f64,
}

impl SceneDetector {
    /// `percent` is in `[0, 100]`.
    pub fn new(clip: Arc<dyn ClipSource>, percent: f64) -> FilterResult<Self> {
        check_range("scthresh", percent, 0.0, 100.0)?;
        let info = clip.info();
        Ok(Self {
            clip,
            info,
            threshold: percent / 100.0,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Normalized difference between frames `a` and `b`, in `[0, 1]` for
    /// in-range integer content.
    pub fn difference(&self, a: usize, b: usize) -> FilterResult<f64> {
        let fa = fetch_checked(self.clip.as_ref(), a, &self.info)?;
        let fb = fetch_checked(self.clip.as_ref(), b, &self.info)?;
        Ok(frame_difference(&fa, &fb))
    }

    /// True when a cut lies between `n - 1` and `n`.
    pub fn is_cut_before(&self, n: usize) -> FilterResult<bool> {
        if n == 0 || n >= self.info.num_frames {
            return Ok(false);
        }
        Ok(self.difference(n - 1, n)? > self.threshold)
    }
}

impl SceneCutProvider for SceneDetector {
    fn scene_cuts(&self, n: usize) -> FilterResult<SceneCuts> {
        let last = self.info.num_frames.saturating_sub(1);
        if n > last {
            return Ok(SceneCuts::default());
        }
        let (lo, hi) = (n.saturating_sub(1), (n + 1).min(last));
        let frames = fetch_range(self.clip.as_ref(), lo, hi, &self.info)?;
        let current = n - lo;
        Ok(SceneCuts {
            prev: current > 0 && self.cut_between(&frames[current - 1], &frames[current]),
            next: current + 1 < frames.len()
                && self.cut_between(&frames[current], &frames[current + 1]),
        })
    }

    fn cut_between(&self, before: &Frame, after: &Frame) -> bool {
        frame_difference(before, after) > self.threshold
    }
}

/// Mean absolute difference of the downscaled first planes, divided by the
/// format peak.
pub fn frame_difference(a: &Frame, b: &Frame) -> f64 {
    let (da, db) = (downscale(a.plane(0)), downscale(b.plane(0)));
    if da.is_empty() {
        return 0.0;
    }
    let total: f64 = da.iter().zip(&db).map(|(x, y)| (x - y).abs()).sum();
    total / da.len() as f64 / a.format.sample.peak() as f64
}

/// Area-average downscale to at most 160x90.
fn downscale(plane: &Plane) -> Vec<f64> {
    let (src_w, src_h) = (plane.width(), plane.height());
    let dst_w = DOWNSCALE_WIDTH.min(src_w);
    let dst_h = DOWNSCALE_HEIGHT.min(src_h);
    let mut out = Vec::with_capacity(dst_w * dst_h);

    for dst_y in 0..dst_h {
        let src_y0 = dst_y * src_h / dst_h;
        let src_y1 = ((dst_y + 1) * src_h / dst_h).min(src_h);
        for dst_x in 0..dst_w {
            let src_x0 = dst_x * src_w / dst_w;
            let src_x1 = ((dst_x + 1) * src_w / dst_w).min(src_w);

            let mut sum = 0.0f64;
            let mut count = 0usize;
            for sy in src_y0..src_y1 {
                for sx in src_x0..src_x1 {
                    sum += plane.read(sx, sy) as f64;
                    count += 1;
                }
            }
            if count > 0 {
                out.push(sum / count as f64);
            }
        }
    }
    out
}

/// Frames `[lo, hi]` within `radius` of `n`, clipped to the clip edges.
pub fn window_span(n: usize, radius: usize, num_frames: usize) -> (usize, usize) {
    (
        n.saturating_sub(radius),
        (n + radius).min(num_frames.saturating_sub(1)),
    )
}

/// Frames `[start, end]` around `n` that stay on `n`'s side of every cut.
///
/// `frames` holds frames `first..first + frames.len()` of the inspected clip,
/// typically the whole [`window_span`]; no further frames are fetched.
pub fn gated_window(
    n: usize,
    first: usize,
    frames: &[Arc<Frame>],
    cuts: &dyn SceneCutProvider,
) -> (usize, usize) {
    let last = first + frames.len().saturating_sub(1);

    let mut start = n;
    while start > first && !cuts.cut_between(&frames[start - 1 - first], &frames[start - first]) {
        start -= 1;
    }
    let mut end = n;
    while end < last && !cuts.cut_between(&frames[end - first], &frames[end + 1 - first]) {
        end += 1;
    }
    (start, end)
}

/// Scene-cut source a temporal filter was configured with.
pub fn cut_provider(
    clip: &Arc<dyn ClipSource>,
    honor_props: bool,
    detector_percent: Option<f64>,
) -> FilterResult<Arc<dyn SceneCutProvider>> {
    Ok(match detector_percent {
        Some(percent) => Arc::new(SceneDetector::new(clip.clone(), percent)?),
        None if honor_props => Arc::new(FramePropsCuts::new(clip.clone())),
        None => Arc::new(NoSceneCuts),
    })
}

/// Writes detector results onto each frame's scene-cut properties.
pub struct SceneDetect {
    clip: Arc<dyn ClipSource>,
    detector: SceneDetector,
}

impl SceneDetect {
    pub fn new(clip: Arc<dyn ClipSource>, threshold: f64) -> FilterResult<Self> {
        let detector = SceneDetector::new(clip.clone(), threshold)?;
        debug!(threshold = detector.threshold(), "configured SceneDetect");
        Ok(Self { clip, detector })
    }

    pub fn from_inputs(inputs: &FilterInputs) -> FilterResult<Self> {
        let reader = ParamReader::new(&inputs.params);
        reader.ensure_known(&["threshold"])?;
        let threshold = reader
            .float("threshold")?
            .unwrap_or(DEFAULT_SCENE_THRESHOLD);
        Self::new(inputs.clip.clone(), threshold)
    }

    pub fn definitions() -> Vec<ParamDefinition> {
        vec![ParamDefinition::optional(
            "threshold",
            ParamType::Float,
            serde_json::json!(DEFAULT_SCENE_THRESHOLD),
        )]
    }
}

impl ClipSource for SceneDetect {
    fn name(&self) -> &str {
        "SceneDetect"
    }

    fn info(&self) -> VideoInfo {
        self.clip.info()
    }

    fn get_frame(&self, n: usize) -> FilterResult<Arc<Frame>> {
        let src = self.clip.get_frame(n)?;
        let cuts = self.detector.scene_cuts(n)?;
        if cuts.prev || cuts.next {
            trace!(frame = n, prev = cuts.prev, next = cuts.next, "scene cut");
        }
        let mut frame = (*src).clone();
        frame.props.scene_change_prev = cuts.prev;
        frame.props.scene_change_next = cuts.next;
        Ok(Arc::new(frame))
    }
}

impl Filter for SceneDetect {
    fn filter_type(&self) -> &str {
        "SceneDetect"
    }
}
