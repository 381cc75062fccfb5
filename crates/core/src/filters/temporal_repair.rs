//! `TemporalRepair`: keep a processed clip within the temporal motion seen
//! in a reference clip.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::dispatch::{any_selected, dispatch_planes};
use crate::error::{FilterError, FilterResult};
use crate::filter::{Filter, FilterInputs, ParamDefinition, ParamType};
use crate::params::{check_range, resolve_planes, ParamReader};
use crate::sample::{render_plane, Plane, SampleGrid};
use crate::source::{ensure_same_layout, fetch_checked, ClipSource};
use crate::types::{Frame, VideoInfo};
use crate::window::{clamp, PixelRange};

/// Largest value of `f(p, q, o)` over the 3x3 window at `(x, y)`.
#[inline]
fn window_max(
    grids: [&SampleGrid; 3],
    x: usize,
    y: usize,
    f: impl Fn(f32, f32, f32) -> f32,
) -> f32 {
    let [p, q, o] = grids;
    let (x, y) = (x as isize, y as isize);
    let mut best = f32::NEG_INFINITY;
    for dy in -1..=1 {
        for dx in -1..=1 {
            let (sx, sy) = (x + dx, y + dy);
            best = best.max(f(
                p.at_mirrored(sx, sy),
                q.at_mirrored(sx, sy),
                o.at_mirrored(sx, sy),
            ));
        }
    }
    best
}

/// `c` clip plane; `p`, `o`, `q` repair planes at n-1, n, n+1.
pub fn temporal_repair_plane(c: &Plane, p: &Plane, o: &Plane, q: &Plane, mode: usize) -> Plane {
    let range = PixelRange::of(c.format());
    let (pg, og, qg) = (p.grid(), o.grid(), q.grid());
    let grids = [&pg, &qg, &og];
    render_plane(c.format(), c.width(), c.height(), |x, y| {
        let cv = c.read(x, y);
        let oc = og.at(x, y);
        let (pc, qc) = (pg.at(x, y), qg.at(x, y));
        let (down, up) = match mode {
            0 => {
                let lo = pc.min(qc).min(oc);
                let hi = pc.max(qc).max(oc);
                return clamp(cv, lo, hi);
            }
            1 => (
                window_max(grids, x, y, |p, q, o| (o - p).max(o - q).max(0.0)),
                window_max(grids, x, y, |p, q, o| (p - o).max(q - o).max(0.0)),
            ),
            2 => {
                let d = window_max(grids, x, y, |p, q, o| (p - o).abs().max((q - o).abs()));
                (d, d)
            }
            3 => (
                window_max(grids, x, y, |p, q, o| (o - p).min(o - q).max(0.0)),
                window_max(grids, x, y, |p, q, o| (p - o).min(q - o).max(0.0)),
            ),
            _ => ((oc - pc).min(oc - qc).max(0.0), (pc - oc).min(qc - oc).max(0.0)),
        };
        clamp(cv, range.clamp(oc - down), range.clamp(oc + up))
    })
}

pub struct TemporalRepair {
    clip: Arc<dyn ClipSource>,
    repair_clip: Arc<dyn ClipSource>,
    info: VideoInfo,
    mode: usize,
    process: Vec<bool>,
}

impl TemporalRepair {
    pub fn new(
        clip: Arc<dyn ClipSource>,
        repair_clip: Arc<dyn ClipSource>,
        mode: i64,
        planes: Option<&[i64]>,
    ) -> FilterResult<Self> {
        let mode = check_range("mode", mode, 0, 4)? as usize;
        ensure_same_layout(clip.as_ref(), repair_clip.as_ref(), "repairclip")?;
        let info = clip.info();
        if repair_clip.info().num_frames < info.num_frames {
            return Err(FilterError::FormatMismatch(format!(
                "repairclip `{}` has {} frames, clip `{}` has {}",
                repair_clip.name(),
                repair_clip.info().num_frames,
                clip.name(),
                info.num_frames
            )));
        }
        let process = resolve_planes(planes, info.format.num_planes())?;
        debug!(mode, ?process, "configured TemporalRepair");
        Ok(Self {
            clip,
            repair_clip,
            info,
            mode,
            process,
        })
    }

    pub fn from_inputs(inputs: &FilterInputs) -> FilterResult<Self> {
        let reader = ParamReader::new(&inputs.params);
        reader.ensure_known(&["mode", "planes"])?;
        let repair_clip = inputs
            .named_clip("repairclip")
            .ok_or_else(|| FilterError::invalid("repairclip", "clip is required"))?;
        let mode = reader.int("mode")?.unwrap_or(0);
        let planes = reader.int_list("planes")?;
        Self::new(inputs.clip.clone(), repair_clip, mode, planes.as_deref())
    }

    pub fn definitions() -> Vec<ParamDefinition> {
        vec![
            ParamDefinition::required("repairclip", ParamType::Clip),
            ParamDefinition::optional("mode", ParamType::Int, serde_json::json!(0)),
            ParamDefinition::unset("planes", ParamType::IntList),
        ]
    }
}

impl ClipSource for TemporalRepair {
    fn name(&self) -> &str {
        "TemporalRepair"
    }

    fn info(&self) -> VideoInfo {
        self.info
    }

    fn get_frame(&self, n: usize) -> FilterResult<Arc<Frame>> {
        let src = fetch_checked(self.clip.as_ref(), n, &self.info)?;
        if n == 0 || n + 1 >= self.info.num_frames || !any_selected(&self.process) {
            return Ok(src);
        }
        trace!(frame = n, mode = self.mode, "TemporalRepair");

        let repair = self.repair_clip.as_ref();
        let prev = fetch_checked(repair, n - 1, &self.info)?;
        let cur = fetch_checked(repair, n, &self.info)?;
        let next = fetch_checked(repair, n + 1, &self.info)?;
        let out = dispatch_planes(&src, &self.process, |index, plane| {
            Ok(temporal_repair_plane(
                plane,
                prev.plane(index),
                cur.plane(index),
                next.plane(index),
                self.mode,
            ))
        })?;
        Ok(Arc::new(out))
    }
}

impl Filter for TemporalRepair {
    fn filter_type(&self) -> &str {
        "TemporalRepair"
    }
}
