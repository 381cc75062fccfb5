//! `TTempSmooth`: motion-adaptive weighted temporal averaging.
//!
//! Each neighbor frame contributes with a weight that falls off with its
//! temporal distance and with how different it is from the center sample.
//! Walking away from the center stops at the first sample whose difference
//! reaches `thresh`, at a scene cut, or at the clip edge.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::dispatch::{any_selected, dispatch_planes};
use crate::error::FilterResult;
use crate::filter::{Filter, FilterInputs, ParamDefinition, ParamType};
use crate::filters::scene_detect::{
    gated_window, window_span, FramePropsCuts, SceneCutProvider, SceneDetector,
};
use crate::params::{check_all, check_range, fill_forward, resolve_planes, ParamReader};
use crate::sample::{render_plane, Plane};
use crate::source::{ensure_same_layout, fetch_checked, fetch_range, ClipSource};
use crate::types::{Frame, SampleFormat, VideoInfo};

/// Weights indexed by temporal distance (`0..=maxr`) and 8-bit reference
/// difference (`0..thresh`). Built once per distinct plane configuration
/// and shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    thresh: usize,
    binary: bool,
    cells: Vec<f32>,
    total: f32,
}

impl WeightTable {
    pub fn build(maxr: usize, thresh: usize, mdiff: usize, strength: usize) -> Self {
        let distance: Vec<f32> = (0..=maxr)
            .map(|i| {
                if i < strength {
                    1.0
                } else {
                    1.0 / (i - strength + 2) as f32
                }
            })
            .collect();

        let binary = mdiff + 1 >= thresh;
        let difference: Vec<f32> = (0..thresh)
            .map(|j| {
                if binary || j < mdiff {
                    1.0
                } else {
                    let step = 1.0 / (thresh - mdiff) as f32;
                    (1.0 - (j - mdiff + 1) as f32 * step).max(0.0)
                }
            })
            .collect();

        let cells = distance
            .iter()
            .flat_map(|dt| difference.iter().map(move |rt| dt * rt))
            .collect();
        let total = distance[0] + 2.0 * distance[1..].iter().sum::<f32>();

        Self {
            thresh,
            binary,
            cells,
            total,
        }
    }

    #[inline]
    pub fn weight(&self, distance: usize, diff: usize) -> f32 {
        self.cells[distance * self.thresh + diff]
    }

    /// Weight of the center sample.
    pub fn center(&self) -> f32 {
        self.cells[0]
    }

    /// `dt[0] + 2 * sum(dt[1..=maxr])`.
    pub fn total(&self) -> f32 {
        self.total
    }

    pub fn thresh(&self) -> usize {
        self.thresh
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }
}

#[derive(Debug, Clone)]
pub struct TTempSmoothParams {
    pub maxr: i64,
    pub thresh: Vec<i64>,
    pub mdiff: Vec<i64>,
    pub strength: i64,
    pub scthresh: f64,
    pub fp: bool,
    pub planes: Option<Vec<i64>>,
}

impl Default for TTempSmoothParams {
    fn default() -> Self {
        Self {
            maxr: 3,
            thresh: vec![4, 5, 5],
            mdiff: vec![2, 3, 3],
            strength: 2,
            scthresh: 12.0,
            fp: true,
            planes: None,
        }
    }
}

pub struct TTempSmooth {
    clip: Arc<dyn ClipSource>,
    pf_clip: Arc<dyn ClipSource>,
    info: VideoInfo,
    maxr: usize,
    fp: bool,
    tables: Vec<Arc<WeightTable>>,
    process: Vec<bool>,
    cuts: Arc<dyn SceneCutProvider>,
}

impl TTempSmooth {
    pub fn new(
        clip: Arc<dyn ClipSource>,
        pf_clip: Option<Arc<dyn ClipSource>>,
        params: &TTempSmoothParams,
    ) -> FilterResult<Self> {
        let info = clip.info();
        let plane_count = info.format.num_planes();

        let maxr = check_range("maxr", params.maxr, 1, 7)? as usize;
        let strength = check_range("strength", params.strength, 1, 8)? as usize;
        check_range("scthresh", params.scthresh, 0.0, 100.0)?;
        check_all("thresh", &params.thresh, 1, 256)?;
        check_all("mdiff", &params.mdiff, 0, 255)?;

        let pf_clip = match pf_clip {
            Some(pf) => {
                ensure_same_layout(clip.as_ref(), pf.as_ref(), "pfclip")?;
                pf
            }
            None => clip.clone(),
        };

        // Planes 1 and 2 share the second value unless a third is given.
        let thresh = fill_forward(&params.thresh, plane_count, &[4, 5, 5]);
        let mdiff = fill_forward(&params.mdiff, plane_count, &[2, 3, 3]);
        let mut tables: Vec<Arc<WeightTable>> = Vec::with_capacity(plane_count);
        for (&t, &m) in thresh.iter().zip(&mdiff) {
            let table = WeightTable::build(maxr, t as usize, m as usize, strength);
            let shared = tables.iter().find(|existing| ***existing == table).cloned();
            tables.push(shared.unwrap_or_else(|| Arc::new(table)));
        }

        let process = resolve_planes(params.planes.as_deref(), plane_count)?;
        let cuts: Arc<dyn SceneCutProvider> = if params.scthresh > 0.0 {
            Arc::new(SceneDetector::new(pf_clip.clone(), params.scthresh)?)
        } else {
            Arc::new(FramePropsCuts::new(pf_clip.clone()))
        };

        debug!(
            maxr,
            strength,
            ?thresh,
            ?mdiff,
            fp = params.fp,
            ?process,
            "configured TTempSmooth"
        );
        Ok(Self {
            clip,
            pf_clip,
            info,
            maxr,
            fp: params.fp,
            tables,
            process,
            cuts,
        })
    }

    pub fn from_inputs(inputs: &FilterInputs) -> FilterResult<Self> {
        let reader = ParamReader::new(&inputs.params);
        reader.ensure_known(&[
            "maxr", "thresh", "mdiff", "strength", "scthresh", "fp", "planes",
        ])?;
        let defaults = TTempSmoothParams::default();
        let params = TTempSmoothParams {
            maxr: reader.int("maxr")?.unwrap_or(defaults.maxr),
            thresh: reader.int_list("thresh")?.unwrap_or(defaults.thresh),
            mdiff: reader.int_list("mdiff")?.unwrap_or(defaults.mdiff),
            strength: reader.int("strength")?.unwrap_or(defaults.strength),
            scthresh: reader.float("scthresh")?.unwrap_or(defaults.scthresh),
            fp: reader.bool("fp")?.unwrap_or(defaults.fp),
            planes: reader.int_list("planes")?,
        };
        Self::new(inputs.clip.clone(), inputs.named_clip("pfclip"), &params)
    }

    pub fn definitions() -> Vec<ParamDefinition> {
        use serde_json::json;
        vec![
            ParamDefinition::optional("maxr", ParamType::Int, json!(3)),
            ParamDefinition::optional("thresh", ParamType::IntList, json!([4, 5, 5])),
            ParamDefinition::optional("mdiff", ParamType::IntList, json!([2, 3, 3])),
            ParamDefinition::optional("strength", ParamType::Int, json!(2)),
            ParamDefinition::optional("scthresh", ParamType::Float, json!(12.0)),
            ParamDefinition::optional("fp", ParamType::Bool, json!(true)),
            ParamDefinition::unset("pfclip", ParamType::Clip),
            ParamDefinition::unset("planes", ParamType::IntList),
        ]
    }

    pub fn table(&self, plane: usize) -> &Arc<WeightTable> {
        &self.tables[plane]
    }
}

/// Planes of one temporal window, ordered by frame index.
pub struct PlaneWindow<'a> {
    pub src: Vec<&'a Plane>,
    pub pf: Vec<&'a Plane>,
    /// Position of the center frame inside the window.
    pub center: usize,
}

pub fn smooth_plane(
    window: &PlaneWindow<'_>,
    table: &WeightTable,
    format: SampleFormat,
    fp: bool,
) -> Plane {
    let cur = window.src[window.center];
    let pf_cur = window.pf[window.center];
    let thresh = table.thresh();

    render_plane(cur.format(), cur.width(), cur.height(), |x, y| {
        let c = cur.read(x, y);
        let pf_c = pf_cur.read(x, y);
        let mut acc = table.center();
        let mut sum = c * acc;

        let mut visit = |t: usize| -> bool {
            let diff = format.to_reference((window.pf[t].read(x, y) - pf_c).abs()).floor();
            if diff >= thresh as f32 {
                return false;
            }
            let w = table.weight(t.abs_diff(window.center), diff as usize);
            acc += w;
            sum += w * window.src[t].read(x, y);
            true
        };
        for t in window.center + 1..window.src.len() {
            if !visit(t) {
                break;
            }
        }
        for t in (0..window.center).rev() {
            if !visit(t) {
                break;
            }
        }

        if fp {
            (sum + (table.total() - acc) * c) / table.total()
        } else {
            sum / acc
        }
    })
}

impl ClipSource for TTempSmooth {
    fn name(&self) -> &str {
        "TTempSmooth"
    }

    fn info(&self) -> VideoInfo {
        self.info
    }

    fn get_frame(&self, n: usize) -> FilterResult<Arc<Frame>> {
        if !any_selected(&self.process) {
            return fetch_checked(self.clip.as_ref(), n, &self.info);
        }
        let shared = Arc::ptr_eq(&self.clip, &self.pf_clip);
        let (lo, hi) = window_span(n, self.maxr, self.info.num_frames);
        let pf_span = fetch_range(self.pf_clip.as_ref(), lo, hi, &self.info)?;
        let (start, end) = gated_window(n, lo, &pf_span, self.cuts.as_ref());
        if start == end {
            return if shared {
                Ok(pf_span[n - lo].clone())
            } else {
                fetch_checked(self.clip.as_ref(), n, &self.info)
            };
        }
        trace!(frame = n, start, end, "TTempSmooth");

        let pf_frames = &pf_span[start - lo..=end - lo];
        let frames = if shared {
            pf_frames.to_vec()
        } else {
            fetch_range(self.clip.as_ref(), start, end, &self.info)?
        };
        let src = &frames[n - start];

        let format = self.info.format.sample;
        let out = dispatch_planes(src, &self.process, |index, _| {
            let window = PlaneWindow {
                src: frames.iter().map(|frame| frame.plane(index)).collect(),
                pf: pf_frames.iter().map(|frame| frame.plane(index)).collect(),
                center: n - start,
            };
            Ok(smooth_plane(&window, &self.tables[index], format, self.fp))
        })?;
        Ok(Arc::new(out))
    }
}

impl Filter for TTempSmooth {
    fn filter_type(&self) -> &str {
        "TTempSmooth"
    }
}
