use std::sync::Arc;

use crate::error::{FilterError, FilterResult};
use crate::types::{Frame, VideoInfo};

/// Anything that can hand out frames on demand: host clips and filters alike.
pub trait ClipSource: Send + Sync {
    fn name(&self) -> &str;
    fn info(&self) -> VideoInfo;
    fn get_frame(&self, n: usize) -> FilterResult<Arc<Frame>>;
}

/// A clip whose frames are already resident in memory.
#[derive(Debug)]
pub struct InMemoryClip {
    name: String,
    info: VideoInfo,
    frames: Vec<Arc<Frame>>,
}

impl InMemoryClip {
    /// Build a clip from frames that all share the first frame's layout.
    pub fn new(name: &str, frames: Vec<Frame>) -> FilterResult<Self> {
        let first = frames
            .first()
            .ok_or_else(|| FilterError::invalid("frames", "a clip needs at least one frame"))?;
        let info = VideoInfo {
            format: first.format,
            width: first.width(),
            height: first.height(),
            num_frames: frames.len(),
        };
        Self::with_info(name, info, frames.into_iter().map(Arc::new).collect())
    }

    /// Build a clip with an explicit description. `info.num_frames` may
    /// exceed the number of frames supplied; fetching one of the missing
    /// frames fails with `MissingNeighborFrame`.
    pub fn with_info(name: &str, info: VideoInfo, frames: Vec<Arc<Frame>>) -> FilterResult<Self> {
        if frames.len() > info.num_frames {
            return Err(FilterError::invalid(
                "frames",
                format!(
                    "{} frames supplied for a clip of {} frames",
                    frames.len(),
                    info.num_frames
                ),
            ));
        }
        if let Some(index) = frames.iter().position(|frame| !frame.matches(&info)) {
            return Err(FilterError::FormatMismatch(format!(
                "frame {index} of clip `{name}` does not match {}x{} {}",
                info.width, info.height, info.format
            )));
        }
        Ok(Self {
            name: name.to_string(),
            info,
            frames,
        })
    }

    pub fn frames(&self) -> &[Arc<Frame>] {
        &self.frames
    }
}

impl ClipSource for InMemoryClip {
    fn name(&self) -> &str {
        &self.name
    }

    fn info(&self) -> VideoInfo {
        self.info
    }

    fn get_frame(&self, n: usize) -> FilterResult<Arc<Frame>> {
        self.frames
            .get(n)
            .cloned()
            .ok_or_else(|| FilterError::MissingNeighborFrame {
                clip: self.name.clone(),
                frame: n,
            })
    }
}

/// Fetch frame `n` and verify it has the layout `info` promises.
pub fn fetch_checked(
    clip: &dyn ClipSource,
    n: usize,
    info: &VideoInfo,
) -> FilterResult<Arc<Frame>> {
    let frame = clip.get_frame(n)?;
    if !frame.matches(info) {
        return Err(FilterError::FormatMismatch(format!(
            "frame {n} of clip `{}` is not {}x{} {}",
            clip.name(),
            info.width,
            info.height,
            info.format
        )));
    }
    Ok(frame)
}

/// Fetch frames `lo..=hi`, each exactly once, in order.
pub fn fetch_range(
    clip: &dyn ClipSource,
    lo: usize,
    hi: usize,
    info: &VideoInfo,
) -> FilterResult<Vec<Arc<Frame>>> {
    (lo..=hi).map(|t| fetch_checked(clip, t, info)).collect()
}

/// Configuration-time check that a secondary clip lines up with the main clip.
pub fn ensure_same_layout(
    main: &dyn ClipSource,
    other: &dyn ClipSource,
    role: &str,
) -> FilterResult<()> {
    let (a, b) = (main.info(), other.info());
    if !a.same_layout(&b) {
        return Err(FilterError::FormatMismatch(format!(
            "{role} `{}` is {}x{} {}, clip `{}` is {}x{} {}",
            other.name(),
            b.width,
            b.height,
            b.format,
            main.name(),
            a.width,
            a.height,
            a.format
        )));
    }
    Ok(())
}
