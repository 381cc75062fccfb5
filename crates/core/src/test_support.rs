//! Frame and clip builders shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::FilterResult;
use crate::params::ParamMap;
use crate::sample::Plane;
use crate::source::{ClipSource, InMemoryClip};
use crate::types::{Frame, SampleFormat, VideoFormat, VideoInfo};

pub fn gray8(width: usize, height: usize, data: &[u8]) -> Frame {
    let plane = Plane::from_u8(width, height, data.to_vec()).expect("plane data length");
    Frame::from_planes(VideoFormat::gray(SampleFormat::U8), vec![plane])
}

pub fn flat_gray8(width: usize, height: usize, value: u8) -> Frame {
    gray8(width, height, &vec![value; width * height])
}

pub fn gray_from_values(
    format: SampleFormat,
    width: usize,
    height: usize,
    values: &[f32],
) -> Frame {
    Frame::from_planes(
        VideoFormat::gray(format),
        vec![Plane::from_values(format, width, height, values)],
    )
}

pub fn clip(frames: Vec<Frame>) -> Arc<dyn ClipSource> {
    Arc::new(InMemoryClip::new("input", frames).expect("valid clip"))
}

pub fn named_clip(name: &str, frames: Vec<Frame>) -> Arc<dyn ClipSource> {
    Arc::new(InMemoryClip::new(name, frames).expect("valid clip"))
}

/// A clip that reports `num_frames` frames but only holds `frames`.
pub fn truncated_clip(frames: Vec<Frame>, num_frames: usize) -> Arc<dyn ClipSource> {
    let first = &frames[0];
    let info = VideoInfo {
        format: first.format,
        width: first.width(),
        height: first.height(),
        num_frames,
    };
    let frames = frames.into_iter().map(Arc::new).collect();
    Arc::new(InMemoryClip::with_info("truncated", info, frames).expect("valid clip"))
}

/// Wraps a clip and counts `get_frame` calls.
pub struct CountingClip {
    inner: Arc<dyn ClipSource>,
    calls: AtomicUsize,
}

impl CountingClip {
    pub fn new(inner: Arc<dyn ClipSource>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ClipSource for CountingClip {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn info(&self) -> VideoInfo {
        self.inner.info()
    }

    fn get_frame(&self, n: usize) -> FilterResult<Arc<Frame>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_frame(n)
    }
}

pub fn params(value: serde_json::Value) -> ParamMap {
    match value {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        other => panic!("params must be a JSON object, got {other}"),
    }
}

/// Random samples spanning the format's nominal range.
pub fn random_values(format: SampleFormat, len: usize, rng: &mut StdRng) -> Vec<f32> {
    (0..len)
        .map(|_| {
            if format.is_float() {
                rng.random_range(0.0f32..1.0)
            } else {
                rng.random_range(0..=format.peak() as u32) as f32
            }
        })
        .collect()
}

pub fn random_frame(format: SampleFormat, width: usize, height: usize, rng: &mut StdRng) -> Frame {
    let values = random_values(format, width * height, rng);
    gray_from_values(format, width, height, &values)
}

pub const ALL_FORMATS: [SampleFormat; 4] = [
    SampleFormat::U8,
    SampleFormat::U16 { bits: 10 },
    SampleFormat::F16,
    SampleFormat::F32,
];
