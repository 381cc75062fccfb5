//! Raw planar video files: frames back to back, planes in order, rows
//! without padding, samples little-endian.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use half::f16;

use framesmooth_core::executor::FrameSink;
use framesmooth_core::sample::{Plane, PlaneData};
use framesmooth_core::source::InMemoryClip;
use framesmooth_core::types::{Frame, SampleFormat, VideoFormat};

/// Bytes one frame of `format` at `width x height` occupies on disk.
pub fn frame_size(format: VideoFormat, width: usize, height: usize) -> usize {
    let bytes = format.sample.bytes_per_sample();
    (0..format.num_planes())
        .map(|plane| {
            let (w, h) = format.plane_dimensions(plane, width, height);
            w * h * bytes
        })
        .sum()
}

pub fn read_raw_clip(
    path: &Path,
    format: VideoFormat,
    width: usize,
    height: usize,
) -> Result<InMemoryClip> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read raw input: {}", path.display()))?;
    let frame_bytes = frame_size(format, width, height);
    if frame_bytes == 0 {
        bail!("frame size is zero for {width}x{height} {format}");
    }
    if bytes.is_empty() || bytes.len() % frame_bytes != 0 {
        bail!(
            "{} is {} bytes, not a whole number of {width}x{height} {format} frames ({frame_bytes} bytes each)",
            path.display(),
            bytes.len()
        );
    }

    let frames = bytes
        .chunks_exact(frame_bytes)
        .enumerate()
        .map(|(index, chunk)| {
            decode_frame(chunk, format, width, height)
                .with_context(|| format!("failed to decode frame {index}"))
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(
        path = %path.display(),
        frames = frames.len(),
        format = %format,
        width,
        height,
        "loaded raw input"
    );
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    Ok(InMemoryClip::new(&name, frames)?)
}

fn decode_frame(bytes: &[u8], format: VideoFormat, width: usize, height: usize) -> Result<Frame> {
    let mut offset = 0;
    let mut planes = Vec::with_capacity(format.num_planes());
    for plane in 0..format.num_planes() {
        let (w, h) = format.plane_dimensions(plane, width, height);
        let len = w * h * format.sample.bytes_per_sample();
        let data = &bytes[offset..offset + len];
        offset += len;
        planes.push(decode_plane(data, format.sample, w, h)?);
    }
    Ok(Frame::from_planes(format, planes))
}

fn decode_plane(data: &[u8], sample: SampleFormat, width: usize, height: usize) -> Result<Plane> {
    let plane = match sample {
        SampleFormat::U8 => Plane::from_u8(width, height, data.to_vec())?,
        SampleFormat::U16 { bits } => {
            let samples = data
                .chunks_exact(2)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
                .collect();
            Plane::from_u16(bits, width, height, samples)?
        }
        SampleFormat::F16 => {
            let samples = data
                .chunks_exact(2)
                .map(|b| f16::from_bits(u16::from_le_bytes([b[0], b[1]])))
                .collect();
            Plane::from_f16(width, height, samples)?
        }
        SampleFormat::F32 => {
            let samples = data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            Plane::from_f32(width, height, samples)?
        }
    };
    Ok(plane)
}

/// Append the visible samples of `plane` to `out`, dropping row padding.
pub fn encode_plane(plane: &Plane, out: &mut Vec<u8>) {
    let (width, stride) = (plane.width(), plane.stride());
    for y in 0..plane.height() {
        let row = y * stride..y * stride + width;
        match plane.data() {
            PlaneData::U8(v) => out.extend_from_slice(&v[row]),
            PlaneData::U16(v) => v[row].iter().for_each(|s| out.extend(s.to_le_bytes())),
            PlaneData::F16(v) => v[row]
                .iter()
                .for_each(|s| out.extend(s.to_bits().to_le_bytes())),
            PlaneData::F32(v) => v[row].iter().for_each(|s| out.extend(s.to_le_bytes())),
        }
    }
}

/// Streams frames into a raw planar file.
pub struct RawFrameWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    buffer: Vec<u8>,
}

impl RawFrameWriter {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create output directory: {}", parent.display())
            })?;
        }
        let file = File::create(path)
            .with_context(|| format!("failed to create raw output: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            buffer: Vec::new(),
        })
    }
}

impl FrameSink for RawFrameWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.buffer.clear();
        for plane in &frame.planes {
            encode_plane(plane, &mut self.buffer);
        }
        self.writer
            .write_all(&self.buffer)
            .with_context(|| format!("failed to write to {}", self.path.display()))
    }

    fn finish(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("failed to flush {}", self.path.display()))
    }
}
