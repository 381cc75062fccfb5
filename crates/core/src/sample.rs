//! Sample model: typed plane storage with a single f32 working representation.
//!
//! Every filter reads samples as f32 in the plane's native scale and writes
//! f32 results back through [`Sample::quantize`], so integer rounding and
//! clamping happen exactly once, on write.

use half::f16;
use rayon::prelude::*;

use crate::boundary::mirror;
use crate::error::{FilterError, FilterResult};
use crate::types::SampleFormat;

pub trait Sample: Copy + Send + Sync + 'static {
    fn to_f32(self) -> f32;

    /// Convert a native-scale value into storage, rounding half up and
    /// clamping into the format's bounds.
    fn quantize(value: f32, format: SampleFormat) -> Self;
}

#[inline]
fn round_clamp(value: f32, format: SampleFormat) -> f32 {
    let (lo, hi) = format.bounds();
    (value + 0.5).floor().clamp(lo, hi)
}

impl Sample for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn quantize(value: f32, format: SampleFormat) -> Self {
        round_clamp(value, format) as u8
    }
}

impl Sample for u16 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn quantize(value: f32, format: SampleFormat) -> Self {
        round_clamp(value, format) as u16
    }
}

impl Sample for f16 {
    #[inline]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }

    #[inline]
    fn quantize(value: f32, format: SampleFormat) -> Self {
        let (lo, hi) = format.bounds();
        f16::from_f32(value.clamp(lo, hi))
    }
}

impl Sample for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn quantize(value: f32, format: SampleFormat) -> Self {
        let (lo, hi) = format.bounds();
        value.clamp(lo, hi)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaneData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F16(Vec<f16>),
    F32(Vec<f32>),
}

/// One channel of one frame. Rows are `stride` samples apart.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    width: usize,
    height: usize,
    stride: usize,
    format: SampleFormat,
    data: PlaneData,
}

impl Plane {
    /// Zero-filled plane with `stride == width`.
    pub fn new(format: SampleFormat, width: usize, height: usize) -> Self {
        Self::zeroed(format, width, height, width)
    }

    pub fn with_stride(
        format: SampleFormat,
        width: usize,
        height: usize,
        stride: usize,
    ) -> FilterResult<Self> {
        if stride < width {
            return Err(FilterError::invalid(
                "stride",
                format!("stride {stride} is smaller than width {width}"),
            ));
        }
        Ok(Self::zeroed(format, width, height, stride))
    }

    fn zeroed(format: SampleFormat, width: usize, height: usize, stride: usize) -> Self {
        let len = stride * height;
        let data = match format {
            SampleFormat::U8 => PlaneData::U8(vec![0; len]),
            SampleFormat::U16 { .. } => PlaneData::U16(vec![0; len]),
            SampleFormat::F16 => PlaneData::F16(vec![f16::ZERO; len]),
            SampleFormat::F32 => PlaneData::F32(vec![0.0; len]),
        };
        Self {
            width,
            height,
            stride,
            format,
            data,
        }
    }

    pub fn from_u8(width: usize, height: usize, data: Vec<u8>) -> FilterResult<Self> {
        Self::from_data(SampleFormat::U8, width, height, PlaneData::U8(data))
    }

    pub fn from_u16(bits: u8, width: usize, height: usize, data: Vec<u16>) -> FilterResult<Self> {
        if !(9..=16).contains(&bits) {
            return Err(FilterError::invalid(
                "bits",
                format!("16-bit storage needs a depth in [9, 16], got {bits}"),
            ));
        }
        Self::from_data(SampleFormat::U16 { bits }, width, height, PlaneData::U16(data))
    }

    pub fn from_f16(width: usize, height: usize, data: Vec<f16>) -> FilterResult<Self> {
        Self::from_data(SampleFormat::F16, width, height, PlaneData::F16(data))
    }

    pub fn from_f32(width: usize, height: usize, data: Vec<f32>) -> FilterResult<Self> {
        Self::from_data(SampleFormat::F32, width, height, PlaneData::F32(data))
    }

    fn from_data(
        format: SampleFormat,
        width: usize,
        height: usize,
        data: PlaneData,
    ) -> FilterResult<Self> {
        let len = match &data {
            PlaneData::U8(v) => v.len(),
            PlaneData::U16(v) => v.len(),
            PlaneData::F16(v) => v.len(),
            PlaneData::F32(v) => v.len(),
        };
        if len != width * height {
            return Err(FilterError::FormatMismatch(format!(
                "plane data length mismatch: expected {}, got {len}",
                width * height
            )));
        }
        Ok(Self {
            width,
            height,
            stride: width,
            format,
            data,
        })
    }

    /// Quantize a dense `width * height` buffer of native-scale values.
    pub fn from_values(format: SampleFormat, width: usize, height: usize, values: &[f32]) -> Self {
        debug_assert_eq!(values.len(), width * height);
        let data = match format {
            SampleFormat::U8 => PlaneData::U8(quantize_all(values, format)),
            SampleFormat::U16 { .. } => PlaneData::U16(quantize_all(values, format)),
            SampleFormat::F16 => PlaneData::F16(quantize_all(values, format)),
            SampleFormat::F32 => PlaneData::F32(quantize_all(values, format)),
        };
        Self {
            width,
            height,
            stride: width,
            format,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn data(&self) -> &PlaneData {
        &self.data
    }

    #[inline]
    pub fn read(&self, x: usize, y: usize) -> f32 {
        let index = y * self.stride + x;
        match &self.data {
            PlaneData::U8(v) => v[index].to_f32(),
            PlaneData::U16(v) => v[index].to_f32(),
            PlaneData::F16(v) => Sample::to_f32(v[index]),
            PlaneData::F32(v) => v[index],
        }
    }

    #[inline]
    pub fn write(&mut self, x: usize, y: usize, value: f32) {
        let index = y * self.stride + x;
        let format = self.format;
        match &mut self.data {
            PlaneData::U8(v) => v[index] = u8::quantize(value, format),
            PlaneData::U16(v) => v[index] = u16::quantize(value, format),
            PlaneData::F16(v) => v[index] = f16::quantize(value, format),
            PlaneData::F32(v) => v[index] = f32::quantize(value, format),
        }
    }

    /// Dense f32 copy of the visible samples.
    pub fn grid(&self) -> SampleGrid {
        let mut values = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            values.extend((0..self.width).map(|x| self.read(x, y)));
        }
        SampleGrid {
            width: self.width,
            height: self.height,
            values,
        }
    }

    /// True when the visible samples of both planes are bit-identical.
    pub fn same_samples(&self, other: &Plane) -> bool {
        if self.width != other.width || self.height != other.height || self.format != other.format
        {
            return false;
        }
        (0..self.height).all(|y| {
            (0..self.width).all(|x| self.read(x, y).to_bits() == other.read(x, y).to_bits())
        })
    }
}

fn quantize_all<T: Sample>(values: &[f32], format: SampleFormat) -> Vec<T> {
    values.iter().map(|v| T::quantize(*v, format)).collect()
}

/// Read-only f32 view of a plane used as a filter window source.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleGrid {
    width: usize,
    height: usize,
    values: Vec<f32>,
}

impl SampleGrid {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.values[y * self.width + x]
    }

    /// Sample at a possibly out-of-range coordinate, reflected into the plane.
    #[inline]
    pub fn at_mirrored(&self, x: isize, y: isize) -> f32 {
        self.at(mirror(x, self.width), mirror(y, self.height))
    }
}

/// Evaluate `kernel(x, y)` for every sample, rows in parallel, and quantize.
pub fn render_plane<F>(format: SampleFormat, width: usize, height: usize, kernel: F) -> Plane
where
    F: Fn(usize, usize) -> f32 + Sync,
{
    let mut values = vec![0.0f32; width * height];
    if width > 0 {
        values
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, out) in row.iter_mut().enumerate() {
                    *out = kernel(x, y);
                }
            });
    }
    Plane::from_values(format, width, height, &values)
}
