use std::fmt;

use crate::sample::Plane;

/// Storage representation of a single plane's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    U8,
    /// 16-bit storage with an effective depth of 9..=16 bits.
    U16 {
        bits: u8,
    },
    F16,
    F32,
}

impl SampleFormat {
    pub fn bits(&self) -> u8 {
        match self {
            Self::U8 => 8,
            Self::U16 { bits } => *bits,
            Self::F16 => 16,
            Self::F32 => 32,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F16 | Self::F32)
    }

    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 { .. } | Self::F16 => 2,
            Self::F32 => 4,
        }
    }

    /// Largest nominal sample value: `2^bits - 1` for integers, 1.0 for floats.
    pub fn peak(&self) -> f32 {
        match self {
            Self::U8 => 255.0,
            Self::U16 { bits } => ((1u32 << bits) - 1) as f32,
            Self::F16 | Self::F32 => 1.0,
        }
    }

    /// Range that written samples are clamped into.
    pub fn bounds(&self) -> (f32, f32) {
        match self {
            Self::U8 | Self::U16 { .. } => (0.0, self.peak()),
            Self::F16 => (-65504.0, 65504.0),
            Self::F32 => (f32::MIN, f32::MAX),
        }
    }

    /// Native units per unit of the 8-bit reference scale.
    pub fn reference_scale(&self) -> f32 {
        match self {
            Self::U8 => 1.0,
            Self::U16 { bits } => (1u32 << (bits - 8)) as f32,
            Self::F16 | Self::F32 => 1.0 / 255.0,
        }
    }

    pub fn to_reference(&self, value: f32) -> f32 {
        value / self.reference_scale()
    }

    pub fn from_reference(&self, value: f32) -> f32 {
        value * self.reference_scale()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorFamily {
    Gray,
    Yuv,
    Rgb,
}

/// Frame layout shared by every frame of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoFormat {
    pub color_family: ColorFamily,
    pub sample: SampleFormat,
    /// log2 horizontal chroma subsampling.
    pub subsampling_w: u8,
    /// log2 vertical chroma subsampling.
    pub subsampling_h: u8,
}

impl VideoFormat {
    pub fn gray(sample: SampleFormat) -> Self {
        Self {
            color_family: ColorFamily::Gray,
            sample,
            subsampling_w: 0,
            subsampling_h: 0,
        }
    }

    pub fn yuv(sample: SampleFormat, subsampling_w: u8, subsampling_h: u8) -> Self {
        Self {
            color_family: ColorFamily::Yuv,
            sample,
            subsampling_w,
            subsampling_h,
        }
    }

    pub fn rgb(sample: SampleFormat) -> Self {
        Self {
            color_family: ColorFamily::Rgb,
            sample,
            subsampling_w: 0,
            subsampling_h: 0,
        }
    }

    pub fn num_planes(&self) -> usize {
        match self.color_family {
            ColorFamily::Gray => 1,
            ColorFamily::Yuv | ColorFamily::Rgb => 3,
        }
    }

    /// Dimensions of `plane` for a frame whose first plane is `width` x `height`.
    pub fn plane_dimensions(&self, plane: usize, width: usize, height: usize) -> (usize, usize) {
        if plane == 0 || self.color_family != ColorFamily::Yuv {
            return (width, height);
        }
        let sub = |len: usize, shift: u8| (len + (1 << shift) - 1) >> shift;
        (
            sub(width, self.subsampling_w),
            sub(height, self.subsampling_h),
        )
    }

    /// Parse names such as `gray8`, `yuv420p10`, `yuv444ph`, `rgbps`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        let (family, ssw, ssh, depth) = if let Some(rest) = name.strip_prefix("gray") {
            (ColorFamily::Gray, 0, 0, rest)
        } else if let Some(rest) = name.strip_prefix("yuv420p") {
            (ColorFamily::Yuv, 1, 1, rest)
        } else if let Some(rest) = name.strip_prefix("yuv422p") {
            (ColorFamily::Yuv, 1, 0, rest)
        } else if let Some(rest) = name.strip_prefix("yuv444p") {
            (ColorFamily::Yuv, 0, 0, rest)
        } else if let Some(rest) = name.strip_prefix("rgbp") {
            (ColorFamily::Rgb, 0, 0, rest)
        } else {
            return None;
        };

        let sample = match depth {
            "8" => SampleFormat::U8,
            "h" => SampleFormat::F16,
            "s" => SampleFormat::F32,
            bits => {
                let bits: u8 = bits.parse().ok()?;
                if !(9..=16).contains(&bits) {
                    return None;
                }
                SampleFormat::U16 { bits }
            }
        };

        Some(Self {
            color_family: family,
            sample,
            subsampling_w: ssw,
            subsampling_h: ssh,
        })
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let family = match (self.color_family, self.subsampling_w, self.subsampling_h) {
            (ColorFamily::Gray, _, _) => "gray".to_string(),
            (ColorFamily::Rgb, _, _) => "rgbp".to_string(),
            (ColorFamily::Yuv, 1, 1) => "yuv420p".to_string(),
            (ColorFamily::Yuv, 1, 0) => "yuv422p".to_string(),
            (ColorFamily::Yuv, 0, 0) => "yuv444p".to_string(),
            (ColorFamily::Yuv, w, h) => format!("yuv(ss{w}x{h})p"),
        };
        let depth = match self.sample {
            SampleFormat::F16 => "h".to_string(),
            SampleFormat::F32 => "s".to_string(),
            other => other.bits().to_string(),
        };
        write!(f, "{family}{depth}")
    }
}

/// Clip-level description supplied by a `ClipSource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
    pub format: VideoFormat,
    pub width: usize,
    pub height: usize,
    pub num_frames: usize,
}

impl VideoInfo {
    /// True when frames of both clips can be combined sample-for-sample.
    pub fn same_layout(&self, other: &VideoInfo) -> bool {
        self.format == other.format && self.width == other.width && self.height == other.height
    }
}

/// Scene-cut flags for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneCuts {
    /// A cut lies between the previous frame and this one.
    pub prev: bool,
    /// A cut lies between this frame and the next one.
    pub next: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameProps {
    pub scene_change_prev: bool,
    pub scene_change_next: bool,
}

impl FrameProps {
    pub fn scene_cuts(&self) -> SceneCuts {
        SceneCuts {
            prev: self.scene_change_prev,
            next: self.scene_change_next,
        }
    }
}

/// One video frame: every plane shares the frame's `VideoFormat`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub format: VideoFormat,
    pub planes: Vec<Plane>,
    pub props: FrameProps,
}

impl Frame {
    /// Zero-filled frame.
    pub fn new(format: VideoFormat, width: usize, height: usize) -> Self {
        let planes = (0..format.num_planes())
            .map(|plane| {
                let (w, h) = format.plane_dimensions(plane, width, height);
                Plane::new(format.sample, w, h)
            })
            .collect();
        Self {
            format,
            planes,
            props: FrameProps::default(),
        }
    }

    pub fn from_planes(format: VideoFormat, planes: Vec<Plane>) -> Self {
        Self {
            format,
            planes,
            props: FrameProps::default(),
        }
    }

    pub fn width(&self) -> usize {
        self.planes.first().map_or(0, Plane::width)
    }

    pub fn height(&self) -> usize {
        self.planes.first().map_or(0, Plane::height)
    }

    pub fn plane(&self, index: usize) -> &Plane {
        &self.planes[index]
    }

    /// True when the frame has the plane count, sample format and dimensions `info` describes.
    pub fn matches(&self, info: &VideoInfo) -> bool {
        self.format == info.format
            && self.planes.len() == info.format.num_planes()
            && self.planes.iter().enumerate().all(|(index, plane)| {
                let (w, h) = info.format.plane_dimensions(index, info.width, info.height);
                plane.width() == w && plane.height() == h && plane.format() == info.format.sample
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_scale_is_exact_for_integers() {
        let ten = SampleFormat::U16 { bits: 10 };
        assert_eq!(ten.reference_scale(), 4.0);
        assert_eq!(ten.from_reference(7.0), 28.0);
        assert_eq!(ten.to_reference(1020.0), 255.0);
        assert_eq!(SampleFormat::U8.from_reference(7.0), 7.0);

        let sixteen = SampleFormat::U16 { bits: 16 };
        assert_eq!(sixteen.from_reference(255.0), 65280.0);
        assert_eq!(sixteen.peak(), 65535.0);
    }

    #[test]
    fn test_reference_scale_for_floats_maps_unit_range() {
        let f = SampleFormat::F32;
        assert!((f.to_reference(1.0) - 255.0).abs() < 1e-4);
        assert!((f.from_reference(255.0) - 1.0).abs() < 1e-6);
        // Out-of-range values are scaled, not clamped.
        assert!((f.to_reference(-0.5) + 127.5).abs() < 1e-4);
    }

    #[test]
    fn test_video_format_names() {
        let format = VideoFormat::from_name("yuv420p10").unwrap();
        assert_eq!(format.color_family, ColorFamily::Yuv);
        assert_eq!(format.sample, SampleFormat::U16 { bits: 10 });
        assert_eq!(format.plane_dimensions(1, 7, 5), (4, 3));
        assert_eq!(format.to_string(), "yuv420p10");

        assert_eq!(
            VideoFormat::from_name("grayh").unwrap().sample,
            SampleFormat::F16
        );
        assert_eq!(VideoFormat::from_name("rgbps").unwrap().num_planes(), 3);
        assert_eq!(VideoFormat::from_name("GRAY8").unwrap().to_string(), "gray8");
        assert!(VideoFormat::from_name("gray7").is_none());
        assert!(VideoFormat::from_name("yuv420p17").is_none());
        assert!(VideoFormat::from_name("nv12").is_none());
    }

    #[test]
    fn test_frame_new_allocates_subsampled_planes() {
        let format = VideoFormat::yuv(SampleFormat::U8, 1, 1);
        let frame = Frame::new(format, 8, 6);
        assert_eq!(frame.planes.len(), 3);
        assert_eq!(frame.width(), 8);
        assert_eq!(frame.plane(1).width(), 4);
        assert_eq!(frame.plane(2).height(), 3);

        let info = VideoInfo {
            format,
            width: 8,
            height: 6,
            num_frames: 1,
        };
        assert!(frame.matches(&info));
        assert!(!frame.matches(&VideoInfo { width: 10, ..info }));
    }
}
