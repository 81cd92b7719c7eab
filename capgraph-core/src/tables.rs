//! Process-wide lookup tables keyed by subtype
//!
//! The tables are built once on first use and never mutated afterwards.

use crate::format::{Subtype, VideoResolution};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Name reported for subtypes missing from the name table
pub const UNSUPPORTED_FORMAT_NAME: &str = "Possibly Unsupported Format";

static SUBTYPE_NAMES: OnceLock<HashMap<Subtype, &'static str>> = OnceLock::new();
static OUTPUT_LAYOUTS: OnceLock<HashMap<Subtype, LayoutRule>> = OnceLock::new();

/// Pixel layout of samples handed to the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelLayout {
    /// 32-bit packed BGRA
    Bgra8,
    /// Planar 4:2:0, luma plane followed by interleaved chroma
    Nv12,
    /// Packed 4:2:2, U Y0 V Y1
    Uyvy,
    /// Packed 4:2:2, Y0 U Y1 V
    Yuy2,
}

/// Sample format of integer or float PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioSampleFormat {
    /// Signed 8-bit
    Int8,
    /// Signed 16-bit
    Int16,
    /// 32-bit float
    Float,
    /// Anything else
    Undefined,
}

impl AudioSampleFormat {
    /// Map a bit depth to a sample format
    pub fn from_bits(bits_per_sample: u16) -> Self {
        match bits_per_sample {
            8 => AudioSampleFormat::Int8,
            16 => AudioSampleFormat::Int16,
            32 => AudioSampleFormat::Float,
            _ => AudioSampleFormat::Undefined,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LayoutRule {
    layout: PixelLayout,
    /// Stride in bytes per pixel of width
    stride_bytes_per_pixel: u32,
    /// Divisor applied to the reported buffer width
    width_divisor: u32,
    /// Buffer height multiplier as (numerator, denominator)
    height_scale: (u32, u32),
}

/// Buffer geometry of one sample for a given subtype and frame size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleGeometry {
    /// Output pixel layout
    pub layout: PixelLayout,
    /// Dimensions of the sample buffer, in layout units
    pub buffer_dim: VideoResolution,
    /// Dimensions of the image the buffer decodes to
    pub output_dim: VideoResolution,
    /// Row stride in bytes
    pub stride: u32,
}

fn subtype_names() -> &'static HashMap<Subtype, &'static str> {
    SUBTYPE_NAMES.get_or_init(|| {
        HashMap::from([
            (Subtype::Mjpg, "MJPG"),
            (Subtype::Yuy2, "YUY2"),
            (Subtype::Nv12, "NV12"),
            (Subtype::Yuyv, "YUYV"),
            (Subtype::Uyvy, "UYVY"),
            (Subtype::H264, "H264"),
            (Subtype::Argb32, "ARGB32"),
            (Subtype::Rgb32, "RGB32"),
            (Subtype::Pcm, "PCM"),
        ])
    })
}

fn output_layouts() -> &'static HashMap<Subtype, LayoutRule> {
    OUTPUT_LAYOUTS.get_or_init(|| {
        let bgra = LayoutRule {
            layout: PixelLayout::Bgra8,
            stride_bytes_per_pixel: 4,
            width_divisor: 1,
            height_scale: (1, 1),
        };
        let yuy2 = LayoutRule {
            layout: PixelLayout::Yuy2,
            stride_bytes_per_pixel: 2,
            width_divisor: 2,
            height_scale: (1, 1),
        };
        HashMap::from([
            (Subtype::Mjpg, bgra),
            (Subtype::H264, bgra),
            (Subtype::Argb32, bgra),
            (Subtype::Rgb32, bgra),
            (
                Subtype::Nv12,
                LayoutRule {
                    layout: PixelLayout::Nv12,
                    stride_bytes_per_pixel: 1,
                    width_divisor: 1,
                    height_scale: (3, 2),
                },
            ),
            (
                Subtype::Uyvy,
                LayoutRule {
                    layout: PixelLayout::Uyvy,
                    stride_bytes_per_pixel: 2,
                    width_divisor: 2,
                    height_scale: (1, 1),
                },
            ),
            (Subtype::Yuy2, yuy2),
            (Subtype::Yuyv, yuy2),
        ])
    })
}

/// Display name of `subtype`, if it is a known format
pub fn subtype_name(subtype: Subtype) -> Option<&'static str> {
    subtype_names().get(&subtype).copied()
}

/// Output pixel layout for frames of `subtype`
pub fn output_layout(subtype: Subtype) -> Option<PixelLayout> {
    output_layouts().get(&subtype).map(|rule| rule.layout)
}

/// Geometry of a sample of `subtype` captured at `size`
///
/// Returns `None` for subtypes with no layout entry; such samples are dropped.
pub fn sample_geometry(subtype: Subtype, size: VideoResolution) -> Option<SampleGeometry> {
    let rule = output_layouts().get(&subtype)?;
    let (num, den) = rule.height_scale;
    Some(SampleGeometry {
        layout: rule.layout,
        buffer_dim: VideoResolution::new(
            size.width / rule.width_divisor,
            size.height * num / den,
        ),
        output_dim: size,
        stride: size.width * rule.stride_bytes_per_pixel,
    })
}
