//! Format descriptors and device capability model
//!
//! [`MediaType`] is the concrete format a connection point reports or accepts.
//! [`FormatDescriptor`] is the negotiable unit exposed through tracks, and
//! [`CapabilityDescriptor`] carries the bounds a device declares for one
//! candidate format.

use crate::tables;
use crate::time::{frame_rate_to_interval, interval_to_frame_rate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Major media type of a format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MajorType {
    /// Video frames
    Video,
    /// Audio buffers
    Audio,
    /// Closed captions or other text streams
    Text,
}

/// Concrete encoding or sample layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subtype {
    /// Motion JPEG
    Mjpg,
    /// Packed 4:2:2, Y0 U Y1 V
    Yuy2,
    /// Planar 4:2:0 with interleaved chroma
    Nv12,
    /// Packed 4:2:2, alias of YUY2 on some devices
    Yuyv,
    /// Packed 4:2:2, U Y0 V Y1
    Uyvy,
    /// H.264 elementary stream
    H264,
    /// 32-bit packed with alpha
    Argb32,
    /// 32-bit packed without alpha
    Rgb32,
    /// Integer PCM audio
    Pcm,
    /// Floating point PCM audio
    IeeeFloat,
    /// Any other four-character code
    Other([u8; 4]),
}

impl Subtype {
    /// Whether frames of this subtype must go through an external decoder
    pub fn is_compressed(&self) -> bool {
        matches!(self, Subtype::Mjpg | Subtype::H264)
    }

    /// Bits per pixel of the uncompressed layouts
    pub fn bits_per_pixel(&self) -> Option<u16> {
        match self {
            Subtype::Argb32 | Subtype::Rgb32 => Some(32),
            Subtype::Yuy2 | Subtype::Yuyv | Subtype::Uyvy => Some(16),
            Subtype::Nv12 => Some(12),
            _ => None,
        }
    }

    /// Human-readable name from the process-wide name table
    pub fn name(&self) -> &'static str {
        tables::subtype_name(*self).unwrap_or(tables::UNSUPPORTED_FORMAT_NAME)
    }
}

impl fmt::Display for Subtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subtype::Other(code) => write!(f, "{}", String::from_utf8_lossy(code)),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Major/minor identifier pair of a format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatIdentifier {
    /// Major type
    pub major: MajorType,
    /// Subtype (codec or sample layout)
    pub subtype: Subtype,
}

impl FormatIdentifier {
    /// Create a new identifier
    pub const fn new(major: MajorType, subtype: Subtype) -> Self {
        Self { major, subtype }
    }

    /// Video identifier for `subtype`
    pub const fn video(subtype: Subtype) -> Self {
        Self::new(MajorType::Video, subtype)
    }

    /// Audio identifier for `subtype`
    pub const fn audio(subtype: Subtype) -> Self {
        Self::new(MajorType::Audio, subtype)
    }
}

/// Video resolution information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoResolution {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl VideoResolution {
    /// Create a new resolution
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// 1280x720
    pub const HD: Self = Self::new(1280, 720);
    /// 1920x1080
    pub const FULL_HD: Self = Self::new(1920, 1080);
    /// 640x480
    pub const VGA: Self = Self::new(640, 480);

    /// Whether either side is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Aspect ratio reduced by the greatest common divisor, e.g. (16, 9)
    pub fn aspect_ratio(&self) -> (u32, u32) {
        let divisor = gcd(self.width, self.height);
        if divisor == 0 {
            return (0, 0);
        }
        (self.width / divisor, self.height / divisor)
    }
}

impl fmt::Display for VideoResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// Inclusive frame-rate range supported by one format
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameRateRange {
    /// Lowest supported rate
    pub min: f32,
    /// Highest supported rate
    pub max: f32,
}

impl FrameRateRange {
    /// Create a range, swapping the bounds if given in reverse
    pub fn new(min: f32, max: f32) -> Self {
        if max < min {
            Self { min: max, max: min }
        } else {
            Self { min, max }
        }
    }

    /// Degenerate range holding a single rate
    pub fn single(rate: f32) -> Self {
        Self {
            min: rate,
            max: rate,
        }
    }

    /// Whether `rate` lies within the range
    pub fn contains(&self, rate: f32) -> bool {
        rate >= self.min && rate <= self.max
    }

    /// Clamp `rate` into the range
    pub fn clamp(&self, rate: f32) -> f32 {
        rate.clamp(self.min, self.max)
    }

    /// Upper bound of the range
    pub fn upper(&self) -> f32 {
        self.max
    }
}

/// Video-specific parameters of a negotiable format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFormat {
    /// Bits per second reported by the device
    pub bit_rate: u32,
    /// Current frame rate
    pub frame_rate: f32,
    /// Frame rates the device supports for this configuration
    pub frame_rates: FrameRateRange,
    /// Output dimensions
    pub resolution: VideoResolution,
}

/// Audio-specific parameters of a negotiable format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Bits per sample
    pub bits_per_sample: u16,
    /// Channel count
    pub channels: u16,
    /// Samples per second
    pub sample_rate: u32,
}

/// Media-specific half of a [`FormatDescriptor`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FormatParams {
    /// Video parameters
    Video(VideoFormat),
    /// Audio parameters
    Audio(AudioFormat),
}

/// A negotiable format as exposed on a track
///
/// Descriptors are replaced, not mutated, when a format changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    /// Major/minor identifier
    pub identifier: FormatIdentifier,
    /// Display name of the subtype
    pub type_name: String,
    /// Media-specific parameters
    pub params: FormatParams,
}

impl FormatDescriptor {
    /// Build a video descriptor
    pub fn video(subtype: Subtype, format: VideoFormat) -> Self {
        Self {
            identifier: FormatIdentifier::video(subtype),
            type_name: subtype.name().to_string(),
            params: FormatParams::Video(format),
        }
    }

    /// Build an audio descriptor
    pub fn audio(subtype: Subtype, format: AudioFormat) -> Self {
        Self {
            identifier: FormatIdentifier::audio(subtype),
            type_name: subtype.name().to_string(),
            params: FormatParams::Audio(format),
        }
    }

    /// Subtype of this format
    pub fn subtype(&self) -> Subtype {
        self.identifier.subtype
    }

    /// Video parameters, if this is a video format
    pub fn video_format(&self) -> Option<&VideoFormat> {
        match &self.params {
            FormatParams::Video(video) => Some(video),
            FormatParams::Audio(_) => None,
        }
    }

    /// Audio parameters, if this is an audio format
    pub fn audio_format(&self) -> Option<&AudioFormat> {
        match &self.params {
            FormatParams::Audio(audio) => Some(audio),
            FormatParams::Video(_) => None,
        }
    }

    /// New descriptor with the frame rate replaced; audio formats are returned unchanged
    pub fn with_frame_rate(&self, frame_rate: f32) -> Self {
        let mut next = self.clone();
        if let FormatParams::Video(video) = &mut next.params {
            video.frame_rate = frame_rate;
        }
        next
    }
}

/// Device-declared bounds for one video format candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Shortest frame interval in ticks (highest frame rate)
    pub min_frame_interval: i64,
    /// Longest frame interval in ticks (lowest frame rate)
    pub max_frame_interval: i64,
    /// Smallest output size
    pub min_output_size: VideoResolution,
    /// Largest output size
    pub max_output_size: VideoResolution,
    /// Horizontal size step
    pub output_granularity_x: u32,
    /// Vertical size step
    pub output_granularity_y: u32,
}

impl CapabilityDescriptor {
    /// Degenerate single-point bounds equal to `media_type`'s own interval and size
    pub fn single_point(media_type: &MediaType) -> Option<Self> {
        let info = media_type.video_info()?;
        let size = info.resolution();
        Some(Self {
            min_frame_interval: info.avg_time_per_frame,
            max_frame_interval: info.avg_time_per_frame,
            min_output_size: size,
            max_output_size: size,
            output_granularity_x: 0,
            output_granularity_y: 0,
        })
    }

    /// Frame-rate range implied by the interval bounds
    pub fn frame_rate_range(&self) -> FrameRateRange {
        FrameRateRange::new(
            interval_to_frame_rate(self.max_frame_interval) as f32,
            interval_to_frame_rate(self.min_frame_interval) as f32,
        )
    }
}

/// Bitmap-style video format block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Width in pixels
    pub width: i32,
    /// Height in pixels; negative for top-down layouts
    pub height: i32,
    /// Average frame interval in ticks
    pub avg_time_per_frame: i64,
    /// Bits per second
    pub bit_rate: u32,
    /// Bits per pixel
    pub bit_count: u16,
    /// Compression code of the frames
    pub compression: Subtype,
}

impl VideoInfo {
    /// Sign-normalized resolution
    pub fn resolution(&self) -> VideoResolution {
        VideoResolution::new(self.width.unsigned_abs(), self.height.unsigned_abs())
    }

    /// Frame rate implied by the frame interval
    pub fn frame_rate(&self) -> f64 {
        interval_to_frame_rate(self.avg_time_per_frame)
    }
}

/// Wave-style audio format block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveInfo {
    /// Channel count
    pub channels: u16,
    /// Samples per second
    pub samples_per_sec: u32,
    /// Average bytes per second
    pub avg_bytes_per_sec: u32,
    /// Bytes per sample frame
    pub block_align: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
}

impl WaveInfo {
    /// PCM block with derived alignment and byte rate
    pub fn pcm(samples_per_sec: u32, channels: u16, bits_per_sample: u16) -> Self {
        let block_align = channels * (bits_per_sample / 8);
        Self {
            channels,
            samples_per_sec,
            avg_bytes_per_sec: samples_per_sec * block_align as u32,
            block_align,
            bits_per_sample,
        }
    }
}

/// Format-specific block of a [`MediaType`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatBlock {
    /// Video information
    Video(VideoInfo),
    /// Wave information
    Wave(WaveInfo),
    /// No format block
    None,
}

/// Concrete format reported or accepted by a connection point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaType {
    /// Major type
    pub major: MajorType,
    /// Subtype
    pub subtype: Subtype,
    /// Format block
    pub format: FormatBlock,
}

impl MediaType {
    /// Video media type with derived bit count and bit rate
    pub fn video(subtype: Subtype, width: u32, height: u32, frame_rate: f64) -> Self {
        let avg_time_per_frame = frame_rate_to_interval(frame_rate).unwrap_or(0);
        let bit_count = subtype.bits_per_pixel().unwrap_or(24);
        let bit_rate = (width as f64 * height as f64 * bit_count as f64 * frame_rate.max(0.0))
            .min(u32::MAX as f64) as u32;
        Self {
            major: MajorType::Video,
            subtype,
            format: FormatBlock::Video(VideoInfo {
                width: width as i32,
                height: height as i32,
                avg_time_per_frame,
                bit_rate,
                bit_count,
                compression: subtype,
            }),
        }
    }

    /// PCM-style audio media type
    pub fn audio(subtype: Subtype, sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            major: MajorType::Audio,
            subtype,
            format: FormatBlock::Wave(WaveInfo::pcm(sample_rate, channels, bits_per_sample)),
        }
    }

    /// Major type without any format block, as accepted by a sample sink
    pub fn partial(major: MajorType, subtype: Subtype) -> Self {
        Self {
            major,
            subtype,
            format: FormatBlock::None,
        }
    }

    /// Identifier pair
    pub fn identifier(&self) -> FormatIdentifier {
        FormatIdentifier::new(self.major, self.subtype)
    }

    /// Video block, if any
    pub fn video_info(&self) -> Option<&VideoInfo> {
        match &self.format {
            FormatBlock::Video(info) => Some(info),
            _ => None,
        }
    }

    /// Mutable video block, if any
    pub fn video_info_mut(&mut self) -> Option<&mut VideoInfo> {
        match &mut self.format {
            FormatBlock::Video(info) => Some(info),
            _ => None,
        }
    }

    /// Wave block, if any
    pub fn wave_info(&self) -> Option<&WaveInfo> {
        match &self.format {
            FormatBlock::Wave(info) => Some(info),
            _ => None,
        }
    }

    /// Mutable wave block, if any
    pub fn wave_info_mut(&mut self) -> Option<&mut WaveInfo> {
        match &mut self.format {
            FormatBlock::Wave(info) => Some(info),
            _ => None,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.format {
            FormatBlock::Video(info) => write!(
                f,
                "{} {} @ {:.2} fps",
                self.subtype,
                info.resolution(),
                info.frame_rate()
            ),
            FormatBlock::Wave(info) => write!(
                f,
                "{} {} Hz {} ch {} bit",
                self.subtype, info.samples_per_sec, info.channels, info.bits_per_sample
            ),
            FormatBlock::None => write!(f, "{:?}/{}", self.major, self.subtype),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio_is_reduced() {
        assert_eq!(VideoResolution::HD.aspect_ratio(), (16, 9));
        assert_eq!(VideoResolution::VGA.aspect_ratio(), (4, 3));
        assert_eq!(VideoResolution::new(0, 0).aspect_ratio(), (0, 0));
    }

    #[test]
    fn test_video_media_type_interval() {
        let media_type = MediaType::video(Subtype::Yuy2, 640, 480, 30.0);
        let info = media_type.video_info().unwrap();
        assert_eq!(info.avg_time_per_frame, 333_333);
        assert_eq!(info.bit_count, 16);
        assert_eq!(info.resolution(), VideoResolution::VGA);
    }

    #[test]
    fn test_single_point_capability() {
        let media_type = MediaType::video(Subtype::Nv12, 1280, 720, 15.0);
        let caps = CapabilityDescriptor::single_point(&media_type).unwrap();
        assert_eq!(caps.min_frame_interval, caps.max_frame_interval);
        assert_eq!(caps.min_output_size, VideoResolution::HD);
        assert!((caps.frame_rate_range().max - 15.0).abs() < 0.01);

        let audio = MediaType::audio(Subtype::Pcm, 48_000, 2, 16);
        assert!(CapabilityDescriptor::single_point(&audio).is_none());
    }

    #[test]
    fn test_frame_rate_range() {
        let range = FrameRateRange::new(60.0, 15.0);
        assert_eq!(range.min, 15.0);
        assert_eq!(range.upper(), 60.0);
        assert_eq!(range.clamp(120.0), 60.0);
        assert!(range.contains(30.0));
        assert!(!range.contains(10.0));
    }

    #[test]
    fn test_descriptor_frame_rate_replacement() {
        let format = FormatDescriptor::video(
            Subtype::Mjpg,
            VideoFormat {
                bit_rate: 0,
                frame_rate: 30.0,
                frame_rates: FrameRateRange::new(15.0, 30.0),
                resolution: VideoResolution::HD,
            },
        );
        let slower = format.with_frame_rate(15.0);
        assert_eq!(slower.video_format().unwrap().frame_rate, 15.0);
        assert_eq!(format.video_format().unwrap().frame_rate, 30.0);
        assert_eq!(format.type_name, "MJPG");
    }

    #[test]
    fn test_wave_info_pcm() {
        let wave = WaveInfo::pcm(48_000, 2, 16);
        assert_eq!(wave.block_align, 4);
        assert_eq!(wave.avg_bytes_per_sec, 192_000);
    }
}
