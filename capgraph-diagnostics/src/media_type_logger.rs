//! Human-readable reports of negotiated media types

use capgraph_core::format::{CapabilityDescriptor, FormatBlock, MajorType, MediaType};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Flattened view of a media type for logs and stats output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaTypeReport {
    /// Major type
    pub major: MajorType,
    /// Subtype display name
    pub subtype: String,
    /// Width in pixels (video)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Height in pixels (video)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Whether rows are stored top-down (negative height)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_down: Option<bool>,
    /// Frame rate (video)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    /// Frame interval in ticks (video)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_interval: Option<i64>,
    /// Bits per second (video)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u32>,
    /// Bits per pixel (video)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_count: Option<u16>,
    /// Sample rate (audio)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    /// Channel count (audio)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
    /// Bits per sample (audio)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bits_per_sample: Option<u16>,
    /// Average bytes per second (audio)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_bytes_per_sec: Option<u32>,
}

impl MediaTypeReport {
    /// Build a report from `media_type`
    pub fn new(media_type: &MediaType) -> Self {
        let mut report = Self {
            major: media_type.major,
            subtype: media_type.subtype.to_string(),
            width: None,
            height: None,
            top_down: None,
            frame_rate: None,
            frame_interval: None,
            bit_rate: None,
            bit_count: None,
            sample_rate: None,
            channels: None,
            bits_per_sample: None,
            avg_bytes_per_sec: None,
        };
        match &media_type.format {
            FormatBlock::Video(info) => {
                let size = info.resolution();
                report.width = Some(size.width);
                report.height = Some(size.height);
                report.top_down = Some(info.height < 0);
                report.frame_rate = Some(info.frame_rate());
                report.frame_interval = Some(info.avg_time_per_frame);
                report.bit_rate = Some(info.bit_rate);
                report.bit_count = Some(info.bit_count);
            }
            FormatBlock::Wave(wave) => {
                report.sample_rate = Some(wave.samples_per_sec);
                report.channels = Some(wave.channels);
                report.bits_per_sample = Some(wave.bits_per_sample);
                report.avg_bytes_per_sec = Some(wave.avg_bytes_per_sec);
            }
            FormatBlock::None => {}
        }
        report
    }

    /// One-line JSON rendering
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

impl std::fmt::Display for MediaTypeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} {}", self.major, self.subtype)?;
        if let (Some(width), Some(height)) = (self.width, self.height) {
            write!(f, " {}x{}", width, height)?;
        }
        if let Some(rate) = self.frame_rate {
            write!(f, " @ {:.2} fps", rate)?;
        }
        if let Some(bit_rate) = self.bit_rate {
            write!(f, " ({} bps)", bit_rate)?;
        }
        if let (Some(rate), Some(channels), Some(bits)) =
            (self.sample_rate, self.channels, self.bits_per_sample)
        {
            write!(f, " {} Hz, {} ch, {} bit", rate, channels, bits)?;
        }
        Ok(())
    }
}

/// Log `media_type` at debug level under `label`
pub fn log_media_type(label: &str, media_type: &MediaType) {
    debug!("{}: {}", label, MediaTypeReport::new(media_type));
}

/// One-line description of capability bounds
pub fn describe_capability(caps: &CapabilityDescriptor) -> String {
    let rates = caps.frame_rate_range();
    format!(
        "interval [{}, {}] ({:.2}-{:.2} fps), size [{} .. {}], step {}x{}",
        caps.min_frame_interval,
        caps.max_frame_interval,
        rates.min,
        rates.max,
        caps.min_output_size,
        caps.max_output_size,
        caps.output_granularity_x,
        caps.output_granularity_y
    )
}
