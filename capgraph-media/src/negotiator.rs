//! Format negotiation against device-declared capabilities
//!
//! Devices expose their formats in one of two ways: a capability table of
//! (format, bounds) pairs, or a bare list of formats. The second is used when
//! the table query reports "not implemented"; each format then gets degenerate
//! bounds equal to its own interval and size.
//!
//! Resolution is first-fit in enumeration order, never best-fit.

use capgraph_core::error::{CaptureError, CaptureResult};
use capgraph_core::format::{
    AudioFormat, CapabilityDescriptor, FormatDescriptor, FormatParams, FrameRateRange, MajorType,
    MediaType, Subtype, VideoFormat,
};
use capgraph_core::platform::ConnectionPoint;
use capgraph_core::tables;
use capgraph_core::time::TICKS_PER_SECOND;
use tracing::debug;

/// One negotiable format and its declared bounds
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Concrete format
    pub media_type: MediaType,
    /// Declared bounds, if the device reported any
    pub caps: Option<CapabilityDescriptor>,
}

/// Enumerate the formats `connection` can be negotiated to
pub fn enumerate_candidates(connection: &dyn ConnectionPoint) -> CaptureResult<Vec<Candidate>> {
    if let Some(config) = connection.as_stream_config() {
        match config.capabilities() {
            Ok(entries) => {
                return Ok(entries
                    .into_iter()
                    .map(|entry| Candidate {
                        media_type: entry.media_type,
                        caps: entry.caps,
                    })
                    .collect())
            }
            Err(e) if e.is_not_implemented() => {
                debug!(
                    "{} has no capability table, enumerating formats",
                    connection.name()
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(connection
        .media_types()?
        .into_iter()
        .map(|media_type| Candidate {
            caps: CapabilityDescriptor::single_point(&media_type),
            media_type,
        })
        .collect())
}

/// Check `candidate` against `requested` and the declared bounds
///
/// On acceptance the candidate's frame interval is replaced with the resolved
/// interval; pipeline construction reads that value, not the requested rate.
pub fn validate(
    requested: &FormatDescriptor,
    candidate: &mut MediaType,
    caps: Option<&CapabilityDescriptor>,
) -> bool {
    if requested.identifier != candidate.identifier() {
        return false;
    }

    match &requested.params {
        FormatParams::Audio(audio) => audio_matches(audio, candidate),
        FormatParams::Video(video) => validate_video(video, candidate, caps),
    }
}

fn audio_matches(requested: &AudioFormat, candidate: &MediaType) -> bool {
    candidate.wave_info().map_or(false, |wave| {
        wave.samples_per_sec == requested.sample_rate
            && wave.channels == requested.channels
            && wave.bits_per_sample == requested.bits_per_sample
    })
}

fn validate_video(
    requested: &VideoFormat,
    candidate: &mut MediaType,
    caps: Option<&CapabilityDescriptor>,
) -> bool {
    let Some(own_bounds) = CapabilityDescriptor::single_point(candidate) else {
        return false;
    };
    let bounds = caps.copied().unwrap_or(own_bounds);

    let min_interval = bounds.min_frame_interval;
    let max_interval = bounds.max_frame_interval.max(min_interval);

    // A zero size bound means the device did not declare one.
    let mut min_size = bounds.min_output_size;
    if min_size.width == 0 || min_size.height == 0 {
        min_size = own_bounds.min_output_size;
    }
    let mut max_size = bounds.max_output_size;
    if max_size.width == 0 || max_size.height == 0 {
        max_size = own_bounds.max_output_size;
    }

    if !requested.frame_rate.is_finite() || requested.frame_rate <= 0.0 {
        return false;
    }
    let requested_interval = TICKS_PER_SECOND as f64 / requested.frame_rate as f64;

    let resolved = if min_interval == max_interval
        && (requested_interval - max_interval as f64).abs() < 1.0
    {
        max_interval
    } else {
        let rounded = requested_interval.round() as i64;
        if rounded < min_interval || rounded > max_interval {
            debug!(
                "Interval {} outside [{}, {}]",
                rounded, min_interval, max_interval
            );
            return false;
        }
        rounded
    };

    let size = requested.resolution;
    if size.width < min_size.width
        || size.width > max_size.width
        || size.height < min_size.height
        || size.height > max_size.height
    {
        return false;
    }

    match candidate.video_info_mut() {
        Some(info) => {
            info.avg_time_per_frame = resolved;
            true
        }
        None => false,
    }
}

/// First video candidate on `connection` that accepts `requested`, with its resolved interval
pub fn resolve_video_format(
    connection: &dyn ConnectionPoint,
    requested: &FormatDescriptor,
) -> CaptureResult<MediaType> {
    for candidate in enumerate_candidates(connection)? {
        if candidate.media_type.major != MajorType::Video {
            continue;
        }
        let mut media_type = candidate.media_type;
        if validate(requested, &mut media_type, candidate.caps.as_ref()) {
            return Ok(media_type);
        }
    }
    Err(CaptureError::FormatNotAcceptable {
        format: describe(requested),
    })
}

/// First audio candidate on `connection` that exactly matches `requested`
pub fn resolve_audio_format(
    connection: &dyn ConnectionPoint,
    requested: &FormatDescriptor,
) -> CaptureResult<MediaType> {
    for candidate in enumerate_candidates(connection)? {
        if candidate.media_type.major != MajorType::Audio {
            continue;
        }
        let mut media_type = candidate.media_type;
        if validate(requested, &mut media_type, None) {
            return Ok(media_type);
        }
    }
    Err(CaptureError::FormatNotAcceptable {
        format: describe(requested),
    })
}

/// Build the format list of a video track from `connection`'s candidates
///
/// Returns the formats and the index of the one matching the connection's
/// current format. Subtypes missing from the name table are skipped.
pub fn describe_video_candidates(
    connection: &dyn ConnectionPoint,
) -> CaptureResult<(Vec<FormatDescriptor>, Option<usize>)> {
    let current = connection
        .as_stream_config()
        .and_then(|config| config.format().ok())
        .or_else(|| connection.connection_media_type().ok());
    let current_info = current.as_ref().and_then(|mt| mt.video_info().map(|info| (mt.subtype, *info)));

    let mut formats = Vec::new();
    let mut selected = None;

    for candidate in enumerate_candidates(connection)? {
        let media_type = candidate.media_type;
        let Some(info) = media_type.video_info() else {
            continue;
        };
        if tables::subtype_name(media_type.subtype).is_none() {
            debug!(
                "Skipping {}: {}",
                media_type.subtype,
                tables::UNSUPPORTED_FORMAT_NAME
            );
            continue;
        }

        let resolution = info.resolution();
        let frame_rates = candidate
            .caps
            .map(|caps| caps.frame_rate_range())
            .unwrap_or_else(|| FrameRateRange::single(info.frame_rate() as f32));

        let is_current = current_info.map_or(false, |(subtype, current)| {
            subtype == media_type.subtype && current.resolution() == resolution
        });
        let mut frame_rate = info.frame_rate() as f32;
        if is_current {
            if let Some((_, current)) = current_info {
                if current.frame_rate() > 0.0 {
                    frame_rate = current.frame_rate() as f32;
                }
            }
            if selected.is_none() {
                selected = Some(formats.len());
            }
        }

        formats.push(FormatDescriptor::video(
            media_type.subtype,
            VideoFormat {
                bit_rate: info.bit_rate,
                frame_rate: frame_rates.clamp(frame_rate),
                frame_rates,
                resolution,
            },
        ));
    }

    Ok((formats, selected))
}

/// Build the format list of an audio track; only 16-bit PCM is kept
pub fn describe_audio_candidates(
    connection: &dyn ConnectionPoint,
) -> CaptureResult<Vec<FormatDescriptor>> {
    Ok(enumerate_candidates(connection)?
        .into_iter()
        .filter_map(|candidate| {
            let media_type = candidate.media_type;
            let wave = media_type.wave_info()?;
            if media_type.subtype != Subtype::Pcm || wave.bits_per_sample != 16 {
                return None;
            }
            Some(FormatDescriptor::audio(
                media_type.subtype,
                AudioFormat {
                    bits_per_sample: wave.bits_per_sample,
                    channels: wave.channels,
                    sample_rate: wave.samples_per_sec,
                },
            ))
        })
        .collect())
}

fn describe(format: &FormatDescriptor) -> String {
    match &format.params {
        FormatParams::Video(video) => format!(
            "{} {} @ {} fps",
            format.type_name, video.resolution, video.frame_rate
        ),
        FormatParams::Audio(audio) => format!(
            "{} {} Hz {} ch {} bit",
            format.type_name, audio.sample_rate, audio.channels, audio.bits_per_sample
        ),
    }
}
