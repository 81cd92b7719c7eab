//! Logical streams exposed by a capture device

use crate::format::FormatDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackType {
    /// Video frames
    Video,
    /// Audio buffers
    Audio,
    /// Caption text
    Caption,
    /// Opaque metadata
    Metadata,
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackType::Video => "Video",
            TrackType::Audio => "Audio",
            TrackType::Caption => "Caption",
            TrackType::Metadata => "Metadata",
        };
        f.write_str(name)
    }
}

/// One logical stream and the formats it can be negotiated to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Human-readable name
    pub display_name: String,
    /// Internal name
    pub name: String,
    /// Language tag, empty when unknown
    pub language: String,
    /// Formats in enumeration order; duplicates are allowed
    pub formats: Vec<FormatDescriptor>,
    /// Currently selected format
    pub selected_format: Option<usize>,
}

impl Track {
    /// Create an unnamed track for stream `stream_index`
    pub fn unnamed(stream_index: usize) -> Self {
        Self {
            display_name: format!("Unnamed Track (Stream {})", stream_index),
            ..Default::default()
        }
    }

    /// Format at `index`
    pub fn format(&self, index: usize) -> Option<&FormatDescriptor> {
        self.formats.get(index)
    }

    /// Currently selected format
    pub fn selected(&self) -> Option<&FormatDescriptor> {
        self.selected_format.and_then(|index| self.formats.get(index))
    }

    /// Whether `index` addresses a format of this track
    pub fn is_valid_format(&self, index: usize) -> bool {
        index < self.formats.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{AudioFormat, Subtype};

    #[test]
    fn test_unnamed_track() {
        let track = Track::unnamed(0);
        assert_eq!(track.display_name, "Unnamed Track (Stream 0)");
        assert!(track.formats.is_empty());
        assert!(track.selected().is_none());
    }

    #[test]
    fn test_selected_format_lookup() {
        let mut track = Track::unnamed(1);
        track.formats.push(FormatDescriptor::audio(
            Subtype::Pcm,
            AudioFormat {
                bits_per_sample: 16,
                channels: 2,
                sample_rate: 48_000,
            },
        ));
        track.selected_format = Some(0);
        assert!(track.is_valid_format(0));
        assert!(!track.is_valid_format(1));
        assert_eq!(track.selected().unwrap().type_name, "PCM");
    }
}
