//! Configuration types and defaults

use capgraph_core::{CaptureError, CaptureResult};
use capgraph_media::{AudioDeviceHint, DeviceConfig};
use serde::{Deserialize, Serialize};

/// Maximum number of samples each queue holds before it is flushed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueDepths {
    /// Video frames
    pub video: usize,
    /// Audio buffers
    pub audio: usize,
    /// Caption overlays
    pub caption: usize,
    /// Binary metadata
    pub metadata: usize,
}

impl Default for QueueDepths {
    fn default() -> Self {
        Self {
            video: 1,
            audio: 1,
            caption: 256,
            metadata: 256,
        }
    }
}

/// Player-wide configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Install a debug-level tracing subscriber on init
    pub debug_logging: bool,
    /// Sample queue depths
    pub queue_depths: QueueDepths,
    /// Device controller settings
    pub device: DeviceConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            debug_logging: false,
            queue_depths: QueueDepths::default(),
            device: DeviceConfig::default(),
        }
    }
}

impl PlayerConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> CaptureResult<Self> {
        serde_json::from_str(json).map_err(|e| CaptureError::Configuration {
            message: format!("Invalid player configuration: {}", e),
        })
    }

    /// Serialize the configuration to pretty JSON
    pub fn to_json(&self) -> CaptureResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| CaptureError::Configuration {
            message: format!("Failed to serialize player configuration: {}", e),
        })
    }

    /// Preset that keeps audio and video on one clock through a demultiplexer
    pub fn synchronized() -> Self {
        Self {
            device: DeviceConfig {
                use_demultiplexer: true,
                ..DeviceConfig::default()
            },
            ..Self::default()
        }
    }

    /// Preset with deeper queues for consumers that fetch in bursts
    pub fn buffered() -> Self {
        Self {
            queue_depths: QueueDepths {
                video: 4,
                audio: 8,
                ..QueueDepths::default()
            },
            device: DeviceConfig {
                audio_buffer_ms: 40,
                ..DeviceConfig::default()
            },
            ..Self::default()
        }
    }

    /// Preset for development with verbose logging
    pub fn development() -> Self {
        Self {
            debug_logging: true,
            ..Self::default()
        }
    }
}

/// Options passed with each open request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaOptions {
    /// Audio companion: `None`, `""` or `"Auto"` pairs by video device name,
    /// `"None"` disables audio, anything else names an audio device
    pub audio_device_name: Option<String>,
    /// Video track to configure
    pub video_track_index: usize,
    /// Video format to configure; `None` opens the first format
    pub video_format_index: Option<usize>,
    /// Frame rate to request; `None` or a non-positive rate uses the format's upper bound
    pub video_frame_rate: Option<f32>,
}

impl MediaOptions {
    /// Request the format at `index` of the first video track
    pub fn with_format(mut self, index: usize) -> Self {
        self.video_format_index = Some(index);
        self
    }

    /// Request a frame rate for the chosen format
    pub fn with_frame_rate(mut self, frame_rate: f32) -> Self {
        self.video_frame_rate = Some(frame_rate);
        self
    }

    /// Pick the audio companion by name
    pub fn with_audio_device(mut self, name: impl Into<String>) -> Self {
        self.audio_device_name = Some(name.into());
        self
    }

    /// Disable audio capture
    pub fn without_audio(self) -> Self {
        self.with_audio_device("None")
    }

    /// Audio pairing rule for these options
    pub fn audio_hint(&self) -> AudioDeviceHint {
        AudioDeviceHint::parse(self.audio_device_name.as_deref())
    }

    /// Audio device name as given, empty when unset
    pub fn audio_device_key(&self) -> &str {
        self.audio_device_name.as_deref().unwrap_or_default()
    }

    /// Frame rate to request, if one was given and is positive
    pub fn requested_frame_rate(&self) -> Option<f32> {
        self.video_frame_rate.filter(|rate| *rate > 0.0)
    }
}
