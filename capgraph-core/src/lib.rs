//! # capgraph core
//!
//! Format and capability model, time types, typed samples and the seams to the
//! platform capture service. Everything above this crate talks to devices only
//! through the traits in [`platform`].

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod format;
pub mod platform;
pub mod sample;
pub mod tables;
pub mod time;
pub mod track;

// Re-export main types
pub use error::{CaptureError, CaptureResult, ErrorCategory, PlatformError, PlatformResult};
pub use format::{
    AudioFormat, CapabilityDescriptor, FormatBlock, FormatDescriptor, FormatIdentifier,
    FormatParams, FrameRateRange, MajorType, MediaType, Subtype, VideoFormat, VideoInfo,
    VideoResolution, WaveInfo,
};
pub use platform::{
    CaptureService, ConnectionPoint, Demultiplexer, DeviceKind, DeviceMoniker, DeviceProperties,
    GraphNode, NodeRole, PinCategory, PinDirection, PipelineContainer, RawSample, RunControl,
    RunState, SampleCallback, SampleSink, StreamCapability, StreamConfig,
};
pub use sample::{
    AudioSample, CaptionSample, EnqueueOutcome, MediaSample, MetadataSample, SampleQueue,
    VideoSample,
};
pub use tables::{AudioSampleFormat, PixelLayout, SampleGeometry};
pub use time::{TimeRange, Timespan, TICKS_PER_SECOND};
pub use track::{Track, TrackType};
