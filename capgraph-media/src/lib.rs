//! # capgraph media
//!
//! Device enumeration, format negotiation, capture graph assembly and the
//! device controller that owns one pipeline. Everything here reaches the
//! platform only through the seams in `capgraph_core::platform`.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod capture;
pub mod device;
pub mod enumerator;
pub mod graph;
pub mod negotiator;

// Re-export main types
pub use bridge::{BridgeStats, SampleBridge, SampleListener};
pub use capture::{default_capture_service, VirtualCaptureService, VirtualDeviceSpec};
pub use device::{
    ActiveFormat, AudioDeviceHint, CaptureDevice, DeviceConfig, DeviceState, FormatSnapshot,
    TracksUpdatedCallback,
};
pub use enumerator::{find_connection, DeviceEnumerator, DeviceInfo, ResolvedConnection};
pub use graph::{GraphBuilder, NodeSlot, PipelineNodes, Topology, TEARDOWN_ORDER};
pub use negotiator::{resolve_audio_format, resolve_video_format, Candidate};
