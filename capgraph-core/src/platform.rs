//! Seams to the platform capture service
//!
//! The platform exposes reference-counted objects with query-for-capability
//! semantics. Each capability is an explicit, fallible `as_*` query returning an
//! optional handle; nothing here is reached by implicit casts.

use crate::error::{PlatformError, PlatformResult};
use crate::format::{CapabilityDescriptor, MediaType, Subtype};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Kind of capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Cameras and other video inputs
    Video,
    /// Microphones and other audio inputs
    Audio,
}

/// Raw property bag fields read from a device moniker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceProperties {
    /// Friendly name
    pub friendly_name: Option<String>,
    /// Longer description, preferred over the friendly name when present
    pub description: Option<String>,
    /// Stable device path; absent on virtual devices
    pub device_path: Option<String>,
}

/// Role of a graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    /// Capture device source
    Source(DeviceKind),
    /// Decoder for a compressed subtype
    Decompressor(Subtype),
    /// Colorspace converter
    ColorspaceConverter,
    /// Pass-through node sharing one clock between streams
    Demultiplexer,
    /// Terminal node surfacing samples to a callback
    SampleSink,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Source(DeviceKind::Video) => write!(f, "Video Capture Source"),
            NodeRole::Source(DeviceKind::Audio) => write!(f, "Audio Capture Source"),
            NodeRole::Decompressor(subtype) => write!(f, "{} Decompressor", subtype),
            NodeRole::ColorspaceConverter => write!(f, "Color Space Converter"),
            NodeRole::Demultiplexer => write!(f, "Demultiplexer"),
            NodeRole::SampleSink => write!(f, "Sample Grabber"),
        }
    }
}

/// Direction of a connection point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    /// Data flows into the node
    Input,
    /// Data flows out of the node
    Output,
}

/// Category tag some platforms attach to output connection points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinCategory {
    /// Capture stream
    Capture,
    /// Preview stream
    Preview,
    /// Anything else
    Other,
}

/// One (format, capability) pair from a capability table
#[derive(Debug, Clone, PartialEq)]
pub struct StreamCapability {
    /// Concrete format
    pub media_type: MediaType,
    /// Declared bounds, absent for audio entries
    pub caps: Option<CapabilityDescriptor>,
}

/// One raw sample delivered by a sink node
#[derive(Debug, Clone, Copy)]
pub struct RawSample<'a> {
    /// Presentation time in seconds reported alongside the buffer
    pub sample_time: f64,
    /// Sample payload
    pub buffer: &'a [u8],
    /// Start time in ticks
    pub start_time: i64,
    /// Stop time in ticks
    pub stop_time: i64,
}

/// Receiver of raw samples, invoked on a platform-owned thread
pub trait SampleCallback: Send + Sync {
    /// Handle one sample; must not block on consumers
    fn on_sample(&self, sample: &RawSample<'_>);
}

/// Device-enumeration entry
pub trait DeviceMoniker: Send + Sync {
    /// Read the property bag
    fn properties(&self) -> PlatformResult<DeviceProperties>;

    /// Instantiate the device's source node
    fn bind(&self) -> PlatformResult<Arc<dyn GraphNode>>;
}

/// Format get/set and capability table of an output connection point
pub trait StreamConfig: Send + Sync {
    /// Current format
    fn format(&self) -> PlatformResult<MediaType>;

    /// Request a format
    fn set_format(&self, media_type: &MediaType) -> PlatformResult<()>;

    /// Capability table; devices without one return `NotImplemented`
    fn capabilities(&self) -> PlatformResult<Vec<StreamCapability>>;

    /// Suggest an allocator buffer size in bytes
    fn suggest_buffer_size(&self, _bytes: u32) -> PlatformResult<()> {
        Err(PlatformError::not_implemented("SuggestAllocatorProperties"))
    }
}

/// Typed port on a graph node
pub trait ConnectionPoint: Send + Sync {
    /// Port name
    fn name(&self) -> String;

    /// Direction of data flow
    fn direction(&self) -> PinDirection;

    /// Category tag, where the platform exposes one
    fn category(&self) -> Option<PinCategory>;

    /// Concrete formats this port can produce or accept
    fn media_types(&self) -> PlatformResult<Vec<MediaType>>;

    /// Whether this port is connected
    fn is_connected(&self) -> bool;

    /// Format of the current connection
    fn connection_media_type(&self) -> PlatformResult<MediaType>;

    /// Whether the port would accept `media_type`
    fn query_accept(&self, media_type: &MediaType) -> bool;

    /// Format get/set capability
    fn as_stream_config(&self) -> Option<&dyn StreamConfig> {
        None
    }

    /// Downcasting hook for the owning platform implementation
    fn as_any(&self) -> &dyn Any;
}

/// Sample-sink capability of a node
pub trait SampleSink: Send + Sync {
    /// Restrict the formats the sink accepts
    fn set_accepted_type(&self, media_type: &MediaType) -> PlatformResult<()>;

    /// Attach or detach the sample callback
    fn set_callback(&self, callback: Option<Arc<dyn SampleCallback>>) -> PlatformResult<()>;
}

/// Demultiplexer capability of a node
pub trait Demultiplexer: Send + Sync {
    /// Create an output port producing `media_type`
    fn create_output(&self, name: &str, media_type: &MediaType)
        -> PlatformResult<Arc<dyn ConnectionPoint>>;
}

/// Processing stage composed into a pipeline
pub trait GraphNode: Send + Sync {
    /// Role of the node
    fn role(&self) -> NodeRole;

    /// All connection points in declaration order
    fn connection_points(&self) -> Vec<Arc<dyn ConnectionPoint>>;

    /// Sample-sink capability
    fn as_sample_sink(&self) -> Option<&dyn SampleSink> {
        None
    }

    /// Demultiplexer capability
    fn as_demultiplexer(&self) -> Option<&dyn Demultiplexer> {
        None
    }

    /// Downcasting hook for the owning platform implementation
    fn as_any(&self) -> &dyn Any;
}

/// Run state reported by a pipeline's run control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not running
    Stopped,
    /// Streaming
    Running,
}

/// Start/stop control of a pipeline
pub trait RunControl: Send + Sync {
    /// Start streaming
    fn run(&self) -> PlatformResult<()>;

    /// Stop streaming
    fn stop(&self) -> PlatformResult<()>;

    /// Current run state
    fn state(&self) -> RunState;
}

/// Container that owns node membership and connections
pub trait PipelineContainer: Send {
    /// Add a node under a display name
    fn add_node(&mut self, node: Arc<dyn GraphNode>, name: &str) -> PlatformResult<()>;

    /// Remove a node, breaking its connections
    fn remove_node(&mut self, node: &Arc<dyn GraphNode>) -> PlatformResult<()>;

    /// Connect two ports, letting the platform pick the format
    fn connect(
        &mut self,
        output: &Arc<dyn ConnectionPoint>,
        input: &Arc<dyn ConnectionPoint>,
    ) -> PlatformResult<()>;

    /// Connect two ports with an explicit format
    fn connect_direct(
        &mut self,
        output: &Arc<dyn ConnectionPoint>,
        input: &Arc<dyn ConnectionPoint>,
        media_type: Option<&MediaType>,
    ) -> PlatformResult<()>;

    /// Query the run control interface
    fn run_control(&self) -> PlatformResult<Arc<dyn RunControl>>;
}

/// Entry point of the platform capture service
pub trait CaptureService: Send + Sync {
    /// Enumerate devices of `kind`
    fn enumerate_devices(&self, kind: DeviceKind) -> PlatformResult<Vec<Arc<dyn DeviceMoniker>>>;

    /// Create an empty pipeline container
    fn create_pipeline(&self) -> PlatformResult<Box<dyn PipelineContainer>>;

    /// Create a processing node
    fn create_node(&self, role: NodeRole) -> PlatformResult<Arc<dyn GraphNode>>;
}

/// First connection point on `node` in `direction`, optionally skipping connected ones
pub fn first_connection_point(
    node: &dyn GraphNode,
    direction: PinDirection,
    unconnected_only: bool,
) -> Option<Arc<dyn ConnectionPoint>> {
    node.connection_points()
        .into_iter()
        .find(|pin| pin.direction() == direction && !(unconnected_only && pin.is_connected()))
}
