//! Capture graph assembly
//!
//! [`GraphBuilder`] adds nodes to a pipeline container owned by the device
//! controller and connects them in strict node order. Every node it adds is
//! recorded in a [`PipelineNodes`] set; on failure the builder returns the error
//! and leaves teardown to the owner of that set.

use crate::enumerator::find_connection;
use capgraph_core::error::{CaptureError, CaptureResult};
use capgraph_core::format::{MajorType, MediaType, Subtype};
use capgraph_core::platform::{
    first_connection_point, CaptureService, ConnectionPoint, GraphNode, NodeRole, PinDirection,
    PipelineContainer,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Fixed position of an owned node in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeSlot {
    /// Video sample sink
    VideoSink,
    /// Colorspace converter of the decode branch
    Colorspace,
    /// Decompressor of the decode branch
    Decompressor,
    /// Video capture source
    VideoSource,
    /// Audio sample sink
    AudioSink,
    /// Audio capture source
    AudioSource,
    /// Demultiplexer shared by both streams
    Demultiplexer,
}

/// Order in which owned nodes are removed, sink-adjacent nodes first
pub const TEARDOWN_ORDER: [NodeSlot; 7] = [
    NodeSlot::VideoSink,
    NodeSlot::Colorspace,
    NodeSlot::Decompressor,
    NodeSlot::VideoSource,
    NodeSlot::AudioSink,
    NodeSlot::AudioSource,
    NodeSlot::Demultiplexer,
];

impl NodeSlot {
    /// Unique node name used inside the container
    pub fn node_name(&self) -> &'static str {
        match self {
            NodeSlot::VideoSink => "Video Sample Grabber",
            NodeSlot::Colorspace => "Color Space Converter",
            NodeSlot::Decompressor => "Video Decompressor",
            NodeSlot::VideoSource => "Video Capture Source",
            NodeSlot::AudioSink => "Audio Sample Grabber",
            NodeSlot::AudioSource => "Audio Capture Source",
            NodeSlot::Demultiplexer => "Demultiplexer",
        }
    }

    fn index(&self) -> usize {
        match self {
            NodeSlot::VideoSink => 0,
            NodeSlot::Colorspace => 1,
            NodeSlot::Decompressor => 2,
            NodeSlot::VideoSource => 3,
            NodeSlot::AudioSink => 4,
            NodeSlot::AudioSource => 5,
            NodeSlot::Demultiplexer => 6,
        }
    }
}

/// Ordered set of node handles owned by one pipeline
#[derive(Default)]
pub struct PipelineNodes {
    slots: [Option<Arc<dyn GraphNode>>; 7],
}

impl PipelineNodes {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `node` in `slot`, returning the node it replaces
    pub fn insert(&mut self, slot: NodeSlot, node: Arc<dyn GraphNode>) -> Option<Arc<dyn GraphNode>> {
        self.slots[slot.index()].replace(node)
    }

    /// Node held in `slot`
    pub fn get(&self, slot: NodeSlot) -> Option<&Arc<dyn GraphNode>> {
        self.slots[slot.index()].as_ref()
    }

    /// Whether `slot` holds a node
    pub fn contains(&self, slot: NodeSlot) -> bool {
        self.slots[slot.index()].is_some()
    }

    /// Number of recorded nodes
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether no node is recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Occupied slots in teardown order
    pub fn occupied(&self) -> Vec<NodeSlot> {
        TEARDOWN_ORDER
            .iter()
            .copied()
            .filter(|slot| self.contains(*slot))
            .collect()
    }

    /// Roles of the recorded nodes in teardown order
    pub fn roles(&self) -> Vec<NodeRole> {
        TEARDOWN_ORDER
            .iter()
            .filter_map(|slot| self.get(*slot).map(|node| node.role()))
            .collect()
    }

    /// Remove the nodes in `slots` from `container`, in [`TEARDOWN_ORDER`]
    ///
    /// Handles are released even when the container refuses the removal.
    pub fn release(&mut self, slots: &[NodeSlot], container: &mut dyn PipelineContainer) -> usize {
        let mut released = 0;
        for slot in TEARDOWN_ORDER.iter().filter(|slot| slots.contains(slot)) {
            let Some(node) = self.slots[slot.index()].take() else {
                continue;
            };
            if let Err(e) = container.remove_node(&node) {
                debug!("Removing {} failed: {}", slot.node_name(), e);
            }
            released += 1;
        }
        released
    }

    /// Remove every recorded node from `container` and drop the handles
    pub fn teardown(&mut self, container: &mut dyn PipelineContainer) -> usize {
        self.release(&TEARDOWN_ORDER, container)
    }

    /// Drop every handle without touching a container
    pub fn clear(&mut self) -> usize {
        let count = self.len();
        self.slots = Default::default();
        count
    }
}

impl std::fmt::Debug for PipelineNodes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.occupied()).finish()
    }
}

/// Shape of the video branch between source and sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Source connects straight to the sink
    Direct,
    /// Decompressor and colorspace converter are inserted for the codec
    Decode(Subtype),
}

impl Topology {
    /// Topology required by `subtype`
    pub fn for_subtype(subtype: Subtype) -> Self {
        if subtype.is_compressed() {
            Topology::Decode(subtype)
        } else {
            Topology::Direct
        }
    }

    /// Whether the branch contains decode nodes
    pub fn needs_decode(&self) -> bool {
        matches!(self, Topology::Decode(_))
    }
}

/// Subtype the video sink accepts for a requested subtype
pub fn sink_subtype(requested: Subtype) -> Subtype {
    if requested.is_compressed() {
        Subtype::Argb32
    } else {
        requested
    }
}

/// Demultiplexer video pin: sink layout with size, compression and interval from `resolved`
pub fn demux_video_type(resolved: &MediaType) -> Option<MediaType> {
    let info = resolved.video_info()?;
    let mut pin_type = MediaType::video(
        sink_subtype(resolved.subtype),
        info.width.unsigned_abs(),
        info.height.unsigned_abs(),
        info.frame_rate(),
    );
    let target = pin_type.video_info_mut()?;
    target.width = info.width;
    target.height = info.height;
    target.compression = info.compression;
    target.avg_time_per_frame = info.avg_time_per_frame;
    Some(pin_type)
}

/// Demultiplexer audio pin: the negotiated rate, always stereo 16-bit
pub fn demux_audio_type(resolved: &MediaType) -> Option<MediaType> {
    let wave = resolved.wave_info()?;
    Some(MediaType::audio(resolved.subtype, wave.samples_per_sec, 2, 16))
}

/// Adds and connects capture graph nodes
pub struct GraphBuilder<'a> {
    service: &'a dyn CaptureService,
    container: &'a mut dyn PipelineContainer,
    nodes: &'a mut PipelineNodes,
}

impl<'a> GraphBuilder<'a> {
    /// Builder adding to `container` and recording into `nodes`
    pub fn new(
        service: &'a dyn CaptureService,
        container: &'a mut dyn PipelineContainer,
        nodes: &'a mut PipelineNodes,
    ) -> Self {
        Self {
            service,
            container,
            nodes,
        }
    }

    /// Add an existing node to the container under `slot`
    ///
    /// A node already held in `slot` is removed from the container first.
    pub fn add(&mut self, slot: NodeSlot, node: Arc<dyn GraphNode>) -> CaptureResult<Arc<dyn GraphNode>> {
        if self.nodes.contains(slot) {
            warn!("{} replaced without teardown", slot.node_name());
            self.release(&[slot]);
        }
        self.container
            .add_node(node.clone(), slot.node_name())
            .map_err(|e| stage_error(slot.node_name(), e))?;
        self.nodes.insert(slot, node.clone());
        Ok(node)
    }

    /// Create a node of `role` and add it under `slot`
    pub fn create(&mut self, slot: NodeSlot, role: NodeRole) -> CaptureResult<Arc<dyn GraphNode>> {
        let node = self
            .service
            .create_node(role)
            .map_err(|e| stage_error(slot.node_name(), e))?;
        self.add(slot, node)
    }

    /// Remove the nodes in `slots` from the container
    pub fn release(&mut self, slots: &[NodeSlot]) -> usize {
        self.nodes.release(slots, &mut *self.container)
    }

    /// Route the video branch from `source` to `sink`
    ///
    /// Compressed subtypes get a decompressor and a colorspace converter whose
    /// output is forced to ARGB32. With a demultiplexer present it sits
    /// immediately before the sink.
    pub fn route_video(
        &mut self,
        source: &Arc<dyn ConnectionPoint>,
        resolved: &MediaType,
        sink: &Arc<dyn GraphNode>,
        demux: Option<&Arc<dyn GraphNode>>,
    ) -> CaptureResult<()> {
        let topology = Topology::for_subtype(resolved.subtype);
        debug!("Routing {} as {:?}", resolved, topology);

        let mut upstream = source.clone();
        let mut forced = None;

        if let Topology::Decode(codec) = topology {
            let decoder = self.create(NodeSlot::Decompressor, NodeRole::Decompressor(codec))?;
            let decoder_in = input_of(&decoder, "decompressor")?;
            self.container
                .connect(&upstream, &decoder_in)
                .map_err(|e| stage_error("source -> decompressor", e))?;

            let converter = self.create(NodeSlot::Colorspace, NodeRole::ColorspaceConverter)?;
            let converter_in = input_of(&converter, "colorspace converter")?;
            let decoder_out = output_of(&decoder, "decompressor")?;
            self.container
                .connect(&decoder_out, &converter_in)
                .map_err(|e| stage_error("decompressor -> colorspace", e))?;

            let converter_out = output_of(&converter, "colorspace converter")?;
            let argb = converter_out
                .media_types()?
                .into_iter()
                .find(|media_type| media_type.subtype == Subtype::Argb32)
                .ok_or_else(|| CaptureError::GraphConstruction {
                    stage: "colorspace output".to_string(),
                    reason: "converter offers no ARGB32 output".to_string(),
                })?;
            upstream = converter_out;
            forced = Some(argb);
        }

        let sink_in = input_of(sink, "video sink")?;
        match demux {
            Some(demux) => {
                let demux_in = input_of(demux, "demultiplexer")?;
                self.container
                    .connect_direct(&upstream, &demux_in, forced.as_ref())
                    .map_err(|e| stage_error("video -> demultiplexer", e))?;
                let pin_type = demux_video_type(resolved).ok_or_else(|| {
                    CaptureError::GraphConstruction {
                        stage: "demultiplexer video pin".to_string(),
                        reason: format!("{} has no video block", resolved),
                    }
                })?;
                let demux_out = create_demux_output(demux, "Video Demux", &pin_type)?;
                self.container
                    .connect_direct(&demux_out, &sink_in, None)
                    .map_err(|e| stage_error("demultiplexer -> video sink", e))?;
            }
            None => {
                self.container
                    .connect_direct(&upstream, &sink_in, forced.as_ref())
                    .map_err(|e| stage_error("video -> sink", e))?;
            }
        }
        Ok(())
    }

    /// Route the audio branch from `source` to `sink`
    pub fn route_audio(
        &mut self,
        source: &Arc<dyn ConnectionPoint>,
        resolved: &MediaType,
        sink: &Arc<dyn GraphNode>,
        demux: Option<&Arc<dyn GraphNode>>,
    ) -> CaptureResult<()> {
        let sink_in = input_of(sink, "audio sink")?;
        match demux {
            Some(demux) => {
                let demux_in = input_of(demux, "demultiplexer")?;
                self.container
                    .connect_direct(source, &demux_in, None)
                    .map_err(|e| stage_error("audio -> demultiplexer", e))?;
                let pin_type = demux_audio_type(resolved).ok_or_else(|| {
                    CaptureError::GraphConstruction {
                        stage: "demultiplexer audio pin".to_string(),
                        reason: format!("{} has no wave block", resolved),
                    }
                })?;
                let demux_out = create_demux_output(demux, "Audio Demux", &pin_type)?;
                self.container
                    .connect_direct(&demux_out, &sink_in, None)
                    .map_err(|e| stage_error("demultiplexer -> audio sink", e))?;
            }
            None => {
                self.container
                    .connect(source, &sink_in)
                    .map_err(|e| stage_error("audio -> sink", e))?;
            }
        }
        Ok(())
    }
}

fn create_demux_output(
    demux: &Arc<dyn GraphNode>,
    name: &str,
    media_type: &MediaType,
) -> CaptureResult<Arc<dyn ConnectionPoint>> {
    let demultiplexer = demux
        .as_demultiplexer()
        .ok_or_else(|| CaptureError::GraphConstruction {
            stage: name.to_string(),
            reason: "node has no demultiplexer capability".to_string(),
        })?;
    demultiplexer
        .create_output(name, media_type)
        .map_err(|e| stage_error(name, e))
}

fn input_of(node: &Arc<dyn GraphNode>, what: &str) -> CaptureResult<Arc<dyn ConnectionPoint>> {
    first_connection_point(node.as_ref(), PinDirection::Input, true).ok_or_else(|| {
        CaptureError::ConnectionNotFound {
            what: format!("free input on {}", what),
        }
    })
}

fn output_of(node: &Arc<dyn GraphNode>, what: &str) -> CaptureResult<Arc<dyn ConnectionPoint>> {
    find_connection(node.as_ref(), PinDirection::Output, None, None).ok_or_else(|| {
        CaptureError::ConnectionNotFound {
            what: format!("output on {}", what),
        }
    })
}

fn stage_error(stage: &str, error: capgraph_core::PlatformError) -> CaptureError {
    CaptureError::GraphConstruction {
        stage: stage.to_string(),
        reason: error.to_string(),
    }
}

/// Major type carried by the sink's input connection, if connected
pub fn sink_input_major(sink: &Arc<dyn GraphNode>) -> Option<MajorType> {
    sink_input_type(sink).map(|media_type| media_type.major)
}

/// Format of the sink's input connection, if connected
pub fn sink_input_type(sink: &Arc<dyn GraphNode>) -> Option<MediaType> {
    sink.connection_points()
        .into_iter()
        .filter(|pin| pin.direction() == PinDirection::Input)
        .find_map(|pin| pin.connection_media_type().ok())
}
