//! In-memory capture service
//!
//! Implements every platform seam with plain Rust objects: configurable devices,
//! a pipeline container that tracks membership and connections, and sample sinks
//! that can be fed from any thread. Used by the test suites and the demo, and as
//! the fallback service on hosts without a native capture stack.

use capgraph_core::error::{PlatformError, PlatformResult};
use capgraph_core::format::{CapabilityDescriptor, MajorType, MediaType, Subtype};
use capgraph_core::platform::{
    CaptureService, ConnectionPoint, Demultiplexer, DeviceKind, DeviceMoniker, DeviceProperties,
    GraphNode, NodeRole, PinCategory, PinDirection, PipelineContainer, RawSample, RunControl,
    RunState, SampleCallback, SampleSink, StreamCapability, StreamConfig,
};
use capgraph_core::time::frame_rate_to_interval;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Description of one virtual device
#[derive(Debug, Clone)]
pub struct VirtualDeviceSpec {
    /// Device kind
    pub kind: DeviceKind,
    /// Friendly name property
    pub friendly_name: Option<String>,
    /// Description property
    pub description: Option<String>,
    /// Device path property
    pub device_path: Option<String>,
    /// Capability table in enumeration order
    pub capabilities: Vec<StreamCapability>,
    /// Whether the capability table query is implemented
    pub capability_table: bool,
    /// Result returned by every format set, when configured
    pub set_format_error: Option<PlatformError>,
    /// Category reported by the capture output
    pub pin_category: Option<PinCategory>,
}

impl VirtualDeviceSpec {
    fn new(kind: DeviceKind, name: &str) -> Self {
        let slug: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        Self {
            kind,
            friendly_name: Some(name.to_string()),
            description: None,
            device_path: Some(format!("\\\\?\\virtual#{}", slug)),
            capabilities: Vec::new(),
            capability_table: true,
            set_format_error: None,
            pin_category: Some(PinCategory::Capture),
        }
    }

    /// Video device named `name`
    pub fn camera(name: &str) -> Self {
        Self::new(DeviceKind::Video, name)
    }

    /// Audio device named `name`
    pub fn microphone(name: &str) -> Self {
        Self::new(DeviceKind::Audio, name)
    }

    /// Replace the device path; `None` models a software device
    pub fn with_path(mut self, path: Option<&str>) -> Self {
        self.device_path = path.map(str::to_string);
        self
    }

    /// Set the description property
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Add a video format supporting `min_fps..=max_fps` at one fixed size
    pub fn with_video_format(
        mut self,
        subtype: Subtype,
        width: u32,
        height: u32,
        min_fps: f64,
        max_fps: f64,
    ) -> Self {
        let media_type = MediaType::video(subtype, width, height, max_fps);
        let size = capgraph_core::VideoResolution::new(width, height);
        let caps = CapabilityDescriptor {
            min_frame_interval: frame_rate_to_interval(max_fps).unwrap_or(0),
            max_frame_interval: frame_rate_to_interval(min_fps).unwrap_or(0),
            min_output_size: size,
            max_output_size: size,
            output_granularity_x: 0,
            output_granularity_y: 0,
        };
        self.capabilities.push(StreamCapability {
            media_type,
            caps: Some(caps),
        });
        self
    }

    /// Add a raw capability entry
    pub fn with_capability(
        mut self,
        media_type: MediaType,
        caps: Option<CapabilityDescriptor>,
    ) -> Self {
        self.capabilities.push(StreamCapability { media_type, caps });
        self
    }

    /// Add a PCM audio format
    pub fn with_audio_format(mut self, sample_rate: u32, channels: u16, bits: u16) -> Self {
        self.capabilities.push(StreamCapability {
            media_type: MediaType::audio(Subtype::Pcm, sample_rate, channels, bits),
            caps: None,
        });
        self
    }

    /// Report "not implemented" for the capability table
    pub fn without_capability_table(mut self) -> Self {
        self.capability_table = false;
        self
    }

    /// Fail every format set with `error`
    pub fn rejecting_set_format(mut self, error: PlatformError) -> Self {
        self.set_format_error = Some(error);
        self
    }

    /// Hide the category tag of the capture output
    pub fn without_pin_category(mut self) -> Self {
        self.pin_category = None;
        self
    }
}

#[derive(Default)]
struct ServiceShared {
    devices: RwLock<Vec<VirtualDeviceSpec>>,
    enumeration_unavailable: AtomicBool,
    pipeline_unavailable: AtomicBool,
    sinks: Mutex<Vec<Weak<VirtualNode>>>,
    last_graph: Mutex<Weak<GraphShared>>,
}

/// In-memory implementation of [`CaptureService`]
#[derive(Clone, Default)]
pub struct VirtualCaptureService {
    shared: Arc<ServiceShared>,
}

impl VirtualCaptureService {
    /// Service with no devices
    pub fn new() -> Self {
        Self::default()
    }

    /// Service with a webcam and its paired microphone
    pub fn with_sample_devices() -> Self {
        let service = Self::new();
        service.add_device(
            VirtualDeviceSpec::camera("Virtual Webcam")
                .with_video_format(Subtype::Mjpg, 1280, 720, 5.0, 30.0)
                .with_video_format(Subtype::Yuy2, 640, 480, 5.0, 30.0)
                .with_video_format(Subtype::Nv12, 1280, 720, 5.0, 15.0),
        );
        service.add_device(
            VirtualDeviceSpec::microphone("Microphone (Virtual Webcam)")
                .with_audio_format(48_000, 2, 16)
                .with_audio_format(44_100, 1, 16)
                .with_audio_format(48_000, 2, 32),
        );
        service
    }

    /// Register a device
    pub fn add_device(&self, spec: VirtualDeviceSpec) {
        self.shared.devices.write().push(spec);
    }

    /// Remove every device whose friendly name is `name`
    pub fn remove_device(&self, name: &str) {
        self.shared
            .devices
            .write()
            .retain(|spec| spec.friendly_name.as_deref() != Some(name));
    }

    /// Make device enumeration fail
    pub fn set_enumeration_available(&self, available: bool) {
        self.shared
            .enumeration_unavailable
            .store(!available, Ordering::SeqCst);
    }

    /// Make pipeline creation fail
    pub fn set_pipeline_available(&self, available: bool) {
        self.shared
            .pipeline_unavailable
            .store(!available, Ordering::SeqCst);
    }

    /// Roles of the nodes in the most recently created pipeline
    pub fn pipeline_roles(&self) -> Vec<NodeRole> {
        match self.shared.last_graph.lock().upgrade() {
            Some(graph) => graph.nodes.lock().iter().map(|(_, node)| node.role()).collect(),
            None => Vec::new(),
        }
    }

    /// Whether the most recently created pipeline is running
    pub fn is_running(&self) -> bool {
        self.shared
            .last_graph
            .lock()
            .upgrade()
            .map(|graph| *graph.state.lock() == RunState::Running)
            .unwrap_or(false)
    }

    /// Deliver a video buffer to every running video sink; returns the sink count reached
    pub fn push_video_frame(&self, buffer: &[u8], start_time: i64, stop_time: i64) -> usize {
        self.push_sample(MajorType::Video, buffer, start_time, stop_time)
    }

    /// Deliver an audio buffer to every running audio sink; returns the sink count reached
    pub fn push_audio_buffer(&self, buffer: &[u8], start_time: i64, stop_time: i64) -> usize {
        self.push_sample(MajorType::Audio, buffer, start_time, stop_time)
    }

    fn push_sample(&self, major: MajorType, buffer: &[u8], start_time: i64, stop_time: i64) -> usize {
        let sinks: Vec<Arc<VirtualNode>> = {
            let mut registry = self.shared.sinks.lock();
            registry.retain(|sink| sink.strong_count() > 0);
            registry.iter().filter_map(Weak::upgrade).collect()
        };

        let sample = RawSample {
            sample_time: start_time as f64 / capgraph_core::TICKS_PER_SECOND as f64,
            buffer,
            start_time,
            stop_time,
        };

        let mut delivered = 0;
        for sink in sinks {
            if !sink.running.load(Ordering::SeqCst) || sink.input_major() != Some(major) {
                continue;
            }
            let callback = sink.sink.as_ref().and_then(|state| state.callback.lock().clone());
            if let Some(callback) = callback {
                callback.on_sample(&sample);
                delivered += 1;
            }
        }
        trace!("Delivered {:?} sample to {} sink(s)", major, delivered);
        delivered
    }
}

impl CaptureService for VirtualCaptureService {
    fn enumerate_devices(&self, kind: DeviceKind) -> PlatformResult<Vec<Arc<dyn DeviceMoniker>>> {
        if self.shared.enumeration_unavailable.load(Ordering::SeqCst) {
            return Err(PlatformError::Unavailable {
                reason: "device enumerator not registered".to_string(),
            });
        }
        Ok(self
            .shared
            .devices
            .read()
            .iter()
            .filter(|spec| spec.kind == kind)
            .map(|spec| Arc::new(VirtualMoniker { spec: spec.clone() }) as Arc<dyn DeviceMoniker>)
            .collect())
    }

    fn create_pipeline(&self) -> PlatformResult<Box<dyn PipelineContainer>> {
        if self.shared.pipeline_unavailable.load(Ordering::SeqCst) {
            return Err(PlatformError::Unavailable {
                reason: "pipeline builder not registered".to_string(),
            });
        }
        let graph = Arc::new(GraphShared {
            nodes: Mutex::new(Vec::new()),
            state: Mutex::new(RunState::Stopped),
        });
        *self.shared.last_graph.lock() = Arc::downgrade(&graph);
        Ok(Box::new(VirtualPipeline { graph }))
    }

    fn create_node(&self, role: NodeRole) -> PlatformResult<Arc<dyn GraphNode>> {
        let node = match role {
            NodeRole::Source(_) => {
                return Err(PlatformError::rejected(
                    "CreateNode",
                    "sources are bound from device monikers",
                ))
            }
            NodeRole::Decompressor(subtype) => VirtualNode::build(role, None, |owner| {
                vec![
                    VirtualPin::input("In", PinKind::Input(AcceptRule::Subtype(subtype)), owner),
                    VirtualPin::output(
                        "Out",
                        None,
                        PinKind::Derived(vec![Subtype::Yuy2, Subtype::Rgb32]),
                        None,
                        owner,
                    ),
                ]
            }),
            NodeRole::ColorspaceConverter => VirtualNode::build(role, None, |owner| {
                vec![
                    VirtualPin::input("Input", PinKind::Input(AcceptRule::Uncompressed), owner),
                    VirtualPin::output(
                        "XForm Out",
                        None,
                        PinKind::Derived(vec![
                            Subtype::Rgb32,
                            Subtype::Argb32,
                            Subtype::Yuy2,
                            Subtype::Uyvy,
                        ]),
                        None,
                        owner,
                    ),
                ]
            }),
            NodeRole::Demultiplexer => VirtualNode::build(role, None, |owner| {
                vec![
                    VirtualPin::input("Video Input", PinKind::Input(AcceptRule::Any), owner),
                    VirtualPin::input("Audio Input", PinKind::Input(AcceptRule::Any), owner),
                ]
            }),
            NodeRole::SampleSink => {
                let node = VirtualNode::build(role, Some(SinkState::default()), |owner| {
                    vec![VirtualPin::input("Input", PinKind::Input(AcceptRule::SinkAccepted), owner)]
                });
                self.shared.sinks.lock().push(Arc::downgrade(&node));
                node
            }
        };
        Ok(node as Arc<dyn GraphNode>)
    }
}

struct VirtualMoniker {
    spec: VirtualDeviceSpec,
}

impl DeviceMoniker for VirtualMoniker {
    fn properties(&self) -> PlatformResult<DeviceProperties> {
        Ok(DeviceProperties {
            friendly_name: self.spec.friendly_name.clone(),
            description: self.spec.description.clone(),
            device_path: self.spec.device_path.clone(),
        })
    }

    fn bind(&self) -> PlatformResult<Arc<dyn GraphNode>> {
        let first = self.spec.capabilities.first().ok_or_else(|| {
            PlatformError::rejected("BindToObject", "device exposes no formats")
        })?;
        let stream = VirtualStreamConfig {
            current: Mutex::new(first.media_type),
            capabilities: self.spec.capabilities.clone(),
            capability_table: self.spec.capability_table,
            set_format_error: self.spec.set_format_error.clone(),
            buffer_size: Mutex::new(None),
        };
        let category = self.spec.pin_category;
        let kind = self.spec.kind;
        let node: Arc<dyn GraphNode> = VirtualNode::build(NodeRole::Source(kind), None, |owner| {
            let mut pins = vec![VirtualPin::output(
                "Capture",
                category,
                PinKind::SourceOutput,
                Some(stream),
                owner,
            )];
            if kind == DeviceKind::Video && category.is_some() {
                let preview = VirtualStreamConfig {
                    current: Mutex::new(first.media_type),
                    capabilities: Vec::new(),
                    capability_table: false,
                    set_format_error: None,
                    buffer_size: Mutex::new(None),
                };
                pins.push(VirtualPin::output(
                    "Preview",
                    Some(PinCategory::Preview),
                    PinKind::SourceOutput,
                    Some(preview),
                    owner,
                ));
            }
            pins
        });
        Ok(node)
    }
}

struct VirtualStreamConfig {
    current: Mutex<MediaType>,
    capabilities: Vec<StreamCapability>,
    capability_table: bool,
    set_format_error: Option<PlatformError>,
    buffer_size: Mutex<Option<u32>>,
}

impl VirtualStreamConfig {
    fn supports(&self, media_type: &MediaType) -> bool {
        self.capabilities.iter().any(|entry| {
            let known = &entry.media_type;
            known.identifier() == media_type.identifier()
                && match (known.video_info(), media_type.video_info()) {
                    (Some(a), Some(b)) => a.resolution() == b.resolution(),
                    _ => known.wave_info() == media_type.wave_info(),
                }
        })
    }
}

impl StreamConfig for VirtualStreamConfig {
    fn format(&self) -> PlatformResult<MediaType> {
        Ok(*self.current.lock())
    }

    fn set_format(&self, media_type: &MediaType) -> PlatformResult<()> {
        if let Some(error) = &self.set_format_error {
            return Err(error.clone());
        }
        if !self.supports(media_type) {
            return Err(PlatformError::rejected(
                "SetFormat",
                format!("{} is not offered by this device", media_type),
            ));
        }
        *self.current.lock() = *media_type;
        Ok(())
    }

    fn capabilities(&self) -> PlatformResult<Vec<StreamCapability>> {
        if !self.capability_table {
            return Err(PlatformError::not_implemented("GetStreamCaps"));
        }
        Ok(self.capabilities.clone())
    }

    fn suggest_buffer_size(&self, bytes: u32) -> PlatformResult<()> {
        *self.buffer_size.lock() = Some(bytes);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum AcceptRule {
    Any,
    Subtype(Subtype),
    Uncompressed,
    SinkAccepted,
}

enum PinKind {
    /// Formats come from the stream config
    SourceOutput,
    /// Fixed format list
    Fixed(Vec<MediaType>),
    /// Subtypes produced from the owner's input connection
    Derived(Vec<Subtype>),
    /// Input port
    Input(AcceptRule),
}

struct VirtualPin {
    name: String,
    direction: PinDirection,
    category: Option<PinCategory>,
    kind: PinKind,
    stream: Option<VirtualStreamConfig>,
    peer: Mutex<Option<Weak<VirtualPin>>>,
    connection: Mutex<Option<MediaType>>,
    owner: Weak<VirtualNode>,
}

impl VirtualPin {
    fn input(name: &str, kind: PinKind, owner: &Weak<VirtualNode>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            direction: PinDirection::Input,
            category: None,
            kind,
            stream: None,
            peer: Mutex::new(None),
            connection: Mutex::new(None),
            owner: owner.clone(),
        })
    }

    fn output(
        name: &str,
        category: Option<PinCategory>,
        kind: PinKind,
        stream: Option<VirtualStreamConfig>,
        owner: &Weak<VirtualNode>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            direction: PinDirection::Output,
            category,
            kind,
            stream,
            peer: Mutex::new(None),
            connection: Mutex::new(None),
            owner: owner.clone(),
        })
    }

    fn disconnect(&self) {
        let peer = self.peer.lock().take();
        *self.connection.lock() = None;
        if let Some(peer) = peer.and_then(|peer| peer.upgrade()) {
            *peer.peer.lock() = None;
            *peer.connection.lock() = None;
        }
    }

    fn derived_types(&self, subtypes: &[Subtype]) -> Vec<MediaType> {
        let upstream = self
            .owner
            .upgrade()
            .and_then(|node| node.input_connection());
        let Some(info) = upstream.as_ref().and_then(|mt| mt.video_info()) else {
            return Vec::new();
        };
        subtypes
            .iter()
            .map(|subtype| {
                let mut media_type = MediaType::video(
                    *subtype,
                    info.width.unsigned_abs(),
                    info.height.unsigned_abs(),
                    info.frame_rate(),
                );
                if let Some(derived) = media_type.video_info_mut() {
                    derived.avg_time_per_frame = info.avg_time_per_frame;
                }
                media_type
            })
            .collect()
    }
}

impl ConnectionPoint for VirtualPin {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn direction(&self) -> PinDirection {
        self.direction
    }

    fn category(&self) -> Option<PinCategory> {
        self.category
    }

    fn media_types(&self) -> PlatformResult<Vec<MediaType>> {
        Ok(match &self.kind {
            PinKind::SourceOutput => match &self.stream {
                Some(stream) => {
                    let mut types = vec![*stream.current.lock()];
                    types.extend(stream.capabilities.iter().map(|entry| entry.media_type));
                    types
                }
                None => Vec::new(),
            },
            PinKind::Fixed(types) => types.clone(),
            PinKind::Derived(subtypes) => self.derived_types(subtypes),
            PinKind::Input(_) => Vec::new(),
        })
    }

    fn is_connected(&self) -> bool {
        self.peer.lock().is_some()
    }

    fn connection_media_type(&self) -> PlatformResult<MediaType> {
        (*self.connection.lock()).ok_or(PlatformError::NotConnected)
    }

    fn query_accept(&self, media_type: &MediaType) -> bool {
        match &self.kind {
            PinKind::Input(AcceptRule::Any) => true,
            PinKind::Input(AcceptRule::Subtype(subtype)) => {
                media_type.major == MajorType::Video && media_type.subtype == *subtype
            }
            PinKind::Input(AcceptRule::Uncompressed) => {
                media_type.major == MajorType::Video && !media_type.subtype.is_compressed()
            }
            PinKind::Input(AcceptRule::SinkAccepted) => {
                let accepted = self
                    .owner
                    .upgrade()
                    .and_then(|node| node.sink.as_ref().and_then(|sink| *sink.accepted.lock()));
                match accepted {
                    Some(accepted) => {
                        accepted.major == media_type.major && accepted.subtype == media_type.subtype
                    }
                    None => true,
                }
            }
            _ => self.media_types().map_or(false, |types| {
                types
                    .iter()
                    .any(|offered| offered.identifier() == media_type.identifier())
            }),
        }
    }

    fn as_stream_config(&self) -> Option<&dyn StreamConfig> {
        self.stream.as_ref().map(|stream| stream as &dyn StreamConfig)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
struct SinkState {
    accepted: Mutex<Option<MediaType>>,
    callback: Mutex<Option<Arc<dyn SampleCallback>>>,
}

struct VirtualNode {
    role: NodeRole,
    pins: Mutex<Vec<Arc<VirtualPin>>>,
    sink: Option<SinkState>,
    running: AtomicBool,
}

impl VirtualNode {
    fn build<F>(role: NodeRole, sink: Option<SinkState>, pins: F) -> Arc<Self>
    where
        F: FnOnce(&Weak<VirtualNode>) -> Vec<Arc<VirtualPin>>,
    {
        Arc::new_cyclic(|owner| VirtualNode {
            role,
            pins: Mutex::new(pins(owner)),
            sink,
            running: AtomicBool::new(false),
        })
    }

    fn input_connection(&self) -> Option<MediaType> {
        self.pins
            .lock()
            .iter()
            .filter(|pin| pin.direction == PinDirection::Input)
            .find_map(|pin| *pin.connection.lock())
    }

    fn input_major(&self) -> Option<MajorType> {
        self.input_connection().map(|media_type| media_type.major)
    }

    fn disconnect_all(&self) {
        for pin in self.pins.lock().iter() {
            pin.disconnect();
        }
    }
}

impl GraphNode for VirtualNode {
    fn role(&self) -> NodeRole {
        self.role
    }

    fn connection_points(&self) -> Vec<Arc<dyn ConnectionPoint>> {
        self.pins
            .lock()
            .iter()
            .map(|pin| pin.clone() as Arc<dyn ConnectionPoint>)
            .collect()
    }

    fn as_sample_sink(&self) -> Option<&dyn SampleSink> {
        self.sink.as_ref().map(|_| self as &dyn SampleSink)
    }

    fn as_demultiplexer(&self) -> Option<&dyn Demultiplexer> {
        (self.role == NodeRole::Demultiplexer).then_some(self as &dyn Demultiplexer)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl SampleSink for VirtualNode {
    fn set_accepted_type(&self, media_type: &MediaType) -> PlatformResult<()> {
        let sink = self
            .sink
            .as_ref()
            .ok_or_else(|| PlatformError::not_implemented("SetMediaType"))?;
        *sink.accepted.lock() = Some(*media_type);
        Ok(())
    }

    fn set_callback(&self, callback: Option<Arc<dyn SampleCallback>>) -> PlatformResult<()> {
        let sink = self
            .sink
            .as_ref()
            .ok_or_else(|| PlatformError::not_implemented("SetCallback"))?;
        *sink.callback.lock() = callback;
        Ok(())
    }
}

impl Demultiplexer for VirtualNode {
    fn create_output(
        &self,
        name: &str,
        media_type: &MediaType,
    ) -> PlatformResult<Arc<dyn ConnectionPoint>> {
        let owner = {
            let pins = self.pins.lock();
            pins.first()
                .map(|pin| pin.owner.clone())
                .ok_or_else(|| PlatformError::rejected("CreateOutputPin", "node has no input"))?
        };
        let pin = VirtualPin::output(
            name,
            None,
            PinKind::Fixed(vec![*media_type]),
            None,
            &owner,
        );
        self.pins.lock().push(pin.clone());
        Ok(pin)
    }
}

struct GraphShared {
    nodes: Mutex<Vec<(String, Arc<dyn GraphNode>)>>,
    state: Mutex<RunState>,
}

impl GraphShared {
    fn set_running(&self, running: bool) {
        for (_, node) in self.nodes.lock().iter() {
            if let Some(node) = node.as_any().downcast_ref::<VirtualNode>() {
                node.running.store(running, Ordering::SeqCst);
            }
        }
    }

    fn contains_owner(&self, pin: &VirtualPin) -> bool {
        let Some(owner) = pin.owner.upgrade() else {
            return false;
        };
        let owner_addr = Arc::as_ptr(&owner) as *const ();
        self.nodes
            .lock()
            .iter()
            .any(|(_, node)| Arc::as_ptr(node) as *const () == owner_addr)
    }
}

struct VirtualPipeline {
    graph: Arc<GraphShared>,
}

impl VirtualPipeline {
    fn pins<'a>(
        &self,
        output: &'a Arc<dyn ConnectionPoint>,
        input: &'a Arc<dyn ConnectionPoint>,
    ) -> PlatformResult<(&'a VirtualPin, &'a VirtualPin)> {
        let out_pin = output
            .as_any()
            .downcast_ref::<VirtualPin>()
            .ok_or_else(|| PlatformError::rejected("Connect", "foreign output pin"))?;
        let in_pin = input
            .as_any()
            .downcast_ref::<VirtualPin>()
            .ok_or_else(|| PlatformError::rejected("Connect", "foreign input pin"))?;

        if out_pin.direction != PinDirection::Output || in_pin.direction != PinDirection::Input {
            return Err(PlatformError::rejected("Connect", "pin directions do not match"));
        }
        if out_pin.is_connected() || in_pin.is_connected() {
            return Err(PlatformError::rejected("Connect", "pin already connected"));
        }
        if !self.graph.contains_owner(out_pin) || !self.graph.contains_owner(in_pin) {
            return Err(PlatformError::NotFound {
                what: "node is not a member of this pipeline".to_string(),
            });
        }
        Ok((out_pin, in_pin))
    }

    fn link(out_pin: &VirtualPin, in_pin: &VirtualPin, media_type: MediaType) {
        // Peers are stored as weak references so removed nodes are released.
        let (Some(out_owner), Some(in_owner)) = (out_pin.owner.upgrade(), in_pin.owner.upgrade())
        else {
            return;
        };
        let find = |node: &Arc<VirtualNode>, pin: &VirtualPin| {
            node.pins
                .lock()
                .iter()
                .find(|candidate| std::ptr::eq(candidate.as_ref(), pin))
                .map(Arc::downgrade)
        };
        *out_pin.peer.lock() = find(&in_owner, in_pin);
        *in_pin.peer.lock() = find(&out_owner, out_pin);
        *out_pin.connection.lock() = Some(media_type);
        *in_pin.connection.lock() = Some(media_type);
        debug!("Connected {} -> {} as {}", out_pin.name, in_pin.name, media_type);
    }
}

impl PipelineContainer for VirtualPipeline {
    fn add_node(&mut self, node: Arc<dyn GraphNode>, name: &str) -> PlatformResult<()> {
        let mut nodes = self.graph.nodes.lock();
        if nodes.iter().any(|(existing, _)| existing == name) {
            return Err(PlatformError::rejected(
                "AddFilter",
                format!("duplicate node name {}", name),
            ));
        }
        nodes.push((name.to_string(), node));
        Ok(())
    }

    fn remove_node(&mut self, node: &Arc<dyn GraphNode>) -> PlatformResult<()> {
        let target = Arc::as_ptr(node) as *const ();
        let removed = {
            let mut nodes = self.graph.nodes.lock();
            let position = nodes
                .iter()
                .position(|(_, existing)| Arc::as_ptr(existing) as *const () == target)
                .ok_or_else(|| PlatformError::NotFound {
                    what: format!("{} in pipeline", node.role()),
                })?;
            nodes.remove(position).1
        };
        if let Some(node) = removed.as_any().downcast_ref::<VirtualNode>() {
            node.disconnect_all();
            node.running.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    fn connect(
        &mut self,
        output: &Arc<dyn ConnectionPoint>,
        input: &Arc<dyn ConnectionPoint>,
    ) -> PlatformResult<()> {
        let (out_pin, in_pin) = self.pins(output, input)?;
        let chosen = out_pin
            .media_types()?
            .into_iter()
            .find(|media_type| in_pin.query_accept(media_type))
            .ok_or_else(|| PlatformError::rejected("Connect", "no common media type"))?;
        Self::link(out_pin, in_pin, chosen);
        Ok(())
    }

    fn connect_direct(
        &mut self,
        output: &Arc<dyn ConnectionPoint>,
        input: &Arc<dyn ConnectionPoint>,
        media_type: Option<&MediaType>,
    ) -> PlatformResult<()> {
        let Some(media_type) = media_type else {
            return self.connect(output, input);
        };
        let (out_pin, in_pin) = self.pins(output, input)?;
        if !out_pin.query_accept(media_type) || !in_pin.query_accept(media_type) {
            return Err(PlatformError::rejected(
                "ConnectDirect",
                format!("{} not accepted", media_type),
            ));
        }
        Self::link(out_pin, in_pin, *media_type);
        Ok(())
    }

    fn run_control(&self) -> PlatformResult<Arc<dyn RunControl>> {
        Ok(Arc::new(VirtualRunControl {
            graph: self.graph.clone(),
        }))
    }
}

struct VirtualRunControl {
    graph: Arc<GraphShared>,
}

impl RunControl for VirtualRunControl {
    fn run(&self) -> PlatformResult<()> {
        *self.graph.state.lock() = RunState::Running;
        self.graph.set_running(true);
        Ok(())
    }

    fn stop(&self) -> PlatformResult<()> {
        *self.graph.state.lock() = RunState::Stopped;
        self.graph.set_running(false);
        Ok(())
    }

    fn state(&self) -> RunState {
        *self.graph.state.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capgraph_core::platform::first_connection_point;

    struct Counter(Mutex<usize>);

    impl SampleCallback for Counter {
        fn on_sample(&self, _sample: &RawSample<'_>) {
            *self.0.lock() += 1;
        }
    }

    fn camera() -> VirtualDeviceSpec {
        VirtualDeviceSpec::camera("Test Cam").with_video_format(Subtype::Yuy2, 640, 480, 15.0, 30.0)
    }

    #[test]
    fn test_enumeration_can_be_disabled() {
        let service = VirtualCaptureService::new();
        service.add_device(camera());
        assert_eq!(service.enumerate_devices(DeviceKind::Video).unwrap().len(), 1);
        assert!(service.enumerate_devices(DeviceKind::Audio).unwrap().is_empty());

        service.set_enumeration_available(false);
        assert!(service.enumerate_devices(DeviceKind::Video).is_err());
    }

    #[test]
    fn test_capability_table_can_be_hidden() {
        let service = VirtualCaptureService::new();
        service.add_device(camera().without_capability_table());
        let moniker = service.enumerate_devices(DeviceKind::Video).unwrap().remove(0);
        let node = moniker.bind().unwrap();
        let pin = first_connection_point(node.as_ref(), PinDirection::Output, false).unwrap();
        let config = pin.as_stream_config().unwrap();
        assert!(config.capabilities().unwrap_err().is_not_implemented());
        assert_eq!(pin.media_types().unwrap().len(), 2);
    }

    #[test]
    fn test_sink_receives_samples_only_while_running() {
        let service = VirtualCaptureService::new();
        service.add_device(camera());
        let mut pipeline = service.create_pipeline().unwrap();

        let source = service.enumerate_devices(DeviceKind::Video).unwrap()[0]
            .bind()
            .unwrap();
        let sink = service.create_node(NodeRole::SampleSink).unwrap();
        pipeline.add_node(source.clone(), "source").unwrap();
        pipeline.add_node(sink.clone(), "sink").unwrap();

        let counter = Arc::new(Counter(Mutex::new(0)));
        sink.as_sample_sink()
            .unwrap()
            .set_callback(Some(counter.clone()))
            .unwrap();

        let out = first_connection_point(source.as_ref(), PinDirection::Output, true).unwrap();
        let input = first_connection_point(sink.as_ref(), PinDirection::Input, true).unwrap();
        pipeline.connect(&out, &input).unwrap();

        assert_eq!(service.push_video_frame(&[0u8; 16], 0, 333_333), 0);
        let control = pipeline.run_control().unwrap();
        control.run().unwrap();
        assert!(service.is_running());
        assert_eq!(service.push_video_frame(&[0u8; 16], 0, 333_333), 1);
        assert_eq!(service.push_audio_buffer(&[0u8; 16], 0, 100), 0);
        assert_eq!(*counter.0.lock(), 1);

        pipeline.remove_node(&sink).unwrap();
        assert!(!out.is_connected());
        assert_eq!(service.push_video_frame(&[0u8; 16], 0, 333_333), 0);
    }

    #[test]
    fn test_decompressor_rejects_other_subtypes() {
        let service = VirtualCaptureService::new();
        let decoder = service
            .create_node(NodeRole::Decompressor(Subtype::Mjpg))
            .unwrap();
        let input = first_connection_point(decoder.as_ref(), PinDirection::Input, false).unwrap();
        assert!(input.query_accept(&MediaType::video(Subtype::Mjpg, 640, 480, 30.0)));
        assert!(!input.query_accept(&MediaType::video(Subtype::Yuy2, 640, 480, 30.0)));
    }

    #[test]
    fn test_set_format_rejection_is_configurable() {
        let service = VirtualCaptureService::new();
        service.add_device(camera().rejecting_set_format(PlatformError::not_implemented("SetFormat")));
        let node = service.enumerate_devices(DeviceKind::Video).unwrap()[0]
            .bind()
            .unwrap();
        let pin = first_connection_point(node.as_ref(), PinDirection::Output, false).unwrap();
        let result = pin
            .as_stream_config()
            .unwrap()
            .set_format(&MediaType::video(Subtype::Yuy2, 640, 480, 30.0));
        assert!(result.unwrap_err().is_not_implemented());
    }
}
