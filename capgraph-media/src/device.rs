//! Capture device controller
//!
//! Owns one device's pipeline for its whole lifetime: negotiation, graph
//! construction, start/stop and teardown, plus the track lists callers select
//! formats from. The two sample bridges are created once and survive every
//! pipeline rebuild; only the nodes are torn down and rebuilt.

use crate::bridge::SampleBridge;
use crate::enumerator::{find_connection, DeviceEnumerator, DeviceInfo, ResolvedConnection};
use crate::graph::{self, GraphBuilder, NodeSlot, PipelineNodes};
use crate::negotiator;
use capgraph_core::error::{CaptureError, CaptureResult};
use capgraph_core::format::{FormatDescriptor, MajorType, MediaType, Subtype, WaveInfo};
use capgraph_core::platform::{
    CaptureService, ConnectionPoint, DeviceKind, DeviceMoniker, GraphNode, NodeRole, PinCategory,
    PinDirection, PipelineContainer, RunControl, RunState, SampleCallback,
};
use capgraph_core::tables::{self, AudioSampleFormat, SampleGeometry};
use capgraph_core::track::{Track, TrackType};
use capgraph_core::VideoResolution;
use capgraph_diagnostics::media_type_logger::log_media_type;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Frame rates closer than this are treated as equal
pub const FRAME_RATE_EPSILON: f32 = 0.01;

/// Controller settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Insert a demultiplexer before the sinks to keep both streams on one clock
    pub use_demultiplexer: bool,
    /// Audio buffer length suggested to the device, in milliseconds
    pub audio_buffer_ms: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            use_demultiplexer: false,
            audio_buffer_ms: 20,
        }
    }
}

/// How the audio companion of a video device is chosen
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AudioDeviceHint {
    /// Pair by the video device's friendly name
    #[default]
    Auto,
    /// No audio
    Disabled,
    /// Audio device with this name
    Named(String),
}

impl AudioDeviceHint {
    /// Parse the user-facing option value
    ///
    /// Absent, empty and `"Auto"` pair automatically; `"None"` disables audio.
    pub fn parse(hint: Option<&str>) -> Self {
        match hint {
            None | Some("") | Some("Auto") => AudioDeviceHint::Auto,
            Some("None") => AudioDeviceHint::Disabled,
            Some(name) => AudioDeviceHint::Named(name.to_string()),
        }
    }
}

/// Lifecycle state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Nothing built yet
    Uninitialized,
    /// Container and run control exist
    GraphBuilt,
    /// Trying device candidates
    Negotiating,
    /// Pipeline connected and running
    Running,
    /// Torn down
    Stopped,
}

/// Connected format as read back from the running pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FormatSnapshot {
    /// Video subtype delivered by the source
    pub subtype: Option<Subtype>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Frame rate
    pub frame_rate: f32,
    /// Audio format delivered to the audio sink
    pub audio: Option<WaveInfo>,
}

impl FormatSnapshot {
    /// Whether no video format is active
    pub fn is_empty(&self) -> bool {
        self.subtype.is_none()
    }

    /// Frame size
    pub fn resolution(&self) -> VideoResolution {
        VideoResolution::new(self.width, self.height)
    }

    /// Sample geometry of the active video format
    pub fn geometry(&self) -> Option<SampleGeometry> {
        tables::sample_geometry(self.subtype?, self.resolution())
    }
}

/// Shared handle to the active format, read by the sample path
pub type ActiveFormat = Arc<RwLock<FormatSnapshot>>;

/// Invoked when a device's track list is (re)filled
pub type TracksUpdatedCallback = Arc<dyn Fn(TrackType, &[Track]) + Send + Sync>;

struct AudioBranch {
    connection: Arc<dyn ConnectionPoint>,
    sink: Arc<dyn GraphNode>,
}

/// Lifecycle owner of one capture device
pub struct CaptureDevice {
    enumerator: DeviceEnumerator,
    config: DeviceConfig,
    state: DeviceState,
    container: Option<Box<dyn PipelineContainer>>,
    run_control: Option<Arc<dyn RunControl>>,
    nodes: PipelineNodes,
    video_connection: Option<Arc<dyn ConnectionPoint>>,
    audio_connection: Option<Arc<dyn ConnectionPoint>>,
    video_bridge: Arc<SampleBridge>,
    audio_bridge: Arc<SampleBridge>,
    active: ActiveFormat,
    url: String,
    video_device: Option<DeviceInfo>,
    audio_device: Option<DeviceInfo>,
    has_audio: bool,
    video_tracks: Vec<Track>,
    audio_tracks: Vec<Track>,
    tracks_updated: Vec<TracksUpdatedCallback>,
}

impl CaptureDevice {
    /// Create a controller over `service`
    pub fn new(service: Arc<dyn CaptureService>, config: DeviceConfig) -> Self {
        Self {
            enumerator: DeviceEnumerator::new(service),
            config,
            state: DeviceState::Uninitialized,
            container: None,
            run_control: None,
            nodes: PipelineNodes::new(),
            video_connection: None,
            audio_connection: None,
            video_bridge: SampleBridge::new("video"),
            audio_bridge: SampleBridge::new("audio"),
            active: Arc::new(RwLock::new(FormatSnapshot::default())),
            url: String::new(),
            video_device: None,
            audio_device: None,
            has_audio: false,
            video_tracks: Vec::new(),
            audio_tracks: Vec::new(),
            tracks_updated: Vec::new(),
        }
    }

    /// Controller settings
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Lifecycle state
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Whether a pipeline is connected
    pub fn is_initialized(&self) -> bool {
        self.state == DeviceState::Running
    }

    /// Whether the pipeline's run control reports running
    pub fn is_running(&self) -> bool {
        self.run_control
            .as_ref()
            .map_or(false, |control| control.state() == RunState::Running)
    }

    /// Url of the device the pipeline was built for
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Bridge fed by the video sink
    pub fn video_bridge(&self) -> &Arc<SampleBridge> {
        &self.video_bridge
    }

    /// Bridge fed by the audio sink
    pub fn audio_bridge(&self) -> &Arc<SampleBridge> {
        &self.audio_bridge
    }

    /// Shared handle to the connected format
    pub fn active_format(&self) -> ActiveFormat {
        self.active.clone()
    }

    /// Copy of the connected format
    pub fn snapshot(&self) -> FormatSnapshot {
        *self.active.read()
    }

    /// Register a tracks-updated callback
    pub fn on_tracks_updated<F>(&mut self, callback: F)
    where
        F: Fn(TrackType, &[Track]) + Send + Sync + 'static,
    {
        self.tracks_updated.push(Arc::new(callback));
    }

    /// Video tracks filled from the device
    pub fn video_tracks(&self) -> &[Track] {
        &self.video_tracks
    }

    /// Audio tracks filled from the paired audio device
    pub fn audio_tracks(&self) -> &[Track] {
        &self.audio_tracks
    }

    /// Whether an audio companion is active
    pub fn has_audio(&self) -> bool {
        self.has_audio
    }

    /// Roles of the nodes in the current pipeline, sink-adjacent first
    pub fn pipeline_roles(&self) -> Vec<NodeRole> {
        self.nodes.roles()
    }

    /// Current frame width
    pub fn width(&self) -> u32 {
        self.active.read().width
    }

    /// Current frame height
    pub fn height(&self) -> u32 {
        self.active.read().height
    }

    /// Current frame rate
    pub fn frame_rate(&self) -> f32 {
        self.active.read().frame_rate
    }

    /// Current video subtype
    pub fn subtype(&self) -> Option<Subtype> {
        self.active.read().subtype
    }

    /// Aspect ratio of the current frame size, reduced by the greatest common divisor
    pub fn aspect_ratio(&self) -> (u32, u32) {
        self.active.read().resolution().aspect_ratio()
    }

    /// Current audio sample rate
    pub fn audio_sample_rate(&self) -> u32 {
        self.active.read().audio.map_or(0, |wave| wave.samples_per_sec)
    }

    /// Current audio channel count
    pub fn audio_channels(&self) -> u16 {
        self.active.read().audio.map_or(0, |wave| wave.channels)
    }

    /// Current audio bit depth
    pub fn audio_bits_per_sample(&self) -> u16 {
        self.active.read().audio.map_or(0, |wave| wave.bits_per_sample)
    }

    /// Current audio sample format
    pub fn audio_sample_format(&self) -> AudioSampleFormat {
        AudioSampleFormat::from_bits(self.audio_bits_per_sample())
    }

    /// Friendly name of the video device
    pub fn video_friendly_name(&self) -> Option<&str> {
        self.video_device.as_ref().map(|device| device.friendly_name.as_str())
    }

    /// Friendly name of the paired audio device
    pub fn audio_friendly_name(&self) -> Option<&str> {
        self.audio_device.as_ref().map(|device| device.friendly_name.as_str())
    }

    /// Fill the video and audio tracks of the device named by `url` without starting capture
    pub fn fill_format_data_from_url(&mut self, url: &str, hint: &AudioDeviceHint) -> bool {
        self.video_tracks.clear();
        self.audio_tracks.clear();
        self.has_audio = false;
        self.audio_device = None;

        let video = match self
            .enumerator
            .resolve_output_connection(url, DeviceKind::Video, MajorType::Video)
        {
            Ok(video) => video,
            Err(e) => {
                debug!("No video formats for {}: {}", url, e);
                return false;
            }
        };

        match negotiator::describe_video_candidates(video.connection.as_ref()) {
            Ok((formats, selected)) => {
                let mut track = Track::unnamed(0);
                track.name = video.device.display_name.clone();
                track.selected_format = selected.or(if formats.is_empty() { None } else { Some(0) });
                track.formats = formats;
                self.video_tracks.push(track);
            }
            Err(e) => warn!("Could not enumerate formats of {}: {}", video.device.display_name, e),
        }
        self.video_device = Some(video.device.clone());

        if let Some(audio) = self.find_audio_companion(&video.device, hint) {
            self.fill_audio_track(&audio);
        }

        info!(
            "📹 {}: {} video format(s), audio {}",
            video.device.display_name,
            self.video_tracks.first().map_or(0, |track| track.formats.len()),
            if self.has_audio { "paired" } else { "disabled" }
        );

        for callback in &self.tracks_updated {
            callback(TrackType::Video, &self.video_tracks);
            if self.has_audio {
                callback(TrackType::Audio, &self.audio_tracks);
            }
        }
        !self.video_tracks.is_empty()
    }

    fn find_audio_companion(
        &self,
        video: &DeviceInfo,
        hint: &AudioDeviceHint,
    ) -> Option<ResolvedConnection> {
        let result = match hint {
            AudioDeviceHint::Disabled => return None,
            AudioDeviceHint::Auto => self.enumerator.find_connection_by_friendly_name_substring(
                DeviceKind::Audio,
                &video.friendly_name,
                true,
            ),
            AudioDeviceHint::Named(name) => self
                .enumerator
                .find_connection_by_friendly_name_substring(DeviceKind::Audio, name, true)
                .or_else(|_| {
                    self.enumerator
                        .resolve_output_connection(name, DeviceKind::Audio, MajorType::Audio)
                }),
        };
        match result {
            Ok(audio) => Some(audio),
            Err(e) => {
                warn!("No audio device paired with {}: {}", video.display_name, e);
                None
            }
        }
    }

    fn fill_audio_track(&mut self, audio: &ResolvedConnection) {
        let formats = match negotiator::describe_audio_candidates(audio.connection.as_ref()) {
            Ok(formats) => formats,
            Err(e) => {
                warn!("Could not enumerate formats of {}: {}", audio.device.display_name, e);
                return;
            }
        };
        if formats.is_empty() {
            warn!("{} offers no 16-bit PCM format", audio.device.display_name);
            return;
        }

        let current = audio
            .connection
            .as_stream_config()
            .and_then(|config| config.format().ok())
            .and_then(|media_type| media_type.wave_info().copied());
        let selected = current
            .and_then(|wave| {
                formats.iter().position(|format| {
                    format.audio_format().map_or(false, |audio| {
                        audio.sample_rate == wave.samples_per_sec
                            && audio.channels == wave.channels
                            && audio.bits_per_sample == wave.bits_per_sample
                    })
                })
            })
            .unwrap_or(0);

        let mut track = Track::unnamed(0);
        track.name = audio.device.display_name.clone();
        track.formats = formats;
        track.selected_format = Some(selected);
        self.audio_tracks.push(track);
        self.audio_device = Some(audio.device.clone());
        self.has_audio = true;
    }

    /// Whether the connected format already matches `format`
    pub fn is_device_set_to_format(&self, format: &FormatDescriptor) -> bool {
        let Some(video) = format.video_format() else {
            return false;
        };
        let active = self.snapshot();
        active.subtype == Some(format.subtype())
            && active.width == video.resolution.width
            && active.height == video.resolution.height
            && (active.frame_rate - video.frame_rate).abs() < FRAME_RATE_EPSILON
    }

    /// Switch the device to `video`, rebuilding the pipeline unless it is already set
    ///
    /// Without an explicit audio format the first audio track format is used.
    pub fn set_format_info(
        &mut self,
        url: &str,
        video: &FormatDescriptor,
        audio: Option<&FormatDescriptor>,
    ) -> bool {
        if self.url == url && self.is_initialized() && self.is_device_set_to_format(video) {
            debug!("{} already running as requested", url);
            return true;
        }

        let audio_format = if self.has_audio {
            audio.cloned().or_else(|| {
                self.audio_tracks
                    .first()
                    .and_then(|track| track.formats.first().cloned())
            })
        } else {
            None
        };
        self.initialize(url, video, audio_format.as_ref())
    }

    /// Build, connect and run a pipeline for the device named by `url`
    ///
    /// Device candidates matching `url` are tried in enumeration order; a
    /// failing candidate is torn down and the next one tried. Returns false
    /// when the pipeline service is unavailable or no candidate succeeds.
    pub fn initialize(
        &mut self,
        url: &str,
        video: &FormatDescriptor,
        audio: Option<&FormatDescriptor>,
    ) -> bool {
        self.stop();

        let service = self.enumerator.service().clone();
        let container = match service.create_pipeline() {
            Ok(container) => container,
            Err(e) => {
                error!("❌ Pipeline service unavailable: {}", e);
                return false;
            }
        };
        let run_control = match container.run_control() {
            Ok(control) => control,
            Err(e) => {
                error!("❌ Pipeline has no run control: {}", e);
                return false;
            }
        };
        self.container = Some(container);
        self.run_control = Some(run_control);
        self.state = DeviceState::GraphBuilt;

        let candidates: Vec<(DeviceInfo, Arc<dyn DeviceMoniker>)> = self
            .enumerator
            .monikers(DeviceKind::Video)
            .into_iter()
            .filter(|(device, _)| device.matches(url))
            .collect();

        for (device, moniker) in candidates {
            self.state = DeviceState::Negotiating;
            match self.try_candidate(&device, moniker.as_ref(), video, audio) {
                Ok(()) => {
                    self.url = url.to_string();
                    self.video_device = Some(device.clone());
                    self.state = DeviceState::Running;
                    info!("🚀 Capture pipeline running for {}", device.display_name);
                    return true;
                }
                Err(e) if e.is_expected() => {
                    debug!("{} skipped: {}", device.display_name, e);
                    self.release_nodes();
                }
                Err(e) => {
                    warn!("{} failed: {}", device.display_name, e);
                    self.release_nodes();
                }
            }
        }

        debug!("No capture device for {} accepted {}", url, video.type_name);
        self.stop();
        false
    }

    fn try_candidate(
        &mut self,
        device: &DeviceInfo,
        moniker: &dyn DeviceMoniker,
        video: &FormatDescriptor,
        audio: Option<&FormatDescriptor>,
    ) -> CaptureResult<()> {
        let service = self.enumerator.service().clone();
        let container = self
            .container
            .as_deref_mut()
            .ok_or_else(|| CaptureError::InvalidState {
                message: "pipeline container missing".to_string(),
            })?;
        let mut builder = GraphBuilder::new(service.as_ref(), container, &mut self.nodes);

        let source = builder.add(NodeSlot::VideoSource, moniker.bind()?)?;
        let connection = find_connection(
            source.as_ref(),
            PinDirection::Output,
            Some(MajorType::Video),
            Some(PinCategory::Capture),
        )
        .ok_or_else(|| CaptureError::ConnectionNotFound {
            what: format!("video capture output on {}", device.display_name),
        })?;

        let resolved = negotiator::resolve_video_format(connection.as_ref(), video)?;
        apply_format(connection.as_ref(), &resolved)?;

        let sink = builder.create(NodeSlot::VideoSink, NodeRole::SampleSink)?;
        sample_sink(&sink)?.set_accepted_type(&MediaType::partial(
            MajorType::Video,
            graph::sink_subtype(resolved.subtype),
        ))?;

        let demux = if self.config.use_demultiplexer {
            Some(builder.create(NodeSlot::Demultiplexer, NodeRole::Demultiplexer)?)
        } else {
            None
        };

        let mut audio_branch = None;
        if let (true, Some(requested), Some(audio_device)) =
            (self.has_audio, audio, self.audio_device.as_ref())
        {
            match build_audio_branch(
                &mut builder,
                &self.enumerator,
                audio_device,
                requested,
                demux.as_ref(),
                &self.audio_bridge,
                self.config.audio_buffer_ms,
            ) {
                Ok(branch) => audio_branch = Some(branch),
                Err(e) => {
                    warn!("Audio disabled for {}: {}", device.display_name, e);
                    builder.release(&[NodeSlot::AudioSink, NodeSlot::AudioSource]);
                    self.has_audio = false;
                    self.audio_tracks.clear();
                }
            }
        }

        builder.route_video(&connection, &resolved, &sink, demux.as_ref())?;

        let callback: Arc<dyn SampleCallback> = self.video_bridge.clone();
        sample_sink(&sink)?.set_callback(Some(callback))?;

        let control = self
            .run_control
            .as_ref()
            .ok_or_else(|| CaptureError::InvalidState {
                message: "run control missing".to_string(),
            })?;
        control.run()?;

        // The device may have substituted its own values for the request.
        let connected = connection.connection_media_type()?;
        log_media_type("Connected video format", &connected);
        let audio_connected = audio_branch
            .as_ref()
            .and_then(|branch| graph::sink_input_type(&branch.sink));
        if let Some(audio_type) = &audio_connected {
            log_media_type("Connected audio format", audio_type);
        }

        let mut snapshot = FormatSnapshot {
            subtype: Some(connected.subtype),
            audio: audio_connected.and_then(|media_type| media_type.wave_info().copied()),
            ..FormatSnapshot::default()
        };
        if let Some(info) = connected.video_info() {
            let size = info.resolution();
            snapshot.width = size.width;
            snapshot.height = size.height;
            snapshot.frame_rate = info.frame_rate() as f32;
        }
        *self.active.write() = snapshot;

        self.video_connection = Some(connection);
        self.audio_connection = audio_branch.map(|branch| branch.connection);
        Ok(())
    }

    /// Run the pipeline
    pub fn start(&mut self) -> bool {
        let Some(control) = self.run_control.as_ref() else {
            return false;
        };
        match control.run() {
            Ok(()) => {
                info!("▶️ Capture pipeline started");
                true
            }
            Err(e) => {
                error!("Failed to start pipeline: {}", e);
                false
            }
        }
    }

    fn release_nodes(&mut self) {
        if let Some(control) = self.run_control.as_ref() {
            if control.state() == RunState::Running {
                if let Err(e) = control.stop() {
                    warn!("Failed to stop pipeline: {}", e);
                }
            }
        }
        for slot in [NodeSlot::VideoSink, NodeSlot::AudioSink] {
            if let Some(sink) = self.nodes.get(slot).and_then(|node| node.as_sample_sink()) {
                let _ = sink.set_callback(None);
            }
        }
        match self.container.as_deref_mut() {
            Some(container) => self.nodes.teardown(container),
            None => self.nodes.clear(),
        };
        self.video_connection = None;
        self.audio_connection = None;
    }

    /// Halt the pipeline, remove every node and reset the connected format
    ///
    /// Safe to call repeatedly.
    pub fn stop(&mut self) {
        let had_pipeline = self.container.is_some() || !self.nodes.is_empty();
        self.release_nodes();
        self.run_control = None;
        self.container = None;
        *self.active.write() = FormatSnapshot::default();
        if self.state != DeviceState::Uninitialized {
            self.state = DeviceState::Stopped;
        }
        if had_pipeline {
            info!("🛑 Capture pipeline stopped");
        }
    }

    /// Update the frame rate of one video format
    ///
    /// Fails when the indices are invalid, when `rate` exceeds the format's
    /// upper bound, or when it is within one frame per second of the current
    /// rate. A failure means nothing changed.
    pub fn request_frame_rate_change(&mut self, track: usize, format: usize, rate: f32) -> bool {
        let Some(descriptor) = self
            .video_tracks
            .get_mut(track)
            .and_then(|track| track.formats.get_mut(format))
        else {
            return false;
        };
        let Some(video) = descriptor.video_format() else {
            return false;
        };
        if video.frame_rates.upper().trunc() < rate.trunc() {
            debug!("{} fps exceeds the {} fps limit", rate, video.frame_rates.upper());
            return false;
        }
        if (video.frame_rate - rate).abs() < 1.0 {
            debug!("Frame rate already {} fps, requested {}", video.frame_rate, rate);
            return false;
        }
        *descriptor = descriptor.with_frame_rate(rate.trunc());
        true
    }

    /// Suggest an audio buffer of `delay_ms` milliseconds to the audio capture output
    pub fn set_audio_buffer(&self, delay_ms: u32) -> bool {
        match &self.audio_connection {
            Some(connection) => suggest_audio_buffer(connection.as_ref(), delay_ms),
            None => false,
        }
    }
}

impl Drop for CaptureDevice {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CaptureDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureDevice")
            .field("state", &self.state)
            .field("url", &self.url)
            .field("nodes", &self.nodes)
            .field("active", &self.snapshot())
            .field("has_audio", &self.has_audio)
            .finish()
    }
}

fn build_audio_branch(
    builder: &mut GraphBuilder<'_>,
    enumerator: &DeviceEnumerator,
    device: &DeviceInfo,
    requested: &FormatDescriptor,
    demux: Option<&Arc<dyn GraphNode>>,
    bridge: &Arc<SampleBridge>,
    buffer_ms: u32,
) -> CaptureResult<AudioBranch> {
    let resolved =
        enumerator.resolve_output_connection(&device.stable_id, DeviceKind::Audio, MajorType::Audio)?;
    builder.add(NodeSlot::AudioSource, resolved.node.clone())?;
    let connection = resolved.connection;

    let media_type = negotiator::resolve_audio_format(connection.as_ref(), requested)?;
    apply_format(connection.as_ref(), &media_type)?;
    suggest_audio_buffer(connection.as_ref(), buffer_ms);

    let sink = builder.create(NodeSlot::AudioSink, NodeRole::SampleSink)?;
    sample_sink(&sink)?.set_accepted_type(&MediaType::partial(MajorType::Audio, media_type.subtype))?;
    let callback: Arc<dyn SampleCallback> = bridge.clone();
    sample_sink(&sink)?.set_callback(Some(callback))?;

    builder.route_audio(&connection, &media_type, &sink, demux)?;
    Ok(AudioBranch { connection, sink })
}

/// Set `media_type` on `connection`; devices without format control are accepted as-is
fn apply_format(connection: &dyn ConnectionPoint, media_type: &MediaType) -> CaptureResult<()> {
    let Some(config) = connection.as_stream_config() else {
        debug!("{} has no format control", connection.name());
        return Ok(());
    };
    match config.set_format(media_type) {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_implemented() => {
            debug!("{} ignores format requests", connection.name());
            Ok(())
        }
        Err(e) => Err(CaptureError::FormatRejected {
            reason: e.to_string(),
        }),
    }
}

fn suggest_audio_buffer(connection: &dyn ConnectionPoint, delay_ms: u32) -> bool {
    let Some(config) = connection.as_stream_config() else {
        return false;
    };
    let Some(wave) = config
        .format()
        .ok()
        .and_then(|media_type| media_type.wave_info().copied())
    else {
        return false;
    };
    let bytes = (wave.avg_bytes_per_sec as u64 * delay_ms as u64 / 1000) as u32;
    match config.suggest_buffer_size(bytes) {
        Ok(()) => {
            debug!("Audio buffer set to {} bytes ({} ms)", bytes, delay_ms);
            true
        }
        Err(e) => {
            debug!("Audio buffer suggestion refused: {}", e);
            false
        }
    }
}

fn sample_sink(node: &Arc<dyn GraphNode>) -> CaptureResult<&dyn capgraph_core::SampleSink> {
    node.as_sample_sink()
        .ok_or_else(|| CaptureError::GraphConstruction {
            stage: node.role().to_string(),
            reason: "node has no sample sink capability".to_string(),
        })
}
