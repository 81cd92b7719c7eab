//! Track/session coordinator
//!
//! A [`CaptureSession`] owns the device controller of one open capture source,
//! mirrors the controller's tracks for the front-end and turns raw samples
//! delivered by the sample bridges into typed samples on bounded queues.
//!
//! Two locks guard the session. The device lock serializes pipeline work
//! (open, format changes, teardown) and may be held across slow platform
//! calls. The state lock guards tracks, selections, queues and flags and is
//! only ever held briefly. When both are needed the device lock is taken
//! first. The sample path takes only the state lock, so delivery never waits
//! on a pipeline rebuild.

use crate::config::{MediaOptions, PlayerConfig, QueueDepths};
use crate::event::MediaEvent;
use bytes::Bytes;
use capgraph_core::{
    AudioSample, AudioSampleFormat, CaptionSample, CaptureService, EnqueueOutcome, FormatDescriptor,
    FormatParams, FrameRateRange, MetadataSample, NodeRole, RawSample, SampleQueue, TimeRange,
    Timespan, Track, TrackType, VideoResolution, VideoSample, TICKS_PER_SECOND,
};
use capgraph_media::{ActiveFormat, CaptureDevice, FormatSnapshot};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::ops::RangeInclusive;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Frame rate assumed when the device reports none
const FALLBACK_FRAME_RATE: f64 = 30.0;

/// Rates below this are treated as zero
const RATE_EPSILON: f32 = 1e-4;

/// Transport state reported to the front-end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerState {
    /// No media source
    Closed,
    /// Media source open, waiting for the first frames
    Preparing,
    /// Samples are being delivered at rate 1
    Playing,
    /// Rate is zero
    Paused,
    /// Pipeline is being rebuilt; samples are dropped
    Stopped,
    /// Unrecoverable failure
    Error,
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlayerState::Closed => "Closed",
            PlayerState::Preparing => "Preparing",
            PlayerState::Playing => "Playing",
            PlayerState::Paused => "Paused",
            PlayerState::Stopped => "Stopped",
            PlayerState::Error => "Error",
        };
        f.write_str(name)
    }
}

/// Transport controls a front-end may ask about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaControl {
    /// Pause playback
    Pause,
    /// Resume playback
    Resume,
    /// Scrub the timeline
    Scrub,
    /// Seek to a time
    Seek,
}

/// Pending notifications read by the player on every fetch tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags {
    /// A different media source was opened
    pub media_source_changed: bool,
    /// A track or format selection changed
    pub selection_changed: bool,
}

impl SessionFlags {
    /// Whether any flag is set
    pub fn any(&self) -> bool {
        self.media_source_changed || self.selection_changed
    }
}

/// Video format as reported to the front-end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoTrackFormat {
    /// Output dimensions
    pub dim: VideoResolution,
    /// Frame rate the device is delivering
    pub frame_rate: f32,
    /// Supported frame rates
    pub frame_rates: FrameRateRange,
    /// Subtype name
    pub type_name: String,
}

/// Audio format as reported to the front-end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrackFormat {
    /// Bits per sample
    pub bits_per_sample: u16,
    /// Channel count
    pub channels: u16,
    /// Samples per second
    pub sample_rate: u32,
    /// Subtype name
    pub type_name: String,
}

#[derive(Debug)]
struct SessionState {
    url: String,
    audio_device_name: String,
    has_device: bool,
    device_ready: bool,
    active: Option<ActiveFormat>,
    video_tracks: Vec<Track>,
    audio_tracks: Vec<Track>,
    caption_tracks: Vec<Track>,
    metadata_tracks: Vec<Track>,
    selected_video: Option<usize>,
    selected_audio: Option<usize>,
    selected_caption: Option<usize>,
    selected_metadata: Option<usize>,
    video_queue: SampleQueue<VideoSample>,
    audio_queue: SampleQueue<AudioSample>,
    caption_queue: SampleQueue<CaptionSample>,
    metadata_queue: SampleQueue<MetadataSample>,
    player_state: PlayerState,
    rate: f32,
    current_time: Timespan,
    target_time: Timespan,
    looping: bool,
    flags: SessionFlags,
    is_initializing: bool,
    shutting_down: bool,
    deferred_events: VecDeque<MediaEvent>,
    opened_at: Option<DateTime<Utc>>,
}

impl SessionState {
    fn new(depths: &QueueDepths) -> Self {
        Self {
            url: String::new(),
            audio_device_name: String::new(),
            has_device: false,
            device_ready: false,
            active: None,
            video_tracks: Vec::new(),
            audio_tracks: Vec::new(),
            caption_tracks: Vec::new(),
            metadata_tracks: Vec::new(),
            selected_video: None,
            selected_audio: None,
            selected_caption: None,
            selected_metadata: None,
            video_queue: SampleQueue::new(depths.video),
            audio_queue: SampleQueue::new(depths.audio),
            caption_queue: SampleQueue::new(depths.caption),
            metadata_queue: SampleQueue::new(depths.metadata),
            player_state: PlayerState::Closed,
            rate: 0.0,
            current_time: Timespan::ZERO,
            target_time: Timespan::ZERO,
            looping: false,
            flags: SessionFlags::default(),
            is_initializing: false,
            shutting_down: false,
            deferred_events: VecDeque::new(),
            opened_at: None,
        }
    }

    fn tracks(&self, track_type: TrackType) -> &[Track] {
        match track_type {
            TrackType::Video => &self.video_tracks,
            TrackType::Audio => &self.audio_tracks,
            TrackType::Caption => &self.caption_tracks,
            TrackType::Metadata => &self.metadata_tracks,
        }
    }

    fn tracks_mut(&mut self, track_type: TrackType) -> &mut Vec<Track> {
        match track_type {
            TrackType::Video => &mut self.video_tracks,
            TrackType::Audio => &mut self.audio_tracks,
            TrackType::Caption => &mut self.caption_tracks,
            TrackType::Metadata => &mut self.metadata_tracks,
        }
    }

    fn selected_mut(&mut self, track_type: TrackType) -> &mut Option<usize> {
        match track_type {
            TrackType::Video => &mut self.selected_video,
            TrackType::Audio => &mut self.selected_audio,
            TrackType::Caption => &mut self.selected_caption,
            TrackType::Metadata => &mut self.selected_metadata,
        }
    }

    fn track(&self, track_type: TrackType, index: usize) -> Option<&Track> {
        self.tracks(track_type).get(index)
    }

    fn snapshot(&self) -> Option<FormatSnapshot> {
        self.active.as_ref().map(|active| *active.read())
    }

    fn flush_queues(&mut self) {
        self.video_queue.flush();
        self.audio_queue.flush();
        self.caption_queue.flush();
        self.metadata_queue.flush();
    }

    fn apply_rate(&mut self, rate: f32) {
        self.rate = rate;
        if rate.abs() < RATE_EPSILON {
            self.player_state = PlayerState::Paused;
            self.deferred_events.push_back(MediaEvent::PlaybackSuspended);
        } else {
            self.player_state = PlayerState::Playing;
            self.deferred_events.push_back(MediaEvent::PlaybackResumed);
        }
    }

    fn reset(&mut self) {
        self.player_state = PlayerState::Closed;
        self.url.clear();
        self.audio_device_name.clear();
        self.has_device = false;
        self.device_ready = false;
        self.active = None;
        self.flush_queues();
        self.video_tracks.clear();
        self.audio_tracks.clear();
        self.caption_tracks.clear();
        self.metadata_tracks.clear();
        self.selected_video = None;
        self.selected_audio = None;
        self.selected_caption = None;
        self.selected_metadata = None;
        self.current_time = Timespan::ZERO;
        self.flags = SessionFlags::default();
        self.opened_at = None;
    }
}

/// Coordinator between one capture device controller and the player front-end
pub struct CaptureSession {
    id: Uuid,
    service: Arc<dyn CaptureService>,
    config: PlayerConfig,
    device: Mutex<Option<CaptureDevice>>,
    state: Mutex<SessionState>,
}

impl CaptureSession {
    /// Create a closed session over `service`
    pub fn new(service: Arc<dyn CaptureService>, config: PlayerConfig) -> Arc<Self> {
        let state = SessionState::new(&config.queue_depths);
        Arc::new(Self {
            id: Uuid::new_v4(),
            service,
            config,
            device: Mutex::new(None),
            state: Mutex::new(state),
        })
    }

    /// Session identifier used in logs
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Session configuration
    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Url of the open device, empty when closed
    pub fn url(&self) -> String {
        self.state.lock().url.clone()
    }

    /// When the current media source finished opening
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().opened_at
    }

    /// Whether a device controller is installed
    pub fn has_device(&self) -> bool {
        self.state.lock().has_device
    }

    /// Whether an open is in progress
    pub fn is_initializing(&self) -> bool {
        self.state.lock().is_initializing
    }

    /// Roles of the nodes in the live pipeline
    pub fn pipeline_roles(&self) -> Vec<NodeRole> {
        self.device
            .lock()
            .as_ref()
            .map(|device| device.pipeline_roles())
            .unwrap_or_default()
    }

    /// Format the running pipeline delivers
    pub fn active_format(&self) -> Option<FormatSnapshot> {
        self.state.lock().snapshot()
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Whether opening `url` with `options` would reproduce the current session
    ///
    /// An empty url always counts as a duplicate. Otherwise the url and audio
    /// device name must match the open ones, and the requested track and
    /// format must already be selected at the requested frame rate.
    pub fn is_duplicate_initialize(&self, url: &str, options: &MediaOptions) -> bool {
        if url.is_empty() {
            return true;
        }

        let state = self.state.lock();
        if state.url != url || state.audio_device_name != options.audio_device_key() {
            return false;
        }

        let track_index = options.video_track_index;
        let Some(format_index) = options.video_format_index else {
            return false;
        };
        let Some(track) = state.video_tracks.get(track_index) else {
            return false;
        };
        let Some(video) = track.format(format_index).and_then(|format| format.video_format()) else {
            return false;
        };
        if state.selected_video != Some(track_index) || track.selected_format != Some(format_index) {
            return false;
        }

        let current = state
            .snapshot()
            .map(|active| active.frame_rate)
            .unwrap_or(video.frame_rate);
        let requested = options
            .requested_frame_rate()
            .unwrap_or_else(|| video.frame_rates.upper());
        (current - requested).abs() < capgraph_media::device::FRAME_RATE_EPSILON
    }

    /// Open the device named by `url`
    ///
    /// Replaces any open device, fills its tracks and starts capture with the
    /// format requested in `options`, falling back to the first format.
    /// Returns false and queues [`MediaEvent::MediaOpenFailed`] followed by
    /// [`MediaEvent::MediaClosed`] when nothing could be opened.
    pub fn initialize(self: &Arc<Self>, url: &str, options: &MediaOptions) -> bool {
        if self.is_duplicate_initialize(url, options) {
            debug!("Session {}: {} already open as requested", self.id, url);
            return true;
        }

        let mut device_slot = self.device.lock();
        {
            let mut state = self.state.lock();
            state.is_initializing = true;
            state.shutting_down = false;
            state.device_ready = false;
            state.active = None;
            state.url = url.to_string();
            state.audio_device_name = options.audio_device_key().to_string();
            state.flags = SessionFlags {
                media_source_changed: true,
                selection_changed: true,
            };
            state.flush_queues();
            state.video_tracks.clear();
            state.audio_tracks.clear();
            state.selected_video = None;
            state.selected_audio = None;
        }
        // Dropping the previous controller tears its pipeline down
        *device_slot = None;

        let mut device = CaptureDevice::new(self.service.clone(), self.config.device.clone());
        self.bind_device(&mut device);
        device.fill_format_data_from_url(url, &options.audio_hint());

        let (requested, first) = {
            let mut state = self.state.lock();
            state.active = Some(device.active_format());
            state.has_device = true;
            let requested = Self::requested_format(&mut state, options);
            let first = state
                .video_tracks
                .first()
                .and_then(|track| track.formats.first().cloned());
            (requested, first)
        };

        let Some(first) = first else {
            drop(device);
            warn!("Session {}: {} has no video formats", self.id, url);
            self.finish_initialize();
            self.close_device(&mut device_slot);
            self.queue_open_failure();
            return false;
        };

        let mut opened = match &requested {
            Some(format) => device.set_format_info(url, format, None),
            None => false,
        };
        if !opened {
            if requested.is_some() {
                error!(
                    "Session {}: requested format failed, opening the first format instead",
                    self.id
                );
            }
            opened = device.set_format_info(url, &first, None);
            if opened {
                if let Some(track) = self.state.lock().video_tracks.first_mut() {
                    track.selected_format = Some(0);
                }
            }
        }

        // Completion is recorded under the device lock so a queued open
        // cannot start before this one is settled
        *device_slot = Some(device);
        if self.finish_initialize() {
            debug!("Session {}: running shutdown deferred during open", self.id);
            self.close_device(&mut device_slot);
            return false;
        }
        if !opened {
            error!("Session {}: failed to open {}", self.id, url);
            self.close_device(&mut device_slot);
            self.queue_open_failure();
            return false;
        }

        let mut state = self.state.lock();
        if let Some(device) = device_slot.as_ref() {
            self.sync_audio_tracks(&mut state, device);
        }
        state.device_ready = true;
        state.opened_at = Some(Utc::now());
        state.apply_rate(0.0);
        state.player_state = PlayerState::Preparing;
        state.deferred_events.push_back(MediaEvent::MediaOpened);
        info!("📹 Session {} opened {}", self.id, url);
        true
    }

    /// Tear down the device and reset every track, queue and flag
    ///
    /// While an open is in progress the teardown is deferred until it finishes.
    pub fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            state.shutting_down = true;
            if state.is_initializing {
                debug!("Session {}: shutdown deferred until open finishes", self.id);
                return;
            }
        }

        self.close_device(&mut self.device.lock());
    }

    /// Drop the controller held in `device_slot` and reset the session
    ///
    /// The caller holds the device lock.
    fn close_device(&self, device_slot: &mut Option<CaptureDevice>) {
        let device = device_slot.take();
        let had_device = device.is_some();
        drop(device);

        self.state.lock().reset();
        if had_device {
            info!("🛑 Session {} closed", self.id);
        }
    }

    /// Drop audio tracks the controller disabled while building its pipeline
    fn sync_audio_tracks(&self, state: &mut SessionState, device: &CaptureDevice) {
        if device.has_audio() || state.audio_tracks.is_empty() {
            return;
        }
        warn!(
            "Session {}: audio disabled by the device, dropping {} audio track(s)",
            self.id,
            state.audio_tracks.len()
        );
        state.audio_tracks.clear();
        state.selected_audio = None;
        state.audio_queue.flush();
        state.flags.media_source_changed = true;
    }

    /// Queue an event for the next input tick
    pub(crate) fn queue_event(&self, event: MediaEvent) {
        self.state.lock().deferred_events.push_back(event);
    }

    /// Report an open in progress before the background task starts
    pub(crate) fn mark_preparing(&self) {
        self.state.lock().player_state = PlayerState::Preparing;
    }

    fn queue_open_failure(&self) {
        let mut state = self.state.lock();
        state.player_state = PlayerState::Closed;
        state.deferred_events.push_back(MediaEvent::MediaOpenFailed);
        state.deferred_events.push_back(MediaEvent::MediaClosed);
    }

    fn finish_initialize(&self) -> bool {
        let mut state = self.state.lock();
        state.is_initializing = false;
        state.shutting_down
    }

    fn requested_format(state: &mut SessionState, options: &MediaOptions) -> Option<FormatDescriptor> {
        let format_index = options.video_format_index?;
        let track_index = options.video_track_index;
        let track = state.video_tracks.get_mut(track_index)?;
        let format = track.format(format_index)?.clone();
        let upper = format.video_format()?.frame_rates.upper();
        track.selected_format = Some(format_index);
        Some(format.with_frame_rate(options.requested_frame_rate().unwrap_or(upper)))
    }

    fn bind_device(self: &Arc<Self>, device: &mut CaptureDevice) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let session = weak.clone();
        device.video_bridge().set_listener(move |sample| {
            if let Some(session) = session.upgrade() {
                session.on_video_sample(sample);
            }
        });

        let session = weak.clone();
        device.audio_bridge().set_listener(move |sample| {
            if let Some(session) = session.upgrade() {
                session.on_audio_sample(sample);
            }
        });

        device.on_tracks_updated(move |track_type, tracks| {
            if let Some(session) = weak.upgrade() {
                session.on_tracks_updated(track_type, tracks);
            }
        });
    }

    fn on_tracks_updated(&self, track_type: TrackType, tracks: &[Track]) {
        let mut state = self.state.lock();
        *state.tracks_mut(track_type) = tracks.to_vec();
        let selected = if tracks.is_empty() { None } else { Some(0) };
        *state.selected_mut(track_type) = selected;
        debug!(
            "Session {}: {} {} track(s), selected format {:?}",
            self.id,
            tracks.len(),
            track_type,
            tracks.first().and_then(|track| track.selected_format)
        );
    }

    // ========================================================================
    // TRACKS
    // ========================================================================

    /// Number of tracks of `track_type`; zero without a device
    pub fn num_tracks(&self, track_type: TrackType) -> usize {
        let state = self.state.lock();
        if !state.has_device {
            return 0;
        }
        state.tracks(track_type).len()
    }

    /// Number of formats of one track; zero without a device
    pub fn num_track_formats(&self, track_type: TrackType, track: usize) -> usize {
        let state = self.state.lock();
        if !state.has_device {
            return 0;
        }
        state
            .track(track_type, track)
            .map(|track| track.formats.len())
            .unwrap_or(0)
    }

    /// Selected track of `track_type`
    pub fn selected_track(&self, track_type: TrackType) -> Option<usize> {
        let mut state = self.state.lock();
        if !state.has_device {
            return None;
        }
        *state.selected_mut(track_type)
    }

    /// Display name of one track
    pub fn track_display_name(&self, track_type: TrackType, track: usize) -> Option<String> {
        self.with_track(track_type, track, |track| track.display_name.clone())
    }

    /// Language of one track
    pub fn track_language(&self, track_type: TrackType, track: usize) -> Option<String> {
        self.with_track(track_type, track, |track| track.language.clone())
    }

    /// Internal name of one track
    pub fn track_name(&self, track_type: TrackType, track: usize) -> Option<String> {
        self.with_track(track_type, track, |track| track.name.clone())
    }

    /// Selected format index of one track
    pub fn track_format(&self, track_type: TrackType, track: usize) -> Option<usize> {
        self.with_track(track_type, track, |track| track.selected_format)
            .flatten()
    }

    /// Copy of one track
    pub fn track(&self, track_type: TrackType, track: usize) -> Option<Track> {
        self.with_track(track_type, track, Track::clone)
    }

    fn with_track<T>(
        &self,
        track_type: TrackType,
        track: usize,
        read: impl FnOnce(&Track) -> T,
    ) -> Option<T> {
        let state = self.state.lock();
        if !state.has_device {
            return None;
        }
        state.track(track_type, track).map(read)
    }

    /// One video format, with the frame rate the device is delivering
    pub fn video_track_format(&self, track: usize, format: usize) -> Option<VideoTrackFormat> {
        let state = self.state.lock();
        if !state.has_device {
            return None;
        }
        let descriptor = state.video_tracks.get(track)?.format(format)?;
        let video = descriptor.video_format()?;
        let frame_rate = state
            .snapshot()
            .map(|active| active.frame_rate)
            .filter(|rate| *rate > 0.0)
            .unwrap_or(video.frame_rate);
        Some(VideoTrackFormat {
            dim: video.resolution,
            frame_rate,
            frame_rates: video.frame_rates,
            type_name: descriptor.type_name.clone(),
        })
    }

    /// One audio format; unavailable while the session is preparing
    pub fn audio_track_format(&self, track: usize, format: usize) -> Option<AudioTrackFormat> {
        let state = self.state.lock();
        if !state.has_device || state.player_state == PlayerState::Preparing {
            return None;
        }
        let descriptor = state.audio_tracks.get(track)?.format(format)?;
        let audio = descriptor.audio_format()?;
        Some(AudioTrackFormat {
            bits_per_sample: audio.bits_per_sample,
            channels: audio.channels,
            sample_rate: audio.sample_rate,
            type_name: descriptor.type_name.clone(),
        })
    }

    /// Select a track; only the first track of each type can be selected
    pub fn select_track(&self, track_type: TrackType, track: usize) -> bool {
        let mut state = self.state.lock();
        if !state.has_device {
            return false;
        }
        if *state.selected_mut(track_type) == Some(track) {
            return true;
        }
        if track >= state.tracks(track_type).len() {
            return false;
        }
        if track > 0 {
            error!(
                "Session {}: only one {} track can be selected",
                self.id, track_type
            );
            return false;
        }
        *state.selected_mut(track_type) = Some(track);
        true
    }

    /// Switch one track to the format at `format`, rebuilding the pipeline
    ///
    /// A failed rebuild shuts the session down.
    pub fn set_track_format(&self, track_type: TrackType, track: usize, format: usize) -> bool {
        debug!(
            "Session {}: setting {} track {} to format {}",
            self.id, track_type, track, format
        );

        let mut device_slot = self.device.lock();
        let Some(device) = device_slot.as_mut() else {
            return false;
        };
        if track_type == TrackType::Audio && !device.has_audio() {
            debug!("Session {}: audio is disabled on this device", self.id);
            return false;
        }

        let (url, descriptor, video_format) = {
            let mut state = self.state.lock();
            let Some(selected) = state.track(track_type, track) else {
                return false;
            };
            if selected.selected_format == Some(format) {
                return true;
            }
            let Some(descriptor) = selected.format(format).cloned() else {
                return false;
            };
            let video_format = state
                .video_tracks
                .get(state.selected_video.unwrap_or(0))
                .and_then(|track| track.selected().cloned());

            state.player_state = PlayerState::Stopped;
            state.video_queue.flush();
            state.audio_queue.flush();
            (state.url.clone(), descriptor, video_format)
        };

        let applied = match (track_type, video_format) {
            (TrackType::Video, _) => device.set_format_info(&url, &descriptor, None),
            (TrackType::Audio, Some(video)) => device.initialize(&url, &video, Some(&descriptor)),
            _ => false,
        };
        if !applied {
            error!(
                "Session {}: failed to apply format {} to {} track {}",
                self.id, format, track_type, track
            );
            self.close_device(&mut device_slot);
            return false;
        }

        let mut state = self.state.lock();
        self.sync_audio_tracks(&mut state, device);
        state.active = Some(device.active_format());
        state.player_state = if state.rate.abs() < RATE_EPSILON {
            PlayerState::Paused
        } else {
            PlayerState::Playing
        };
        if let Some(updated) = state.tracks_mut(track_type).get_mut(track) {
            updated.selected_format = Some(format);
        }
        state.flags.selection_changed = true;
        true
    }

    /// Change the frame rate of one video format
    ///
    /// When the format is the selected one, the pipeline is rebuilt at the new rate.
    pub fn set_video_track_frame_rate(&self, track: usize, format: usize, frame_rate: f32) -> bool {
        let mut device_slot = self.device.lock();
        let Some(device) = device_slot.as_mut() else {
            return false;
        };
        if self
            .state
            .lock()
            .video_tracks
            .get(track)
            .and_then(|track| track.format(format))
            .is_none()
        {
            return false;
        }

        if !device.request_frame_rate_change(track, format, frame_rate) {
            return false;
        }

        let reselect = {
            let mut state = self.state.lock();
            match state.video_tracks.get_mut(track) {
                Some(video) => {
                    if let Some(descriptor) = video.formats.get_mut(format) {
                        *descriptor = descriptor.with_frame_rate(frame_rate);
                    }
                    if video.selected_format == Some(format) {
                        // Forces the rebuild past the same-format check
                        video.selected_format = None;
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };
        drop(device_slot);

        if reselect {
            self.set_track_format(TrackType::Video, track, format);
        }
        true
    }

    // ========================================================================
    // TRANSPORT
    // ========================================================================

    /// Transport state
    pub fn state(&self) -> PlayerState {
        self.state.lock().player_state
    }

    /// Current playback rate
    pub fn rate(&self) -> f32 {
        self.state.lock().rate
    }

    /// Set the playback rate; zero pauses
    pub fn set_rate(&self, rate: f32) -> bool {
        self.state.lock().apply_rate(rate);
        true
    }

    /// Whether `control` is currently possible
    pub fn can_control(&self, control: MediaControl) -> bool {
        let state = self.state.lock();
        if !state.has_device {
            return false;
        }
        match control {
            MediaControl::Pause => state.player_state == PlayerState::Playing,
            MediaControl::Resume => state.player_state != PlayerState::Playing,
            MediaControl::Scrub | MediaControl::Seek => true,
        }
    }

    /// Rates the session accepts
    pub fn supported_rates(&self) -> RangeInclusive<f32> {
        0.0..=1.0
    }

    /// Time of the newest video sample
    pub fn time(&self) -> Timespan {
        self.state.lock().current_time
    }

    /// Time the front-end last asked for
    pub fn target_time(&self) -> Timespan {
        self.state.lock().target_time
    }

    /// Live sources cannot seek
    pub fn seek(&self, _time: Timespan) -> bool {
        false
    }

    /// Whether looping was requested
    pub fn is_looping(&self) -> bool {
        self.state.lock().looping
    }

    /// Record the looping flag; it has no effect on a live source
    pub fn set_looping(&self, looping: bool) -> bool {
        self.state.lock().looping = looping;
        true
    }

    /// Live sources have no duration
    pub fn duration(&self) -> Timespan {
        Timespan::ZERO
    }

    /// Record the front-end's clock
    pub fn tick_input(&self, _delta: Timespan, timecode: Timespan) {
        self.state.lock().target_time = timecode;
        trace!("Session {}: timecode {}", self.id, timecode);
    }

    /// Drain the events queued since the last call
    pub fn take_events(&self) -> Vec<MediaEvent> {
        self.state.lock().deferred_events.drain(..).collect()
    }

    /// Pending notification flags
    pub fn flags(&self) -> SessionFlags {
        self.state.lock().flags
    }

    /// Clear the notification flags
    pub fn clear_flags(&self) {
        self.state.lock().flags = SessionFlags::default();
    }

    // ========================================================================
    // SAMPLES
    // ========================================================================

    /// Dequeue the oldest video frame if it overlaps `range`
    pub fn fetch_video(&self, range: &TimeRange) -> Option<VideoSample> {
        self.state.lock().video_queue.fetch(range)
    }

    /// Dequeue the oldest audio buffer if it overlaps `range`
    pub fn fetch_audio(&self, range: &TimeRange) -> Option<AudioSample> {
        self.state.lock().audio_queue.fetch(range)
    }

    /// Dequeue the oldest caption if it overlaps `range`
    pub fn fetch_caption(&self, range: &TimeRange) -> Option<CaptionSample> {
        self.state.lock().caption_queue.fetch(range)
    }

    /// Dequeue the oldest metadata sample if it overlaps `range`
    pub fn fetch_metadata(&self, range: &TimeRange) -> Option<MetadataSample> {
        self.state.lock().metadata_queue.fetch(range)
    }

    /// Drop every queued sample
    pub fn flush_samples(&self) {
        self.state.lock().flush_queues();
    }

    /// Number of samples waiting in the queue of `track_type`
    pub fn queued_samples(&self, track_type: TrackType) -> usize {
        let state = self.state.lock();
        match track_type {
            TrackType::Video => state.video_queue.len(),
            TrackType::Audio => state.audio_queue.len(),
            TrackType::Caption => state.caption_queue.len(),
            TrackType::Metadata => state.metadata_queue.len(),
        }
    }

    /// Turn a raw video buffer into a frame on the video queue
    ///
    /// Frames are dropped while no pipeline is running, while the pipeline is
    /// being rebuilt, and when the active subtype has no output layout.
    pub fn on_video_sample(&self, sample: &RawSample<'_>) {
        let mut state = self.state.lock();
        if !state.device_ready || state.player_state == PlayerState::Stopped {
            return;
        }
        let Some(active) = state.snapshot() else {
            return;
        };
        let Some(geometry) = active.geometry() else {
            trace!("Session {}: dropping frame of unsupported subtype", self.id);
            return;
        };

        let mut duration =
            Timespan::from_ticks(sample.stop_time) - Timespan::from_ticks(sample.start_time);
        if duration.ticks() <= 0 {
            let frame_rate = if active.frame_rate > 0.0 {
                active.frame_rate as f64
            } else {
                FALLBACK_FRAME_RATE
            };
            duration = Timespan::from_frame_rate(frame_rate);
        }
        let time = Timespan::from_seconds(sample.sample_time);
        state.current_time = time;

        let frame = VideoSample {
            buffer: Bytes::copy_from_slice(sample.buffer),
            dim: geometry.buffer_dim,
            output_dim: geometry.output_dim,
            layout: geometry.layout,
            stride: geometry.stride,
            time,
            duration,
        };
        if let EnqueueOutcome::Flushed { dropped } = state.video_queue.enqueue(frame) {
            trace!("Session {}: video queue full, flushed {}", self.id, dropped);
        }
    }

    /// Turn a raw audio buffer into a sample on the audio queue
    pub fn on_audio_sample(&self, sample: &RawSample<'_>) {
        let mut state = self.state.lock();
        if !state.device_ready || state.player_state == PlayerState::Stopped {
            return;
        }
        let Some(wave) = state.snapshot().and_then(|active| active.audio) else {
            return;
        };

        let mut duration =
            Timespan::from_ticks(sample.stop_time) - Timespan::from_ticks(sample.start_time);
        if duration.ticks() <= 0 {
            let bytes_per_second = wave.samples_per_sec as i64
                * wave.channels as i64
                * (wave.bits_per_sample as i64 / 8);
            if bytes_per_second > 0 {
                duration = Timespan::from_ticks(
                    sample.buffer.len() as i64 * TICKS_PER_SECOND / bytes_per_second,
                );
            }
        }

        let buffer = AudioSample {
            buffer: Bytes::copy_from_slice(sample.buffer),
            channels: wave.channels,
            sample_rate: wave.samples_per_sec,
            sample_format: AudioSampleFormat::from_bits(wave.bits_per_sample),
            time: Timespan::from_seconds(sample.sample_time),
            duration,
        };
        if let EnqueueOutcome::Flushed { dropped } = state.audio_queue.enqueue(buffer) {
            trace!("Session {}: audio queue full, flushed {}", self.id, dropped);
        }
    }

    /// Queue a caption overlay
    pub fn ingest_caption(&self, text: &str, time: Timespan, duration: Timespan) {
        let mut state = self.state.lock();
        if !state.has_device {
            return;
        }
        let caption = CaptionSample {
            text: text.to_string(),
            time,
            duration,
        };
        if let EnqueueOutcome::Flushed { dropped } = state.caption_queue.enqueue(caption) {
            debug!("Session {}: caption queue full, flushed {}", self.id, dropped);
        }
    }

    /// Queue a binary metadata sample
    pub fn ingest_metadata(&self, data: &[u8], time: Timespan, duration: Timespan) {
        let mut state = self.state.lock();
        if !state.has_device {
            return;
        }
        let metadata = MetadataSample {
            data: Bytes::copy_from_slice(data),
            time,
            duration,
        };
        if let EnqueueOutcome::Flushed { dropped } = state.metadata_queue.enqueue(metadata) {
            debug!("Session {}: metadata queue full, flushed {}", self.id, dropped);
        }
    }

    // ========================================================================
    // STATS
    // ========================================================================

    /// Append a text report of the audio and video tracks to `out`
    pub fn append_stats(&self, out: &mut String) {
        let state = self.state.lock();
        append_track_stats(out, "Audio Tracks", &state.audio_tracks);
        append_track_stats(out, "Video Tracks", &state.video_tracks);
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CaptureSession")
            .field("id", &self.id)
            .field("url", &state.url)
            .field("state", &state.player_state)
            .field("video_tracks", &state.video_tracks.len())
            .field("audio_tracks", &state.audio_tracks.len())
            .finish()
    }
}

fn append_track_stats(out: &mut String, heading: &str, tracks: &[Track]) {
    let _ = writeln!(out, "{}", heading);
    if tracks.is_empty() {
        out.push_str("\tnone\n");
        return;
    }
    for track in tracks {
        let _ = writeln!(out, "\t{}", track.display_name);
        for (index, format) in track.formats.iter().enumerate() {
            let marker = if track.selected_format == Some(index) { "*" } else { " " };
            let _ = writeln!(out, "\t\t{}{}", marker, describe_format(format));
        }
    }
}

/// One-line summary of a track format
pub fn describe_format(format: &FormatDescriptor) -> String {
    match &format.params {
        FormatParams::Video(video) => format!(
            "{} {}x{} @ {:.2} fps ({:.2}-{:.2})",
            format.type_name,
            video.resolution.width,
            video.resolution.height,
            video.frame_rate,
            video.frame_rates.min,
            video.frame_rates.max
        ),
        FormatParams::Audio(audio) => format!(
            "{} {} Hz, {} ch, {} bit",
            format.type_name, audio.sample_rate, audio.channels, audio.bits_per_sample
        ),
    }
}
