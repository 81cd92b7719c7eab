//! Player front-end surface
//!
//! [`CapturePlayer`] is what a media framework drives: it opens capture urls
//! on a background task, forwards session events on input ticks and hands
//! out samples on fetch ticks.

use crate::config::{MediaOptions, PlayerConfig};
use crate::event::{event_channel, EventSender, EventStream, MediaEvent};
use crate::session::{CaptureSession, MediaControl, PlayerState};
use crate::CaptureRuntime;
use capgraph_core::{
    AudioSample, CaptionSample, CaptureService, DeviceKind, MetadataSample, TimeRange, Timespan,
    TrackType, VideoSample,
};
use capgraph_media::DeviceEnumerator;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Name the player reports to the media framework
pub const PLAYER_NAME: &str = "CapgraphCapture";

/// Capture device offered to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureDeviceEntry {
    /// Name shown to users
    pub display_name: String,
    /// Url to pass to [`CapturePlayer::open`]
    pub url: String,
}

/// Capture player driven by a media framework
pub struct CapturePlayer {
    session: Arc<CaptureSession>,
    enumerator: DeviceEnumerator,
    handle: Handle,
    events_tx: EventSender,
    events: Mutex<Option<EventStream>>,
    url: Mutex<String>,
    open_task: Mutex<Option<JoinHandle<bool>>>,
    _runtime: Option<CaptureRuntime>,
}

impl CapturePlayer {
    /// Create a player that runs background work on `handle`
    pub fn new(service: Arc<dyn CaptureService>, config: PlayerConfig, handle: Handle) -> Self {
        Self::build(service, config, handle, None)
    }

    pub(crate) fn with_runtime(runtime: CaptureRuntime) -> Self {
        let service = runtime.service().clone();
        let config = runtime.config().clone();
        let handle = runtime.handle();
        Self::build(service, config, handle, Some(runtime))
    }

    fn build(
        service: Arc<dyn CaptureService>,
        config: PlayerConfig,
        handle: Handle,
        runtime: Option<CaptureRuntime>,
    ) -> Self {
        let (events_tx, events) = event_channel();
        Self {
            session: CaptureSession::new(service.clone(), config),
            enumerator: DeviceEnumerator::new(service),
            handle,
            events_tx,
            events: Mutex::new(Some(events)),
            url: Mutex::new(String::new()),
            open_task: Mutex::new(None),
            _runtime: runtime,
        }
    }

    /// Name the player reports
    pub fn player_name(&self) -> &'static str {
        PLAYER_NAME
    }

    /// Event stream; available once
    pub fn events(&self) -> Option<EventStream> {
        self.events.lock().take()
    }

    /// The session coordinator behind this player
    pub fn session(&self) -> &Arc<CaptureSession> {
        &self.session
    }

    /// Url of the open device, empty when closed
    pub fn url(&self) -> String {
        self.url.lock().clone()
    }

    /// Any non-empty url may name a capture device
    pub fn can_play_url(&self, url: &str) -> bool {
        !url.is_empty()
    }

    /// Open the capture device named by `url`
    ///
    /// Reopening the current device with the same options returns true
    /// without touching the pipeline. Otherwise the current device is closed
    /// and the new one is opened on a background task; the outcome arrives as
    /// [`MediaEvent::MediaOpened`] or [`MediaEvent::MediaOpenFailed`].
    pub fn open(&self, url: &str, options: MediaOptions) -> bool {
        if !url.is_empty() && self.session.is_duplicate_initialize(url, &options) {
            debug!("Player: {} already open", url);
            return true;
        }

        self.close();
        if url.is_empty() {
            return false;
        }

        *self.url.lock() = url.to_string();
        self.session.mark_preparing();

        let session = Arc::downgrade(&self.session);
        let target = url.to_string();
        let task = self.handle.spawn_blocking(move || {
            // The player may be gone by the time the task runs
            let Some(session) = session.upgrade() else {
                return false;
            };
            session.initialize(&target, &options)
        });
        if let Some(previous) = self.open_task.lock().replace(task) {
            previous.abort();
        }
        info!("🚀 Opening {}", url);
        true
    }

    /// Wait for the last background open; true when it opened the device
    pub async fn wait_for_open(&self) -> bool {
        let task = self.open_task.lock().take();
        match task {
            Some(task) => match task.await {
                Ok(opened) => opened,
                Err(e) => {
                    warn!("Open task failed: {}", e);
                    false
                }
            },
            None => self.session.has_device(),
        }
    }

    /// Close the device and notify listeners
    pub fn close(&self) {
        self.url.lock().clear();
        self.session.shutdown();
        self.send(MediaEvent::TracksChanged);
        self.send(MediaEvent::MediaClosed);
    }

    /// Forward session events queued since the last tick
    pub fn tick_input(&self, delta: Timespan, timecode: Timespan) {
        self.session.tick_input(delta, timecode);
        for event in self.session.take_events() {
            self.send(event);
        }
    }

    /// Report a changed media source and clear the pending flags
    pub fn tick_fetch(&self, _delta: Timespan, _timecode: Timespan) {
        let flags = self.session.flags();
        if flags.media_source_changed {
            self.send(MediaEvent::TracksChanged);
        }
        if flags.any() {
            self.session.clear_flags();
        }
    }

    fn send(&self, event: MediaEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("Dropping {} with no event listener", event);
        }
    }

    // ========================================================================
    // DEVICES
    // ========================================================================

    /// Video capture devices as display name and url pairs
    pub fn enumerate_video_capture_devices(&self) -> Vec<CaptureDeviceEntry> {
        self.enumerate(DeviceKind::Video)
    }

    /// Audio capture devices as display name and url pairs
    pub fn enumerate_audio_capture_devices(&self) -> Vec<CaptureDeviceEntry> {
        self.enumerate(DeviceKind::Audio)
    }

    fn enumerate(&self, kind: DeviceKind) -> Vec<CaptureDeviceEntry> {
        self.enumerator
            .list_devices(kind)
            .into_iter()
            .map(|device| CaptureDeviceEntry {
                display_name: device.display_name,
                url: device.stable_id,
            })
            .collect()
    }

    // ========================================================================
    // SAMPLES
    // ========================================================================

    /// Next video frame overlapping `range`
    pub fn fetch_video(&self, range: &TimeRange) -> Option<VideoSample> {
        self.session.fetch_video(range)
    }

    /// Next audio buffer overlapping `range`
    pub fn fetch_audio(&self, range: &TimeRange) -> Option<AudioSample> {
        self.session.fetch_audio(range)
    }

    /// Next caption overlapping `range`
    pub fn fetch_caption(&self, range: &TimeRange) -> Option<CaptionSample> {
        self.session.fetch_caption(range)
    }

    /// Next metadata sample overlapping `range`
    pub fn fetch_metadata(&self, range: &TimeRange) -> Option<MetadataSample> {
        self.session.fetch_metadata(range)
    }

    /// Drop every queued sample
    pub fn flush_samples(&self) {
        self.session.flush_samples();
    }

    // ========================================================================
    // TRACKS AND TRANSPORT
    // ========================================================================

    /// Number of tracks of `track_type`
    pub fn num_tracks(&self, track_type: TrackType) -> usize {
        self.session.num_tracks(track_type)
    }

    /// Select a track
    pub fn select_track(&self, track_type: TrackType, track: usize) -> bool {
        self.session.select_track(track_type, track)
    }

    /// Switch a track to another format
    pub fn set_track_format(&self, track_type: TrackType, track: usize, format: usize) -> bool {
        self.session.set_track_format(track_type, track, format)
    }

    /// Change the frame rate of a video format
    pub fn set_video_track_frame_rate(&self, track: usize, format: usize, frame_rate: f32) -> bool {
        self.session
            .set_video_track_frame_rate(track, format, frame_rate)
    }

    /// Transport state
    pub fn state(&self) -> PlayerState {
        self.session.state()
    }

    /// Set the playback rate
    pub fn set_rate(&self, rate: f32) -> bool {
        self.session.set_rate(rate)
    }

    /// Whether `control` is currently possible
    pub fn can_control(&self, control: MediaControl) -> bool {
        self.session.can_control(control)
    }

    /// Summary line for debug overlays
    pub fn info(&self) -> String {
        format!(
            "{} session {} ({}) {}",
            PLAYER_NAME,
            self.session.id(),
            self.session.state(),
            self.url()
        )
    }

    /// Text report of the open tracks
    pub fn stats(&self) -> String {
        let mut out = String::new();
        self.session.append_stats(&mut out);
        out
    }
}

impl Drop for CapturePlayer {
    fn drop(&mut self) {
        if let Some(task) = self.open_task.get_mut().take() {
            task.abort();
        }
        self.session.shutdown();
    }
}

impl std::fmt::Debug for CapturePlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePlayer")
            .field("url", &self.url())
            .field("session", &self.session)
            .finish()
    }
}
