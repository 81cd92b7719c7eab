//! # capgraph - Capture Devices as Media Sources
//!
//! capgraph exposes webcams and microphones of a filter-graph capture stack
//! as a media source: it enumerates devices, negotiates a format, assembles
//! and runs the capture pipeline, and delivers typed video and audio samples
//! on bounded queues to a polling front-end.
//!
//! ## Key Features
//!
//! - **Format Negotiation**: first-fit matching of requested formats against device capabilities
//! - **Pipeline Assembly**: decoder and colorspace stages inserted only for compressed formats
//! - **Audio Pairing**: the microphone of a webcam is found by name and captured alongside
//! - **Fresh Frames**: full queues are flushed, never grown, so consumers see the newest frame
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use capgraph::{CaptureRuntime, MediaOptions, TimeRange, Timespan};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = CaptureRuntime::init()?;
//!     let player = runtime.player();
//!     let mut events = player.events().expect("first call");
//!
//!     let devices = player.enumerate_video_capture_devices();
//!     player.open(&devices[0].url, MediaOptions::default().with_format(0));
//!     runtime.block_on(player.wait_for_open());
//!
//!     player.tick_input(Timespan::ZERO, Timespan::ZERO);
//!     while let Ok(Some(event)) = events.try_next() {
//!         println!("Player event: {}", event);
//!     }
//!     if let Some(frame) = player.fetch_video(&TimeRange::all()) {
//!         println!("{}x{} frame", frame.output_dim.width, frame.output_dim.height);
//!     }
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use capgraph_core::{
    AudioSample, AudioSampleFormat, CaptionSample, CaptureError, CaptureResult, CaptureService,
    FormatDescriptor, FrameRateRange, MediaSample, MetadataSample, NodeRole, PixelLayout,
    Subtype, TimeRange, Timespan, Track, TrackType, VideoResolution, VideoSample,
};

pub use capgraph_media::{
    default_capture_service, AudioDeviceHint, DeviceConfig, VirtualCaptureService,
    VirtualDeviceSpec,
};

pub use capgraph_diagnostics::{DebugLogger, LoggingConfig};

// Public API modules
pub mod config;
pub mod event;
pub mod player;
pub mod session;

// Re-export main API types
pub use config::{MediaOptions, PlayerConfig, QueueDepths};
pub use event::{EventStream, MediaEvent};
pub use player::{CaptureDeviceEntry, CapturePlayer};
pub use session::{
    AudioTrackFormat, CaptureSession, MediaControl, PlayerState, SessionFlags, VideoTrackFormat,
};

use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Main entry point for capgraph
#[derive(Clone)]
pub struct CaptureRuntime {
    inner: Arc<CaptureRuntimeInner>,
}

struct CaptureRuntimeInner {
    runtime: tokio::runtime::Runtime,
    config: PlayerConfig,
    service: Arc<dyn CaptureService>,
}

impl CaptureRuntime {
    /// Initialize with default settings over the in-memory stand-in service
    ///
    /// See [`default_capture_service`]; use [`CaptureRuntime::init_with_service`]
    /// to capture from real devices.
    ///
    /// # Example
    /// ```rust,no_run
    /// use capgraph::CaptureRuntime;
    ///
    /// let runtime = CaptureRuntime::init()?;
    /// # Ok::<(), capgraph::CaptureError>(())
    /// ```
    pub fn init() -> CaptureResult<Self> {
        Self::init_with(PlayerConfig::default())
    }

    /// Initialize with custom configuration over the in-memory stand-in service
    pub fn init_with(config: PlayerConfig) -> CaptureResult<Self> {
        Self::init_with_service(config, default_capture_service())
    }

    /// Initialize over a specific capture service
    pub fn init_with_service(
        config: PlayerConfig,
        service: Arc<dyn CaptureService>,
    ) -> CaptureResult<Self> {
        if config.debug_logging {
            if let Err(e) = DebugLogger::init_logging(&LoggingConfig::verbose()) {
                warn!("Debug logging not installed: {}", e);
            }
        }

        let runtime = tokio::runtime::Runtime::new().map_err(|e| CaptureError::Environment {
            reason: format!("Failed to create async runtime: {}", e),
        })?;

        info!("✅ capgraph runtime initialized");
        Ok(Self {
            inner: Arc::new(CaptureRuntimeInner {
                runtime,
                config,
                service,
            }),
        })
    }

    /// Global configuration
    pub fn config(&self) -> &PlayerConfig {
        &self.inner.config
    }

    /// Capture service players are created over
    pub fn service(&self) -> &Arc<dyn CaptureService> {
        &self.inner.service
    }

    /// Handle to the background runtime
    pub fn handle(&self) -> tokio::runtime::Handle {
        self.inner.runtime.handle().clone()
    }

    /// Run a future to completion on the background runtime
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.inner.runtime.block_on(future)
    }

    /// Create a player; it keeps the runtime alive
    pub fn player(&self) -> CapturePlayer {
        CapturePlayer::with_runtime(self.clone())
    }
}

impl std::fmt::Debug for CaptureRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureRuntime")
            .field("config", &self.inner.config)
            .finish()
    }
}
