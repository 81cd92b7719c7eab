//! Session coordinator tests against the in-memory capture service
//!
//! Covers opening and duplicate detection, track selection rules, format and
//! frame-rate changes, sample ingestion with drop+flush backpressure, and
//! shutdown.

use capgraph::*;
use capgraph_core::{
    DeviceKind, DeviceMoniker, GraphNode, PipelineContainer, PlatformError, PlatformResult,
};
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle};

const WEBCAM: &str = "Virtual Webcam";

fn sample_service() -> VirtualCaptureService {
    VirtualCaptureService::with_sample_devices()
}

fn session_for(service: &VirtualCaptureService) -> Arc<CaptureSession> {
    session_with(service, PlayerConfig::default())
}

fn session_with(service: &VirtualCaptureService, config: PlayerConfig) -> Arc<CaptureSession> {
    CaptureSession::new(Arc::new(service.clone()), config)
}

fn open_format(session: &Arc<CaptureSession>, format: usize) {
    assert!(session.initialize(WEBCAM, &MediaOptions::default().with_format(format)));
}

/// Camera "Cam" paired with a microphone that refuses every format
fn rejecting_microphone_service() -> VirtualCaptureService {
    let service = VirtualCaptureService::new();
    service.add_device(
        VirtualDeviceSpec::camera("Cam").with_video_format(Subtype::Yuy2, 640, 480, 5.0, 30.0),
    );
    service.add_device(
        VirtualDeviceSpec::microphone("Microphone (Cam)")
            .with_audio_format(48_000, 2, 16)
            .rejecting_set_format(PlatformError::rejected("SetFormat", "device busy")),
    );
    service
}

fn has_decoder(session: &CaptureSession) -> bool {
    session
        .pipeline_roles()
        .iter()
        .any(|role| matches!(role, NodeRole::Decompressor(_)))
}

// ============================================================================
// OPEN AND DUPLICATE DETECTION TESTS
// ============================================================================

#[test]
fn test_initialize_opens_requested_format() {
    let service = sample_service();
    let session = session_for(&service);

    open_format(&session, 0);

    assert!(session.has_device());
    assert_eq!(session.url(), WEBCAM);
    assert_eq!(session.state(), PlayerState::Preparing);
    assert_eq!(session.rate(), 0.0);
    assert!(session.opened_at().is_some());
    assert!(has_decoder(&session));
    assert!(session
        .pipeline_roles()
        .contains(&NodeRole::ColorspaceConverter));

    assert_eq!(session.num_tracks(TrackType::Video), 1);
    assert_eq!(session.num_tracks(TrackType::Audio), 1);
    assert_eq!(session.num_track_formats(TrackType::Video, 0), 3);
    assert_eq!(session.selected_track(TrackType::Video), Some(0));
    assert_eq!(session.track_format(TrackType::Video, 0), Some(0));
    assert_eq!(
        session.track_display_name(TrackType::Video, 0).as_deref(),
        Some("Unnamed Track (Stream 0)")
    );
    assert_eq!(session.track_name(TrackType::Video, 0).as_deref(), Some(WEBCAM));
    assert_eq!(session.track_language(TrackType::Video, 0).as_deref(), Some(""));

    assert_eq!(
        session.take_events(),
        vec![MediaEvent::PlaybackSuspended, MediaEvent::MediaOpened]
    );
    let flags = session.flags();
    assert!(flags.media_source_changed);
    assert!(flags.selection_changed);
}

#[test]
fn test_empty_url_is_duplicate() {
    let session = session_for(&sample_service());
    assert!(session.is_duplicate_initialize("", &MediaOptions::default()));
    assert!(session.initialize("", &MediaOptions::default()));
    assert!(!session.has_device());
}

#[test]
fn test_duplicate_initialize_requires_same_selection() {
    let service = sample_service();
    let session = session_for(&service);
    let options = MediaOptions::default().with_format(1);
    assert!(session.initialize(WEBCAM, &options));

    assert!(session.is_duplicate_initialize(WEBCAM, &options));
    assert!(session.is_duplicate_initialize(WEBCAM, &options.clone().with_frame_rate(30.0)));

    assert!(!session.is_duplicate_initialize("Other Cam", &options));
    assert!(!session.is_duplicate_initialize(WEBCAM, &options.clone().with_frame_rate(15.0)));
    assert!(!session.is_duplicate_initialize(WEBCAM, &MediaOptions::default().with_format(0)));
    assert!(!session.is_duplicate_initialize(WEBCAM, &options.clone().without_audio()));
    // Without an explicit format nothing can be compared
    assert!(!session.is_duplicate_initialize(WEBCAM, &MediaOptions::default()));
}

#[test]
fn test_duplicate_initialize_keeps_pipeline() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 1);
    session.take_events();

    open_format(&session, 1);
    assert!(session.take_events().is_empty());
    assert_eq!(session.track_format(TrackType::Video, 0), Some(1));
}

#[test]
fn test_default_options_open_first_format() {
    let service = sample_service();
    let session = session_for(&service);

    assert!(session.initialize(WEBCAM, &MediaOptions::default()));
    assert_eq!(session.track_format(TrackType::Video, 0), Some(0));
    assert_eq!(session.active_format().unwrap().subtype, Some(Subtype::Mjpg));
}

#[test]
fn test_unusable_request_falls_back_to_first_format() {
    let service = sample_service();
    let session = session_for(&service);

    // NV12 tops out at 15 fps
    let options = MediaOptions::default().with_format(2).with_frame_rate(60.0);
    assert!(session.initialize(WEBCAM, &options));
    assert_eq!(session.track_format(TrackType::Video, 0), Some(0));
    assert_eq!(session.active_format().unwrap().subtype, Some(Subtype::Mjpg));
}

#[test]
fn test_requested_frame_rate_is_applied() {
    let service = sample_service();
    let session = session_for(&service);

    let options = MediaOptions::default().with_format(1).with_frame_rate(15.0);
    assert!(session.initialize(WEBCAM, &options));
    let active = session.active_format().unwrap();
    assert_eq!(active.subtype, Some(Subtype::Yuy2));
    assert!((active.frame_rate - 15.0).abs() < 0.01);
}

#[test]
fn test_unknown_device_closes_session() {
    let service = sample_service();
    let session = session_for(&service);

    assert!(!session.initialize("Missing Cam", &MediaOptions::default()));
    assert!(!session.has_device());
    assert_eq!(session.state(), PlayerState::Closed);
    assert_eq!(session.num_tracks(TrackType::Video), 0);
    assert_eq!(
        session.take_events(),
        vec![MediaEvent::MediaOpenFailed, MediaEvent::MediaClosed]
    );
}

#[test]
fn test_pipeline_failure_closes_session() {
    let service = sample_service();
    service.set_pipeline_available(false);
    let session = session_for(&service);

    assert!(!session.initialize(WEBCAM, &MediaOptions::default().with_format(1)));
    assert_eq!(session.state(), PlayerState::Closed);
    assert_eq!(session.url(), "");
    assert!(session.take_events().contains(&MediaEvent::MediaClosed));
}

#[test]
fn test_camera_without_microphone_opens_video_only() {
    let service = VirtualCaptureService::new();
    service.add_device(
        VirtualDeviceSpec::camera("Lonely Cam").with_video_format(Subtype::Yuy2, 640, 480, 5.0, 30.0),
    );
    let session = session_for(&service);

    assert!(session.initialize("Lonely Cam", &MediaOptions::default().with_format(0)));
    assert_eq!(session.num_tracks(TrackType::Video), 1);
    assert_eq!(session.num_tracks(TrackType::Audio), 0);
    assert_eq!(session.selected_track(TrackType::Audio), None);
    assert!(!session
        .pipeline_roles()
        .contains(&NodeRole::Source(DeviceKind::Audio)));
}

#[test]
fn test_rejected_microphone_drops_audio_track() {
    let service = rejecting_microphone_service();
    let session = session_for(&service);

    assert!(session.initialize("Cam", &MediaOptions::default().with_format(0)));
    assert_eq!(session.num_tracks(TrackType::Video), 1);
    assert_eq!(session.num_tracks(TrackType::Audio), 0);
    assert_eq!(session.selected_track(TrackType::Audio), None);
    assert!(session.active_format().unwrap().audio.is_none());
    assert!(!session
        .pipeline_roles()
        .contains(&NodeRole::Source(DeviceKind::Audio)));
}

#[test]
fn test_reopen_other_device_replaces_pipeline() {
    let service = sample_service();
    service.add_device(
        VirtualDeviceSpec::camera("Desk Cam").with_video_format(Subtype::Yuy2, 320, 240, 5.0, 30.0),
    );
    let session = session_for(&service);
    open_format(&session, 0);

    assert!(session.initialize("Desk Cam", &MediaOptions::default().without_audio()));
    assert_eq!(session.url(), "Desk Cam");
    assert_eq!(session.active_format().unwrap().width, 320);
    assert_eq!(service.pipeline_roles().len(), 2);
}

// ============================================================================
// TRACK SELECTION TESTS
// ============================================================================

#[test]
fn test_select_track_allows_only_first_track() {
    let service = sample_service();
    let session = session_for(&service);
    assert!(!session.select_track(TrackType::Video, 0));

    open_format(&session, 1);
    assert!(session.select_track(TrackType::Video, 0));
    assert!(session.select_track(TrackType::Audio, 0));
    assert!(!session.select_track(TrackType::Video, 1));
    assert!(!session.select_track(TrackType::Audio, 1));
    assert!(!session.select_track(TrackType::Caption, 0));
}

#[test]
fn test_track_introspection_without_device() {
    let session = session_for(&sample_service());
    assert_eq!(session.num_tracks(TrackType::Video), 0);
    assert_eq!(session.num_track_formats(TrackType::Video, 0), 0);
    assert_eq!(session.selected_track(TrackType::Video), None);
    assert_eq!(session.track_display_name(TrackType::Video, 0), None);
    assert_eq!(session.track_format(TrackType::Video, 0), None);
    assert!(session.video_track_format(0, 0).is_none());
    assert!(!session.can_control(MediaControl::Resume));
}

#[test]
fn test_video_track_format_reports_device_rate() {
    let service = sample_service();
    let session = session_for(&service);
    let options = MediaOptions::default().with_format(1).with_frame_rate(10.0);
    assert!(session.initialize(WEBCAM, &options));

    let format = session.video_track_format(0, 1).unwrap();
    assert_eq!(format.dim, VideoResolution::VGA);
    assert_eq!(format.type_name, "YUY2");
    assert!((format.frame_rate - 10.0).abs() < 0.01);
    assert!((format.frame_rates.max - 30.0).abs() < 0.01);
    assert!(session.video_track_format(0, 7).is_none());
}

#[test]
fn test_audio_track_format_unavailable_while_preparing() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 1);

    assert!(session.audio_track_format(0, 0).is_none());

    session.set_rate(1.0);
    let format = session.audio_track_format(0, 0).unwrap();
    assert_eq!(format.sample_rate, 48_000);
    assert_eq!(format.channels, 2);
    assert_eq!(format.bits_per_sample, 16);
    assert_eq!(format.type_name, "PCM");
}

// ============================================================================
// FORMAT CHANGE TESTS
// ============================================================================

#[test]
fn test_set_track_format_rebuilds_without_decoder() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 0);
    assert!(has_decoder(&session));
    session.clear_flags();

    assert!(session.set_track_format(TrackType::Video, 0, 1));
    assert!(!has_decoder(&session));
    assert!(session
        .pipeline_roles()
        .contains(&NodeRole::Source(DeviceKind::Video)));
    assert_eq!(session.track_format(TrackType::Video, 0), Some(1));
    assert_eq!(session.active_format().unwrap().subtype, Some(Subtype::Yuy2));
    assert!(session.flags().selection_changed);
    assert!(!session.flags().media_source_changed);
    assert_eq!(session.state(), PlayerState::Paused);
}

#[test]
fn test_set_track_format_edge_cases() {
    let service = sample_service();
    let session = session_for(&service);
    assert!(!session.set_track_format(TrackType::Video, 0, 1));

    open_format(&session, 1);
    session.clear_flags();
    // Same format is a no-op
    assert!(session.set_track_format(TrackType::Video, 0, 1));
    assert!(!session.flags().selection_changed);

    assert!(!session.set_track_format(TrackType::Video, 0, 9));
    assert!(!session.set_track_format(TrackType::Video, 3, 0));
    assert!(!session.set_track_format(TrackType::Caption, 0, 0));
    assert_eq!(session.track_format(TrackType::Video, 0), Some(1));
}

#[test]
fn test_set_audio_track_format_rebuilds_audio_branch() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 1);

    assert!(session.set_track_format(TrackType::Audio, 0, 1));
    let audio = session.active_format().unwrap().audio.unwrap();
    assert_eq!(audio.samples_per_sec, 44_100);
    assert_eq!(audio.channels, 1);
    assert_eq!(session.track_format(TrackType::Audio, 0), Some(1));
}

#[test]
fn test_audio_format_change_fails_when_audio_disabled() {
    let service = rejecting_microphone_service();
    let session = session_for(&service);
    assert!(session.initialize("Cam", &MediaOptions::default().with_format(0)));

    assert!(!session.set_track_format(TrackType::Audio, 0, 0));
    assert_eq!(session.num_track_formats(TrackType::Audio, 0), 0);

    // Video keeps running
    assert!(session.has_device());
    assert_eq!(session.state(), PlayerState::Preparing);
    assert!(session.set_track_format(TrackType::Video, 0, 0));
}

#[test]
fn test_failed_format_change_shuts_down() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 0);

    service.set_pipeline_available(false);
    assert!(!session.set_track_format(TrackType::Video, 0, 1));
    assert!(!session.has_device());
    assert_eq!(session.state(), PlayerState::Closed);
    assert!(service.pipeline_roles().is_empty());
}

#[test]
fn test_frame_rate_change_on_selected_format_rebuilds() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 1);

    assert!(session.set_video_track_frame_rate(0, 1, 15.0));
    assert_eq!(session.track_format(TrackType::Video, 0), Some(1));
    assert!((session.active_format().unwrap().frame_rate - 15.0).abs() < 0.01);
    let stored = session.track(TrackType::Video, 0).unwrap();
    assert!((stored.formats[1].video_format().unwrap().frame_rate - 15.0).abs() < 0.01);

    // Already at 15 fps
    assert!(!session.set_video_track_frame_rate(0, 1, 15.0));
    // Above the format's limit
    assert!(!session.set_video_track_frame_rate(0, 1, 60.0));
    assert!(!session.set_video_track_frame_rate(0, 9, 10.0));
}

#[test]
fn test_frame_rate_change_on_other_format_keeps_pipeline() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 1);

    assert!(session.set_video_track_frame_rate(0, 0, 10.0));
    assert_eq!(session.active_format().unwrap().subtype, Some(Subtype::Yuy2));
    assert!((session.active_format().unwrap().frame_rate - 30.0).abs() < 0.01);
}

// ============================================================================
// SAMPLE INGESTION TESTS
// ============================================================================

#[test]
fn test_video_sample_uses_layout_table() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 1);

    assert_eq!(service.push_video_frame(&[7u8; 64], 10_000_000, 10_333_333), 1);
    assert_eq!(session.time(), Timespan::from_seconds(1.0));

    let frame = session.fetch_video(&TimeRange::all()).unwrap();
    assert_eq!(frame.layout, PixelLayout::Yuy2);
    assert_eq!(frame.dim, VideoResolution::new(320, 480));
    assert_eq!(frame.output_dim, VideoResolution::VGA);
    assert_eq!(frame.stride, 1280);
    assert_eq!(frame.time, Timespan::from_seconds(1.0));
    assert_eq!(frame.duration, Timespan::from_ticks(333_333));
    assert_eq!(frame.buffer.len(), 64);
}

#[test]
fn test_mjpeg_frames_are_bgra() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 0);

    service.push_video_frame(&[0u8; 16], 0, 333_333);
    let frame = session.fetch_video(&TimeRange::all()).unwrap();
    assert_eq!(frame.layout, PixelLayout::Bgra8);
    assert_eq!(frame.dim, VideoResolution::HD);
    assert_eq!(frame.stride, 1280 * 4);
}

#[test]
fn test_missing_video_duration_derived_from_frame_rate() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 1);

    service.push_video_frame(&[0u8; 16], 0, 0);
    let frame = session.fetch_video(&TimeRange::all()).unwrap();
    assert!((frame.duration.ticks() - 333_333).abs() <= 1);
}

#[test]
fn test_full_video_queue_is_flushed() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 1);

    service.push_video_frame(&[1u8; 8], 0, 333_333);
    assert_eq!(session.queued_samples(TrackType::Video), 1);

    // Depth one: the second frame flushes the queue and is dropped
    service.push_video_frame(&[2u8; 8], 333_333, 666_666);
    assert_eq!(session.queued_samples(TrackType::Video), 0);

    service.push_video_frame(&[3u8; 8], 666_666, 999_999);
    let frame = session.fetch_video(&TimeRange::all()).unwrap();
    assert_eq!(frame.buffer[0], 3);
}

#[test]
fn test_deeper_queue_keeps_fifo_order() {
    let service = sample_service();
    let config = PlayerConfig {
        queue_depths: QueueDepths {
            video: 3,
            ..QueueDepths::default()
        },
        ..PlayerConfig::default()
    };
    let session = session_with(&service, config);
    open_format(&session, 1);

    for (index, start) in [0i64, 333_333, 666_666].into_iter().enumerate() {
        service.push_video_frame(&[index as u8; 4], start, start + 333_333);
    }
    assert_eq!(session.queued_samples(TrackType::Video), 3);

    let first = session.fetch_video(&TimeRange::all()).unwrap();
    let second = session.fetch_video(&TimeRange::all()).unwrap();
    assert_eq!((first.buffer[0], second.buffer[0]), (0, 1));
}

#[test]
fn test_fetch_respects_time_range() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 1);

    service.push_video_frame(&[0u8; 4], 20_000_000, 20_333_333);
    let early = TimeRange::new(Timespan::ZERO, Timespan::from_seconds(1.0));
    assert!(session.fetch_video(&early).is_none());
    assert_eq!(session.queued_samples(TrackType::Video), 1);

    let around = TimeRange::new(Timespan::from_seconds(1.9), Timespan::from_seconds(2.1));
    assert!(session.fetch_video(&around).is_some());
}

#[test]
fn test_audio_sample_takes_active_wave_format() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 1);

    service.push_audio_buffer(&[0u8; 1920], 0, 100_000);
    let sample = session.fetch_audio(&TimeRange::all()).unwrap();
    assert_eq!(sample.channels, 2);
    assert_eq!(sample.sample_rate, 48_000);
    assert_eq!(sample.sample_format, AudioSampleFormat::Int16);
    assert_eq!(sample.duration, Timespan::from_ticks(100_000));
}

#[test]
fn test_missing_audio_duration_derived_from_buffer() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 1);

    // 48 kHz stereo 16-bit: 19200 bytes is 100 ms
    service.push_audio_buffer(&[0u8; 19_200], 0, 0);
    let sample = session.fetch_audio(&TimeRange::all()).unwrap();
    assert_eq!(sample.duration, Timespan::from_millis(100));
}

#[test]
fn test_extreme_video_timestamps_saturate() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 1);

    assert_eq!(service.push_video_frame(&[0u8; 16], i64::MIN, i64::MAX), 1);
    let frame = session.fetch_video(&TimeRange::all()).unwrap();
    assert_eq!(frame.duration, Timespan::from_ticks(i64::MAX));
}

#[test]
fn test_extreme_audio_timestamps_saturate() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 1);

    assert_eq!(service.push_audio_buffer(&[0u8; 64], i64::MIN, i64::MAX), 1);
    let sample = session.fetch_audio(&TimeRange::all()).unwrap();
    assert_eq!(sample.duration, Timespan::from_ticks(i64::MAX));
}

#[test]
fn test_samples_dropped_without_device() {
    let service = sample_service();
    let session = session_for(&service);
    let options = MediaOptions::default().with_format(1);
    assert!(session.initialize(WEBCAM, &options));
    session.shutdown();

    assert_eq!(service.push_video_frame(&[0u8; 4], 0, 1), 0);
    session.ingest_caption("hello", Timespan::ZERO, Timespan::from_seconds(1.0));
    assert_eq!(session.queued_samples(TrackType::Video), 0);
    assert_eq!(session.queued_samples(TrackType::Caption), 0);
}

#[test]
fn test_caption_and_metadata_queues_flush_when_full() {
    let service = sample_service();
    let config = PlayerConfig {
        queue_depths: QueueDepths {
            caption: 2,
            metadata: 1,
            ..QueueDepths::default()
        },
        ..PlayerConfig::default()
    };
    let session = session_with(&service, config);
    open_format(&session, 1);

    let second = Timespan::from_seconds(1.0);
    session.ingest_caption("one", Timespan::ZERO, second);
    session.ingest_caption("two", second, second);
    assert_eq!(session.queued_samples(TrackType::Caption), 2);
    session.ingest_caption("three", second + second, second);
    assert_eq!(session.queued_samples(TrackType::Caption), 0);

    session.ingest_metadata(b"{}", Timespan::ZERO, second);
    let metadata = session.fetch_metadata(&TimeRange::all()).unwrap();
    assert_eq!(&metadata.data[..], b"{}");

    session.ingest_caption("four", Timespan::ZERO, second);
    assert_eq!(session.fetch_caption(&TimeRange::all()).unwrap().text, "four");
}

#[test]
fn test_flush_samples_empties_every_queue() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 1);

    service.push_video_frame(&[0u8; 4], 0, 333_333);
    service.push_audio_buffer(&[0u8; 4], 0, 100_000);
    session.ingest_metadata(b"x", Timespan::ZERO, Timespan::from_seconds(1.0));

    session.flush_samples();
    for track_type in [TrackType::Video, TrackType::Audio, TrackType::Metadata] {
        assert_eq!(session.queued_samples(track_type), 0);
    }
}

// ============================================================================
// TRANSPORT AND SHUTDOWN TESTS
// ============================================================================

#[test]
fn test_rate_and_controls() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 1);
    session.take_events();

    assert!(session.can_control(MediaControl::Resume));
    assert!(!session.can_control(MediaControl::Pause));

    assert!(session.set_rate(1.0));
    assert_eq!(session.state(), PlayerState::Playing);
    assert!(session.can_control(MediaControl::Pause));
    assert!(!session.can_control(MediaControl::Resume));
    assert!(session.can_control(MediaControl::Seek));
    assert!(session.can_control(MediaControl::Scrub));

    assert!(session.set_rate(0.0));
    assert_eq!(session.state(), PlayerState::Paused);
    assert_eq!(
        session.take_events(),
        vec![MediaEvent::PlaybackResumed, MediaEvent::PlaybackSuspended]
    );

    assert_eq!(session.supported_rates(), 0.0..=1.0);
    assert!(!session.seek(Timespan::from_seconds(3.0)));
    assert_eq!(session.duration(), Timespan::ZERO);
    assert!(session.set_looping(true));
    assert!(session.is_looping());

    session.tick_input(Timespan::from_millis(16), Timespan::from_seconds(4.0));
    assert_eq!(session.target_time(), Timespan::from_seconds(4.0));
}

#[test]
fn test_shutdown_resets_everything() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 0);
    service.push_video_frame(&[0u8; 4], 0, 333_333);

    session.shutdown();

    assert!(!session.has_device());
    assert!(!session.is_initializing());
    assert_eq!(session.state(), PlayerState::Closed);
    assert_eq!(session.url(), "");
    assert_eq!(session.num_tracks(TrackType::Video), 0);
    assert_eq!(session.queued_samples(TrackType::Video), 0);
    assert_eq!(session.flags(), SessionFlags::default());
    assert!(session.opened_at().is_none());
    assert!(service.pipeline_roles().is_empty());

    // Repeated shutdown is harmless
    session.shutdown();
    assert_eq!(session.state(), PlayerState::Closed);
}

/// Service that closes the session and queues a second open while the
/// first open is still building its pipeline
struct InterruptingService {
    inner: VirtualCaptureService,
    session: OnceLock<Weak<CaptureSession>>,
    reopen: Mutex<Option<JoinHandle<bool>>>,
}

impl CaptureService for InterruptingService {
    fn enumerate_devices(&self, kind: DeviceKind) -> PlatformResult<Vec<Arc<dyn DeviceMoniker>>> {
        self.inner.enumerate_devices(kind)
    }

    fn create_pipeline(&self) -> PlatformResult<Box<dyn PipelineContainer>> {
        let mut reopen = self.reopen.lock();
        if reopen.is_none() {
            if let Some(session) = self.session.get().and_then(Weak::upgrade) {
                session.shutdown();
                *reopen = Some(thread::spawn(move || {
                    session.initialize("Desk Cam", &MediaOptions::default().without_audio())
                }));
            }
        }
        drop(reopen);
        self.inner.create_pipeline()
    }

    fn create_node(&self, role: NodeRole) -> PlatformResult<Arc<dyn GraphNode>> {
        self.inner.create_node(role)
    }
}

#[test]
fn test_shutdown_during_open_is_applied_before_next_open() {
    let inner = sample_service();
    inner.add_device(
        VirtualDeviceSpec::camera("Desk Cam").with_video_format(Subtype::Yuy2, 320, 240, 5.0, 30.0),
    );
    let service = Arc::new(InterruptingService {
        inner: inner.clone(),
        session: OnceLock::new(),
        reopen: Mutex::new(None),
    });
    let session = CaptureSession::new(service.clone(), PlayerConfig::default());
    service.session.set(Arc::downgrade(&session)).unwrap();

    // The close requested mid-open wins over the first open
    assert!(!session.initialize(WEBCAM, &MediaOptions::default().with_format(1)));

    // The queued open then runs on its own
    let reopen = service.reopen.lock().take().unwrap();
    assert!(reopen.join().unwrap());
    assert!(!session.is_initializing());
    assert_eq!(session.url(), "Desk Cam");
    assert_eq!(session.state(), PlayerState::Preparing);
    assert_eq!(session.active_format().unwrap().width, 320);
    assert_eq!(session.take_events(), vec![MediaEvent::MediaOpened]);
    assert_eq!(inner.pipeline_roles().len(), 2);
}

#[test]
fn test_shutdown_during_open_closes_session() {
    let inner = sample_service();
    let service = Arc::new(InterruptingService {
        inner: inner.clone(),
        session: OnceLock::new(),
        reopen: Mutex::new(None),
    });
    let session = CaptureSession::new(service.clone(), PlayerConfig::default());
    service.session.set(Arc::downgrade(&session)).unwrap();

    // Desk Cam is unknown here, so the queued open fails on its own
    assert!(!session.initialize(WEBCAM, &MediaOptions::default().with_format(1)));
    let reopen = service.reopen.lock().take().unwrap();
    assert!(!reopen.join().unwrap());

    assert!(!session.has_device());
    assert_eq!(session.state(), PlayerState::Closed);
    assert!(!session.take_events().contains(&MediaEvent::MediaOpened));
    assert!(inner.pipeline_roles().is_empty());
}

#[test]
fn test_dropping_session_releases_pipeline() {
    let service = sample_service();
    let session = session_for(&service);
    open_format(&session, 0);
    assert!(!service.pipeline_roles().is_empty());

    drop(session);
    assert!(service.pipeline_roles().is_empty());
    assert!(!service.is_running());
}

#[test]
fn test_append_stats_lists_tracks() {
    let service = sample_service();
    let session = session_for(&service);

    let mut closed = String::new();
    session.append_stats(&mut closed);
    assert_eq!(closed, "Audio Tracks\n\tnone\nVideo Tracks\n\tnone\n");

    open_format(&session, 0);
    let mut open = String::new();
    session.append_stats(&mut open);
    assert!(open.starts_with("Audio Tracks\n\tUnnamed Track (Stream 0)\n"));
    assert!(open.contains("Video Tracks\n\tUnnamed Track (Stream 0)\n"));
    assert!(open.contains("\t\t*MJPG 1280x720"));
    assert!(open.contains("PCM 44100 Hz, 1 ch, 16 bit"));
}
