//! Format negotiation and device enumeration against virtual devices

use capgraph_core::{
    AudioFormat, DeviceKind, FormatDescriptor, FrameRateRange, MajorType, Subtype, VideoFormat,
    VideoResolution,
};
use capgraph_media::negotiator::{describe_audio_candidates, describe_video_candidates};
use capgraph_media::*;
use std::sync::Arc;

fn enumerator(service: &VirtualCaptureService) -> DeviceEnumerator {
    DeviceEnumerator::new(Arc::new(service.clone()))
}

fn yuy2(width: u32, height: u32, fps: f32) -> FormatDescriptor {
    FormatDescriptor::video(
        Subtype::Yuy2,
        VideoFormat {
            bit_rate: 0,
            frame_rate: fps,
            frame_rates: FrameRateRange::single(fps),
            resolution: VideoResolution::new(width, height),
        },
    )
}

// ============================================================================
// ENUMERATION TESTS
// ============================================================================

#[test]
fn test_list_devices_by_kind() {
    let service = VirtualCaptureService::with_sample_devices();
    let enumerator = enumerator(&service);

    let cameras = enumerator.list_devices(DeviceKind::Video);
    assert_eq!(cameras.len(), 1);
    assert_eq!(cameras[0].display_name, "Virtual Webcam");
    assert!(cameras[0].stable_id.starts_with("\\\\?\\virtual#"));
    assert_eq!(enumerator.list_devices(DeviceKind::Audio).len(), 1);
}

#[test]
fn test_unavailable_enumeration_yields_empty_list() {
    let service = VirtualCaptureService::with_sample_devices();
    service.set_enumeration_available(false);
    assert!(enumerator(&service).list_devices(DeviceKind::Video).is_empty());
}

#[test]
fn test_device_without_path_is_addressed_by_name() {
    let service = VirtualCaptureService::new();
    service.add_device(
        VirtualDeviceSpec::camera("Soft Cam")
            .with_path(None)
            .with_video_format(Subtype::Yuy2, 640, 480, 5.0, 30.0),
    );
    let enumerator = enumerator(&service);

    let resolved = enumerator
        .resolve_output_connection("Soft Cam", DeviceKind::Video, MajorType::Video)
        .unwrap();
    assert_eq!(resolved.device.stable_id, "Soft Cam");
    assert_eq!(resolved.connection.name(), "Capture");
}

#[test]
fn test_resolve_unknown_device() {
    let service = VirtualCaptureService::with_sample_devices();
    let err = enumerator(&service)
        .resolve_output_connection("Missing", DeviceKind::Video, MajorType::Video)
        .err()
        .unwrap();
    assert!(matches!(err, capgraph_core::CaptureError::DeviceNotFound { .. }));
}

#[test]
fn test_friendly_name_substring_is_case_insensitive() {
    let service = VirtualCaptureService::with_sample_devices();
    let enumerator = enumerator(&service);

    let found = enumerator
        .find_connection_by_friendly_name_substring(DeviceKind::Audio, "virtual webcam", true)
        .unwrap();
    assert_eq!(found.device.friendly_name, "Microphone (Virtual Webcam)");
    assert!(enumerator
        .find_connection_by_friendly_name_substring(DeviceKind::Audio, "virtual webcam", false)
        .is_err());
    assert!(enumerator
        .find_connection_by_friendly_name_substring(DeviceKind::Audio, "", true)
        .is_err());
}

// ============================================================================
// NEGOTIATION TESTS
// ============================================================================

#[test]
fn test_resolution_is_first_fit() {
    let service = VirtualCaptureService::new();
    service.add_device(
        VirtualDeviceSpec::camera("Cam")
            .with_video_format(Subtype::Yuy2, 640, 480, 5.0, 15.0)
            .with_video_format(Subtype::Yuy2, 640, 480, 5.0, 30.0),
    );
    let resolved = enumerator(&service)
        .resolve_output_connection("Cam", DeviceKind::Video, MajorType::Video)
        .unwrap();

    // 10 fps fits both entries; the first one wins
    let media_type = resolve_video_format(resolved.connection.as_ref(), &yuy2(640, 480, 10.0)).unwrap();
    assert_eq!(media_type.video_info().unwrap().avg_time_per_frame, 1_000_000);

    // 25 fps only fits the second entry
    let media_type = resolve_video_format(resolved.connection.as_ref(), &yuy2(640, 480, 25.0)).unwrap();
    assert_eq!(media_type.video_info().unwrap().avg_time_per_frame, 400_000);

    assert!(resolve_video_format(resolved.connection.as_ref(), &yuy2(1280, 720, 25.0)).is_err());
}

#[test]
fn test_bare_format_list_fallback() {
    let service = VirtualCaptureService::new();
    service.add_device(
        VirtualDeviceSpec::camera("Old Cam")
            .with_video_format(Subtype::Yuy2, 640, 480, 30.0, 30.0)
            .without_capability_table(),
    );
    let resolved = enumerator(&service)
        .resolve_output_connection("Old Cam", DeviceKind::Video, MajorType::Video)
        .unwrap();

    assert!(resolve_video_format(resolved.connection.as_ref(), &yuy2(640, 480, 30.0)).is_ok());
    assert!(resolve_video_format(resolved.connection.as_ref(), &yuy2(640, 480, 15.0)).is_err());

    let (formats, selected) = describe_video_candidates(resolved.connection.as_ref()).unwrap();
    assert!(!formats.is_empty());
    assert_eq!(selected, Some(0));
}

#[test]
fn test_unnamed_subtypes_are_skipped() {
    let service = VirtualCaptureService::new();
    service.add_device(
        VirtualDeviceSpec::camera("Odd Cam")
            .with_video_format(Subtype::Other(*b"Y800"), 640, 480, 5.0, 30.0)
            .with_video_format(Subtype::Yuy2, 640, 480, 5.0, 30.0),
    );
    let resolved = enumerator(&service)
        .resolve_output_connection("Odd Cam", DeviceKind::Video, MajorType::Video)
        .unwrap();

    let (formats, _) = describe_video_candidates(resolved.connection.as_ref()).unwrap();
    assert_eq!(formats.len(), 1);
    assert_eq!(formats[0].type_name, "YUY2");
}

#[test]
fn test_audio_requires_exact_match() {
    let service = VirtualCaptureService::with_sample_devices();
    let resolved = enumerator(&service)
        .resolve_output_connection(
            "Microphone (Virtual Webcam)",
            DeviceKind::Audio,
            MajorType::Audio,
        )
        .unwrap();
    let connection = resolved.connection.as_ref();

    let mono = FormatDescriptor::audio(
        Subtype::Pcm,
        AudioFormat {
            bits_per_sample: 16,
            channels: 1,
            sample_rate: 44_100,
        },
    );
    let media_type = resolve_audio_format(connection, &mono).unwrap();
    assert_eq!(media_type.wave_info().unwrap().channels, 1);

    let stereo_44 = FormatDescriptor::audio(
        Subtype::Pcm,
        AudioFormat {
            bits_per_sample: 16,
            channels: 2,
            sample_rate: 44_100,
        },
    );
    assert!(resolve_audio_format(connection, &stereo_44).is_err());
    assert_eq!(describe_audio_candidates(connection).unwrap().len(), 2);
}
