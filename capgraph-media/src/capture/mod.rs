//! Capture service backends

pub mod virtual_service;

use capgraph_core::platform::CaptureService;
use std::sync::Arc;

pub use virtual_service::{VirtualCaptureService, VirtualDeviceSpec};

/// In-memory stand-in used when no capture service is supplied
///
/// No host capture backend is wired in: this always returns a
/// [`VirtualCaptureService`] holding a fake "Virtual Webcam" and its
/// microphone. Real devices need a platform [`CaptureService`] passed in
/// explicitly.
pub fn default_capture_service() -> Arc<dyn CaptureService> {
    Arc::new(VirtualCaptureService::with_sample_devices())
}

#[cfg(test)]
mod tests {
    use super::*;
    use capgraph_core::platform::DeviceKind;

    #[test]
    fn test_default_service_is_in_memory_stand_in() {
        let service = default_capture_service();

        let cameras = service.enumerate_devices(DeviceKind::Video).unwrap();
        let microphones = service.enumerate_devices(DeviceKind::Audio).unwrap();
        assert_eq!(cameras.len(), 1);
        assert_eq!(microphones.len(), 1);
        assert_eq!(
            cameras[0].properties().unwrap().friendly_name.as_deref(),
            Some("Virtual Webcam")
        );
    }
}
