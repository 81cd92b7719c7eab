//! Capture device enumeration and connection point lookup
//!
//! Devices are identified by their stable path. Software devices often report no
//! path; their display name stands in as the identifier, so callers must accept
//! either form as a device url.

use capgraph_core::error::{CaptureError, CaptureResult};
use capgraph_core::format::MajorType;
use capgraph_core::platform::{
    CaptureService, ConnectionPoint, DeviceKind, DeviceMoniker, DeviceProperties, GraphNode,
    PinCategory, PinDirection,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// One enumerated capture device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Name shown to users
    pub display_name: String,
    /// Friendly name property, used for audio pairing
    pub friendly_name: String,
    /// Stable path, or the display name when the device has none
    pub stable_id: String,
}

impl DeviceInfo {
    /// Build from a property bag; `None` when the device reports no name at all
    pub fn from_properties(properties: &DeviceProperties) -> Option<Self> {
        let display_name = properties
            .description
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| properties.friendly_name.clone())
            .filter(|name| !name.is_empty())?;
        let friendly_name = properties
            .friendly_name
            .clone()
            .unwrap_or_else(|| display_name.clone());
        let stable_id = properties
            .device_path
            .clone()
            .filter(|path| !path.is_empty())
            .unwrap_or_else(|| display_name.clone());
        Some(Self {
            display_name,
            friendly_name,
            stable_id,
        })
    }

    /// Whether `url` names this device
    pub fn matches(&self, url: &str) -> bool {
        self.stable_id == url || self.display_name == url
    }
}

/// Device bound to its source node and chosen output connection
#[derive(Clone)]
pub struct ResolvedConnection {
    /// Device the connection belongs to
    pub device: DeviceInfo,
    /// Source node of the device
    pub node: Arc<dyn GraphNode>,
    /// Matching output connection point
    pub connection: Arc<dyn ConnectionPoint>,
}

/// Lists capture devices through the platform service
#[derive(Clone)]
pub struct DeviceEnumerator {
    service: Arc<dyn CaptureService>,
}

impl DeviceEnumerator {
    /// Create an enumerator over `service`
    pub fn new(service: Arc<dyn CaptureService>) -> Self {
        Self { service }
    }

    /// Underlying platform service
    pub fn service(&self) -> &Arc<dyn CaptureService> {
        &self.service
    }

    fn entries(&self, kind: DeviceKind) -> Vec<(DeviceInfo, Arc<dyn DeviceMoniker>)> {
        let monikers = match self.service.enumerate_devices(kind) {
            Ok(monikers) => monikers,
            Err(e) => {
                warn!("Device enumeration for {:?} unavailable: {}", kind, e);
                return Vec::new();
            }
        };

        monikers
            .into_iter()
            .filter_map(|moniker| match moniker.properties() {
                Ok(properties) => match DeviceInfo::from_properties(&properties) {
                    Some(info) => Some((info, moniker)),
                    None => {
                        debug!("Skipping {:?} device with no name", kind);
                        None
                    }
                },
                Err(e) => {
                    debug!("Skipping {:?} device with unreadable properties: {}", kind, e);
                    None
                }
            })
            .collect()
    }

    /// List devices of `kind`; empty when the platform service is unavailable
    pub fn list_devices(&self, kind: DeviceKind) -> Vec<DeviceInfo> {
        self.entries(kind).into_iter().map(|(info, _)| info).collect()
    }

    /// Devices of `kind` paired with their monikers, in enumeration order
    pub fn monikers(&self, kind: DeviceKind) -> Vec<(DeviceInfo, Arc<dyn DeviceMoniker>)> {
        self.entries(kind)
    }

    /// Find the device named by `url`
    pub fn find_device(
        &self,
        kind: DeviceKind,
        url: &str,
    ) -> Option<(DeviceInfo, Arc<dyn DeviceMoniker>)> {
        self.entries(kind).into_iter().find(|(info, _)| info.matches(url))
    }

    /// Friendly name of the device named by `url`
    pub fn friendly_name_for(&self, url: &str, kind: DeviceKind) -> Option<String> {
        self.find_device(kind, url).map(|(info, _)| info.friendly_name)
    }

    /// Bind the device named by `url` and find its capture output of `major` type
    pub fn resolve_output_connection(
        &self,
        url: &str,
        kind: DeviceKind,
        major: MajorType,
    ) -> CaptureResult<ResolvedConnection> {
        let (device, moniker) =
            self.find_device(kind, url)
                .ok_or_else(|| CaptureError::DeviceNotFound {
                    device_id: url.to_string(),
                })?;
        let node = moniker.bind()?;
        let connection = find_connection(
            node.as_ref(),
            PinDirection::Output,
            Some(major),
            Some(PinCategory::Capture),
        )
        .ok_or_else(|| CaptureError::ConnectionNotFound {
            what: format!("{:?} capture output on {}", major, device.display_name),
        })?;
        Ok(ResolvedConnection {
            device,
            node,
            connection,
        })
    }

    /// Find the first device of `kind` whose friendly name contains `needle`
    pub fn find_connection_by_friendly_name_substring(
        &self,
        kind: DeviceKind,
        needle: &str,
        case_insensitive: bool,
    ) -> CaptureResult<ResolvedConnection> {
        let not_found = || CaptureError::DeviceNotFound {
            device_id: needle.to_string(),
        };
        if needle.is_empty() {
            return Err(not_found());
        }

        let needle_cmp = if case_insensitive {
            needle.to_lowercase()
        } else {
            needle.to_string()
        };
        let major = match kind {
            DeviceKind::Video => MajorType::Video,
            DeviceKind::Audio => MajorType::Audio,
        };

        for (device, moniker) in self.entries(kind) {
            let name = if case_insensitive {
                device.friendly_name.to_lowercase()
            } else {
                device.friendly_name.clone()
            };
            if !name.contains(&needle_cmp) {
                continue;
            }

            let node = match moniker.bind() {
                Ok(node) => node,
                Err(e) => {
                    debug!("Could not bind {}: {}", device.display_name, e);
                    continue;
                }
            };
            if let Some(connection) =
                find_connection(node.as_ref(), PinDirection::Output, Some(major), None)
            {
                debug!("Paired '{}' with {}", needle, device.display_name);
                return Ok(ResolvedConnection {
                    device,
                    node,
                    connection,
                });
            }
        }
        Err(not_found())
    }
}

/// Find a connection point by direction, major type and category
///
/// A category is only compared when the connection point exposes one.
pub fn find_connection(
    node: &dyn GraphNode,
    direction: PinDirection,
    major: Option<MajorType>,
    category: Option<PinCategory>,
) -> Option<Arc<dyn ConnectionPoint>> {
    node.connection_points().into_iter().find(|pin| {
        if pin.direction() != direction {
            return false;
        }
        if let (Some(wanted), Some(actual)) = (category, pin.category()) {
            if wanted != actual {
                return false;
            }
        }
        match major {
            Some(major) => pin
                .media_types()
                .map(|types| types.iter().any(|media_type| media_type.major == major))
                .unwrap_or(false),
            None => true,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_prefers_description() {
        let info = DeviceInfo::from_properties(&DeviceProperties {
            friendly_name: Some("USB Cam".to_string()),
            description: Some("USB Camera (Front)".to_string()),
            device_path: Some("\\\\?\\usb#vid_1234".to_string()),
        })
        .unwrap();
        assert_eq!(info.display_name, "USB Camera (Front)");
        assert_eq!(info.friendly_name, "USB Cam");
        assert_eq!(info.stable_id, "\\\\?\\usb#vid_1234");
    }

    #[test]
    fn test_missing_path_falls_back_to_name() {
        let info = DeviceInfo::from_properties(&DeviceProperties {
            friendly_name: Some("OBS Virtual Camera".to_string()),
            description: None,
            device_path: None,
        })
        .unwrap();
        assert_eq!(info.stable_id, "OBS Virtual Camera");
        assert!(info.matches("OBS Virtual Camera"));
    }

    #[test]
    fn test_nameless_device_is_skipped() {
        assert!(DeviceInfo::from_properties(&DeviceProperties::default()).is_none());
    }
}
