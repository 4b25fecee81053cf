use serde::{Deserialize, Serialize};

/// Device kinds known to the device cloud. The wire names are the
/// vendor's device-type identifiers and show up verbatim in the cloud
/// device list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    #[serde(rename = "IOT.SMARTPLUGSWITCH")]
    Plug,
    #[serde(rename = "IOT.SMARTBULB")]
    Light,
    #[serde(rename = "IOT.IPCAMERA")]
    Camera,
}

impl DeviceType {
    pub fn wire_name(&self) -> &'static str {
        match self {
            DeviceType::Plug => "IOT.SMARTPLUGSWITCH",
            DeviceType::Light => "IOT.SMARTBULB",
            DeviceType::Camera => "IOT.IPCAMERA",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "IOT.SMARTPLUGSWITCH" => Some(DeviceType::Plug),
            "IOT.SMARTBULB" => Some(DeviceType::Light),
            "IOT.IPCAMERA" => Some(DeviceType::Camera),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub device_name: String,
    pub device_type: DeviceType,
    pub region_id: Option<String>,
    pub sync_enabled: bool,
}

impl Device {
    pub fn in_region(&self, region_id: &str) -> bool {
        self.region_id.as_deref() == Some(region_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_type_wire_names_round_trip() {
        for device_type in [DeviceType::Plug, DeviceType::Light, DeviceType::Camera] {
            assert_eq!(DeviceType::from_wire(device_type.wire_name()), Some(device_type));
        }

        assert_eq!(DeviceType::from_wire("IOT.UNKNOWN"), None);
    }

    #[test]
    fn region_match_requires_assigned_region() {
        let mut device = Device {
            device_id: "d1".to_owned(),
            device_name: "Desk Lamp".to_owned(),
            device_type: DeviceType::Light,
            region_id: None,
            sync_enabled: true,
        };

        assert!(!device.in_region("bedroom"));

        device.region_id = Some("bedroom".to_owned());
        assert!(device.in_region("bedroom"));
        assert!(!device.in_region("kitchen"));
    }
}
