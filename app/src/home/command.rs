use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Device, DeviceType, Preset};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlugState {
    pub state: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightState {
    pub state: bool,
    pub brightness: u32,
    pub hue: u32,
    pub saturation: u32,
    #[serde(default)]
    pub temperature: u32,
}

/// Command payload per device kind. Closed set: a new device kind means
/// a new variant with its own parameters, request body and key tuple.
#[derive(Debug, Clone, PartialEq)]
enum DeviceCommand {
    Plug(PlugState),
    Light(LightState),
}

/// Deterministic fingerprint of a device's effective target parameters.
/// Identical parameters always produce the same key; the key is the
/// oracle for skipping commands the device already reflects.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
pub struct StateKey(String);

impl StateKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum BindError {
    #[display("preset targets {preset:?} devices but device is a {device:?}")]
    TypeMismatch { preset: DeviceType, device: DeviceType },
    #[display("no command support for {_0:?} devices")]
    Unsupported(#[error(not(source))] DeviceType),
    #[display("invalid preset definition: {_0}")]
    Definition(serde_json::Error),
}

/// A device bound with a preset's definition into a concrete command.
#[derive(Debug, Clone)]
pub struct TypedDevice {
    pub device_id: String,
    pub device_name: String,
    command: DeviceCommand,
}

impl TypedDevice {
    pub fn bind(device: &Device, preset: &Preset) -> Result<Self, BindError> {
        if device.device_type != preset.device_type {
            return Err(BindError::TypeMismatch {
                preset: preset.device_type,
                device: device.device_type,
            });
        }

        let command = match device.device_type {
            DeviceType::Plug => {
                DeviceCommand::Plug(serde_json::from_value(preset.definition.clone()).map_err(BindError::Definition)?)
            }
            DeviceType::Light => {
                DeviceCommand::Light(serde_json::from_value(preset.definition.clone()).map_err(BindError::Definition)?)
            }
            DeviceType::Camera => return Err(BindError::Unsupported(DeviceType::Camera)),
        };

        Ok(Self {
            device_id: device.device_id.clone(),
            device_name: device.device_name.clone(),
            command,
        })
    }

    /// The passthrough `requestData` body for this command.
    pub fn to_request(&self) -> serde_json::Value {
        match &self.command {
            DeviceCommand::Plug(plug) => serde_json::json!({
                "system": {
                    "set_relay_state": {
                        "state": if plug.state { 1 } else { 0 }
                    }
                }
            }),
            DeviceCommand::Light(light) => serde_json::json!({
                "smartlife.iot.smartbulb.lightingservice": {
                    "transition_light_state": {
                        "mode": "normal",
                        "saturation": light.saturation,
                        "brightness": light.brightness,
                        "hue": light.hue,
                        "on_off": if light.state { 1 } else { 0 },
                        "color_temp": light.temperature,
                        "ignore_default": 1
                    }
                }
            }),
        }
    }

    /// Hash of the ordered tuple of effective parameters.
    pub fn state_key(&self) -> StateKey {
        let params = match &self.command {
            DeviceCommand::Plug(plug) => serde_json::json!([plug.state]),
            DeviceCommand::Light(light) => serde_json::json!([
                light.state,
                light.saturation,
                light.brightness,
                light.hue,
                light.temperature
            ]),
        };

        let digest = Sha256::digest(params.to_string().as_bytes());
        StateKey(format!("{:x}", digest))
    }
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_eq;
    use chrono::Utc;

    use super::*;

    fn light_device() -> Device {
        Device {
            device_id: "light-1".to_owned(),
            device_name: "Desk Lamp".to_owned(),
            device_type: DeviceType::Light,
            region_id: None,
            sync_enabled: true,
        }
    }

    fn plug_device() -> Device {
        Device {
            device_id: "plug-1".to_owned(),
            device_name: "Wax Melter".to_owned(),
            device_type: DeviceType::Plug,
            region_id: None,
            sync_enabled: true,
        }
    }

    fn preset(device_type: DeviceType, definition: serde_json::Value) -> Preset {
        Preset {
            preset_id: "p1".to_owned(),
            preset_name: "Evening Light".to_owned(),
            device_type,
            definition,
            created_date: Utc::now(),
            modified_date: None,
        }
    }

    fn light_definition() -> serde_json::Value {
        serde_json::json!({
            "state": true,
            "brightness": 80,
            "hue": 120,
            "saturation": 50,
            "temperature": 2700
        })
    }

    #[test]
    fn state_key_is_deterministic() {
        let preset = preset(DeviceType::Light, light_definition());

        let first = TypedDevice::bind(&light_device(), &preset).unwrap().state_key();
        let second = TypedDevice::bind(&light_device(), &preset).unwrap().state_key();

        assert_eq!(first, second);
    }

    #[test]
    fn state_key_changes_with_any_parameter() {
        let base = TypedDevice::bind(&light_device(), &preset(DeviceType::Light, light_definition()))
            .unwrap()
            .state_key();

        for (param, value) in [
            ("state", serde_json::json!(false)),
            ("brightness", serde_json::json!(81)),
            ("hue", serde_json::json!(121)),
            ("saturation", serde_json::json!(51)),
            ("temperature", serde_json::json!(2701)),
        ] {
            let mut definition = light_definition();
            definition[param] = value;

            let changed = TypedDevice::bind(&light_device(), &preset(DeviceType::Light, definition))
                .unwrap()
                .state_key();

            assert_ne!(base, changed, "changing {} must change the state key", param);
        }
    }

    #[test]
    fn plug_and_light_keys_differ() {
        let plug = TypedDevice::bind(&plug_device(), &preset(DeviceType::Plug, serde_json::json!({"state": true})))
            .unwrap()
            .state_key();
        let light = TypedDevice::bind(&light_device(), &preset(DeviceType::Light, light_definition()))
            .unwrap()
            .state_key();

        assert_ne!(plug, light);
    }

    #[test]
    fn plug_request_body() {
        let typed = TypedDevice::bind(&plug_device(), &preset(DeviceType::Plug, serde_json::json!({"state": true})))
            .unwrap();

        assert_json_eq!(
            typed.to_request(),
            serde_json::json!({
                "system": {
                    "set_relay_state": {
                        "state": 1
                    }
                }
            })
        );
    }

    #[test]
    fn light_request_body() {
        let typed = TypedDevice::bind(&light_device(), &preset(DeviceType::Light, light_definition())).unwrap();

        assert_json_eq!(
            typed.to_request(),
            serde_json::json!({
                "smartlife.iot.smartbulb.lightingservice": {
                    "transition_light_state": {
                        "mode": "normal",
                        "saturation": 50,
                        "brightness": 80,
                        "hue": 120,
                        "on_off": 1,
                        "color_temp": 2700,
                        "ignore_default": 1
                    }
                }
            })
        );
    }

    #[test]
    fn binding_rejects_type_mismatch() {
        let result = TypedDevice::bind(&plug_device(), &preset(DeviceType::Light, light_definition()));
        assert!(matches!(result, Err(BindError::TypeMismatch { .. })));
    }

    #[test]
    fn binding_rejects_cameras() {
        let camera = Device {
            device_id: "cam-1".to_owned(),
            device_name: "Porch Camera".to_owned(),
            device_type: DeviceType::Camera,
            region_id: None,
            sync_enabled: true,
        };

        let result = TypedDevice::bind(&camera, &preset(DeviceType::Camera, serde_json::json!({})));
        assert!(matches!(result, Err(BindError::Unsupported(DeviceType::Camera))));
    }

    #[test]
    fn binding_rejects_malformed_definition() {
        let result = TypedDevice::bind(&plug_device(), &preset(DeviceType::Plug, serde_json::json!({"state": "on"})));
        assert!(matches!(result, Err(BindError::Definition(_))));
    }
}
