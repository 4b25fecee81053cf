use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DeviceType;

/// A named, reusable target configuration for one device type. The
/// definition is an opaque parameter bag; it is parsed into typed
/// command parameters only when bound to a concrete device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preset {
    pub preset_id: String,
    pub preset_name: String,
    pub device_type: DeviceType,
    pub definition: serde_json::Value,
    pub created_date: DateTime<Utc>,
    pub modified_date: Option<DateTime<Utc>>,
}
