use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StateKey;

/// The last raw cloud response recorded for a device, together with the
/// state key it represents. One record per device; acts purely as an
/// idempotency oracle for scene runs. A missing record and a record
/// with a different state key mean the same thing: send the command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientResponse {
    pub device_id: String,
    pub preset_id: String,
    pub client_response: serde_json::Value,
    pub state_key: StateKey,
    pub created_date: DateTime<Utc>,
    pub modified_date: Option<DateTime<Utc>>,
}
