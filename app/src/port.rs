#![allow(async_fn_in_trait)]

use anyhow::Result;

use crate::adapter::cloud::{AuthToken, CloudError, CloudResponse};
use crate::history::DeviceStateChange;
use crate::home::{ClientResponse, Device, Preset, Scene, StateKey};

pub trait DeviceStore {
    async fn get_by_ids(&self, device_ids: &[String]) -> Result<Vec<Device>>;
}

pub trait PresetStore {
    async fn get_by_ids(&self, preset_ids: &[String]) -> Result<Vec<Preset>>;
}

pub trait SceneStore {
    async fn get(&self, scene_id: &str) -> Result<Option<Scene>>;
}

#[derive(Debug, Clone, Copy)]
pub struct ClientResponseUpdate<'a> {
    pub device_id: &'a str,
    pub preset_id: &'a str,
    pub client_response: &'a serde_json::Value,
    pub state_key: &'a StateKey,
}

/// Idempotency oracle keyed by device: the last cloud response and the
/// state key it represents. Consulted, never locked.
pub trait ClientResponseStore {
    async fn get(&self, device_id: &str) -> Result<Option<ClientResponse>>;
    async fn upsert(&self, update: ClientResponseUpdate<'_>) -> Result<()>;
}

pub trait DeviceCloud {
    async fn refresh_token_if_absent(&self) -> Result<AuthToken, CloudError>;
    async fn set_device_state(
        &self,
        device_id: &str,
        request_data: serde_json::Value,
        token: &AuthToken,
    ) -> Result<CloudResponse, CloudError>;
}

/// Fire-and-forget: failures are logged on the dispatcher side and never
/// affect the caller.
pub trait HistoryDispatch {
    fn notify(&self, change: DeviceStateChange);
}

pub trait HistoryStore {
    async fn insert(&self, change: &DeviceStateChange) -> Result<()>;
}
