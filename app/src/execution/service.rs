use std::collections::HashMap;

use futures::future::{join_all, try_join_all};

use crate::adapter::cloud::{AuthToken, CloudError};
use crate::history::DeviceStateChange;
use crate::home::{ClientResponse, Device, Preset, Scene, TypedDevice};
use crate::port::{
    ClientResponseStore, ClientResponseUpdate, DeviceCloud, DeviceStore, HistoryDispatch, PresetStore,
};

use super::{DeviceApplyResult, PairOutcome, SceneRun, SkipReason};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ExecuteError {
    #[display("invalid scene: {_0}")]
    InvalidArgument(#[error(not(source))] String),
    #[display("cloud authentication failed: {_0}")]
    CloudAuth(CloudError),
    #[display("store error: {_0}")]
    Store(#[error(not(source))] anyhow::Error),
}

/// Applies a scene to the device fleet: resolves the preset→device
/// mapping, fetches one auth token for the whole batch, skips devices
/// already believed to be in the target state and fans the remaining
/// commands out concurrently with per-device failure isolation.
#[derive(Debug, Clone)]
pub struct ExecutionService<C, D, P, R, H> {
    cloud: C,
    device_store: D,
    preset_store: P,
    response_store: R,
    history: H,
}

impl<C, D, P, R, H> ExecutionService<C, D, P, R, H>
where
    C: DeviceCloud,
    D: DeviceStore,
    P: PresetStore,
    R: ClientResponseStore,
    H: HistoryDispatch,
{
    pub fn new(cloud: C, device_store: D, preset_store: P, response_store: R, history: H) -> Self {
        Self {
            cloud,
            device_store,
            preset_store,
            response_store,
            history,
        }
    }

    #[tracing::instrument(skip_all, fields(scene = %scene.scene_name))]
    pub async fn execute_scene(&self, scene: &Scene, region_id: Option<&str>) -> Result<SceneRun, ExecuteError> {
        if scene.mapping.is_empty() {
            return Err(ExecuteError::InvalidArgument(format!(
                "scene {} has no device mappings",
                scene.scene_name
            )));
        }

        let pairs = scene.device_preset_pairs();

        // Pairs are already unique per device, so the device list is too.
        let device_ids: Vec<String> = pairs.iter().map(|(device_id, _)| device_id.clone()).collect();
        let mut preset_ids: Vec<String> = pairs.iter().map(|(_, preset_id)| preset_id.clone()).collect();
        preset_ids.sort();
        preset_ids.dedup();

        // Token warm-up and the three bulk loads are independent;
        // everything after this point reuses the one token.
        let (token, devices, presets, responses) = tokio::join!(
            self.cloud.refresh_token_if_absent(),
            self.device_store.get_by_ids(&device_ids),
            self.preset_store.get_by_ids(&preset_ids),
            try_join_all(device_ids.iter().map(|device_id| self.response_store.get(device_id))),
        );

        let token = token.map_err(ExecuteError::CloudAuth)?;
        let devices = devices.map_err(ExecuteError::Store)?;
        let presets = presets.map_err(ExecuteError::Store)?;
        let responses = responses.map_err(ExecuteError::Store)?;

        let device_map: HashMap<&str, &Device> =
            devices.iter().map(|device| (device.device_id.as_str(), device)).collect();
        let preset_map: HashMap<&str, &Preset> =
            presets.iter().map(|preset| (preset.preset_id.as_str(), preset)).collect();
        let response_map: HashMap<&str, &ClientResponse> = responses
            .iter()
            .flatten()
            .map(|response| (response.device_id.as_str(), response))
            .collect();

        let outcomes = join_all(pairs.iter().map(|(device_id, preset_id)| {
            self.apply_pair(device_id, preset_id, region_id, &token, &device_map, &preset_map, &response_map)
        }))
        .await;

        let applied = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, PairOutcome::Applied(_)))
            .count();
        tracing::info!(
            "Scene {} finished: {} applied, {} skipped",
            scene.scene_name,
            applied,
            outcomes.len() - applied
        );

        Ok(SceneRun {
            scene_id: scene.scene_id.clone(),
            outcomes,
        })
    }

    /// Per-pair boundary: every failure is converted into an outcome so
    /// one bad device never cancels or fails its siblings.
    #[allow(clippy::too_many_arguments)]
    async fn apply_pair(
        &self,
        device_id: &str,
        preset_id: &str,
        region_id: Option<&str>,
        token: &AuthToken,
        device_map: &HashMap<&str, &Device>,
        preset_map: &HashMap<&str, &Preset>,
        response_map: &HashMap<&str, &ClientResponse>,
    ) -> PairOutcome {
        let reason = match self
            .try_apply(device_id, preset_id, region_id, token, device_map, preset_map, response_map)
            .await
        {
            Ok(result) => return PairOutcome::Applied(result),
            Err(reason) => reason,
        };

        match &reason {
            SkipReason::AlreadyApplied => {
                tracing::debug!("Device {} already reflects preset {}, skipping", device_id, preset_id)
            }
            SkipReason::FilteredOut => tracing::debug!("Device {} excluded by region filter", device_id),
            SkipReason::UnresolvedDevice => {
                tracing::warn!("Scene references unknown device {}, skipping", device_id)
            }
            SkipReason::UnresolvedPreset => {
                tracing::warn!("Scene references unknown preset {}, skipping device {}", preset_id, device_id)
            }
            SkipReason::InvalidBinding(e) => {
                tracing::warn!("Cannot bind preset {} to device {}: {}", preset_id, device_id, e)
            }
            SkipReason::Failed(e) => {
                tracing::error!("Failed to apply preset {} to device {}: {}", preset_id, device_id, e)
            }
        }

        PairOutcome::Skipped {
            device_id: device_id.to_owned(),
            preset_id: preset_id.to_owned(),
            reason,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn try_apply(
        &self,
        device_id: &str,
        preset_id: &str,
        region_id: Option<&str>,
        token: &AuthToken,
        device_map: &HashMap<&str, &Device>,
        preset_map: &HashMap<&str, &Preset>,
        response_map: &HashMap<&str, &ClientResponse>,
    ) -> Result<DeviceApplyResult, SkipReason> {
        let device = device_map.get(device_id).ok_or(SkipReason::UnresolvedDevice)?;

        if let Some(region_id) = region_id
            && !device.in_region(region_id)
        {
            return Err(SkipReason::FilteredOut);
        }

        let preset = preset_map.get(preset_id).ok_or(SkipReason::UnresolvedPreset)?;

        let typed = TypedDevice::bind(device, preset).map_err(|e| SkipReason::InvalidBinding(e.to_string()))?;
        let state_key = typed.state_key();

        if let Some(stored) = response_map.get(device_id)
            && stored.state_key == state_key
        {
            return Err(SkipReason::AlreadyApplied);
        }

        tracing::info!("Set device state: {} ({}): preset {}", device.device_name, device_id, preset_id);

        let response = self
            .cloud
            .set_device_state(device_id, typed.to_request(), token)
            .await
            .map_err(|e| SkipReason::Failed(e.to_string()))?;

        let raw = response.into_value();

        // The physical device changed even if the bookkeeping write
        // fails, so an upsert error does not demote the apply.
        let update = ClientResponseUpdate {
            device_id,
            preset_id,
            client_response: &raw,
            state_key: &state_key,
        };
        if let Err(e) = self.response_store.upsert(update).await {
            tracing::error!("Error recording client response for device {}: {:?}", device_id, e);
        }

        self.history.notify(DeviceStateChange {
            device_id: device_id.to_owned(),
            preset_id: preset_id.to_owned(),
            state_key: state_key.clone(),
            response: raw.clone(),
        });

        Ok(DeviceApplyResult {
            device_id: device_id.to_owned(),
            preset_id: preset_id.to_owned(),
            state_key,
            response: raw,
        })
    }
}
