use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row as _};

use crate::history::DeviceStateChange;
use crate::home::{ClientResponse, Device, DeviceType, Preset, Scene, SceneMapping, StateKey};
use crate::port::{ClientResponseStore, ClientResponseUpdate, DeviceStore, HistoryStore, PresetStore, SceneStore};

#[derive(Debug, Clone)]
pub struct DeviceRepository {
    pool: PgPool,
}

impl DeviceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn device_from_row(row: &PgRow) -> Result<Device> {
    let device_id: String = row.try_get("device_id")?;
    let device_type: String = row.try_get("device_type")?;
    let device_type = DeviceType::from_wire(&device_type)
        .with_context(|| format!("Unknown device type {} for device {}", device_type, device_id))?;

    Ok(Device {
        device_id,
        device_name: row.try_get("device_name")?,
        device_type,
        region_id: row.try_get("region_id")?,
        sync_enabled: row.try_get("sync_enabled")?,
    })
}

impl DeviceStore for DeviceRepository {
    async fn get_by_ids(&self, device_ids: &[String]) -> Result<Vec<Device>> {
        let rows = sqlx::query(
            r#"SELECT device_id, device_name, device_type, region_id, sync_enabled
               FROM device
               WHERE device_id = ANY($1)"#,
        )
        .bind(device_ids)
        .fetch_all(&self.pool)
        .await
        .context("Error loading devices")?;

        rows.iter().map(device_from_row).collect()
    }
}

#[derive(Debug, Clone)]
pub struct PresetRepository {
    pool: PgPool,
}

impl PresetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl PresetStore for PresetRepository {
    async fn get_by_ids(&self, preset_ids: &[String]) -> Result<Vec<Preset>> {
        let rows = sqlx::query(
            r#"SELECT preset_id, preset_name, device_type, definition, created_date, modified_date
               FROM preset
               WHERE preset_id = ANY($1)"#,
        )
        .bind(preset_ids)
        .fetch_all(&self.pool)
        .await
        .context("Error loading presets")?;

        rows.iter()
            .map(|row| {
                let preset_id: String = row.try_get("preset_id")?;
                let device_type: String = row.try_get("device_type")?;
                let device_type = DeviceType::from_wire(&device_type)
                    .with_context(|| format!("Unknown device type {} for preset {}", device_type, preset_id))?;

                Ok(Preset {
                    preset_id,
                    preset_name: row.try_get("preset_name")?,
                    device_type,
                    definition: row.try_get("definition")?,
                    created_date: row.try_get("created_date")?,
                    modified_date: row.try_get("modified_date")?,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct SceneRepository {
    pool: PgPool,
}

impl SceneRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl SceneStore for SceneRepository {
    async fn get(&self, scene_id: &str) -> Result<Option<Scene>> {
        let row = sqlx::query(
            r#"SELECT scene_id, scene_name, scene_category_id, mapping
               FROM scene
               WHERE scene_id = $1"#,
        )
        .bind(scene_id)
        .fetch_optional(&self.pool)
        .await
        .context("Error loading scene")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mapping: serde_json::Value = row.try_get("mapping")?;
        let mapping: Vec<SceneMapping> = serde_json::from_value(mapping)
            .with_context(|| format!("Invalid mapping stored for scene {}", scene_id))?;

        Ok(Some(Scene {
            scene_id: row.try_get("scene_id")?,
            scene_name: row.try_get("scene_name")?,
            scene_category_id: row.try_get("scene_category_id")?,
            mapping,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct ClientResponseRepository {
    pool: PgPool,
}

impl ClientResponseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ClientResponseStore for ClientResponseRepository {
    async fn get(&self, device_id: &str) -> Result<Option<ClientResponse>> {
        let row = sqlx::query(
            r#"SELECT device_id, preset_id, client_response, state_key, created_date, modified_date
               FROM client_response
               WHERE device_id = $1"#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .context("Error loading client response")?;

        row.map(|row| {
            let state_key: String = row.try_get("state_key")?;

            Ok(ClientResponse {
                device_id: row.try_get("device_id")?,
                preset_id: row.try_get("preset_id")?,
                client_response: row.try_get("client_response")?,
                state_key: StateKey::from(state_key),
                created_date: row.try_get("created_date")?,
                modified_date: row.try_get("modified_date")?,
            })
        })
        .transpose()
    }

    async fn upsert(&self, update: ClientResponseUpdate<'_>) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO client_response (device_id, preset_id, client_response, state_key, created_date)
               VALUES ($1, $2, $3, $4, now())
               ON CONFLICT (device_id) DO UPDATE
               SET preset_id = excluded.preset_id,
                   client_response = excluded.client_response,
                   state_key = excluded.state_key,
                   modified_date = now()"#,
        )
        .bind(update.device_id)
        .bind(update.preset_id)
        .bind(update.client_response)
        .bind(update.state_key.as_str())
        .execute(&self.pool)
        .await
        .context("Error upserting client response")?;

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HistoryRepository {
    pool: PgPool,
}

impl HistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn recent(&self, device_id: &str, limit: i64) -> Result<Vec<(DateTime<Utc>, serde_json::Value)>> {
        let rows = sqlx::query(
            r#"SELECT created_date, response
               FROM device_state_history
               WHERE device_id = $1
               ORDER BY created_date DESC
               LIMIT $2"#,
        )
        .bind(device_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Error loading device history")?;

        rows.iter()
            .map(|row| Ok((row.try_get("created_date")?, row.try_get("response")?)))
            .collect()
    }
}

impl HistoryStore for HistoryRepository {
    async fn insert(&self, change: &DeviceStateChange) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO device_state_history (device_id, preset_id, state_key, response, created_date)
               VALUES ($1, $2, $3, $4, now())"#,
        )
        .bind(&change.device_id)
        .bind(&change.preset_id)
        .bind(change.state_key.as_str())
        .bind(&change.response)
        .execute(&self.pool)
        .await
        .context("Error inserting device history")?;

        Ok(())
    }
}
