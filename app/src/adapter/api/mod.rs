use actix_web::http::StatusCode;
use actix_web::web::{self, Data, Path, Query};
use actix_web::HttpResponse;
use serde::Deserialize;

use crate::adapter::cloud::{CloudClient, CloudError};
use crate::adapter::db::{
    ClientResponseRepository, DeviceRepository, HistoryRepository, PresetRepository, SceneRepository,
};
use crate::execution::{ExecuteError, ExecutionService};
use crate::history::HistoryDispatcher;
use crate::port::SceneStore as _;

pub type AppExecutionService =
    ExecutionService<CloudClient, DeviceRepository, PresetRepository, ClientResponseRepository, HistoryDispatcher>;

#[derive(Clone)]
pub struct ApiState {
    pub executor: AppExecutionService,
    pub scenes: SceneRepository,
    pub cloud: CloudClient,
    pub history: HistoryRepository,
}

pub fn routes(state: ApiState) -> actix_web::Scope {
    web::scope("/api")
        .route("/scenes/{scene_id}/execute", web::post().to(execute_scene_handler))
        .route("/devices", web::get().to(device_list_handler))
        .route("/devices/{device_id}/state", web::get().to(device_state_handler))
        .route("/devices/{device_id}/history", web::get().to(device_history_handler))
        .route("/cloud/token", web::delete().to(invalidate_token_handler))
        .app_data(Data::new(state))
}

#[derive(Debug, Clone, Deserialize)]
struct ExecuteQuery {
    #[serde(default)]
    region_id: Option<String>,
}

async fn execute_scene_handler(
    state: Data<ApiState>,
    path: Path<String>,
    query: Query<ExecuteQuery>,
) -> HttpResponse {
    let scene_id = path.into_inner();

    let scene = match state.scenes.get(&scene_id).await {
        Ok(Some(scene)) => scene,
        Ok(None) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": format!("scene {} not found", scene_id)
            }));
        }
        Err(e) => {
            tracing::error!("Error loading scene {}: {:?}", scene_id, e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "error loading scene"
            }));
        }
    };

    match state.executor.execute_scene(&scene, query.region_id.as_deref()).await {
        Ok(run) => HttpResponse::Ok().json(serde_json::json!({
            "scene_id": scene_id,
            "applied": run.into_applied(),
        })),
        Err(e) => {
            let status = match &e {
                ExecuteError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                ExecuteError::CloudAuth(_) => StatusCode::BAD_GATEWAY,
                ExecuteError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::error!("Error executing scene {}: {}", scene_id, e);
            HttpResponse::build(status).json(serde_json::json!({ "error": e.to_string() }))
        }
    }
}

async fn device_list_handler(state: Data<ApiState>) -> HttpResponse {
    match state.cloud.get_devices().await {
        Ok(response) => HttpResponse::Ok().json(response.into_value()),
        Err(e) => cloud_error_response(e),
    }
}

async fn device_state_handler(state: Data<ApiState>, path: Path<String>) -> HttpResponse {
    let device_id = path.into_inner();

    match state.cloud.get_device_state(&device_id).await {
        Ok(response) => HttpResponse::Ok().json(response.into_value()),
        Err(e) => cloud_error_response(e),
    }
}

async fn device_history_handler(state: Data<ApiState>, path: Path<String>) -> HttpResponse {
    let device_id = path.into_inner();

    match state.history.recent(&device_id, 20).await {
        Ok(entries) => {
            let entries: Vec<serde_json::Value> = entries
                .into_iter()
                .map(|(created_date, response)| {
                    serde_json::json!({
                        "created_date": created_date,
                        "response": response,
                    })
                })
                .collect();
            HttpResponse::Ok().json(entries)
        }
        Err(e) => {
            tracing::error!("Error loading history for device {}: {:?}", device_id, e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "error loading device history"
            }))
        }
    }
}

/// Forces a fresh login on the next cloud call.
async fn invalidate_token_handler(state: Data<ApiState>) -> HttpResponse {
    state.cloud.invalidate_token().await;
    HttpResponse::NoContent().finish()
}

fn cloud_error_response(e: CloudError) -> HttpResponse {
    tracing::error!("Cloud request failed: {}", e);
    HttpResponse::BadGateway().json(serde_json::json!({ "error": e.to_string() }))
}
