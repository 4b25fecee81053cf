use settings::Settings;

use crate::adapter::api::{ApiState, AppExecutionService};
use crate::adapter::cloud::CloudClient;
use crate::adapter::db::{
    ClientResponseRepository, DeviceRepository, HistoryRepository, PresetRepository, SceneRepository,
};
use crate::execution::ExecutionService;

mod adapter;
mod execution;
mod history;
mod home;
pub mod port;
mod settings;

struct Infrastructure {
    db_pool: sqlx::PgPool,
}

#[tokio::main(flavor = "multi_thread")]
pub async fn main() {
    let settings = Settings::new().expect("Error reading configuration");

    let infrastructure = Infrastructure::init(&settings)
        .await
        .expect("Error initializing infrastructure");

    let http_server = settings.http_server.clone();
    let cloud = CloudClient::new(settings.cloud).expect("Error initializing cloud client");

    let history_repo = HistoryRepository::new(infrastructure.db_pool.clone());
    let (history_dispatcher, history_worker) =
        history::new_dispatcher(history_repo.clone(), settings.history.queue_capacity);

    let executor: AppExecutionService = ExecutionService::new(
        cloud.clone(),
        DeviceRepository::new(infrastructure.db_pool.clone()),
        PresetRepository::new(infrastructure.db_pool.clone()),
        ClientResponseRepository::new(infrastructure.db_pool.clone()),
        history_dispatcher,
    );

    let http_server_exec = {
        let api_state = ApiState {
            executor,
            scenes: SceneRepository::new(infrastructure.db_pool.clone()),
            cloud,
            history: history_repo,
        };

        async move {
            http_server
                .run_server(move || vec![adapter::api::routes(api_state.clone())])
                .await
                .expect("HTTP server execution failed");
        }
    };

    tracing::info!("Starting main loop");

    tokio::select!(
        _ = http_server_exec => {},
        _ = history_worker.run() => {},
    );
}

impl Infrastructure {
    pub async fn init(settings: &Settings) -> anyhow::Result<Self> {
        settings.monitoring.init().expect("Error initializing monitoring");

        let db_pool = settings.database.new_pool().await.expect("Error initializing database");

        Ok(Self { db_pool })
    }
}
