use config::{Config, ConfigError, Environment, File};
use infrastructure::{DatabaseConfig, HttpServerConfig, MonitoringConfig};
use serde::Deserialize;

use crate::adapter::cloud::CloudConfig;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub http_server: HttpServerConfig,
    pub monitoring: MonitoringConfig,
    pub cloud: CloudConfig,
    #[serde(default)]
    pub history: HistorySettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("config.toml"))
            .add_source(Environment::default().separator("_").list_separator(","));

        let s = builder.build()?;
        s.try_deserialize()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistorySettings {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    64
}
