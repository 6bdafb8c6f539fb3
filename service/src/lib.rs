use config::Config;
use sse::manager::ManagerConfig;
use sse::Manager;
use std::sync::Arc;

pub mod config;
pub mod logging;

/// Builds the dispatcher configuration from the parsed service Config.
pub fn manager_config(config: &Config) -> ManagerConfig {
    ManagerConfig {
        ping_interval: config.ping_interval(),
        client_timeout: config.client_timeout(),
        max_clients: config.max_clients,
        enable_logging: config.enable_sse_logging,
    }
}

// Service-level state containing only infrastructure concerns
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub sse_manager: Arc<Manager>,
    pub config: Config,
}

impl AppState {
    pub fn new(app_config: Config, sse_manager: Arc<Manager>) -> Self {
        Self {
            sse_manager,
            config: app_config,
        }
    }
}
