use log::*;
use service::config::Config;
use service::logging::Logger;
use service::AppState;
use sse::Manager;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::new();
    Logger::init_logger(&config);

    if config.client_timeout() <= config.ping_interval() {
        warn!(
            "client_timeout_ms ({}) does not exceed ping_interval_ms ({}); \
             connections may be evicted before a heartbeat can refresh them",
            config.client_timeout_ms, config.ping_interval_ms
        );
    }

    let sse_manager = Manager::new(service::manager_config(&config));
    let app_state = AppState::new(config.clone(), sse_manager.clone());
    let router = web::init_router(app_state);

    let listen_address = format!(
        "{}:{}",
        config.interface.as_deref().unwrap_or("127.0.0.1"),
        config.port
    );
    let listener = tokio::net::TcpListener::bind(&listen_address).await?;
    info!("Server starting... listening for event-stream clients on http://{listen_address}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(sse_manager.clone()))
        .await?;

    // Shutdown path may have run already; destroy is idempotent.
    sse_manager.destroy();

    Ok(())
}

async fn shutdown_signal(sse_manager: Arc<Manager>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install shutdown signal handler: {e}");
        return;
    }
    info!("Shutdown signal received; disconnecting all clients");
    sse_manager.destroy();
}
