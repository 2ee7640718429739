use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;
use visaidd::config::load_config;
use visaidd::server::{get_socket_path, DaemonServer};
use visaidd::state::DaemonState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .with_target(false)
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .init();

    info!("visaid daemon (visaidd) starting...");

    let config = load_config()?;
    let io_timeout = Duration::from_secs(config.timeouts.socket_operation_timeout_seconds);

    let state = Arc::new(Mutex::new(DaemonState::new(config)?));
    let server = DaemonServer::new(get_socket_path(), Arc::clone(&state), io_timeout);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            let mut state = state.lock().await;
            if state.is_active() {
                if let Err(e) = state.deactivate().await {
                    warn!("Failed to stop inference loop: {}", e);
                }
            }
        }
    }

    Ok(())
}
