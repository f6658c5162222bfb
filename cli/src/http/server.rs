//! HTTP server lifecycle.

use super::{
    middleware::{create_middleware_stack, request_logger},
    routes::create_router,
    AppState,
};
use crate::commands::cli::ServeArgs;
use axum::middleware;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use taskweave_core::api::{AppConfig, CliError, JobController};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Command line flags win over the `http_server` config section.
    pub fn resolve(args: &ServeArgs, cfg: &AppConfig) -> Self {
        Self {
            host: args
                .host
                .clone()
                .unwrap_or_else(|| cfg.http_server.host.clone()),
            port: args.port.unwrap_or(cfg.http_server.port),
        }
    }
}

fn get_servers_dir() -> Result<PathBuf, CliError> {
    let servers_dir = taskweave_core::config::get_data_dir()?.join("servers");
    fs::create_dir_all(&servers_dir)
        .map_err(|e| CliError::Command(format!("Failed to create servers directory: {e}")))?;
    Ok(servers_dir)
}

fn write_state_file(session_id: &str, config: &ServerConfig) -> Result<PathBuf, CliError> {
    let state_file = get_servers_dir()?.join("taskweave.state");

    let state = serde_json::json!({
        "session_id": session_id,
        "port": config.port,
        "pid": std::process::id(),
        "url": format!("http://{}:{}", config.host, config.port),
        "started_at": chrono::Local::now().to_rfc3339()
    });
    let text = serde_json::to_string_pretty(&state)
        .map_err(|e| CliError::Command(format!("Failed to encode state file: {e}")))?;

    fs::write(&state_file, text)
        .map_err(|e| CliError::Command(format!("Failed to write state file: {e}")))?;

    info!(target: "taskweave.http", "State file written to: {}", state_file.display());
    Ok(state_file)
}

pub async fn handle_serve(
    args: ServeArgs,
    cfg: &AppConfig,
    controller: JobController,
) -> Result<(), CliError> {
    let session_id = args
        .session_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let config = ServerConfig::resolve(&args, cfg);

    let (shutdown_tx, _) = broadcast::channel(1);
    let state = AppState::new(session_id.clone(), controller, shutdown_tx);

    let state_file = write_state_file(&session_id, &config)?;

    let result = start_server(session_id, config, state)
        .await
        .map_err(|e: Box<dyn std::error::Error + Send + Sync>| CliError::Command(e.to_string()));

    if let Err(e) = fs::remove_file(&state_file) {
        warn!(target: "taskweave.http", "Failed to remove state file: {}", e);
    }

    result
}

pub async fn start_server(
    session_id: String,
    config: ServerConfig,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!(
        target: "taskweave.http",
        "Starting HTTP server on {}:{} (session: {})",
        config.host, config.port, session_id
    );

    let app = create_router(state.clone())
        .layer(middleware::from_fn(request_logger))
        .layer(create_middleware_stack());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(target: "taskweave.http", "HTTP server listening on http://{}", addr);

    let mut shutdown_rx = state.shutdown_tx.subscribe();

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!(target: "taskweave.http", "Received Ctrl+C signal");
                }
                _ = shutdown_rx.recv() => {
                    info!(target: "taskweave.http", "Received shutdown signal from API");
                }
                _ = wait_for_sigterm() => {
                    info!(target: "taskweave.http", "Received SIGTERM signal");
                }
            }

            info!(target: "taskweave.http", "Starting graceful shutdown...");
        })
        .await?;

    info!(target: "taskweave.http", "Server shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(target: "taskweave.http", "SIGTERM handler unavailable: {}", e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cfg = AppConfig::default();
        let args = ServeArgs {
            host: None,
            port: Some(9100),
            session_id: None,
        };
        let resolved = ServerConfig::resolve(&args, &cfg);
        assert_eq!(resolved.host, cfg.http_server.host);
        assert_eq!(resolved.port, 9100);
    }
}
