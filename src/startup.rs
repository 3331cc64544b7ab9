//! Startup helpers for the patchlog server.

use std::process::ExitCode;
use std::sync::Arc;

use crate::core::config::{PORT_ENV, StorageConfig};
use crate::server::{self, AppState};

/// Run the server (used by the `patchlog-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting patchlog v{}", env!("CARGO_PKG_VERSION"));

    let config = StorageConfig::from_env();
    tracing::info!("Store: {}", config.sqlite_path.display());

    let port = get_port();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let state = match rt.block_on(AppState::new(&config)) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to initialize store: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(server::run_server(state, port)) {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Initialize application state without starting the server.
///
/// # Errors
/// Returns an error if state creation fails.
pub async fn initialize() -> Result<Arc<AppState>, Box<dyn std::error::Error + Send + Sync>> {
    let config = StorageConfig::from_env();
    AppState::new(&config)
        .await
        .map_err(|e| format!("Failed to initialize store: {e}").into())
}

/// Get configured server port.
#[must_use]
pub fn get_port() -> u16 {
    std::env::var(PORT_ENV)
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(server::DEFAULT_PORT)
}
