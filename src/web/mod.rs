//! Web server: the reading page, the trigger API and the live reading feed.

pub mod config;
pub mod handlers;
pub mod router;
pub mod websocket;

// Re-export commonly used items
pub use config::WebConfig;
pub use handlers::AppState;
pub use router::create_app;

use crate::error::{NodeError, Result};
use std::future::Future;
use std::net::SocketAddr;
use tracing::info;

/// Serve the node's HTTP surface until `shutdown` resolves.
///
/// In-flight requests are allowed to finish after `shutdown` resolves.
pub async fn start_web_server<F>(config: WebConfig, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_app(&config, state);

    // Parse the bind address
    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| NodeError::config_error(format!("Invalid bind address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| NodeError::web_server_error(format!("Failed to bind to address: {}", e)))?;

    info!("Starting piflora web server on http://{}", addr);
    info!("Trigger API: http://{}/triggers/<name>", addr);
    info!("Reading API: http://{}/api/reading", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| NodeError::web_server_error(format!("Server error: {}", e)))?;

    Ok(())
}
