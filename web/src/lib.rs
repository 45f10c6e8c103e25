//! HTTP surface: the router and the SSE streaming endpoint.

use log::*;
use service::AppState;

pub mod params;
mod router;
mod stream;

pub use router::init_router;

/// Bind the configured interface and port and serve until shutdown.
pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let address = format!(
        "{}:{}",
        app_state.config.interface, app_state.config.port
    );
    let router = init_router(app_state);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Server running at http://{address}/");
    axum::serve(listener, router).await
}
