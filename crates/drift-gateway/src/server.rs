//! Server startup and lifecycle

use crate::{routes, AppState, GatewayConfig};
use drift_node::{IsolatedNode, Pusher};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run the gateway server until the process ends
pub async fn run_server(config: GatewayConfig) -> anyhow::Result<()> {
    serve(config, std::future::pending()).await
}

/// Run the gateway server with graceful shutdown
pub async fn run_server_with_shutdown(
    config: GatewayConfig,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    serve(config, shutdown_signal).await
}

async fn serve(
    config: GatewayConfig,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(config));

    // The pusher drains the push index for as long as the server runs.
    // Without a peer transport wired in it stays quiet and chunks remain
    // local.
    let shutdown = CancellationToken::new();
    let pusher = Pusher::new(
        Arc::clone(&state.store),
        Arc::new(IsolatedNode),
        state.tags.clone(),
    );
    let pusher_handle = pusher.spawn(shutdown.child_token());

    let app = routes::create_router(Arc::clone(&state));
    let addr = state.config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("drift gateway listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    shutdown.cancel();
    pusher_handle.await?;
    info!("gateway shutdown complete");

    Ok(())
}
