use anyhow::{Context, Result};
use axum::{Json, Router, extract::State, routing::get};
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
};
use serde_json::Value;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::ProtocolServer;

pub fn router(server: ProtocolServer) -> Router {
    let mcp = {
        let server = server.clone();
        StreamableHttpService::new(
            move || Ok(server.clone()),
            LocalSessionManager::default().into(),
            StreamableHttpServerConfig::default(),
        )
    };

    Router::new()
        .route("/debug", get(debug))
        .with_state(server)
        .nest_service("/mcp", mcp)
}

async fn debug(State(server): State<ProtocolServer>) -> Json<Value> {
    Json(server.introspect())
}

/// Serve MCP on `/mcp` and the registry snapshot on `/debug` until cancelled.
///
/// After cancellation, open connections get `grace` to finish before they
/// are dropped.
pub async fn serve(
    server: ProtocolServer,
    addr: SocketAddr,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind MCP server to {addr}"))?;

    log::info!("MCP server listening on http://{addr}/mcp");
    log::info!("Debug endpoint: http://{addr}/debug");

    let serving = axum::serve(listener, router(server))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();
    tokio::pin!(serving);

    tokio::select! {
        result = &mut serving => result.context("MCP server failed"),
        () = async {
            shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
        } => {
            log::warn!("MCP server did not drain within {grace:?}, closing remaining connections");
            Ok(())
        }
    }
}
