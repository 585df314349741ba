//! Aircell Control Plane
//!
//! Single binary that runs:
//! - the cellular-network simulator engine and its worker threads
//! - the REST API that builds and mutates the simulated topology
//! - the WebSocket endpoint streaming live packet transfers

mod api;
mod state;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use aircell_sim::{ChannelBridge, SimConfig, Simulator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ─────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Simulator ───────────────────────────────────────────────
    // The in-memory bridge stands in for the virtual-NIC integration;
    // swap in a real FrameBridge implementation to carry live traffic.
    let bridge = Arc::new(ChannelBridge::new());
    let sim = Arc::new(Simulator::new(SimConfig::default(), bridge));

    // ── Shared state ────────────────────────────────────────────
    let state = state::AppState::new(sim);

    // ── Router ──────────────────────────────────────────────────
    let app = Router::new()
        .merge(api::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // ── Listen ──────────────────────────────────────────────────
    let addr: SocketAddr = std::env::var("LISTEN_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8000".into())
        .parse()?;

    tracing::info!("aircell-control listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
