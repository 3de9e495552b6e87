//! On-demand HTTP query endpoint.
//!
//! `GET /train_monitor/getDelays` runs one query pass on the shared monitor and
//! returns the notifications, one per line.

use std::{net::SocketAddr, sync::Arc};

use axum::{extract::State, routing::get, Router};
use railwatch_core::monitor::DelayMonitor;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const DELAYS_PATH: &str = "/train_monitor/getDelays";
pub const FALLBACK_BODY: &str = "No Services Found";

pub fn router(monitor: Arc<DelayMonitor>) -> Router {
    Router::new()
        .route(DELAYS_PATH, get(get_delays))
        .with_state(monitor)
}

async fn get_delays(State(monitor): State<Arc<DelayMonitor>>) -> String {
    let retry = monitor.settings().retry;
    let monitor = &monitor;
    let body = retry
        .run(
            "on-demand query",
            move || async move { monitor.query_services().await.map(|n| n.join("\n")) },
            move || monitor.reset_clients(),
            FALLBACK_BODY.to_string(),
        )
        .await;
    info!(body = %body, "on-demand query answered");
    body
}

pub async fn serve(
    addr: SocketAddr,
    monitor: Arc<DelayMonitor>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, path = DELAYS_PATH, "query endpoint listening");
    axum::serve(listener, router(monitor))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}
