use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::WatcherResult;
use crate::sweep::{StatusBoard, WatcherStatus};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub sweeping: bool,
    pub sweeps_completed: u64,
}

/// GET /health - degraded while the last sweep could not discover commitments
pub async fn health_check(State(status): State<Arc<StatusBoard>>) -> Json<HealthResponse> {
    let snapshot = status.snapshot();
    let discovery_failing = snapshot
        .last_summary
        .as_ref()
        .is_some_and(|s| s.discovery_error.is_some());

    Json(HealthResponse {
        status: if discovery_failing {
            "degraded".to_string()
        } else {
            "healthy".to_string()
        },
        timestamp: Utc::now(),
        sweeping: snapshot.sweeping,
        sweeps_completed: snapshot.sweeps_completed,
    })
}

/// GET /status - signer, sweep counters and the last sweep summary
pub async fn get_status(State(status): State<Arc<StatusBoard>>) -> Json<WatcherStatus> {
    Json(status.snapshot())
}

pub fn create_app(status: Arc<StatusBoard>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(status)
}

pub async fn run_server(
    app: Router,
    bind_address: &str,
    mut shutdown: watch::Receiver<bool>,
) -> WatcherResult<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Status server listening on: {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    Ok(())
}
