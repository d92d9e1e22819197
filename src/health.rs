//! Health check HTTP endpoint for deployment platform monitoring.

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Router};

use crate::database::Database;

/// Start the health check HTTP server.
pub async fn start_health_server(port: u16, db: Database) {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/", get(health_handler))
        .with_state(db);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(port = port, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind health check port");

    axum::serve(listener, app)
        .await
        .expect("health check server failed");
}

/// Health check handler - 200 when the database answers, 503 otherwise.
async fn health_handler(State(db): State<Database>) -> (StatusCode, &'static str) {
    match db.health_check().await {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "UNHEALTHY")
        }
    }
}

/// Spawn the health check server as a background task.
pub fn spawn_health_server(port: u16, db: Database) {
    tokio::spawn(async move {
        start_health_server(port, db).await;
    });
}
