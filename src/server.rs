//! HTTP front end.
//!
//! `POST /` and `POST /send` run one invocation each. The body is taken raw
//! so malformed JSON maps to the same 400 as a missing field.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;

use crate::invocation::{ErrorResponse, Invoker};

/// Build the router.
pub fn create_router(invoker: Arc<Invoker>) -> Router {
    Router::new()
        .route("/", post(send_notification))
        .route("/send", post(send_notification))
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .with_state(invoker)
}

/// Serve until ctrl-c or SIGTERM.
pub async fn start_server(invoker: Arc<Invoker>, addr: SocketAddr) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("[WebPush] Listening on {}", listener.local_addr()?);

    axum::serve(listener, create_router(invoker))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn send_notification(State(invoker): State<Arc<Invoker>>, body: Bytes) -> Response {
    match invoker.invoke_raw(&body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => {
            let status = StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if status.is_server_error() {
                log::error!("[WebPush] Invocation failed: {}", err);
            } else {
                log::warn!("[WebPush] Rejected invocation: {}", err);
            }
            (status, Json(ErrorResponse::from(&err))).into_response()
        }
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    log::info!("[WebPush] Shutting down");
}
