//! HTTP boundary
//!
//! `POST /execute` hands the raw body to the gateway so that undecodable
//! payloads are answered with `R-SCHEMA-001` instead of a framework error.
//! Bodies that cannot be read at all, including those over the size limit,
//! get the same rejection record.

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use execgate_runtime::{ExecutionGateway, ExecutionResponse, RejectionCode};
use serde_json::json;

pub fn router(gateway: Arc<ExecutionGateway>) -> Router {
    let max_body_size = gateway.config().api.max_body_size;
    Router::new()
        .route("/execute", post(execute_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(max_body_size))
        .with_state(gateway)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve<F>(gateway: Arc<ExecutionGateway>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", gateway.config().api.host, gateway.config().api.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to address {}: {}", addr, e))?;

    tracing::info!("Execution gateway listening on {}", addr);

    axum::serve(listener, router(gateway).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

async fn execute_handler(
    State(gateway): State<Arc<ExecutionGateway>>,
    body: Result<Bytes, BytesRejection>,
) -> impl IntoResponse {
    let response = match body {
        Ok(body) => gateway.submit_json(&body).await,
        Err(rejection) => {
            let reason = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                format!(
                    "Request body exceeds {} bytes",
                    gateway.config().api.max_body_size
                )
            } else {
                "Unreadable request body".to_string()
            };
            tracing::info!(
                code = %RejectionCode::SchemaMalformed,
                status = %rejection.status(),
                "Rejected request body"
            );
            ExecutionGateway::reject_malformed("", reason)
        }
    };
    let status = match &response {
        ExecutionResponse::Rejected(_) => StatusCode::FORBIDDEN,
        ExecutionResponse::Completed(_) => StatusCode::OK,
    };
    (status, Json(response))
}

async fn health_handler(State(gateway): State<Arc<ExecutionGateway>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": crate::VERSION,
        "replay_cache_entries": gateway.cache().len(),
    }))
}
