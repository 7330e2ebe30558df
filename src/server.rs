use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use eyre::Result;
use log::{info, warn};

use crate::batch::{BatchError, BatchRequest, Orchestrator, to_items};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub batch_timeout: Option<Duration>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/summarize", post(summarize_batch))
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "Server started at http://{} ({} concurrent videos)",
        listener.local_addr()?,
        state.orchestrator.max_concurrency()
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn summarize_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };

    info!("Batch request: {} urls, language {}", request.urls.len(), request.language);

    // Dropping the run future (deadline or client disconnect) cancels every in-flight item.
    let run = state.orchestrator.run(&request);
    let outcome = match state.batch_timeout {
        Some(limit) => match tokio::time::timeout(limit, run).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Batch of {} urls exceeded its {limit:?} deadline", request.urls.len());
                return error_response(StatusCode::GATEWAY_TIMEOUT, "batch deadline exceeded");
            }
        },
        None => run.await,
    };

    match outcome {
        Ok(results) => (StatusCode::OK, Json(to_items(&results))).into_response(),
        Err(e @ BatchError::EmptyBatch) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

// Well-formed JSON in the wrong shape is malformed input too, not axum's 422.
fn rejection_response(rejection: JsonRejection) -> Response {
    let status = match &rejection {
        JsonRejection::JsonDataError(_) => StatusCode::BAD_REQUEST,
        other => other.status(),
    };
    error_response(status, rejection.body_text())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}
