//! HTTP surface for provider webhooks
//!
//! | Method | Path            | Response                                   |
//! |--------|-----------------|--------------------------------------------|
//! | POST   | `/api/webhook/` | 201 stored, 400 rejected, 500 store fault   |
//! | GET    | `/health`       | 200 `ok`                                   |
//!
//! The trailing slash is optional on the webhook path; providers differ.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use callbridge_ingest_core::{WebhookEngine, WebhookReply};
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<WebhookEngine>,
}

impl AppState {
    pub fn new(engine: WebhookEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

/// Create the router with request tracing
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/webhook/", post(receive_webhook))
        .route("/api/webhook", post(receive_webhook))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookReply>) {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    tracing::debug!(content_type = content_type.unwrap_or("none"), bytes = body.len(), "Received webhook");

    let result = state.engine.ingest(&body, content_type).await;

    let status = match &result {
        Ok(_) => StatusCode::CREATED,
        Err(e) if e.field_errors().is_some() => StatusCode::BAD_REQUEST,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(WebhookReply::from_result(&result)))
}

async fn health() -> &'static str {
    "ok"
}
