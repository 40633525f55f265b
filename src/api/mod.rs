//! HTTP API module - webhook entry point and health check

mod webhook;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::bot::BotContext;
use crate::kv::KvStore;
use crate::openai::ImageGenerator;
use crate::session::SessionStore;
use crate::telegram::ChatTransport;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub kv: Arc<dyn KvStore>,
    pub transport: Arc<dyn ChatTransport>,
    pub generator: Arc<dyn ImageGenerator>,
}

impl AppState {
    /// Collaborator handles for one webhook invocation
    pub fn bot_context(&self) -> BotContext {
        BotContext {
            transport: self.transport.clone(),
            generator: self.generator.clone(),
            sessions: SessionStore::new(self.kv.clone()),
        }
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    let endpoint = post(webhook::handle_update).fallback(webhook::method_not_allowed);

    Router::new()
        .route("/health", get(health_check))
        .route("/", endpoint.clone())
        .route("/webhook", endpoint)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.kv.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy",
                database: "ok",
            }),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy",
                database: "error",
            }),
        ),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
}
