//! Webhook endpoint
//!
//! POST / and POST /webhook - one Telegram update per request

use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, error};

use super::AppState;
use crate::bot::Dispatcher;
use crate::telegram::Update;

/// Decode and dispatch one update
///
/// The body is decoded by hand so that a malformed update is answered with
/// 500 rather than axum's 4xx rejection. Once decoded, the update is always
/// acknowledged with 200, whatever happened downstream.
pub(super) async fn handle_update(
    State(state): State<AppState>,
    body: Bytes,
) -> impl IntoResponse {
    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            error!("Malformed webhook body: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        }
    };

    let update_id = update.update_id;
    debug!("Received update {}", update_id);

    let ctx = state.bot_context();
    if let Err(e) = Dispatcher::new(&ctx).handle_update(update).await {
        error!("Update {} failed: {}", update_id, e);
    }

    (StatusCode::OK, "OK")
}

pub(super) async fn method_not_allowed() -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}
