use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Run a synchronous handler body on the blocking thread pool and turn its
/// result into a response. Repository calls hold store locks and may wait on
/// SQLite, so handlers never run them on an async worker.
pub async fn respond_blocking<F, R>(work: F) -> Response
where
    F: FnOnce() -> R + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(outcome) => outcome.into_response(),
        Err(err) => {
            error!(error = %err, "blocking handler task failed");
            let payload = json!({ "error": "internal server error" });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}
