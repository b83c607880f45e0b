//! City Explorer server library logic.
//!
//! Request handling lives elsewhere; this crate wires the database layer
//! into the process and exposes the health route used to confirm that
//! startup finished and the schema is current.

pub mod config;

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use city_explorer_db::Database;
use serde::Serialize;
use thiserror::Error;

/// Application state shared across all request handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Handle bound to the application schema.
    pub db: Database,
}

/// Errors returned by request handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub schema: String,
    /// Highest migration ordinal recorded in the tracker.
    pub migration: Option<i64>,
}

/// Health check handler.
///
/// Reads the migration pointer through the shared handle, so a `200` means
/// the database is reachable as well as the process.
async fn health(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    let db = state.db.clone();
    let migration = tokio::task::spawn_blocking(move || city_explorer_db::tracker_pointer(&db))
        .await
        .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))?
        .map_err(|e| {
            tracing::error!(error = %e, "health check could not read migration tracker");
            ApiError::InternalServerError(format!("database unavailable: {}", e))
        })?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        schema: state.db.schema().to_string(),
        migration,
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .layer(Extension(Arc::new(state)))
}
