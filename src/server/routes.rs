//! HTTP route handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Map, Value};
use tracing::error;

use super::auth::{ApiKeys, require_api_key};
use crate::error::DataError;
use crate::service::DataService;

/// Shared state available to all request handlers.
pub struct AppState {
    pub service: DataService,
    pub api_keys: ApiKeys,
}

pub type SharedState = Arc<AppState>;

type Rows = Json<Vec<Map<String, Value>>>;

pub fn router(state: SharedState) -> Router {
    let protected = Router::new()
        .route("/get_mean_data", get(mean_handler))
        .route("/get_std_data", get(std_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health_handler))
        .merge(protected)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /get_mean_data, GET /get_std_data
// ---------------------------------------------------------------------------

async fn mean_handler(State(state): State<SharedState>) -> Result<Rows, AppError> {
    let result = state.service.mean_data().await?;
    Ok(Json(result.to_rows()))
}

async fn std_handler(State(state): State<SharedState>) -> Result<Rows, AppError> {
    let result = state.service.std_data().await?;
    Ok(Json(result.to_rows()))
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

async fn health_handler(State(state): State<SharedState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": state.service.owner(),
        "result_store": state.service.has_store(),
        "auth": state.api_keys.is_enabled(),
    }))
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

struct AppError {
    status: StatusCode,
    message: String,
}

impl From<DataError> for AppError {
    fn from(err: DataError) -> Self {
        error!(error = %err, "Data request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}
