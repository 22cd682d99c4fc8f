//! Thin HTTP surface over [`DataService`](crate::service::DataService).
//!
//! # Endpoints
//!
//! - `GET /get_mean_data`: per-class means (bearer key required)
//! - `GET /get_std_data`: per-class sample standard deviations (bearer key required)
//! - `GET /health`: liveness and cache/auth status

pub mod auth;
pub mod routes;

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;

pub use auth::ApiKeys;
pub use routes::{AppState, SharedState, router};

use crate::service::DataService;

pub fn state(service: DataService, api_keys: ApiKeys) -> SharedState {
    Arc::new(AppState { service, api_keys })
}

/// Serves the routes on `listener` until the process is stopped.
pub async fn serve(listener: TcpListener, state: SharedState) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, service = state.service.owner(), "HTTP server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
