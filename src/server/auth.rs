//! Bearer-key guard for the data routes.
//!
//! Requests must carry `Authorization: Bearer <key>` with one of the keys
//! configured in `API_KEYS`. With no keys configured the guard lets every
//! request through.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, info};

use super::routes::SharedState;

/// Shared set of valid keys. `None` means auth is disabled.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys(Option<Arc<HashSet<String>>>);

impl ApiKeys {
    pub fn new(keys: &[String]) -> Self {
        let keys: HashSet<String> = keys
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            info!("API key auth disabled (no keys configured)");
            return Self(None);
        }
        info!(n_keys = keys.len(), "API key auth enabled");
        Self(Some(Arc::new(keys)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    pub fn validate(&self, key: &str) -> bool {
        match &self.0 {
            Some(keys) => keys.contains(key),
            None => true,
        }
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim())
}

/// Middleware rejecting requests without a valid bearer key.
pub async fn require_api_key(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.api_keys.is_enabled() {
        return next.run(request).await;
    }

    match extract_bearer(request.headers()) {
        Some(token) if state.api_keys.validate(token) => next.run(request).await,
        Some(_) => unauthorized("Could not validate credentials"),
        None => {
            debug!(path = %request.uri().path(), "Request without bearer token");
            unauthorized("Not authenticated")
        }
    }
}

fn unauthorized(msg: &str) -> Response {
    let body = serde_json::json!({ "error": msg });
    (
        StatusCode::UNAUTHORIZED,
        [("www-authenticate", "Bearer")],
        Json(body),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_keys_disables_auth() {
        let keys = ApiKeys::new(&[" ".to_string()]);
        assert!(!keys.is_enabled());
        assert!(keys.validate("anything"));
    }

    #[test]
    fn test_keys_validate() {
        let keys = ApiKeys::new(&["key-abc".to_string(), "key-xyz".to_string()]);
        assert!(keys.is_enabled());
        assert!(keys.validate("key-abc"));
        assert!(!keys.validate("key-bad"));
    }

    #[test]
    fn test_extract_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer my-secret-key".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Some("my-secret-key"));

        let mut basic = HeaderMap::new();
        basic.insert("authorization", "Basic abc".parse().unwrap());
        assert_eq!(extract_bearer(&basic), None);
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
    }
}
