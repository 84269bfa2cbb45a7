use crate::models::ApiError;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{self, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{collections::HashSet, env, sync::Arc};
use tracing::{info, warn};

/// Admin keys accepted by the protected routes.
#[derive(Clone)]
pub struct AdminAuth {
    keys: Arc<HashSet<String>>,
}

/// Inserted into request extensions for authenticated calls.
#[derive(Clone, Debug)]
pub struct AdminContext {
    pub key_hint: String,
}

impl AdminAuth {
    pub fn from_env() -> Self {
        let raw = env::var("ADMIN_API_KEYS").unwrap_or_default();
        Self::from_list(&raw)
    }

    /// An empty list leaves every protected route locked.
    pub fn from_list(raw: &str) -> Self {
        let keys: HashSet<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .collect();

        if keys.is_empty() {
            warn!(
                target: "importer.api",
                "ADMIN_API_KEYS produced no keys; protected routes will reject every request"
            );
        } else {
            info!(
                target: "importer.api",
                key_count = keys.len(),
                "loaded admin keys from env"
            );
        }

        Self {
            keys: Arc::new(keys),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.keys.is_empty()
    }

    fn authenticate(&self, presented: &str) -> Option<AdminContext> {
        self.keys.contains(presented).then(|| AdminContext {
            key_hint: key_hint(presented),
        })
    }
}

pub async fn require_admin(
    State(auth): State<AdminAuth>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !auth.is_configured() {
        warn!(
            target: "importer.api",
            path = %request.uri().path(),
            "rejected request: no admin keys configured"
        );
        return unauthorized_response(
            "admin_keys_not_configured",
            "Set ADMIN_API_KEYS to enable the admin API",
        );
    }

    let Some(presented) = extract_admin_key(request.headers()) else {
        return unauthorized_response("missing_admin_key", "Provide X-Admin-Key or Bearer token");
    };

    let Some(context) = auth.authenticate(&presented) else {
        return unauthorized_response("invalid_admin_key", "Key not recognized");
    };

    request.extensions_mut().insert(context);
    next.run(request).await
}

fn extract_admin_key(headers: &http::HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(http::header::AUTHORIZATION)
        && let Ok(raw) = value.to_str()
        && raw.len() >= 7
        && raw.get(..6).is_some_and(|scheme| scheme.eq_ignore_ascii_case("bearer"))
    {
        return Some(raw[6..].trim().to_string());
    }
    headers
        .get("X-Admin-Key")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn key_hint(key: &str) -> String {
    let tail: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("…{tail}")
}

fn unauthorized_response(code: &str, message: &str) -> Response {
    let payload = ApiError {
        error: code.to_string(),
        detail: Some(message.to_string()),
    };
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}
