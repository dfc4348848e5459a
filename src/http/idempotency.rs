//! Idempotent replay of mutating API responses.
//!
//! # Responsibilities
//! - Require an `X-Idempotency-Key` header on guarded routes
//! - Replay the stored response verbatim for a key that was seen before
//! - Capture first responses (status, headers, body) into the shared
//!   store with a TTL
//!
//! # Design Decisions
//! - The cache write is a set-if-absent: when two requests with the same
//!   key race, exactly one response body becomes the canonical one
//! - A broken store degrades to pass-through instead of failing requests;
//!   losing replay protection beats losing the endpoint

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header::HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Header clients must send on guarded routes.
pub const IDEMPOTENCY_HEADER: &str = "x-idempotency-key";

/// Upper bound on a cached response body.
const MAX_CAPTURED_BODY_BYTES: usize = 1024 * 1024;

/// A captured response, stored as JSON under `idem:{key}`.
#[derive(Debug, Serialize, Deserialize)]
struct CachedResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

/// Route middleware enforcing idempotent replay.
pub async fn idempotency_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let key = match request
        .headers()
        .get(IDEMPOTENCY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        Some(key) => key.to_string(),
        None => {
            return ApiError::bad_request(format!("missing {IDEMPOTENCY_HEADER} header"))
                .into_response();
        }
    };
    let store_key = format!("idem:{key}");

    match state.store.get(&store_key).await {
        Ok(Some(raw)) => match serde_json::from_str::<CachedResponse>(&raw) {
            Ok(cached) => {
                tracing::debug!(key = %key, "Replaying idempotent response");
                metrics::record_idempotency(true);
                return replay(cached);
            }
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "Discarding unreadable cached response");
            }
        },
        Ok(None) => {}
        Err(error) => {
            tracing::warn!(key = %key, error = %error, "Idempotency store unavailable; passing through");
        }
    }
    metrics::record_idempotency(false);

    let response = next.run(request).await;
    capture(&state, &key, &store_key, response).await
}

/// Rebuild a response from its captured form.
fn replay(cached: CachedResponse) -> Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
    let mut response = Response::builder().status(status);

    if let Some(headers) = response.headers_mut() {
        for (name, value) in &cached.headers {
            match (
                name.parse::<HeaderName>(),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => {
                    tracing::warn!(header = %name, "Skipping unreplayable cached header");
                }
            }
        }
    }

    match response.body(Body::from(cached.body)) {
        Ok(response) => response,
        Err(error) => {
            tracing::error!(error = %error, "Failed to rebuild cached response");
            ApiError::internal("idempotent replay failed").into_response()
        }
    }
}

/// Capture the response into the store and hand it back to the client.
async fn capture(state: &AppState, key: &str, store_key: &str, response: Response) -> Response {
    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_CAPTURED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::error!(key = %key, error = %error, "Failed to buffer response for capture");
            return ApiError::internal("response capture failed").into_response();
        }
    };

    let body = match String::from_utf8(bytes.to_vec()) {
        Ok(body) => Some(body),
        Err(_) => {
            tracing::warn!(key = %key, "Response body is not UTF-8; skipping idempotency capture");
            None
        }
    };

    if let Some(body) = body {
        // First value per header name; content-length is recomputed on replay
        let mut seen: HashSet<String> = HashSet::new();
        let mut headers: Vec<(String, String)> = Vec::new();
        for (name, value) in parts.headers.iter() {
            let name_str = name.as_str().to_string();
            if name_str == "content-length" || !seen.insert(name_str.clone()) {
                continue;
            }
            if let Ok(value) = value.to_str() {
                headers.push((name_str, value.to_string()));
            }
        }

        let cached = CachedResponse {
            status: parts.status.as_u16(),
            headers,
            body: body.clone(),
        };
        match serde_json::to_string(&cached) {
            Ok(serialized) => {
                let ttl = Duration::from_secs(state.idempotency_ttl_secs);
                match state.store.set_nx(store_key, &serialized, Some(ttl)).await {
                    Ok(true) => {
                        tracing::debug!(key = %key, status = cached.status, "Captured idempotent response");
                    }
                    Ok(false) => {
                        tracing::debug!(key = %key, "Lost capture race; keeping earlier response");
                    }
                    Err(error) => {
                        tracing::warn!(key = %key, error = %error, "Failed to store idempotent response");
                    }
                }
            }
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "Failed to serialize response for capture");
            }
        }

        return Response::from_parts(parts, Body::from(body));
    }

    Response::from_parts(parts, Body::from(bytes))
}
