//! HTTP routes and handlers

use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::{header, uri::Uri, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use pharmaguard_core::RequestSnapshot;
use pharmaguard_telemetry::{AuditQuery, AuditStats, StoredRecord};
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::capture::REQUEST_ID_HEADER;
use crate::hipaa::hipaa_middleware;
use crate::middleware::audit_middleware;
use crate::proxy::AppState;

/// Headers that describe a single connection and are never forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn create_router(state: AppState) -> Router {
    let audit_api = Router::new()
        .route("/audit/events", get(audit_events))
        .route("/audit/stats", get(audit_stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ));

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .merge(audit_api)
        .fallback(forward)
        .layer(RequestBodyLimitLayer::new(state.config.max_request_bytes))
        .with_state(state.clone());

    protect(app, &state)
}

/// Wrap an application in the audit stack.
///
/// From the outside in: request tracing, the audit layer, panic recovery and
/// the HIPAA gate. Panics and gate rejections therefore reach the audit layer
/// as ordinary 500 and 403 responses.
pub fn protect(app: Router, state: &AppState) -> Router {
    app.layer(middleware::from_fn_with_state(
        state.hipaa.clone(),
        hipaa_middleware,
    ))
    .layer(CatchPanicLayer::new())
    .layer(middleware::from_fn_with_state(
        state.audit.clone(),
        audit_middleware,
    ))
    .layer(TraceLayer::new_for_http())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

/// Bearer token check for the audit API; the API does not exist without a token
async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return Err(AppError::NotFound);
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}

async fn audit_events(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<StoredRecord>>, AppError> {
    let service = state.audit_service.clone();
    let records = tokio::task::spawn_blocking(move || service.query(&query)).await??;
    debug!("Audit API returned {} records", records.len());
    Ok(Json(records))
}

async fn audit_stats(State(state): State<AppState>) -> Result<Json<AuditStats>, AppError> {
    let service = state.audit_service.clone();
    let stats = tokio::task::spawn_blocking(move || service.stats()).await??;
    Ok(Json(stats))
}

/// Forward anything not served locally to the backend
async fn forward(State(state): State<AppState>, request: Request) -> Result<Response, AppError> {
    let Some(backend) = state.backend.as_ref() else {
        return Err(AppError::NotFound);
    };

    let (parts, body) = request.into_parts();
    let target = backend_url(backend, &parts.uri);

    let mut headers = strip_hop_by_hop(&parts.headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    if let Some(snapshot) = parts.extensions.get::<Arc<RequestSnapshot>>() {
        if let Ok(value) = HeaderValue::from_str(&snapshot.correlation.request_id) {
            headers.insert(REQUEST_ID_HEADER, value);
        }
    }

    let body = axum::body::to_bytes(body, state.config.max_request_bytes)
        .await
        .map_err(|_| AppError::PayloadTooLarge)?;

    let upstream = state
        .http_client
        .request(parts.method, target)
        .headers(headers)
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    let headers = strip_hop_by_hop(upstream.headers());

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Backend URL for an inbound URI, keeping the backend's base path
fn backend_url(backend: &url::Url, uri: &Uri) -> url::Url {
    let mut url = backend.clone();
    let base = backend.path().trim_end_matches('/');
    url.set_path(&format!("{}{}", base, uri.path()));
    url.set_query(uri.query());
    url
}

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut headers = headers.clone();
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
    headers
}

/// Error handling
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Missing or invalid admin token")]
    Unauthorized,

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Backend request failed: {0}")]
    Backend(#[from] reqwest::Error),

    #[error("Audit store error: {0}")]
    Audit(#[from] pharmaguard_core::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Backend(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            AppError::Backend(_) => StatusCode::BAD_GATEWAY,
            AppError::Audit(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::PayloadTooLarge => "payload_too_large",
            AppError::Backend(_) => "backend_error",
            AppError::Audit(_) | AppError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = json!({
            "error": {
                "message": self.to_string(),
                "type": self.kind(),
            }
        });

        let mut response = (status, Json(body)).into_response();
        if matches!(self, AppError::Unauthorized) {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_url_keeps_base_path() {
        let backend = url::Url::parse("http://127.0.0.1:9000/app/").unwrap();
        let uri: Uri = "/prescriptions/42?expand=patient".parse().unwrap();
        assert_eq!(
            backend_url(&backend, &uri).as_str(),
            "http://127.0.0.1:9000/app/prescriptions/42?expand=patient"
        );

        let bare = url::Url::parse("http://backend.internal").unwrap();
        let uri: Uri = "/health".parse().unwrap();
        assert_eq!(backend_url(&bare, &uri).as_str(), "http://backend.internal/health");
    }

    #[test]
    fn test_hop_by_hop_removed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let stripped = strip_hop_by_hop(&headers);
        assert_eq!(stripped.len(), 1);
        assert!(stripped.contains_key(header::CONTENT_TYPE));
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(AppError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let response = AppError::Unauthorized.into_response();
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}
