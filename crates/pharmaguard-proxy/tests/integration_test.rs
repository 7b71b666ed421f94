//! Integration tests for PharmaGuard proxy

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use pharmaguard_core::{EventType, FixedClock, REDACTION_MARKER};
use pharmaguard_proxy::{
    create_router, protect, AppState, HipaaConfig, ProxyConfig, RouteDefinition,
};
use pharmaguard_telemetry::{AuditQuery, LogChannel, MemorySink, PersistenceConfig, StoredRecord};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const ADMIN_TOKEN: &str = "audit-secret";

fn config(dir: &Path) -> ProxyConfig {
    ProxyConfig {
        admin_token: Some(ADMIN_TOKEN.to_string()),
        routes: vec![RouteDefinition::new(
            "prescriptions.store",
            Some("POST"),
            "/prescriptions/{prescription}",
        )],
        hipaa: HipaaConfig {
            enabled: true,
            ..Default::default()
        },
        persistence: PersistenceConfig {
            audit_dir: dir.to_path_buf(),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn state_with(config: ProxyConfig) -> (AppState, Arc<MemorySink>) {
    let handle = PrometheusBuilder::new().build_recorder().handle();
    // A Wednesday afternoon, outside every time-based risk factor
    let clock = Arc::new(FixedClock::parse("2026-10-14T14:00:00+00:00").unwrap());
    let sink = Arc::new(MemorySink::new());
    let state = AppState::with_parts(config, handle, clock, sink.clone()).unwrap();
    (state, sink)
}

async fn create_prescription(Json(body): Json<Value>) -> impl IntoResponse {
    (StatusCode::CREATED, Json(json!({"id": 42, "drug": body["drug"]})))
}

async fn show_patient() -> Json<Value> {
    Json(json!({"id": 7, "name": "Jane Doe"}))
}

async fn boom() -> &'static str {
    panic!("handler bug")
}

/// A pharmacy application embedding the audit stack
fn pharmacy_app(state: &AppState) -> Router {
    let app = Router::new()
        .route("/prescriptions/:id", post(create_prescription))
        .route("/patients/:id", get(show_patient))
        .route("/api/boom", get(boom));
    protect(app, state)
}

fn as_pharmacist(builder: axum::http::request::Builder) -> axum::http::request::Builder {
    builder
        .header("x-actor-id", "7")
        .header("x-actor-name", "Dana Reyes")
        .header("x-actor-role", "pharmacist")
}

fn stored(state: &AppState) -> Vec<StoredRecord> {
    state.audit_service.query(&AuditQuery::new()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_prescription_created_is_audited() {
    let temp_dir = TempDir::new().unwrap();
    let (state, sink) = state_with(config(temp_dir.path()));

    let body = r#"{"drug": "oxycodone", "quantity": 30, "password": "hunter2"}"#;
    let request = as_pharmacist(Request::builder().method("POST").uri("/prescriptions/42"))
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, body.len())
        .header("x-request-id", "req-rx-42")
        .body(Body::from(body))
        .unwrap();

    let response = pharmacy_app(&state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["x-request-id"], "req-rx-42");
    // The handler still saw the full body
    assert_eq!(json_body(response).await["drug"], "oxycodone");

    let records = stored(&state);
    assert_eq!(records.len(), 1);
    let record = &records[0].record;

    assert_eq!(record.event_type, EventType::PrescriptionCreated);
    assert_eq!(record.entity.entity_id, Some(42));
    assert_eq!(record.route.name.as_deref(), Some("prescriptions.store"));
    assert_eq!(record.correlation.request_id, "req-rx-42");
    assert_eq!(record.payload["password"], json!(REDACTION_MARKER));
    assert_eq!(record.payload["quantity"], json!(30));
    assert!(record.flags.is_controlled_substance);
    assert_eq!(record.flags.retention_years, 2);
    assert_eq!(
        record.description,
        "Dana Reyes (#7) created prescription [prescription #42] via POST /prescriptions/42"
    );
    assert!(sink.channels().contains(&LogChannel::Pharmacy));
}

#[tokio::test]
async fn test_hipaa_gate_rejection_is_audited() {
    let temp_dir = TempDir::new().unwrap();
    let (state, sink) = state_with(config(temp_dir.path()));
    let app = pharmacy_app(&state);

    let response = app
        .clone()
        .oneshot(
            as_pharmacist(Request::builder().uri("/patients/7"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "hipaa_acknowledgment_required");
    assert_eq!(body["error"]["acknowledgment_url"], "/hipaa/acknowledge");

    let response = app
        .oneshot(
            as_pharmacist(Request::builder().uri("/patients/7"))
                .header("x-hipaa-acknowledged", "true")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let records = stored(&state);
    assert_eq!(records.len(), 2);

    let denied = &records[0].record;
    assert_eq!(denied.status_code, 403);
    assert!(!denied.granted);
    assert!(denied.flags.is_phi_access);
    assert_eq!(denied.flags.retention_years, 6);

    let granted = &records[1].record;
    assert_eq!(granted.event_type, EventType::PatientProfileAccessed);
    assert!(granted.granted);

    assert_eq!(
        sink.channels()
            .iter()
            .filter(|c| **c == LogChannel::Hipaa)
            .count(),
        2
    );
}

#[tokio::test]
async fn test_handler_panic_is_audited() {
    let temp_dir = TempDir::new().unwrap();
    let (state, _) = state_with(config(temp_dir.path()));

    let response = pharmacy_app(&state)
        .oneshot(
            as_pharmacist(Request::builder().uri("/api/boom"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let records = stored(&state);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].record.status_code, 500);
    assert!(!records[0].record.granted);
}

#[tokio::test]
async fn test_health_not_audited() {
    let temp_dir = TempDir::new().unwrap();
    let (state, _) = state_with(config(temp_dir.path()));
    let app = create_router(state.clone());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(stored(&state).is_empty());
}

#[tokio::test]
async fn test_audit_api_requires_token() {
    let temp_dir = TempDir::new().unwrap();
    let (state, _) = state_with(config(temp_dir.path()));
    let app = create_router(state.clone());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/audit/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/audit/stats")
                .header(header::AUTHORIZATION, "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/audit/stats")
                .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");

    // Both rejected attempts were audited as authentication failures
    let stats = json_body(response).await;
    assert_eq!(stats["total_records"], 2);
}

#[tokio::test]
async fn test_audit_events_query() {
    let temp_dir = TempDir::new().unwrap();
    let (state, _) = state_with(config(temp_dir.path()));

    let body = r#"{"drug": "amoxicillin"}"#;
    pharmacy_app(&state)
        .oneshot(
            as_pharmacist(Request::builder().method("POST").uri("/prescriptions/9"))
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::CONTENT_LENGTH, body.len())
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let response = create_router(state.clone())
        .oneshot(
            Request::builder()
                .uri("/audit/events?event_type=prescription_created&actor_id=7")
                .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = json_body(response).await;
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event_type"], "prescription_created");
    assert_eq!(events[0]["entity_id"], 9);
}

#[tokio::test]
async fn test_audit_api_disabled_without_token() {
    let temp_dir = TempDir::new().unwrap();
    let (state, _) = state_with(ProxyConfig {
        admin_token: None,
        ..config(temp_dir.path())
    });

    let response = create_router(state)
        .oneshot(
            Request::builder()
                .uri("/audit/events")
                .header(header::AUTHORIZATION, "Bearer anything")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_path_without_backend() {
    let temp_dir = TempDir::new().unwrap();
    let (state, _) = state_with(config(temp_dir.path()));
    let app = create_router(state.clone());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/catalog").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(stored(&state).is_empty());

    let response = app
        .oneshot(
            as_pharmacist(Request::builder().uri("/catalog"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let records = stored(&state);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].record.status_code, 404);
}

#[tokio::test]
async fn test_forwarding_to_backend() {
    // Backend echoing the body and the correlation header it received
    let backend = Router::new().route(
        "/api/orders",
        post(|headers: HeaderMap, body: String| async move {
            let request_id = headers
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            (
                StatusCode::CREATED,
                [("x-seen-request-id", request_id)],
                body,
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, backend).await.unwrap();
    });

    let temp_dir = TempDir::new().unwrap();
    let (state, _) = state_with(ProxyConfig {
        backend_url: Some(format!("http://{}", addr)),
        ..config(temp_dir.path())
    });

    let body = r#"{"sku": "AMOX-500", "card_number": "4111111111111111"}"#;
    let response = create_router(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/orders")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::CONTENT_LENGTH, body.len())
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let seen = response.headers()["x-seen-request-id"]
        .to_str()
        .unwrap()
        .to_string();
    let echoed = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(echoed, body.as_bytes());

    let records = stored(&state);
    assert_eq!(records.len(), 1);
    let record = &records[0].record;
    assert_eq!(record.correlation.request_id, seen);
    assert_eq!(record.status_code, 201);
    assert_eq!(record.payload["card_number"], json!(REDACTION_MARKER));
    assert_eq!(record.payload["sku"], json!("AMOX-500"));
}
