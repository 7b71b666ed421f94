//! Audit middleware
//!
//! Wraps the protected application. Each call is captured before its handler
//! runs; once the response exists the call is classified and, when audit-worthy,
//! dispatched inline. Dispatch failures go to the error channel and never
//! change the response.

use axum::body::HttpBody;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponseParts, Response, ResponseParts};
use pharmaguard_classifiers::AuditAssembler;
use pharmaguard_core::{BoundEntity, ResponseOutcome, RouteParam};
use pharmaguard_telemetry::{metrics, Dispatcher};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::capture::{Capture, REQUEST_ID_HEADER};

/// Domain objects a handler resolved for its route parameters.
///
/// Returned as a response part, these replace the raw segments captured for
/// the same parameters before the call is classified.
#[derive(Debug, Clone, Default)]
pub struct BoundEntities(Vec<(String, BoundEntity)>);

impl BoundEntities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, parameter: impl Into<String>, entity: BoundEntity) -> Self {
        self.0.push((parameter.into(), entity));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn into_parameters(self) -> impl Iterator<Item = (String, RouteParam)> {
        self.0
            .into_iter()
            .map(|(name, entity)| (name, RouteParam::Entity(entity)))
    }
}

impl IntoResponseParts for BoundEntities {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.extensions_mut().insert(self);
        Ok(res)
    }
}

/// State of the audit middleware
#[derive(Clone)]
pub struct AuditLayer {
    capture: Arc<Capture>,
    assembler: Arc<AuditAssembler>,
    dispatcher: Dispatcher,
}

impl AuditLayer {
    pub fn new(capture: Capture, assembler: AuditAssembler, dispatcher: Dispatcher) -> Self {
        Self {
            capture: Arc::new(capture),
            assembler: Arc::new(assembler),
            dispatcher,
        }
    }
}

impl std::fmt::Debug for AuditLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLayer")
            .field("capture", &self.capture)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

/// Audit middleware for `axum::middleware::from_fn_with_state`
pub async fn audit_middleware(
    State(layer): State<AuditLayer>,
    request: Request,
    next: Next,
) -> Response {
    let (snapshot, request) = layer.capture.snapshot(request).await;

    let mut response = next.run(request).await;

    let outcome = ResponseOutcome::since(response.status().as_u16(), snapshot.started_at)
        .with_body_size(body_size(&response));

    let classify_start = Instant::now();
    let record = match response.extensions_mut().remove::<BoundEntities>() {
        Some(bound) if !bound.is_empty() => {
            let snapshot = snapshot.with_bound_parameters(bound.into_parameters());
            layer.assembler.evaluate(&snapshot, &outcome)
        }
        _ => layer.assembler.evaluate(&snapshot, &outcome),
    };
    metrics::record_classification_latency(classify_start.elapsed());
    metrics::record_request(record.is_some());

    if let Some(record) = record {
        let report = layer.dispatcher.dispatch_logged(&record).await;
        debug!(
            request_id = %record.correlation.request_id,
            event_type = %record.event_type,
            persisted = report.persisted,
            channels = ?report.channels,
            "Request audited"
        );
    }

    if let Ok(value) = HeaderValue::from_str(&snapshot.correlation.request_id) {
        response
            .headers_mut()
            .entry(REQUEST_ID_HEADER)
            .or_insert(value);
    }

    response
}

fn body_size(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .or_else(|| response.body().size_hint().exact())
}
