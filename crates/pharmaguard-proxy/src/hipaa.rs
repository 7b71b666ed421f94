//! HIPAA acknowledgment gate
//!
//! Staff in gated roles must acknowledge the HIPAA notice before they may
//! reach protected health information. The gate sits inside the audit layer,
//! so every rejection is itself audited as a denied call.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pharmaguard_classifiers::{ClassificationConfig, ComplianceFlagEngine};
use pharmaguard_core::{Actor, RequestSnapshot, RouteInfo};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::config::HipaaConfig;

/// Decides whether a call needs a prior acknowledgment
#[derive(Debug, Clone)]
pub struct HipaaGate {
    config: HipaaConfig,
    flags: ComplianceFlagEngine,
}

impl HipaaGate {
    pub fn new(
        config: HipaaConfig,
        classification: &ClassificationConfig,
    ) -> pharmaguard_core::Result<Self> {
        Ok(Self {
            config,
            flags: ComplianceFlagEngine::new(classification)?,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// PHI access by a gated role without the acknowledgment header
    pub fn requires_acknowledgment(
        &self,
        route: &RouteInfo,
        actor: Option<&Actor>,
        headers: &HeaderMap,
    ) -> bool {
        if !self.config.enabled {
            return false;
        }
        let Some(actor) = actor else {
            return false;
        };
        let gated = self
            .config
            .gated_roles
            .iter()
            .any(|role| role.eq_ignore_ascii_case(&actor.role));

        gated && !self.acknowledged(headers) && self.flags.evaluate(route).is_phi_access
    }

    fn acknowledged(&self, headers: &HeaderMap) -> bool {
        headers
            .get(self.config.acknowledgment_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
    }

    fn rejection(&self) -> Response {
        let body = json!({
            "error": {
                "message": "HIPAA acknowledgment required before accessing patient information",
                "type": "hipaa_acknowledgment_required",
                "acknowledgment_url": self.config.acknowledgment_url,
            }
        });
        (StatusCode::FORBIDDEN, Json(body)).into_response()
    }
}

/// Gate middleware for `axum::middleware::from_fn_with_state`
pub async fn hipaa_middleware(
    State(gate): State<Arc<HipaaGate>>,
    request: Request,
    next: Next,
) -> Response {
    if !gate.is_enabled() {
        return next.run(request).await;
    }

    // Prefer the audit layer's snapshot; fall back to the raw request
    let required = match request.extensions().get::<Arc<RequestSnapshot>>() {
        Some(snapshot) => gate.requires_acknowledgment(
            &snapshot.route,
            snapshot.actor.as_ref(),
            request.headers(),
        ),
        None => gate.requires_acknowledgment(
            &RouteInfo::new(request.method().as_str(), request.uri().path()),
            request.extensions().get::<Actor>(),
            request.headers(),
        ),
    };

    if required {
        warn!(
            path = %request.uri().path(),
            "PHI access blocked pending HIPAA acknowledgment"
        );
        return gate.rejection();
    }

    next.run(request).await
}
