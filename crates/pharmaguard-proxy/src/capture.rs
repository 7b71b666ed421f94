//! Request capture
//!
//! Builds the [`RequestSnapshot`] of a call before its handler runs. JSON and
//! form bodies within the capture limit are buffered, merged with the query
//! string into the payload, and handed back to the handler unchanged. A body
//! that fails while being read is handed back as a body that fails the same way.

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Request};
use axum::http::{header, request::Parts, HeaderMap};
use pharmaguard_core::{NetworkInfo, Redactor, RequestSnapshot, RouteParam};
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::CaptureConfig;
use crate::identity::IdentityProvider;
use crate::route_table::RouteTable;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
}

impl BodyKind {
    fn of(headers: &HeaderMap) -> Option<Self> {
        let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
        let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
        if mime == "application/json" || mime.ends_with("+json") {
            Some(Self::Json)
        } else if mime == "application/x-www-form-urlencoded" {
            Some(Self::Form)
        } else {
            None
        }
    }
}

/// Captures request snapshots
pub struct Capture {
    routes: RouteTable,
    identity: Arc<dyn IdentityProvider>,
    redactor: Redactor,
    max_body_bytes: usize,
}

impl Capture {
    pub fn new(
        config: &CaptureConfig,
        routes: RouteTable,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            routes,
            identity,
            redactor: Redactor::new().with_fields(&config.redact_fields),
            max_body_bytes: config.max_body_bytes,
        }
    }

    /// Snapshot a request and return it ready for the handler.
    ///
    /// The snapshot is also placed in the request's extensions.
    pub async fn snapshot(&self, request: Request) -> (Arc<RequestSnapshot>, Request) {
        let started_at = Instant::now();
        let (parts, body) = request.into_parts();

        let mut payload = query_payload(&parts);
        let body = self.capture_body(&parts, body, &mut payload).await;

        let snapshot = Arc::new(self.build(&parts, payload, started_at));

        let mut request = Request::from_parts(parts, body);
        request.extensions_mut().insert(snapshot.clone());
        (snapshot, request)
    }

    fn build(&self, parts: &Parts, payload: Map<String, Value>, started_at: Instant) -> RequestSnapshot {
        let path = parts.uri.path();
        let mut builder = RequestSnapshot::builder(parts.method.as_str(), path)
            .actor(self.identity.actor(parts))
            .session_id(self.identity.session_id(parts))
            .request_id(header_value(&parts.headers, REQUEST_ID_HEADER).map(str::to_string))
            .network(NetworkInfo {
                ip_address: client_ip(parts),
                user_agent: header_value(&parts.headers, header::USER_AGENT.as_str())
                    .map(str::to_string),
            })
            .full_url(full_url(parts))
            .payload(payload)
            .redactor(self.redactor.clone())
            .started_at(started_at);

        if let Some(route) = self.routes.resolve(parts.method.as_str(), path) {
            builder = builder.route_name(Some(route.name));
            for (name, value) in route.parameters {
                builder = builder.parameter(name, RouteParam::Value(value));
            }
        }

        builder.build()
    }

    /// Merge a capturable body into the payload and return a body for the handler
    async fn capture_body(&self, parts: &Parts, body: Body, payload: &mut Map<String, Value>) -> Body {
        let Some(kind) = BodyKind::of(&parts.headers) else {
            return body;
        };

        // Only bodies that announce a length within the limit are buffered
        let within_limit = header_value(&parts.headers, header::CONTENT_LENGTH.as_str())
            .and_then(|v| v.parse::<usize>().ok())
            .is_some_and(|len| len <= self.max_body_bytes);
        if !within_limit {
            debug!("Request body not captured: length unknown or over limit");
            return body;
        }

        let bytes = match axum::body::to_bytes(body, self.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to read request body for capture: {}", e);
                return Body::from_stream(futures::stream::once(async move {
                    Err::<Bytes, _>(e)
                }));
            }
        };

        merge_body(kind, &bytes, payload);
        Body::from(bytes)
    }
}

impl std::fmt::Debug for Capture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capture")
            .field("routes", &self.routes.len())
            .field("max_body_bytes", &self.max_body_bytes)
            .finish_non_exhaustive()
    }
}

fn query_payload(parts: &Parts) -> Map<String, Value> {
    parts
        .uri
        .query()
        .map(|query| form_fields(query.as_bytes()))
        .unwrap_or_default()
}

fn form_fields(input: &[u8]) -> Map<String, Value> {
    url::form_urlencoded::parse(input)
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect()
}

/// Body fields override query fields of the same name
fn merge_body(kind: BodyKind, bytes: &Bytes, payload: &mut Map<String, Value>) {
    match kind {
        BodyKind::Json => match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(fields)) => payload.extend(fields),
            Ok(_) => debug!("JSON body is not an object; not captured"),
            Err(e) => debug!("Malformed JSON body not captured: {}", e),
        },
        BodyKind::Form => payload.extend(form_fields(bytes)),
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// First `X-Forwarded-For` hop, else the peer address
fn client_ip(parts: &Parts) -> Option<String> {
    header_value(&parts.headers, FORWARDED_FOR_HEADER)
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
}

fn full_url(parts: &Parts) -> String {
    if parts.uri.scheme().is_some() {
        return parts.uri.to_string();
    }

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    match header_value(&parts.headers, header::HOST.as_str()) {
        Some(host) => {
            let scheme = header_value(&parts.headers, FORWARDED_PROTO_HEADER).unwrap_or("http");
            format!("{}://{}{}", scheme, host, path_and_query)
        }
        None => path_and_query.to_string(),
    }
}
