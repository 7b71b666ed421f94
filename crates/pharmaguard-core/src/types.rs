//! Request and response snapshots
//!
//! A [`RequestSnapshot`] is captured when a call enters the audit layer, before
//! the handler runs. The matching [`ResponseOutcome`] is built once the handler
//! has produced its response.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::redact::Redactor;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: u64,
    pub display_name: String,
    pub role: String,
}

impl Actor {
    pub fn new(id: u64, display_name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            role: role.into(),
        }
    }
}

/// Network origin of a call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Identifiers tying a record to a session and request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    pub session_id: Option<String>,

    /// Client-supplied `X-Request-Id`, or a generated one
    pub request_id: String,
}

impl Correlation {
    /// Use the client's request id when it is present and non-empty
    pub fn new(session_id: Option<String>, client_request_id: Option<String>) -> Self {
        let request_id = client_request_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generate_request_id);

        Self {
            session_id,
            request_id,
        }
    }
}

fn generate_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4())
}

/// A domain object bound to a route parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundEntity {
    /// Entity kind as named by the application (`prescription`, `order`, ...)
    pub kind: String,

    pub id: Option<u64>,

    /// Human-facing identifier (prescription number, email, order number)
    pub identifier: Option<String>,

    /// Remaining attributes of the object
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl BoundEntity {
    pub fn new(kind: impl Into<String>, id: u64) -> Self {
        Self {
            kind: kind.into(),
            id: Some(id),
            identifier: None,
            attributes: Map::new(),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Boolean attribute lookup; `None` when absent or not a boolean
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.attributes.get(key).and_then(Value::as_bool)
    }
}

/// Value of a named route parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RouteParam {
    /// Raw path segment
    Value(String),

    /// Resolved domain object
    Entity(BoundEntity),
}

impl RouteParam {
    pub fn as_entity(&self) -> Option<&BoundEntity> {
        match self {
            Self::Entity(entity) => Some(entity),
            Self::Value(_) => None,
        }
    }
}

/// Routing information for a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteInfo {
    pub name: Option<String>,

    /// Upper-case HTTP method
    pub method: String,

    pub path: String,

    pub full_url: String,

    #[serde(default)]
    pub parameters: BTreeMap<String, RouteParam>,
}

impl RouteInfo {
    pub fn new(method: impl AsRef<str>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            name: None,
            method: method.as_ref().to_ascii_uppercase(),
            full_url: path.clone(),
            path,
            parameters: BTreeMap::new(),
        }
    }

    pub fn is_method(&self, method: &str) -> bool {
        self.method.eq_ignore_ascii_case(method)
    }

    pub fn parameter(&self, name: &str) -> Option<&RouteParam> {
        self.parameters.get(name)
    }
}

/// Immutable capture of an inbound call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub actor: Option<Actor>,
    pub network: NetworkInfo,
    pub correlation: Correlation,
    pub route: RouteInfo,

    /// Redacted query and body fields
    pub payload: Map<String, Value>,

    /// Monotonic entry time
    #[serde(skip, default = "Instant::now")]
    pub started_at: Instant,
}

impl RequestSnapshot {
    pub fn builder(method: impl AsRef<str>, path: impl Into<String>) -> SnapshotBuilder {
        SnapshotBuilder::new(method, path)
    }

    pub fn is_authenticated(&self) -> bool {
        self.actor.is_some()
    }

    /// Copy of this snapshot with extra route parameters merged in.
    ///
    /// Used when the handler resolves domain objects for parameters that were
    /// captured as raw segments.
    pub fn with_bound_parameters<I>(&self, bound: I) -> Self
    where
        I: IntoIterator<Item = (String, RouteParam)>,
    {
        let mut snapshot = self.clone();
        snapshot.route.parameters.extend(bound);
        snapshot
    }
}

/// Builder for [`RequestSnapshot`]
#[derive(Debug)]
pub struct SnapshotBuilder {
    actor: Option<Actor>,
    network: NetworkInfo,
    session_id: Option<String>,
    client_request_id: Option<String>,
    route: RouteInfo,
    payload: Map<String, Value>,
    redactor: Redactor,
    started_at: Option<Instant>,
}

impl SnapshotBuilder {
    fn new(method: impl AsRef<str>, path: impl Into<String>) -> Self {
        Self {
            actor: None,
            network: NetworkInfo::default(),
            session_id: None,
            client_request_id: None,
            route: RouteInfo::new(method, path),
            payload: Map::new(),
            redactor: Redactor::new(),
            started_at: None,
        }
    }

    pub fn actor(mut self, actor: Option<Actor>) -> Self {
        self.actor = actor;
        self
    }

    pub fn network(mut self, network: NetworkInfo) -> Self {
        self.network = network;
        self
    }

    pub fn session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn request_id(mut self, request_id: Option<String>) -> Self {
        self.client_request_id = request_id;
        self
    }

    pub fn route_name(mut self, name: Option<String>) -> Self {
        self.route.name = name;
        self
    }

    pub fn full_url(mut self, url: impl Into<String>) -> Self {
        self.route.full_url = url.into();
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, value: RouteParam) -> Self {
        self.route.parameters.insert(name.into(), value);
        self
    }

    pub fn payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn started_at(mut self, at: Instant) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn build(self) -> RequestSnapshot {
        RequestSnapshot {
            actor: self.actor,
            network: self.network,
            correlation: Correlation::new(self.session_id, self.client_request_id),
            route: self.route,
            payload: self.redactor.redact(self.payload),
            started_at: self.started_at.unwrap_or_else(Instant::now),
        }
    }
}

/// Result of the downstream handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseOutcome {
    pub status_code: u16,

    /// Handler latency in milliseconds, two decimals
    pub elapsed_ms: f64,

    /// `status_code < 400`
    pub granted: bool,

    pub body_size: Option<u64>,
}

impl ResponseOutcome {
    pub fn new(status_code: u16, elapsed: Duration) -> Self {
        Self {
            status_code,
            elapsed_ms: round_ms(elapsed),
            granted: status_code < 400,
            body_size: None,
        }
    }

    /// Outcome measured from a snapshot's entry time to now
    pub fn since(status_code: u16, started_at: Instant) -> Self {
        Self::new(status_code, started_at.elapsed())
    }

    pub fn with_body_size(mut self, body_size: Option<u64>) -> Self {
        self.body_size = body_size;
        self
    }
}

fn round_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redact::REDACTION_MARKER;
    use serde_json::json;

    #[test]
    fn test_client_request_id_preserved() {
        let correlation = Correlation::new(None, Some("abc-123".to_string()));
        assert_eq!(correlation.request_id, "abc-123");
    }

    #[test]
    fn test_request_id_generated_when_blank() {
        let a = Correlation::new(None, Some("   ".to_string()));
        let b = Correlation::new(None, None);
        assert!(a.request_id.starts_with("req_"));
        assert!(b.request_id.starts_with("req_"));
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_outcome_rounding_and_granted() {
        let outcome = ResponseOutcome::new(201, Duration::from_micros(12_346));
        assert_eq!(outcome.elapsed_ms, 12.35);
        assert!(outcome.granted);

        let denied = ResponseOutcome::new(403, Duration::ZERO);
        assert!(!denied.granted);
        assert!(!ResponseOutcome::new(400, Duration::ZERO).granted);
        assert!(ResponseOutcome::new(399, Duration::ZERO).granted);
    }

    #[test]
    fn test_builder_redacts_payload() {
        let payload = match json!({"password": "x", "note": "refill"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        let snapshot = RequestSnapshot::builder("post", "/prescriptions")
            .payload(payload)
            .build();

        assert_eq!(snapshot.route.method, "POST");
        assert_eq!(snapshot.payload["password"], json!(REDACTION_MARKER));
        assert_eq!(snapshot.payload["note"], json!("refill"));
    }

    #[test]
    fn test_bound_entity_flag() {
        let entity = BoundEntity::new("prescription", 7)
            .with_attribute("is_controlled_substance", true)
            .with_attribute("schedule", "II");

        assert_eq!(entity.flag("is_controlled_substance"), Some(true));
        assert_eq!(entity.flag("schedule"), None);
        assert_eq!(entity.flag("missing"), None);
    }

    #[test]
    fn test_route_param_untagged_serde() {
        let value: RouteParam = serde_json::from_value(json!("42")).unwrap();
        assert_eq!(value, RouteParam::Value("42".to_string()));

        let entity: RouteParam =
            serde_json::from_value(json!({"kind": "order", "id": 9, "identifier": "ORD-9"}))
                .unwrap();
        assert_eq!(entity.as_entity().and_then(|e| e.id), Some(9));
    }
}
