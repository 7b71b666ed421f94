//! Payload redaction
//!
//! Request payloads are stored in audit records, so credentials, card data
//! and identity numbers are replaced by [`REDACTION_MARKER`] before a
//! snapshot is ever built.

use serde_json::{Map, Value};

/// Replacement value for denied fields
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Field names whose values never reach an audit record
pub const DENIED_FIELDS: &[&str] = &[
    "password",
    "password_confirmation",
    "current_password",
    "new_password",
    "ssn",
    "social_security_number",
    "credit_card",
    "card_number",
    "cvv",
    "cvc",
    "pin",
    "token",
    "_token",
    "api_key",
    "secret",
];

/// Redacts payload fields by name
#[derive(Debug, Clone)]
pub struct Redactor {
    denied: Vec<String>,
}

impl Redactor {
    /// Create a redactor using the built-in deny-list
    pub fn new() -> Self {
        Self {
            denied: DENIED_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Extend the deny-list with additional field names
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for field in fields {
            let field = field.as_ref().to_ascii_lowercase();
            if !self.denied.contains(&field) {
                self.denied.push(field);
            }
        }
        self
    }

    /// Whether a field name is on the deny-list (case-insensitive)
    pub fn is_denied(&self, field: &str) -> bool {
        self.denied.iter().any(|d| d.eq_ignore_ascii_case(field))
    }

    /// Redact a payload map, walking nested objects and arrays
    pub fn redact(&self, payload: Map<String, Value>) -> Map<String, Value> {
        payload
            .into_iter()
            .map(|(key, value)| {
                let value = if self.is_denied(&key) {
                    Value::String(REDACTION_MARKER.to_string())
                } else {
                    self.redact_value(value)
                };
                (key, value)
            })
            .collect()
    }

    fn redact_value(&self, value: Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.redact(map)),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.redact_value(v)).collect())
            }
            other => other,
        }
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}
