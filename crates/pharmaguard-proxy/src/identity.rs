//! Caller identity
//!
//! The audit layer does not authenticate. It trusts whatever an upstream
//! layer established: an [`Actor`] placed in request extensions, or the
//! identity headers set by the gateway in front of the proxy.

use axum::http::{header, request::Parts, HeaderMap};
use pharmaguard_core::Actor;

use crate::config::IdentityConfig;

/// Resolves the caller of a request
pub trait IdentityProvider: Send + Sync {
    /// Authenticated actor, if any
    fn actor(&self, parts: &Parts) -> Option<Actor>;

    /// Session identifier, if any
    fn session_id(&self, parts: &Parts) -> Option<String>;
}

/// Reads identity from request extensions and trusted headers
#[derive(Debug, Clone)]
pub struct HeaderIdentity {
    config: IdentityConfig,
}

impl HeaderIdentity {
    pub fn new(config: IdentityConfig) -> Self {
        Self { config }
    }

    fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

impl Default for HeaderIdentity {
    fn default() -> Self {
        Self::new(IdentityConfig::default())
    }
}

impl IdentityProvider for HeaderIdentity {
    fn actor(&self, parts: &Parts) -> Option<Actor> {
        if let Some(actor) = parts.extensions.get::<Actor>() {
            return Some(actor.clone());
        }

        // An unparsable id means no trusted identity
        let id = Self::header(&parts.headers, &self.config.id_header)?
            .parse::<u64>()
            .ok()?;
        let name = Self::header(&parts.headers, &self.config.name_header).unwrap_or_default();
        let role = Self::header(&parts.headers, &self.config.role_header).unwrap_or_default();

        Some(Actor::new(id, name, role))
    }

    fn session_id(&self, parts: &Parts) -> Option<String> {
        cookie(&parts.headers, &self.config.session_cookie)
    }
}

/// Value of a named cookie across all `Cookie` headers
pub fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}
