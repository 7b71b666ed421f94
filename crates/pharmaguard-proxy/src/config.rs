//! Proxy configuration
//!
//! Loaded from a YAML file layered with `PHARMAGUARD__*` environment
//! variables, e.g. `PHARMAGUARD__ADMIN_TOKEN` or
//! `PHARMAGUARD__PERSISTENCE__AUDIT_DIR`.

use pharmaguard_telemetry::PersistenceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::route_table::RouteDefinition;

/// Proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Protected application; requests not served locally are forwarded here
    #[serde(default)]
    pub backend_url: Option<String>,

    /// Backend request timeout
    #[serde(default = "default_backend_timeout")]
    pub backend_timeout_secs: u64,

    /// Largest request body forwarded to the backend
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,

    /// Classification rules file; built-in rules when unset
    #[serde(default)]
    pub classification_path: Option<PathBuf>,

    /// Bearer token for the audit API; the API is disabled when unset
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Named routes of the protected application
    #[serde(default)]
    pub routes: Vec<RouteDefinition>,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub hipaa: HipaaConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl ProxyConfig {
    /// Load from an optional YAML file and the environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("PHARMAGUARD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Parsed backend URL, if one is configured
    pub fn backend(&self) -> Result<Option<url::Url>, url::ParseError> {
        self.backend_url.as_deref().map(url::Url::parse).transpose()
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            backend_timeout_secs: default_backend_timeout(),
            max_request_bytes: default_max_request_bytes(),
            classification_path: None,
            admin_token: None,
            routes: Vec::new(),
            identity: IdentityConfig::default(),
            capture: CaptureConfig::default(),
            hipaa: HipaaConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

/// Where the caller's identity is read from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_id_header")]
    pub id_header: String,

    #[serde(default = "default_name_header")]
    pub name_header: String,

    #[serde(default = "default_role_header")]
    pub role_header: String,

    /// Cookie carrying the session id
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            id_header: default_id_header(),
            name_header: default_name_header(),
            role_header: default_role_header(),
            session_cookie: default_session_cookie(),
        }
    }
}

/// Request payload capture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Bodies larger than this are not captured
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Field names redacted in addition to the built-in list
    #[serde(default)]
    pub redact_fields: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
            redact_fields: Vec::new(),
        }
    }
}

/// HIPAA acknowledgment gating
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HipaaConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Roles that must acknowledge before accessing PHI
    #[serde(default = "default_gated_roles")]
    pub gated_roles: Vec<String>,

    /// Header set by the client once the acknowledgment is signed
    #[serde(default = "default_acknowledgment_header")]
    pub acknowledgment_header: String,

    /// Page where the acknowledgment is signed
    #[serde(default = "default_acknowledgment_url")]
    pub acknowledgment_url: String,
}

impl Default for HipaaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            gated_roles: default_gated_roles(),
            acknowledgment_header: default_acknowledgment_header(),
            acknowledgment_url: default_acknowledgment_url(),
        }
    }
}

fn default_backend_timeout() -> u64 {
    300
}

fn default_max_request_bytes() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_id_header() -> String {
    "x-actor-id".to_string()
}

fn default_name_header() -> String {
    "x-actor-name".to_string()
}

fn default_role_header() -> String {
    "x-actor-role".to_string()
}

fn default_session_cookie() -> String {
    "session".to_string()
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

fn default_gated_roles() -> Vec<String> {
    ["pharmacist", "pharmacy_technician", "nurse", "doctor"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_acknowledgment_header() -> String {
    "x-hipaa-acknowledged".to_string()
}

fn default_acknowledgment_url() -> String {
    "/hipaa/acknowledge".to_string()
}
