//! PharmaGuard Proxy
//!
//! HTTP integration of the audit pipeline.
//!
//! Provides:
//! - Audit middleware for axum applications ([`middleware::audit_middleware`])
//! - Request capture, named routes and caller identity
//! - HIPAA acknowledgment gating of PHI routes
//! - A forwarding proxy with an admin-only audit API

pub mod capture;
pub mod config;
pub mod hipaa;
pub mod identity;
pub mod middleware;
pub mod proxy;
pub mod route_table;
pub mod routes;

pub use capture::Capture;
pub use config::{CaptureConfig, HipaaConfig, IdentityConfig, ProxyConfig};
pub use hipaa::HipaaGate;
pub use identity::{HeaderIdentity, IdentityProvider};
pub use middleware::{AuditLayer, BoundEntities};
pub use proxy::AppState;
pub use route_table::{RouteDefinition, RouteMatch, RouteTable, RouteTableError};
pub use routes::{create_router, protect, AppError};
