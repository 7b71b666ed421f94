//! PharmaGuard Core
//!
//! Core types shared across PharmaGuard components.
//!
//! This crate provides:
//! - Request snapshots and response outcomes captured around each HTTP call
//! - The immutable audit record model and its enumerations
//! - Payload redaction applied before anything is stored
//! - A clock abstraction so time-dependent scoring can be replayed
//! - Error types and result handling

pub mod clock;
pub mod error;
pub mod record;
pub mod redact;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{Error, Result};
pub use record::{
    AuditRecord, ComplianceFlags, DataClassification, EntityRef, EntityType, EventType, RiskLevel,
};
pub use redact::{Redactor, REDACTION_MARKER};
pub use types::{
    Actor, BoundEntity, Correlation, NetworkInfo, RequestSnapshot, ResponseOutcome, RouteInfo,
    RouteParam, SnapshotBuilder,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::{Clock, FixedClock, SystemClock};
    pub use crate::error::{Error, Result};
    pub use crate::record::{AuditRecord, EventType, RiskLevel};
    pub use crate::types::{Actor, RequestSnapshot, ResponseOutcome};
}
