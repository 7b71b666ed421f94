//! PharmaGuard Telemetry
//!
//! Storage and forwarding of audit records.
//!
//! Provides:
//! - Hash-chained, append-only JSON-lines audit store with rotation and retention
//! - Query, export and statistics for compliance reporting
//! - Named log channels (security, HIPAA, pharmacy, error)
//! - Dispatch of records to the store and channels with explicit failures
//! - Prometheus-friendly metrics

pub mod audit;
pub mod dispatch;
pub mod metrics;
pub mod persistence;
pub mod service;
pub mod sink;
pub mod store;

#[cfg(test)]
mod test_support;

pub use audit::{ChainError, HashChain};
pub use dispatch::{channels_for, DispatchError, DispatchReport, DispatchTarget, Dispatcher};
pub use persistence::{
    AuditLine, AuditQuery, AuditReader, AuditWriter, ExportFormat, PersistenceConfig, StoredRecord,
};
pub use service::{AuditService, AuditStats};
pub use sink::{FailureContext, LogChannel, LogSink, MemorySink, TracingSink};
pub use store::{AuditStore, MemoryAuditStore};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::dispatch::Dispatcher;
    pub use crate::persistence::{AuditQuery, PersistenceConfig};
    pub use crate::service::AuditService;
    pub use crate::sink::{LogChannel, LogSink, TracingSink};
    pub use crate::store::AuditStore;
}
