//! Audit store abstraction
//!
//! The dispatcher persists every assembled record through an [`AuditStore`].
//! [`MemoryAuditStore`] keeps records in memory for tests and embedding; the
//! file-backed store is [`AuditService`](crate::service::AuditService).

use async_trait::async_trait;
use parking_lot::Mutex;
use pharmaguard_core::{AuditRecord, Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};

/// Destination that retains audit records
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist one record
    async fn record(&self, record: &AuditRecord) -> Result<()>;

    /// Store name used in logs and metrics
    fn name(&self) -> &str {
        "audit_store"
    }
}

/// In-memory audit store
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    records: Mutex<Vec<AuditRecord>>,
    failing: AtomicBool,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::store("memory store is unavailable"));
        }

        self.records.lock().push(record.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
