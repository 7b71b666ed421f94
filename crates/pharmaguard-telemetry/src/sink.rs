//! Log channels
//!
//! Records that need attention beyond the audit store are forwarded to named
//! channels. [`TracingSink`] maps each channel to its own `tracing` target so
//! a subscriber can route them to separate files or collectors.

use parking_lot::Mutex;
use pharmaguard_core::{AuditRecord, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Named log channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogChannel {
    /// High and critical risk events
    Security,
    /// PHI access
    Hipaa,
    /// Controlled substance (DEA) events
    Pharmacy,
    /// Dispatch failures
    Error,
}

impl LogChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Hipaa => "hipaa",
            Self::Pharmacy => "pharmacy",
            Self::Error => "error",
        }
    }

    /// `tracing` target the channel is written to
    pub fn target(&self) -> &'static str {
        match self {
            Self::Security => "pharmaguard::security",
            Self::Hipaa => "pharmaguard::hipaa",
            Self::Pharmacy => "pharmaguard::pharmacy",
            Self::Error => "pharmaguard::error",
        }
    }
}

impl fmt::Display for LogChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimal context logged when dispatch fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureContext {
    pub message: String,
    pub url: String,
    pub actor_id: Option<u64>,
}

impl FailureContext {
    pub fn new(message: impl Into<String>, record: &AuditRecord) -> Self {
        Self {
            message: message.into(),
            url: record.route.full_url.clone(),
            actor_id: record.actor_id(),
        }
    }
}

/// Structured log destination
pub trait LogSink: Send + Sync {
    /// Forward a record to a channel
    fn emit(&self, channel: LogChannel, record: &AuditRecord) -> Result<()>;

    /// Report a dispatch failure on the error channel; must not fail
    fn report_failure(&self, context: &FailureContext);
}

/// Sink writing structured `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        Self
    }
}

// `tracing` needs the target as a constant, hence one arm per channel
macro_rules! emit_record {
    ($level:ident, $target:literal, $record:expr) => {{
        let record = $record;
        tracing::$level!(
            target: $target,
            event_type = %record.event_type,
            risk_level = %record.risk_level,
            data_classification = %record.data_classification,
            actor_id = ?record.actor_id(),
            entity = %record.entity,
            ip_address = ?record.network.ip_address,
            url = %record.route.full_url,
            status_code = record.status_code,
            request_id = %record.correlation.request_id,
            retention_years = record.flags.retention_years,
            "{}",
            record.description
        );
    }};
}

impl LogSink for TracingSink {
    fn emit(&self, channel: LogChannel, record: &AuditRecord) -> Result<()> {
        match channel {
            LogChannel::Security => emit_record!(warn, "pharmaguard::security", record),
            LogChannel::Hipaa => emit_record!(info, "pharmaguard::hipaa", record),
            LogChannel::Pharmacy => emit_record!(info, "pharmaguard::pharmacy", record),
            LogChannel::Error => emit_record!(error, "pharmaguard::error", record),
        }
        Ok(())
    }

    fn report_failure(&self, context: &FailureContext) {
        tracing::error!(
            target: "pharmaguard::error",
            url = %context.url,
            actor_id = ?context.actor_id,
            "Audit logging failed: {}",
            context.message
        );
    }
}

/// Sink that keeps emissions in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    emitted: Mutex<Vec<(LogChannel, AuditRecord)>>,
    failures: Mutex<Vec<FailureContext>>,
    failing: Mutex<HashSet<LogChannel>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make emits to `channel` fail
    pub fn fail_on(&self, channel: LogChannel) {
        self.failing.lock().insert(channel);
    }

    /// Channels emitted to, in order
    pub fn channels(&self) -> Vec<LogChannel> {
        self.emitted.lock().iter().map(|(c, _)| *c).collect()
    }

    pub fn emitted(&self) -> Vec<(LogChannel, AuditRecord)> {
        self.emitted.lock().clone()
    }

    pub fn failures(&self) -> Vec<FailureContext> {
        self.failures.lock().clone()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, channel: LogChannel, record: &AuditRecord) -> Result<()> {
        if self.failing.lock().contains(&channel) {
            return Err(Error::sink(format!("{} channel is unavailable", channel)));
        }
        self.emitted.lock().push((channel, record.clone()));
        Ok(())
    }

    fn report_failure(&self, context: &FailureContext) {
        self.failures.lock().push(context.clone());
    }
}
