//! Record dispatch
//!
//! Every record goes to the audit store. Records are additionally forwarded
//! to the security channel when risk is high or critical, to the HIPAA channel
//! on PHI access and to the pharmacy channel for controlled substances.
//! All targets are attempted even when an earlier one fails.

use pharmaguard_core::{AuditRecord, Error};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::metrics;
use crate::sink::{FailureContext, LogChannel, LogSink};
use crate::store::AuditStore;

/// A destination of a dispatched record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchTarget {
    Store,
    Channel(LogChannel),
}

impl DispatchTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Channel(channel) => channel.as_str(),
        }
    }
}

impl fmt::Display for DispatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed target
#[derive(Debug)]
pub struct TargetFailure {
    pub target: DispatchTarget,
    pub error: Error,
}

/// Dispatch finished with at least one failed target
#[derive(Debug, thiserror::Error)]
#[error("audit dispatch failed: {}", describe(.failures))]
pub struct DispatchError {
    pub failures: Vec<TargetFailure>,

    /// Targets that did succeed
    pub report: DispatchReport,
}

fn describe(failures: &[TargetFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.target, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Targets a record reached
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub persisted: bool,
    pub channels: Vec<LogChannel>,
}

/// Channels a record is forwarded to, in dispatch order
pub fn channels_for(record: &AuditRecord) -> Vec<LogChannel> {
    let mut channels = Vec::new();
    if record.risk_level.is_elevated() {
        channels.push(LogChannel::Security);
    }
    if record.flags.is_phi_access {
        channels.push(LogChannel::Hipaa);
    }
    if record.flags.is_controlled_substance {
        channels.push(LogChannel::Pharmacy);
    }
    channels
}

/// Persists records and forwards them to log channels
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn AuditStore>,
    sink: Arc<dyn LogSink>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn AuditStore>, sink: Arc<dyn LogSink>) -> Self {
        Self { store, sink }
    }

    /// Dispatch a record to every target it qualifies for
    pub async fn dispatch(&self, record: &AuditRecord) -> Result<DispatchReport, DispatchError> {
        let mut report = DispatchReport::default();
        let mut failures = Vec::new();

        match self.store.record(record).await {
            Ok(()) => report.persisted = true,
            Err(error) => failures.push(TargetFailure {
                target: DispatchTarget::Store,
                error,
            }),
        }

        for channel in channels_for(record) {
            match self.sink.emit(channel, record) {
                Ok(()) => report.channels.push(channel),
                Err(error) => failures.push(TargetFailure {
                    target: DispatchTarget::Channel(channel),
                    error,
                }),
            }
        }

        metrics::record_audit(record);

        if failures.is_empty() {
            debug!(
                store = self.store.name(),
                channels = ?report.channels,
                "Audit record dispatched"
            );
            Ok(report)
        } else {
            Err(DispatchError { failures, report })
        }
    }

    /// Dispatch, reporting failures to the error channel instead of returning them
    pub async fn dispatch_logged(&self, record: &AuditRecord) -> DispatchReport {
        match self.dispatch(record).await {
            Ok(report) => report,
            Err(err) => {
                for failure in &err.failures {
                    metrics::record_dispatch_failure(failure.target);
                    let message = format!("{}: {}", failure.target, failure.error);
                    self.sink
                        .report_failure(&FailureContext::new(message, record));
                }
                err.report
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("store", &self.store.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::store::MemoryAuditStore;
    use crate::test_support::record;
    use pharmaguard_core::RiskLevel;

    fn dispatcher() -> (Dispatcher, Arc<MemoryAuditStore>, Arc<MemorySink>) {
        let store = Arc::new(MemoryAuditStore::new());
        let sink = Arc::new(MemorySink::new());
        (Dispatcher::new(store.clone(), sink.clone()), store, sink)
    }

    #[tokio::test]
    async fn test_low_risk_record_only_persisted() {
        let (dispatcher, store, sink) = dispatcher();

        let report = dispatcher
            .dispatch(&record("GET", "/api/orders").build())
            .await
            .unwrap();

        assert!(report.persisted);
        assert!(report.channels.is_empty());
        assert_eq!(store.len(), 1);
        assert!(sink.channels().is_empty());
    }

    #[tokio::test]
    async fn test_forwarding_rules() {
        let (dispatcher, _, sink) = dispatcher();

        let r = record("GET", "/patients/1/prescriptions")
            .risk(RiskLevel::High)
            .phi()
            .controlled()
            .build();
        let report = dispatcher.dispatch(&r).await.unwrap();

        let expected = vec![LogChannel::Security, LogChannel::Hipaa, LogChannel::Pharmacy];
        assert_eq!(report.channels, expected);
        assert_eq!(sink.channels(), expected);
    }

    #[tokio::test]
    async fn test_medium_risk_not_forwarded_to_security() {
        let (dispatcher, _, sink) = dispatcher();
        dispatcher
            .dispatch(&record("GET", "/api/x").risk(RiskLevel::Medium).build())
            .await
            .unwrap();
        assert!(sink.channels().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_still_forwards() {
        let (dispatcher, store, sink) = dispatcher();
        store.set_failing(true);

        let r = record("GET", "/patients/1").phi().actor(3).build();
        let err = dispatcher.dispatch(&r).await.unwrap_err();

        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].target, DispatchTarget::Store);
        assert!(!err.report.persisted);
        assert_eq!(sink.channels(), vec![LogChannel::Hipaa]);
        assert!(err.to_string().starts_with("audit dispatch failed: store:"));
    }

    #[tokio::test]
    async fn test_dispatch_logged_reports_failures() {
        let (dispatcher, _, sink) = dispatcher();
        sink.fail_on(LogChannel::Hipaa);

        let r = record("GET", "/patients/1").phi().actor(9).build();
        let report = dispatcher.dispatch_logged(&r).await;

        assert!(report.persisted);
        let failures = sink.failures();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.starts_with("hipaa:"));
        assert_eq!(failures[0].actor_id, Some(9));
        assert_eq!(failures[0].url, r.route.full_url);
    }
}
