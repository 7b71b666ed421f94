//! Metrics collection and reporting
//!
//! Thin wrappers over the `metrics` facade. Without an installed recorder
//! every call is a no-op.

use ::metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use pharmaguard_core::AuditRecord;
use std::time::Duration;

use crate::dispatch::DispatchTarget;

pub const REQUESTS_TOTAL: &str = "pharmaguard_requests_total";
pub const AUDIT_RECORDS_TOTAL: &str = "pharmaguard_audit_records_total";
pub const DISPATCH_FAILURES_TOTAL: &str = "pharmaguard_dispatch_failures_total";
pub const CLASSIFICATION_LATENCY_US: &str = "pharmaguard_classification_latency_us";

/// Register metric descriptions with the installed recorder
pub fn describe() {
    describe_counter!(REQUESTS_TOTAL, "Total number of requests seen by the audit layer");
    describe_counter!(
        AUDIT_RECORDS_TOTAL,
        "Audit records dispatched, by event type and risk level"
    );
    describe_counter!(
        DISPATCH_FAILURES_TOTAL,
        "Failed audit dispatches, by target"
    );
    describe_histogram!(
        CLASSIFICATION_LATENCY_US,
        Unit::Microseconds,
        "Time spent classifying and assembling an audit record"
    );
}

/// Count a request passing through the audit layer
pub fn record_request(audited: bool) {
    counter!(REQUESTS_TOTAL, "audited" => if audited { "true" } else { "false" }).increment(1);
}

/// Count a dispatched record
pub fn record_audit(record: &AuditRecord) {
    counter!(
        AUDIT_RECORDS_TOTAL,
        "event_type" => record.event_type.as_str(),
        "risk_level" => record.risk_level.as_str()
    )
    .increment(1);
}

/// Count a failed dispatch target
pub fn record_dispatch_failure(target: DispatchTarget) {
    counter!(DISPATCH_FAILURES_TOTAL, "target" => target.as_str()).increment(1);
}

/// Observe classification time
pub fn record_classification_latency(elapsed: Duration) {
    histogram!(CLASSIFICATION_LATENCY_US).record(elapsed.as_micros() as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::LogChannel;
    use crate::test_support::record;

    #[test]
    fn test_noop_without_recorder() {
        describe();
        record_request(true);
        record_audit(&record("GET", "/api/x").build());
        record_dispatch_failure(DispatchTarget::Channel(LogChannel::Hipaa));
        record_classification_latency(Duration::from_micros(250));
    }
}
