//! Record fixtures for unit tests

use chrono::DateTime;
use pharmaguard_core::{
    Actor, AuditRecord, ComplianceFlags, Correlation, DataClassification, EntityRef, EventType,
    NetworkInfo, RiskLevel, RouteInfo,
};
use serde_json::Map;

pub(crate) struct RecordBuilder {
    record: AuditRecord,
}

pub(crate) fn record(method: &str, path: &str) -> RecordBuilder {
    let route = RouteInfo::new(method, path);
    let record = AuditRecord {
        occurred_at: DateTime::parse_from_rfc3339("2026-10-14T14:00:00+00:00").unwrap(),
        event_type: EventType::Viewed,
        entity: EntityRef::none(),
        actor: None,
        network: NetworkInfo::default(),
        correlation: Correlation::new(None, Some("req-test".to_string())),
        route,
        payload: Map::new(),
        status_code: 200,
        elapsed_ms: 1.25,
        granted: true,
        flags: ComplianceFlags {
            is_phi_access: false,
            is_controlled_substance: false,
            is_financial_data: false,
            retention_years: 7,
        },
        risk_level: RiskLevel::Low,
        data_classification: DataClassification::Public,
        description: format!("Anonymous viewed via {} {}", method, path),
        metadata: Map::new(),
    };
    RecordBuilder { record }
}

impl RecordBuilder {
    pub(crate) fn status(mut self, status: u16) -> Self {
        self.record.status_code = status;
        self.record.granted = status < 400;
        self
    }

    pub(crate) fn event(mut self, event_type: EventType) -> Self {
        self.record.event_type = event_type;
        self
    }

    pub(crate) fn actor(mut self, id: u64) -> Self {
        self.record.actor = Some(Actor::new(id, format!("user {}", id), "pharmacist"));
        self
    }

    pub(crate) fn risk(mut self, level: RiskLevel) -> Self {
        self.record.risk_level = level;
        self
    }

    pub(crate) fn phi(mut self) -> Self {
        self.record.flags.is_phi_access = true;
        self.record.flags.retention_years = 6;
        self.record.data_classification = DataClassification::Phi;
        self
    }

    pub(crate) fn controlled(mut self) -> Self {
        self.record.flags.is_controlled_substance = true;
        self
    }

    pub(crate) fn retention(mut self, years: u8) -> Self {
        self.record.flags.retention_years = years;
        self
    }

    pub(crate) fn request_id(mut self, request_id: &str) -> Self {
        self.record.correlation.request_id = request_id.to_string();
        self
    }

    pub(crate) fn occurred_at(mut self, rfc3339: &str) -> Self {
        self.record.occurred_at = DateTime::parse_from_rfc3339(rfc3339).unwrap();
        self
    }

    pub(crate) fn payload(mut self, payload: Map<String, serde_json::Value>) -> Self {
        self.record.payload = payload;
        self
    }

    pub(crate) fn build(self) -> AuditRecord {
        self.record
    }
}
