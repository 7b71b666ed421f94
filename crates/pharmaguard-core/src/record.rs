//! Audit record model
//!
//! An [`AuditRecord`] is assembled once per audit-worthy call and never
//! mutated afterwards. It carries everything an audit store needs to retain
//! and report on the call.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::types::{Actor, Correlation, NetworkInfo, RouteInfo};

/// Kind of compliance event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Login,
    FailedLogin,
    Logout,
    PrescriptionCreated,
    Accessed,
    Updated,
    Deleted,
    PatientProfileAccessed,
    Created,
    MedicalRecordAccessed,
    PaymentProcessed,
    DataExport,
    SystemConfigChanged,
    Viewed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::FailedLogin => "failed_login",
            Self::Logout => "logout",
            Self::PrescriptionCreated => "prescription_created",
            Self::Accessed => "accessed",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::PatientProfileAccessed => "patient_profile_accessed",
            Self::Created => "created",
            Self::MedicalRecordAccessed => "medical_record_accessed",
            Self::PaymentProcessed => "payment_processed",
            Self::DataExport => "data_export",
            Self::SystemConfigChanged => "system_config_changed",
            Self::Viewed => "viewed",
        }
    }

    /// Past-tense phrase used in record descriptions
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Login => "logged in",
            Self::FailedLogin => "failed to log in",
            Self::Logout => "logged out",
            Self::PrescriptionCreated => "created prescription",
            Self::Accessed => "accessed",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::PatientProfileAccessed => "accessed patient profile",
            Self::Created => "created",
            Self::MedicalRecordAccessed => "accessed medical record",
            Self::PaymentProcessed => "processed payment",
            Self::DataExport => "exported data",
            Self::SystemConfigChanged => "changed system configuration",
            Self::Viewed => "viewed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of entity a call touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Prescription,
    User,
    Patient,
    Order,
    Payment,
    Product,
    MedicalRecord,
    Report,
    Setting,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prescription => "prescription",
            Self::User => "user",
            Self::Patient => "patient",
            Self::Order => "order",
            Self::Payment => "payment",
            Self::Product => "product",
            Self::MedicalRecord => "medical_record",
            Self::Report => "report",
            Self::Setting => "setting",
        }
    }

    /// Parse a snake_case entity name
    pub fn from_name(name: &str) -> Option<Self> {
        let entity = match name.to_ascii_lowercase().as_str() {
            "prescription" => Self::Prescription,
            "user" => Self::User,
            "patient" => Self::Patient,
            "order" => Self::Order,
            "payment" => Self::Payment,
            "product" => Self::Product,
            "medical_record" => Self::MedicalRecord,
            "report" => Self::Report,
            "setting" => Self::Setting,
            _ => return None,
        };
        Some(entity)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to the entity a call touched; all fields empty for the null entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<u64>,
    #[serde(rename = "entity_identifier")]
    pub identifier: Option<String>,
}

impl EntityRef {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(entity_type: Option<EntityType>, entity_id: Option<u64>) -> Self {
        Self {
            entity_type,
            entity_id,
            identifier: None,
        }
    }

    pub fn with_identifier(mut self, identifier: Option<String>) -> Self {
        self.identifier = identifier;
        self
    }

    pub fn is_none(&self) -> bool {
        self.entity_type.is_none() && self.entity_id.is_none() && self.identifier.is_none()
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.entity_type.map_or("resource", |t| t.as_str());
        match (&self.identifier, self.entity_id) {
            (Some(identifier), _) => write!(f, "{} {}", kind, identifier),
            (None, Some(id)) => write!(f, "{} #{}", kind, id),
            (None, None) => f.write_str(kind),
        }
    }
}

/// Regulatory categories a call falls under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceFlags {
    pub is_phi_access: bool,
    pub is_controlled_substance: bool,
    pub is_financial_data: bool,

    /// Mandated retention horizon of the record
    pub retention_years: u8,
}

impl ComplianceFlags {
    pub fn any(&self) -> bool {
        self.is_phi_access || self.is_controlled_substance || self.is_financial_data
    }
}

/// Bucketed risk of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// High or Critical
    pub fn is_elevated(&self) -> bool {
        *self >= Self::High
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data classification tag of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataClassification {
    Phi,
    ControlledSubstance,
    Financial,
    Confidential,
    Internal,
    Public,
}

impl DataClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phi => "PHI",
            Self::ControlledSubstance => "CONTROLLED_SUBSTANCE",
            Self::Financial => "FINANCIAL",
            Self::Confidential => "CONFIDENTIAL",
            Self::Internal => "INTERNAL",
            Self::Public => "PUBLIC",
        }
    }
}

impl fmt::Display for DataClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Clock time at assembly
    pub occurred_at: DateTime<FixedOffset>,

    pub event_type: EventType,

    #[serde(flatten)]
    pub entity: EntityRef,

    pub actor: Option<Actor>,
    pub network: NetworkInfo,
    pub correlation: Correlation,
    pub route: RouteInfo,
    pub payload: Map<String, Value>,

    pub status_code: u16,
    pub elapsed_ms: f64,
    pub granted: bool,

    #[serde(flatten)]
    pub flags: ComplianceFlags,

    pub risk_level: RiskLevel,
    pub data_classification: DataClassification,
    pub description: String,
    pub metadata: Map<String, Value>,
}

impl AuditRecord {
    pub fn actor_id(&self) -> Option<u64> {
        self.actor.as_ref().map(|a| a.id)
    }

    pub fn retention_years(&self) -> u8 {
        self.flags.retention_years
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_ordering() {
        assert!(RiskLevel::Critical > RiskLevel::High);
        assert!(RiskLevel::High.is_elevated());
        assert!(!RiskLevel::Medium.is_elevated());
    }

    #[test]
    fn test_event_type_serde_matches_as_str() {
        for event in [
            EventType::FailedLogin,
            EventType::PrescriptionCreated,
            EventType::PatientProfileAccessed,
            EventType::SystemConfigChanged,
        ] {
            let json = serde_json::to_value(event).unwrap();
            assert_eq!(json, serde_json::json!(event.as_str()));
        }
    }

    #[test]
    fn test_entity_display() {
        assert_eq!(
            EntityRef::new(Some(EntityType::Prescription), Some(42)).to_string(),
            "prescription #42"
        );
        assert_eq!(
            EntityRef::new(Some(EntityType::Order), Some(9))
                .with_identifier(Some("ORD-9".into()))
                .to_string(),
            "order ORD-9"
        );
        assert_eq!(EntityRef::none().to_string(), "resource");
        assert!(EntityRef::none().is_none());
    }

    #[test]
    fn test_entity_serializes_with_record_field_names() {
        let entity = EntityRef::new(Some(EntityType::Order), Some(9))
            .with_identifier(Some("ORD-9".into()));
        let json = serde_json::to_value(&entity).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "entity_type": "order",
                "entity_id": 9,
                "entity_identifier": "ORD-9",
            })
        );
        assert_eq!(serde_json::from_value::<EntityRef>(json).unwrap(), entity);
    }

    #[test]
    fn test_classification_serde() {
        let json = serde_json::to_value(DataClassification::ControlledSubstance).unwrap();
        assert_eq!(json, serde_json::json!("CONTROLLED_SUBSTANCE"));
        assert_eq!(
            serde_json::to_value(DataClassification::Phi).unwrap(),
            serde_json::json!("PHI")
        );
    }
}
