//! PharmaGuard Classifiers
//!
//! Deterministic compliance classification of HTTP calls.
//!
//! A call flows through the stages in order:
//! - Audit-worthiness predicate: is the call recorded at all
//! - Event and entity classification: what happened, and to which object
//! - Compliance flags: PHI, controlled substances, financial data, retention
//! - Risk scoring: additive heuristic over the call and the local time
//! - Assembly: one immutable [`AuditRecord`](pharmaguard_core::AuditRecord)
//!
//! All stages are pure apart from the injected clock, so assembling the same
//! inputs twice yields the same record.

pub mod assembler;
pub mod config;
pub mod entity;
pub mod event;
pub mod flags;
pub mod patterns;
pub mod risk;
pub mod worthiness;

pub use assembler::AuditAssembler;
pub use config::{CategoryTerms, ClassificationConfig, RetentionConfig};
pub use entity::EntityExtractor;
pub use event::{generic_event, Classification, EventCategory, EventClassifier};
pub use flags::{ComplianceFlagEngine, RetentionMode};
pub use patterns::{GlobSet, KeywordSet};
pub use risk::{bucket, RiskAssessment, RiskFactor, RiskScorer};
pub use worthiness::{AuditPredicate, AuditReason};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::assembler::AuditAssembler;
    pub use crate::config::ClassificationConfig;
    pub use crate::event::EventCategory;
    pub use crate::flags::RetentionMode;
    pub use crate::risk::RiskScorer;
    pub use crate::worthiness::AuditPredicate;
}
