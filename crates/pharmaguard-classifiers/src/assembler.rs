//! Audit record assembler
//!
//! Composes the predicate, event classifier, entity extractor, flag engine
//! and risk scorer into one [`AuditRecord`]. Assembly is pure apart from the
//! injected [`Clock`]; dispatching the record is the caller's concern.

use std::sync::Arc;

use pharmaguard_core::{
    AuditRecord, Clock, ComplianceFlags, DataClassification, EntityRef, EventType,
    RequestSnapshot, ResponseOutcome, Result, RouteInfo, SystemClock,
};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::ClassificationConfig;
use crate::entity::EntityExtractor;
use crate::event::EventClassifier;
use crate::flags::ComplianceFlagEngine;
use crate::risk::RiskScorer;
use crate::worthiness::{AuditPredicate, AuditReason};

/// Terms that mark a path as administrative
const CONFIDENTIAL_TERMS: &[&str] = &["admin", "config", "settings"];

/// Builds audit records from a snapshot and its outcome
pub struct AuditAssembler {
    predicate: AuditPredicate,
    events: EventClassifier,
    entities: EntityExtractor,
    flags: ComplianceFlagEngine,
    risk: RiskScorer,
    clock: Arc<dyn Clock>,
}

impl AuditAssembler {
    pub fn new(config: &ClassificationConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self {
            predicate: AuditPredicate::new(config)?,
            events: EventClassifier::new()?,
            entities: EntityExtractor::new(config),
            flags: ComplianceFlagEngine::new(config)?,
            risk: RiskScorer::new(),
            clock,
        })
    }

    /// Default rules on the system clock
    pub fn with_defaults() -> Result<Self> {
        Self::new(&ClassificationConfig::default(), Arc::new(SystemClock))
    }

    pub fn should_audit(&self, snapshot: &RequestSnapshot, outcome: &ResponseOutcome) -> bool {
        self.predicate.should_audit(snapshot, outcome)
    }

    /// Assemble a record when the call is audit-worthy
    pub fn evaluate(
        &self,
        snapshot: &RequestSnapshot,
        outcome: &ResponseOutcome,
    ) -> Option<AuditRecord> {
        let reason = self.predicate.reason(snapshot, outcome)?;
        Some(self.build(snapshot, outcome, Some(reason)))
    }

    /// Assemble a record unconditionally
    pub fn assemble(&self, snapshot: &RequestSnapshot, outcome: &ResponseOutcome) -> AuditRecord {
        let reason = self.predicate.reason(snapshot, outcome);
        self.build(snapshot, outcome, reason)
    }

    fn build(
        &self,
        snapshot: &RequestSnapshot,
        outcome: &ResponseOutcome,
        reason: Option<AuditReason>,
    ) -> AuditRecord {
        let route = &snapshot.route;
        let now = self.clock.now();

        let classification = self.events.classify(route, outcome);
        let entity = self.entities.extract(route);
        let flags = self.flags.evaluate(route);
        let risk = self.risk.assess(route, outcome, now);

        let data_classification = classify_data(snapshot, &flags);
        let description = describe(snapshot, classification.event_type, &entity);

        let mut metadata = Map::new();
        metadata.insert("category".into(), json!(classification.category.as_str()));
        if let Some(reason) = reason {
            metadata.insert("audit_reason".into(), json!(reason.as_str()));
        }
        metadata.insert("risk_score".into(), json!(risk.score));
        metadata.insert("risk_factors".into(), json!(risk.factors));
        metadata.insert("route_parameters".into(), parameter_names(route));
        metadata.insert(
            "response_size".into(),
            outcome.body_size.map_or(Value::Null, Value::from),
        );
        metadata.insert(
            "retention_mode".into(),
            json!(self.flags.retention_mode().as_str()),
        );

        debug!(
            event_type = %classification.event_type,
            category = classification.category.as_str(),
            risk = %risk.level,
            score = risk.score,
            request_id = %snapshot.correlation.request_id,
            "Assembled audit record"
        );

        AuditRecord {
            occurred_at: now,
            event_type: classification.event_type,
            entity,
            actor: snapshot.actor.clone(),
            network: snapshot.network.clone(),
            correlation: snapshot.correlation.clone(),
            route: route.clone(),
            payload: snapshot.payload.clone(),
            status_code: outcome.status_code,
            elapsed_ms: outcome.elapsed_ms,
            granted: outcome.granted,
            flags,
            risk_level: risk.level,
            data_classification,
            description,
            metadata,
        }
    }
}

impl std::fmt::Debug for AuditAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditAssembler")
            .field("predicate", &self.predicate)
            .field("events", &self.events)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

fn classify_data(snapshot: &RequestSnapshot, flags: &ComplianceFlags) -> DataClassification {
    let path = snapshot.route.path.to_ascii_lowercase();

    if flags.is_phi_access {
        DataClassification::Phi
    } else if flags.is_controlled_substance {
        DataClassification::ControlledSubstance
    } else if flags.is_financial_data {
        DataClassification::Financial
    } else if CONFIDENTIAL_TERMS.iter().any(|t| path.contains(t)) {
        DataClassification::Confidential
    } else if snapshot.is_authenticated() {
        DataClassification::Internal
    } else {
        DataClassification::Public
    }
}

fn describe(snapshot: &RequestSnapshot, event_type: EventType, entity: &EntityRef) -> String {
    let actor = snapshot
        .actor
        .as_ref()
        .map_or_else(|| "Anonymous".to_string(), |a| format!("{} (#{})", a.display_name, a.id));

    let route = &snapshot.route;
    if entity.is_none() {
        format!("{} {} via {} {}", actor, event_type.verb(), route.method, route.path)
    } else {
        format!(
            "{} {} [{}] via {} {}",
            actor,
            event_type.verb(),
            entity,
            route.method,
            route.path
        )
    }
}

fn parameter_names(route: &RouteInfo) -> Value {
    Value::Array(
        route
            .parameters
            .keys()
            .map(|k| Value::String(k.clone()))
            .collect(),
    )
}
