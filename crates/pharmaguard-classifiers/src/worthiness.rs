//! Audit-worthiness predicate
//!
//! Decides, after the handler has produced its status, whether a call is
//! recorded at all. Rules are evaluated in order and the first match wins.

use pharmaguard_core::{RequestSnapshot, ResponseOutcome, Result};
use serde::{Deserialize, Serialize};

use crate::config::ClassificationConfig;
use crate::patterns::{GlobSet, KeywordSet};

/// Why a call was selected for auditing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditReason {
    /// Every authenticated call is audited
    Authenticated,
    /// 401 responses are audited even for anonymous callers
    FailedAuthentication,
    SensitiveRoute,
    SensitivePath,
}

impl AuditReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authenticated => "authenticated",
            Self::FailedAuthentication => "failed_authentication",
            Self::SensitiveRoute => "sensitive_route",
            Self::SensitivePath => "sensitive_path",
        }
    }
}

/// Audit-worthiness predicate
#[derive(Debug, Clone)]
pub struct AuditPredicate {
    routes: GlobSet,
    paths: KeywordSet,
}

impl AuditPredicate {
    pub fn new(config: &ClassificationConfig) -> Result<Self> {
        Ok(Self {
            routes: GlobSet::new(config.audited_routes.iter().cloned())?,
            paths: KeywordSet::new(config.audited_paths.iter().cloned())?,
        })
    }

    /// First matching rule, or `None` when the call is not audit-worthy
    pub fn reason(&self, snapshot: &RequestSnapshot, outcome: &ResponseOutcome) -> Option<AuditReason> {
        if snapshot.is_authenticated() {
            return Some(AuditReason::Authenticated);
        }

        if outcome.status_code == 401 {
            return Some(AuditReason::FailedAuthentication);
        }

        if self.routes.matches_name(snapshot.route.name.as_deref()) {
            return Some(AuditReason::SensitiveRoute);
        }

        if self.paths.is_match(&snapshot.route.path) {
            return Some(AuditReason::SensitivePath);
        }

        None
    }

    pub fn should_audit(&self, snapshot: &RequestSnapshot, outcome: &ResponseOutcome) -> bool {
        self.reason(snapshot, outcome).is_some()
    }
}
