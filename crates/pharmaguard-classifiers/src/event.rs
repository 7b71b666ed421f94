//! Event classification
//!
//! Maps a call to an [`EventType`] through an ordered table of categories.
//! The first category whose path terms or route globs match decides the
//! event; when that category has no event for the request method, the generic
//! HTTP-verb mapping applies.

use pharmaguard_core::{EventType, ResponseOutcome, Result, RouteInfo};
use serde::{Deserialize, Serialize};

use crate::patterns::{GlobSet, KeywordSet};

/// Category of the rule that classified a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Authentication,
    Prescription,
    Patient,
    MedicalRecord,
    Payment,
    Export,
    Configuration,
    Generic,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Prescription => "prescription",
            Self::Patient => "patient",
            Self::MedicalRecord => "medical_record",
            Self::Payment => "payment",
            Self::Export => "export",
            Self::Configuration => "configuration",
            Self::Generic => "generic",
        }
    }
}

/// Result of event classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub event_type: EventType,
    pub category: EventCategory,
}

type Resolver = fn(&RouteInfo, &ResponseOutcome) -> Option<EventType>;

/// Static definition of one category, in priority order
struct EventRule {
    category: EventCategory,
    paths: &'static [&'static str],
    routes: &'static [&'static str],
    resolve: Resolver,
}

const RULES: &[EventRule] = &[
    EventRule {
        category: EventCategory::Authentication,
        paths: &["/login", "/logout", "/auth/"],
        routes: &["login", "logout", "auth.*"],
        resolve: resolve_authentication,
    },
    EventRule {
        category: EventCategory::Prescription,
        paths: &["prescription"],
        routes: &["prescription.*", "prescriptions.*"],
        resolve: resolve_prescription,
    },
    EventRule {
        category: EventCategory::Patient,
        paths: &["patient", "profile"],
        routes: &["patient.*", "patients.*", "profile.*"],
        resolve: resolve_patient,
    },
    EventRule {
        category: EventCategory::MedicalRecord,
        paths: &["medical", "record"],
        routes: &["medical.*", "records.*"],
        resolve: resolve_medical_record,
    },
    EventRule {
        category: EventCategory::Payment,
        paths: &["payment", "billing", "checkout"],
        routes: &["payment.*", "payments.*", "billing.*", "checkout.*"],
        resolve: resolve_payment,
    },
    EventRule {
        category: EventCategory::Export,
        paths: &["export", "download"],
        routes: &["*.export", "*.download", "export.*"],
        resolve: resolve_export,
    },
    EventRule {
        category: EventCategory::Configuration,
        paths: &["config", "settings"],
        routes: &["settings.*", "config.*", "*.settings.*"],
        resolve: resolve_configuration,
    },
];

struct CompiledRule {
    category: EventCategory,
    paths: KeywordSet,
    routes: GlobSet,
    resolve: Resolver,
}

impl CompiledRule {
    fn matches(&self, route: &RouteInfo) -> bool {
        self.paths.is_match(&route.path) || self.routes.matches_name(route.name.as_deref())
    }
}

/// Ordered first-match event classifier
pub struct EventClassifier {
    rules: Vec<CompiledRule>,
}

impl EventClassifier {
    pub fn new() -> Result<Self> {
        let rules = RULES
            .iter()
            .map(|rule| {
                Ok(CompiledRule {
                    category: rule.category,
                    paths: KeywordSet::new(rule.paths.iter().copied())?,
                    routes: GlobSet::new(rule.routes.iter().copied())?,
                    resolve: rule.resolve,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Categories in evaluation order
    pub fn categories(&self) -> impl Iterator<Item = EventCategory> + '_ {
        self.rules.iter().map(|r| r.category)
    }

    pub fn classify(&self, route: &RouteInfo, outcome: &ResponseOutcome) -> Classification {
        for rule in &self.rules {
            if rule.matches(route) {
                let event_type =
                    (rule.resolve)(route, outcome).unwrap_or_else(|| generic_event(&route.method));
                return Classification {
                    event_type,
                    category: rule.category,
                };
            }
        }

        Classification {
            event_type: generic_event(&route.method),
            category: EventCategory::Generic,
        }
    }
}

impl std::fmt::Debug for EventClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.categories()).finish()
    }
}

/// HTTP-verb fallback
pub fn generic_event(method: &str) -> EventType {
    match method.to_ascii_uppercase().as_str() {
        "GET" => EventType::Viewed,
        "POST" => EventType::Created,
        "PUT" | "PATCH" => EventType::Updated,
        "DELETE" => EventType::Deleted,
        _ => EventType::Accessed,
    }
}

fn is_write(method: &str) -> bool {
    matches!(method, "POST" | "PUT" | "PATCH" | "DELETE")
}

fn resolve_authentication(route: &RouteInfo, outcome: &ResponseOutcome) -> Option<EventType> {
    let is_logout = route.path.to_ascii_lowercase().contains("logout")
        || route.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case("logout"));

    if is_logout {
        return Some(EventType::Logout);
    }

    if outcome.status_code == 401 {
        return Some(EventType::FailedLogin);
    }

    if route.is_method("POST") {
        return Some(if outcome.granted {
            EventType::Login
        } else {
            EventType::FailedLogin
        });
    }

    None
}

fn resolve_prescription(route: &RouteInfo, _: &ResponseOutcome) -> Option<EventType> {
    let event = match route.method.as_str() {
        "POST" => EventType::PrescriptionCreated,
        "PUT" | "PATCH" => EventType::Updated,
        "DELETE" => EventType::Deleted,
        _ => EventType::Accessed,
    };
    Some(event)
}

fn resolve_patient(route: &RouteInfo, _: &ResponseOutcome) -> Option<EventType> {
    match route.method.as_str() {
        "GET" | "HEAD" => Some(EventType::PatientProfileAccessed),
        "POST" => Some(EventType::Created),
        "PUT" | "PATCH" => Some(EventType::Updated),
        "DELETE" => Some(EventType::Deleted),
        _ => None,
    }
}

fn resolve_medical_record(route: &RouteInfo, _: &ResponseOutcome) -> Option<EventType> {
    matches!(route.method.as_str(), "GET" | "HEAD").then_some(EventType::MedicalRecordAccessed)
}

fn resolve_payment(route: &RouteInfo, _: &ResponseOutcome) -> Option<EventType> {
    route.is_method("POST").then_some(EventType::PaymentProcessed)
}

fn resolve_export(_: &RouteInfo, _: &ResponseOutcome) -> Option<EventType> {
    Some(EventType::DataExport)
}

fn resolve_configuration(route: &RouteInfo, _: &ResponseOutcome) -> Option<EventType> {
    is_write(&route.method).then_some(EventType::SystemConfigChanged)
}
