//! Classification rule configuration
//!
//! Every field defaults to the built-in pharmacy rule set, so an empty YAML
//! document (or no document at all) yields the standard behaviour.

use pharmaguard_core::EntityType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::flags::RetentionMode;

/// Rules for all classification stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// Route-name globs that make a call audit-worthy
    #[serde(default = "default_audited_routes")]
    pub audited_routes: Vec<String>,

    /// Path substrings that make a call audit-worthy
    #[serde(default = "default_audited_paths")]
    pub audited_paths: Vec<String>,

    /// Protected health information terms
    #[serde(default = "default_phi")]
    pub phi: CategoryTerms,

    /// Controlled substance / prescription terms
    #[serde(default = "default_controlled_substance")]
    pub controlled_substance: CategoryTerms,

    /// Payment and billing terms
    #[serde(default = "default_financial")]
    pub financial: CategoryTerms,

    /// Boolean attribute on a bound prescription marking a controlled substance
    #[serde(default = "default_controlled_attribute")]
    pub controlled_attribute: String,

    /// Route parameter names treated as entity references, in priority order
    #[serde(default = "default_entity_parameters")]
    pub entity_parameters: Vec<String>,

    /// Path word to entity type dictionary
    #[serde(default = "default_entity_dictionary")]
    pub entity_dictionary: BTreeMap<String, EntityType>,

    /// Retention horizons
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Keyword and route-glob terms of one compliance category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryTerms {
    /// Substrings matched against the request path
    #[serde(default)]
    pub paths: Vec<String>,

    /// Globs matched against the route name
    #[serde(default)]
    pub routes: Vec<String>,
}

impl CategoryTerms {
    fn new(paths: &[&str], routes: &[&str]) -> Self {
        Self {
            paths: paths.iter().map(|s| s.to_string()).collect(),
            routes: routes.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Regulatory retention horizons in years
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_years")]
    pub default_years: u8,

    /// HIPAA
    #[serde(default = "default_phi_years")]
    pub phi_years: u8,

    /// DEA
    #[serde(default = "default_controlled_years")]
    pub controlled_substance_years: u8,

    /// PCI-DSS
    #[serde(default = "default_financial_years")]
    pub financial_years: u8,

    #[serde(default)]
    pub mode: RetentionMode,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            default_years: default_retention_years(),
            phi_years: default_phi_years(),
            controlled_substance_years: default_controlled_years(),
            financial_years: default_financial_years(),
            mode: RetentionMode::default(),
        }
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            audited_routes: default_audited_routes(),
            audited_paths: default_audited_paths(),
            phi: default_phi(),
            controlled_substance: default_controlled_substance(),
            financial: default_financial(),
            controlled_attribute: default_controlled_attribute(),
            entity_parameters: default_entity_parameters(),
            entity_dictionary: default_entity_dictionary(),
            retention: RetentionConfig::default(),
        }
    }
}

impl ClassificationConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load from file
    pub fn from_file(
        path: impl AsRef<std::path::Path>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&content)?)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_audited_routes() -> Vec<String> {
    strings(&[
        "prescription.*",
        "patient.*",
        "medical.*",
        "compliance.*",
        "admin.*",
        "api.*",
    ])
}

fn default_audited_paths() -> Vec<String> {
    strings(&[
        "/api/",
        "/admin/",
        "/prescription",
        "/patient",
        "/compliance",
        "/reports",
    ])
}

fn default_phi() -> CategoryTerms {
    CategoryTerms::new(
        &[
            "patient",
            "medical",
            "health-record",
            "health_record",
            "diagnos",
            "allerg",
            "insurance",
            "medical-record",
        ],
        &["patient.*", "medical.*", "health-record.*"],
    )
}

fn default_controlled_substance() -> CategoryTerms {
    CategoryTerms::new(
        &[
            "prescription",
            "controlled",
            "narcotic",
            "opioid",
            "schedule-ii",
            "/dea/",
        ],
        &["prescription.*", "controlled.*", "dea.*"],
    )
}

fn default_financial() -> CategoryTerms {
    CategoryTerms::new(
        &[
            "payment",
            "billing",
            "invoice",
            "checkout",
            "refund",
            "transaction",
        ],
        &["payment.*", "billing.*", "checkout.*", "invoice.*"],
    )
}

fn default_controlled_attribute() -> String {
    "is_controlled_substance".to_string()
}

fn default_entity_parameters() -> Vec<String> {
    strings(&["prescription", "user", "patient", "order", "payment"])
}

fn default_entity_dictionary() -> BTreeMap<String, EntityType> {
    [
        ("prescription", EntityType::Prescription),
        ("rx", EntityType::Prescription),
        ("user", EntityType::User),
        ("patient", EntityType::Patient),
        ("profile", EntityType::Patient),
        ("order", EntityType::Order),
        ("payment", EntityType::Payment),
        ("invoice", EntityType::Payment),
        ("product", EntityType::Product),
        ("inventory", EntityType::Product),
        ("medication", EntityType::Product),
        ("medical_record", EntityType::MedicalRecord),
        ("record", EntityType::MedicalRecord),
        ("report", EntityType::Report),
        ("setting", EntityType::Setting),
        ("config", EntityType::Setting),
    ]
    .into_iter()
    .map(|(word, entity)| (word.to_string(), entity))
    .collect()
}

fn default_retention_years() -> u8 {
    7
}

fn default_phi_years() -> u8 {
    6
}

fn default_controlled_years() -> u8 {
    2
}

fn default_financial_years() -> u8 {
    3
}
