//! Compliance flag engine
//!
//! Three independent scans (PHI, controlled substances, financial data) over
//! the request path and route name, plus the retention horizon they imply.

use pharmaguard_core::{ComplianceFlags, Result, RouteInfo};
use serde::{Deserialize, Serialize};

use crate::config::{CategoryTerms, ClassificationConfig, RetentionConfig};
use crate::patterns::{GlobSet, KeywordSet};

/// How retention is derived when several categories match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionMode {
    /// Longest horizon among matched categories; the default horizon when none match
    #[default]
    Strictest,

    /// Legacy behaviour: PHI, then DEA, then PCI overwrite in turn and the last match wins
    LastMatch,
}

impl RetentionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strictest => "strictest",
            Self::LastMatch => "last_match",
        }
    }
}

#[derive(Debug, Clone)]
struct CategoryMatcher {
    paths: KeywordSet,
    routes: GlobSet,
}

impl CategoryMatcher {
    fn new(terms: &CategoryTerms) -> Result<Self> {
        Ok(Self {
            paths: KeywordSet::new(terms.paths.iter().cloned())?,
            routes: GlobSet::new(terms.routes.iter().cloned())?,
        })
    }

    fn matches(&self, route: &RouteInfo) -> bool {
        self.paths.is_match(&route.path) || self.routes.matches_name(route.name.as_deref())
    }
}

/// Derives [`ComplianceFlags`] for a route
#[derive(Debug, Clone)]
pub struct ComplianceFlagEngine {
    phi: CategoryMatcher,
    controlled: CategoryMatcher,
    financial: CategoryMatcher,
    controlled_attribute: String,
    retention: RetentionConfig,
}

impl ComplianceFlagEngine {
    pub fn new(config: &ClassificationConfig) -> Result<Self> {
        Ok(Self {
            phi: CategoryMatcher::new(&config.phi)?,
            controlled: CategoryMatcher::new(&config.controlled_substance)?,
            financial: CategoryMatcher::new(&config.financial)?,
            controlled_attribute: config.controlled_attribute.clone(),
            retention: config.retention,
        })
    }

    pub fn retention_mode(&self) -> RetentionMode {
        self.retention.mode
    }

    pub fn evaluate(&self, route: &RouteInfo) -> ComplianceFlags {
        let is_phi_access = self.phi.matches(route);
        let is_controlled_substance =
            self.controlled.matches(route) || self.bound_controlled_substance(route);
        let is_financial_data = self.financial.matches(route);

        let retention_years =
            self.retention_years(is_phi_access, is_controlled_substance, is_financial_data);

        ComplianceFlags {
            is_phi_access,
            is_controlled_substance,
            is_financial_data,
            retention_years,
        }
    }

    /// A bound prescription object flagged as a controlled substance
    fn bound_controlled_substance(&self, route: &RouteInfo) -> bool {
        route
            .parameters
            .iter()
            .filter_map(|(name, param)| param.as_entity().map(|entity| (name, entity)))
            .filter(|(name, entity)| {
                name.as_str() == "prescription" || entity.kind.eq_ignore_ascii_case("prescription")
            })
            .any(|(_, entity)| entity.flag(&self.controlled_attribute) == Some(true))
    }

    fn retention_years(&self, phi: bool, controlled: bool, financial: bool) -> u8 {
        let r = &self.retention;
        let matched = [
            (phi, r.phi_years),
            (controlled, r.controlled_substance_years),
            (financial, r.financial_years),
        ];

        match r.mode {
            RetentionMode::Strictest => matched
                .iter()
                .filter(|(hit, _)| *hit)
                .map(|(_, years)| *years)
                .max()
                .unwrap_or(r.default_years),
            RetentionMode::LastMatch => matched
                .iter()
                .filter(|(hit, _)| *hit)
                .map(|(_, years)| *years)
                .last()
                .unwrap_or(r.default_years),
        }
    }
}
