//! Risk scoring
//!
//! Additive point scale over the call and the local time at which it
//! happened, bucketed into a [`RiskLevel`]. The time is always passed in so
//! scoring is deterministic for a given clock.

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Weekday};
use pharmaguard_core::{ResponseOutcome, RiskLevel, RouteInfo};
use serde::{Deserialize, Serialize};

/// Contributing factor to a risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    AccessDenied,
    PatientData,
    Prescription,
    Administrative,
    AfterHours,
    Weekend,
    BulkOperation,
    DataExport,
}

impl RiskFactor {
    pub fn points(&self) -> u8 {
        match self {
            Self::AccessDenied => 3,
            Self::PatientData => 2,
            Self::Prescription => 2,
            Self::Administrative => 3,
            Self::AfterHours => 1,
            Self::Weekend => 1,
            Self::BulkOperation => 2,
            Self::DataExport => 2,
        }
    }
}

/// Score, bucket and the factors behind them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: u8,
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
}

/// Bucket a score: 7+ critical, 4+ high, 2+ medium, else low
pub fn bucket(score: u8) -> RiskLevel {
    match score {
        s if s >= 7 => RiskLevel::Critical,
        s if s >= 4 => RiskLevel::High,
        s if s >= 2 => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

/// Heuristic risk scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskScorer;

impl RiskScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn assess(
        &self,
        route: &RouteInfo,
        outcome: &ResponseOutcome,
        now: DateTime<FixedOffset>,
    ) -> RiskAssessment {
        let path = route.path.to_ascii_lowercase();
        let mut factors = Vec::new();

        if !outcome.granted {
            factors.push(RiskFactor::AccessDenied);
        }
        if path.contains("patient") || path.contains("medical") {
            factors.push(RiskFactor::PatientData);
        }
        if path.contains("prescription") {
            factors.push(RiskFactor::Prescription);
        }
        if path.contains("admin") || path.contains("config") {
            factors.push(RiskFactor::Administrative);
        }
        if now.hour() < 6 || now.hour() > 22 {
            factors.push(RiskFactor::AfterHours);
        }
        if matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
            factors.push(RiskFactor::Weekend);
        }
        if route.is_method("POST") && path.contains("bulk") {
            factors.push(RiskFactor::BulkOperation);
        }
        if path.contains("export") || path.contains("download") {
            factors.push(RiskFactor::DataExport);
        }

        let score = factors.iter().map(RiskFactor::points).sum();

        RiskAssessment {
            score,
            level: bucket(score),
            factors,
        }
    }
}
