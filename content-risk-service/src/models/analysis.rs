use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

/// Per-category probability map produced by a modality.
pub type CategoryScores = HashMap<String, f64>;

/// One analysis run over a post. The most recent analysis for a post is
/// authoritative for alerting.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Analysis {
    pub id: Uuid,
    pub post_id: Uuid,
    pub text_probs: Json<CategoryScores>,
    pub video_score: f64,
    pub audio_probs: Json<CategoryScores>,
    pub risk_score: f64,
    pub severity: String,
    pub category: String,
    pub explanation: Json<Vec<String>>,
    pub model_versions: Json<HashMap<String, String>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub post_id: Uuid,
    pub text_probs: CategoryScores,
    pub video_score: f64,
    pub audio_probs: CategoryScores,
    pub risk_score: f64,
    pub severity: Severity,
    pub category: String,
    pub explanation: Vec<String>,
    pub model_versions: HashMap<String, String>,
}

/// Severity tier derived from the fused risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Med,
    High,
    Critical,
}

impl Severity {
    /// Tier boundaries: > 80 critical, >= 60 high, >= 40 med, else low.
    /// 60 and 80 belong to the higher of their adjacent tiers.
    pub fn from_risk_score(score: f64) -> Self {
        if score > 80.0 {
            Severity::Critical
        } else if score >= 60.0 {
            Severity::High
        } else if score >= 40.0 {
            Severity::Med
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Med => "MED",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_boundaries() {
        assert_eq!(Severity::from_risk_score(80.1), Severity::Critical);
        assert_eq!(Severity::from_risk_score(80.0), Severity::High);
        assert_eq!(Severity::from_risk_score(60.0), Severity::High);
        assert_eq!(Severity::from_risk_score(59.9), Severity::Med);
        assert_eq!(Severity::from_risk_score(40.0), Severity::Med);
        assert_eq!(Severity::from_risk_score(39.9), Severity::Low);
        assert_eq!(Severity::from_risk_score(0.0), Severity::Low);
    }
}
