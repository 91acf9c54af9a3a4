use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Analysis;

/// An alert raised when an analysis crosses the configured risk threshold.
/// Each analysis yields at most one alert.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Alert {
    pub id: Uuid,
    pub post_id: Uuid,
    pub analysis_id: Uuid,
    pub status: String,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStatus {
    New,
    Investigating,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::New => "new",
            AlertStatus::Investigating => "investigating",
            AlertStatus::Resolved => "resolved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(AlertStatus::New),
            "investigating" => Some(AlertStatus::Investigating),
            "resolved" => Some(AlertStatus::Resolved),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compact payload published on the broadcast channel and pushed to
/// connected observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSummary {
    pub id: Uuid,
    pub post_id: Uuid,
    pub category: String,
    pub severity: String,
    pub risk_score: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl AlertSummary {
    pub fn new(alert: &Alert, analysis: &Analysis) -> Self {
        Self {
            id: alert.id,
            post_id: alert.post_id,
            category: analysis.category.clone(),
            severity: analysis.severity.clone(),
            risk_score: analysis.risk_score,
            status: alert.status.clone(),
            created_at: alert.created_at,
        }
    }
}

/// Human correction attached to an alert. Never mutates the analysis;
/// accumulates as an audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Feedback {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub reviewer_id: Uuid,
    pub decision: String,
    pub corrected_category: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub alert_id: Uuid,
    pub reviewer_id: Uuid,
    pub decision: FeedbackDecision,
    pub corrected_category: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackDecision {
    Approve,
    Reject,
}

impl FeedbackDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackDecision::Approve => "approve",
            FeedbackDecision::Reject => "reject",
        }
    }
}

impl std::fmt::Display for FeedbackDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
