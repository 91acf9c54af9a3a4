//! Database operations for alerts and reviewer feedback

use crate::error::{Result, RiskServiceError};
use crate::models::{Alert, AlertStatus, Feedback, NewFeedback};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

pub struct AlertsDb {
    pool: Arc<PgPool>,
}

impl AlertsDb {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create an alert in `new` status. The unique index on analysis_id
    /// enforces the one-alert-per-analysis cardinality if a task retries
    /// after the alert row was already committed.
    pub async fn create_alert(&self, post_id: Uuid, analysis_id: Uuid) -> Result<Alert> {
        let alert = sqlx::query_as::<_, Alert>(
            r#"
            INSERT INTO alerts (post_id, analysis_id, status, created_at, updated_at)
            VALUES ($1, $2, 'new', NOW(), NOW())
            RETURNING id, post_id, analysis_id, status, assigned_to, created_at, updated_at
            "#,
        )
        .bind(post_id)
        .bind(analysis_id)
        .fetch_one(&*self.pool)
        .await?;

        tracing::info!(
            alert_id = %alert.id,
            post_id = %post_id,
            analysis_id = %analysis_id,
            "Alert created"
        );

        Ok(alert)
    }

    pub async fn get_alert(&self, alert_id: Uuid) -> Result<Alert> {
        let alert = sqlx::query_as::<_, Alert>(
            r#"
            SELECT id, post_id, analysis_id, status, assigned_to, created_at, updated_at
            FROM alerts
            WHERE id = $1
            "#,
        )
        .bind(alert_id)
        .fetch_optional(&*self.pool)
        .await?
        .ok_or_else(|| RiskServiceError::AlertNotFound(alert_id.to_string()))?;

        Ok(alert)
    }

    pub async fn list_alerts(
        &self,
        status: Option<AlertStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Alert>> {
        let alerts = if let Some(status) = status {
            sqlx::query_as::<_, Alert>(
                r#"
                SELECT id, post_id, analysis_id, status, assigned_to, created_at, updated_at
                FROM alerts
                WHERE status = $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(status.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(&*self.pool)
            .await?
        } else {
            sqlx::query_as::<_, Alert>(
                r#"
                SELECT id, post_id, analysis_id, status, assigned_to, created_at, updated_at
                FROM alerts
                ORDER BY created_at DESC
                LIMIT $1 OFFSET $2
                "#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&*self.pool)
            .await?
        };

        Ok(alerts)
    }

    /// Update lifecycle status and optional assignee, bumping updated_at.
    pub async fn update_status(
        &self,
        alert_id: Uuid,
        status: AlertStatus,
        assigned_to: Option<Uuid>,
    ) -> Result<Alert> {
        let alert = sqlx::query_as::<_, Alert>(
            r#"
            UPDATE alerts
            SET status = $2, assigned_to = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING id, post_id, analysis_id, status, assigned_to, created_at, updated_at
            "#,
        )
        .bind(alert_id)
        .bind(status.as_str())
        .bind(assigned_to)
        .fetch_optional(&*self.pool)
        .await?
        .ok_or_else(|| RiskServiceError::AlertNotFound(alert_id.to_string()))?;

        tracing::info!(alert_id = %alert.id, status = %alert.status, "Alert status updated");

        Ok(alert)
    }

    pub async fn add_feedback(&self, input: NewFeedback) -> Result<Feedback> {
        let feedback = sqlx::query_as::<_, Feedback>(
            r#"
            INSERT INTO feedback (alert_id, reviewer_id, decision, corrected_category, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING id, alert_id, reviewer_id, decision, corrected_category, notes, created_at
            "#,
        )
        .bind(input.alert_id)
        .bind(input.reviewer_id)
        .bind(input.decision.as_str())
        .bind(&input.corrected_category)
        .bind(&input.notes)
        .fetch_one(&*self.pool)
        .await?;

        tracing::info!(
            feedback_id = %feedback.id,
            alert_id = %feedback.alert_id,
            decision = %feedback.decision,
            "Feedback recorded"
        );

        Ok(feedback)
    }

    pub async fn feedback_for_alert(&self, alert_id: Uuid) -> Result<Vec<Feedback>> {
        let items = sqlx::query_as::<_, Feedback>(
            r#"
            SELECT id, alert_id, reviewer_id, decision, corrected_category, notes, created_at
            FROM feedback
            WHERE alert_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(alert_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(items)
    }
}
