//! Database operations for analysis rows

use crate::error::Result;
use crate::models::{Analysis, NewAnalysis};
use sqlx::types::Json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

pub struct AnalysesDb {
    pool: Arc<PgPool>,
}

impl AnalysesDb {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn create_analysis(&self, input: NewAnalysis) -> Result<Analysis> {
        let analysis = sqlx::query_as::<_, Analysis>(
            r#"
            INSERT INTO analyses (
                post_id,
                text_probs,
                video_score,
                audio_probs,
                risk_score,
                severity,
                category,
                explanation,
                model_versions,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            RETURNING id, post_id, text_probs, video_score, audio_probs, risk_score,
                      severity, category, explanation, model_versions, created_at
            "#,
        )
        .bind(input.post_id)
        .bind(Json(&input.text_probs))
        .bind(input.video_score)
        .bind(Json(&input.audio_probs))
        .bind(input.risk_score)
        .bind(input.severity.as_str())
        .bind(&input.category)
        .bind(Json(&input.explanation))
        .bind(Json(&input.model_versions))
        .fetch_one(&*self.pool)
        .await?;

        tracing::info!(
            analysis_id = %analysis.id,
            post_id = %analysis.post_id,
            risk_score = %analysis.risk_score,
            severity = %analysis.severity,
            category = %analysis.category,
            "Analysis saved"
        );

        Ok(analysis)
    }

    /// Most recent analysis for a post; authoritative for alerting.
    pub async fn latest_for_post(&self, post_id: Uuid) -> Result<Option<Analysis>> {
        let analysis = sqlx::query_as::<_, Analysis>(
            r#"
            SELECT id, post_id, text_probs, video_score, audio_probs, risk_score,
                   severity, category, explanation, model_versions, created_at
            FROM analyses
            WHERE post_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(post_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(analysis)
    }
}
