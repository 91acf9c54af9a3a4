//! Alert creation and broadcast
//!
//! Persistence and broadcast sit behind seams so the threshold gate is
//! testable without live Postgres or redis.

use crate::db::AlertsDb;
use crate::error::Result;
use crate::models::{Alert, AlertSummary, Analysis, Post};
use crate::services::event_bus::AlertPublisher;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Persistence seam for alert rows.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn create_alert(&self, post_id: Uuid, analysis_id: Uuid) -> Result<Alert>;
}

#[async_trait]
impl AlertStore for AlertsDb {
    async fn create_alert(&self, post_id: Uuid, analysis_id: Uuid) -> Result<Alert> {
        AlertsDb::create_alert(self, post_id, analysis_id).await
    }
}

/// Broadcast seam for alert summaries.
#[async_trait]
pub trait AlertBroadcast: Send + Sync {
    async fn broadcast(&self, summary: &AlertSummary) -> Result<usize>;
}

#[async_trait]
impl AlertBroadcast for AlertPublisher {
    async fn broadcast(&self, summary: &AlertSummary) -> Result<usize> {
        self.publish(summary).await
    }
}

pub struct AlertDispatcher {
    alerts: Arc<dyn AlertStore>,
    publisher: Arc<dyn AlertBroadcast>,
    threshold: f64,
}

impl AlertDispatcher {
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        publisher: Arc<dyn AlertBroadcast>,
        threshold: f64,
    ) -> Self {
        Self {
            alerts,
            publisher,
            threshold,
        }
    }

    /// Create and broadcast an alert if the analysis crosses the threshold.
    /// Scores below the threshold produce nothing; at or above, exactly one
    /// alert row and one broadcast.
    pub async fn maybe_create_alert(
        &self,
        post: &Post,
        analysis: &Analysis,
    ) -> Result<Option<Alert>> {
        if analysis.risk_score < self.threshold {
            return Ok(None);
        }

        let alert = self.alerts.create_alert(post.id, analysis.id).await?;
        let summary = AlertSummary::new(&alert, analysis);

        // The alert row is already committed; a broadcast failure must not
        // fail the analysis task, or a retry would hit the unique analysis_id
        // constraint and create no second alert anyway.
        if let Err(e) = self.publisher.broadcast(&summary).await {
            tracing::warn!(alert_id = %alert.id, error = %e, "Alert broadcast failed");
        }

        tracing::info!(
            alert_id = %alert.id,
            post_id = %post.id,
            risk_score = %analysis.risk_score,
            severity = %analysis.severity,
            "Alert raised"
        );

        Ok(Some(alert))
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RiskServiceError;
    use chrono::Utc;
    use sqlx::types::Json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingStore {
        created: AtomicUsize,
    }

    #[async_trait]
    impl AlertStore for RecordingStore {
        async fn create_alert(&self, post_id: Uuid, analysis_id: Uuid) -> Result<Alert> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Alert {
                id: Uuid::new_v4(),
                post_id,
                analysis_id,
                status: "new".to_string(),
                assigned_to: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingBroadcast {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl AlertBroadcast for RecordingBroadcast {
        async fn broadcast(&self, _summary: &AlertSummary) -> Result<usize> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        }
    }

    struct FailingBroadcast;

    #[async_trait]
    impl AlertBroadcast for FailingBroadcast {
        async fn broadcast(&self, _summary: &AlertSummary) -> Result<usize> {
            Err(RiskServiceError::Internal("channel down".to_string()))
        }
    }

    fn post() -> Post {
        Post {
            id: Uuid::new_v4(),
            platform: "demo".to_string(),
            platform_post_id: "p-1".to_string(),
            url: None,
            author: None,
            text: None,
            lang: None,
            raw: Json(serde_json::json!({})),
            created_at: Utc::now(),
        }
    }

    fn analysis(risk_score: f64) -> Analysis {
        Analysis {
            id: Uuid::new_v4(),
            post_id: Uuid::new_v4(),
            text_probs: Json(HashMap::new()),
            video_score: 0.0,
            audio_probs: Json(HashMap::new()),
            risk_score,
            severity: "HIGH".to_string(),
            category: "general_violence".to_string(),
            explanation: Json(Vec::new()),
            model_versions: Json(HashMap::new()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_below_threshold_creates_nothing() {
        let store = Arc::new(RecordingStore::default());
        let broadcast = Arc::new(RecordingBroadcast::default());
        let dispatcher = AlertDispatcher::new(store.clone(), broadcast.clone(), 70.0);

        let result = dispatcher
            .maybe_create_alert(&post(), &analysis(69.9))
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(store.created.load(Ordering::SeqCst), 0);
        assert_eq!(broadcast.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_at_threshold_creates_one_alert_and_broadcast() {
        let store = Arc::new(RecordingStore::default());
        let broadcast = Arc::new(RecordingBroadcast::default());
        let dispatcher = AlertDispatcher::new(store.clone(), broadcast.clone(), 70.0);

        let result = dispatcher
            .maybe_create_alert(&post(), &analysis(70.0))
            .await
            .unwrap();

        assert!(result.is_some());
        assert_eq!(store.created.load(Ordering::SeqCst), 1);
        assert_eq!(broadcast.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_broadcast_failure_still_returns_alert() {
        let store = Arc::new(RecordingStore::default());
        let dispatcher = AlertDispatcher::new(store.clone(), Arc::new(FailingBroadcast), 70.0);

        let result = dispatcher
            .maybe_create_alert(&post(), &analysis(95.0))
            .await
            .unwrap();

        assert!(result.is_some());
        assert_eq!(store.created.load(Ordering::SeqCst), 1);
    }
}
