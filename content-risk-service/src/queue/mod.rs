//! Redis-backed work queue decoupling ingestion from analysis
//!
//! Ingestion pushes post ids; a pool of worker tasks pops them and runs the
//! analysis pipeline with retry-with-backoff on transient failure.

use crate::error::Result;
use crate::services::pipeline::AnalysisPipeline;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const ANALYSIS_QUEUE: &str = "analysis:queue";

/// Blocking-pop timeout; keeps worker shutdown latency bounded to ~1s.
const POP_TIMEOUT_SECS: usize = 1;

#[derive(Clone)]
pub struct AnalysisQueue {
    conn: ConnectionManager,
    key: String,
}

impl AnalysisQueue {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            key: ANALYSIS_QUEUE.to_string(),
        })
    }

    pub async fn enqueue(&self, post_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(&self.key, post_id.to_string()).await?;
        tracing::debug!(post_id = %post_id, "Post enqueued for analysis");
        Ok(())
    }

    /// Pop the next post id, waiting at most the blocking-pop timeout.
    /// Returns None on timeout or when the payload is not a valid id.
    pub async fn pop(&self) -> Result<Option<Uuid>> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.key)
            .arg(POP_TIMEOUT_SECS)
            .query_async(&mut conn)
            .await?;

        match popped {
            Some((_, value)) => match Uuid::parse_str(&value) {
                Ok(post_id) => Ok(Some(post_id)),
                Err(_) => {
                    tracing::warn!(payload = %value, "Dropping malformed queue entry");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }
}

/// Retry policy for failed analysis tasks.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let backoff = self.backoff_ms.saturating_mul(2_u64.saturating_pow(attempt));
        Duration::from_millis(backoff.min(self.max_backoff_ms))
    }
}

/// Spawn the analysis worker pool. Workers exit when the shutdown flag is
/// set, within roughly one blocking-pop timeout.
pub fn spawn_workers(
    count: usize,
    queue: AnalysisQueue,
    pipeline: Arc<AnalysisPipeline>,
    shutdown: Arc<AtomicBool>,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker_id| {
            let queue = queue.clone();
            let pipeline = pipeline.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                tracing::info!(worker_id, "Analysis worker started");
                worker_loop(worker_id, queue, pipeline, shutdown).await;
                tracing::info!(worker_id, "Analysis worker stopped");
            })
        })
        .collect()
}

async fn worker_loop(
    worker_id: usize,
    queue: AnalysisQueue,
    pipeline: Arc<AnalysisPipeline>,
    shutdown: Arc<AtomicBool>,
) {
    let policy = RetryPolicy::default();

    while !shutdown.load(Ordering::Relaxed) {
        match queue.pop().await {
            Ok(Some(post_id)) => {
                run_task(worker_id, &pipeline, &policy, post_id).await;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(worker_id, error = %e, "Queue pop failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Run one analysis task with up to `max_retries` retries on non-terminal
/// failure, then surface the failure as a terminal task result.
async fn run_task(
    worker_id: usize,
    pipeline: &AnalysisPipeline,
    policy: &RetryPolicy,
    post_id: Uuid,
) {
    for attempt in 0..=policy.max_retries {
        match pipeline.analyze_post(post_id).await {
            Ok(outcome) => {
                tracing::info!(
                    worker_id,
                    post_id = %post_id,
                    analysis_id = %outcome.analysis_id,
                    alert_id = ?outcome.alert_id,
                    "Analysis task completed"
                );
                return;
            }
            Err(e) if e.is_terminal() => {
                tracing::warn!(worker_id, post_id = %post_id, reason = %e, "Analysis task terminal");
                return;
            }
            Err(e) if attempt < policy.max_retries => {
                let backoff = policy.backoff(attempt);
                tracing::warn!(
                    worker_id,
                    post_id = %post_id,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Analysis task failed, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                tracing::error!(
                    worker_id,
                    post_id = %post_id,
                    error = %e,
                    "Analysis task failed permanently"
                );
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_ms: 500,
            max_backoff_ms: 10_000,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff(10), Duration::from_millis(10_000));
    }

    #[test]
    fn test_default_policy_retries_three_times() {
        assert_eq!(RetryPolicy::default().max_retries, 3);
    }
}
