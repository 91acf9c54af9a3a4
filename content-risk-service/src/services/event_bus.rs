//! Redis pub/sub broadcast channel for alert summaries
//!
//! Delivery is at-most-once per currently-connected subscriber; missed
//! messages are not persisted.

use crate::error::Result;
use crate::models::AlertSummary;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Topic the alert dispatcher publishes to.
pub const ALERTS_CHANNEL: &str = "alerts:new";

#[derive(Clone)]
pub struct AlertPublisher {
    conn: ConnectionManager,
    channel: String,
}

impl AlertPublisher {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            channel: ALERTS_CHANNEL.to_string(),
        })
    }

    /// Publish a summary; returns the number of subscribers that received it.
    pub async fn publish(&self, summary: &AlertSummary) -> Result<usize> {
        let payload = serde_json::to_string(summary)?;
        let mut conn = self.conn.clone();
        let subscriber_count: usize = conn.publish(&self.channel, payload).await?;

        tracing::debug!(
            alert_id = %summary.id,
            subscribers = subscriber_count,
            channel = %self.channel,
            "Alert summary published"
        );

        Ok(subscriber_count)
    }
}

pub struct AlertSubscriber {
    client: Client,
    channel: String,
}

impl AlertSubscriber {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self {
            client,
            channel: ALERTS_CHANNEL.to_string(),
        })
    }

    /// Run a listener loop delivering each decoded summary to the callback.
    /// Malformed payloads are logged and skipped; the loop only ends when the
    /// pub/sub stream closes.
    pub async fn subscribe<F, Fut>(&self, callback: F) -> Result<JoinHandle<()>>
    where
        F: Fn(AlertSummary) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;

        tracing::info!(channel = %self.channel, "Subscribed to alert broadcasts");

        let callback = Arc::new(callback);
        let handle = tokio::spawn(async move {
            let mut stream = pubsub.on_message();

            while let Some(msg) = stream.next().await {
                let payload = match msg.get_payload::<String>() {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::error!(error = ?e, "Failed to read pub/sub payload");
                        continue;
                    }
                };

                let summary: AlertSummary = match serde_json::from_str(&payload) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::error!(error = ?e, payload = %payload, "Malformed alert payload");
                        continue;
                    }
                };

                callback(summary).await;
            }

            tracing::warn!("Alert broadcast stream closed");
        });

        Ok(handle)
    }
}
