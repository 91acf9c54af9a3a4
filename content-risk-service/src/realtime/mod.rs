//! Realtime fan-out of alert summaries to connected observers
//!
//! Observers register an unbounded sender; delivery failure means the
//! receiving side is gone, so the connection is pruned on the spot. A slow
//! or dead observer never blocks delivery to the others.

use crate::error::Result;
use crate::models::AlertSummary;
use crate::services::event_bus::AlertSubscriber;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

pub type ObserverSender = mpsc::UnboundedSender<AlertSummary>;

#[derive(Clone, Default)]
pub struct AlertFanout {
    connections: Arc<RwLock<HashMap<Uuid, ObserverSender>>>,
}

impl AlertFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer; returns its connection id for later removal.
    pub async fn register(&self, sender: ObserverSender) -> Uuid {
        let connection_id = Uuid::new_v4();
        self.connections.write().await.insert(connection_id, sender);
        tracing::debug!(connection_id = %connection_id, "Observer connected");
        connection_id
    }

    pub async fn unregister(&self, connection_id: Uuid) {
        if self.connections.write().await.remove(&connection_id).is_some() {
            tracing::debug!(connection_id = %connection_id, "Observer disconnected");
        }
    }

    /// Deliver a summary to every live observer, pruning any whose channel
    /// is closed.
    pub async fn broadcast(&self, summary: AlertSummary) {
        let snapshot: Vec<(Uuid, ObserverSender)> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .map(|(id, sender)| (*id, sender.clone()))
                .collect()
        };

        let mut stale = Vec::new();
        for (connection_id, sender) in snapshot {
            if sender.send(summary.clone()).is_err() {
                stale.push(connection_id);
            }
        }

        if !stale.is_empty() {
            let mut connections = self.connections.write().await;
            for connection_id in &stale {
                connections.remove(connection_id);
            }
            tracing::debug!(pruned = stale.len(), "Pruned dead observer connections");
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

/// Bridge the broadcast channel into the local connection set: a dedicated
/// listener loop that pushes every received summary to all observers.
pub async fn run_alert_listener(
    fanout: AlertFanout,
    subscriber: AlertSubscriber,
) -> Result<JoinHandle<()>> {
    subscriber
        .subscribe(move |summary| {
            let fanout = fanout.clone();
            async move {
                fanout.broadcast(summary).await;
            }
        })
        .await
}
