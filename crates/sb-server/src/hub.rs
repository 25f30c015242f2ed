//! Connection registry and message fan-out
//!
//! Every WebSocket connection registers an mpsc sender here; its writer
//! task drains the receiver into the socket, so per-connection ordering is
//! the channel's ordering. Fan-out across connections is parallel and makes
//! no ordering promise between recipients.

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::mpsc;

use sb_core::error::BroadcastError;
use sb_core::ConnectionId;
use sb_protocol::ServerMessage;

/// What a broadcast reports when some recipients are unreachable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Log failures, return the success count
    BestEffort,
    /// Surface partial and total failure as errors.
    /// Advisory either way: the triggering state change already committed.
    Raise,
}

/// Fan-out hub over all registered connections
#[derive(Default)]
pub struct BroadcastHub {
    connections: DashMap<ConnectionId, mpsc::Sender<String>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: ConnectionId, sender: mpsc::Sender<String>) {
        tracing::debug!(connection = %id, "connection registered");
        self.connections.insert(id, sender);
    }

    pub fn unregister(&self, id: &ConnectionId) -> bool {
        self.connections.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Send to one connection. A closed channel unregisters the connection
    /// and reports failure.
    pub async fn send_one(&self, id: &ConnectionId, message: &ServerMessage) -> bool {
        let Some(text) = encode(message) else {
            return false;
        };
        let sender = match self.connections.get(id) {
            Some(entry) => entry.value().clone(),
            None => return false,
        };
        if sender.send(text).await.is_err() {
            self.connections.remove(id);
            false
        } else {
            true
        }
    }

    /// Deliver to every registered connection except `exclude`, in parallel.
    ///
    /// Returns the number of successful deliveries. Under `Raise`, zero
    /// successes among one or more targets is `BroadcastError::Total`, a mix
    /// is `BroadcastError::Partial`. Dead connections are unregistered.
    pub async fn broadcast(
        &self,
        message: &ServerMessage,
        exclude: Option<&ConnectionId>,
        policy: DeliveryPolicy,
    ) -> Result<usize, BroadcastError> {
        let Some(text) = encode(message) else {
            return Ok(0);
        };

        let targets: Vec<(ConnectionId, mpsc::Sender<String>)> = self
            .connections
            .iter()
            .filter(|entry| Some(entry.key()) != exclude)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        if targets.is_empty() {
            return Ok(0);
        }
        let total = targets.len();

        let sends = targets.into_iter().map(|(id, sender)| {
            let text = text.clone();
            async move { (id, sender.send(text).await.is_ok()) }
        });

        let mut failed = Vec::new();
        for (id, ok) in join_all(sends).await {
            if !ok {
                self.connections.remove(&id);
                failed.push(id);
            }
        }

        let delivered = total - failed.len();
        if !failed.is_empty() {
            tracing::warn!(
                total,
                delivered,
                failed = ?failed.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
                "broadcast reached only part of the connections"
            );
        }

        match policy {
            DeliveryPolicy::BestEffort => Ok(delivered),
            DeliveryPolicy::Raise if delivered == 0 => {
                Err(BroadcastError::Total { total, failed })
            }
            DeliveryPolicy::Raise if !failed.is_empty() => {
                Err(BroadcastError::Partial { total, failed })
            }
            DeliveryPolicy::Raise => Ok(delivered),
        }
    }
}

fn encode(message: &ServerMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode outbound message");
            None
        }
    }
}
