use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use crate::error::WebSocketError;
use crate::websocket::ConnectionId;
use tracing::{debug, error, info};

/// Outbound half of a live connection. Frames are pre-encoded JSON text.
pub type Outbound = mpsc::UnboundedSender<String>;

#[derive(Debug, Default)]
pub struct ConnectionPool {
    connections: Arc<RwLock<HashMap<ConnectionId, Outbound>>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn add(&self, id: ConnectionId, sender: Outbound) {
        self.connections.write().await.insert(id, sender);
        info!("Added connection {} to pool", id);
    }

    pub async fn remove(&self, id: &ConnectionId) -> bool {
        let removed = self.connections.write().await.remove(id).is_some();
        if removed {
            info!("Removed connection {} from pool", id);
        }
        removed
    }

    /// Sends `msg` to every live connection except `exclude_id` and returns
    /// how many channels accepted it.
    pub async fn broadcast(&self, msg: &str, exclude_id: Option<ConnectionId>) -> usize {
        let connections = self.connections.read().await;
        let mut delivered = 0;

        for (id, sender) in connections.iter() {
            if Some(*id) == exclude_id {
                continue;
            }

            match sender.send(msg.to_string()) {
                Ok(()) => delivered += 1,
                Err(e) => error!("Failed to broadcast to connection {}: {}", id, e),
            }
        }

        debug!("Broadcast reached {} of {} connections", delivered, connections.len());
        delivered
    }

    pub async fn send_to(&self, id: &ConnectionId, msg: &str) -> Result<(), WebSocketError> {
        if let Some(sender) = self.connections.read().await.get(id) {
            sender
                .send(msg.to_string())
                .map_err(|e| WebSocketError::SendError(format!("Failed to send message: {}", e)))?;
            Ok(())
        } else {
            Err(WebSocketError::ConnectionError(format!("Connection {} not found", id)))
        }
    }

    pub async fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.read().await.contains_key(id)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn get_all_connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.read().await.keys().cloned().collect()
    }
}
