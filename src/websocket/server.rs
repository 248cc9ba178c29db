use std::sync::Arc;
use tracing::{error, info};

use crate::registry::SessionRegistry;
use crate::router::{MessageRouter, RouteOutcome};
use crate::websocket::{ClientEvent, ConnectionId, ConnectionPool, Outbound, ServerEvent};

/// Handle to the relay's shared state. Cheap to clone; one per process,
/// owned by [`AppState`](crate::AppState).
#[derive(Clone)]
pub struct RelayServer {
    pool: Arc<ConnectionPool>,
    registry: Arc<SessionRegistry>,
    router: Arc<MessageRouter>,
}

impl RelayServer {
    pub fn new(default_name: impl Into<String>) -> Self {
        let pool = Arc::new(ConnectionPool::new());
        Self {
            registry: Arc::new(SessionRegistry::new(pool.clone(), default_name)),
            router: Arc::new(MessageRouter::new(pool.clone())),
            pool,
        }
    }

    /// Announces `id` to its own client and joins it to the pool.
    pub async fn connect(&self, id: ConnectionId, tx: Outbound) {
        // Handshake goes out before any broadcast can reach the channel.
        match (ServerEvent::Connected { id }).encode() {
            Ok(text) => {
                if let Err(e) = tx.send(text) {
                    error!("Failed to send handshake to connection {}: {}", id, e);
                }
            }
            Err(e) => error!("Failed to encode handshake for {}: {}", id, e),
        }
        self.pool.add(id, tx).await;
        info!("Connection {} opened", id);
    }

    /// Applies one client event sent by `from`.
    pub async fn dispatch(&self, from: ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::Register { name } => {
                self.registry.register(from, name.as_deref()).await;
            }
            ClientEvent::PrivateMessage(envelope) => {
                if self.router.route(envelope).await != RouteOutcome::Delivered {
                    info!("Private message from {} was not delivered", from);
                }
            }
        }
    }

    /// Cleanup for a closed connection, whatever the cause.
    pub async fn disconnect(&self, id: ConnectionId) {
        self.pool.remove(&id).await;
        self.registry.remove(&id).await;
        info!("Connection {} closed", id);
    }

    pub fn pool(&self) -> Arc<ConnectionPool> {
        self.pool.clone()
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    pub fn router(&self) -> Arc<MessageRouter> {
        self.router.clone()
    }
}
