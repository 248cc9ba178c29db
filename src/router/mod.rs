//! Point-to-point message routing.

use std::sync::Arc;
use tracing::{debug, error};

use crate::error::WebSocketError;
use crate::websocket::{ConnectionId, ConnectionPool, Envelope, ServerEvent};

/// What happened to a routed envelope. Never reported back to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Delivered,
    /// The envelope had no `to`, or an empty one.
    Unaddressed,
    /// Nobody currently owns the `to` identifier.
    NoRecipient,
}

/// Forwards envelopes to live connections. Holds no state of its own:
/// no buffering, no retries, no dead letters.
pub struct MessageRouter {
    pool: Arc<ConnectionPool>,
}

impl MessageRouter {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    pub async fn route(&self, envelope: Envelope) -> RouteOutcome {
        let Some(to) = envelope.recipient() else {
            debug!("Dropping private message without recipient");
            return RouteOutcome::Unaddressed;
        };

        let Ok(target) = to.parse::<ConnectionId>() else {
            debug!("Dropping private message for unknown recipient {:?}", to);
            return RouteOutcome::NoRecipient;
        };

        let text = match ServerEvent::PrivateMessage(envelope).encode() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode private message for {}: {}", target, e);
                return RouteOutcome::NoRecipient;
            }
        };

        match self.pool.send_to(&target, &text).await {
            Ok(()) => {
                debug!("Relayed private message to {}", target);
                RouteOutcome::Delivered
            }
            Err(WebSocketError::ConnectionError(_)) => {
                debug!("Dropping private message for offline recipient {}", target);
                RouteOutcome::NoRecipient
            }
            Err(e) => {
                error!("Failed to relay private message to {}: {}", target, e);
                RouteOutcome::NoRecipient
            }
        }
    }
}
