use tracing::{debug, info};

use crate::error::WebSocketError;
use crate::websocket::{ClientEvent, ConnectionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    OpenUnregistered,
    OpenRegistered,
    Closed,
}

/// Server-side view of one client connection.
///
/// Only tracks lifecycle. Side effects are applied by
/// [`RelayServer`](crate::websocket::RelayServer).
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    state: ConnectionState,
}

impl Connection {
    pub fn new() -> Self {
        Self {
            id: ConnectionId::new(),
            state: ConnectionState::OpenUnregistered,
        }
    }

    /// Decodes an incoming text frame and advances the lifecycle.
    ///
    /// Sending before registering is allowed.
    pub fn accept(&mut self, text: &str) -> Result<ClientEvent, WebSocketError> {
        if self.state == ConnectionState::Closed {
            return Err(WebSocketError::ConnectionClosed);
        }

        let event = ClientEvent::decode(text)?;
        if let ClientEvent::Register { .. } = event {
            if self.state == ConnectionState::OpenUnregistered {
                info!("Connection {} registered", self.id);
                self.state = ConnectionState::OpenRegistered;
            }
        } else {
            debug!("Connection {} sent a private message", self.id);
        }
        Ok(event)
    }

    /// Moves to `Closed`. Returns `true` only the first time, so cleanup
    /// runs exactly once.
    pub fn close(&mut self) -> bool {
        if self.state == ConnectionState::Closed {
            return false;
        }
        self.state = ConnectionState::Closed;
        true
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}
