//! WebSocket module for the chat relay
//!
//! This module handles WebSocket connections, the wire protocol,
//! and client session lifecycle.

mod connection;
mod pool;
mod protocol;
mod server;
mod session;

pub use connection::{Connection, ConnectionState};
pub use pool::{ConnectionPool, Outbound};
pub use protocol::{ClientEvent, ConnectionId, Envelope, MessageKind, ServerEvent, UserRecord};
pub use server::RelayServer;
pub use session::{websocket_route, WebSocketSession};
