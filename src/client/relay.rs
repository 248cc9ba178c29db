use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::client::{ChatMessage, ConversationStore};
use crate::error::{ClientError, WebSocketError};
use crate::websocket::{ClientEvent, ConnectionId, Envelope, MessageKind, ServerEvent, UserRecord};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How [`RelayClient::send_message`] handled a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the relay; the peer was online at last count.
    Relayed,
    /// Peer not online, kept in the local conversation only.
    StoredOnly,
}

/// A connection to the relay from the client side.
pub struct RelayClient {
    id: ConnectionId,
    name: Option<String>,
    online: Vec<UserRecord>,
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
}

impl RelayClient {
    /// Connects and waits for the relay to assign an identifier.
    pub async fn connect(endpoint: &str) -> Result<Self, ClientError> {
        let url = Url::parse(endpoint)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ClientError::InvalidEndpoint(format!(
                "expected a ws:// or wss:// url, got {}",
                endpoint
            )));
        }

        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (write, read) = ws_stream.split();
        let mut client = Self {
            id: ConnectionId::new(),
            name: None,
            online: Vec::new(),
            write,
            read,
        };

        match client.next_event().await? {
            Some(ServerEvent::Connected { id }) => {
                info!("Connected to relay at {} as {}", url, id);
                client.id = id;
                Ok(client)
            }
            Some(other) => Err(ClientError::Protocol(WebSocketError::InvalidFormat(format!(
                "expected handshake, got {:?}",
                other
            )))),
            None => Err(ClientError::Closed),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Users from the most recent `users` broadcast.
    pub fn online_users(&self) -> &[UserRecord] {
        &self.online
    }

    pub fn is_online(&self, id: &ConnectionId) -> bool {
        self.online.iter().any(|user| user.id == *id)
    }

    /// Announces (or changes) this client's display name.
    pub async fn register(&mut self, name: &str) -> Result<(), ClientError> {
        self.send_event(&ClientEvent::Register { name: Some(name.to_string()) }).await?;
        self.name = Some(name.to_string());
        Ok(())
    }

    pub async fn send_envelope(&mut self, envelope: Envelope) -> Result<(), ClientError> {
        self.send_event(&ClientEvent::PrivateMessage(envelope)).await
    }

    /// Records a message in `store` and relays it if `to` is online.
    pub async fn send_message(
        &mut self,
        store: &mut ConversationStore,
        to: ConnectionId,
        title: &str,
        kind: MessageKind,
        content: &str,
    ) -> Result<Delivery, ClientError> {
        let message = ChatMessage {
            from: self.id.to_string(),
            from_name: self.name.clone().unwrap_or_default(),
            content: content.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            kind,
        };
        store.append(&to.to_string(), title, message.clone());

        if !self.is_online(&to) {
            debug!("{} is offline, keeping message locally", to);
            return Ok(Delivery::StoredOnly);
        }

        self.send_envelope(Envelope::address(to, &message)?).await?;
        Ok(Delivery::Relayed)
    }

    /// Waits for the next relay event. Returns `None` once the relay closes.
    pub async fn next_event(&mut self) -> Result<Option<ServerEvent>, ClientError> {
        while let Some(frame) = self.read.next().await {
            match frame? {
                Message::Text(text) => {
                    let event = match ServerEvent::decode(&text) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("Ignoring unreadable relay frame: {}", e);
                            continue;
                        }
                    };
                    if let ServerEvent::Users(users) = &event {
                        self.online = users.clone();
                    }
                    return Ok(Some(event));
                }
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.write.close().await?;
        Ok(())
    }

    async fn send_event(&mut self, event: &ClientEvent) -> Result<(), ClientError> {
        let text = event.encode()?;
        self.write.send(Message::Text(text)).await?;
        Ok(())
    }
}
