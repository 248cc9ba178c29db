use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::{AppError, WebSocketError};
use crate::websocket::{Connection, RelayServer};
use crate::AppState;

/// WebSocket connection handler
/// This upgrades the HTTP connection to a WebSocket connection
pub async fn websocket_route(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let peer_addr = req.peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    info!("New WebSocket connection request from: {}", peer_addr);

    let session = WebSocketSession::new(
        state.relay.clone(),
        peer_addr,
        state.config.websocket.heartbeat_interval(),
        state.config.websocket.client_timeout(),
    );
    // The default 64 KiB codec limit would drop image and audio envelopes.
    ws::WsResponseBuilder::new(session, &req, stream)
        .frame_size(state.config.websocket.max_frame_size)
        .start()
        .map_err(|e| AppError::WebSocketError(WebSocketError::HandshakeFailed(e.to_string())))
}

/// One actor per client connection. Frames from a single client are applied
/// strictly one after another.
pub struct WebSocketSession {
    relay: RelayServer,
    connection: Connection,
    peer_addr: String,
    last_heartbeat: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl WebSocketSession {
    pub fn new(
        relay: RelayServer,
        peer_addr: String,
        heartbeat_interval: Duration,
        client_timeout: Duration,
    ) -> Self {
        Self {
            relay,
            connection: Connection::new(),
            peer_addr,
            last_heartbeat: Instant::now(),
            heartbeat_interval,
            client_timeout,
        }
    }

    fn handle_text(&mut self, text: &str, ctx: &mut <Self as Actor>::Context) {
        let event = match self.connection.accept(text) {
            Ok(event) => event,
            Err(e) => {
                // Bad input only ever affects this connection, and the peer
                // is not told about it.
                warn!("Ignoring frame from {} ({}): {}", self.peer_addr, self.connection.id(), e);
                return;
            }
        };

        let relay = self.relay.clone();
        let id = self.connection.id();
        // `wait` holds back the next frame until this one is applied.
        ctx.wait(async move { relay.dispatch(id, event).await }.into_actor(self));
    }

    /// Pings the client and drops it once it has been silent too long.
    fn start_heartbeat(&self, ctx: &mut <Self as Actor>::Context) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!("Heartbeat timeout for {} ({})", act.peer_addr, act.connection.id());
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WebSocketSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let id = self.connection.id();
        info!("WebSocket connection established with {} (id: {})", self.peer_addr, id);

        self.start_heartbeat(ctx);

        let (tx, rx) = mpsc::unbounded_channel::<String>();
        ctx.add_stream(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|text| (text, rx))
        }));

        let relay = self.relay.clone();
        ctx.wait(async move { relay.connect(id, tx).await }.into_actor(self));
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let id = self.connection.id();
        info!("WebSocket connection closed with {} (id: {})", self.peer_addr, id);

        if self.connection.close() {
            let relay = self.relay.clone();
            actix::spawn(async move { relay.disconnect(id).await });
        }
    }
}

/// Frames queued for this client by the registry or the router.
impl StreamHandler<String> for WebSocketSession {
    fn handle(&mut self, text: String, ctx: &mut Self::Context) {
        ctx.text(text);
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        // The pool dropped our sender, nothing can reach this client anymore.
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WebSocketSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        self.last_heartbeat = Instant::now();
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Text(text)) => {
                self.handle_text(&text, ctx);
            }
            Ok(ws::Message::Binary(bin)) => {
                warn!("Ignoring binary frame from {} of {} bytes", self.peer_addr, bin.len());
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed from {}: {:?}", self.peer_addr, reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                error!("Error handling WebSocket message from {}: {}", self.peer_addr, e);
                ctx.stop();
            }
        }
    }
}
