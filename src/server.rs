//! WebSocket relay server with room-based document routing.
//!
//! ```text
//! Client A ──┐
//!             ├── Room ("swot-collab/{id}") ── fan-out
//! Client B ──┘            │
//!                ┌────────┴────────┐
//!                ▼                 ▼
//!             Client A          Client B
//! ```
//!
//! The server holds no document state: every structurally valid
//! [`ChangeEvent`] a client sends is relayed to all other channels in
//! the same room, and each client's own engine decides what to apply.
//! Malformed frames are logged and dropped without closing the channel.

use std::net::SocketAddr;
use std::sync::Arc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;

use crate::broadcast::RoomManager;
use crate::protocol::ChangeEvent;

/// Path prefix the web client connects to: `/ws/swot-collab/{room}/`.
const WS_PATH_PREFIX: &str = "/ws/swot-collab/";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Maximum channels per room
    pub max_clients_per_room: usize,
    /// Broadcast buffer capacity per room
    pub broadcast_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            max_clients_per_room: 100,
            broadcast_capacity: 256,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub active_rooms: usize,
}

/// The relay server.
pub struct CollabServer {
    config: ServerConfig,
    rooms: Arc<RoomManager>,
    stats: Arc<RwLock<ServerStats>>,
}

impl CollabServer {
    pub fn new(config: ServerConfig) -> Self {
        let rooms = Arc::new(RoomManager::new(config.broadcast_capacity));
        Self {
            config,
            rooms,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Start listening for WebSocket connections.
    ///
    /// Runs the accept loop; each connection gets its own task so a
    /// stalled channel never blocks other rooms or clients.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Collab server listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let rooms = self.rooms.clone();
            let stats = self.stats.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, rooms, stats, config).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection for its whole lifetime.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        rooms: Arc<RoomManager>,
        stats: Arc<RwLock<ServerStats>>,
        config: ServerConfig,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Capture the request path during the handshake to learn the room.
        let mut path = String::new();
        let ws_stream = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
            path = req.uri().path().to_string();
            Ok(resp)
        })
        .await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let room_id = match room_from_path(&path) {
            Some(id) => id,
            None => {
                log::warn!("Rejecting connection from {addr}: unroutable path {path:?}");
                let _ = ws_sender.send(Message::Close(None)).await;
                return Ok(());
            }
        };

        let room = rooms.get_or_create(&room_id).await;

        // Username is learned from the first event that carries one.
        // The cap check and the join are one atomic step, so two racing
        // handshakes cannot both squeeze into the last slot.
        let (channel_id, mut room_rx) =
            match room.try_join("anonymous", config.max_clients_per_room).await {
                Some(joined) => joined,
                None => {
                    log::warn!("Room {room_id} is full, rejecting {addr}");
                    let _ = ws_sender.send(Message::Close(None)).await;
                    rooms.remove_if_empty(&room_id).await;
                    return Ok(());
                }
            };
        let mut username: Option<String> = None;

        log::info!("WebSocket connection from {addr} joined room {room_id}");
        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
            s.active_rooms = rooms.room_count().await;
        }

        loop {
            tokio::select! {
                // Inbound frame from this client
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match ChangeEvent::decode(text.as_str()) {
                                Ok(event) => {
                                    {
                                        let mut s = stats.write().await;
                                        s.total_messages += 1;
                                        s.total_bytes += text.len() as u64;
                                    }

                                    if username.is_none() {
                                        let name = event.username().to_string();
                                        room.set_member_name(&channel_id, &name).await;
                                        log::info!("{name} ({addr}) active in room {room_id}");
                                        username = Some(name);
                                    }

                                    // Pure relay: fan the raw frame out to
                                    // every other channel in the room.
                                    room.publish(channel_id, Arc::new(text.as_str().to_string()));
                                }
                                Err(e) => {
                                    // Drop the single frame, keep the channel.
                                    log::warn!("Undecodable frame from {addr} in room {room_id}: {e}");
                                }
                            }
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            break;
                        }

                        Some(Ok(Message::Ping(data))) => {
                            // A failed write still has to run the
                            // teardown below, so no early return here.
                            if let Err(e) = ws_sender.send(Message::Pong(data)).await {
                                log::warn!("Failed to answer ping from {addr}: {e}");
                                break;
                            }
                        }

                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }

                        _ => {}
                    }
                }

                // Frame relayed from another channel in the room
                frame = room_rx.recv() => {
                    match frame {
                        Ok(payload) => {
                            // A dead peer fails here (e.g. RST with a
                            // relayed frame pending); break so the
                            // channel still leaves its room.
                            if let Err(e) = ws_sender.send(Message::Text(payload.as_str().into())).await {
                                log::warn!("Relay write to {addr} failed: {e}");
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("Channel {channel_id} in room {room_id} lagged by {n} frames");
                        }
                        Err(_) => break,
                    }
                }
            }
        }

        // Teardown: leave the room, drop it once empty. Closing this
        // channel cancels only its own delivery; broadcasts already
        // fanned out to other channels are unaffected.
        room.leave(&channel_id).await;
        if rooms.remove_if_empty(&room_id).await {
            log::info!("Room {room_id} removed (empty)");
        }

        let mut s = stats.write().await;
        s.active_connections -= 1;
        s.active_rooms = rooms.room_count().await;

        Ok(())
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }
}

/// Build the request path for a room: `/ws/swot-collab/{room}/`.
pub fn ws_room_path(room: &str) -> String {
    format!("{WS_PATH_PREFIX}{room}/")
}

/// Extract the room id from a request path like `/ws/swot-collab/42/`.
fn room_from_path(path: &str) -> Option<String> {
    let rest = path.strip_prefix(WS_PATH_PREFIX)?;
    let room = rest.trim_end_matches('/');
    if room.is_empty() || room.contains('/') {
        return None;
    }
    Some(room.to_string())
}
