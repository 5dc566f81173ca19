//! Client side of the transport channel.
//!
//! One [`CollabClient`] owns a long-lived WebSocket scoped to a single
//! document's room. On connect it announces the user online; on
//! disconnect it makes a best-effort offline announcement before
//! teardown. Received events are handed to the application over an mpsc
//! channel — feed them to [`crate::session::EditorSession::apply_remote`].
//!
//! There is no delivery guarantee and no automatic reconnect: if the
//! channel drops, collaboration degrades to solo editing until the
//! session is reopened.

use std::sync::Arc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{ChangeEvent, ProtocolError};
use crate::server::ws_room_path;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// The transport channel client.
pub struct CollabClient {
    username: String,
    room: String,
    server_url: String,

    state: Arc<RwLock<ConnectionState>>,

    /// Channel to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<String>>,

    /// Decoded remote events for the application
    event_rx: Option<mpsc::Receiver<ChangeEvent>>,
    event_tx: mpsc::Sender<ChangeEvent>,
}

impl CollabClient {
    /// Create a client for `username` editing the document in `room`.
    pub fn new(
        username: impl Into<String>,
        room: impl Into<String>,
        server_url: impl Into<String>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            username: username.into(),
            room: room.into(),
            server_url: server_url.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
        }
    }

    /// Take the remote-event receiver (can only be called once).
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<ChangeEvent>> {
        self.event_rx.take()
    }

    /// Open the channel and announce the user online.
    ///
    /// Spawns a writer task (mpsc → socket) and a reader task
    /// (socket → decoded events).
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let url = format!("{}{}", self.server_url, ws_room_path(&self.room));
        let ws_stream = match tokio_tungstenite::connect_async(&url).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                log::error!("Failed to open channel to {url}: {e}");
                return Err(ProtocolError::ConnectionClosed);
            }
        };

        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward outgoing frames, close the socket when
        // the channel ends.
        let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if ws_writer.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.send(Message::Close(None)).await;
        });

        // Online announcement goes out first on the fresh channel.
        let online = ChangeEvent::Online { username: self.username.clone() };
        if let Some(ref tx) = self.outgoing_tx {
            let _ = tx.send(online.encode()?).await;
        }

        *self.state.write().await = ConnectionState::Connected;
        log::info!("{} connected to room {}", self.username, self.room);

        // Reader task: decode inbound frames into events.
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        let username = self.username.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match ChangeEvent::decode(text.as_str()) {
                        Ok(event) => {
                            if event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            // Single bad frame: log, keep the channel.
                            log::warn!("Ignoring undecodable frame: {e}");
                        }
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            // Channel gone; no reconnect — solo editing from here on.
            *state.write().await = ConnectionState::Disconnected;
            log::info!("Channel closed for {username}");
        });

        Ok(())
    }

    /// Send an event, fire-and-forget.
    ///
    /// When the channel is not connected the event is dropped with a
    /// debug log — no queueing, no retry.
    pub async fn send(&self, event: &ChangeEvent) -> Result<(), ProtocolError> {
        if *self.state.read().await != ConnectionState::Connected {
            log::debug!("Channel not connected; dropping event from {}", event.username());
            return Ok(());
        }

        let encoded = event.encode()?;
        if let Some(ref tx) = self.outgoing_tx {
            tx.send(encoded)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed)?;
        }
        Ok(())
    }

    /// Close the channel, announcing the user offline first if the
    /// channel is still writable.
    pub async fn disconnect(&mut self) {
        if let Some(tx) = self.outgoing_tx.take() {
            if *self.state.read().await == ConnectionState::Connected {
                let offline = ChangeEvent::Offline { username: self.username.clone() };
                if let Ok(encoded) = offline.encode() {
                    // Best effort: if the writer is already gone the
                    // teardown proceeds without the announcement.
                    let _ = tx.send(encoded).await;
                }
            }
            // Dropping the sender ends the writer task, which closes
            // the socket.
        }
        *self.state.write().await = ConnectionState::Disconnected;
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}
