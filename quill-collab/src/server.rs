//! WebSocket relay server holding the canonical text.
//!
//! Architecture:
//! ```text
//! Editor A ──┐                          ┌──► Editor A (echo_to_sender only)
//!            ├── /ws ── CanonicalDocument ── BroadcastGroup ──► Editor B
//! Editor B ──┘                          └──► Editor C
//! ```
//!
//! Every accepted update, whether a full text or a single operation, is
//! answered by broadcasting the resulting canonical text. Updates are
//! applied in the order the server receives them and nothing arbitrates
//! between operations made against different views: last writer wins.

use std::net::SocketAddr;
use std::sync::Arc;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use uuid::Uuid;

use crate::broadcast::{BroadcastGroup, Frame};
use crate::document::{CanonicalDocument, DocumentError};
use crate::protocol::{
    CanonicalTextMessage, OperationMessage, ProtocolError, WireMessage, ENDPOINT_PATH,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Only upgrades on this path are accepted
    pub endpoint_path: String,
    /// Connections beyond this are closed on arrival
    pub max_peers: usize,
    /// Broadcast channel capacity
    pub broadcast_capacity: usize,
    /// Also send the resulting text back to the peer that sent the update
    pub echo_to_sender: bool,
    /// Largest canonical text accepted, in chars
    pub max_text_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            endpoint_path: ENDPOINT_PATH.to_string(),
            max_peers: 100,
            broadcast_capacity: 256,
            echo_to_sender: false,
            max_text_len: 1 << 20,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub refused_connections: u64,
    pub total_messages: u64,
    pub rejected_messages: u64,
    pub total_bytes: u64,
}

/// Why an inbound update was not applied.
#[derive(Debug, Error)]
enum RejectedUpdate {
    #[error(transparent)]
    Malformed(#[from] ProtocolError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("text of {len} chars exceeds limit of {max}")]
    TooLarge { len: usize, max: usize },
}

/// State shared by every connection task.
#[derive(Clone)]
struct Shared {
    config: ServerConfig,
    document: Arc<RwLock<CanonicalDocument>>,
    broadcast: Arc<BroadcastGroup>,
    stats: Arc<RwLock<ServerStats>>,
}

/// The relay server.
pub struct SyncServer {
    shared: Shared,
}

impl SyncServer {
    /// Create a new server with an empty canonical text.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_text(config, "")
    }

    /// Create a server whose canonical text starts as `text`.
    pub fn with_text(config: ServerConfig, text: &str) -> Self {
        let broadcast = Arc::new(BroadcastGroup::new(config.broadcast_capacity));
        Self {
            shared: Shared {
                config,
                document: Arc::new(RwLock::new(CanonicalDocument::from_text(text))),
                broadcast,
                stats: Arc::new(RwLock::new(ServerStats::default())),
            },
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Bind `bind_addr` and serve until the listener fails.
    pub async fn run(&self) -> Result<(), BoxError> {
        let listener = TcpListener::bind(&self.shared.config.bind_addr).await?;
        log::info!(
            "Sync server listening on {}{}",
            self.shared.config.bind_addr,
            self.shared.config.endpoint_path
        );
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), BoxError> {
        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let shared = self.shared.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, shared).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        shared: Shared,
    ) -> Result<(), BoxError> {
        let path = shared.config.endpoint_path.clone();
        let check_path = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            if req.uri().path() == path {
                Ok(resp)
            } else {
                let mut refusal = ErrorResponse::new(Some(format!("no endpoint at {}", req.uri().path())));
                *refusal.status_mut() = StatusCode::NOT_FOUND;
                Err(refusal)
            }
        };
        let ws_stream = tokio_tungstenite::accept_hdr_async(stream, check_path).await?;
        let (mut ws_sender, ws_receiver) = ws_stream.split();

        if shared.broadcast.peer_count().await >= shared.config.max_peers {
            log::warn!("Refusing {addr}: peer limit {} reached", shared.config.max_peers);
            shared.stats.write().await.refused_connections += 1;
            ws_sender.send(Message::Close(None)).await?;
            return Ok(());
        }

        let peer_id = Uuid::new_v4();
        let broadcast_rx = shared.broadcast.add_peer(peer_id).await;
        log::info!("WebSocket connection established from {addr} (peer {peer_id})");

        {
            let mut s = shared.stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let result =
            Self::relay(peer_id, addr, &shared, &mut ws_sender, ws_receiver, broadcast_rx).await;

        // Cleanup runs whether the relay ended cleanly or not
        shared.broadcast.remove_peer(&peer_id).await;
        shared.stats.write().await.active_connections -= 1;
        log::info!("Connection closed from {addr} (peer {peer_id})");

        result
    }

    /// Greet the peer with the canonical text, then pump both directions.
    async fn relay<S, R>(
        peer_id: Uuid,
        addr: SocketAddr,
        shared: &Shared,
        ws_sender: &mut S,
        mut ws_receiver: R,
        mut broadcast_rx: broadcast::Receiver<Frame>,
    ) -> Result<(), BoxError>
    where
        S: Sink<Message, Error = WsError> + Unpin,
        R: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        let greeting = {
            let doc = shared.document.read().await;
            WireMessage::text(doc.text()).encode()?
        };
        ws_sender.send(Message::text(greeting)).await?;

        loop {
            tokio::select! {
                // Incoming WebSocket message
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(raw))) => {
                            {
                                let mut s = shared.stats.write().await;
                                s.total_messages += 1;
                                s.total_bytes += raw.len() as u64;
                            }

                            match Self::apply_update(shared, raw.as_str()).await {
                                Ok(frame) => {
                                    shared.broadcast.broadcast(peer_id, frame);
                                }
                                Err(e) => {
                                    log::warn!("Rejected update from {addr}: {e}");
                                    shared.stats.write().await.rejected_messages += 1;
                                }
                            }
                        }

                        Some(Ok(Message::Close(_))) | None => break,

                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }

                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }

                        _ => {}
                    }
                }

                // Outgoing broadcast frame
                frame = broadcast_rx.recv() => {
                    match frame {
                        Ok(frame) => {
                            if frame.origin == peer_id && !shared.config.echo_to_sender {
                                continue;
                            }
                            ws_sender.send(Message::text(frame.payload.to_string())).await?;
                        }
                        Err(RecvError::Lagged(n)) => {
                            log::warn!("Peer {peer_id} lagged by {n} frames");
                            shared.broadcast.record_lag(n);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }

        Ok(())
    }

    /// Apply one inbound frame to the canonical text and return the frame
    /// to broadcast.
    async fn apply_update(shared: &Shared, raw: &str) -> Result<String, RejectedUpdate> {
        let msg = WireMessage::decode(raw)?;
        let max = shared.config.max_text_len;

        let mut doc = shared.document.write().await;
        match msg {
            WireMessage::Text(CanonicalTextMessage { text }) => {
                let len = text.chars().count();
                if len > max {
                    return Err(RejectedUpdate::TooLarge { len, max });
                }
                doc.replace(&text);
            }
            WireMessage::Operation(op) => {
                if matches!(op, OperationMessage::Insert { .. }) && doc.len() >= max {
                    return Err(RejectedUpdate::TooLarge { len: doc.len() + 1, max });
                }
                doc.apply(&op)?;
                log::debug!("Applied {op:?}");
            }
        }

        Ok(WireMessage::text(doc.text()).encode()?)
    }

    /// Current canonical text.
    pub async fn text(&self) -> String {
        self.shared.document.read().await.text()
    }

    /// Get server statistics.
    pub async fn stats(&self) -> ServerStats {
        self.shared.stats.read().await.clone()
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.shared.config.bind_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    pub fn broadcast(&self) -> &Arc<BroadcastGroup> {
        &self.shared.broadcast
    }
}
