//! WebSocket sync client for connecting an editor to the relay server.
//!
//! Provides:
//! - Connection setup and readiness logging
//! - Reader/writer tasks bridging the socket to the editor session
//! - Session events for the application (sends, remote writes, disconnect)
//!
//! There is no reconnection: when the socket closes the session keeps
//! editing offline and its sends are dropped.

use std::sync::Arc;
use std::time::Duration;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;

use crate::buffer::TextBuffer;
use crate::channel::ChannelTransport;
use crate::diff::{DiffStrategy, EditOperation, GapPolicy};
use crate::observer::DEFAULT_DEBOUNCE;
use crate::protocol::{endpoint_url, ProtocolError, WireFormat};
use crate::session::{spawn_session, EditorSession, SessionHandle};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Full WebSocket URL, endpoint path included
    pub server_url: String,
    pub wire_format: WireFormat,
    /// Gap handling when `wire_format` is `Operation`
    pub gap_policy: GapPolicy,
    /// Quiet period before an edit is evaluated
    pub debounce: Duration,
    /// Capacity of the inbound, outbound and command channels
    pub channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8080/ws".to_string(),
            wire_format: WireFormat::default(),
            gap_policy: GapPolicy::default(),
            debounce: DEFAULT_DEBOUNCE,
            channel_capacity: 256,
        }
    }
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    /// Configure for the page origin hosting the editor, e.g. `https://host`.
    pub fn for_origin(origin: &str) -> Result<Self, ProtocolError> {
        Ok(Self::new(endpoint_url(origin)?))
    }

    pub fn with_wire_format(mut self, wire_format: WireFormat) -> Self {
        self.wire_format = wire_format;
        self
    }

    pub fn with_gap_policy(mut self, gap_policy: GapPolicy) -> Self {
        self.gap_policy = gap_policy;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn diff_strategy(&self) -> DiffStrategy {
        self.wire_format.diff_strategy(self.gap_policy)
    }
}

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the sync client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Connection established
    Connected,
    /// A local edit was handed to the socket
    OperationSent(EditOperation),
    /// Server text was written into the buffer
    RemoteApplied { text: String },
    /// Connection lost
    Disconnected,
}

/// The sync client.
pub struct SyncClient {
    config: ClientConfig,

    /// Connection state
    state: Arc<RwLock<ConnectionState>>,

    /// Event receiver for the application
    event_rx: Option<mpsc::Receiver<SyncEvent>>,

    /// Event sender (held by the session and reader tasks)
    event_tx: mpsc::Sender<SyncEvent>,
}

impl SyncClient {
    pub fn new(config: ClientConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            event_rx: Some(event_rx),
            event_tx,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.take()
    }

    /// Connect and start a session editing `buffer`.
    ///
    /// Spawns the socket reader, socket writer and session tasks. The
    /// buffer's current text becomes the session baseline; the server's
    /// greeting then overwrites it like any other canonical update.
    pub async fn connect<B>(&mut self, buffer: B) -> Result<SessionHandle, ProtocolError>
    where
        B: TextBuffer + Send + 'static,
    {
        *self.state.write().await = ConnectionState::Connecting;

        let ws_stream = match tokio_tungstenite::connect_async(&self.config.server_url).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                log::error!("Failed to connect to {}: {e}", self.config.server_url);
                return Err(ProtocolError::WebSocket(e.to_string()));
            }
        };
        log::info!("WebSocket connection established with {}", self.config.server_url);

        // Marked before the reader starts so a fast close is not overwritten
        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.try_send(SyncEvent::Connected);

        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        let capacity = self.config.channel_capacity;

        // Writer task: forward encoded frames to the socket
        let (out_tx, mut out_rx) = mpsc::channel::<String>(capacity);
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = ws_writer.send(Message::text(frame)).await {
                    log::warn!("WebSocket write failed: {e}");
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        // Reader task: forward text frames to the session
        let (in_tx, in_rx) = mpsc::channel::<String>(capacity);
        let state = self.state.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text.as_str().to_owned()).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Err(e) => {
                        log::warn!("WebSocket read failed: {e}");
                        break;
                    }
                    _ => {}
                }
            }

            // Connection lost
            *state.write().await = ConnectionState::Disconnected;
            log::info!("WebSocket connection closed");
            let _ = event_tx.try_send(SyncEvent::Disconnected);
        });

        let session = EditorSession::new(
            buffer,
            self.config.diff_strategy(),
            self.config.debounce,
            ChannelTransport::new(out_tx),
        )
        .with_events(self.event_tx.clone());
        let (handle, _task) = spawn_session(session, in_rx, capacity);

        Ok(handle)
    }

    /// Get the current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the server URL.
    pub fn server_url(&self) -> &str {
        &self.config.server_url
    }
}
