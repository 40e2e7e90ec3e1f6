//! Sync channel adapter: the seam between the edit pipeline and the wire.
//!
//! Outgoing, an [`EditOperation`] is encoded and handed to a [`Transport`]
//! without waiting for anything; failures are logged and the frame dropped.
//! Incoming, a frame is decoded and written into the buffer, and the
//! observer's baseline is moved to the written state in the same step.
//! Without that rebase the next timer would diff the remote write as a local
//! edit and echo it back, and two open editors would ping-pong forever.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::buffer::TextBuffer;
use crate::diff::EditOperation;
use crate::observer::EditObserver;
use crate::protocol::{CanonicalTextMessage, ProtocolError, WireMessage};

/// Outgoing half of a connection.
///
/// `send` must not block: the caller is the single task driving the editor.
pub trait Transport {
    fn send(&mut self, frame: String) -> Result<(), ProtocolError>;
}

/// Transport feeding a writer task through a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<String>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, frame: String) -> Result<(), ProtocolError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => ProtocolError::ChannelFull,
            TrySendError::Closed(_) => ProtocolError::ConnectionClosed,
        })
    }
}

pub struct SyncChannel<T> {
    transport: T,
    sent: u64,
    dropped: u64,
    ignored: u64,
}

impl<T: Transport> SyncChannel<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            sent: 0,
            dropped: 0,
            ignored: 0,
        }
    }

    /// Encode and transmit an operation. Fire-and-forget: returns whether
    /// the frame was handed to the transport.
    pub fn send(&mut self, op: &EditOperation) -> bool {
        let frame = match WireMessage::from(op).encode() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Dropping unencodable operation: {e}");
                self.dropped += 1;
                return false;
            }
        };

        match self.transport.send(frame) {
            Ok(()) => {
                log::debug!("Sent {op:?}");
                self.sent += 1;
                true
            }
            Err(e) => {
                log::warn!("Dropping outgoing operation: {e}");
                self.dropped += 1;
                false
            }
        }
    }

    /// Handle one inbound frame.
    ///
    /// Canonical text overwrites the buffer. Operation frames are applied to
    /// the current buffer text. Either way the observer is rebased onto the
    /// result. Malformed frames and out-of-range operations are ignored.
    /// Returns whether the buffer was written.
    pub fn on_message<B: TextBuffer>(
        &mut self,
        raw: &str,
        buffer: &mut B,
        observer: &mut EditObserver,
    ) -> bool {
        let msg = match WireMessage::decode(raw) {
            Ok(msg) => msg,
            Err(e) => {
                log::debug!("Ignoring malformed frame: {e}");
                self.ignored += 1;
                return false;
            }
        };

        let text = match msg {
            WireMessage::Text(CanonicalTextMessage { text }) => text,
            WireMessage::Operation(op) => {
                let op = EditOperation::from(op);
                match op.apply_to(buffer.text()) {
                    Some(text) => text,
                    None => {
                        log::debug!("Ignoring out-of-range remote {op:?}");
                        self.ignored += 1;
                        return false;
                    }
                }
            }
        };

        buffer.overwrite(&text);
        observer.rebase(buffer.snapshot());
        true
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Frames handed to the transport.
    pub fn sent_count(&self) -> u64 {
        self.sent
    }

    /// Outgoing frames lost to encode or transport failures.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    /// Inbound frames that did not touch the buffer.
    pub fn ignored_count(&self) -> u64 {
        self.ignored
    }
}

/// Recording transport for tests.
#[cfg(test)]
impl Transport for Vec<String> {
    fn send(&mut self, frame: String) -> Result<(), ProtocolError> {
        self.push(frame);
        Ok(())
    }
}
