//! # quill-collab: Shared text buffer synchronization for Quill
//!
//! Keeps a local, user-editable text buffer in step with a canonical copy
//! held by a relay server, over one WebSocket per editor.
//!
//! ## Architecture
//!
//! ```text
//!  keystrokes                                          WebSocket
//!      │                                                   ▲  │
//!      ▼                                                   │  ▼
//! ┌──────────┐  debounce  ┌──────────┐  op   ┌─────────────┐  ┌─────────────┐
//! │ Buffer   │ ─────────► │ Observer │ ────► │ SyncChannel │  │ SyncServer  │
//! │ (local)  │            │ + diff   │       │ (adapter)   │  │ (canonical) │
//! └──────────┘            └──────────┘       └──────┬──────┘  └──────┬──────┘
//!      ▲                        ▲ rebase            │                │
//!      └──── overwrite ─────────┴───────────────────┘         BroadcastGroup
//! ```
//!
//! Consistency is last-writer-wins on whole snapshots. There is no
//! operational transform and no CRDT; a stale buffer heals on the next
//! canonical update from the server.
//!
//! ## Modules
//!
//! - [`buffer`]: Local buffer and snapshots
//! - [`diff`]: Edit inference between two snapshots
//! - [`observer`]: Debounced edit observer
//! - [`channel`]: Sync channel adapter (encode/send, receive/apply)
//! - [`session`]: Single-task editor session driving the three above
//! - [`protocol`]: JSON wire format
//! - [`client`]: WebSocket client
//! - [`document`], [`broadcast`], [`server`]: Relay server

pub mod buffer;
pub mod diff;
pub mod observer;
pub mod channel;
pub mod session;
pub mod protocol;
pub mod client;
pub mod document;
pub mod broadcast;
pub mod server;

// Re-exports for convenience
pub use buffer::{BufferSnapshot, EditCommand, LocalBuffer, TextBuffer};
pub use diff::{compute_operation, DiffStrategy, EditOperation, GapPolicy};
pub use observer::{EditObserver, DEFAULT_DEBOUNCE};
pub use channel::{ChannelTransport, SyncChannel, Transport};
pub use session::{EditorSession, SessionCommand, SessionHandle};
pub use protocol::{
    endpoint_url, CanonicalTextMessage, OperationMessage, ProtocolError, WireFormat,
    WireMessage,
};
pub use client::{ClientConfig, ConnectionState, SyncClient, SyncEvent};
pub use document::{CanonicalDocument, DocumentError};
pub use broadcast::{BroadcastGroup, BroadcastStats};
pub use server::{ServerConfig, ServerStats, SyncServer};
