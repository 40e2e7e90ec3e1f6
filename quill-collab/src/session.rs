//! Editor session: one task owning the buffer, observer and channel.
//!
//! ```text
//!   SessionHandle ──commands──┐
//!                             ▼
//!   inbound frames ──────► select! ──► EditorSession ──► Transport
//!                             ▲
//!   debounce deadline ────────┘
//! ```
//!
//! All three event sources are handled in the same task, one at a time, so
//! nothing in here needs a lock. Inbound frames are applied in the order
//! the channel yields them.

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::buffer::{BufferSnapshot, EditCommand, TextBuffer};
use crate::channel::{SyncChannel, Transport};
use crate::client::SyncEvent;
use crate::diff::{DiffStrategy, EditOperation};
use crate::observer::EditObserver;
use crate::protocol::ProtocolError;

/// Requests from the application to a running session.
#[derive(Debug)]
pub enum SessionCommand {
    Edit(EditCommand),
    Snapshot(oneshot::Sender<BufferSnapshot>),
    Close,
}

pub struct EditorSession<B, T> {
    buffer: B,
    observer: EditObserver,
    channel: SyncChannel<T>,
    events: Option<mpsc::Sender<SyncEvent>>,
}

impl<B: TextBuffer, T: Transport> EditorSession<B, T> {
    pub fn new(buffer: B, strategy: DiffStrategy, debounce: Duration, transport: T) -> Self {
        let observer = EditObserver::new(strategy, debounce, buffer.snapshot());
        Self {
            buffer,
            observer,
            channel: SyncChannel::new(transport),
            events: None,
        }
    }

    /// Report sends and remote writes on `events`.
    pub fn with_events(mut self, events: mpsc::Sender<SyncEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Apply a local edit and notify the observer.
    pub fn local_edit(&mut self, edit: &EditCommand) {
        self.buffer.apply_edit(edit);
        self.on_input(Instant::now());
    }

    /// Raw input notification.
    pub fn on_input(&mut self, now: Instant) {
        self.observer.on_local_input(now);
    }

    /// Debounce deadline reached: diff, send, advance the baseline.
    pub fn on_timer(&mut self) -> Option<EditOperation> {
        let op = self.observer.fire(self.buffer.snapshot())?;
        if self.channel.send(&op) {
            self.emit(SyncEvent::OperationSent(op.clone()));
        }
        Some(op)
    }

    /// Inbound frame from the server.
    pub fn on_message(&mut self, raw: &str) -> bool {
        let applied = self
            .channel
            .on_message(raw, &mut self.buffer, &mut self.observer);
        if applied {
            let text = self.buffer.text().to_string();
            self.emit(SyncEvent::RemoteApplied { text });
        }
        applied
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.observer.deadline()
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn observer(&self) -> &EditObserver {
        &self.observer
    }

    pub fn channel(&self) -> &SyncChannel<T> {
        &self.channel
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(ref tx) = self.events {
            // Slow consumers lose events, never block the editor.
            let _ = tx.try_send(event);
        }
    }
}

/// Drive a session until [`SessionCommand::Close`] or every handle is dropped.
///
/// When `inbound` closes the session keeps running offline; its later sends
/// are dropped by the transport. Returns the session for inspection.
pub async fn run_session<B, T>(
    mut session: EditorSession<B, T>,
    mut commands: mpsc::Receiver<SessionCommand>,
    mut inbound: mpsc::Receiver<String>,
) -> EditorSession<B, T>
where
    B: TextBuffer,
    T: Transport,
{
    let mut inbound_open = true;

    loop {
        let deadline = session.deadline();
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(SessionCommand::Edit(edit)) => session.local_edit(&edit),
                Some(SessionCommand::Snapshot(reply)) => {
                    let _ = reply.send(session.buffer.snapshot());
                }
                Some(SessionCommand::Close) | None => break,
            },

            raw = inbound.recv(), if inbound_open => match raw {
                Some(raw) => {
                    session.on_message(&raw);
                }
                None => {
                    log::debug!("Inbound stream ended; editing continues offline");
                    inbound_open = false;
                }
            },

            _ = wait_until(deadline) => {
                session.on_timer();
            }
        }
    }

    session
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        // No timer armed
        None => std::future::pending().await,
    }
}

/// Spawn [`run_session`] on the runtime and return a handle to it.
pub fn spawn_session<B, T>(
    session: EditorSession<B, T>,
    inbound: mpsc::Receiver<String>,
    command_capacity: usize,
) -> (SessionHandle, JoinHandle<EditorSession<B, T>>)
where
    B: TextBuffer + Send + 'static,
    T: Transport + Send + 'static,
{
    let (tx, rx) = mpsc::channel(command_capacity);
    let task = tokio::spawn(run_session(session, rx, inbound));
    (SessionHandle { commands: tx }, task)
}

/// Cloneable handle the application uses to talk to its session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Deliver a local edit.
    pub async fn edit(&self, edit: EditCommand) -> Result<(), ProtocolError> {
        self.commands
            .send(SessionCommand::Edit(edit))
            .await
            .map_err(|_| ProtocolError::SessionClosed)
    }

    /// Current buffer state.
    pub async fn snapshot(&self) -> Result<BufferSnapshot, ProtocolError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Snapshot(tx))
            .await
            .map_err(|_| ProtocolError::SessionClosed)?;
        rx.await.map_err(|_| ProtocolError::SessionClosed)
    }

    pub async fn close(&self) -> Result<(), ProtocolError> {
        self.commands
            .send(SessionCommand::Close)
            .await
            .map_err(|_| ProtocolError::SessionClosed)
    }
}
