//! Canonical text held by the relay server.
//!
//! A plain char sequence. Operations are applied at the position the client
//! computed against its own view; no version or identifier is carried, so
//! two operations made against diverging views are applied in arrival order
//! and last writer wins.

use thiserror::Error;

use crate::protocol::OperationMessage;

/// Rejected document edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("invalid position {pos} for insertion (document length {len})")]
    InvalidInsertPosition { pos: usize, len: usize },
    #[error("invalid position {pos} for deletion (document length {len})")]
    InvalidDeletePosition { pos: usize, len: usize },
}

/// The authoritative shared text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalDocument {
    chars: Vec<char>,
}

impl CanonicalDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
        }
    }

    /// Insert `ch` before the char at `pos`. `pos == len` appends.
    pub fn insert(&mut self, pos: usize, ch: char) -> Result<(), DocumentError> {
        if pos > self.chars.len() {
            return Err(DocumentError::InvalidInsertPosition {
                pos,
                len: self.chars.len(),
            });
        }
        self.chars.insert(pos, ch);
        Ok(())
    }

    /// Remove and return the char at `pos`.
    pub fn delete(&mut self, pos: usize) -> Result<char, DocumentError> {
        if pos >= self.chars.len() {
            return Err(DocumentError::InvalidDeletePosition {
                pos,
                len: self.chars.len(),
            });
        }
        Ok(self.chars.remove(pos))
    }

    pub fn replace(&mut self, text: &str) {
        self.chars.clear();
        self.chars.extend(text.chars());
    }

    /// Apply a single wire operation.
    pub fn apply(&mut self, op: &OperationMessage) -> Result<(), DocumentError> {
        match *op {
            OperationMessage::Insert { pos, ch } => self.insert(pos, ch),
            OperationMessage::Delete { pos } => self.delete(pos).map(|_| ()),
        }
    }

    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    /// Length in chars.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}
