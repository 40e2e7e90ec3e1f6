//! Local editable buffer and the snapshots taken of it.
//!
//! Every position in this crate (caret, insert/delete offsets) counts
//! Unicode scalar values, never bytes. [`byte_offset`] converts between the
//! two when a `String` has to be mutated.

use serde::{Deserialize, Serialize};

/// Immutable capture of the buffer at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferSnapshot {
    pub text: String,
    /// Caret offset in chars
    pub caret: usize,
}

impl BufferSnapshot {
    pub fn new(text: impl Into<String>, caret: usize) -> Self {
        Self {
            text: text.into(),
            caret,
        }
    }

    /// Text length in chars.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A local edit reported by the editing surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditCommand {
    /// Type one character at the caret
    Insert(char),
    /// Paste or autocomplete a run of characters at the caret
    InsertStr(String),
    /// Remove the character before the caret
    Backspace,
    /// Remove the character after the caret
    DeleteForward,
    /// Move the caret (clamped to the text length)
    MoveCaret(usize),
    /// Replace everything, e.g. select-all and retype
    SetText { text: String, caret: usize },
}

/// The editable buffer a session keeps in sync.
///
/// Implemented by whatever owns the text on screen. [`LocalBuffer`] is the
/// in-memory implementation used by the client session and the tests.
pub trait TextBuffer {
    fn text(&self) -> &str;

    fn caret(&self) -> usize;

    /// Apply a local edit and move the caret accordingly.
    fn apply_edit(&mut self, edit: &EditCommand);

    /// Overwrite the content in place with a remote text.
    ///
    /// The caret keeps its offset, clamped to the new length.
    fn overwrite(&mut self, text: &str);

    fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot::new(self.text(), self.caret())
    }
}

/// In-memory text buffer with a caret.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalBuffer {
    text: String,
    caret: usize,
}

impl LocalBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer with the caret placed at the end of `text`.
    pub fn with_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let caret = text.chars().count();
        Self { text, caret }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    fn insert_at_caret(&mut self, s: &str) {
        let at = byte_offset(&self.text, self.caret);
        self.text.insert_str(at, s);
        self.caret += s.chars().count();
    }

    fn remove_char(&mut self, pos: usize) -> bool {
        if pos >= self.char_len() {
            return false;
        }
        let at = byte_offset(&self.text, pos);
        self.text.remove(at);
        true
    }
}

impl TextBuffer for LocalBuffer {
    fn text(&self) -> &str {
        &self.text
    }

    fn caret(&self) -> usize {
        self.caret
    }

    fn apply_edit(&mut self, edit: &EditCommand) {
        match edit {
            EditCommand::Insert(ch) => {
                let mut tmp = [0u8; 4];
                self.insert_at_caret(ch.encode_utf8(&mut tmp));
            }
            EditCommand::InsertStr(s) => self.insert_at_caret(s),
            EditCommand::Backspace => {
                if self.caret > 0 && self.remove_char(self.caret - 1) {
                    self.caret -= 1;
                }
            }
            EditCommand::DeleteForward => {
                self.remove_char(self.caret);
            }
            EditCommand::MoveCaret(pos) => {
                self.caret = (*pos).min(self.char_len());
            }
            EditCommand::SetText { text, caret } => {
                self.text = text.clone();
                self.caret = (*caret).min(self.char_len());
            }
        }
    }

    fn overwrite(&mut self, text: &str) {
        if self.text != text {
            self.text.clear();
            self.text.push_str(text);
        }
        self.caret = self.caret.min(self.char_len());
    }
}

/// Byte offset of the char at `char_idx`, or `text.len()` past the end.
pub(crate) fn byte_offset(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map_or(text.len(), |(at, _)| at)
}
