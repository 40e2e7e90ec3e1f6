//! Edit inference from two buffer snapshots.
//!
//! The observer only ever sees the buffer before and after a quiet period,
//! so the edit that happened in between has to be guessed. Two strategies:
//!
//! - [`DiffStrategy::Snapshot`] ships the whole text whenever it changed.
//!   Always correct, costs the most bandwidth.
//! - [`DiffStrategy::SingleEdit`] assumes exactly one edit anchored at the
//!   caret and compares lengths:
//!
//! ```text
//!   grew by 1     →  Insert(caret - 1, inserted char)
//!   grew by k > 1 →  gap (paste, autocomplete)
//!   shrank        →  Delete(caret)
//!   same length   →  gap (replace of equal length)
//! ```
//!
//! The caret is the one at evaluation time. A burst of typing with caret
//! movement inside one debounce window can therefore infer the wrong
//! position. Under [`GapPolicy::Strict`] that wrong operation is sent as is;
//! [`GapPolicy::SnapshotFallback`] verifies the inferred operation against
//! the snapshots and ships the full text instead when it does not
//! reproduce the current text.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::buffer::BufferSnapshot;
use crate::document::CanonicalDocument;

/// One edit to transmit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOperation {
    FullReplace { text: String },
    Insert { pos: usize, ch: char },
    Delete { pos: usize },
}

impl EditOperation {
    /// Apply the operation to `text`, or `None` when the position is out of range.
    pub fn apply_to(&self, text: &str) -> Option<String> {
        match self {
            Self::FullReplace { text } => Some(text.clone()),
            Self::Insert { pos, ch } => {
                let mut doc = CanonicalDocument::from_text(text);
                doc.insert(*pos, *ch).ok()?;
                Some(doc.text())
            }
            Self::Delete { pos } => {
                let mut doc = CanonicalDocument::from_text(text);
                doc.delete(*pos).ok()?;
                Some(doc.text())
            }
        }
    }
}

/// How inference gaps are resolved under [`DiffStrategy::SingleEdit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Drop what cannot be expressed as one insert or delete.
    Strict,
    /// Ship `FullReplace` for anything single-edit inference cannot express.
    #[default]
    SnapshotFallback,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStrategy {
    #[default]
    Snapshot,
    SingleEdit(GapPolicy),
}

/// Infer the operation that turned `prev` into `curr`.
///
/// Returns `None` when the text is unchanged, and under
/// [`GapPolicy::Strict`] when the change is not a single-char insert or a
/// shrink.
pub fn compute_operation(
    prev: &BufferSnapshot,
    curr: &BufferSnapshot,
    strategy: DiffStrategy,
) -> Option<EditOperation> {
    if prev.text == curr.text {
        return None;
    }
    match strategy {
        DiffStrategy::Snapshot => Some(full_replace(curr)),
        DiffStrategy::SingleEdit(policy) => infer_single_edit(prev, curr, policy),
    }
}

fn full_replace(curr: &BufferSnapshot) -> EditOperation {
    EditOperation::FullReplace {
        text: curr.text.clone(),
    }
}

fn infer_single_edit(
    prev: &BufferSnapshot,
    curr: &BufferSnapshot,
    policy: GapPolicy,
) -> Option<EditOperation> {
    let gap = || match policy {
        GapPolicy::Strict => None,
        GapPolicy::SnapshotFallback => Some(full_replace(curr)),
    };

    let prev_len = prev.char_len();
    let curr_len = curr.char_len();

    let op = match curr_len.cmp(&prev_len) {
        Ordering::Greater => {
            let grown = curr_len - prev_len;
            let Some(pos) = curr.caret.checked_sub(grown) else {
                return gap();
            };
            let mut inserted = curr.text.chars().skip(pos).take(grown);
            match (inserted.next(), inserted.next()) {
                (Some(ch), None) if grown == 1 => EditOperation::Insert { pos, ch },
                _ => return gap(),
            }
        }
        Ordering::Less => {
            if policy == GapPolicy::SnapshotFallback && prev_len - curr_len > 1 {
                return gap();
            }
            EditOperation::Delete { pos: curr.caret }
        }
        Ordering::Equal => return gap(),
    };

    if policy == GapPolicy::SnapshotFallback
        && op.apply_to(&prev.text).as_deref() != Some(curr.text.as_str())
    {
        return gap();
    }
    Some(op)
}
