//! Debounced watcher over the local buffer.
//!
//! Input notifications never act directly. Each one re-arms a single
//! pending deadline (trailing-edge debounce); only when the deadline passes
//! without further input does the observer diff the buffer against its
//! baseline and produce an operation.
//!
//! The observer owns no clock: callers pass `now` in, and the session loop
//! sleeps until [`EditObserver::deadline`].

use std::time::Duration;
use tokio::time::Instant;

use crate::buffer::BufferSnapshot;
use crate::diff::{compute_operation, DiffStrategy, EditOperation};

/// Default quiet period before an edit is evaluated.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

pub struct EditObserver {
    strategy: DiffStrategy,
    debounce: Duration,
    /// The single pending timer, if armed
    pending: Option<Instant>,
    /// Last state known to match what the server has seen
    baseline: BufferSnapshot,
}

impl EditObserver {
    pub fn new(strategy: DiffStrategy, debounce: Duration, baseline: BufferSnapshot) -> Self {
        Self {
            strategy,
            debounce,
            pending: None,
            baseline,
        }
    }

    /// Raw input notification from the buffer.
    pub fn on_local_input(&mut self, now: Instant) {
        self.reset(now);
    }

    /// Cancel any pending timer and arm a fresh one at `now + debounce`.
    pub fn reset(&mut self, now: Instant) {
        self.pending = Some(now + self.debounce);
    }

    /// Disarm the pending timer. Returns whether one was armed.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.pending.is_some_and(|at| at <= now)
    }

    /// Timer expiry: diff `current` against the baseline, then adopt
    /// `current` as the new baseline.
    pub fn fire(&mut self, current: BufferSnapshot) -> Option<EditOperation> {
        self.pending = None;
        let op = compute_operation(&self.baseline, &current, self.strategy);
        self.baseline = current;
        op
    }

    /// Adopt a remotely written buffer state as the baseline, so the write
    /// is never diffed as a local edit.
    pub fn rebase(&mut self, current: BufferSnapshot) {
        self.baseline = current;
    }

    pub fn baseline(&self) -> &BufferSnapshot {
        &self.baseline
    }

    pub fn strategy(&self) -> DiffStrategy {
        self.strategy
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::GapPolicy;

    fn observer(text: &str, caret: usize) -> EditObserver {
        EditObserver::new(
            DiffStrategy::SingleEdit(GapPolicy::Strict),
            DEFAULT_DEBOUNCE,
            BufferSnapshot::new(text, caret),
        )
    }

    #[test]
    fn test_input_arms_timer() {
        let mut obs = observer("", 0);
        assert!(!obs.is_pending());

        let now = Instant::now();
        obs.on_local_input(now);
        assert_eq!(obs.deadline(), Some(now + DEFAULT_DEBOUNCE));
        assert!(!obs.is_due(now));
        assert!(obs.is_due(now + DEFAULT_DEBOUNCE));
    }

    #[test]
    fn test_each_input_restarts_timer() {
        let mut obs = observer("", 0);
        let start = Instant::now();

        obs.on_local_input(start);
        obs.on_local_input(start + Duration::from_millis(200));
        obs.on_local_input(start + Duration::from_millis(250));

        let expected = start + Duration::from_millis(250) + DEFAULT_DEBOUNCE;
        assert_eq!(obs.deadline(), Some(expected));
        assert!(!obs.is_due(start + Duration::from_millis(500)));
        assert!(obs.is_due(expected));
    }

    #[test]
    fn test_cancel() {
        let mut obs = observer("", 0);
        assert!(!obs.cancel());
        obs.on_local_input(Instant::now());
        assert!(obs.cancel());
        assert!(obs.deadline().is_none());
    }

    #[test]
    fn test_fire_diffs_and_advances_baseline() {
        let mut obs = observer("helo", 3);
        obs.on_local_input(Instant::now());

        let op = obs.fire(BufferSnapshot::new("hello", 4));
        assert_eq!(op, Some(EditOperation::Insert { pos: 3, ch: 'l' }));
        assert!(!obs.is_pending());
        assert_eq!(obs.baseline(), &BufferSnapshot::new("hello", 4));

        let op = obs.fire(BufferSnapshot::new("hell", 4));
        assert_eq!(op, Some(EditOperation::Delete { pos: 4 }));
    }

    #[test]
    fn test_fire_unchanged_emits_nothing() {
        let mut obs = observer("same", 4);
        assert_eq!(obs.fire(BufferSnapshot::new("same", 2)), None);
        assert_eq!(obs.baseline().caret, 2);
    }

    #[test]
    fn test_dropped_gap_still_advances_baseline() {
        let mut obs = observer("ad", 1);
        assert_eq!(obs.fire(BufferSnapshot::new("abcd", 3)), None);
        assert_eq!(obs.baseline().text, "abcd");
    }

    #[test]
    fn test_rebase_suppresses_echo() {
        let mut obs = observer("shared draf", 11);
        obs.rebase(BufferSnapshot::new("shared draft", 11));
        assert_eq!(obs.fire(BufferSnapshot::new("shared draft", 11)), None);
    }

    #[test]
    fn test_accessors() {
        let obs = EditObserver::new(
            DiffStrategy::Snapshot,
            Duration::from_millis(50),
            BufferSnapshot::default(),
        );
        assert_eq!(obs.strategy(), DiffStrategy::Snapshot);
        assert_eq!(obs.debounce(), Duration::from_millis(50));
    }
}
