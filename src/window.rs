//! Sliding rate window primitive.
//!
//! Every detector counts events over a trailing time window. The window is
//! an append-only timestamped list that is compacted by expiry before any
//! threshold decision, so the count always reflects only in-window events
//! no matter how long ago the window was last touched.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

/// A single timestamped entry with detector-specific payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<T> {
    pub at: DateTime<Utc>,
    pub data: T,
}

/// A per-key sliding window of timestamped events.
///
/// Entries are kept in insertion order (monotonic wall clock assumed).
/// Removed entries are never re-inserted: missed events are undercounted,
/// never retroactively corrected.
#[derive(Debug, Clone, Default)]
pub struct RateWindow<T> {
    entries: VecDeque<Entry<T>>,
}

impl<T> RateWindow<T> {
    /// Create an empty window.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Append an event to the window.
    pub fn record(&mut self, at: DateTime<Utc>, data: T) {
        self.entries.push_back(Entry { at, data });
    }

    /// Remove all entries older than `window_secs` relative to `now`,
    /// then return the in-window count.
    pub fn prune_and_count(&mut self, now: DateTime<Utc>, window_secs: u64) -> usize {
        let cutoff = now - Duration::seconds(window_secs as i64);
        while self.entries.front().is_some_and(|e| e.at < cutoff) {
            self.entries.pop_front();
        }
        self.entries.len()
    }

    /// Remove entries for which the predicate returns false.
    pub fn retain(&mut self, f: impl FnMut(&Entry<T>) -> bool) {
        self.entries.retain(f);
    }

    /// Number of entries currently held (without pruning).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the window holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &Entry<T>> {
        self.entries.iter()
    }

    /// The most recent `n` entries, oldest-first.
    pub fn last_n(&self, n: usize) -> Vec<&Entry<T>> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::window::RateWindow;

    #[test]
    fn record_and_count_within_window() {
        let now = Utc::now();
        let mut window = RateWindow::new();

        window.record(now - Duration::seconds(20), 1u64);
        window.record(now - Duration::seconds(10), 2u64);
        window.record(now, 3u64);

        assert_eq!(window.prune_and_count(now, 30), 3);
    }

    #[test]
    fn prune_removes_expired_entries() {
        let now = Utc::now();
        let mut window = RateWindow::new();

        window.record(now - Duration::seconds(120), 1u64);
        window.record(now - Duration::seconds(5), 2u64);

        assert_eq!(window.prune_and_count(now, 30), 1);
        assert_eq!(window.iter().next().map(|e| e.data), Some(2));
    }

    #[test]
    fn prune_is_idempotent_with_same_clock() {
        let now = Utc::now();
        let mut window = RateWindow::new();

        for i in 0..5 {
            window.record(now - Duration::seconds(i * 10), i);
        }

        let first = window.prune_and_count(now, 25);
        let second = window.prune_and_count(now, 25);
        assert_eq!(first, second);
    }

    #[test]
    fn full_decay_empties_window() {
        let now = Utc::now();
        let mut window = RateWindow::new();

        window.record(now - Duration::seconds(100), 1u64);
        window.record(now - Duration::seconds(90), 2u64);
        window.record(now - Duration::seconds(80), 3u64);

        assert_eq!(window.prune_and_count(now, 60), 0);
        assert!(window.is_empty());
    }

    #[test]
    fn entry_exactly_at_cutoff_is_kept() {
        let now = Utc::now();
        let mut window = RateWindow::new();

        window.record(now - Duration::seconds(30), 1u64);
        assert_eq!(window.prune_and_count(now, 30), 1);
    }

    #[test]
    fn retain_removes_matching_entries() {
        let now = Utc::now();
        let mut window = RateWindow::new();

        window.record(now, 1u64);
        window.record(now, 2u64);
        window.record(now, 1u64);

        window.retain(|e| e.data != 1);
        assert_eq!(window.len(), 1);
        assert_eq!(window.iter().next().map(|e| e.data), Some(2));
    }

    #[test]
    fn last_n_returns_most_recent_in_order() {
        let now = Utc::now();
        let mut window = RateWindow::new();

        for i in 0..5u64 {
            window.record(now + Duration::seconds(i as i64), i);
        }

        let last = window.last_n(3);
        let values: Vec<u64> = last.iter().map(|e| e.data).collect();
        assert_eq!(values, vec![2, 3, 4]);
    }

    #[test]
    fn last_n_with_fewer_entries_returns_all() {
        let now = Utc::now();
        let mut window = RateWindow::new();
        window.record(now, 7u64);

        assert_eq!(window.last_n(3).len(), 1);
    }
}
