//! Bounded pseudo-likelihood history.
//!
//! The windowed convergence policy compares the oldest W observations
//! against the newest W, so the history never needs more than 2×W entries.
//! Older values are discarded first-in-first-out once that bound is hit.

use std::collections::VecDeque;

/// FIFO buffer of negative pseudo-log-likelihood observations with
/// capacity 2×W.
#[derive(Debug, Clone)]
pub struct PseudoLikelihoodHistory {
    values: VecDeque<f64>,
    window: usize,
}

impl PseudoLikelihoodHistory {
    /// Creates a history sized for the given window length W.
    ///
    /// The buffer holds at most `2 * window` values.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(2 * window),
            window,
        }
    }

    /// Appends an observation, evicting the oldest first when at capacity.
    pub fn record(&mut self, value: f64) {
        if self.values.len() == self.capacity() {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// The window length W this history was sized for.
    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    /// Maximum number of retained observations (2×W).
    #[must_use]
    pub fn capacity(&self) -> usize {
        2 * self.window
    }

    /// Number of currently retained observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no observations have been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the buffer holds its full 2×W observations.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity()
    }

    /// The most recently recorded observation.
    #[must_use]
    pub fn latest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    /// Sums of the oldest-W and newest-W observations.
    ///
    /// Returns `None` until the buffer is full; a partial buffer cannot be
    /// split into two disjoint W-length windows.
    #[must_use]
    pub fn window_sums(&self) -> Option<(f64, f64)> {
        if !self.is_full() {
            return None;
        }
        let old = self.values.iter().take(self.window).sum();
        let new = self.values.iter().skip(self.window).sum();
        Some((old, new))
    }

    /// Iterates over retained observations, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_recording() {
        let mut history = PseudoLikelihoodHistory::new(3);
        history.record(1.0);
        history.record(2.0);

        assert_eq!(history.len(), 2);
        assert_eq!(history.latest(), Some(2.0));
        assert!(!history.is_full());
    }

    #[test]
    fn test_capacity_is_twice_window() {
        let history = PseudoLikelihoodHistory::new(5);
        assert_eq!(history.capacity(), 10);
        assert_eq!(history.window(), 5);
    }

    #[test]
    fn test_fifo_eviction_at_capacity() {
        let mut history = PseudoLikelihoodHistory::new(2);

        for i in 0..7 {
            history.record(f64::from(i));
        }

        // Capacity is 4; the first three values were evicted in order.
        assert_eq!(history.len(), 4);
        let retained: Vec<f64> = history.iter().collect();
        assert_eq!(retained, vec![3.0, 4.0, 5.0, 6.0]);
        assert_eq!(history.latest(), Some(6.0));
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        let mut history = PseudoLikelihoodHistory::new(4);
        for i in 0..100 {
            history.record(f64::from(i));
            assert!(
                history.len() <= history.capacity(),
                "history exceeded its bound after {} records",
                i + 1
            );
        }
    }

    #[test]
    fn test_window_sums_require_full_buffer() {
        let mut history = PseudoLikelihoodHistory::new(2);
        history.record(1.0);
        history.record(2.0);
        history.record(3.0);
        assert_eq!(history.window_sums(), None);

        history.record(4.0);
        assert_eq!(history.window_sums(), Some((3.0, 7.0)));
    }

    #[test]
    fn test_window_sums_track_eviction() {
        let mut history = PseudoLikelihoodHistory::new(2);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            history.record(v);
        }

        // Retained: [2, 3, 4, 5]; old window 2+3, new window 4+5.
        assert_eq!(history.window_sums(), Some((5.0, 9.0)));
    }
}
