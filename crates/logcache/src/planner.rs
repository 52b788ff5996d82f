//! Window planning for paginated fetches.
//!
//! The planner cannot partition a range up front because the density of
//! envelopes over time is unknown. It hands out one window at a time and
//! derives the next one from the batch the previous window produced.

use crate::types::{Envelope, TimeRange};

/// Produces the sequence of windows that covers a range.
#[derive(Debug, Clone)]
pub struct WindowPlanner {
    next: Option<TimeRange>,
    line_limit: usize,
    windows: usize,
}

impl WindowPlanner {
    /// Creates a planner over `range` for a fetch that returns at most
    /// `line_limit` envelopes.
    #[must_use]
    pub const fn new(range: TimeRange, line_limit: usize) -> Self {
        let next = if range.is_empty() { None } else { Some(range) };
        Self {
            next,
            line_limit,
            windows: 0,
        }
    }

    /// Returns the next window to fetch, or `None` once the range is exhausted.
    pub fn next_window(&mut self) -> Option<TimeRange> {
        let window = self.next?;
        self.windows += 1;
        Some(window)
    }

    /// Records the batch returned for the current window.
    ///
    /// A full batch moves the window start to one nanosecond past the last
    /// envelope; anything shorter exhausts the range.
    pub fn observe(&mut self, batch: &[Envelope]) {
        let Some(current) = self.next else {
            return;
        };

        let last = batch.last().map(|e| e.timestamp);
        self.next = match last {
            Some(ts) if batch.len() >= self.line_limit => ts
                .checked_add(1)
                .map(|start| TimeRange::new(start.max(current.start), current.end))
                .filter(|w| !w.is_empty()),
            _ => None,
        };
    }

    /// Returns true once no further windows will be produced.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.next.is_none()
    }

    /// Returns how many windows have been handed out.
    #[must_use]
    pub const fn windows(&self) -> usize {
        self.windows
    }
}
