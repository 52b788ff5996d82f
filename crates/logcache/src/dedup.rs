//! At-most-once emission across overlapping fetch windows.

use std::collections::HashSet;

use crate::types::{Envelope, EnvelopeIdentity};

/// Tracks the newest timestamp seen and every identity observed at it.
///
/// Envelopes older than the newest timestamp are rejected outright, so the
/// buffer only has to remember the ties at the boundary.
#[derive(Debug, Default, Clone)]
pub struct DedupBuffer {
    last_seen: Option<i64>,
    ties: HashSet<EnvelopeIdentity>,
}

impl DedupBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the envelope has not been seen and should be emitted.
    pub fn admit(&mut self, envelope: &Envelope) -> bool {
        match self.last_seen {
            Some(last) if envelope.timestamp < last => false,
            Some(last) if envelope.timestamp == last => self.ties.insert(envelope.identity()),
            _ => {
                self.last_seen = Some(envelope.timestamp);
                self.ties.clear();
                self.ties.insert(envelope.identity());
                true
            }
        }
    }

    /// Returns the newest timestamp admitted so far.
    #[must_use]
    pub const fn last_seen(&self) -> Option<i64> {
        self.last_seen
    }

    /// Returns how many identities share the newest timestamp.
    #[must_use]
    pub fn tie_count(&self) -> usize {
        self.ties.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn admits_first_envelope() {
        let mut buffer = DedupBuffer::new();
        assert!(buffer.admit(&Envelope::log("a", 10, "x")));
        assert_eq!(buffer.last_seen(), Some(10));
        assert_eq!(buffer.tie_count(), 1);
    }

    #[test]
    fn rejects_older_envelopes() {
        let mut buffer = DedupBuffer::new();
        assert!(buffer.admit(&Envelope::log("a", 20, "x")));
        assert!(!buffer.admit(&Envelope::log("a", 10, "y")));
    }

    #[test]
    fn admits_distinct_ties_once() {
        let mut buffer = DedupBuffer::new();
        let first = Envelope::log("a", 20, "first");
        let second = Envelope::log("a", 20, "second");

        assert!(buffer.admit(&first));
        assert!(buffer.admit(&second));
        assert!(!buffer.admit(&first));
        assert!(!buffer.admit(&second));
        assert_eq!(buffer.tie_count(), 2);
    }

    #[test]
    fn newer_timestamp_resets_ties() {
        let mut buffer = DedupBuffer::new();
        assert!(buffer.admit(&Envelope::log("a", 20, "first")));
        assert!(buffer.admit(&Envelope::log("a", 20, "second")));
        assert!(buffer.admit(&Envelope::log("a", 30, "third")));
        assert_eq!(buffer.tie_count(), 1);
        assert_eq!(buffer.last_seen(), Some(30));
    }

    #[test]
    fn tie_set_populated_from_first_batch_survives_refetch() {
        // Page one ends at t=20 with one of two siblings; a later window that
        // still starts at 20 returns both.
        let mut buffer = DedupBuffer::new();
        let page_one = [Envelope::log("a", 10, "a"), Envelope::log("a", 20, "b")];
        let page_two = [Envelope::log("a", 20, "b"), Envelope::log("a", 20, "c")];

        let emitted: Vec<_> = page_one
            .iter()
            .chain(page_two.iter())
            .filter(|e| buffer.admit(e))
            .map(|e| e.timestamp)
            .collect();
        assert_eq!(emitted, vec![10, 20, 20]);
    }

    proptest! {
        #[test]
        fn never_emits_an_identity_twice(
            picks in prop::collection::vec((0i64..20, 0u8..3), 0..200),
        ) {
            // Sorted with repeats, as overlapping windows would deliver them.
            let mut picks = picks;
            picks.sort_unstable();
            let mut buffer = DedupBuffer::new();
            let mut seen = HashSet::new();
            for (ts, body) in picks {
                let envelope = Envelope::log("a", ts, body.to_string());
                if buffer.admit(&envelope) {
                    prop_assert!(seen.insert(envelope.identity()));
                }
            }
        }

        #[test]
        fn admits_every_distinct_identity_in_order(
            set in prop::collection::btree_set((0i64..50, 0u8..4), 0..100),
        ) {
            let mut buffer = DedupBuffer::new();
            let mut admitted = 0usize;
            // Feed every envelope twice in a row, as two overlapping windows would.
            for (ts, body) in &set {
                let envelope = Envelope::log("a", *ts, body.to_string());
                if buffer.admit(&envelope) {
                    admitted += 1;
                }
                prop_assert!(!buffer.admit(&envelope));
            }
            prop_assert_eq!(admitted, set.len());
        }
    }
}
