//! The fetch primitive the engine is built on.
//!
//! This module provides:
//! - [`Fetch`] — Abstract bounded read of one source's envelopes
//! - [`MemoryFetcher`] — In-memory implementation with failure injection

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::FetchError;
use crate::types::{Envelope, QueryFilter, TimeRange};

/// A bounded read of one source's envelopes.
///
/// Implementors must return envelopes with timestamps inside `window`,
/// ordered by timestamp ascending, and at most `filter.line_limit` of them.
pub trait Fetch: Send + Sync {
    /// Fetches one batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote read fails.
    fn fetch(
        &self,
        source_id: &str,
        window: TimeRange,
        filter: &QueryFilter,
    ) -> impl Future<Output = Result<Vec<Envelope>, FetchError>> + Send;
}

impl<F: Fetch + ?Sized> Fetch for Arc<F> {
    fn fetch(
        &self,
        source_id: &str,
        window: TimeRange,
        filter: &QueryFilter,
    ) -> impl Future<Output = Result<Vec<Envelope>, FetchError>> + Send {
        (**self).fetch(source_id, window, filter)
    }
}

/// In-memory fetch primitive.
///
/// Applies the envelope type and name filters the way the remote service
/// does, then truncates to the line limit.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    /// Envelopes per source, kept sorted by timestamp
    sources: RwLock<HashMap<String, Vec<Envelope>>>,
    /// Number of upcoming fetches that fail
    pending_failures: AtomicU32,
    /// Fetches served, including failed ones
    fetches: AtomicU64,
}

impl MemoryFetcher {
    /// Creates an empty fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fetcher pre-loaded with envelopes.
    #[must_use]
    pub fn with_envelopes(envelopes: impl IntoIterator<Item = Envelope>) -> Self {
        let fetcher = Self::new();
        for envelope in envelopes {
            fetcher.push(envelope);
        }
        fetcher
    }

    /// Adds an envelope, keeping arrival order among equal timestamps.
    pub fn push(&self, envelope: Envelope) {
        let mut sources = self.sources.write();
        let batch = sources.entry(envelope.source_id.clone()).or_default();
        let at = batch.partition_point(|e| e.timestamp <= envelope.timestamp);
        batch.insert(at, envelope);
    }

    /// Makes the next `count` fetches fail with a transport error.
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::Release);
    }

    /// Returns the number of fetches served so far.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Acquire)
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    fn read(&self, source_id: &str, window: TimeRange, filter: &QueryFilter) -> Vec<Envelope> {
        let sources = self.sources.read();
        let Some(batch) = sources.get(source_id) else {
            return Vec::new();
        };

        batch
            .iter()
            .filter(|e| window.contains(e.timestamp))
            .filter(|e| filter.matches(e))
            .take(filter.line_limit)
            .cloned()
            .collect()
    }
}

impl Fetch for MemoryFetcher {
    async fn fetch(
        &self,
        source_id: &str,
        window: TimeRange,
        filter: &QueryFilter,
    ) -> Result<Vec<Envelope>, FetchError> {
        self.fetches.fetch_add(1, Ordering::AcqRel);

        if self.take_failure() {
            return Err(FetchError::Transport("injected failure".to_string()));
        }

        Ok(self.read(source_id, window, filter))
    }
}
