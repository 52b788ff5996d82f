//! Windowed tailing of one source.
//!
//! This module provides:
//! - [`TailStreamer`] — One-shot and follow-mode retrieval for a source
//! - [`EnvelopeSink`] — Where surviving envelopes are written
//! - [`SourceStreamer`] — The streamer as a collaborator of the query bridge
//!
//! A one-shot tail pages through the range with a [`WindowPlanner`] and stops
//! once the range is exhausted or `line_limit` envelopes have been emitted.
//! Follow mode drains the range without a cap and then polls past the newest
//! timestamp until cancelled.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TailConfig;
use crate::dedup::DedupBuffer;
use crate::error::{EngineError, FetchError, Result};
use crate::fetch::Fetch;
use crate::planner::WindowPlanner;
use crate::types::{Envelope, QueryFilter, TimeRange};

/// Destination for envelopes that survive filtering and deduplication.
pub trait EnvelopeSink {
    /// Writes one envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope cannot be written.
    fn emit(&mut self, envelope: &Envelope) -> Result<()>;
}

impl EnvelopeSink for Vec<Envelope> {
    fn emit(&mut self, envelope: &Envelope) -> Result<()> {
        self.push(envelope.clone());
        Ok(())
    }
}

impl<S: EnvelopeSink + ?Sized> EnvelopeSink for &mut S {
    fn emit(&mut self, envelope: &Envelope) -> Result<()> {
        (**self).emit(envelope)
    }
}

/// Counters describing one finished tail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Envelopes written to the sink
    pub emitted: usize,
    /// Fetch attempts, including failed ones
    pub fetches: usize,
    /// Distinct windows requested
    pub windows: usize,
}

/// Per-invocation cursor: dedup state plus the emitted count.
#[derive(Debug, Default)]
pub struct StreamCursor {
    dedup: DedupBuffer,
    emitted: usize,
}

impl StreamCursor {
    /// Returns the newest timestamp emitted so far.
    #[must_use]
    pub const fn last_seen(&self) -> Option<i64> {
        self.dedup.last_seen()
    }
}

/// Anything that can stream one source into a sink.
///
/// [`TailStreamer`] is the production implementation; the query bridge only
/// depends on this trait.
pub trait SourceStreamer: Send + Sync {
    /// Streams `source_id` over `range` into `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is invalid, a fetch fails, the sink
    /// fails, or the operation is cancelled.
    fn stream<K: EnvelopeSink + Send>(
        &self,
        source_id: &str,
        range: TimeRange,
        filter: &QueryFilter,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<StreamSummary>> + Send;
}

/// Mutable state of one tail invocation.
struct Invocation<'a> {
    source_id: &'a str,
    filter: &'a QueryFilter,
    cap: Option<usize>,
    cursor: StreamCursor,
    summary: StreamSummary,
    failures: u32,
}

impl Invocation<'_> {
    fn cap_reached(&self) -> bool {
        self.cap.is_some_and(|cap| self.cursor.emitted >= cap)
    }

    /// Filters, deduplicates and writes a batch. Returns how many were written.
    fn emit_batch<K: EnvelopeSink>(&mut self, batch: &[Envelope], sink: &mut K) -> Result<usize> {
        let mut written = 0;
        for envelope in batch {
            if self.cap_reached() {
                break;
            }
            if !self.filter.matches(envelope) || !self.cursor.dedup.admit(envelope) {
                continue;
            }
            sink.emit(envelope)?;
            self.cursor.emitted += 1;
            written += 1;
        }
        self.summary.emitted = self.cursor.emitted;
        Ok(written)
    }
}

/// Retrieves envelopes for one source, once or continuously.
#[derive(Debug)]
pub struct TailStreamer<F> {
    fetcher: F,
    config: TailConfig,
}

impl<F: Fetch> TailStreamer<F> {
    /// Creates a streamer over the given fetch primitive.
    #[must_use]
    pub const fn new(fetcher: F, config: TailConfig) -> Self {
        Self { fetcher, config }
    }

    /// Returns the underlying fetch primitive.
    #[must_use]
    pub const fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Streams `source_id` over `range` into `sink`.
    ///
    /// Without `filter.follow` this returns once the range is exhausted or
    /// `filter.line_limit` envelopes were written (the cap is lifted by
    /// `filter.exhaustive`). With `filter.follow` it only returns on error or
    /// cancellation.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidInput`] for a conflicting filter, before any fetch
    /// - [`EngineError::Fetch`] for a failed fetch in one-shot mode
    /// - [`EngineError::RetriesExhausted`] when follow mode runs out of retries
    /// - [`EngineError::Cancelled`] when `cancel` fires
    pub async fn stream<K: EnvelopeSink + Send>(
        &self,
        source_id: &str,
        range: TimeRange,
        filter: &QueryFilter,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> Result<StreamSummary> {
        filter.validate()?;

        let cap = (!filter.follow && !filter.exhaustive).then_some(filter.line_limit);
        let mut run = Invocation {
            source_id,
            filter,
            cap,
            cursor: StreamCursor::default(),
            summary: StreamSummary::default(),
            failures: 0,
        };

        self.drain(&mut run, range, sink, cancel).await?;

        if !filter.follow {
            info!(
                source_id,
                emitted = run.summary.emitted,
                fetches = run.summary.fetches,
                "tail complete"
            );
            return Ok(run.summary);
        }

        let from = run.cursor.last_seen().unwrap_or(range.end.max(range.start));
        self.follow(&mut run, from, sink, cancel).await
    }

    /// Pages through a bounded range.
    async fn drain<K: EnvelopeSink + Send>(
        &self,
        run: &mut Invocation<'_>,
        range: TimeRange,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut planner = WindowPlanner::new(range, run.filter.line_limit);

        while let Some(window) = planner.next_window() {
            run.summary.windows = planner.windows();
            let batch = self.fetch_with_retry(run, window, cancel).await?;
            debug!(
                source_id = run.source_id,
                %window,
                batch = batch.len(),
                "fetched window"
            );

            planner.observe(&batch);
            run.emit_batch(&batch, sink)?;

            if run.cap_reached() {
                debug!(source_id = run.source_id, "line limit reached");
                break;
            }
        }

        Ok(())
    }

    /// Polls past the newest timestamp until cancelled or out of retries.
    async fn follow<K: EnvelopeSink + Send>(
        &self,
        run: &mut Invocation<'_>,
        mut from: i64,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> Result<StreamSummary> {
        debug!(source_id = run.source_id, from, "following");

        loop {
            let window = TimeRange::since(from);
            run.summary.windows += 1;
            let batch = self.fetch_with_retry(run, window, cancel).await?;

            let full = batch.len() >= run.filter.line_limit;
            let written = run.emit_batch(&batch, sink)?;

            if let Some(last) = batch.last().map(|e| e.timestamp) {
                // A full page of nothing but already-seen ties would be
                // refetched forever, so step past it.
                from = if full && written == 0 {
                    last.saturating_add(1)
                } else {
                    last.max(from)
                };
            }

            if !full {
                self.pause(cancel).await?;
            }
        }
    }

    /// Fetches one window, retrying transient failures in follow mode.
    async fn fetch_with_retry(
        &self,
        run: &mut Invocation<'_>,
        window: TimeRange,
        cancel: &CancellationToken,
    ) -> Result<Vec<Envelope>> {
        loop {
            run.summary.fetches += 1;
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(EngineError::Cancelled),
                result = self.fetcher.fetch(run.source_id, window, run.filter) => result,
            };

            match result {
                Ok(batch) => {
                    run.failures = 0;
                    return Ok(batch);
                }
                Err(err) => {
                    self.record_failure(run, window, err)?;
                    self.pause(cancel).await?;
                }
            }
        }
    }

    /// Decides whether a failed fetch is retried or surfaced.
    fn record_failure(&self, run: &mut Invocation<'_>, window: TimeRange, err: FetchError) -> Result<()> {
        if !run.filter.follow {
            return Err(EngineError::Fetch {
                source_id: run.source_id.to_string(),
                window,
                source: err,
            });
        }

        run.failures += 1;
        if run.failures > self.config.max_retries {
            return Err(EngineError::RetriesExhausted {
                source_id: run.source_id.to_string(),
                attempts: run.failures,
                from: window.start,
                source: err,
            });
        }

        warn!(
            source_id = run.source_id,
            %window,
            attempt = run.failures,
            max_retries = self.config.max_retries,
            error = %err,
            "fetch failed, retrying"
        );
        Ok(())
    }

    async fn pause(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(EngineError::Cancelled),
            () = tokio::time::sleep(self.config.poll_interval) => Ok(()),
        }
    }
}

impl<F: Fetch> SourceStreamer for TailStreamer<F> {
    fn stream<K: EnvelopeSink + Send>(
        &self,
        source_id: &str,
        range: TimeRange,
        filter: &QueryFilter,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<StreamSummary>> + Send {
        Self::stream(self, source_id, range, filter, sink, cancel)
    }
}
