//! Range queries answered by repeated windowed tails.
//!
//! This module provides:
//! - [`SourceResolver`] — Extracts the sources a query touches
//! - [`LabelSourceResolver`] — Resolver for `source_id="…"` label matchers
//! - [`RangeQueryBridge`] — Streams every source and merges the results
//! - [`merge_by_timestamp`] — The global ordering step

use std::collections::HashSet;

use futures::{StreamExt, TryStreamExt, stream};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::QueryConfig;
use crate::error::{EngineError, Result};
use crate::tail::SourceStreamer;
use crate::types::{Envelope, QueryFilter, TimeRange};

static SOURCE_ID_MATCHER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"source_id\s*=\s*"([^"]+)""#).unwrap_or_else(|_| unreachable!())
});

static BARE_SOURCE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:/-]*$").unwrap_or_else(|_| unreachable!()));

/// Identifies the sources a query refers to.
pub trait SourceResolver: Send + Sync {
    /// Returns the distinct source ids in the order they appear.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] if the query names no source.
    fn resolve(&self, query: &str) -> Result<Vec<String>>;
}

/// Resolves sources from `source_id="…"` label matchers.
///
/// A query that is nothing but a bare source id is accepted as well.
#[derive(Debug, Default, Clone, Copy)]
pub struct LabelSourceResolver;

impl SourceResolver for LabelSourceResolver {
    fn resolve(&self, query: &str) -> Result<Vec<String>> {
        let query = query.trim();
        let mut seen = HashSet::new();
        let mut sources: Vec<String> = SOURCE_ID_MATCHER
            .captures_iter(query)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|id| seen.insert(id.clone()))
            .collect();

        if sources.is_empty() && BARE_SOURCE_ID.is_match(query) {
            sources.push(query.to_string());
        }

        if sources.is_empty() {
            return Err(EngineError::InvalidInput(format!(
                "query does not select a source_id: {query}"
            )));
        }
        Ok(sources)
    }
}

/// Merges per-source results into one sequence ordered by timestamp.
///
/// The sort is stable, so ties keep source order and then arrival order.
#[must_use]
pub fn merge_by_timestamp(batches: Vec<Vec<Envelope>>) -> Vec<Envelope> {
    let mut merged: Vec<Envelope> = batches.into_iter().flatten().collect();
    merged.sort_by_key(|e| e.timestamp);
    merged
}

/// Answers a range query by tailing each source it names.
#[derive(Debug)]
pub struct RangeQueryBridge<S, R> {
    streamer: S,
    resolver: R,
    config: QueryConfig,
}

impl<S: SourceStreamer, R: SourceResolver> RangeQueryBridge<S, R> {
    /// Creates a bridge over an explicit streamer and resolver.
    #[must_use]
    pub const fn new(streamer: S, resolver: R, config: QueryConfig) -> Self {
        Self {
            streamer,
            resolver,
            config,
        }
    }

    /// Returns the streamer.
    #[must_use]
    pub const fn streamer(&self) -> &S {
        &self.streamer
    }

    /// Evaluates `query` over `range`.
    ///
    /// Sources are streamed concurrently; the result is ordered by
    /// timestamp regardless of which source finished first. Sources with no
    /// envelopes in range contribute nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or range is invalid, or any source fails.
    pub async fn evaluate(
        &self,
        query: &str,
        range: TimeRange,
        cancel: &CancellationToken,
    ) -> Result<Vec<Envelope>> {
        range.validate()?;
        let sources = self.resolver.resolve(query)?;
        let filter = QueryFilter::new(self.config.window_limit).exhaustive();
        debug!(sources = sources.len(), %range, "evaluating range query");

        let batches: Vec<Vec<Envelope>> = stream::iter(&sources)
            .map(|source_id| {
                let filter = &filter;
                async move {
                    let mut out = Vec::new();
                    self.streamer
                        .stream(source_id, range, filter, &mut out, cancel)
                        .await?;
                    Ok::<_, EngineError>(out)
                }
            })
            .buffered(self.config.max_concurrency.max(1))
            .try_collect()
            .await?;

        let merged = merge_by_timestamp(batches);
        info!(sources = sources.len(), envelopes = merged.len(), "range query complete");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TailConfig;
    use crate::fetch::MemoryFetcher;
    use crate::tail::{EnvelopeSink, StreamSummary, TailStreamer};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::future::Future;
    use std::time::Duration;
    use test_case::test_case;

    /// Streamer that replays canned results and records each request.
    #[derive(Default)]
    struct MockStreamer {
        data: HashMap<String, Vec<Envelope>>,
        delays: HashMap<String, Duration>,
        calls: Mutex<Vec<(String, TimeRange, QueryFilter)>>,
    }

    impl MockStreamer {
        fn with(mut self, source: &str, timestamps: &[i64]) -> Self {
            self.data.insert(
                source.to_string(),
                timestamps
                    .iter()
                    .map(|ts| Envelope::log(source, *ts, format!("{source}@{ts}")))
                    .collect(),
            );
            self
        }

        fn delayed(mut self, source: &str, delay: Duration) -> Self {
            self.delays.insert(source.to_string(), delay);
            self
        }
    }

    impl SourceStreamer for MockStreamer {
        fn stream<K: EnvelopeSink + Send>(
            &self,
            source_id: &str,
            range: TimeRange,
            filter: &QueryFilter,
            sink: &mut K,
            _cancel: &CancellationToken,
        ) -> impl Future<Output = Result<StreamSummary>> + Send {
            async move {
                self.calls
                    .lock()
                    .push((source_id.to_string(), range, filter.clone()));
                if let Some(delay) = self.delays.get(source_id) {
                    tokio::time::sleep(*delay).await;
                }
                let mut summary = StreamSummary::default();
                for envelope in self.data.get(source_id).into_iter().flatten() {
                    if range.contains(envelope.timestamp) {
                        sink.emit(envelope)?;
                        summary.emitted += 1;
                    }
                }
                Ok(summary)
            }
        }
    }

    fn sources(result: &[Envelope]) -> Vec<(&str, i64)> {
        result
            .iter()
            .map(|e| (e.source_id.as_str(), e.timestamp))
            .collect()
    }

    #[test_case(r#"rate(cpu{source_id="app-a"}[1m])"#, &["app-a"] ; "single matcher")]
    #[test_case(r#"a{source_id="x"} + b{source_id = "y"} / c{source_id="x"}"#, &["x", "y"] ; "deduplicated")]
    #[test_case("my-app", &["my-app"] ; "bare source id")]
    fn resolver_extracts_sources(query: &str, expected: &[&str]) {
        let resolved = LabelSourceResolver.resolve(query).expect("resolve");
        assert_eq!(resolved, expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("sum(rate(cpu[1m]))" ; "no matcher")]
    fn resolver_rejects_queries_without_source(query: &str) {
        let err = LabelSourceResolver.resolve(query).expect_err("should fail");
        assert!(err.is_input_error());
    }

    #[tokio::test]
    async fn merges_sources_in_timestamp_order() {
        let mock = MockStreamer::default().with("A", &[5]).with("B", &[3]);
        let bridge = RangeQueryBridge::new(mock, LabelSourceResolver, QueryConfig::default());

        let result = bridge
            .evaluate(
                r#"x{source_id="A"} + y{source_id="B"}"#,
                TimeRange::new(0, 100),
                &CancellationToken::new(),
            )
            .await
            .expect("evaluate");

        assert_eq!(sources(&result), vec![("B", 3), ("A", 5)]);
    }

    #[tokio::test]
    async fn order_does_not_depend_on_completion_order() {
        let mock = MockStreamer::default()
            .with("slow", &[1, 4, 9])
            .with("fast", &[2, 4, 8])
            .delayed("slow", Duration::from_millis(20));
        let bridge = RangeQueryBridge::new(mock, LabelSourceResolver, QueryConfig::default());

        let result = bridge
            .evaluate(
                r#"a{source_id="slow"} or b{source_id="fast"}"#,
                TimeRange::new(0, 100),
                &CancellationToken::new(),
            )
            .await
            .expect("evaluate");

        assert_eq!(
            sources(&result),
            vec![("slow", 1), ("fast", 2), ("slow", 4), ("fast", 4), ("fast", 8), ("slow", 9)]
        );
    }

    #[tokio::test]
    async fn requests_exhaustive_one_shot_windows() {
        let mock = MockStreamer::default().with("A", &[1]);
        let bridge = RangeQueryBridge::new(mock, LabelSourceResolver, QueryConfig::default());
        bridge
            .evaluate("A", TimeRange::new(10, 20), &CancellationToken::new())
            .await
            .expect("evaluate");

        let calls = bridge.streamer().calls.lock();
        assert_eq!(calls.len(), 1);
        let (source, range, filter) = &calls[0];
        assert_eq!(source, "A");
        assert_eq!(*range, TimeRange::new(10, 20));
        assert_eq!(filter.line_limit, 1000);
        assert!(filter.exhaustive);
        assert!(!filter.follow);
    }

    #[tokio::test]
    async fn empty_sources_contribute_nothing() {
        let mock = MockStreamer::default().with("A", &[7]);
        let bridge = RangeQueryBridge::new(mock, LabelSourceResolver, QueryConfig::default());

        let result = bridge
            .evaluate(
                r#"a{source_id="A"} + b{source_id="missing"}"#,
                TimeRange::new(0, 100),
                &CancellationToken::new(),
            )
            .await
            .expect("evaluate");
        assert_eq!(sources(&result), vec![("A", 7)]);

        let result = bridge
            .evaluate(r#"b{source_id="missing"}"#, TimeRange::new(0, 100), &CancellationToken::new())
            .await
            .expect("evaluate");
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn reversed_range_is_rejected() {
        let bridge = RangeQueryBridge::new(
            MockStreamer::default(),
            LabelSourceResolver,
            QueryConfig::default(),
        );
        let err = bridge
            .evaluate("A", TimeRange::new(10, 5), &CancellationToken::new())
            .await
            .expect_err("should fail");
        assert!(err.is_input_error());
        assert!(bridge.streamer().calls.lock().is_empty());
    }

    #[tokio::test]
    async fn works_over_real_tail_streamer_with_pagination() {
        let fetcher = MemoryFetcher::with_envelopes(
            (0..25)
                .map(|i| Envelope::log("A", i * 2, "a"))
                .chain((0..25).map(|i| Envelope::log("B", i * 2 + 1, "b"))),
        );
        let streamer = TailStreamer::new(fetcher, TailConfig::default());
        let config = QueryConfig {
            window_limit: 4,
            max_concurrency: 2,
        };
        let bridge = RangeQueryBridge::new(streamer, LabelSourceResolver, config);

        let result = bridge
            .evaluate(
                r#"x{source_id="A"} + x{source_id="B"}"#,
                TimeRange::new(0, 50),
                &CancellationToken::new(),
            )
            .await
            .expect("evaluate");

        let ts: Vec<i64> = result.iter().map(|e| e.timestamp).collect();
        assert_eq!(ts, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn source_failure_fails_the_query() {
        let fetcher = MemoryFetcher::with_envelopes([Envelope::log("A", 1, "a")]);
        fetcher.fail_next(1);
        let bridge = RangeQueryBridge::new(
            TailStreamer::new(fetcher, TailConfig::default()),
            LabelSourceResolver,
            QueryConfig::default(),
        );
        let err = bridge
            .evaluate("A", TimeRange::new(0, 10), &CancellationToken::new())
            .await
            .expect_err("should fail");
        assert!(matches!(err, EngineError::Fetch { .. }));
    }

    #[test]
    fn merge_is_stable_for_ties() {
        let merged = merge_by_timestamp(vec![
            vec![Envelope::log("A", 2, "a2"), Envelope::log("A", 5, "a5")],
            vec![Envelope::log("B", 2, "b2"), Envelope::log("B", 3, "b3")],
        ]);
        assert_eq!(sources(&merged), vec![("A", 2), ("B", 2), ("B", 3), ("A", 5)]);
    }
}
