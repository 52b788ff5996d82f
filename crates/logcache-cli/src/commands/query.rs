//! Log-query command implementation.

use std::io::Write;

use logcache::{
    Fetch, LabelSourceResolver, QueryConfig, RangeQueryBridge, RenderMode, TailConfig,
    TailStreamer, render,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cli::QueryArgs;
use crate::error::CliError;

/// Handler for the log-query command.
#[derive(Debug)]
pub struct QueryCommand<F> {
    bridge: RangeQueryBridge<TailStreamer<F>, LabelSourceResolver>,
}

impl<F: Fetch> QueryCommand<F> {
    /// Creates a new log-query command handler.
    #[must_use]
    pub const fn new(fetcher: F, tail: TailConfig, query: QueryConfig) -> Self {
        Self {
            bridge: RangeQueryBridge::new(
                TailStreamer::new(fetcher, tail),
                LabelSourceResolver,
                query,
            ),
        }
    }

    /// Executes the query and writes the result as a table.
    ///
    /// Returns the number of envelopes written.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::InvalidArgument`] for a reversed range, an input
    /// error for a query naming no source, otherwise any fetch or output
    /// failure.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        args: &QueryArgs,
        now: i64,
        cancel: &CancellationToken,
    ) -> Result<usize, CliError> {
        let range = args.range(now)?;
        debug!(query = %args.query, %range, "running range query");

        let envelopes = self.bridge.evaluate(&args.query, range, cancel).await?;
        render(&envelopes, RenderMode::Table, &mut *out)?;
        Ok(envelopes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use logcache::{Envelope, MemoryFetcher};
    use std::sync::Arc;

    fn args(argv: &[&str]) -> QueryArgs {
        let mut full = vec!["logcache", "log-query"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::LogQuery(args) => args,
            Commands::Tail(_) => panic!("expected log-query"),
        }
    }

    fn command(fetcher: &Arc<MemoryFetcher>) -> QueryCommand<Arc<MemoryFetcher>> {
        QueryCommand::new(Arc::clone(fetcher), TailConfig::default(), QueryConfig::default())
    }

    #[tokio::test]
    async fn merges_sources_in_timestamp_order() {
        let fetcher = Arc::new(MemoryFetcher::with_envelopes([
            Envelope::log("a", 5, "a-first"),
            Envelope::log("b", 3, "b-first"),
            Envelope::log("a", 7, "a-second"),
            Envelope::log("c", 4, "not queried"),
        ]));

        let mut out = Vec::new();
        let count = command(&fetcher)
            .execute(
                &mut out,
                &args(&[
                    r#"rate(logs{source_id="a"}[1m]) + rate(logs{source_id="b"}[1m])"#,
                    "--start-time",
                    "0",
                    "--end-time",
                    "100",
                ]),
                100,
                &CancellationToken::new(),
            )
            .await
            .expect("query");

        assert_eq!(count, 3);
        let text = String::from_utf8(out).expect("utf8");
        let b = text.find("b-first").expect("b");
        let a1 = text.find("a-first").expect("a1");
        let a2 = text.find("a-second").expect("a2");
        assert!(b < a1 && a1 < a2);
        assert!(!text.contains("not queried"));
        assert!(text.contains("Total: 3 envelope(s)"));
    }

    #[tokio::test]
    async fn empty_result_says_so() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let mut out = Vec::new();
        let count = command(&fetcher)
            .execute(&mut out, &args(&[r#"up{source_id="a"}"#]), 1_000, &CancellationToken::new())
            .await
            .expect("query");
        assert_eq!(count, 0);
        assert_eq!(String::from_utf8(out).expect("utf8"), "No envelopes found\n");
    }

    #[tokio::test]
    async fn reversed_range_is_rejected_before_fetch() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let err = command(&fetcher)
            .execute(
                &mut Vec::new(),
                &args(&[r#"up{source_id="a"}"#, "--start-time", "10", "--end-time", "5"]),
                100,
                &CancellationToken::new(),
            )
            .await
            .expect_err("reversed");
        assert_eq!(err.exit_code(), 2);
        assert_eq!(fetcher.fetch_count(), 0);
    }

    #[tokio::test]
    async fn query_without_source_is_input_error() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let err = command(&fetcher)
            .execute(&mut Vec::new(), &args(&["sum(up) by (job)"]), 100, &CancellationToken::new())
            .await
            .expect_err("no source");
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn interrupted_query_is_an_error() {
        let fetcher = Arc::new(MemoryFetcher::with_envelopes([Envelope::log("a", 5, "x")]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut out = Vec::new();
        let err = command(&fetcher)
            .execute(&mut out, &args(&[r#"up{source_id="a"}"#, "--start-time", "0", "--end-time", "10"]), 100, &cancel)
            .await
            .expect_err("query did not finish");

        assert_eq!(err.exit_code(), 130);
        assert!(out.is_empty());
    }
}
