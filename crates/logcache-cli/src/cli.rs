//! Command-line argument parsing with clap.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use logcache::{
    DEFAULT_LINE_LIMIT, EnvelopeType, MAX_LINE_LIMIT, QueryFilter, RenderMode, TailConfig,
    TimeRange,
};

use crate::client::HttpFetcherConfig;
use crate::error::CliError;

/// Default look-back for `log-query` when no start time is given.
pub const DEFAULT_QUERY_LOOKBACK: Duration = Duration::from_secs(5 * 60);

/// log-cache CLI - tail sources and run range queries.
#[derive(Parser, Debug, Clone)]
#[command(name = "logcache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// log-cache address.
    #[arg(long, global = true, env = "LOG_CACHE_ADDR", default_value = "http://localhost:8080")]
    pub addr: String,

    /// Value sent in the Authorization header.
    #[arg(long, global = true, env = "LOG_CACHE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Skip TLS certificate verification.
    #[arg(long, global = true, env = "LOG_CACHE_SKIP_SSL_VALIDATION")]
    pub skip_ssl_validation: bool,

    /// Per-request timeout in seconds.
    #[arg(long, global = true, default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Delay between follow-mode polls and retries, in milliseconds.
    #[arg(long, global = true, env = "LOG_CACHE_POLL_INTERVAL_MS", default_value_t = 250)]
    pub poll_interval_ms: u64,

    /// Consecutive failed fetches tolerated while following.
    #[arg(long, global = true, env = "LOG_CACHE_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: u32,

    /// Emit diagnostics as JSON.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Builds the HTTP fetcher configuration.
    #[must_use]
    pub fn fetcher_config(&self) -> HttpFetcherConfig {
        HttpFetcherConfig {
            addr: self.addr.clone(),
            token: self.token.clone(),
            skip_ssl_validation: self.skip_ssl_validation,
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    /// Builds the tail streamer configuration.
    #[must_use]
    pub fn tail_config(&self) -> TailConfig {
        TailConfig::default()
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_max_retries(self.max_retries)
    }
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Output envelopes for a source id, oldest first.
    ///
    /// Without --start-time the range begins at the oldest envelope the cache
    /// holds, so the first --lines envelopes are printed. Narrow the range
    /// with --start-time to see recent output, or use --follow.
    Tail(TailArgs),

    /// Output results for a range query.
    #[command(name = "log-query")]
    LogQuery(QueryArgs),
}

/// Arguments for the tail command.
#[derive(Args, Debug, Clone)]
pub struct TailArgs {
    /// Source id to tail.
    pub source_id: String,

    /// Start of query range in UNIX nanoseconds [default: 0, or now with --follow].
    #[arg(long, allow_negative_numbers = true)]
    pub start_time: Option<i64>,

    /// End of query range in UNIX nanoseconds.
    #[arg(long, allow_negative_numbers = true)]
    pub end_time: Option<i64>,

    /// Envelope type filter: log, counter, gauge, timer or event.
    #[arg(long)]
    pub envelope_type: Option<EnvelopeType>,

    /// Output envelopes as they arrive.
    #[arg(short, long)]
    pub follow: bool,

    /// Output envelopes in JSON format.
    #[arg(long)]
    pub json: bool,

    /// Number of envelopes to return.
    #[arg(short = 'n', long, default_value_t = DEFAULT_LINE_LIMIT)]
    pub lines: usize,

    /// Counter name filter (implies --envelope-type=counter).
    #[arg(long)]
    pub counter_name: Option<String>,

    /// Gauge name filter (implies --envelope-type=gauge).
    #[arg(long)]
    pub gauge_name: Option<String>,
}

/// A validated tail request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailRequest {
    /// Range to drain before following
    pub range: TimeRange,
    /// Filter and paging options
    pub filter: QueryFilter,
    /// Output mode
    pub mode: RenderMode,
}

impl TailArgs {
    /// Validates the arguments against the current time.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::InvalidArgument`] for conflicting filters, an
    /// out-of-range line count, or a start time after the end time.
    pub fn request(&self, now: i64) -> Result<TailRequest, CliError> {
        if self.counter_name.is_some() && self.gauge_name.is_some() {
            return Err(CliError::InvalidArgument(
                "--counter-name cannot be used with --gauge-name".into(),
            ));
        }
        if self.lines == 0 || self.lines > MAX_LINE_LIMIT {
            return Err(CliError::InvalidArgument(format!(
                "--lines must be between 1 and {MAX_LINE_LIMIT}"
            )));
        }

        let end = self.end_time.unwrap_or(now);
        let start = self
            .start_time
            .unwrap_or(if self.follow { end } else { 0 });
        let range = checked_range(start, end)?;

        let mut filter = QueryFilter::new(self.lines).with_follow(self.follow);
        if let Some(kind) = self.envelope_type {
            filter = filter.with_envelope_type(kind);
        }
        if let Some(ref name) = self.counter_name {
            filter = filter.with_counter_name(name.clone());
        }
        if let Some(ref name) = self.gauge_name {
            filter = filter.with_gauge_name(name.clone());
        }

        let mode = if self.json {
            RenderMode::Json
        } else {
            RenderMode::Text
        };

        Ok(TailRequest {
            range,
            filter,
            mode,
        })
    }
}

/// Arguments for the log-query command.
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Query naming one or more sources, e.g. `cpu{source_id="my-app"}`.
    pub query: String,

    /// Start of query range in UNIX nanoseconds.
    #[arg(long, allow_negative_numbers = true)]
    pub start_time: Option<i64>,

    /// End of query range in UNIX nanoseconds.
    #[arg(long, allow_negative_numbers = true)]
    pub end_time: Option<i64>,
}

impl QueryArgs {
    /// Resolves the query range against the current time.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::InvalidArgument`] if the start time is after the end time.
    pub fn range(&self, now: i64) -> Result<TimeRange, CliError> {
        let end = self.end_time.unwrap_or(now);
        let lookback = i64::try_from(DEFAULT_QUERY_LOOKBACK.as_nanos()).unwrap_or(i64::MAX);
        let start = self
            .start_time
            .unwrap_or_else(|| end.saturating_sub(lookback));
        checked_range(start, end)
    }
}

fn checked_range(start: i64, end: i64) -> Result<TimeRange, CliError> {
    if start > end {
        return Err(CliError::InvalidArgument(format!(
            "--start-time ({start}) must be before --end-time ({end})"
        )));
    }
    Ok(TimeRange::new(start, end))
}
