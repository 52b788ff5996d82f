//! # logcache
//!
//! Windowed tail and range-query engine for log-cache envelopes.
//!
//! This crate provides:
//!
//! - [`Envelope`] — One log, counter, gauge, timer or event data point
//! - [`QueryFilter`] — Type/name filters plus paging options
//! - [`Fetch`] — The bounded remote read everything else is built on
//! - [`WindowPlanner`] — Dependent-window pagination over a time range
//! - [`DedupBuffer`] — At-most-once emission across overlapping windows
//! - [`TailStreamer`] — One-shot and follow-mode tailing of one source
//! - [`RangeQueryBridge`] — Range queries as merged per-source tails
//! - [`Renderer`] — JSON, text and table output
//!
//! ## Example
//!
//! ```rust
//! use logcache::{Envelope, MemoryFetcher, QueryFilter, TailConfig, TailStreamer, TimeRange};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> logcache::Result<()> {
//! let fetcher = MemoryFetcher::with_envelopes([
//!     Envelope::log("app", 10, "started"),
//!     Envelope::log("app", 20, "ready"),
//! ]);
//! let streamer = TailStreamer::new(fetcher, TailConfig::default());
//!
//! let mut out = Vec::new();
//! streamer
//!     .stream("app", TimeRange::new(0, 100), &QueryFilter::new(10), &mut out, &CancellationToken::new())
//!     .await?;
//! assert_eq!(out.len(), 2);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod dedup;
pub mod error;
pub mod fetch;
pub mod planner;
pub mod query;
pub mod render;
pub mod tail;
pub mod types;

pub use config::{QueryConfig, TailConfig};
pub use dedup::DedupBuffer;
pub use error::{EngineError, FetchError, Result};
pub use fetch::{Fetch, MemoryFetcher};
pub use planner::WindowPlanner;
pub use query::{LabelSourceResolver, RangeQueryBridge, SourceResolver, merge_by_timestamp};
pub use render::{RenderMode, Renderer, render};
pub use tail::{EnvelopeSink, SourceStreamer, StreamCursor, StreamSummary, TailStreamer};
pub use types::{
    DEFAULT_LINE_LIMIT, Envelope, EnvelopeIdentity, EnvelopeType, GaugeValue, LogStream,
    MAX_LINE_LIMIT, Payload, QueryFilter, TimeRange,
};
