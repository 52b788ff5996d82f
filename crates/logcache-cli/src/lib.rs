//! # logcache-cli
//!
//! Command-line interface for log-cache.
//!
//! Provides commands for:
//! - Tailing one source, once or continuously (`tail`)
//! - Range queries merged across sources (`log-query`)
//!
//! # Architecture
//!
//! Commands run on the `logcache` engine. The [`client::HttpFetcher`] is the
//! fetch primitive that talks to the log-cache read API.
//!
//! ```text
//! ┌──────────────┐   GET /api/v1/read/{source}   ┌────────────┐
//! │ logcache-cli │──────────────────────────────►│ log-cache  │
//! └──────────────┘        (HTTP, JSON)           └────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod client;
pub mod commands;
pub mod error;

pub use cli::{Cli, Commands, QueryArgs, TailArgs, TailRequest};
pub use client::{HttpFetcher, HttpFetcherConfig};
pub use error::CliError;
