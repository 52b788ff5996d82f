//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`tail`] - Envelopes for one source, optionally followed
//! - [`query`] - Range queries over one or more sources

pub mod query;
pub mod tail;

pub use query::QueryCommand;
pub use tail::TailCommand;
