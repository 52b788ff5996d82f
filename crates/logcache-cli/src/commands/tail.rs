//! Tail command implementation.
//!
//! Streams one source's envelopes onto the output, once or continuously.

use std::io::Write;

use logcache::{EngineError, Fetch, Renderer, StreamSummary, TailConfig, TailStreamer};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cli::TailArgs;
use crate::error::CliError;

/// Handler for the tail command.
#[derive(Debug)]
pub struct TailCommand<F> {
    streamer: TailStreamer<F>,
}

impl<F: Fetch> TailCommand<F> {
    /// Creates a new tail command handler.
    #[must_use]
    pub const fn new(fetcher: F, config: TailConfig) -> Self {
        Self {
            streamer: TailStreamer::new(fetcher, config),
        }
    }

    /// Executes the tail command.
    ///
    /// `now` is the current time in UNIX nanoseconds and fills in omitted
    /// bounds. A follow tail only ends on error or cancellation; cancelling
    /// it is the normal way to stop and yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::InvalidArgument`] before any fetch for invalid
    /// arguments, an engine error (including cancellation of a one-shot
    /// tail), or an output failure.
    pub async fn execute<W: Write + Send>(
        &self,
        out: &mut W,
        args: &TailArgs,
        now: i64,
        cancel: &CancellationToken,
    ) -> Result<Option<StreamSummary>, CliError> {
        let request = args.request(now)?;
        debug!(source_id = %args.source_id, range = %request.range, follow = request.filter.follow, "tailing");

        let mut renderer = Renderer::new(&mut *out, request.mode);
        let result = self
            .streamer
            .stream(
                &args.source_id,
                request.range,
                &request.filter,
                &mut renderer,
                cancel,
            )
            .await;

        let summary = match result {
            Ok(summary) => Some(summary),
            Err(EngineError::Cancelled) if request.filter.follow => {
                debug!(source_id = %args.source_id, "follow stopped");
                None
            }
            Err(err) => return Err(err.into()),
        };
        renderer.finish()?;
        Ok(summary)
    }
}
