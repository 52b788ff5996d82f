//! log-cache CLI binary entrypoint.
//!
//! This is the main entry point for the `logcache` command-line tool.

use std::io;
use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use logcache::QueryConfig;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use logcache_cli::cli::{Cli, Commands};
use logcache_cli::commands::{QueryCommand, TailCommand};
use logcache_cli::{CliError, HttpFetcher};

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    init_tracing(cli.log_json);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        let cancel = CancellationToken::new();
        cancel_on_interrupt(cancel.clone());
        run(cli, &cancel).await
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

/// Runs one command. A cancelled follow tail is a clean stop; any other
/// cancelled command is reported as interrupted.
async fn run(cli: Cli, cancel: &CancellationToken) -> Result<(), CliError> {
    let fetcher = HttpFetcher::new(&cli.fetcher_config())?;
    let config = cli.tail_config();

    let mut stdout = io::stdout();

    match cli.command {
        Commands::Tail(args) => {
            let cmd = TailCommand::new(fetcher, config);
            cmd.execute(&mut stdout, &args, now_nanos(), cancel).await?;
        }
        Commands::LogQuery(args) => {
            let cmd = QueryCommand::new(fetcher, config, QueryConfig::default());
            cmd.execute(&mut stdout, &args, now_nanos(), cancel).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_tail() {
        let cli = Cli::parse_from(["logcache", "tail", "my-app", "-f"]);
        match cli.command {
            Commands::Tail(args) => {
                assert_eq!(args.source_id, "my-app");
                assert!(args.follow);
            }
            Commands::LogQuery(_) => panic!("expected tail command"),
        }
    }

    #[test]
    fn cli_parses_log_query() {
        let cli = Cli::parse_from(["logcache", "log-query", r#"up{source_id="a"}"#]);
        assert!(matches!(cli.command, Commands::LogQuery(_)));
    }

    #[test]
    fn cli_respects_addr_flag() {
        let cli = Cli::parse_from(["logcache", "--addr", "http://custom:9000", "tail", "app"]);
        assert_eq!(cli.addr, "http://custom:9000");
    }

    #[test]
    fn now_is_after_epoch() {
        assert!(now_nanos() > 0);
    }

    #[tokio::test]
    async fn run_tail_without_server_fails() {
        let cli = Cli::parse_from(["logcache", "--addr", "http://127.0.0.1:1", "tail", "app"]);
        let err = run(cli, &CancellationToken::new())
            .await
            .expect_err("nothing listens on port 1");
        assert_eq!(err.exit_code(), 1);
    }

    fn cancelled() -> CancellationToken {
        let cancel = CancellationToken::new();
        cancel.cancel();
        cancel
    }

    #[tokio::test]
    async fn interrupted_follow_exits_cleanly() {
        let cli = Cli::parse_from(["logcache", "--addr", "http://127.0.0.1:1", "tail", "app", "-f"]);
        assert!(run(cli, &cancelled()).await.is_ok());
    }

    #[tokio::test]
    async fn interrupted_one_shot_tail_exits_with_130() {
        let cli = Cli::parse_from([
            "logcache",
            "--addr",
            "http://127.0.0.1:1",
            "tail",
            "app",
            "--start-time",
            "0",
            "--end-time",
            "10",
        ]);
        let err = run(cli, &cancelled()).await.expect_err("interrupted");
        assert_eq!(err.exit_code(), 130);
    }

    #[tokio::test]
    async fn interrupted_log_query_exits_with_130() {
        let cli = Cli::parse_from([
            "logcache",
            "--addr",
            "http://127.0.0.1:1",
            "log-query",
            r#"x{source_id="app"}"#,
            "--start-time",
            "0",
            "--end-time",
            "10",
        ]);
        let err = run(cli, &cancelled()).await.expect_err("interrupted");
        assert_eq!(err.exit_code(), 130);
    }
}
