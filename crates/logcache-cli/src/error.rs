//! CLI error types.

use std::fmt;

use logcache::EngineError;

/// Exit code for errors caused by the user's input.
pub const EXIT_INPUT_ERROR: u8 = 2;

/// Exit code for every other failure.
pub const EXIT_FAILURE: u8 = 1;

/// Exit code for a one-shot command interrupted before it finished.
pub const EXIT_INTERRUPTED: u8 = 130;

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// Invalid configuration (address, TLS, client setup).
    Config(String),
    /// Invalid argument, rejected before any fetch.
    InvalidArgument(String),
    /// The engine failed.
    Engine(EngineError),
    /// IO error.
    Io(std::io::Error),
}

impl CliError {
    /// Returns the process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidArgument(_) => EXIT_INPUT_ERROR,
            Self::Engine(e) if e.is_input_error() => EXIT_INPUT_ERROR,
            Self::Engine(e) if e.is_cancelled() => EXIT_INTERRUPTED,
            _ => EXIT_FAILURE,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Engine(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Engine(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}
