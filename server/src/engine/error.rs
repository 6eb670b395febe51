//! Engine adapter errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The launcher could not be started.
    #[error("Failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine ran the command and reported failure.
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// The engine is not accepting commands.
    #[error("Permission engine unavailable: {0}")]
    Unavailable(String),

    /// The blocking worker did not complete.
    #[error("Engine worker failed: {0}")]
    Worker(String),

    #[error("Invalid launcher: {0}")]
    InvalidLauncher(String),

    #[error("Invalid group mapping: {0}")]
    InvalidMapping(String),
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Worker(err.to_string())
    }
}
