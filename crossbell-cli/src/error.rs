use crossbell_core::RepackError;
use thiserror::Error;

/// Errors that can occur during CLI command execution.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// I/O error
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// The repack run itself failed
    #[error(transparent)]
    Repack(#[from] RepackError),
}
