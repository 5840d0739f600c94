//! Tickweave error types.

use thiserror::Error;

/// Workspace-wide error type.
#[derive(Debug, Error)]
pub enum TickweaveError {
    /// Configuration load/parse/save failure.
    #[error("Config error: {0}")]
    Config(String),

    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Workspace-wide result alias.
pub type Result<T> = std::result::Result<T, TickweaveError>;
