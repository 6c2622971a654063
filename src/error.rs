//! Error types for bcbiotx.
//!
//! All operations return `Result<T>` which aliases `Result<T, TxError>`.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from transactional staging operations.
#[derive(Debug, Error)]
pub enum TxError {
    /// Transaction requested with no target paths.
    ///
    /// Indicates a caller bug upstream (a transaction with nothing to
    /// produce), so it is surfaced immediately rather than tolerated.
    #[error("transaction requested with no target paths")]
    NoTargetPaths,

    /// Target path cannot be staged (no file name or no parent directory).
    #[error("invalid transaction target: {0}")]
    InvalidTarget(PathBuf),

    /// A copied transfer arrived at the target with the wrong size.
    #[error("transfer size mismatch for {path}: expected {expected} bytes, found {found}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        found: u64,
    },

    /// Run configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// File system operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Unexpected error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for bcbiotx operations.
pub type Result<T> = std::result::Result<T, TxError>;
