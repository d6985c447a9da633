use anyhow::Error;
use thiserror::Error;

use crate::key_path::KeyPathError;

/// Application-level error types for s3tool-rs.
///
/// Per-item failures (`NotFound`, `Transfer`, `PartialMove`, `InvalidKeyPath`)
/// are carried inside [`OperationResult::Failure`](crate::types::OperationResult)
/// and never abort sibling items. Command-level failures are returned as
/// `anyhow::Error` wrapping one of these variants.
///
/// ## Exit Codes
///
/// - 0: Non-error conditions (Cancelled)
/// - 1: General errors (Transfer, Storage)
/// - 2: Configuration and structural validation errors
/// - 3: Partial failure (the batch finished, some items failed)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum S3ToolError {
    #[error("{0}")]
    InvalidKeyPath(#[from] KeyPathError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Nothing to operate on.
    #[error("{0}")]
    EmptyInput(String),

    #[error("No such key: {key}")]
    NotFound { key: String },

    /// Local upload source that is missing or not a regular file.
    #[error("No such file: {path}")]
    FileNotFound { path: String },

    #[error("Transfer failed for {key}: {message}")]
    Transfer { key: String, message: String },

    /// The copy succeeded but the origin could not be deleted; both keys now exist.
    #[error(
        "Partial move: copied {origin} to {destination} but failed to delete the origin: {message}"
    )]
    PartialMove {
        origin: String,
        destination: String,
        message: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    /// A worker task panicked or was aborted before producing a result.
    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("Operation cancelled by user")]
    Cancelled,

    #[error("Partial failure: {succeeded} succeeded, {failed} failed")]
    PartialFailure { succeeded: u64, failed: u64 },
}

impl S3ToolError {
    pub fn exit_code(&self) -> i32 {
        match self {
            S3ToolError::Cancelled => 0,
            S3ToolError::InvalidConfig(_)
            | S3ToolError::InvalidKeyPath(_)
            | S3ToolError::EmptyInput(_) => 2,
            S3ToolError::PartialFailure { .. } => 3,
            _ => 1,
        }
    }

    /// True for failures that leave duplicated data behind.
    pub fn is_partial_move(&self) -> bool {
        matches!(self, S3ToolError::PartialMove { .. })
    }
}

/// Check if an anyhow::Error wraps a cancellation error.
pub fn is_cancelled_error(e: &Error) -> bool {
    if let Some(err) = e.downcast_ref::<S3ToolError>() {
        return *err == S3ToolError::Cancelled;
    }
    false
}

/// Convert a propagated error into the per-item failure it represents.
///
/// Typed errors are kept as they are; anything else (SDK and I/O errors
/// with their context chain) becomes [`S3ToolError::Storage`].
pub fn to_item_error(e: &Error) -> S3ToolError {
    if let Some(err) = e.downcast_ref::<S3ToolError>() {
        return err.clone();
    }
    S3ToolError::Storage(format!("{e:#}"))
}

/// Extract the exit code from an anyhow::Error, defaulting to 1.
pub fn exit_code_from_error(e: &Error) -> i32 {
    if let Some(err) = e.downcast_ref::<S3ToolError>() {
        return err.exit_code();
    }
    1
}
