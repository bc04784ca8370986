//! Pipeline error types
//!
//! Anything that escapes a processor's `process` call fails the batch: the
//! host redelivers from the last checkpoint. Per-document failures never
//! surface here - they end in quarantine, which counts as delivery.

use thiserror::Error;

use siphon_sinks::openschema::OpenSchemaError;

use crate::checkpoint::CheckpointError;

/// Errors that fail a batch
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The partition token was cancelled mid-operation
    ///
    /// Logged at informational level where observed, then propagated.
    #[error("operation cancelled")]
    Cancelled,

    /// The cluster rejected the whole bulk request with a structured error
    #[error("bulk request rejected: status {status}: {reason}")]
    BulkRejected {
        /// HTTP status of the rejection
        status: u16,
        /// Error detail from the response envelope
        reason: String,
    },

    /// An OpenSchema flush failed after exhausting its write attempts
    #[error(transparent)]
    Sink(#[from] OpenSchemaError),

    /// The host checkpoint call failed
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
