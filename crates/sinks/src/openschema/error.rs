//! OpenSchema sink error types

use thiserror::Error;

/// Errors surfaced by the OpenSchema backend
///
/// Both variants leave the buffer intact: the flush can be retried with
/// the same records once the batch is redelivered.
#[derive(Debug, Error)]
pub enum OpenSchemaError {
    /// Blob writes exhausted the per-flush attempt cap
    #[error("flush abandoned after {attempts} blob write attempts")]
    FlushExhausted {
        /// Attempts performed before giving up
        attempts: u32,
    },

    /// Compression failed mid-flush
    #[error("compression failed: {0}")]
    Compression(#[source] std::io::Error),
}
