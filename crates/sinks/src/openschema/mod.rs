//! OpenSchema blob delivery
//!
//! Records are buffered per schema, flushed to a randomly-chosen blob
//! account when the buffer fills (or explicitly, on checkpoint/shutdown),
//! and each uploaded blob is announced to the analytics service through an
//! out-of-band notification POST.
//!
//! ```text
//! append --> [FlushBuffer] --size--> gzip? --> put_blob --> notification
//!                                    (10 attempts, any account)  (10 attempts)
//! ```
//!
//! A failed upload fails the flush and leaves the buffer intact for a
//! re-flush; a failed notification is logged and dropped - the blob is
//! already durable.

mod blob;
mod buffer;
mod error;
mod notify;
mod sink;

pub use blob::{AzureBlobStore, BlobError, BlobStore, BlobTarget, MemoryBlobStore};
pub use buffer::FlushBuffer;
pub use error::OpenSchemaError;
pub use notify::{
    HttpNotificationSender, MemoryNotificationSender, NotificationEnvelope, NotificationSender,
    Notifier, NotifyError,
};
pub use sink::{CounterSnapshot, SchemaSink, SinkCounters};

use std::time::Duration;

use uuid::Uuid;

/// Result type for OpenSchema sink operations
pub type Result<T> = std::result::Result<T, OpenSchemaError>;

/// Hard cap on blob write attempts per flush
pub const MAX_BLOB_WRITE_ATTEMPTS: u32 = 10;

/// Hard cap on notification delivery attempts per blob
pub const MAX_NOTIFY_ATTEMPTS: u32 = 10;

/// Read-access lifetime of the SAS URI handed to the analytics service
pub const SAS_READ_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Payload compression applied at flush time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Upload the buffer as-is
    None,

    /// Gzip the buffer into a scratch allocation before upload
    Gzip,

    /// Always fail - exercises the buffer-preserving error path
    #[cfg(test)]
    Failing,
}

impl Compression {
    /// Blob name extension for this compression mode
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::None => "json",
            Compression::Gzip => "json.gz",
            #[cfg(test)]
            Compression::Failing => "json",
        }
    }
}

/// Identity of one schema sink
#[derive(Debug, Clone)]
pub struct SchemaSpec {
    /// Schema name, used in blob names (e.g. `Log`, `Interactions`)
    pub name: String,

    /// Stable schema identifier registered with the analytics service
    pub schema_id: Uuid,
}

impl SchemaSpec {
    /// Create a schema spec
    pub fn new(name: impl Into<String>, schema_id: Uuid) -> Self {
        Self {
            name: name.into(),
            schema_id,
        }
    }
}

// Test modules - only compiled during testing
#[cfg(test)]
mod blob_test;
#[cfg(test)]
mod buffer_test;
