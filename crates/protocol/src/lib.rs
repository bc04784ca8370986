//! Siphon Protocol - event model and classification
//!
//! This crate provides the types that flow through both ingestion pipelines:
//! - `RawEvent` - one event as delivered by the partition broker
//! - `PropertyValue` - the closed set of broker property kinds
//! - `BulkItem` / `InvalidItem` - the classified, index-routed forms
//! - `IndexFamily` - the closed set of index destinations
//! - `classify` - the single entry point turning a raw event into exactly
//!   one valid or invalid item
//!
//! # Design Principles
//!
//! - **Closed sums at the boundary**: the broker hands us a dynamic property
//!   bag; everything past `classify` is a closed enum.
//! - **One event in, one item out**: classification never fails - malformed
//!   events become `InvalidItem`s carrying the reason, and are quarantined
//!   downstream instead of being retried.
//! - **Bodies are single-line**: the bulk wire format is newline-delimited,
//!   so a body containing `\n` is rejected at classification time.

mod classify;
mod event;
mod item;

pub use classify::{classify, Classified};
pub use event::{PropertyValue, RawEvent};
pub use item::{AbandonedDoc, BulkItem, IndexFamily, InvalidItem};

// Re-export bytes for convenience
pub use bytes::Bytes;

/// Maximum number of body characters preserved in an abandoned-doc record
pub const ABANDONED_CONTENT_CHARS: usize = 1024;

/// Well-known broker property: event type discriminator
pub const PROP_TYPE: &str = "Type";

/// Well-known broker property: stable message identifier
pub const PROP_MESSAGE_ID: &str = "MessageId";

/// Well-known broker property: logical record time (ISO-8601 string)
pub const PROP_TIMESTAMP: &str = "Timestamp";

/// Well-known broker property: doc-type override for telemetry families
pub const PROP_SOURCE: &str = "Source";

#[cfg(test)]
mod item_test;
