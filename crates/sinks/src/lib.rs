//! Siphon - Sinks
//!
//! Delivery backends for the two ingestion pipelines.
//!
//! # Architecture
//!
//! ```text
//! [Classified items] --> [elasticsearch] --NDJSON bulk--> ES cluster
//! [Decoded records]  --> [openschema]   --gzip blob-----> blob accounts
//!                                       --notification--> analytics service
//! ```
//!
//! # Available Backends
//!
//! | Module | Purpose | Wire format |
//! |--------|---------|-------------|
//! | `elasticsearch` | Bulk indexing with per-item status | `/_bulk` NDJSON |
//! | `openschema` | Schema-sharded blob upload + registration | line-delimited JSON blobs |
//!
//! Sinks here are I/O and framing only. Retry orchestration, failure
//! extraction, and checkpointing live in `siphon-pipeline`; the one
//! exception is the OpenSchema sink, whose blob-write and notification
//! retries are part of its flush contract.

pub mod elasticsearch;
pub mod openschema;
