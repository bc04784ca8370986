//! Siphon Pipeline - partition processors and checkpoint coordination
//!
//! The broker host owns partition leases and batch delivery; this crate
//! owns what happens to a batch once it arrives.
//!
//! # Architecture
//!
//! ```text
//! [Broker Host] --open/process/close--> [PartitionProcessor]
//!                                          |- IndexerProcessor    -> elasticsearch
//!                                          |- OpenSchemaProcessor -> blob accounts
//!                                          '- CheckpointCoordinator --> host checkpoint
//! ```
//!
//! Two processors consume the same partitioned stream through independent
//! consumer groups:
//! - `IndexerProcessor` classifies events, frames them into bulk bodies,
//!   and drives response-based per-document retry and quarantine.
//! - `OpenSchemaProcessor` decodes Log/Interaction records into per-schema
//!   blob sinks and checkpoints around flushes.
//!
//! # Key Design
//!
//! - **Host-serialized partitions**: `open`, `process`, and `close` for one
//!   partition never overlap; processors keep plain mutable state.
//! - **Checkpoint follows delivery**: a batch is acknowledged only after
//!   its sink work succeeded, and at most once per coordinator interval.
//! - **Shared clients, partition-local state**: the HTTP clients and blob
//!   account list are built once per factory and shared read-only.

mod checkpoint;
mod error;
mod host;
mod indexer;
mod openschema;
mod records;
mod retry;

pub use checkpoint::{CheckpointCoordinator, CheckpointError, Checkpointer, RecordingCheckpointer};
pub use error::{PipelineError, Result};
pub use host::{CloseReason, PartitionContext, PartitionProcessor, ProcessorFactory};
pub use indexer::{IndexerFactory, IndexerOptions, IndexerProcessor};
pub use openschema::{OpenSchemaFactory, OpenSchemaOptions, OpenSchemaProcessor};
pub use records::{InteractionRecord, LogRecord, RecordError, INTERACTIONS_SCHEMA, LOG_SCHEMA};
pub use retry::{send_with_retries, RetryLimit};

use std::time::Duration;

/// Minimum interval between indexer checkpoints
pub const INDEXER_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(60);

/// Minimum interval between OpenSchema checkpoints
pub const OPENSCHEMA_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(3 * 60);

/// Bounded retry attempts for re-submitting failed documents
pub const MAX_FAILED_DOC_RETRIES: u32 = 10;

/// Bounded retry attempts for quarantine submissions
pub const MAX_ABANDONED_DOC_RETRIES: u32 = 10;

#[cfg(test)]
mod indexer_test;
#[cfg(test)]
mod test_support;
