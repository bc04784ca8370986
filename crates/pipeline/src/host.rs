//! Broker host contract
//!
//! The partition broker host is external: it owns leases, assigns
//! partitions, and delivers batches. It drives a processor through
//! `open`, zero or more `process` calls, and `close` - strictly
//! serialized per partition. Everything the processor needs from the host
//! travels in the `PartitionContext` handed to the factory.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use std::sync::Arc;

use siphon_protocol::RawEvent;

use crate::checkpoint::Checkpointer;
use crate::error::PipelineError;

/// Why the host is closing a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Clean shutdown - the processor checkpoints unconditionally
    Shutdown,

    /// The lease moved to another consumer - progress must not be
    /// acknowledged, the new owner resumes from the last checkpoint
    LeaseLost,

    /// The host observed a failure - treated like a lost lease
    Failure,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CloseReason::Shutdown => "shutdown",
            CloseReason::LeaseLost => "lease lost",
            CloseReason::Failure => "failure",
        };
        f.write_str(s)
    }
}

/// What the host provides for one partition lease
#[derive(Clone)]
pub struct PartitionContext {
    /// Stable partition identifier
    pub partition_id: String,

    /// Host checkpoint callback
    pub checkpointer: Arc<dyn Checkpointer>,

    /// Cancelled by the host on shutdown
    pub cancel: CancellationToken,
}

impl PartitionContext {
    /// Create a context
    pub fn new(
        partition_id: impl Into<String>,
        checkpointer: Arc<dyn Checkpointer>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            partition_id: partition_id.into(),
            checkpointer,
            cancel,
        }
    }
}

/// One pipeline's view of one partition
///
/// The host serializes calls per partition; implementations keep plain
/// mutable state and never synchronize internally across these calls.
#[async_trait]
pub trait PartitionProcessor: Send {
    /// The partition lease was acquired
    async fn open(&mut self) -> Result<(), PipelineError>;

    /// Deliver one batch; an error fails the batch and the host redelivers
    async fn process(&mut self, batch: Vec<RawEvent>) -> Result<(), PipelineError>;

    /// The partition lease is ending
    async fn close(&mut self, reason: CloseReason) -> Result<(), PipelineError>;
}

/// Builds one processor per partition lease
///
/// Factories hold the dependencies shared across partitions (HTTP clients,
/// blob account lists) and hand each processor its partition-local state.
#[async_trait]
pub trait ProcessorFactory: Send + Sync {
    /// Create a processor for a freshly acquired partition
    async fn create(
        &self,
        ctx: PartitionContext,
    ) -> Result<Box<dyn PartitionProcessor>, PipelineError>;
}
