//! Checkpoint coordination
//!
//! Checkpoints are the only durable acknowledgement of progress: the host
//! redelivers everything after the last checkpoint on restart or lease
//! movement. The coordinator rate-limits checkpoint calls per partition -
//! delivery success decides *whether* progress may be acknowledged, the
//! coordinator decides *when*.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Error from the host checkpoint call
#[derive(Debug, Error)]
#[error("checkpoint failed: {0}")]
pub struct CheckpointError(pub String);

/// Host-provided checkpoint callback
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Durably acknowledge progress for a partition
    async fn checkpoint(&self, partition_id: &str) -> Result<(), CheckpointError>;
}

/// Per-partition checkpoint rate limiter
#[derive(Clone)]
pub struct CheckpointCoordinator {
    partition_id: String,
    min_interval: Duration,
    last_checkpoint_at: Instant,
    checkpointer: Arc<dyn Checkpointer>,
}

impl CheckpointCoordinator {
    /// Create a coordinator; the interval starts counting now
    pub fn new(
        partition_id: impl Into<String>,
        min_interval: Duration,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Self {
        Self {
            partition_id: partition_id.into(),
            min_interval,
            last_checkpoint_at: Instant::now(),
            checkpointer,
        }
    }

    /// Whether the minimum interval has elapsed since the last checkpoint
    pub fn is_due(&self) -> bool {
        self.last_checkpoint_at.elapsed() >= self.min_interval
    }

    /// Checkpoint if the interval elapsed; returns whether one was issued
    pub async fn maybe_checkpoint(&mut self) -> Result<bool, CheckpointError> {
        if !self.is_due() {
            return Ok(false);
        }
        self.force_checkpoint().await?;
        Ok(true)
    }

    /// Checkpoint unconditionally and restart the interval
    ///
    /// Used on clean shutdown and after a flush acknowledged buffered work.
    pub async fn force_checkpoint(&mut self) -> Result<(), CheckpointError> {
        self.checkpointer.checkpoint(&self.partition_id).await?;
        self.last_checkpoint_at = Instant::now();
        debug!(partition = %self.partition_id, "checkpoint issued");
        Ok(())
    }
}

/// Checkpointer that records calls - for tests and replay runs
#[derive(Debug, Default)]
pub struct RecordingCheckpointer {
    calls: Mutex<Vec<String>>,
}

impl RecordingCheckpointer {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Partitions checkpointed so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of checkpoint calls observed
    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Checkpointer for RecordingCheckpointer {
    async fn checkpoint(&self, partition_id: &str) -> Result<(), CheckpointError> {
        self.calls.lock().push(partition_id.to_string());
        Ok(())
    }
}
