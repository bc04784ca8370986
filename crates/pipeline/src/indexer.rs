//! Elasticsearch partition processor
//!
//! One batch flows through four phases:
//!
//! 1. **Classify** every event into a valid or invalid item.
//! 2. **Submit** the framed batch (plus instrumentation items) with
//!    unbounded transport retry - the stream does not advance past an
//!    unreachable cluster.
//! 3. **Retry** just the documents the response rejected, bounded.
//! 4. **Quarantine** whatever still fails, together with the invalid
//!    items, as abandoned-doc records - also bounded.
//!
//! Quarantine counts as delivery; after it the batch is eligible for
//! checkpointing. The stopwatch around phase 2 feeds the *next* batch's
//! instrumentation items.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use siphon_protocol::{classify, AbandonedDoc, BulkItem, Classified, InvalidItem, RawEvent};
use siphon_sinks::elasticsearch::{
    build_batch_stats, build_per_partition_stats, BatchStatsContext, BulkFrame, BulkTransport,
    SubmitOutcome,
};

use crate::checkpoint::CheckpointCoordinator;
use crate::error::PipelineError;
use crate::host::{CloseReason, PartitionContext, PartitionProcessor, ProcessorFactory};
use crate::retry::{send_with_retries, RetryLimit};
use crate::{INDEXER_CHECKPOINT_INTERVAL, MAX_ABANDONED_DOC_RETRIES, MAX_FAILED_DOC_RETRIES};

/// Indexer tuning knobs
#[derive(Debug, Clone)]
pub struct IndexerOptions {
    /// Whether instrumentation items are appended to each batch
    pub stats_enabled: bool,

    /// Minimum interval between checkpoints
    pub checkpoint_interval: std::time::Duration,

    /// Attempt cap for re-submitting rejected documents
    pub max_failed_doc_retries: u32,

    /// Attempt cap for quarantine submissions
    pub max_abandoned_doc_retries: u32,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            stats_enabled: true,
            checkpoint_interval: INDEXER_CHECKPOINT_INTERVAL,
            max_failed_doc_retries: MAX_FAILED_DOC_RETRIES,
            max_abandoned_doc_retries: MAX_ABANDONED_DOC_RETRIES,
        }
    }
}

/// Per-partition Elasticsearch processor
pub struct IndexerProcessor {
    ctx: PartitionContext,
    transport: Arc<dyn BulkTransport>,
    options: IndexerOptions,
    coordinator: CheckpointCoordinator,

    // Observability carried into the next batch's stats items
    last_batch_elapsed_ms: u64,
    last_batch_failed_docs: u64,
    last_batch_abandoned_docs: u64,
}

impl IndexerProcessor {
    /// Create a processor for one partition
    pub fn new(
        ctx: PartitionContext,
        transport: Arc<dyn BulkTransport>,
        options: IndexerOptions,
    ) -> Self {
        let coordinator = CheckpointCoordinator::new(
            ctx.partition_id.clone(),
            options.checkpoint_interval,
            Arc::clone(&ctx.checkpointer),
        );

        Self {
            ctx,
            transport,
            options,
            coordinator,
            last_batch_elapsed_ms: 0,
            last_batch_failed_docs: 0,
            last_batch_abandoned_docs: 0,
        }
    }

    /// Wall time of the previous batch's first submission
    #[inline]
    pub fn last_batch_elapsed_ms(&self) -> u64 {
        self.last_batch_elapsed_ms
    }

    /// Documents the previous batch's first response rejected
    #[inline]
    pub fn last_batch_failed_docs(&self) -> u64 {
        self.last_batch_failed_docs
    }

    /// Documents the previous batch quarantined
    #[inline]
    pub fn last_batch_abandoned_docs(&self) -> u64 {
        self.last_batch_abandoned_docs
    }

    /// Frame the valid items, appending instrumentation items when enabled
    fn frame_batch(&self, valid: &[BulkItem]) -> BulkFrame {
        let mut frame = BulkFrame::new();
        for item in valid {
            frame.push(item);
        }

        if self.options.stats_enabled {
            let ctx = BatchStatsContext {
                partition_id: self.ctx.partition_id.clone(),
                batch_size: valid.len(),
                last_batch_elapsed_ms: self.last_batch_elapsed_ms,
                last_batch_failed_docs: self.last_batch_failed_docs,
                last_batch_abandoned_docs: self.last_batch_abandoned_docs,
            };
            let now = Utc::now();
            frame.push(&build_batch_stats(valid, &ctx, now));
            frame.push(&build_per_partition_stats(valid, &ctx, now));
        }

        frame
    }

    /// Re-submit rejected documents, bounded; returns the survivors as
    /// `(doc_id, last_error)` pairs
    async fn retry_failed(
        &self,
        frame: &BulkFrame,
        failed_ids: HashSet<String>,
    ) -> Result<Vec<(String, String)>, PipelineError> {
        let retry_frame = frame.subset(&failed_ids);
        let retry_body = retry_frame.body();

        let outcome = send_with_retries(
            || self.transport.submit(retry_body.clone()),
            SubmitOutcome::accepted,
            RetryLimit::Bounded(self.options.max_failed_doc_retries),
            &self.ctx.cancel,
        )
        .await?;

        let survivors = match outcome {
            SubmitOutcome::Success(response) => response
                .failed_items()
                .map(|item| (item.id.clone(), item.error_text()))
                .collect(),
            SubmitOutcome::ServerError { status, error } => {
                let text = format!("status {status}: {}: {}", error.kind, error.reason);
                retry_frame
                    .docs()
                    .map(|doc| (doc.doc_id.clone(), text.clone()))
                    .collect()
            }
            SubmitOutcome::TransportFailed { reason } => retry_frame
                .docs()
                .map(|doc| (doc.doc_id.clone(), reason.clone()))
                .collect(),
        };

        Ok(survivors)
    }

    /// Submit abandoned-doc records, bounded
    async fn quarantine(&self, abandoned: &[BulkItem]) -> Result<(), PipelineError> {
        let mut frame = BulkFrame::new();
        for item in abandoned {
            frame.push(item);
        }
        let body = frame.body();

        let outcome = send_with_retries(
            || self.transport.submit(body.clone()),
            SubmitOutcome::accepted,
            RetryLimit::Bounded(self.options.max_abandoned_doc_retries),
            &self.ctx.cancel,
        )
        .await?;

        if !outcome.accepted() {
            // Quarantine is best-effort past this point; the documents are
            // lost but the batch must not spin forever
            warn!(
                partition = %self.ctx.partition_id,
                count = abandoned.len(),
                "quarantine submission still failing after retries"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl PartitionProcessor for IndexerProcessor {
    async fn open(&mut self) -> Result<(), PipelineError> {
        info!(partition = %self.ctx.partition_id, "indexer partition opened");
        Ok(())
    }

    async fn process(&mut self, batch: Vec<RawEvent>) -> Result<(), PipelineError> {
        let batch_size = batch.len();

        let mut valid: Vec<BulkItem> = Vec::with_capacity(batch_size);
        let mut invalid: Vec<InvalidItem> = Vec::new();
        for event in &batch {
            match classify(event) {
                Classified::Valid(item) => valid.push(item),
                Classified::Invalid(item) => invalid.push(item),
            }
        }

        let mut failed_docs: u64 = 0;
        let mut abandoned: Vec<BulkItem> = Vec::new();

        if !valid.is_empty() || self.options.stats_enabled {
            let frame = self.frame_batch(&valid);
            let body = frame.body();

            let started = Instant::now();
            let outcome = send_with_retries(
                || self.transport.submit(body.clone()),
                SubmitOutcome::transport_ok,
                RetryLimit::TransportOnly,
                &self.ctx.cancel,
            )
            .await
            .inspect_err(|_| {
                info!(partition = %self.ctx.partition_id, "batch submission cancelled");
            })?;
            self.last_batch_elapsed_ms = started.elapsed().as_millis() as u64;

            match outcome {
                SubmitOutcome::Success(response) => {
                    let failed_ids: HashSet<String> =
                        response.failed_items().map(|item| item.id.clone()).collect();

                    if !failed_ids.is_empty() {
                        failed_docs = failed_ids.len() as u64;
                        debug!(
                            partition = %self.ctx.partition_id,
                            failed = failed_docs,
                            "bulk response carried per-item errors, retrying those documents"
                        );

                        let survivors = self.retry_failed(&frame, failed_ids).await?;
                        let now = Utc::now();
                        for (doc_id, last_error) in survivors {
                            let content = frame.get(&doc_id).map(|d| d.body.as_str()).unwrap_or("");
                            abandoned.push(AbandonedDoc::build(doc_id, content, last_error, now));
                        }
                    }
                }
                SubmitOutcome::ServerError { status, error } => {
                    return Err(PipelineError::BulkRejected {
                        status,
                        reason: format!("{}: {}", error.kind, error.reason),
                    });
                }
                // The transport-only predicate never accepts this outcome
                SubmitOutcome::TransportFailed { reason } => {
                    return Err(PipelineError::BulkRejected { status: 0, reason });
                }
            }
        }

        let now = Utc::now();
        for item in &invalid {
            abandoned.push(AbandonedDoc::build(
                item.doc_id.clone(),
                &item.body,
                &item.reason,
                now,
            ));
        }

        let abandoned_docs = abandoned.len() as u64;
        if !abandoned.is_empty() {
            self.quarantine(&abandoned).await?;
        }

        self.last_batch_failed_docs = failed_docs;
        self.last_batch_abandoned_docs = abandoned_docs;

        debug!(
            partition = %self.ctx.partition_id,
            batch_size,
            failed = failed_docs,
            abandoned = abandoned_docs,
            "batch processed"
        );

        self.coordinator.maybe_checkpoint().await?;
        Ok(())
    }

    async fn close(&mut self, reason: CloseReason) -> Result<(), PipelineError> {
        info!(partition = %self.ctx.partition_id, %reason, "indexer partition closing");
        if reason == CloseReason::Shutdown {
            self.coordinator.force_checkpoint().await?;
        }
        Ok(())
    }
}

/// Factory building one indexer processor per partition
///
/// The bulk transport is shared across every partition of the pipeline.
pub struct IndexerFactory {
    transport: Arc<dyn BulkTransport>,
    options: IndexerOptions,
}

impl IndexerFactory {
    /// Create a factory over a shared transport
    pub fn new(transport: Arc<dyn BulkTransport>, options: IndexerOptions) -> Self {
        Self { transport, options }
    }
}

#[async_trait]
impl ProcessorFactory for IndexerFactory {
    async fn create(
        &self,
        ctx: PartitionContext,
    ) -> Result<Box<dyn PartitionProcessor>, PipelineError> {
        Ok(Box::new(IndexerProcessor::new(
            ctx,
            Arc::clone(&self.transport),
            self.options.clone(),
        )))
    }
}
