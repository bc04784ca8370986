//! OpenSchema partition processor
//!
//! Decodes events into schema records, appends them to per-schema blob
//! sinks, and couples checkpointing to flushes: progress is acknowledged
//! when buffered records became durable blobs, or when the checkpoint
//! interval elapses (which forces the buffers out first).
//!
//! Only Serilog and interaction events carry OpenSchema records; every
//! other event type is discarded without comment, and a record that fails
//! to decode is logged, counted, and dropped - the batch proceeds.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use siphon_protocol::{PropertyValue, RawEvent, PROP_MESSAGE_ID, PROP_TYPE};
use siphon_sinks::openschema::{
    BlobStore, Compression, CounterSnapshot, Notifier, SchemaSink, SchemaSpec,
};

use crate::checkpoint::CheckpointCoordinator;
use crate::error::PipelineError;
use crate::host::{CloseReason, PartitionContext, PartitionProcessor, ProcessorFactory};
use crate::records::{InteractionRecord, LogRecord, INTERACTIONS_SCHEMA, LOG_SCHEMA};
use crate::OPENSCHEMA_CHECKPOINT_INTERVAL;

/// OpenSchema pipeline tuning knobs
#[derive(Debug, Clone)]
pub struct OpenSchemaOptions {
    /// Base container name blobs shard under
    pub base_container: String,

    /// Per-schema buffer capacity in bytes
    pub buffer_capacity: usize,

    /// Payload compression at flush time
    pub compression: Compression,

    /// Whether batch-stats records are appended after flushes
    pub stats_enabled: bool,

    /// Minimum interval between checkpoints
    pub checkpoint_interval: Duration,

    /// Schema id registered for `Log` records
    pub log_schema_id: Uuid,

    /// Schema id registered for `Interactions` records
    pub interactions_schema_id: Uuid,
}

impl OpenSchemaOptions {
    /// Create options with defaults for the tuning fields
    pub fn new(
        base_container: impl Into<String>,
        buffer_capacity: usize,
        log_schema_id: Uuid,
        interactions_schema_id: Uuid,
    ) -> Self {
        Self {
            base_container: base_container.into(),
            buffer_capacity,
            compression: Compression::None,
            stats_enabled: true,
            checkpoint_interval: OPENSCHEMA_CHECKPOINT_INTERVAL,
            log_schema_id,
            interactions_schema_id,
        }
    }
}

/// Aggregate decode timings for one checkpoint window
#[derive(Debug, Default, Clone, Copy)]
struct DecodeStats {
    count: u64,
    errors: u64,
    min_ms: Option<f64>,
    max_ms: f64,
    total_ms: f64,
}

impl DecodeStats {
    fn record(&mut self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.count += 1;
        self.total_ms += ms;
        self.max_ms = self.max_ms.max(ms);
        self.min_ms = Some(self.min_ms.map_or(ms, |m: f64| m.min(ms)));
    }

    fn record_error(&mut self) {
        self.errors += 1;
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Batch-stats record appended to the Log sink after a flush
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchStatsRecord {
    schema_name: &'static str,
    doc_type: &'static str,
    timestamp: String,
    partition_id: String,
    docs_decoded: u64,
    decode_errors: u64,
    min_decode_ms: f64,
    max_decode_ms: f64,
    total_decode_ms: f64,
    blobs_written: u64,
    blob_bytes: u64,
    write_errors: u64,
    notify_failures: u64,
    oversize_drops: u64,
    oldest_doc_lag_ms: i64,
}

impl BatchStatsRecord {
    fn new(
        partition_id: &str,
        stats: DecodeStats,
        counters: CounterSnapshot,
        oldest_doc_lag_ms: i64,
    ) -> Self {
        Self {
            schema_name: LOG_SCHEMA,
            doc_type: "batchstats",
            timestamp: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            partition_id: partition_id.to_string(),
            docs_decoded: stats.count,
            decode_errors: stats.errors,
            min_decode_ms: stats.min_ms.unwrap_or(0.0),
            max_decode_ms: stats.max_ms,
            total_decode_ms: stats.total_ms,
            blobs_written: counters.blobs_written,
            blob_bytes: counters.blob_bytes,
            write_errors: counters.write_errors,
            notify_failures: counters.notify_failures,
            oversize_drops: counters.oversize_drops,
            oldest_doc_lag_ms,
        }
    }
}

/// Per-partition OpenSchema processor
pub struct OpenSchemaProcessor {
    ctx: PartitionContext,
    log_sink: Arc<SchemaSink>,
    interactions_sink: Arc<SchemaSink>,
    options: OpenSchemaOptions,
    coordinator: CheckpointCoordinator,
    decode_stats: DecodeStats,
}

impl OpenSchemaProcessor {
    /// Create a processor with fresh partition-local sinks
    pub fn new(
        ctx: PartitionContext,
        accounts: Vec<Arc<dyn BlobStore>>,
        notifier: Notifier,
        options: OpenSchemaOptions,
    ) -> Self {
        let log_sink = Arc::new(SchemaSink::new(
            SchemaSpec::new(LOG_SCHEMA, options.log_schema_id),
            options.base_container.clone(),
            options.buffer_capacity,
            options.compression,
            accounts.clone(),
            notifier.clone(),
        ));
        let interactions_sink = Arc::new(SchemaSink::new(
            SchemaSpec::new(INTERACTIONS_SCHEMA, options.interactions_schema_id),
            options.base_container.clone(),
            options.buffer_capacity,
            options.compression,
            accounts,
            notifier,
        ));

        let coordinator = CheckpointCoordinator::new(
            ctx.partition_id.clone(),
            options.checkpoint_interval,
            Arc::clone(&ctx.checkpointer),
        );

        Self {
            ctx,
            log_sink,
            interactions_sink,
            options,
            coordinator,
            decode_stats: DecodeStats::default(),
        }
    }

    /// Decode one event into `(sink, encoded record, record timestamp)`
    ///
    /// Returns `None` for foreign event types (silently discarded) and for
    /// decode failures (logged and counted).
    fn decode_event(
        &mut self,
        event: &RawEvent,
    ) -> Option<(Arc<SchemaSink>, String, chrono::DateTime<Utc>)> {
        let event_type = match event.property(PROP_TYPE) {
            Some(PropertyValue::Text(t)) => t.as_str(),
            _ => return None,
        };
        let is_log = match event_type {
            "SerilogEvent" => true,
            "RoboCustosInteraction" => false,
            _ => return None,
        };

        let message_id = match event.property(PROP_MESSAGE_ID) {
            Some(PropertyValue::Text(id)) => id.clone(),
            _ => Uuid::new_v4().to_string(),
        };

        let started = Instant::now();
        let body = std::str::from_utf8(&event.body);

        let decoded = body.ok().and_then(|body| {
            if is_log {
                LogRecord::decode(self.options.log_schema_id, &message_id, body)
                    .map(|r| (Arc::clone(&self.log_sink), r.encode(), r.timestamp()))
                    .map_err(|e| {
                        debug!(error = %e, "failed to decode log record, dropping event");
                    })
                    .ok()
            } else {
                InteractionRecord::decode(self.options.interactions_schema_id, &message_id, body)
                    .map(|r| (Arc::clone(&self.interactions_sink), r.encode(), r.timestamp()))
                    .map_err(|e| {
                        debug!(error = %e, "failed to decode interaction record, dropping event");
                    })
                    .ok()
            }
        });

        self.decode_stats.record(started.elapsed());
        if decoded.is_none() {
            self.decode_stats.record_error();
        }
        decoded
    }

    /// Append the batch-stats record to the Log sink and reset counters
    async fn append_batch_stats(&mut self) -> Result<(), PipelineError> {
        let counters = self.log_sink.counters().snapshot_and_reset();
        let oldest_doc_lag_ms = match self.log_sink.oldest_buffered().await {
            Some(oldest) => (Utc::now() - oldest).num_milliseconds().max(0),
            None => 0,
        };

        let record = BatchStatsRecord::new(
            &self.ctx.partition_id,
            self.decode_stats,
            counters,
            oldest_doc_lag_ms,
        );
        let line = serde_json::to_string(&record).unwrap_or_default();
        let now = Utc::now();
        self.log_sink.append(&line, now).await?;
        Ok(())
    }

    /// Flush both sinks and acknowledge progress
    async fn flush_and_checkpoint(&mut self) -> Result<(), PipelineError> {
        self.log_sink.flush_now().await?;
        self.interactions_sink.flush_now().await?;
        self.decode_stats.clear();
        self.coordinator.force_checkpoint().await?;
        Ok(())
    }
}

#[async_trait]
impl PartitionProcessor for OpenSchemaProcessor {
    async fn open(&mut self) -> Result<(), PipelineError> {
        info!(partition = %self.ctx.partition_id, "openschema partition opened");
        Ok(())
    }

    async fn process(&mut self, batch: Vec<RawEvent>) -> Result<(), PipelineError> {
        if self.ctx.cancel.is_cancelled() {
            info!(partition = %self.ctx.partition_id, "cancellation observed before batch");
            return Err(PipelineError::Cancelled);
        }

        let mut any_flushed = false;
        for event in &batch {
            if let Some((sink, line, timestamp)) = self.decode_event(event) {
                any_flushed |= sink.append(&line, timestamp).await?;
            }
        }

        if any_flushed && self.options.stats_enabled {
            self.append_batch_stats().await?;
        }

        if any_flushed || self.coordinator.is_due() {
            self.flush_and_checkpoint().await?;
        }

        Ok(())
    }

    async fn close(&mut self, reason: CloseReason) -> Result<(), PipelineError> {
        info!(partition = %self.ctx.partition_id, %reason, "openschema partition closing");
        if reason == CloseReason::Shutdown {
            // Best-effort drain; an abrupt close skips it and loses buffered records
            self.flush_and_checkpoint().await?;
        }
        Ok(())
    }
}

/// Factory building one OpenSchema processor per partition
///
/// The blob account list and notification client are shared read-only
/// across partitions; the buffers are partition-local.
pub struct OpenSchemaFactory {
    accounts: Vec<Arc<dyn BlobStore>>,
    notifier: Notifier,
    options: OpenSchemaOptions,
}

impl OpenSchemaFactory {
    /// Create a factory over shared blob accounts and notifier
    pub fn new(
        accounts: Vec<Arc<dyn BlobStore>>,
        notifier: Notifier,
        options: OpenSchemaOptions,
    ) -> Self {
        Self {
            accounts,
            notifier,
            options,
        }
    }
}

#[async_trait]
impl ProcessorFactory for OpenSchemaFactory {
    async fn create(
        &self,
        ctx: PartitionContext,
    ) -> Result<Box<dyn PartitionProcessor>, PipelineError> {
        Ok(Box::new(OpenSchemaProcessor::new(
            ctx,
            self.accounts.clone(),
            self.notifier.clone(),
            self.options.clone(),
        )))
    }
}
