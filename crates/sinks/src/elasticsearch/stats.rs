//! Self-instrumentation items
//!
//! Every framed batch can carry two extra documents describing the batch
//! itself, indexed into the `ingestionstats` family alongside the user
//! data. Lag is measured from the broker enqueue time ("how far behind the
//! stream are we") and from the record timestamp ("how old is the data");
//! negative values clamp to zero so clock skew never reports time travel.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

use siphon_protocol::{BulkItem, IndexFamily};

/// Per-partition counters carried into the instrumentation items
#[derive(Debug, Clone)]
pub struct BatchStatsContext {
    /// Partition this batch came from
    pub partition_id: String,

    /// Number of user items framed in this batch
    pub batch_size: usize,

    /// Wall time of the previous batch's submission
    pub last_batch_elapsed_ms: u64,

    /// Documents the previous batch's first response rejected
    pub last_batch_failed_docs: u64,

    /// Documents the previous batch quarantined
    pub last_batch_abandoned_docs: u64,
}

/// Body of a `batchstats` document
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchStatsBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    last_message_timestamp_in_batch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_message_enqueue_time_in_batch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    oldest_message_timestamp_in_batch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    oldest_message_enqueue_time_in_batch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id_of_oldest_message_in_batch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id_of_oldest_enqueued_message_in_batch: Option<String>,
    lag_in_milliseconds: i64,
    max_lag_in_milliseconds: i64,
    lag_in_minutes: i64,
    max_lag_in_minutes: i64,
    lag_from_message_creation_time_in_minutes: i64,
    max_lag_from_message_creation_time_in_minutes: i64,
    timestamp: String,
    last_batch_elapsed_time_in_milliseconds: u64,
    task_id: String,
    batch_size: usize,
    last_batch_failed_documents: u64,
    last_batch_abandoned_documents: u64,
}

/// Body of a `perpartitionstats` document
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PerPartitionStatsBody {
    timestamp: String,
    partition_id: String,
    task_id: String,
    lag_in_milliseconds: i64,
    max_lag_in_milliseconds: i64,
    lag_in_minutes: i64,
    max_lag_in_minutes: i64,
    batch_size: usize,
    last_batch_elapsed_time_in_milliseconds: u64,
}

/// Lag figures derived from the batch contents
struct BatchLag {
    last_timestamp: Option<DateTime<Utc>>,
    last_enqueue: Option<DateTime<Utc>>,
    oldest_timestamp: Option<DateTime<Utc>>,
    oldest_enqueue: Option<DateTime<Utc>>,
    id_of_oldest: Option<String>,
    id_of_oldest_enqueued: Option<String>,
    lag_ms: i64,
    max_lag_ms: i64,
    creation_lag_min: i64,
    max_creation_lag_min: i64,
}

impl BatchLag {
    fn measure(items: &[BulkItem], now: DateTime<Utc>) -> Self {
        let last = items.last();
        let oldest = items.iter().min_by_key(|i| i.timestamp);
        let oldest_enqueued = items.iter().min_by_key(|i| i.enqueue_time);

        let lag_ms = last
            .map(|i| clamp_ms(now, i.enqueue_time))
            .unwrap_or_default();
        let max_lag_ms = oldest_enqueued
            .map(|i| clamp_ms(now, i.enqueue_time))
            .unwrap_or_default();
        let creation_lag_min = last
            .map(|i| clamp_ms(now, i.timestamp) / 60_000)
            .unwrap_or_default();
        let max_creation_lag_min = oldest
            .map(|i| clamp_ms(now, i.timestamp) / 60_000)
            .unwrap_or_default();

        Self {
            last_timestamp: last.map(|i| i.timestamp),
            last_enqueue: last.map(|i| i.enqueue_time),
            oldest_timestamp: oldest.map(|i| i.timestamp),
            oldest_enqueue: oldest_enqueued.map(|i| i.enqueue_time),
            id_of_oldest: oldest.map(|i| i.doc_id.clone()),
            id_of_oldest_enqueued: oldest_enqueued.map(|i| i.doc_id.clone()),
            lag_ms,
            max_lag_ms,
            creation_lag_min,
            max_creation_lag_min,
        }
    }
}

/// Build the `batchstats` item for a framed batch
pub fn build_batch_stats(
    items: &[BulkItem],
    ctx: &BatchStatsContext,
    now: DateTime<Utc>,
) -> BulkItem {
    let lag = BatchLag::measure(items, now);

    let body = BatchStatsBody {
        last_message_timestamp_in_batch: lag.last_timestamp.map(iso),
        last_message_enqueue_time_in_batch: lag.last_enqueue.map(iso),
        oldest_message_timestamp_in_batch: lag.oldest_timestamp.map(iso),
        oldest_message_enqueue_time_in_batch: lag.oldest_enqueue.map(iso),
        id_of_oldest_message_in_batch: lag.id_of_oldest,
        id_of_oldest_enqueued_message_in_batch: lag.id_of_oldest_enqueued,
        lag_in_milliseconds: lag.lag_ms,
        max_lag_in_milliseconds: lag.max_lag_ms,
        lag_in_minutes: lag.lag_ms / 60_000,
        max_lag_in_minutes: lag.max_lag_ms / 60_000,
        lag_from_message_creation_time_in_minutes: lag.creation_lag_min,
        max_lag_from_message_creation_time_in_minutes: lag.max_creation_lag_min,
        timestamp: iso(now),
        last_batch_elapsed_time_in_milliseconds: ctx.last_batch_elapsed_ms,
        task_id: ctx.partition_id.clone(),
        batch_size: ctx.batch_size,
        last_batch_failed_documents: ctx.last_batch_failed_docs,
        last_batch_abandoned_documents: ctx.last_batch_abandoned_docs,
    };

    stats_item("batchstats", &body, now)
}

/// Build the `perpartitionstats` item for a framed batch
pub fn build_per_partition_stats(
    items: &[BulkItem],
    ctx: &BatchStatsContext,
    now: DateTime<Utc>,
) -> BulkItem {
    let lag = BatchLag::measure(items, now);

    let body = PerPartitionStatsBody {
        timestamp: iso(now),
        partition_id: ctx.partition_id.clone(),
        task_id: ctx.partition_id.clone(),
        lag_in_milliseconds: lag.lag_ms,
        max_lag_in_milliseconds: lag.max_lag_ms,
        lag_in_minutes: lag.lag_ms / 60_000,
        max_lag_in_minutes: lag.max_lag_ms / 60_000,
        batch_size: ctx.batch_size,
        last_batch_elapsed_time_in_milliseconds: ctx.last_batch_elapsed_ms,
    };

    stats_item("perpartitionstats", &body, now)
}

fn stats_item<T: Serialize>(doc_type: &str, body: &T, now: DateTime<Utc>) -> BulkItem {
    // Serialization of a flat numeric/string struct cannot fail
    let body = serde_json::to_string(body).unwrap_or_default();
    BulkItem::new(
        IndexFamily::IngestionStats,
        doc_type,
        Uuid::new_v4().to_string(),
        now,
        now,
        body,
    )
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Milliseconds between `now` and `earlier`, clamped at zero
fn clamp_ms(now: DateTime<Utc>, earlier: DateTime<Utc>) -> i64 {
    (now - earlier).num_milliseconds().max(0)
}
