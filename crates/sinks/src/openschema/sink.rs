//! Per-schema sink
//!
//! One `SchemaSink` exists per schema per partition. Appends go through a
//! `tokio::sync::Mutex` held across flush I/O: a flush may suspend on the
//! blob upload while another append waits, which is what keeps the buffer
//! consistent without copying it out under the lock.

use std::borrow::Cow;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::blob::{BlobError, BlobStore, BlobTarget};
use super::buffer::FlushBuffer;
use super::notify::Notifier;
use super::{Compression, OpenSchemaError, SchemaSpec, MAX_BLOB_WRITE_ATTEMPTS, SAS_READ_TTL};

/// Log prefix length for dropped oversize records
const OVERSIZE_LOG_PREFIX: usize = 1000;

/// Counters the processor folds into its batch-stats record
///
/// `snapshot_and_reset` returns the deltas since the last stats record;
/// lifetime totals live in the buffer.
#[derive(Debug, Default)]
pub struct SinkCounters {
    blobs_written: AtomicU64,
    blob_bytes: AtomicU64,
    write_errors: AtomicU64,
    notify_failures: AtomicU64,
    oversize_drops: AtomicU64,
}

/// Point-in-time counter values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Blobs uploaded since the last reset
    pub blobs_written: u64,

    /// Payload bytes uploaded since the last reset (post-compression)
    pub blob_bytes: u64,

    /// Flushes that exhausted their write attempts
    pub write_errors: u64,

    /// Notifications dropped after exhausting retries
    pub notify_failures: u64,

    /// Records dropped for exceeding the buffer capacity
    pub oversize_drops: u64,
}

impl SinkCounters {
    /// Read and zero all counters
    pub fn snapshot_and_reset(&self) -> CounterSnapshot {
        CounterSnapshot {
            blobs_written: self.blobs_written.swap(0, Ordering::Relaxed),
            blob_bytes: self.blob_bytes.swap(0, Ordering::Relaxed),
            write_errors: self.write_errors.swap(0, Ordering::Relaxed),
            notify_failures: self.notify_failures.swap(0, Ordering::Relaxed),
            oversize_drops: self.oversize_drops.swap(0, Ordering::Relaxed),
        }
    }
}

/// Buffer state behind the appender lock
#[derive(Debug)]
struct SinkState {
    buffer: FlushBuffer,
}

/// Size-triggered blob sink for one schema
pub struct SchemaSink {
    spec: SchemaSpec,
    base_container: String,
    compression: Compression,
    accounts: Vec<Arc<dyn BlobStore>>,
    notifier: Notifier,
    state: Mutex<SinkState>,
    counters: SinkCounters,
}

impl SchemaSink {
    /// Create a sink
    ///
    /// `accounts` must be non-empty; the account for each flush is chosen
    /// at random.
    pub fn new(
        spec: SchemaSpec,
        base_container: impl Into<String>,
        capacity: usize,
        compression: Compression,
        accounts: Vec<Arc<dyn BlobStore>>,
        notifier: Notifier,
    ) -> Self {
        assert!(!accounts.is_empty(), "schema sink requires at least one blob account");

        Self {
            spec,
            base_container: base_container.into(),
            compression,
            accounts,
            notifier,
            state: Mutex::new(SinkState {
                buffer: FlushBuffer::new(capacity),
            }),
            counters: SinkCounters::default(),
        }
    }

    /// Schema identity of this sink
    #[inline]
    pub fn spec(&self) -> &SchemaSpec {
        &self.spec
    }

    /// Stats counters for the processor's batch-stats record
    #[inline]
    pub fn counters(&self) -> &SinkCounters {
        &self.counters
    }

    /// Timestamp of the oldest buffered record
    pub async fn oldest_buffered(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.buffer.oldest()
    }

    /// Records appended over the sink's lifetime
    pub async fn events_total(&self) -> u64 {
        self.state.lock().await.buffer.events_total()
    }

    /// Append one encoded record
    ///
    /// Returns `true` when the append triggered a flush of the previously
    /// buffered records. Records larger than the whole buffer are dropped
    /// with an error log and never trigger a flush.
    pub async fn append(
        &self,
        record: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<bool, OpenSchemaError> {
        let bytes = record.as_bytes();
        let mut state = self.state.lock().await;

        if bytes.len() > state.buffer.capacity() {
            error!(
                schema = %self.spec.name,
                bytes = bytes.len(),
                capacity = state.buffer.capacity(),
                prefix = byte_prefix(record, OVERSIZE_LOG_PREFIX),
                "record exceeds buffer capacity, dropping"
            );
            self.counters.oversize_drops.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }

        if state.buffer.fits(bytes.len()) {
            state.buffer.write(bytes, timestamp);
            return Ok(false);
        }

        self.flush_locked(&mut state, true).await?;
        state.buffer.write(bytes, timestamp);
        Ok(true)
    }

    /// Flush the buffer regardless of fill level
    ///
    /// A no-op on an empty buffer: no upload, no notification.
    pub async fn flush_now(&self) -> Result<(), OpenSchemaError> {
        let mut state = self.state.lock().await;
        if state.buffer.is_empty() {
            return Ok(());
        }
        self.flush_locked(&mut state, true).await
    }

    /// Upload the buffered range and announce the blob
    ///
    /// Runs while holding the appender lock. The buffer is reset only
    /// after a successful upload (and only when `reset` is set), so every
    /// failure path leaves it intact for a re-flush.
    async fn flush_locked(&self, state: &mut SinkState, reset: bool) -> Result<(), OpenSchemaError> {
        let payload: Cow<'_, [u8]> = match self.compression {
            Compression::None => Cow::Borrowed(state.buffer.as_slice()),
            Compression::Gzip => {
                Cow::Owned(gzip(state.buffer.as_slice()).map_err(OpenSchemaError::Compression)?)
            }
            #[cfg(test)]
            Compression::Failing => {
                return Err(OpenSchemaError::Compression(std::io::Error::other(
                    "injected compression failure",
                )));
            }
        };

        let events = state.buffer.events();
        let raw_bytes = state.buffer.len();

        let mut attempts = 0u32;
        let mut retry_target: Option<(Arc<dyn BlobStore>, BlobTarget)> = None;
        let (account, target) = loop {
            if attempts >= MAX_BLOB_WRITE_ATTEMPTS {
                self.counters.write_errors.fetch_add(1, Ordering::Relaxed);
                return Err(OpenSchemaError::FlushExhausted { attempts });
            }
            attempts += 1;

            let (account, target) = match retry_target.take() {
                Some(pair) => pair,
                None => {
                    let account = self.pick_account();
                    let target = BlobTarget::new(
                        &self.base_container,
                        &self.spec.name,
                        self.compression.extension(),
                        Utc::now(),
                    );
                    (account, target)
                }
            };

            match account.put_blob(&target.container, &target.blob, &payload).await {
                Ok(()) => break (account, target),
                Err(BlobError::ContainerNotFound { .. }) => {
                    debug!(
                        account = %account.account(),
                        container = %target.container,
                        "container missing, creating"
                    );
                    match account.create_container(&target.container).await {
                        // Retry the same target on the next pass
                        Ok(()) => retry_target = Some((account, target)),
                        Err(e) => warn!(
                            account = %account.account(),
                            container = %target.container,
                            error = %e,
                            "container create failed, reselecting"
                        ),
                    }
                }
                Err(e) => {
                    warn!(
                        account = %account.account(),
                        container = %target.container,
                        attempt = attempts,
                        max_attempts = MAX_BLOB_WRITE_ATTEMPTS,
                        error = %e,
                        "blob upload failed, reselecting"
                    );
                }
            }
        };

        self.counters.blobs_written.fetch_add(1, Ordering::Relaxed);
        self.counters
            .blob_bytes
            .fetch_add(payload.len() as u64, Ordering::Relaxed);

        info!(
            schema = %self.spec.name,
            account = %account.account(),
            blob = %target.blob,
            events,
            raw_bytes,
            blob_bytes = payload.len(),
            "flushed buffer to blob"
        );

        match account.read_sas_uri(&target.container, &target.blob, SAS_READ_TTL) {
            Ok(sas_uri) => {
                if let Err(e) = self.notifier.announce(self.spec.schema_id, &sas_uri).await {
                    // The blob is durable; the analytics service can backfill
                    error!(
                        schema = %self.spec.name,
                        blob = %target.blob,
                        error = %e,
                        "blob notification abandoned"
                    );
                    self.counters.notify_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => {
                error!(schema = %self.spec.name, error = %e, "failed to mint read sas uri");
                self.counters.notify_failures.fetch_add(1, Ordering::Relaxed);
            }
        }

        if reset {
            state.buffer.reset();
        }
        Ok(())
    }

    fn pick_account(&self) -> Arc<dyn BlobStore> {
        let index = rand::thread_rng().gen_range(0..self.accounts.len());
        Arc::clone(&self.accounts[index])
    }
}

/// Gzip a byte range into a scratch allocation
fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(data.len() / 2),
        flate2::Compression::default(),
    );
    encoder.write_all(data)?;
    encoder.finish()
}

/// Longest prefix of `s` that fits in `max` bytes on a char boundary
fn byte_prefix(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
