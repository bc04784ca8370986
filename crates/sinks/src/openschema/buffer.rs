//! Fixed-capacity record buffer
//!
//! Holds line-delimited records between flushes. Records are separated by
//! `\r\n`; the first record in a fresh buffer carries no separator, so the
//! uploaded payload is exactly the records plus one separator per
//! subsequent record.

use chrono::{DateTime, Utc};

/// Record separator on the wire
pub(crate) const SEPARATOR: &[u8] = b"\r\n";

/// Append-only byte buffer with event accounting
#[derive(Debug)]
pub struct FlushBuffer {
    data: Vec<u8>,
    capacity: usize,
    events: u64,
    events_total: u64,
    oldest: Option<DateTime<Utc>>,
}

impl FlushBuffer {
    /// Create a buffer with the given byte capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            events: 0,
            events_total: 0,
            oldest: None,
        }
    }

    /// Byte capacity of the buffer
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently buffered
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer holds no records
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Records written since the last reset
    #[inline]
    pub fn events(&self) -> u64 {
        self.events
    }

    /// Records written over the buffer's lifetime
    #[inline]
    pub fn events_total(&self) -> u64 {
        self.events_total
    }

    /// Timestamp of the oldest record since the last reset
    #[inline]
    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.oldest
    }

    /// Whether a record of `len` bytes fits without a flush
    ///
    /// Accounts for the separator that precedes every record after the
    /// first.
    pub fn fits(&self, len: usize) -> bool {
        self.data.len() + len + self.separator_len() <= self.capacity
    }

    /// Append one record
    ///
    /// The caller checks `fits` first; writing past capacity is a logic
    /// error the buffer does not guard against.
    pub fn write(&mut self, record: &[u8], timestamp: DateTime<Utc>) {
        if !self.data.is_empty() {
            self.data.extend_from_slice(SEPARATOR);
        }
        self.data.extend_from_slice(record);
        self.events += 1;
        self.events_total += 1;
        self.oldest = Some(match self.oldest {
            Some(current) => current.min(timestamp),
            None => timestamp,
        });
    }

    /// The buffered payload
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Clear the buffer for the next fill
    ///
    /// Lifetime totals survive; per-fill counters and the oldest-record
    /// stamp do not.
    pub fn reset(&mut self) {
        self.data.clear();
        self.events = 0;
        self.oldest = None;
    }

    fn separator_len(&self) -> usize {
        if self.data.is_empty() {
            0
        } else {
            SEPARATOR.len()
        }
    }
}
