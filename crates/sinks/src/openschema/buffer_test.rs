//! Tests for the flush buffer

use chrono::{Duration, TimeZone, Utc};

use super::buffer::FlushBuffer;

fn ts(offset_secs: i64) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap() + Duration::seconds(offset_secs)
}

// =============================================================================
// Write and separator accounting
// =============================================================================

#[test]
fn test_first_record_has_no_separator() {
    let mut buffer = FlushBuffer::new(64);
    buffer.write(b"abc", ts(0));

    assert_eq!(buffer.as_slice(), b"abc");
    assert_eq!(buffer.len(), 3);
    assert_eq!(buffer.events(), 1);
}

#[test]
fn test_subsequent_records_are_crlf_separated() {
    let mut buffer = FlushBuffer::new(64);
    buffer.write(b"abc", ts(0));
    buffer.write(b"def", ts(1));
    buffer.write(b"gh", ts(2));

    assert_eq!(buffer.as_slice(), b"abc\r\ndef\r\ngh");
    // 8 record bytes + 2 separators of 2 bytes
    assert_eq!(buffer.len(), 8 + 4);
    assert_eq!(buffer.events(), 3);
}

#[test]
fn test_fits_accounts_for_separator() {
    let mut buffer = FlushBuffer::new(10);

    // Empty buffer: a 10-byte record fits exactly
    assert!(buffer.fits(10));
    assert!(!buffer.fits(11));

    buffer.write(b"abcd", ts(0));
    // 4 used; 4 + 2 (separator) + 4 = 10 fits
    assert!(buffer.fits(4));
    // 4 + 2 + 5 = 11 does not
    assert!(!buffer.fits(5));
}

// =============================================================================
// Reset and totals
// =============================================================================

#[test]
fn test_reset_clears_fill_but_keeps_lifetime_total() {
    let mut buffer = FlushBuffer::new(64);
    buffer.write(b"abc", ts(0));
    buffer.write(b"def", ts(1));
    buffer.reset();

    assert!(buffer.is_empty());
    assert_eq!(buffer.events(), 0);
    assert_eq!(buffer.oldest(), None);
    assert_eq!(buffer.events_total(), 2);

    buffer.write(b"xyz", ts(5));
    assert_eq!(buffer.as_slice(), b"xyz");
    assert_eq!(buffer.events_total(), 3);
}

#[test]
fn test_oldest_tracks_minimum_timestamp() {
    let mut buffer = FlushBuffer::new(64);
    buffer.write(b"a", ts(10));
    buffer.write(b"b", ts(3));
    buffer.write(b"c", ts(7));

    assert_eq!(buffer.oldest(), Some(ts(3)));
}
