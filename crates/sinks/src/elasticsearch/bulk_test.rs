//! Tests for bulk framing

use std::collections::HashSet;

use chrono::{TimeZone, Utc};

use siphon_protocol::{BulkItem, IndexFamily};

use super::bulk::BulkFrame;

fn item(doc_id: &str, body: &str) -> BulkItem {
    let ts = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
    BulkItem::new(IndexFamily::Logstash, "logevent", doc_id, ts, ts, body)
}

// =============================================================================
// Wire format
// =============================================================================

#[test]
fn test_single_item_frames_to_action_and_body() {
    let mut frame = BulkFrame::new();
    frame.push(&item("id-1", r#"{"message":"hello"}"#));

    let body = frame.body();
    assert_eq!(
        body,
        "{\"index\":{\"_index\":\"logstash-2024.06.01\",\"_type\":\"logevent\",\"_id\":\"id-1\"}}\n{\"message\":\"hello\"}\n"
    );
}

#[test]
fn test_exactly_one_newline_between_action_and_body() {
    let mut frame = BulkFrame::new();
    frame.push(&item("id-1", r#"{"a":1}"#));

    let body = frame.body();
    // Two lines per doc plus the mandatory trailing newline
    assert_eq!(body.matches('\n').count(), 2);
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with(r#"{"index":"#));
    assert_eq!(lines[1], r#"{"a":1}"#);
}

#[test]
fn test_multiple_items_preserve_order() {
    let mut frame = BulkFrame::new();
    frame.push(&item("a", r#"{"n":1}"#));
    frame.push(&item("b", r#"{"n":2}"#));
    frame.push(&item("c", r#"{"n":3}"#));

    let body = frame.body();
    let ids: Vec<usize> = ["\"_id\":\"a\"", "\"_id\":\"b\"", "\"_id\":\"c\""]
        .iter()
        .map(|needle| body.find(needle).unwrap())
        .collect();
    assert!(ids[0] < ids[1] && ids[1] < ids[2]);
    assert_eq!(frame.len(), 3);
}

#[test]
fn test_action_line_escapes_doc_id() {
    let mut frame = BulkFrame::new();
    frame.push(&item(r#"we"ird"#, "{}"));

    let body = frame.body();
    assert!(body.contains(r#""_id":"we\"ird""#));
}

#[test]
fn test_empty_frame_renders_empty_body() {
    let frame = BulkFrame::new();
    assert!(frame.is_empty());
    assert!(frame.body().is_empty());
}

// =============================================================================
// Lookup and subsetting
// =============================================================================

#[test]
fn test_get_by_doc_id() {
    let mut frame = BulkFrame::new();
    frame.push(&item("a", r#"{"n":1}"#));
    frame.push(&item("b", r#"{"n":2}"#));

    let doc = frame.get("b").unwrap();
    assert_eq!(doc.body, r#"{"n":2}"#);
    assert!(frame.get("missing").is_none());
}

#[test]
fn test_subset_preserves_original_order() {
    let mut frame = BulkFrame::new();
    for id in ["a", "b", "c", "d"] {
        frame.push(&item(id, &format!(r#"{{"id":"{id}"}}"#)));
    }

    // Request in reverse order; the subset must keep frame order
    let ids: HashSet<String> = ["d", "b"].iter().map(|s| s.to_string()).collect();
    let subset = frame.subset(&ids);

    assert_eq!(subset.len(), 2);
    let body = subset.body();
    assert!(body.find("\"_id\":\"b\"").unwrap() < body.find("\"_id\":\"d\"").unwrap());
}

#[test]
fn test_subset_ignores_unknown_ids() {
    let mut frame = BulkFrame::new();
    frame.push(&item("a", "{}"));

    let ids: HashSet<String> = ["a", "zz"].iter().map(|s| s.to_string()).collect();
    assert_eq!(frame.subset(&ids).len(), 1);
}
