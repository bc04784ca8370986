//! Tests for bulk response parsing and outcome classification

use super::client::{BulkResponse, SubmitOutcome};

// =============================================================================
// Response parsing
// =============================================================================

#[test]
fn test_parse_success_response_without_errors() {
    let raw = r#"{
        "took": 12,
        "errors": false,
        "items": [
            {"index": {"_index": "logstash-2024.06.01", "_id": "a", "status": 201}}
        ]
    }"#;

    let response: BulkResponse = serde_json::from_str(raw).unwrap();
    assert!(!response.errors);
    assert_eq!(response.took, 12);
    assert_eq!(response.items.len(), 1);
    assert_eq!(response.failed_items().count(), 0);
}

#[test]
fn test_parse_response_with_item_errors() {
    let raw = r#"{
        "took": 3,
        "errors": true,
        "items": [
            {"index": {"_index": "logstash-2024.06.01", "_id": "ok", "status": 201}},
            {"index": {"_index": "logstash-2024.06.01", "_id": "bad", "status": 400,
                       "error": {"type": "mapper_parsing_exception", "reason": "failed to parse"}}}
        ]
    }"#;

    let response: BulkResponse = serde_json::from_str(raw).unwrap();
    assert!(response.errors);

    let failed: Vec<_> = response.failed_items().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, "bad");
    assert_eq!(
        failed[0].error_text(),
        "mapper_parsing_exception: failed to parse"
    );
}

#[test]
fn test_status_only_rejection_counts_as_error() {
    let raw = r#"{
        "errors": true,
        "items": [{"index": {"_id": "x", "status": 429}}]
    }"#;

    let response: BulkResponse = serde_json::from_str(raw).unwrap();
    let failed: Vec<_> = response.failed_items().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error_text(), "status 429");
}

#[test]
fn test_parse_create_action_key() {
    let raw = r#"{
        "errors": false,
        "items": [{"create": {"_id": "y", "status": 201}}]
    }"#;

    let response: BulkResponse = serde_json::from_str(raw).unwrap();
    assert_eq!(response.items[0].index.id, "y");
}

// =============================================================================
// Outcome classification
// =============================================================================

#[test]
fn test_accepted_requires_no_item_errors() {
    let clean: BulkResponse = serde_json::from_str(r#"{"errors": false, "items": []}"#).unwrap();
    let dirty: BulkResponse = serde_json::from_str(r#"{"errors": true, "items": []}"#).unwrap();

    assert!(SubmitOutcome::Success(clean).accepted());
    assert!(!SubmitOutcome::Success(dirty).accepted());
}

#[test]
fn test_transport_ok_classification() {
    let success: BulkResponse = serde_json::from_str(r#"{"errors": false}"#).unwrap();

    assert!(SubmitOutcome::Success(success).transport_ok());
    assert!(SubmitOutcome::ServerError {
        status: 400,
        error: Default::default()
    }
    .transport_ok());
    assert!(!SubmitOutcome::TransportFailed {
        reason: "http status 502".into()
    }
    .transport_ok());
}
