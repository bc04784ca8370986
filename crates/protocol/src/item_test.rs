//! Tests for index routing and abandoned-doc records

use chrono::{TimeZone, Utc};

use crate::item::{AbandonedDoc, IndexFamily};

// =============================================================================
// Index name resolution
// =============================================================================

#[test]
fn test_time_partitioned_index_names() {
    let ts = Utc.with_ymd_and_hms(2024, 12, 3, 23, 59, 59).unwrap();

    assert_eq!(IndexFamily::Logstash.index_name(ts), "logstash-2024.12.03");
    assert_eq!(
        IndexFamily::RoboInteractions.index_name(ts),
        "robointeractions-2024.12.03"
    );
    assert_eq!(
        IndexFamily::ExternalTelemetry.index_name(ts),
        "externaltelemetry-2024.12.03"
    );
    assert_eq!(
        IndexFamily::IngestionStats.index_name(ts),
        "ingestionstats-2024.12.03"
    );
    assert_eq!(
        IndexFamily::AbandonedDocs.index_name(ts),
        "abandoneddocs-2024.12.03"
    );
}

#[test]
fn test_azure_resources_is_flat() {
    let ts = Utc.with_ymd_and_hms(2024, 12, 3, 0, 0, 0).unwrap();

    assert!(!IndexFamily::AzureResources.time_partitioned());
    assert_eq!(IndexFamily::AzureResources.index_name(ts), "azure-resources");
}

// =============================================================================
// Abandoned docs
// =============================================================================

#[test]
fn test_abandoned_doc_routing() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
    let item = AbandonedDoc::build("doc-9".to_string(), "body text", "mapper_parsing", now);

    assert_eq!(item.index_base, IndexFamily::AbandonedDocs);
    assert_eq!(item.index_name, "abandoneddocs-2024.06.01");
    assert_eq!(item.doc_type, "abandoneddocinfo");
    assert_eq!(item.doc_id, "doc-9");
}

#[test]
fn test_abandoned_doc_body_fields() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
    let item = AbandonedDoc::build("doc-9".to_string(), "body text", "mapper_parsing", now);

    let body: serde_json::Value = serde_json::from_str(&item.body).unwrap();
    assert_eq!(body["docId"], "doc-9");
    assert_eq!(body["docContent"], "body text");
    assert_eq!(body["lastError"], "mapper_parsing");
    assert_eq!(body["timestamp"], "2024-06-01T08:00:00.000Z");
}

#[test]
fn test_abandoned_doc_truncates_content() {
    let now = Utc::now();
    let long_body: String = "x".repeat(5000);
    let item = AbandonedDoc::build("doc-long".to_string(), &long_body, "too big", now);

    let body: serde_json::Value = serde_json::from_str(&item.body).unwrap();
    assert_eq!(body["docContent"].as_str().unwrap().len(), 1024);
}

#[test]
fn test_abandoned_doc_body_is_single_line() {
    let now = Utc::now();
    let item = AbandonedDoc::build("doc-9".to_string(), "line", "err", now);

    assert!(!item.body.contains('\n'));
}
