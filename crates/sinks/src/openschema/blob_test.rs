//! Tests for blob account clients and target naming

use std::time::Duration;

use chrono::{TimeZone, Utc};
use md5::{Digest, Md5};

use super::blob::{AzureBlobStore, BlobError, BlobStore, BlobTarget, MemoryBlobStore};

// =============================================================================
// Target naming
// =============================================================================

#[test]
fn test_container_name_shape() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 45).unwrap();
    let target = BlobTarget::new("siphonrecords", "Log", "json", now);

    let expected_prefix = {
        let digest = Md5::digest(b"2024-06-01-10");
        format!("{digest:x}")[..5].to_string()
    };
    assert_eq!(
        target.container,
        format!("{expected_prefix}-siphonrecords-2024-06-01-10")
    );
}

#[test]
fn test_blob_name_shape() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 45).unwrap();
    let target = BlobTarget::new("siphonrecords", "Log", "json.gz", now);

    assert!(target.blob.ends_with("_2024-06-01-10-30-45_Log.json.gz"));
    // Leading component is a fresh UUID
    let uuid_part = target.blob.split('_').next().unwrap();
    assert!(uuid::Uuid::parse_str(uuid_part).is_ok());
}

#[test]
fn test_targets_within_one_hour_share_a_container() {
    let a = BlobTarget::new(
        "base",
        "Log",
        "json",
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 1).unwrap(),
    );
    let b = BlobTarget::new(
        "base",
        "Log",
        "json",
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 59, 59).unwrap(),
    );

    assert_eq!(a.container, b.container);
    assert_ne!(a.blob, b.blob);
}

// =============================================================================
// Connection strings
// =============================================================================

#[test]
fn test_parse_connection_string() {
    let store = AzureBlobStore::from_connection_string(
        "DefaultEndpointsProtocol=https;AccountName=acct1;AccountKey=a2V5;EndpointSuffix=core.windows.net",
        reqwest::Client::new(),
    )
    .unwrap();

    assert_eq!(store.account(), "acct1");
}

#[test]
fn test_parse_connection_string_endpoint_override() {
    let store = AzureBlobStore::from_connection_string(
        "AccountName=acct1;AccountKey=a2V5;BlobEndpoint=http://localhost:10000/acct1/",
        reqwest::Client::new(),
    )
    .unwrap();

    let uri = store
        .read_sas_uri("container", "blob.json", Duration::from_secs(60))
        .unwrap();
    assert!(uri.starts_with("http://localhost:10000/acct1/container/blob.json?"));
}

#[test]
fn test_parse_rejects_missing_account_name() {
    let err = AzureBlobStore::from_connection_string("AccountKey=a2V5", reqwest::Client::new())
        .unwrap_err();
    assert!(matches!(err, BlobError::Credentials(_)));
}

#[test]
fn test_parse_rejects_bad_base64_key() {
    let err = AzureBlobStore::from_connection_string(
        "AccountName=a;AccountKey=%%%",
        reqwest::Client::new(),
    )
    .unwrap_err();
    assert!(matches!(err, BlobError::Credentials(_)));
}

#[test]
fn test_read_sas_uri_carries_read_permission() {
    let store = AzureBlobStore::from_connection_string(
        "AccountName=acct1;AccountKey=a2V5",
        reqwest::Client::new(),
    )
    .unwrap();

    let uri = store
        .read_sas_uri("c", "b.json", Duration::from_secs(24 * 3600))
        .unwrap();

    assert!(uri.contains("sp=r"));
    assert!(uri.contains("sr=b"));
    assert!(uri.contains("sig="));
    assert!(uri.contains("se="));
}

// =============================================================================
// In-memory store
// =============================================================================

#[tokio::test]
async fn test_memory_store_requires_container() {
    let store = MemoryBlobStore::new("mem1");

    let err = store.put_blob("c1", "b1", b"data").await.unwrap_err();
    assert!(matches!(err, BlobError::ContainerNotFound { .. }));

    store.create_container("c1").await.unwrap();
    store.put_blob("c1", "b1", b"data").await.unwrap();

    assert_eq!(store.blob_count(), 1);
    assert_eq!(store.total_bytes(), 4);
}

#[tokio::test]
async fn test_memory_store_failure_injection() {
    let store = MemoryBlobStore::new("mem1");
    store.create_container("c1").await.unwrap();
    store.fail_next_puts(2);

    assert!(store.put_blob("c1", "b1", b"x").await.is_err());
    assert!(store.put_blob("c1", "b2", b"x").await.is_err());
    assert!(store.put_blob("c1", "b3", b"x").await.is_ok());
}
