//! Blob account clients
//!
//! `BlobStore` abstracts one storage account: upload a blob, create a
//! container, mint a read-SAS URI. The HTTP implementation speaks the
//! Azure blob REST surface with service-SAS authentication derived from
//! the account key; the in-memory implementation backs tests and local
//! runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use parking_lot::Mutex;
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

/// SAS protocol version emitted in signed URIs
const SAS_VERSION: &str = "2021-08-06";

/// Errors from a blob account client
#[derive(Debug, Error)]
pub enum BlobError {
    /// The target container does not exist (HTTP 404)
    #[error("container '{container}' not found")]
    ContainerNotFound {
        /// Missing container name
        container: String,
    },

    /// Request-level failure (send error or unexpected status)
    #[error("blob request failed: {0}")]
    Request(String),

    /// Malformed account connection string
    #[error("invalid blob account credentials: {0}")]
    Credentials(String),
}

/// Upload destination for one flush
///
/// Container names shard by hour with a hash prefix so account listings
/// spread evenly; blob names carry a fresh UUID, the second-resolution
/// UTC time, and the schema name.
#[derive(Debug, Clone)]
pub struct BlobTarget {
    /// Destination container
    pub container: String,

    /// Blob name within the container
    pub blob: String,
}

impl BlobTarget {
    /// Derive the target for a flush happening at `now`
    pub fn new(base_container: &str, schema_name: &str, extension: &str, now: DateTime<Utc>) -> Self {
        let date_key = now.format("%Y-%m-%d-%H").to_string();
        let digest = Md5::digest(date_key.as_bytes());
        let hex = format!("{digest:x}");

        Self {
            container: format!("{}-{}-{}", &hex[..5], base_container, date_key),
            blob: format!(
                "{}_{}_{}.{}",
                Uuid::new_v4(),
                now.format("%Y-%m-%d-%H-%M-%S"),
                schema_name,
                extension
            ),
        }
    }
}

/// One storage account
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Account name, for logging
    fn account(&self) -> &str;

    /// Upload a blob, failing with `ContainerNotFound` when the container
    /// does not exist yet
    async fn put_blob(&self, container: &str, blob: &str, payload: &[u8]) -> Result<(), BlobError>;

    /// Create a container (idempotent)
    async fn create_container(&self, container: &str) -> Result<(), BlobError>;

    /// Mint a read-only SAS URI for a blob, valid for `ttl`
    fn read_sas_uri(&self, container: &str, blob: &str, ttl: Duration) -> Result<String, BlobError>;
}

// =============================================================================
// Azure-style HTTP client
// =============================================================================

/// HTTP blob client authenticated with service SAS tokens
#[derive(Debug)]
pub struct AzureBlobStore {
    account_name: String,
    account_key: Vec<u8>,
    endpoint: String,
    http: reqwest::Client,
}

impl AzureBlobStore {
    /// Parse an `AccountName=...;AccountKey=...` connection string
    ///
    /// Recognized segments: `AccountName`, `AccountKey` (base64),
    /// `BlobEndpoint` (optional override), `EndpointSuffix` (optional,
    /// default `core.windows.net`). Unknown segments are ignored.
    pub fn from_connection_string(raw: &str, http: reqwest::Client) -> Result<Self, BlobError> {
        let mut account_name = None;
        let mut account_key = None;
        let mut blob_endpoint = None;
        let mut endpoint_suffix = "core.windows.net".to_string();

        for segment in raw.split(';').filter(|s| !s.trim().is_empty()) {
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| BlobError::Credentials(format!("segment '{segment}' has no '='")))?;
            match key.trim() {
                "AccountName" => account_name = Some(value.trim().to_string()),
                "AccountKey" => account_key = Some(value.trim().to_string()),
                "BlobEndpoint" => blob_endpoint = Some(value.trim().trim_end_matches('/').to_string()),
                "EndpointSuffix" => endpoint_suffix = value.trim().to_string(),
                _ => {}
            }
        }

        let account_name =
            account_name.ok_or_else(|| BlobError::Credentials("missing AccountName".into()))?;
        let raw_key =
            account_key.ok_or_else(|| BlobError::Credentials("missing AccountKey".into()))?;
        let account_key = BASE64
            .decode(raw_key.as_bytes())
            .map_err(|e| BlobError::Credentials(format!("AccountKey is not base64: {e}")))?;

        let endpoint = blob_endpoint
            .unwrap_or_else(|| format!("https://{account_name}.blob.{endpoint_suffix}"));

        Ok(Self {
            account_name,
            account_key,
            endpoint,
            http,
        })
    }

    fn blob_url(&self, container: &str, blob: &str) -> String {
        format!("{}/{}/{}", self.endpoint, container, blob)
    }

    /// Sign a service SAS over the canonicalized resource
    ///
    /// String-to-sign layout follows the 2020-12-06+ service SAS format.
    fn sign_sas(
        &self,
        resource: &str,
        signed_resource: &str,
        permissions: &str,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> String {
        let start = start.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let expiry = expiry.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let canonical = format!("/blob/{}/{}", self.account_name, resource);

        let string_to_sign = format!(
            "{permissions}\n{start}\n{expiry}\n{canonical}\n\n\nhttps\n{SAS_VERSION}\n{signed_resource}\n\n\n\n\n\n"
        );

        // The account key is validated base64 at construction; HMAC accepts
        // any key length.
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.account_key)
            .expect("hmac accepts any key length");
        mac.update(string_to_sign.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        format!(
            "sv={SAS_VERSION}&spr=https&st={}&se={}&sr={signed_resource}&sp={permissions}&sig={}",
            encode_query(&start),
            encode_query(&expiry),
            encode_query(&signature)
        )
    }

    fn write_sas(&self, container: &str, blob: &str) -> String {
        let now = Utc::now();
        self.sign_sas(
            &format!("{container}/{blob}"),
            "b",
            "cw",
            now - chrono::Duration::minutes(5),
            now + chrono::Duration::hours(1),
        )
    }

    fn container_sas(&self, container: &str) -> String {
        let now = Utc::now();
        self.sign_sas(
            container,
            "c",
            "c",
            now - chrono::Duration::minutes(5),
            now + chrono::Duration::hours(1),
        )
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    fn account(&self) -> &str {
        &self.account_name
    }

    async fn put_blob(&self, container: &str, blob: &str, payload: &[u8]) -> Result<(), BlobError> {
        let url = format!(
            "{}?{}",
            self.blob_url(container, blob),
            self.write_sas(container, blob)
        );

        let response = self
            .http
            .put(&url)
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-version", SAS_VERSION)
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| BlobError::Request(format!("put blob: {e}")))?;

        match response.status().as_u16() {
            201 => Ok(()),
            404 => Err(BlobError::ContainerNotFound {
                container: container.to_string(),
            }),
            status => Err(BlobError::Request(format!("put blob returned {status}"))),
        }
    }

    async fn create_container(&self, container: &str) -> Result<(), BlobError> {
        let url = format!(
            "{}/{}?restype=container&{}",
            self.endpoint,
            container,
            self.container_sas(container)
        );

        let response = self
            .http
            .put(&url)
            .header("x-ms-version", SAS_VERSION)
            .send()
            .await
            .map_err(|e| BlobError::Request(format!("create container: {e}")))?;

        match response.status().as_u16() {
            // 409 = already exists, which is fine - creation races with
            // other partitions writing into the same hour
            201 | 409 => Ok(()),
            status => Err(BlobError::Request(format!(
                "create container returned {status}"
            ))),
        }
    }

    fn read_sas_uri(&self, container: &str, blob: &str, ttl: Duration) -> Result<String, BlobError> {
        let now = Utc::now();
        let expiry = now
            + chrono::Duration::from_std(ttl)
                .map_err(|e| BlobError::Request(format!("sas ttl out of range: {e}")))?;
        let sas = self.sign_sas(
            &format!("{container}/{blob}"),
            "b",
            "r",
            now - chrono::Duration::minutes(5),
            expiry,
        );
        Ok(format!("{}?{}", self.blob_url(container, blob), sas))
    }
}

/// Percent-encode the characters base64 and timestamps put in query values
fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '+' => out.push_str("%2B"),
            '/' => out.push_str("%2F"),
            '=' => out.push_str("%3D"),
            ':' => out.push_str("%3A"),
            _ => out.push(c),
        }
    }
    out
}

// =============================================================================
// In-memory client
// =============================================================================

/// In-memory blob account for tests and local runs
///
/// Containers must be created before upload, mirroring the HTTP client's
/// 404 behavior. `fail_next_puts` injects upload failures.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    name: String,
    containers: Mutex<HashMap<String, HashMap<String, Vec<u8>>>>,
    fail_puts: AtomicU32,
}

impl MemoryBlobStore {
    /// Create an empty account
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            containers: Mutex::new(HashMap::new()),
            fail_puts: AtomicU32::new(0),
        }
    }

    /// Make the next `n` uploads fail with a request error
    pub fn fail_next_puts(&self, n: u32) {
        self.fail_puts.store(n, Ordering::SeqCst);
    }

    /// Number of blobs stored across all containers
    pub fn blob_count(&self) -> usize {
        self.containers.lock().values().map(|c| c.len()).sum()
    }

    /// Total stored payload bytes
    pub fn total_bytes(&self) -> usize {
        self.containers
            .lock()
            .values()
            .flat_map(|c| c.values())
            .map(|b| b.len())
            .sum()
    }

    /// Snapshot of `(container, blob, payload)` triples
    pub fn blobs(&self) -> Vec<(String, String, Vec<u8>)> {
        self.containers
            .lock()
            .iter()
            .flat_map(|(container, blobs)| {
                blobs
                    .iter()
                    .map(|(name, payload)| (container.clone(), name.clone(), payload.clone()))
            })
            .collect()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn account(&self) -> &str {
        &self.name
    }

    async fn put_blob(&self, container: &str, blob: &str, payload: &[u8]) -> Result<(), BlobError> {
        if self
            .fail_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BlobError::Request("injected failure".into()));
        }

        let mut containers = self.containers.lock();
        match containers.get_mut(container) {
            Some(blobs) => {
                blobs.insert(blob.to_string(), payload.to_vec());
                Ok(())
            }
            None => Err(BlobError::ContainerNotFound {
                container: container.to_string(),
            }),
        }
    }

    async fn create_container(&self, container: &str) -> Result<(), BlobError> {
        self.containers
            .lock()
            .entry(container.to_string())
            .or_default();
        Ok(())
    }

    fn read_sas_uri(&self, container: &str, blob: &str, _ttl: Duration) -> Result<String, BlobError> {
        Ok(format!(
            "memory://{}/{}/{}?sp=r",
            self.name, container, blob
        ))
    }
}
