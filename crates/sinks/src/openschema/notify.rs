//! Blob notification callback
//!
//! After every successful upload the analytics service is told where the
//! blob lives via a small JSON POST carrying a read-SAS URI. Delivery is
//! retried with exponential backoff; exhausting the retries is logged but
//! never fails the flush - the blob is already durable and the service can
//! backfill.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use super::MAX_NOTIFY_ATTEMPTS;

/// Envelope name expected by the ingestion endpoint
const ENVELOPE_NAME: &str = "Microsoft.ApplicationInsights.OpenSchema";

/// Initial retry delay
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Retry delay cap
const RETRY_MAX_DELAY: Duration = Duration::from_millis(5000);

/// Errors from the notification path
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Send failure or non-2xx response
    #[error("notification post failed: {0}")]
    Post(String),
}

/// Notification envelope, version 1
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEnvelope {
    ver: &'static str,
    name: &'static str,
    time: String,
    #[serde(rename = "iKey")]
    instrumentation_key: String,
    data: EnvelopeData,
}

#[derive(Debug, Clone, Serialize)]
struct EnvelopeData {
    #[serde(rename = "baseType")]
    base_type: &'static str,
    #[serde(rename = "baseData")]
    base_data: BaseData,
}

#[derive(Debug, Clone, Serialize)]
struct BaseData {
    ver: &'static str,
    #[serde(rename = "blobSasUri")]
    blob_sas_uri: String,
    #[serde(rename = "sourceName")]
    source_name: String,
    #[serde(rename = "sourceVersion")]
    source_version: &'static str,
}

impl NotificationEnvelope {
    /// Build the envelope announcing one blob
    pub fn new(
        instrumentation_key: &str,
        schema_id: Uuid,
        blob_sas_uri: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            ver: "1",
            name: ENVELOPE_NAME,
            time: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            instrumentation_key: instrumentation_key.to_string(),
            data: EnvelopeData {
                base_type: "OpenSchemaData",
                base_data: BaseData {
                    ver: "2",
                    blob_sas_uri: blob_sas_uri.to_string(),
                    source_name: schema_id.to_string(),
                    source_version: "1.0",
                },
            },
        }
    }

    /// The announced SAS URI (for tests and logging)
    pub fn blob_sas_uri(&self) -> &str {
        &self.data.base_data.blob_sas_uri
    }

    /// The announced source name (the schema id as a string)
    pub fn source_name(&self) -> &str {
        &self.data.base_data.source_name
    }
}

/// One delivery attempt, implemented by the HTTP sender and test doubles
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Deliver one envelope
    async fn send(&self, envelope: &NotificationEnvelope) -> Result<(), NotifyError>;
}

/// HTTP sender POSTing envelopes to the ingestion endpoint
#[derive(Debug)]
pub struct HttpNotificationSender {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpNotificationSender {
    /// Create a sender for the given endpoint
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl NotificationSender for HttpNotificationSender {
    async fn send(&self, envelope: &NotificationEnvelope) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(envelope)
            .send()
            .await
            .map_err(|e| NotifyError::Post(format!("send failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Post(format!("http status {status}")))
        }
    }
}

/// In-memory sender recording envelopes, with failure injection
#[derive(Debug, Default)]
pub struct MemoryNotificationSender {
    sent: Mutex<Vec<NotificationEnvelope>>,
    fail_next: AtomicU32,
}

impl MemoryNotificationSender {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` sends fail
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Envelopes delivered so far
    pub fn sent(&self) -> Vec<NotificationEnvelope> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl NotificationSender for MemoryNotificationSender {
    async fn send(&self, envelope: &NotificationEnvelope) -> Result<(), NotifyError> {
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(NotifyError::Post("injected failure".into()));
        }
        self.sent.lock().push(envelope.clone());
        Ok(())
    }
}

/// Retry wrapper around a sender
///
/// Owns the instrumentation key so sinks only hand over the schema id and
/// SAS URI.
#[derive(Clone)]
pub struct Notifier {
    sender: Arc<dyn NotificationSender>,
    instrumentation_key: String,
}

impl Notifier {
    /// Create a notifier over the given sender
    pub fn new(sender: Arc<dyn NotificationSender>, instrumentation_key: impl Into<String>) -> Self {
        Self {
            sender,
            instrumentation_key: instrumentation_key.into(),
        }
    }

    /// Announce one uploaded blob, retrying with exponential backoff
    ///
    /// Returns `Err` only after all attempts are exhausted.
    pub async fn announce(&self, schema_id: Uuid, blob_sas_uri: &str) -> Result<(), NotifyError> {
        let envelope =
            NotificationEnvelope::new(&self.instrumentation_key, schema_id, blob_sas_uri, Utc::now());

        let mut delay = RETRY_BASE_DELAY;
        let mut last_error = None;

        for attempt in 1..=MAX_NOTIFY_ATTEMPTS {
            if attempt > 1 {
                sleep(delay).await;
                delay = (delay * 2).min(RETRY_MAX_DELAY);
            }

            match self.sender.send(&envelope).await {
                Ok(()) => {
                    debug!(source = %envelope.source_name(), attempt, "blob notification delivered");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        source = %envelope.source_name(),
                        attempt,
                        max_attempts = MAX_NOTIFY_ATTEMPTS,
                        error = %e,
                        "blob notification failed, will retry"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| NotifyError::Post("no attempts made".into())))
    }
}
