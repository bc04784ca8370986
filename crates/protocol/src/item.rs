//! Classified, index-routed items
//!
//! A `BulkItem` is the normalized in-pipeline form of one event: routed to
//! an index family, carrying a single-line UTF-8 body. An `InvalidItem` is
//! the same shape minus routing, plus the reason classification failed.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::ABANDONED_CONTENT_CHARS;

/// The closed set of index destinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFamily {
    /// Serilog application log events
    Logstash,

    /// Robot interaction telemetry
    RoboInteractions,

    /// Third-party telemetry payloads
    ExternalTelemetry,

    /// Azure resource metadata (flat index, no date suffix)
    AzureResources,

    /// Pipeline self-instrumentation documents
    IngestionStats,

    /// Quarantined documents that exhausted delivery retries
    AbandonedDocs,
}

impl IndexFamily {
    /// The stable index family name
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexFamily::Logstash => "logstash",
            IndexFamily::RoboInteractions => "robointeractions",
            IndexFamily::ExternalTelemetry => "externaltelemetry",
            IndexFamily::AzureResources => "azure-resources",
            IndexFamily::IngestionStats => "ingestionstats",
            IndexFamily::AbandonedDocs => "abandoneddocs",
        }
    }

    /// Whether destinations in this family carry a UTC date suffix
    pub fn time_partitioned(&self) -> bool {
        !matches!(self, IndexFamily::AzureResources)
    }

    /// Resolve the destination index name for a record timestamp
    ///
    /// Time-partitioned families append `-YYYY.MM.DD` in UTC; flat families
    /// resolve to the bare family name.
    pub fn index_name(&self, timestamp: DateTime<Utc>) -> String {
        if self.time_partitioned() {
            format!("{}-{}", self.as_str(), timestamp.format("%Y.%m.%d"))
        } else {
            self.as_str().to_string()
        }
    }
}

impl std::fmt::Display for IndexFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One valid, index-routed document
#[derive(Debug, Clone)]
pub struct BulkItem {
    /// Index family this document belongs to
    pub index_base: IndexFamily,

    /// Resolved destination index name
    pub index_name: String,

    /// Within-family document type discriminator
    pub doc_type: String,

    /// Unique document identifier (supplied or freshly generated)
    pub doc_id: String,

    /// Logical record time
    pub timestamp: DateTime<Utc>,

    /// Broker-assigned enqueue time, preserved from the raw event
    pub enqueue_time: DateTime<Utc>,

    /// Single-line UTF-8 document body (no `\n` bytes)
    pub body: String,
}

impl BulkItem {
    /// Create an item routed into the given family
    ///
    /// The destination index name is resolved from the family and timestamp.
    pub fn new(
        index_base: IndexFamily,
        doc_type: impl Into<String>,
        doc_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        enqueue_time: DateTime<Utc>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            index_base,
            index_name: index_base.index_name(timestamp),
            doc_type: doc_type.into(),
            doc_id: doc_id.into(),
            timestamp,
            enqueue_time,
            body: body.into(),
        }
    }
}

/// One event that could not become a valid `BulkItem`
///
/// Invalid items never enter the normal delivery path; they are wrapped as
/// abandoned docs and quarantined directly.
#[derive(Debug, Clone)]
pub struct InvalidItem {
    /// Document identifier (supplied or freshly generated)
    pub doc_id: String,

    /// Logical record time, as far as it could be determined
    pub timestamp: DateTime<Utc>,

    /// Broker-assigned enqueue time
    pub enqueue_time: DateTime<Utc>,

    /// Body text (lossily decoded when the raw bytes were not UTF-8)
    pub body: String,

    /// Why classification rejected the event
    pub reason: String,
}

/// Body payload of an abandoned-doc record
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbandonedDoc {
    /// Identifier of the document that failed delivery
    pub doc_id: String,

    /// Leading characters of the original body
    pub doc_content: String,

    /// Last error observed for the document
    pub last_error: String,

    /// When the document was abandoned
    pub timestamp: String,
}

impl AbandonedDoc {
    /// Build the quarantine item for a failed document
    ///
    /// The original body is truncated to its first 1024 characters.
    pub fn build(
        doc_id: String,
        original_body: &str,
        last_error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> BulkItem {
        let doc = AbandonedDoc {
            doc_id: doc_id.clone(),
            doc_content: original_body.chars().take(ABANDONED_CONTENT_CHARS).collect(),
            last_error: last_error.into(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        // Serialization of a flat string struct cannot fail
        let body = serde_json::to_string(&doc).unwrap_or_default();

        BulkItem::new(
            IndexFamily::AbandonedDocs,
            "abandoneddocinfo",
            doc_id,
            now,
            now,
            body,
        )
    }
}
