//! Bulk submission client
//!
//! `submit` sends one framed body and classifies what came back:
//!
//! - `TransportFailed` - the request never produced a usable answer (send
//!   error, gateway-level status, unparseable payload). Always retryable.
//! - `Success` - HTTP 2xx with a parsed per-item response. The batch may
//!   still carry per-item errors; extracting and retrying those is the
//!   caller's job.
//! - `ServerError` - a non-2xx with a structured error envelope. The
//!   cluster understood the request and rejected it; not retried here.
//!
//! This client performs no retries and holds no buffer.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, trace};

use super::{ElasticsearchConfig, ElasticsearchError, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};

/// Outcome of one bulk submission
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// HTTP 2xx with a parsed bulk response
    Success(BulkResponse),

    /// Structured rejection from the cluster (4xx/5xx with an error envelope)
    ServerError {
        /// HTTP status code
        status: u16,
        /// Parsed error envelope
        error: BulkError,
    },

    /// Send failure, gateway-level status, or unparseable response
    TransportFailed {
        /// Human-readable failure description
        reason: String,
    },
}

impl SubmitOutcome {
    /// Whether the request reached the cluster and produced a structured answer
    #[inline]
    pub fn transport_ok(&self) -> bool {
        !matches!(self, SubmitOutcome::TransportFailed { .. })
    }

    /// Whether every document in the batch was accepted
    #[inline]
    pub fn accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Success(response) if !response.errors)
    }
}

/// Parsed `/_bulk` response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct BulkResponse {
    /// Server-side processing time in milliseconds
    #[serde(default)]
    pub took: u64,

    /// Whether any item in the batch carries an error
    #[serde(default)]
    pub errors: bool,

    /// Per-item results, in submission order
    #[serde(default)]
    pub items: Vec<BulkActionResult>,
}

impl BulkResponse {
    /// Iterate the items the cluster rejected
    pub fn failed_items(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.items.iter().map(|a| &a.index).filter(|i| i.is_error())
    }
}

/// One per-item result, keyed by the action that produced it
#[derive(Debug, Clone, Deserialize)]
pub struct BulkActionResult {
    /// We only emit `index` actions, but accept the other action keys
    #[serde(rename = "index", alias = "create", alias = "update", alias = "delete")]
    pub index: BulkItemResult,
}

/// Status of one document within a bulk response
#[derive(Debug, Clone, Deserialize)]
pub struct BulkItemResult {
    /// Destination index
    #[serde(rename = "_index", default)]
    pub index: String,

    /// Document identifier
    #[serde(rename = "_id", default)]
    pub id: String,

    /// Per-item HTTP-style status
    #[serde(default)]
    pub status: u16,

    /// Error detail, present when the item was rejected
    #[serde(default)]
    pub error: Option<BulkError>,
}

impl BulkItemResult {
    /// Whether this item was rejected
    #[inline]
    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.status >= 300
    }

    /// Render the error for quarantine records
    pub fn error_text(&self) -> String {
        match &self.error {
            Some(e) => format!("{}: {}", e.kind, e.reason),
            None => format!("status {}", self.status),
        }
    }
}

/// Structured error detail from the cluster
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkError {
    /// Error type, e.g. `mapper_parsing_exception`
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Human-readable reason
    #[serde(default)]
    pub reason: String,
}

/// Whole-request error envelope for non-2xx responses
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: BulkError,
}

/// Submission interface, implemented by the HTTP client and test doubles
#[async_trait]
pub trait BulkTransport: Send + Sync {
    /// Submit one framed bulk body
    async fn submit(&self, body: String) -> SubmitOutcome;
}

/// HTTP bulk client, shared across all partitions of a pipeline
#[derive(Debug)]
pub struct ElasticsearchClient {
    http: reqwest::Client,
    config: ElasticsearchConfig,
    bulk_url: String,
}

impl ElasticsearchClient {
    /// Build the client with connect/request timeouts
    pub fn new(config: ElasticsearchConfig) -> Result<Self, ElasticsearchError> {
        let http = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(ElasticsearchError::HttpClient)?;

        let bulk_url = format!("{}/_bulk", config.url.trim_end_matches('/'));

        Ok(Self {
            http,
            config,
            bulk_url,
        })
    }

    /// Classify a received HTTP response
    async fn classify_response(&self, response: reqwest::Response) -> SubmitOutcome {
        let status = response.status();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                return SubmitOutcome::TransportFailed {
                    reason: format!("failed to read response body: {e}"),
                };
            }
        };

        if status.is_success() {
            match serde_json::from_str::<BulkResponse>(&text) {
                Ok(parsed) => {
                    trace!(took = parsed.took, errors = parsed.errors, "bulk response parsed");
                    SubmitOutcome::Success(parsed)
                }
                Err(e) => SubmitOutcome::TransportFailed {
                    reason: format!("unparseable 2xx bulk response: {e}"),
                },
            }
        } else {
            // A structured envelope means the cluster itself rejected the
            // request; anything else is gateway noise and retryable.
            match serde_json::from_str::<ErrorEnvelope>(&text) {
                Ok(envelope) => SubmitOutcome::ServerError {
                    status: status.as_u16(),
                    error: envelope.error,
                },
                Err(_) => SubmitOutcome::TransportFailed {
                    reason: format!("http status {status}"),
                },
            }
        }
    }
}

#[async_trait]
impl BulkTransport for ElasticsearchClient {
    async fn submit(&self, body: String) -> SubmitOutcome {
        debug!(bytes = body.len(), "submitting bulk body");

        let mut request = self
            .http
            .post(&self.bulk_url)
            .header("Content-Type", "application/x-ndjson")
            .body(body);

        if let Some(ref username) = self.config.username {
            request = request.basic_auth(username, self.config.password.as_ref());
        }

        match request.send().await {
            Ok(response) => self.classify_response(response).await,
            Err(e) => SubmitOutcome::TransportFailed {
                reason: format!("send failed: {e}"),
            },
        }
    }
}
