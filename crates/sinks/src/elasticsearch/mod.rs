//! Elasticsearch bulk delivery
//!
//! Three pieces, kept deliberately separate:
//! - `bulk` frames classified items into the `/_bulk` NDJSON wire format
//! - `stats` synthesizes the self-instrumentation items appended to each
//!   framed batch
//! - `client` submits a framed body and classifies the response
//!
//! The client performs no retries; callers own the retry policy.

mod bulk;
mod client;
mod error;
mod stats;

pub use bulk::{BulkFrame, FramedDoc};
pub use client::{
    BulkActionResult, BulkError, BulkItemResult, BulkResponse, BulkTransport, ElasticsearchClient,
    SubmitOutcome,
};
pub use error::ElasticsearchError;
pub use stats::{BatchStatsContext, build_batch_stats, build_per_partition_stats};

use std::time::Duration;

/// Result type for Elasticsearch sink operations
pub type Result<T> = std::result::Result<T, ElasticsearchError>;

/// Default HTTP connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default HTTP request timeout - bulk bodies can be large
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Runtime configuration for the Elasticsearch backend
#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    /// Cluster base URL
    pub url: String,

    /// Basic-auth username
    pub username: Option<String>,

    /// Basic-auth password
    pub password: Option<String>,

    /// Whether instrumentation items are appended to each batch
    pub stats_enabled: bool,
}

impl ElasticsearchConfig {
    /// Create a config for the given cluster URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            stats_enabled: true,
        }
    }

    /// Set basic-auth credentials
    #[must_use]
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

// Test modules - only compiled during testing
#[cfg(test)]
mod bulk_test;
#[cfg(test)]
mod client_test;
