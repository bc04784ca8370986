//! Elasticsearch sink error types

use thiserror::Error;

/// Errors surfaced by the Elasticsearch backend
///
/// Per-document rejections are not errors here - they travel inside
/// `SubmitOutcome` so the caller can retry and quarantine selectively.
#[derive(Debug, Error)]
pub enum ElasticsearchError {
    /// Failed to construct the HTTP client
    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
}
