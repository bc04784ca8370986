//! Elasticsearch pipeline configuration

use std::time::Duration;

use serde::Deserialize;

/// Settings for the bulk-indexing pipeline
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElasticsearchConfig {
    /// Whether the pipeline is mounted
    pub enabled: bool,

    /// Cluster base URL
    pub url: String,

    /// Basic-auth username
    pub username: Option<String>,

    /// Basic-auth password
    pub password: Option<String>,

    /// Whether instrumentation items are appended to each batch
    /// Default: true
    pub stats_enabled: bool,

    /// Minimum seconds between checkpoints
    /// Default: 60
    pub checkpoint_interval_secs: u64,

    /// Attempt cap for re-submitting rejected documents
    /// Default: 10
    pub max_failed_doc_retries: u32,

    /// Attempt cap for quarantine submissions
    /// Default: 10
    pub max_abandoned_doc_retries: u32,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: String::new(),
            username: None,
            password: None,
            stats_enabled: true,
            checkpoint_interval_secs: 60,
            max_failed_doc_retries: 10,
            max_abandoned_doc_retries: 10,
        }
    }
}

impl ElasticsearchConfig {
    /// Checkpoint interval as a Duration
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ElasticsearchConfig::default();
        assert!(config.enabled);
        assert!(config.stats_enabled);
        assert_eq!(config.checkpoint_interval(), Duration::from_secs(60));
        assert_eq!(config.max_failed_doc_retries, 10);
        assert_eq!(config.max_abandoned_doc_retries, 10);
    }

    #[test]
    fn test_deserialize_with_auth() {
        let toml = r#"
url = "https://es.internal:9200"
username = "ingest"
password = "hunter2"
stats_enabled = false
"#;
        let config: ElasticsearchConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.url, "https://es.internal:9200");
        assert_eq!(config.username.as_deref(), Some("ingest"));
        assert!(!config.stats_enabled);
    }
}
