//! OpenSchema pipeline configuration

use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ConfigError, Result};

/// Settings for the blob + analytics registration pipeline
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenSchemaConfig {
    /// Whether the pipeline is mounted
    pub enabled: bool,

    /// Analytics ingestion endpoint for blob notifications
    pub notification_endpoint: String,

    /// Instrumentation key sent with every notification
    pub instrumentation_key: String,

    /// Base container name blobs shard under
    /// Default: "siphonrecords"
    pub base_container: String,

    /// Per-schema buffer capacity in bytes
    /// Default: 1048576 (1MiB)
    pub buffer_capacity_bytes: usize,

    /// Whether flushed payloads are gzipped
    /// Default: false
    pub compress: bool,

    /// Comma-separated blob account connection strings
    pub accounts: String,

    /// Schema id registered for Log records
    pub log_schema_id: String,

    /// Schema id registered for Interactions records
    pub interactions_schema_id: String,

    /// Whether batch-stats records are appended after flushes
    /// Default: true
    pub stats_enabled: bool,

    /// Minimum seconds between checkpoints
    /// Default: 180
    pub checkpoint_interval_secs: u64,
}

impl Default for OpenSchemaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            notification_endpoint: String::new(),
            instrumentation_key: String::new(),
            base_container: "siphonrecords".into(),
            buffer_capacity_bytes: 1024 * 1024,
            compress: false,
            accounts: String::new(),
            log_schema_id: String::new(),
            interactions_schema_id: String::new(),
            stats_enabled: true,
            checkpoint_interval_secs: 180,
        }
    }
}

impl OpenSchemaConfig {
    /// Checkpoint interval as a Duration
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }

    /// Split the account list into individual connection strings
    pub fn account_strings(&self) -> Vec<&str> {
        self.accounts
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Parse the Log schema id
    pub fn log_schema_id(&self) -> Result<Uuid> {
        parse_schema_id(&self.log_schema_id, "log_schema_id")
    }

    /// Parse the Interactions schema id
    pub fn interactions_schema_id(&self) -> Result<Uuid> {
        parse_schema_id(&self.interactions_schema_id, "interactions_schema_id")
    }
}

fn parse_schema_id(raw: &str, field: &'static str) -> Result<Uuid> {
    if raw.is_empty() {
        return Err(ConfigError::missing_field("openschema", field));
    }
    Uuid::parse_str(raw)
        .map_err(|e| ConfigError::invalid_value("openschema", field, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OpenSchemaConfig::default();
        assert!(config.enabled);
        assert_eq!(config.base_container, "siphonrecords");
        assert_eq!(config.buffer_capacity_bytes, 1024 * 1024);
        assert!(!config.compress);
        assert_eq!(config.checkpoint_interval(), Duration::from_secs(180));
    }

    #[test]
    fn test_account_strings_split_and_trim() {
        let config = OpenSchemaConfig {
            accounts: "AccountName=a;AccountKey=a2V5, AccountName=b;AccountKey=a2V5 ,".into(),
            ..Default::default()
        };

        let accounts = config.account_strings();
        assert_eq!(accounts.len(), 2);
        assert!(accounts[0].starts_with("AccountName=a"));
        assert!(accounts[1].starts_with("AccountName=b"));
    }

    #[test]
    fn test_schema_id_parsing() {
        let config = OpenSchemaConfig {
            log_schema_id: "8e292ea2-5a2f-48a6-8b5a-3328faf58e2f".into(),
            ..Default::default()
        };
        assert!(config.log_schema_id().is_ok());

        let empty = OpenSchemaConfig::default();
        assert!(matches!(
            empty.log_schema_id(),
            Err(ConfigError::MissingField { .. })
        ));

        let bad = OpenSchemaConfig {
            log_schema_id: "not-a-uuid".into(),
            ..Default::default()
        };
        assert!(matches!(
            bad.log_schema_id(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
