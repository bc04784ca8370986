//! Siphon Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! Minimal config should just work - only specify what you need to change.
//!
//! # Example Minimal Config
//!
//! ```toml
//! [broker]
//! connection = "amqp://broker.internal"
//! path = "events"
//!
//! [elasticsearch]
//! url = "https://es.internal:9200"
//!
//! [openschema]
//! notification_endpoint = "https://collect.internal/v2/track"
//! instrumentation_key = "00000000-0000-0000-0000-000000000000"
//! accounts = "AccountName=acct1;AccountKey=...,AccountName=acct2;AccountKey=..."
//! log_schema_id = "8e292ea2-5a2f-48a6-8b5a-3328faf58e2f"
//! interactions_schema_id = "0f9a6b2e-07c9-47e8-8d66-21cb379a2e5c"
//! ```

mod broker;
mod elasticsearch;
mod error;
mod logging;
mod openschema;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

pub use broker::BrokerConfig;
pub use elasticsearch::ElasticsearchConfig;
pub use error::{ConfigError, Result};
pub use logging::LogConfig;
pub use openschema::OpenSchemaConfig;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker and state-store settings
    pub broker: BrokerConfig,

    /// Logging configuration
    pub log: LogConfig,

    /// Elasticsearch pipeline settings
    pub elasticsearch: ElasticsearchConfig,

    /// OpenSchema pipeline settings
    pub openschema: OpenSchemaConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, contains invalid TOML, or
    /// fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_parses() {
        let config = Config::from_str(
            r#"
[elasticsearch]
url = "https://es.internal:9200"

[openschema]
enabled = false
"#,
        )
        .unwrap();

        assert!(config.elasticsearch.enabled);
        assert!(!config.openschema.enabled);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_unknown_file_errors() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError { .. }));
    }
}
