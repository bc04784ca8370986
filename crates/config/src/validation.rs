//! Configuration validation
//!
//! Validates config consistency before anything is constructed:
//! - at least one pipeline is enabled
//! - enabled pipelines have their endpoints
//! - the OpenSchema section parses to usable accounts and schema ids
//! - buffer capacity is positive

use crate::error::{ConfigError, Result};
use crate::Config;

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if !config.elasticsearch.enabled && !config.openschema.enabled {
        return Err(ConfigError::NoPipelinesEnabled);
    }

    if config.elasticsearch.enabled {
        validate_elasticsearch(config)?;
    }
    if config.openschema.enabled {
        validate_openschema(config)?;
    }
    Ok(())
}

fn validate_elasticsearch(config: &Config) -> Result<()> {
    if config.elasticsearch.url.is_empty() {
        return Err(ConfigError::missing_field("elasticsearch", "url"));
    }
    Ok(())
}

fn validate_openschema(config: &Config) -> Result<()> {
    let section = &config.openschema;

    if section.notification_endpoint.is_empty() {
        return Err(ConfigError::missing_field(
            "openschema",
            "notification_endpoint",
        ));
    }
    if section.instrumentation_key.is_empty() {
        return Err(ConfigError::missing_field(
            "openschema",
            "instrumentation_key",
        ));
    }
    if section.buffer_capacity_bytes == 0 {
        return Err(ConfigError::invalid_value(
            "openschema",
            "buffer_capacity_bytes",
            "must be positive",
        ));
    }
    if section.account_strings().is_empty() {
        return Err(ConfigError::missing_field("openschema", "accounts"));
    }

    // Connection strings are parsed for real at construction; here we only
    // insist every segment list looks like key=value pairs
    for account in section.account_strings() {
        if !account.contains('=') {
            return Err(ConfigError::invalid_value(
                "openschema",
                "accounts",
                format!("'{account}' is not a connection string"),
            ));
        }
    }

    section.log_schema_id()?;
    section.interactions_schema_id()?;
    Ok(())
}
