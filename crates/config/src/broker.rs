//! Broker and state-store configuration
//!
//! The partition broker host is external; these settings are handed to it
//! verbatim when the pipelines are mounted. Two consumer groups exist so
//! the indexer and OpenSchema pipelines each see the full stream.

use serde::Deserialize;

/// Broker connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker connection string
    pub connection: String,

    /// Stream path within the broker namespace
    pub path: String,

    /// Consumer group for the Elasticsearch pipeline
    pub indexer_consumer_group: String,

    /// Consumer group for the OpenSchema pipeline
    pub openschema_consumer_group: String,

    /// State store connection for leases and checkpoints
    pub state_connection: String,

    /// State store container for leases and checkpoints
    pub state_container: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            connection: String::new(),
            path: String::new(),
            indexer_consumer_group: "siphon-indexer".into(),
            openschema_consumer_group: "siphon-openschema".into(),
            state_connection: String::new(),
            state_container: "siphon-leases".into(),
        }
    }
}
