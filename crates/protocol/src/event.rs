//! Raw events as delivered by the partition broker
//!
//! A `RawEvent` is handed to a pipeline for exactly one `process` call.
//! Pipelines must not retain references to it after that call returns.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// One broker property value
///
/// The broker contract allows strings, integers, and timestamps. Anything
/// else is rejected at the adapter boundary before a `RawEvent` is built.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// UTF-8 string property
    Text(String),

    /// 64-bit integer property
    Integer(i64),

    /// Timestamp property
    Timestamp(DateTime<Utc>),
}

impl PropertyValue {
    /// Get the string value, if this is a string property
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

/// One raw event from the partition broker
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// Opaque event body
    pub body: Bytes,

    /// Broker-assigned enqueue time
    pub enqueued_at: DateTime<Utc>,

    /// String-keyed property bag
    pub properties: HashMap<String, PropertyValue>,
}

impl RawEvent {
    /// Create an event with the given body and enqueue time
    pub fn new(body: impl Into<Bytes>, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            body: body.into(),
            enqueued_at,
            properties: HashMap::new(),
        }
    }

    /// Builder-style property insertion
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Get a property by name
    #[inline]
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}
