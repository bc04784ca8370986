//! Event classification
//!
//! Turns one raw broker event into exactly one `BulkItem` or `InvalidItem`.
//! The routing table is closed: four explicit event types plus Serilog
//! inference for events that arrive without a `Type` property.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::event::RawEvent;
use crate::item::{BulkItem, IndexFamily, InvalidItem};
use crate::{PROP_MESSAGE_ID, PROP_SOURCE, PROP_TIMESTAMP, PROP_TYPE};

/// Event type discriminator: Serilog application logs
const TYPE_SERILOG: &str = "SerilogEvent";

/// Event type discriminator: robot interaction telemetry
const TYPE_INTERACTION: &str = "RoboCustosInteraction";

/// Event type discriminator: third-party telemetry
const TYPE_EXTERNAL_TELEMETRY: &str = "ExternalTelemetry";

/// Event type discriminator: Azure resource metadata
const TYPE_AZURE_RESOURCES: &str = "azure-resources";

/// Classification outcome - exactly one per raw event
#[derive(Debug, Clone)]
pub enum Classified {
    /// The event became a routed, single-line document
    Valid(BulkItem),

    /// The event cannot be delivered and goes straight to quarantine
    Invalid(InvalidItem),
}

impl Classified {
    /// Whether this outcome is a valid item
    #[inline]
    pub fn is_valid(&self) -> bool {
        matches!(self, Classified::Valid(_))
    }
}

/// Classify one raw event
///
/// Never fails: events that cannot become a valid item are returned as
/// `Invalid` with the reason recorded. The body invariant (no `\n` bytes)
/// is enforced here so the bulk framer never has to re-check it.
pub fn classify(event: &RawEvent) -> Classified {
    let now = Utc::now();
    let enqueue_time = event.enqueued_at;

    // Property extraction - each must be a string when present
    let event_type = match string_property(event, PROP_TYPE) {
        Ok(v) => v.map(str::to_string),
        Err(reason) => return invalid(event, None, None, now, reason),
    };
    let message_id = match string_property(event, PROP_MESSAGE_ID) {
        Ok(v) => v.map(str::to_string),
        Err(reason) => return invalid(event, None, None, now, reason),
    };
    let source = match string_property(event, PROP_SOURCE) {
        Ok(v) => v.map(str::to_string),
        Err(reason) => return invalid(event, message_id, None, now, reason),
    };
    let timestamp = match string_property(event, PROP_TIMESTAMP) {
        Ok(Some(raw)) => match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(_) => {
                let reason = format!("Missing or invalid {PROP_TIMESTAMP}");
                return invalid(event, message_id, None, now, reason);
            }
        },
        Ok(None) => None,
        Err(reason) => return invalid(event, message_id, None, now, reason),
    };

    let body = match std::str::from_utf8(&event.body) {
        Ok(s) => s.to_string(),
        Err(_) => {
            return invalid(event, message_id, timestamp, now, "Body is not valid UTF-8");
        }
    };

    // Type routing - explicit header first, body inference second
    let routed = match event_type.as_deref() {
        Some(TYPE_SERILOG) => Routed {
            family: IndexFamily::Logstash,
            doc_type: "logevent".to_string(),
            timestamp: timestamp.unwrap_or(now),
        },
        Some(TYPE_INTERACTION) => Routed {
            family: IndexFamily::RoboInteractions,
            doc_type: "interaction".to_string(),
            timestamp: timestamp.unwrap_or(now),
        },
        Some(TYPE_EXTERNAL_TELEMETRY) => Routed {
            family: IndexFamily::ExternalTelemetry,
            doc_type: source.unwrap_or_else(|| "telemetryevent".to_string()),
            timestamp: timestamp.unwrap_or(now),
        },
        Some(TYPE_AZURE_RESOURCES) => Routed {
            family: IndexFamily::AzureResources,
            doc_type: source.unwrap_or_else(|| "metadata".to_string()),
            timestamp: timestamp.unwrap_or(now),
        },
        Some("") | None => match infer_serilog(&body) {
            Some(body_timestamp) => Routed {
                family: IndexFamily::Logstash,
                doc_type: "logevent".to_string(),
                timestamp: body_timestamp,
            },
            None => {
                return invalid(event, message_id, timestamp, now, "Missing or invalid Type");
            }
        },
        Some(_) => {
            return invalid(event, message_id, timestamp, now, "Missing or invalid Type");
        }
    };

    let doc_id = message_id.unwrap_or_else(new_doc_id);

    if body.contains('\n') {
        return Classified::Invalid(InvalidItem {
            doc_id,
            timestamp: routed.timestamp,
            enqueue_time,
            body,
            reason: "Document body contains newlines".to_string(),
        });
    }

    Classified::Valid(BulkItem::new(
        routed.family,
        routed.doc_type,
        doc_id,
        routed.timestamp,
        enqueue_time,
        body,
    ))
}

/// Resolved routing decision for one event
struct Routed {
    family: IndexFamily,
    doc_type: String,
    timestamp: DateTime<Utc>,
}

/// Read a property that must be a string when present
///
/// Returns the reason string on a kind violation.
fn string_property<'a>(event: &'a RawEvent, name: &str) -> Result<Option<&'a str>, String> {
    match event.property(name) {
        None => Ok(None),
        Some(value) => value
            .as_text()
            .map(Some)
            .ok_or_else(|| format!("Property {name} is not a string")),
    }
}

/// Serilog body inference
///
/// An event without a `Type` property is treated as an implicit Serilog
/// event when its body is a JSON object carrying `message` (string),
/// `messageTemplate` (string), and a parseable ISO-8601 `@timestamp`.
/// Returns the parsed timestamp on success.
fn infer_serilog(body: &str) -> Option<DateTime<Utc>> {
    let value: Value = serde_json::from_str(body).ok()?;
    let obj = value.as_object()?;

    obj.get("message")?.as_str()?;
    obj.get("messageTemplate")?.as_str()?;
    let raw_timestamp = obj.get("@timestamp")?.as_str()?;

    DateTime::parse_from_rfc3339(raw_timestamp)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Build an invalid item, decoding the body lossily for quarantine
fn invalid(
    event: &RawEvent,
    message_id: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    reason: impl Into<String>,
) -> Classified {
    Classified::Invalid(InvalidItem {
        doc_id: message_id.unwrap_or_else(new_doc_id),
        timestamp: timestamp.unwrap_or(now),
        enqueue_time: event.enqueued_at,
        body: String::from_utf8_lossy(&event.body).into_owned(),
        reason: reason.into(),
    })
}

/// Freshly generated document identifier
fn new_doc_id() -> String {
    Uuid::new_v4().to_string()
}
