//! OpenSchema record decoding
//!
//! Two schemas exist: `Log` (Serilog events) and `Interactions` (robot
//! interaction telemetry). Both decode from the event body's JSON and
//! encode to single-line JSON for line-delimited blob concatenation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Schema name for Serilog log records
pub const LOG_SCHEMA: &str = "Log";

/// Schema name for interaction records
pub const INTERACTIONS_SCHEMA: &str = "Interactions";

/// Happiness grades that trigger the root-cause walk
const NEGATIVE_GRADES: &[&str] = &["Unacceptable", "ReallyAnnoyed"];

/// Errors from record decoding
///
/// A decode error drops the event (logged, counted) - the batch proceeds.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The body is not valid JSON
    #[error("body is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    /// The body is valid JSON but not an object
    #[error("body is not a json object")]
    NotAnObject,

    /// A required member is absent or of the wrong kind
    #[error("missing or invalid field '{0}'")]
    MissingField(&'static str),

    /// A timestamp member failed to parse
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// One decoded Serilog log record
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    schema_name: &'static str,
    schema_id: Uuid,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    machine_name: Option<String>,
    message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    machine_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    application_name: Option<String>,
    blob: Value,
}

impl LogRecord {
    /// Decode a Serilog event body
    ///
    /// Known members of the nested `fields` object are projected into
    /// typed fields; everything else in `fields` lands in `blob`. Unknown
    /// top-level members are ignored.
    pub fn decode(schema_id: Uuid, message_id: &str, body: &str) -> Result<Self, RecordError> {
        let value: Value = serde_json::from_str(body)?;
        let obj = value.as_object().ok_or(RecordError::NotAnObject)?;

        let timestamp = required_timestamp(obj, "@timestamp")?;
        let level = string_member(obj, "level");
        let message = string_member(obj, "message");
        let message_template = string_member(obj, "messageTemplate");

        let mut machine_name = None;
        let mut machine_role = None;
        let mut application_name = None;
        let mut correlation_id = None;
        let mut blob = Map::new();

        if let Some(fields) = obj.get("fields").and_then(Value::as_object) {
            for (key, member) in fields {
                match key.as_str() {
                    "MachineName" => machine_name = member.as_str().map(str::to_string),
                    "MachineRole" => {
                        machine_role = member.as_str().map(str::to_string);
                        application_name = member.as_str().map(str::to_string);
                    }
                    "CorrelationId" => correlation_id = member.as_str().map(str::to_string),
                    _ => {
                        blob.insert(key.clone(), member.clone());
                    }
                }
            }
        }

        Ok(Self {
            schema_name: LOG_SCHEMA,
            schema_id,
            timestamp,
            correlation_id,
            machine_name,
            message_id: message_id.to_string(),
            level,
            message,
            message_template,
            machine_role,
            application_name,
            blob: Value::Object(blob),
        })
    }

    /// Logical record time
    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Render as single-line JSON
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// One decoded robot interaction record
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    schema_name: &'static str,
    schema_id: Uuid,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    machine_name: Option<String>,
    message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    robot_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    happiness: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    happiness_explanation: Option<String>,
    blob: Value,
}

impl InteractionRecord {
    /// Decode an interaction event body
    ///
    /// The whole original body is preserved in `blob`. When the happiness
    /// grade is negative, the interaction tree is walked to find the
    /// root-cause interaction and its operation id becomes the record's
    /// correlation id.
    pub fn decode(schema_id: Uuid, message_id: &str, body: &str) -> Result<Self, RecordError> {
        let value: Value = serde_json::from_str(body)?;
        let obj = value.as_object().ok_or(RecordError::NotAnObject)?;

        let timestamp = required_timestamp(obj, "timestamp")?;
        let robot_name = string_member(obj, "RobotName");
        let environment = obj
            .get("Information")
            .and_then(|v| v.get("Product"))
            .and_then(|v| v.get("Environment"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let machine_name = obj
            .get("Tester")
            .and_then(|v| v.get("InstanceId"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let interaction = obj
            .get("Interaction")
            .ok_or(RecordError::MissingField("Interaction"))?;

        let duration_ms = interaction.get("TimeTaken").and_then(Value::as_f64);
        let happiness = interaction
            .get("HappinessGrade")
            .and_then(Value::as_str)
            .map(str::to_string);
        let happiness_explanation = interaction
            .get("HappinessExplanation")
            .and_then(Value::as_str)
            .map(str::to_string);

        let correlation_id = happiness
            .as_deref()
            .filter(|grade| NEGATIVE_GRADES.contains(grade))
            .and_then(|grade| root_cause(interaction, grade))
            .and_then(operation_id);

        Ok(Self {
            schema_name: INTERACTIONS_SCHEMA,
            schema_id,
            timestamp,
            correlation_id,
            machine_name,
            message_id: message_id.to_string(),
            robot_name,
            environment,
            duration_ms,
            happiness,
            happiness_explanation,
            blob: value,
        })
    }

    /// Logical record time
    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Render as single-line JSON
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Find the root-cause interaction for a negative grade
///
/// Pre-order over the interaction tree: the deepest descendant whose
/// grade matches wins; a node whose grade differs prunes its subtree.
/// Returns the node itself when no child matches.
pub fn root_cause<'a>(node: &'a Value, grade: &str) -> Option<&'a Value> {
    if node.get("HappinessGrade").and_then(Value::as_str) != Some(grade) {
        return None;
    }
    for child in children(node) {
        if let Some(found) = root_cause(child, grade) {
            return Some(found);
        }
    }
    Some(node)
}

/// Child interactions of a node
///
/// A `Components` array enumerates children explicitly, in order.
/// Otherwise any object member carrying both `HappinessGrade` and
/// `TimeInteractionRecorded` is a child.
fn children(node: &Value) -> Vec<&Value> {
    if let Some(components) = node.get("Components").and_then(Value::as_array) {
        return components.iter().collect();
    }

    node.as_object()
        .map(|obj| {
            obj.values()
                .filter(|member| {
                    member.get("HappinessGrade").is_some()
                        && member.get("TimeInteractionRecorded").is_some()
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Operation id detail of an interaction node, either capitalization
fn operation_id(node: &Value) -> Option<String> {
    let details = node.get("Details").unwrap_or(node);
    details
        .get("OperationID")
        .or_else(|| details.get("OperationId"))
        .or_else(|| node.get("OperationID"))
        .or_else(|| node.get("OperationId"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn string_member(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn required_timestamp(obj: &Map<String, Value>, key: &'static str) -> Result<DateTime<Utc>, RecordError> {
    let raw = obj
        .get(key)
        .and_then(Value::as_str)
        .ok_or(RecordError::MissingField(key))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| RecordError::InvalidTimestamp(raw.to_string()))
}
