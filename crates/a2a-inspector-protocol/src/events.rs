//! Agent events delivered on `agent_response`.
//!
//! Each event is an A2A result object (`task`, `status-update`,
//! `artifact-update` or `message`, discriminated by `kind`) augmented by the
//! backend with the validation errors it found, or an error envelope
//! `{error, id}` when the agent call failed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::lenient;

/// Content part of a message, status or artifact.
///
/// A part is a text, file or data part; agents may also tag it with `kind`.
/// Every field is optional so a partial part decodes to something that simply
/// renders as nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(
        default,
        deserialize_with = "lenient::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub text: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub file: Option<FileContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: Some("text".to_string()),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// The part's text, if it has any non-empty text.
    pub fn non_empty_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|text| !text.is_empty())
    }
}

/// File reference inside a file part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    #[serde(
        default,
        deserialize_with = "lenient::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub uri: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub mime_type: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
}

/// Message nested in a task status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    #[serde(default, deserialize_with = "lenient::list")]
    pub parts: Vec<Part>,
}

/// Task status (`state` plus an optional message).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    #[serde(default, deserialize_with = "lenient::optional")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional")]
    pub message: Option<StatusMessage>,
}

/// Artifact carried by `artifact-update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default, deserialize_with = "lenient::optional")]
    pub artifact_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub parts: Vec<Part>,
}

/// `kind: "task"`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaskEvent {
    #[serde(default, deserialize_with = "lenient::optional")]
    pub status: Option<TaskStatus>,
}

/// `kind: "status-update"`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatusUpdateEvent {
    #[serde(default, deserialize_with = "lenient::optional")]
    pub status: Option<TaskStatus>,
    #[serde(default, rename = "final", deserialize_with = "lenient::optional")]
    pub is_final: Option<bool>,
}

/// `kind: "artifact-update"`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ArtifactUpdateEvent {
    #[serde(default, deserialize_with = "lenient::optional")]
    pub artifact: Option<Artifact>,
}

/// `kind: "message"`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MessageEvent {
    #[serde(default, deserialize_with = "lenient::optional")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub parts: Vec<Part>,
}

/// Kind-specific body of an agent event.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEventBody {
    Task(TaskEvent),
    StatusUpdate(StatusUpdateEvent),
    ArtifactUpdate(ArtifactUpdateEvent),
    Message(MessageEvent),
    /// A `kind` this client does not know.
    Unknown(String),
    /// No `kind` at all (error envelopes look like this).
    Missing,
}

/// One event received on `agent_response`.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentEvent {
    pub id: Option<String>,
    pub context_id: Option<String>,
    pub error: Option<String>,
    pub validation_errors: Vec<String>,
    pub body: AgentEventBody,
}

impl AgentEvent {
    /// Decode an event from its raw payload. Never fails: anything missing or
    /// malformed is treated as absent.
    pub fn from_value(value: &Value) -> Self {
        let id = string_field(value, "id");
        let context_id = string_field(value, "contextId");
        let error = error_field(value);
        let validation_errors = value
            .get("validation_errors")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let body = match value.get("kind").and_then(Value::as_str) {
            Some("task") => AgentEventBody::Task(lenient::or_default(value)),
            Some("status-update") => AgentEventBody::StatusUpdate(lenient::or_default(value)),
            Some("artifact-update") => AgentEventBody::ArtifactUpdate(lenient::or_default(value)),
            Some("message") => AgentEventBody::Message(lenient::or_default(value)),
            Some(other) => AgentEventBody::Unknown(other.to_string()),
            None => AgentEventBody::Missing,
        };

        Self {
            id,
            context_id,
            error,
            validation_errors,
            body,
        }
    }

    /// The wire `kind` of this event, if it had one.
    pub fn kind(&self) -> Option<&str> {
        match &self.body {
            AgentEventBody::Task(_) => Some("task"),
            AgentEventBody::StatusUpdate(_) => Some("status-update"),
            AgentEventBody::ArtifactUpdate(_) => Some("artifact-update"),
            AgentEventBody::Message(_) => Some("message"),
            AgentEventBody::Unknown(kind) => Some(kind.as_str()),
            AgentEventBody::Missing => None,
        }
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// `error` is normally a string; JSON-RPC style `{message}` objects are
/// accepted too.
fn error_field(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::String(message) => Some(message.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}
