//! Event normalizer: turns inbound agent events into transcript entries.
//!
//! Each event yields at most one entry. An event whose derived content is
//! empty yields none, but its `contextId` is still reported.

use a2a_inspector_protocol::{
    AgentEvent, AgentEventBody, ArtifactUpdateEvent, MessageEvent, Part, StatusUpdateEvent,
    TaskEvent,
};

use crate::ids;
use crate::transcript::{ChatEntry, Sender};

/// Event kind recorded on error notices.
pub const ERROR_KIND: &str = "error";

/// Outcome of normalizing one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// The entry to append, if the event produced any content.
    pub entry: Option<ChatEntry>,
    /// The non-empty `contextId` carried by the event.
    pub context_id: Option<String>,
}

/// Normalize one agent event.
pub fn normalize(event: &AgentEvent) -> Normalized {
    let context_id = event.context_id.clone().filter(|id| !id.is_empty());

    let entry = match event.error.as_deref().filter(|message| !message.is_empty()) {
        Some(message) => Some(
            ChatEntry::new(
                ids::agent_entry_id(),
                Sender::ErrorNotice,
                format!("Error: {message}"),
            )
            .with_validation_errors(event.validation_errors.clone())
            .with_event_kind(ERROR_KIND),
        ),
        None => render_body(&event.body)
            .filter(|content| !content.is_empty())
            .map(|content| {
                let entry = ChatEntry::new(ids::agent_entry_id(), Sender::Agent, content)
                    .with_validation_errors(event.validation_errors.clone());
                match event.kind() {
                    Some(kind) => entry.with_event_kind(kind),
                    None => entry,
                }
            }),
    };

    Normalized { entry, context_id }
}

fn render_body(body: &AgentEventBody) -> Option<String> {
    match body {
        AgentEventBody::Task(task) => render_task(task),
        AgentEventBody::StatusUpdate(update) => render_status_update(update),
        AgentEventBody::ArtifactUpdate(update) => Some(render_artifact_update(update)),
        AgentEventBody::Message(message) => render_message(message),
        AgentEventBody::Unknown(_) | AgentEventBody::Missing => None,
    }
}

fn render_task(task: &TaskEvent) -> Option<String> {
    let state = task.status.as_ref()?.state.as_deref()?;
    Some(format!("Task created with status: {state}"))
}

/// Only the first part of the status message is considered.
fn render_status_update(update: &StatusUpdateEvent) -> Option<String> {
    let message = update.status.as_ref()?.message.as_ref()?;
    message.parts.first()?.non_empty_text().map(str::to_string)
}

fn render_artifact_update(update: &ArtifactUpdateEvent) -> String {
    update
        .artifact
        .iter()
        .flat_map(|artifact| artifact.parts.iter())
        .map(render_part)
        .collect()
}

fn render_message(message: &MessageEvent) -> Option<String> {
    message
        .parts
        .iter()
        .find_map(Part::non_empty_text)
        .map(str::to_string)
}

/// Render one artifact part. Text wins over file, file over data; a part
/// with none of them renders as nothing.
pub fn render_part(part: &Part) -> String {
    if let Some(text) = part.non_empty_text() {
        return text.to_string();
    }

    if let Some(file) = &part.file {
        return format!(
            "File received ({}): [Open Link]({})",
            file.mime_type.as_deref().unwrap_or_default(),
            file.uri.as_deref().unwrap_or_default()
        );
    }

    if let Some(data) = &part.data {
        let pretty = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
        return format!("```json\n{pretty}\n```");
    }

    String::new()
}
