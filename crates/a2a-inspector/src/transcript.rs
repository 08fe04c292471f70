//! Transcript store: the ordered, user-visible chat history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who a transcript entry is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Agent,
    System,
    /// Error reported by the remote agent or the backend.
    #[serde(rename = "error")]
    ErrorNotice,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Agent => write!(f, "agent"),
            Self::System => write!(f, "system"),
            Self::ErrorNotice => write!(f, "error"),
        }
    }
}

/// One transcript entry. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub id: String,
    pub sender: Sender,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_kind: Option<String>,
}

impl ChatEntry {
    pub fn new(id: impl Into<String>, sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sender,
            content: content.into(),
            created_at: Utc::now(),
            validation_errors: None,
            event_kind: None,
        }
    }

    pub fn with_validation_errors(mut self, errors: Vec<String>) -> Self {
        self.validation_errors = Some(errors);
        self
    }

    pub fn with_event_kind(mut self, kind: impl Into<String>) -> Self {
        self.event_kind = Some(kind.into());
        self
    }
}

/// Append-only ordered list of chat entries.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<ChatEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Entries with empty content are dropped.
    ///
    /// Returns whether the entry was appended.
    pub fn append(&mut self, entry: ChatEntry) -> bool {
        if entry.content.is_empty() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Replace the whole transcript with a single entry.
    pub fn reset_with(&mut self, entry: ChatEntry) {
        self.entries.clear();
        self.append(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&ChatEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn last(&self) -> Option<&ChatEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
