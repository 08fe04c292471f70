//! Debug trace recorder: the raw, ordered record of wire-level events.
//!
//! Independent of the transcript. Entries are joined back to chat entries by
//! correlation id only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Category of a trace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceCategory {
    Request,
    Response,
    Error,
    ValidationError,
}

impl fmt::Display for TraceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Response => write!(f, "response"),
            Self::Error => write!(f, "error"),
            Self::ValidationError => write!(f, "validation_error"),
        }
    }
}

impl std::str::FromStr for TraceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "request" => Ok(Self::Request),
            "response" => Ok(Self::Response),
            "error" => Ok(Self::Error),
            "validation_error" => Ok(Self::ValidationError),
            _ => Err(format!("Unknown trace category: {}", s)),
        }
    }
}

/// One trace entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugTraceEntry {
    /// Correlation id (message id, event id, or `http-agent-card`).
    pub id: String,
    pub category: TraceCategory,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl DebugTraceEntry {
    pub fn new(id: impl Into<String>, category: TraceCategory, payload: Value) -> Self {
        Self {
            id: id.into(),
            category,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Append-only list of trace entries. No dedup, no size cap.
#[derive(Debug, Clone, Default)]
pub struct DebugTrace {
    entries: Vec<DebugTraceEntry>,
}

impl DebugTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: DebugTraceEntry) {
        self.entries.push(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[DebugTraceEntry] {
        &self.entries
    }

    /// All entries with the given correlation id, in arrival order.
    pub fn by_id<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a DebugTraceEntry> + 'a {
        self.entries.iter().filter(move |entry| entry.id == id)
    }

    /// The most recent entry for an id and category.
    pub fn latest(&self, id: &str, category: TraceCategory) -> Option<&DebugTraceEntry> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.id == id && entry.category == category)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
