//! Session data models.

use a2a_inspector_protocol::{AgentCard, CardResponse, CustomHeaders};
use serde::Serialize;
use serde_json::Value;

use crate::error::HandshakeResult;
use crate::trace::DebugTraceEntry;
use crate::transcript::ChatEntry;

/// Connection phase. Exactly one holds at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "reason", rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Disconnected,
    /// Capability fetch issued, waiting for the fetch and then the channel
    /// acknowledgement.
    HandshakeInFlight,
    Connected,
    /// Handshake failed with the given reason.
    Failed(String),
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Disconnected => write!(f, "disconnected"),
            Phase::HandshakeInFlight => write!(f, "handshake in flight"),
            Phase::Connected => write!(f, "connected"),
            Phase::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// UI-visible connection state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub phase: Phase,
    /// Agent card from the last successful fetch.
    pub descriptor: Option<AgentCard>,
    pub descriptor_validation_errors: Vec<String>,
    pub last_error: Option<String>,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.phase == Phase::Connected
    }
}

/// A connect intent parked until the channel opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConnection {
    pub target_url: String,
    pub extra_headers: CustomHeaders,
}

/// Operator intents accepted by [`super::SessionController::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Connect { url: String, headers: CustomHeaders },
    Disconnect,
    SendMessage(String),
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    StateChanged(ConnectionState),
    EntryAppended(ChatEntry),
    TranscriptCleared,
    TraceAppended(DebugTraceEntry),
    TraceCleared,
}

/// Work queued for the controller by channel handlers and fetch tasks.
#[derive(Debug)]
pub(crate) enum SessionEvent {
    CardFetched {
        generation: u64,
        result: HandshakeResult<CardResponse>,
    },
    ClientInitialized(Value),
    AgentResponse(Value),
    DebugLog(Value),
    ConnectError(Value),
    ChannelOpened(Value),
    ChannelClosed(Value),
}
