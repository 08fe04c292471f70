//! Wire types for the A2A inspector.
//!
//! The inspector talks to its backend over two paths:
//!
//! ```text
//! Client --[HTTP POST /agent-card]--> Backend --[A2A]--> Remote agent
//! Client <--[WS: event frames]------> Backend
//! ```
//!
//! The HTTP path fetches and validates the agent card. The WebSocket path
//! carries named events (`initialize_client`, `send_message`,
//! `client_initialized`, `agent_response`, `debug_log`) framed as
//! `{"event": ..., "data": ...}`.
//!
//! Inbound payloads are parsed leniently: a missing or malformed field is
//! treated as absent instead of failing the whole event.

pub mod card;
pub mod channel;
pub mod events;

mod lenient;

pub use card::{AgentCapabilities, AgentCard, CardErrorResponse, CardRequest, CardResponse};
pub use channel::{
    ClientInitialized, Connected, CustomHeaders, DebugLog, Frame, InitializeClient, SendMessage,
    event_names,
};
pub use events::{
    AgentEvent, AgentEventBody, Artifact, ArtifactUpdateEvent, FileContent, MessageEvent, Part,
    StatusMessage, StatusUpdateEvent, TaskEvent, TaskStatus,
};
