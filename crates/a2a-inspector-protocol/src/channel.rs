//! Channel frames and the payloads of each named event.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Extra HTTP headers the operator attaches to the agent connection.
pub type CustomHeaders = BTreeMap<String, String>;

/// Event names used on the channel.
pub mod event_names {
    /// Server -> client: channel session established, carries the `sid`.
    pub const CONNECTED: &str = "connected";
    /// Transport-level failure, raised locally by the channel adapter.
    pub const CONNECT_ERROR: &str = "connect_error";
    /// Channel opened, raised locally with `{"sid": ...}`.
    pub const CONNECT: &str = "connect";
    /// Channel session lost, raised locally with the `sid` that closed.
    pub const DISCONNECT: &str = "disconnect";

    /// Client -> server: build an A2A client for the agent URL.
    pub const INITIALIZE_CLIENT: &str = "initialize_client";
    /// Client -> server: send a chat message to the agent.
    pub const SEND_MESSAGE: &str = "send_message";

    /// Server -> client: acknowledgement of `initialize_client`.
    pub const CLIENT_INITIALIZED: &str = "client_initialized";
    /// Server -> client: one event produced by the remote agent.
    pub const AGENT_RESPONSE: &str = "agent_response";
    /// Server -> client: raw request/response record for the debug trace.
    pub const DEBUG_LOG: &str = "debug_log";
}

/// A single WebSocket text frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Payload of the `connected` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connected {
    pub sid: String,
}

/// Payload of `initialize_client`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeClient {
    pub url: String,
    #[serde(rename = "customHeaders", default)]
    pub custom_headers: CustomHeaders,
}

/// Payload of `send_message`.
///
/// `contextId` is always present on the wire, `null` until the agent has
/// issued one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    pub message: String,
    pub id: String,
    #[serde(rename = "contextId")]
    pub context_id: Option<String>,
}

/// Payload of `client_initialized`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInitialized {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ClientInitialized {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Payload of `debug_log`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugLog {
    #[serde(rename = "type", default)]
    pub log_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, deserialize_with = "crate::lenient::optional")]
    pub id: Option<String>,
    /// Unix timestamp as sent by the server (seconds or millis, server-defined).
    #[serde(default, deserialize_with = "crate::lenient::optional")]
    pub timestamp: Option<f64>,
}
