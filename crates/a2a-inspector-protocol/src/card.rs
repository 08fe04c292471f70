//! Agent card and the capability-fetch request/response bodies.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The agent's self-reported capability document.
///
/// Well-known fields are typed; everything else the agent advertises is kept
/// in `extra` so the card round-trips without loss.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub capabilities: AgentCapabilities,
    #[serde(default)]
    pub default_input_modes: Vec<String>,
    #[serde(default)]
    pub default_output_modes: Vec<String>,
    #[serde(default)]
    pub skills: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentCard {
    /// Whether the agent advertises streaming responses.
    pub fn supports_streaming(&self) -> bool {
        self.capabilities.streaming == Some(true)
    }
}

/// Capability flags advertised in the card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of `POST /agent-card`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRequest {
    pub url: String,
    pub sid: String,
}

/// Successful (2xx) body of `POST /agent-card`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardResponse {
    pub card: AgentCard,
    #[serde(default)]
    pub validation_errors: Vec<String>,
}

/// Error (non-2xx) body of `POST /agent-card`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
}
