//! Error types for the inspector client.

use thiserror::Error;

/// Result type for capability-fetch operations.
pub type HandshakeResult<T> = Result<T, HandshakeError>;

/// Errors from the out-of-band capability fetch.
///
/// The `Display` text is what ends up in `ConnectionState::last_error`.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The request never produced a response.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The backend answered non-2xx with an explanation.
    #[error("{0}")]
    Rejected(String),

    /// The backend answered non-2xx without an explanation.
    #[error("HTTP error! status: {0}")]
    Status(u16),

    /// The 2xx body was not a card response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// The channel has no session identity to send with the fetch.
    #[error("channel session is not open")]
    ChannelNotOpen,
}

/// Errors from the channel transport.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Errors from agent URL normalization.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("agent URL is empty")]
    Empty,

    #[error("invalid agent URL '{url}': {reason}")]
    Invalid { url: String, reason: String },
}

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("failed to expand path '{path}': {message}")]
    Expand { path: String, message: String },

    #[error("unable to determine {0} directory")]
    NoDirectory(&'static str),

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize default config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
