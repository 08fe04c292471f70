//! A2A inspector client.
//!
//! Drives a conversation with a remote A2A agent through an inspector
//! backend: the agent card is fetched over HTTP, then messages flow over a
//! persistent WebSocket channel. Every wire-level event is kept in a debug
//! trace next to the user-visible transcript.
//!
//! ```text
//! operator intent ──► SessionController ──► CardFetcher (POST /agent-card)
//!                          │    ▲
//!                  emit    ▼    │ queued events
//!                     ChannelAdapter ◄──► WsConnector ◄──► backend /ws
//!                          │
//!                          ▼
//!             normalize ──► Transcript     DebugTrace
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod handshake;
pub mod ids;
pub mod normalize;
pub mod session;
pub mod target;
pub mod trace;
pub mod transcript;

pub use channel::{BackoffPolicy, ChannelAdapter, ChannelLink, Connector, Subscription, WsConnector};
pub use config::AppConfig;
pub use error::{ChannelError, ConfigError, HandshakeError, HandshakeResult, TargetError};
pub use handshake::{CardFetcher, FetchRequest, HttpCardFetcher};
pub use session::{ConnectionState, Intent, PendingConnection, Phase, SessionController, SessionUpdate};
pub use trace::{DebugTrace, DebugTraceEntry, TraceCategory};
pub use transcript::{ChatEntry, Sender, Transcript};
