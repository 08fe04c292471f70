//! Persistent bidirectional channel to the inspector backend.
//!
//! [`ChannelAdapter`] owns the subscriber registry and the open flag; a
//! [`Connector`] supplies the transport driver. [`WsConnector`] is the
//! WebSocket transport used in production.

mod adapter;
mod ws;

pub use adapter::{ChannelAdapter, ChannelLink, Connector, EventHandler, Subscription};
pub use ws::{BackoffPolicy, WsConnector};
