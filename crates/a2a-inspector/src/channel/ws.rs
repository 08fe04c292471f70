//! WebSocket transport with automatic reconnection.
//!
//! Frames are JSON text messages `{"event": ..., "data": ...}`. The server
//! opens each session with a `connected` frame carrying the session id.

use std::time::Duration;

use a2a_inspector_protocol::{Connected, Frame, event_names};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::adapter::{ChannelLink, Connector};
use crate::config::ChannelConfig;
use crate::error::ChannelError;

/// Reconnection schedule: exponential backoff with up to 20% jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_ms: u64,
    pub max_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            base_ms: 500,
            max_ms: 30_000,
        }
    }
}

impl From<&ChannelConfig> for BackoffPolicy {
    fn from(config: &ChannelConfig) -> Self {
        Self {
            max_attempts: config.max_reconnect_attempts,
            base_ms: config.base_backoff_ms,
            max_ms: config.max_backoff_ms,
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnect attempt `attempt` (1-based), in milliseconds.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let base = self.base_ms as f64;
        let exp = 2.0_f64.powi(attempt.min(10) as i32);
        let delay = (base * exp) as u64;

        let jitter = (delay as f64 * 0.2 * rand::random::<f64>()) as u64;

        (delay + jitter).min(self.max_ms)
    }
}

/// Connects to the inspector backend's WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    policy: BackoffPolicy,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, policy: BackoffPolicy) -> Self {
        Self {
            url: url.into(),
            policy,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WsConnector {
    fn start(&self, link: ChannelLink) -> JoinHandle<()> {
        let url = self.url.clone();
        let policy = self.policy;
        tokio::spawn(async move { drive(url, policy, link).await })
    }
}

/// Keep a session alive until the attempts are exhausted.
async fn drive(url: String, policy: BackoffPolicy, link: ChannelLink) {
    let mut attempt = 0u32;

    loop {
        if attempt > 0 {
            let delay = policy.delay_ms(attempt);
            debug!(
                "Reconnecting to {} in {}ms (attempt {})",
                url, delay, attempt
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        match run_session(&url, &link).await {
            Ok(()) => {
                info!("Channel session at {} closed by server", url);
                link.mark_closed();
                // Wait the base delay before reopening.
                attempt = 1;
            }
            Err(e) => {
                attempt += 1;
                warn!(
                    "Channel connection to {} failed (attempt {}): {}",
                    url, attempt, e
                );
                link.mark_closed();
                link.dispatch(
                    event_names::CONNECT_ERROR,
                    &json!({ "message": e.to_string() }),
                );

                if attempt >= policy.max_attempts {
                    error!(
                        "Giving up on channel {} after {} attempts",
                        url, policy.max_attempts
                    );
                    break;
                }
            }
        }
    }
}

/// Run one WebSocket session. Returns `Ok` when the server closes it.
async fn run_session(url: &str, link: &ChannelLink) -> Result<(), ChannelError> {
    debug!("Connecting to channel at {}", url);
    let (socket, _) = connect_async(url).await?;
    let (mut sink, mut source) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();

    loop {
        tokio::select! {
            Some(frame) = outbound_rx.recv() => {
                let text = serde_json::to_string(&frame)
                    .map_err(|e| ChannelError::InvalidFrame(e.to_string()))?;
                sink.send(Message::Text(text.into())).await?;
            }
            incoming = source.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(text.as_str(), link, &outbound_tx)?;
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                }
            }
        }
    }
}

fn handle_text(
    text: &str,
    link: &ChannelLink,
    outbound_tx: &mpsc::UnboundedSender<Frame>,
) -> Result<(), ChannelError> {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Ignoring malformed channel frame: {}", e);
            return Ok(());
        }
    };

    if frame.event == event_names::CONNECTED {
        let connected: Connected = serde_json::from_value(frame.data)
            .map_err(|e| ChannelError::InvalidFrame(format!("connected frame: {e}")))?;
        info!("Channel session {} established", connected.sid);
        link.mark_open(connected.sid, outbound_tx.clone());
    } else {
        link.dispatch(&frame.event, &frame.data);
    }

    Ok(())
}
