//! Session controller: the single writer of connection state, transcript and
//! debug trace.
//!
//! Channel handlers and fetch tasks never touch state directly. They queue a
//! [`SessionEvent`] which the controller applies in [`SessionController::step`].
//! Channel open and close transitions travel through the same queue, so they
//! are applied in order with the events of each session.

use std::sync::Arc;

use a2a_inspector_protocol::{
    AgentEvent, CardResponse, ClientInitialized, CustomHeaders, DebugLog, InitializeClient,
    SendMessage, event_names,
};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};

use super::models::{
    ConnectionState, Intent, PendingConnection, Phase, SessionEvent, SessionUpdate,
};
use crate::channel::{ChannelAdapter, Subscription};
use crate::error::{HandshakeError, HandshakeResult};
use crate::handshake::{CardFetcher, FetchRequest};
use crate::ids;
use crate::normalize::normalize;
use crate::trace::{DebugTrace, DebugTraceEntry, TraceCategory};
use crate::transcript::{ChatEntry, Sender, Transcript};

/// System message shown once the agent client is initialized.
pub const READY_MESSAGE: &str = "Connected to agent. Ready to chat!";

const INIT_FAILED_MESSAGE: &str = "Failed to initialize client";
const CHANNEL_LOST_MESSAGE: &str = "Channel connection lost";

const UPDATE_CAPACITY: usize = 256;

pub struct SessionController {
    channel: ChannelAdapter,
    fetcher: Arc<dyn CardFetcher>,

    state: ConnectionState,
    pending: Option<PendingConnection>,
    /// Target of the handshake in flight, replayed in `initialize_client`.
    target: Option<PendingConnection>,
    /// Channel session the current handshake was bound to.
    session_sid: Option<String>,
    transcript: Transcript,
    trace: DebugTrace,
    context_id: Option<String>,
    /// Bumped on disconnect, channel loss and each new handshake. Fetch
    /// results tagged with an older value are discarded.
    generation: u64,

    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    subscriptions: Vec<Subscription>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl SessionController {
    pub fn new(channel: ChannelAdapter, fetcher: Arc<dyn CardFetcher>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            channel,
            fetcher,
            state: ConnectionState::default(),
            pending: None,
            target: None,
            session_sid: None,
            transcript: Transcript::new(),
            trace: DebugTrace::new(),
            context_id: None,
            generation: 0,
            events_tx,
            events_rx,
            subscriptions: Vec::new(),
            updates,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn pending(&self) -> Option<&PendingConnection> {
        self.pending.as_ref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn trace(&self) -> &DebugTrace {
        &self.trace
    }

    pub fn context_id(&self) -> Option<&str> {
        self.context_id.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn channel(&self) -> &ChannelAdapter {
        &self.channel
    }

    /// Receiver for state, transcript and trace notifications.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    pub fn handle_intent(&mut self, intent: Intent) {
        match intent {
            Intent::Connect { url, headers } => self.connect(url, headers),
            Intent::Disconnect => self.disconnect(),
            Intent::SendMessage(text) => {
                self.send_message(&text);
            }
        }
    }

    /// Connect to an agent. Ignored while connected.
    ///
    /// If the channel is not open yet the request is parked (replacing any
    /// earlier one) and the handshake starts once the channel opens.
    pub fn connect(&mut self, url: String, headers: CustomHeaders) {
        if self.state.is_connected() {
            debug!("Connect ignored: already connected");
            return;
        }

        self.ensure_subscribed();

        if self.channel.is_open() {
            // The open transition may still be queued; it must not replay an
            // older parked intent.
            self.pending = None;
            self.begin_handshake(url, headers);
        } else {
            debug!("Channel not open, parking connection to {}", url);
            self.pending = Some(PendingConnection {
                target_url: url,
                extra_headers: headers,
            });
            self.channel.connect();
        }
    }

    /// Tear down the session. Only acts while connected.
    pub fn disconnect(&mut self) {
        if !self.state.is_connected() {
            debug!("Disconnect ignored in phase {}", self.state.phase);
            return;
        }

        info!("Disconnecting from agent");
        self.channel.disconnect();
        self.subscriptions.clear();
        self.generation += 1;

        // Anything still queued belongs to the torn-down session.
        while self.events_rx.try_recv().is_ok() {}

        self.state = ConnectionState::default();
        self.pending = None;
        self.target = None;
        self.session_sid = None;
        self.context_id = None;
        self.clear_transcript();
        self.clear_trace();
        self.publish_state();
    }

    /// Send a chat message. Only acts while connected; blank text is ignored.
    ///
    /// Returns the id of the new user message.
    pub fn send_message(&mut self, text: &str) -> Option<String> {
        if !self.state.is_connected() {
            debug!("Send ignored in phase {}", self.state.phase);
            return None;
        }
        if text.trim().is_empty() {
            return None;
        }

        let id = ids::message_id();
        self.append_entry(ChatEntry::new(id.clone(), Sender::User, text));

        let payload = SendMessage {
            message: text.to_string(),
            id: id.clone(),
            context_id: self.context_id.clone(),
        };
        self.emit(event_names::SEND_MESSAGE, &payload);
        Some(id)
    }

    /// Wait for and apply the next queued event or channel transition.
    pub async fn step(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.apply(event);
        }
    }

    /// Drive the controller from an intent stream until it ends.
    pub async fn run(mut self, mut intents: mpsc::Receiver<Intent>) {
        loop {
            tokio::select! {
                intent = intents.recv() => match intent {
                    Some(intent) => self.handle_intent(intent),
                    None => break,
                },
                () = self.step() => {}
            }
        }
        debug!("Intent stream closed, stopping session");
        self.channel.disconnect();
    }

    fn ensure_subscribed(&mut self) {
        if !self.subscriptions.is_empty() {
            return;
        }

        let routes: [(&str, fn(Value) -> SessionEvent); 6] = [
            (event_names::CONNECT, SessionEvent::ChannelOpened),
            (event_names::DISCONNECT, SessionEvent::ChannelClosed),
            (event_names::CLIENT_INITIALIZED, SessionEvent::ClientInitialized),
            (event_names::AGENT_RESPONSE, SessionEvent::AgentResponse),
            (event_names::DEBUG_LOG, SessionEvent::DebugLog),
            (event_names::CONNECT_ERROR, SessionEvent::ConnectError),
        ];

        for (event, wrap) in routes {
            let tx = self.events_tx.clone();
            let subscription = self.channel.subscribe(event, move |data| {
                let _ = tx.send(wrap(data.clone()));
            });
            self.subscriptions.push(subscription);
        }
    }

    fn begin_handshake(&mut self, url: String, headers: CustomHeaders) {
        self.generation += 1;
        self.state.phase = Phase::HandshakeInFlight;
        self.state.last_error = None;
        self.session_sid = None;
        self.clear_transcript();
        self.clear_trace();

        let Some(sid) = self.channel.sid() else {
            self.fail_handshake(HandshakeError::ChannelNotOpen.to_string());
            return;
        };

        info!("Fetching agent card for {}", url);
        self.record_trace(DebugTraceEntry::new(
            ids::CARD_FETCH_ID,
            TraceCategory::Request,
            json!({
                "endpoint": self.fetcher.endpoint(),
                "payload": { "url": url, "sid": sid },
            }),
        ));

        self.session_sid = Some(sid.clone());
        let request = FetchRequest {
            url: url.clone(),
            sid,
            headers: headers.clone(),
        };
        self.target = Some(PendingConnection {
            target_url: url,
            extra_headers: headers,
        });
        self.publish_state();

        let generation = self.generation;
        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = fetcher.fetch_card(request).await;
            let _ = tx.send(SessionEvent::CardFetched { generation, result });
        });
    }

    fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::CardFetched { generation, result } => {
                self.on_card_fetched(generation, result)
            }
            SessionEvent::ClientInitialized(data) => self.on_client_initialized(data),
            SessionEvent::AgentResponse(data) => self.on_agent_response(data),
            SessionEvent::DebugLog(data) => self.on_debug_log(data),
            SessionEvent::ConnectError(data) => self.on_connect_error(data),
            SessionEvent::ChannelOpened(_) => self.on_channel_opened(),
            SessionEvent::ChannelClosed(data) => {
                self.on_channel_closed(data["sid"].as_str().unwrap_or_default())
            }
        }
    }

    fn on_channel_opened(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.begin_handshake(pending.target_url, pending.extra_headers);
        }
    }

    /// Only the loss of the session the handshake was bound to ends it; a
    /// close queued from an earlier session is ignored.
    fn on_channel_closed(&mut self, sid: &str) {
        if self.session_sid.as_deref() != Some(sid) {
            debug!("Ignoring close of channel session {}", sid);
            return;
        }

        if matches!(
            self.state.phase,
            Phase::HandshakeInFlight | Phase::Connected
        ) {
            warn!("Channel closed during phase {}", self.state.phase);
            self.generation += 1;
            self.state.phase = Phase::Disconnected;
            self.state.last_error = Some(CHANNEL_LOST_MESSAGE.to_string());
            self.target = None;
            self.session_sid = None;
            self.record_trace(DebugTraceEntry::new(
                ids::CHANNEL_TRACE_ID,
                TraceCategory::Error,
                json!({ "error": CHANNEL_LOST_MESSAGE }),
            ));
            self.publish_state();
        }
    }

    fn on_card_fetched(&mut self, generation: u64, result: HandshakeResult<CardResponse>) {
        if generation != self.generation || self.state.phase != Phase::HandshakeInFlight {
            debug!(
                "Discarding stale card fetch (generation {}, current {})",
                generation, self.generation
            );
            return;
        }

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!("Agent card fetch failed: {}", e);
                self.fail_handshake(e.to_string());
                return;
            }
        };

        self.record_trace(DebugTraceEntry::new(
            ids::CARD_FETCH_ID,
            TraceCategory::Response,
            serde_json::to_value(&response).unwrap_or(Value::Null),
        ));
        if !response.validation_errors.is_empty() {
            self.record_trace(DebugTraceEntry::new(
                ids::CARD_FETCH_ID,
                TraceCategory::ValidationError,
                json!({ "validation_errors": response.validation_errors }),
            ));
        }

        self.state.descriptor = Some(response.card);
        self.state.descriptor_validation_errors = response.validation_errors;
        self.publish_state();

        if let Some(target) = self.target.clone() {
            self.emit(
                event_names::INITIALIZE_CLIENT,
                &InitializeClient {
                    url: target.target_url,
                    custom_headers: target.extra_headers,
                },
            );
        }
    }

    fn on_client_initialized(&mut self, data: Value) {
        if self.state.phase != Phase::HandshakeInFlight {
            debug!("Ignoring client_initialized in phase {}", self.state.phase);
            return;
        }

        let ack: ClientInitialized = serde_json::from_value(data).unwrap_or_default();
        if ack.is_success() {
            info!("Agent client initialized");
            self.state.phase = Phase::Connected;
            self.state.last_error = None;
            let ready = ChatEntry::new(ids::system_entry_id(), Sender::System, READY_MESSAGE);
            self.transcript.reset_with(ready.clone());
            let _ = self.updates.send(SessionUpdate::TranscriptCleared);
            let _ = self.updates.send(SessionUpdate::EntryAppended(ready));
            self.publish_state();
        } else {
            let reason = ack
                .message
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| INIT_FAILED_MESSAGE.to_string());
            warn!("Agent client initialization failed: {}", reason);
            self.fail_handshake(reason);
        }
    }

    fn on_agent_response(&mut self, data: Value) {
        let event = AgentEvent::from_value(&data);
        let normalized = normalize(&event);

        if let Some(context_id) = normalized.context_id {
            self.context_id = Some(context_id);
        }

        // Raw events are keyed by the entry they produced, else their own id.
        let trace_id = normalized
            .entry
            .as_ref()
            .map(|entry| entry.id.clone())
            .or_else(|| event.id.clone())
            .unwrap_or_else(ids::agent_entry_id);

        self.record_trace(DebugTraceEntry::new(
            trace_id.clone(),
            TraceCategory::Response,
            data,
        ));
        if !event.validation_errors.is_empty() {
            self.record_trace(DebugTraceEntry::new(
                trace_id,
                TraceCategory::ValidationError,
                json!({ "validation_errors": event.validation_errors }),
            ));
        }

        if let Some(entry) = normalized.entry {
            self.append_entry(entry);
        }
    }

    fn on_debug_log(&mut self, data: Value) {
        let log: DebugLog = match serde_json::from_value(data) {
            Ok(log) => log,
            Err(e) => {
                warn!("Dropping malformed debug_log: {}", e);
                return;
            }
        };

        let category = match log.log_type.parse::<TraceCategory>() {
            Ok(category) => category,
            Err(e) => {
                warn!("Dropping debug_log: {}", e);
                return;
            }
        };

        let entry = DebugTraceEntry::new(log.id.unwrap_or_default(), category, log.data)
            .at(trace_timestamp(log.timestamp));
        self.record_trace(entry);
    }

    fn on_connect_error(&mut self, data: Value) {
        self.record_trace(DebugTraceEntry::new(
            ids::CHANNEL_TRACE_ID,
            TraceCategory::Error,
            data,
        ));
    }

    fn fail_handshake(&mut self, reason: String) {
        self.state.phase = Phase::Failed(reason.clone());
        self.state.last_error = Some(reason.clone());
        self.target = None;
        self.session_sid = None;
        self.record_trace(DebugTraceEntry::new(
            ids::CARD_FETCH_ID,
            TraceCategory::Error,
            json!({ "error": reason }),
        ));
        self.publish_state();
    }

    fn emit<T: serde::Serialize>(&self, event: &str, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => self.channel.emit(event, value),
            Err(e) => warn!("Failed to encode '{}': {}", event, e),
        }
    }

    fn append_entry(&mut self, entry: ChatEntry) {
        if self.transcript.append(entry.clone()) {
            let _ = self.updates.send(SessionUpdate::EntryAppended(entry));
        }
    }

    fn clear_transcript(&mut self) {
        self.transcript.clear();
        let _ = self.updates.send(SessionUpdate::TranscriptCleared);
    }

    fn record_trace(&mut self, entry: DebugTraceEntry) {
        self.trace.record(entry.clone());
        let _ = self.updates.send(SessionUpdate::TraceAppended(entry));
    }

    fn clear_trace(&mut self) {
        self.trace.clear();
        let _ = self.updates.send(SessionUpdate::TraceCleared);
    }

    fn publish_state(&self) {
        let _ = self
            .updates
            .send(SessionUpdate::StateChanged(self.state.clone()));
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state)
            .field("pending", &self.pending)
            .field("generation", &self.generation)
            .field("transcript_len", &self.transcript.len())
            .field("trace_len", &self.trace.len())
            .finish()
    }
}

/// Server timestamps are Unix seconds; values too large for seconds are
/// taken as milliseconds.
fn trace_timestamp(timestamp: Option<f64>) -> DateTime<Utc> {
    timestamp
        .and_then(|ts| {
            let millis = if ts > 1e11 { ts } else { ts * 1000.0 };
            DateTime::from_timestamp_millis(millis as i64)
        })
        .unwrap_or_else(Utc::now)
}
