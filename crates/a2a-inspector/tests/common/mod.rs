//! Test utilities and common setup.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use a2a_inspector::{
    CardFetcher, ChannelAdapter, ChannelLink, Connector, FetchRequest, HandshakeError,
    HandshakeResult, SessionController,
};
use a2a_inspector_protocol::{AgentCard, CardResponse, CustomHeaders, Frame};
use async_trait::async_trait;
use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;

pub const ENDPOINT: &str = "http://backend.test/agent-card";
pub const TEST_SID: &str = "test-sid";

// ============================================================================
// In-process channel
// ============================================================================

#[derive(Default)]
struct ManualState {
    links: Vec<ChannelLink>,
}

/// Connector driven by the test: nothing opens until `open` is called.
#[derive(Clone, Default)]
pub struct ManualConnector {
    state: Arc<Mutex<ManualState>>,
}

impl ManualConnector {
    fn link(&self) -> ChannelLink {
        self.state
            .lock()
            .unwrap()
            .links
            .last()
            .cloned()
            .expect("channel connect was never requested")
    }

    /// Number of times the adapter started a driver.
    pub fn starts(&self) -> usize {
        self.state.lock().unwrap().links.len()
    }

    /// Open the channel with a session id; returns the outbound frames.
    pub fn open(&self, sid: &str) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.link().mark_open(sid, tx);
        rx
    }

    pub fn close(&self) {
        self.link().mark_closed();
    }

    /// Deliver an inbound server event.
    pub fn deliver(&self, event: &str, data: Value) {
        self.link().dispatch(event, &data);
    }
}

impl Connector for ManualConnector {
    fn start(&self, link: ChannelLink) -> JoinHandle<()> {
        self.state.lock().unwrap().links.push(link);
        tokio::spawn(std::future::pending::<()>())
    }
}

// ============================================================================
// Scripted capability fetch
// ============================================================================

/// Fetcher answering from a queue of canned results.
///
/// A held fetcher blocks every fetch until `release` is called.
pub struct ScriptedFetcher {
    responses: Mutex<VecDeque<HandshakeResult<CardResponse>>>,
    requests: Mutex<Vec<FetchRequest>>,
    gate: Semaphore,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Self::with_permits(1_000)
    }

    pub fn held() -> Arc<Self> {
        Self::with_permits(0)
    }

    fn with_permits(permits: usize) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            gate: Semaphore::new(permits),
        })
    }

    pub fn push_ok(&self, response: CardResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_err(&self, error: HandshakeError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CardFetcher for ScriptedFetcher {
    fn endpoint(&self) -> String {
        ENDPOINT.to_string()
    }

    async fn fetch_card(&self, request: FetchRequest) -> HandshakeResult<CardResponse> {
        self.requests.lock().unwrap().push(request);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(HandshakeError::Status(500)))
    }
}

// ============================================================================
// Controller harness
// ============================================================================

pub struct Harness {
    pub controller: SessionController,
    pub connector: ManualConnector,
    pub fetcher: Arc<ScriptedFetcher>,
}

pub fn harness(fetcher: Arc<ScriptedFetcher>) -> Harness {
    let connector = ManualConnector::default();
    let channel = ChannelAdapter::new(connector.clone());
    let controller = SessionController::new(channel, fetcher.clone());
    Harness {
        controller,
        connector,
        fetcher,
    }
}

/// Apply exactly one queued event, failing if none arrives.
pub async fn step(controller: &mut SessionController) {
    tokio::time::timeout(Duration::from_secs(2), controller.step())
        .await
        .expect("controller made no progress");
}

/// Whether the controller has nothing to apply right now.
pub async fn is_idle(controller: &mut SessionController) -> bool {
    tokio::time::timeout(Duration::from_millis(50), controller.step())
        .await
        .is_err()
}

pub fn card_response(name: &str, validation_errors: &[&str]) -> CardResponse {
    CardResponse {
        card: AgentCard {
            name: Some(name.to_string()),
            ..AgentCard::default()
        },
        validation_errors: validation_errors.iter().map(|e| e.to_string()).collect(),
    }
}

pub fn headers(pairs: &[(&str, &str)]) -> CustomHeaders {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<Frame>) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}

/// Run a full handshake against `url` and return the outbound frame stream.
pub async fn connect_fully(h: &mut Harness, url: &str) -> mpsc::UnboundedReceiver<Frame> {
    h.fetcher.push_ok(card_response("Echo Agent", &[]));
    h.controller.connect(url.to_string(), CustomHeaders::new());
    let mut outbound = h.connector.open("sid-1");
    step(&mut h.controller).await; // channel open, fetch issued
    step(&mut h.controller).await; // fetch result
    h.connector
        .deliver("client_initialized", json!({ "status": "success" }));
    step(&mut h.controller).await;
    assert!(h.controller.state().is_connected());
    drain(&mut outbound);
    outbound
}

// ============================================================================
// Fake inspector backend
// ============================================================================

/// Serve a minimal inspector backend on an ephemeral port.
pub async fn spawn_backend() -> SocketAddr {
    let app = Router::new()
        .route("/agent-card", post(agent_card))
        .route("/ws", get(ws_handler));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test backend");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    addr
}

async fn agent_card(headers: HeaderMap, axum::Json(body): axum::Json<Value>) -> Response {
    let url = body["url"].as_str().unwrap_or_default();

    if url.contains("broken") {
        return (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({ "error": "Agent card not found" })),
        )
            .into_response();
    }
    if url.contains("down") {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let api_key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    axum::Json(json!({
        "card": {
            "name": "Echo Agent",
            "description": format!("key={api_key}"),
            "url": url,
            "version": "1.0.0",
            "capabilities": { "streaming": true },
            "defaultInputModes": ["text"],
            "defaultOutputModes": ["text"],
            "skills": [],
            "sid": body["sid"],
        },
        "validation_errors": ["Field 'protocolVersion' is missing"],
    }))
    .into_response()
}

async fn ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(handle_socket)
}

async fn send_frame(socket: &mut WebSocket, event: &str, data: Value) -> Result<(), axum::Error> {
    let text = serde_json::to_string(&Frame::new(event, data)).unwrap_or_default();
    socket.send(Message::Text(text.into())).await
}

async fn handle_socket(mut socket: WebSocket) {
    if send_frame(&mut socket, "connected", json!({ "sid": TEST_SID }))
        .await
        .is_err()
    {
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<Frame>(text.as_str()) else {
            continue;
        };

        let replies = match frame.event.as_str() {
            "initialize_client" => vec![("client_initialized", json!({ "status": "success" }))],
            "send_message" => {
                let id = frame.data["id"].clone();
                let message = frame.data["message"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                vec![
                    (
                        "debug_log",
                        json!({
                            "type": "request",
                            "id": id,
                            "data": { "method": "message/send", "params": frame.data.clone() },
                            "timestamp": 1_700_000_000.0,
                        }),
                    ),
                    (
                        "agent_response",
                        json!({
                            "kind": "message",
                            "id": id,
                            "contextId": "ctx-e2e",
                            "role": "agent",
                            "parts": [{ "kind": "text", "text": format!("echo: {message}") }],
                            "validation_errors": [],
                        }),
                    ),
                ]
            }
            _ => Vec::new(),
        };

        for (event, data) in replies {
            if send_frame(&mut socket, event, data).await.is_err() {
                return;
            }
        }
    }
}
