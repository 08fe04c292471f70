//! Session controller integration tests over an in-process channel.

use a2a_inspector::session::READY_MESSAGE;
use a2a_inspector::{HandshakeError, Phase, Sender, SessionUpdate, TraceCategory};
use a2a_inspector_protocol::CustomHeaders;
use serde_json::json;

mod common;
use common::{
    ENDPOINT, card_response, connect_fully, drain, harness, headers, is_idle, step,
    ScriptedFetcher,
};

#[tokio::test]
async fn test_connect_waits_for_channel_then_fetches() {
    let mut h = harness(ScriptedFetcher::new());
    h.fetcher.push_ok(card_response("Echo Agent", &[]));

    h.controller.connect(
        "http://agent.example.com".to_string(),
        headers(&[("Authorization", "Bearer abc")]),
    );

    let pending = h.controller.pending().expect("pending connection");
    assert_eq!(pending.target_url, "http://agent.example.com");
    assert_eq!(h.controller.state().phase, Phase::Disconnected);
    assert_eq!(h.connector.starts(), 1);
    assert!(h.fetcher.requests().is_empty());

    let _outbound = h.connector.open("sid-1");
    step(&mut h.controller).await;

    assert!(h.controller.pending().is_none());
    assert_eq!(h.controller.state().phase, Phase::HandshakeInFlight);

    let request = h
        .controller
        .trace()
        .latest("http-agent-card", TraceCategory::Request)
        .expect("fetch request traced");
    assert_eq!(
        request.payload,
        json!({
            "endpoint": ENDPOINT,
            "payload": { "url": "http://agent.example.com", "sid": "sid-1" },
        })
    );

    step(&mut h.controller).await;
    let requests = h.fetcher.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].sid, "sid-1");
    assert_eq!(requests[0].headers["Authorization"], "Bearer abc");
}

#[tokio::test]
async fn test_last_connect_intent_wins_while_closed() {
    let mut h = harness(ScriptedFetcher::new());
    h.fetcher.push_ok(card_response("Second", &[]));

    h.controller
        .connect("http://first.example.com".to_string(), CustomHeaders::new());
    h.controller
        .connect("http://second.example.com".to_string(), CustomHeaders::new());

    assert_eq!(
        h.controller.pending().map(|p| p.target_url.as_str()),
        Some("http://second.example.com")
    );
    assert_eq!(h.connector.starts(), 1);

    let _outbound = h.connector.open("sid-1");
    step(&mut h.controller).await;
    step(&mut h.controller).await;

    let urls: Vec<String> = h.fetcher.requests().into_iter().map(|r| r.url).collect();
    assert_eq!(urls, vec!["http://second.example.com".to_string()]);
}

#[tokio::test]
async fn test_validation_errors_stored_and_initialize_emitted() {
    let mut h = harness(ScriptedFetcher::new());
    h.fetcher
        .push_ok(card_response("Echo Agent", &["missing field 'url'"]));

    let extra = headers(&[("X-Api-Key", "secret")]);
    h.controller
        .connect("http://agent.example.com".to_string(), extra.clone());
    let mut outbound = h.connector.open("sid-1");
    step(&mut h.controller).await;
    step(&mut h.controller).await;

    let state = h.controller.state();
    assert_eq!(state.phase, Phase::HandshakeInFlight);
    assert_eq!(
        state.descriptor.as_ref().and_then(|c| c.name.as_deref()),
        Some("Echo Agent")
    );
    assert_eq!(
        state.descriptor_validation_errors,
        vec!["missing field 'url'".to_string()]
    );
    assert!(
        h.controller
            .trace()
            .latest("http-agent-card", TraceCategory::ValidationError)
            .is_some()
    );

    let frames = drain(&mut outbound);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].event, "initialize_client");
    assert_eq!(
        frames[0].data,
        json!({ "url": "http://agent.example.com", "customHeaders": { "X-Api-Key": "secret" } })
    );
}

#[tokio::test]
async fn test_ack_success_connects_with_single_system_entry() {
    let mut h = harness(ScriptedFetcher::new());
    let mut updates = h.controller.subscribe_updates();
    connect_fully(&mut h, "http://agent.example.com").await;

    let state = h.controller.state();
    assert_eq!(state.phase, Phase::Connected);
    assert!(state.last_error.is_none());

    let entries = h.controller.transcript().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].sender, Sender::System);
    assert_eq!(entries[0].content, READY_MESSAGE);
    assert!(entries[0].id.starts_with("system-"));

    let mut saw_connected = false;
    while let Ok(update) = updates.try_recv() {
        if let SessionUpdate::StateChanged(state) = update {
            saw_connected |= state.phase == Phase::Connected;
        }
    }
    assert!(saw_connected);
}

#[tokio::test]
async fn test_ack_failure_keeps_descriptor() {
    let mut h = harness(ScriptedFetcher::new());
    h.fetcher.push_ok(card_response("Echo Agent", &[]));
    h.controller
        .connect("http://agent.example.com".to_string(), CustomHeaders::new());
    let _outbound = h.connector.open("sid-1");
    step(&mut h.controller).await;
    step(&mut h.controller).await;

    h.connector.deliver(
        "client_initialized",
        json!({ "status": "error", "message": "Agent refused connection" }),
    );
    step(&mut h.controller).await;

    let state = h.controller.state();
    assert_eq!(
        state.phase,
        Phase::Failed("Agent refused connection".to_string())
    );
    assert_eq!(state.last_error.as_deref(), Some("Agent refused connection"));
    assert!(state.descriptor.is_some());
}

#[tokio::test]
async fn test_ack_failure_without_message_uses_default() {
    let mut h = harness(ScriptedFetcher::new());
    h.fetcher.push_ok(card_response("Echo Agent", &[]));
    h.controller
        .connect("http://agent.example.com".to_string(), CustomHeaders::new());
    let _outbound = h.connector.open("sid-1");
    step(&mut h.controller).await;
    step(&mut h.controller).await;

    h.connector
        .deliver("client_initialized", json!({ "status": "error" }));
    step(&mut h.controller).await;

    assert_eq!(
        h.controller.state().phase,
        Phase::Failed("Failed to initialize client".to_string())
    );
}

#[tokio::test]
async fn test_fetch_rejection_fails_without_retry() {
    let mut h = harness(ScriptedFetcher::new());
    h.fetcher
        .push_err(HandshakeError::Rejected("Agent card not found".to_string()));

    h.controller
        .connect("http://agent.example.com".to_string(), CustomHeaders::new());
    let mut outbound = h.connector.open("sid-1");
    step(&mut h.controller).await;
    step(&mut h.controller).await;

    let state = h.controller.state();
    assert_eq!(state.phase, Phase::Failed("Agent card not found".to_string()));
    assert_eq!(state.last_error.as_deref(), Some("Agent card not found"));
    assert!(drain(&mut outbound).is_empty());
    assert!(is_idle(&mut h.controller).await);
    assert_eq!(h.fetcher.requests().len(), 1);

    let error = h
        .controller
        .trace()
        .latest("http-agent-card", TraceCategory::Error)
        .expect("error traced");
    assert_eq!(error.payload, json!({ "error": "Agent card not found" }));
}

#[tokio::test]
async fn test_fetch_status_error_message() {
    let mut h = harness(ScriptedFetcher::new());
    h.fetcher.push_err(HandshakeError::Status(502));

    h.controller
        .connect("http://agent.example.com".to_string(), CustomHeaders::new());
    let _outbound = h.connector.open("sid-1");
    step(&mut h.controller).await;
    step(&mut h.controller).await;

    assert_eq!(
        h.controller.state().last_error.as_deref(),
        Some("HTTP error! status: 502")
    );
}

#[tokio::test]
async fn test_reconnect_from_failed_on_open_channel() {
    let mut h = harness(ScriptedFetcher::new());
    h.fetcher.push_err(HandshakeError::Status(500));
    h.controller
        .connect("http://agent.example.com".to_string(), CustomHeaders::new());
    let _outbound = h.connector.open("sid-1");
    step(&mut h.controller).await;
    step(&mut h.controller).await;
    assert!(matches!(h.controller.state().phase, Phase::Failed(_)));

    h.fetcher.push_ok(card_response("Echo Agent", &[]));
    h.controller
        .connect("http://agent.example.com".to_string(), CustomHeaders::new());
    assert_eq!(h.controller.state().phase, Phase::HandshakeInFlight);
    step(&mut h.controller).await;
    assert!(h.controller.state().descriptor.is_some());
    assert_eq!(h.connector.starts(), 1);
}

#[tokio::test]
async fn test_connect_ignored_while_connected() {
    let mut h = harness(ScriptedFetcher::new());
    connect_fully(&mut h, "http://agent.example.com").await;
    let generation = h.controller.generation();

    h.controller
        .connect("http://other.example.com".to_string(), CustomHeaders::new());

    assert_eq!(h.controller.state().phase, Phase::Connected);
    assert_eq!(h.controller.generation(), generation);
    assert_eq!(h.fetcher.requests().len(), 1);
    assert!(h.controller.pending().is_none());
}

#[tokio::test]
async fn test_first_non_empty_text_part_wins() {
    let mut h = harness(ScriptedFetcher::new());
    connect_fully(&mut h, "http://agent.example.com").await;

    h.connector.deliver(
        "agent_response",
        json!({
            "kind": "message",
            "parts": [{}, { "text": "hi" }, { "text": "later" }],
            "validation_errors": [],
        }),
    );
    step(&mut h.controller).await;

    let entry = h.controller.transcript().last().expect("entry");
    assert_eq!(entry.sender, Sender::Agent);
    assert_eq!(entry.content, "hi");
    assert_eq!(entry.event_kind.as_deref(), Some("message"));

    let response = h
        .controller
        .trace()
        .latest(&entry.id, TraceCategory::Response)
        .expect("response traced under the entry id");
    assert_eq!(response.payload["kind"], "message");
}

#[tokio::test]
async fn test_error_short_circuits_kind_and_stays_connected() {
    let mut h = harness(ScriptedFetcher::new());
    connect_fully(&mut h, "http://agent.example.com").await;

    h.connector.deliver(
        "agent_response",
        json!({
            "kind": "task",
            "id": "msg-1",
            "error": "boom",
            "status": { "state": "working" },
            "validation_errors": ["bad"],
        }),
    );
    step(&mut h.controller).await;

    let entry = h.controller.transcript().last().expect("entry");
    assert_eq!(entry.sender, Sender::ErrorNotice);
    assert_eq!(entry.content, "Error: boom");
    assert_eq!(entry.validation_errors, Some(vec!["bad".to_string()]));
    assert_eq!(h.controller.state().phase, Phase::Connected);

    let categories: Vec<TraceCategory> = h
        .controller
        .trace()
        .by_id(&entry.id)
        .map(|e| e.category)
        .collect();
    assert_eq!(
        categories,
        vec![TraceCategory::Response, TraceCategory::ValidationError]
    );
}

#[tokio::test]
async fn test_send_while_disconnected_does_nothing() {
    let mut h = harness(ScriptedFetcher::new());

    assert!(h.controller.send_message("hello").is_none());

    assert!(h.controller.transcript().is_empty());
    assert_eq!(h.connector.starts(), 0);
    assert_eq!(h.controller.state().phase, Phase::Disconnected);
}

#[tokio::test]
async fn test_send_appends_user_entry_and_emits() {
    let mut h = harness(ScriptedFetcher::new());
    let mut outbound = connect_fully(&mut h, "http://agent.example.com").await;

    let id = h.controller.send_message("What can you do?").expect("sent");
    assert!(id.starts_with("msg-"));

    let entry = h.controller.transcript().last().expect("entry");
    assert_eq!(entry.id, id);
    assert_eq!(entry.sender, Sender::User);

    let frames = drain(&mut outbound);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].event, "send_message");
    assert_eq!(
        frames[0].data,
        json!({ "message": "What can you do?", "id": id, "contextId": null })
    );

    assert!(h.controller.send_message("   ").is_none());
    assert!(drain(&mut outbound).is_empty());
}

#[tokio::test]
async fn test_context_id_updates_even_without_entry() {
    let mut h = harness(ScriptedFetcher::new());
    let mut outbound = connect_fully(&mut h, "http://agent.example.com").await;
    let before = h.controller.transcript().len();

    h.connector.deliver(
        "agent_response",
        json!({
            "kind": "status-update",
            "contextId": "ctx-42",
            "status": { "state": "working" },
        }),
    );
    step(&mut h.controller).await;

    assert_eq!(h.controller.transcript().len(), before);
    assert_eq!(h.controller.context_id(), Some("ctx-42"));

    h.controller.send_message("follow up");
    let frames = drain(&mut outbound);
    assert_eq!(frames[0].data["contextId"], "ctx-42");
}

#[tokio::test]
async fn test_artifact_parts_concatenate() {
    let mut h = harness(ScriptedFetcher::new());
    connect_fully(&mut h, "http://agent.example.com").await;

    h.connector.deliver(
        "agent_response",
        json!({
            "kind": "artifact-update",
            "artifact": {
                "parts": [
                    { "text": "Report: " },
                    { "file": { "uri": "https://files.example.com/r.pdf", "mimeType": "application/pdf" } },
                    {},
                ]
            },
        }),
    );
    step(&mut h.controller).await;

    assert_eq!(
        h.controller.transcript().last().map(|e| e.content.as_str()),
        Some("Report: File received (application/pdf): [Open Link](https://files.example.com/r.pdf)")
    );
}

#[tokio::test]
async fn test_disconnect_from_connected_clears_everything() {
    let mut h = harness(ScriptedFetcher::new());
    connect_fully(&mut h, "http://agent.example.com").await;
    h.connector.deliver(
        "agent_response",
        json!({ "kind": "message", "contextId": "ctx-1", "parts": [{ "text": "hi" }] }),
    );
    step(&mut h.controller).await;
    let generation = h.controller.generation();

    h.controller.disconnect();

    let state = h.controller.state();
    assert_eq!(state.phase, Phase::Disconnected);
    assert!(state.descriptor.is_none());
    assert!(state.descriptor_validation_errors.is_empty());
    assert!(state.last_error.is_none());
    assert!(h.controller.transcript().is_empty());
    assert!(h.controller.trace().is_empty());
    assert!(h.controller.context_id().is_none());
    assert!(!h.controller.channel().is_open());
    assert!(h.controller.generation() > generation);
    assert_eq!(h.controller.channel().subscriber_count("agent_response"), 0);
    assert!(is_idle(&mut h.controller).await);
}

#[tokio::test]
async fn test_disconnect_outside_connected_is_noop() {
    let mut h = harness(ScriptedFetcher::held());
    h.fetcher.push_ok(card_response("Echo Agent", &[]));
    h.controller
        .connect("http://agent.example.com".to_string(), CustomHeaders::new());
    let _outbound = h.connector.open("sid-1");
    step(&mut h.controller).await;

    let generation = h.controller.generation();
    h.controller.disconnect();

    assert_eq!(h.controller.state().phase, Phase::HandshakeInFlight);
    assert_eq!(h.controller.generation(), generation);
    assert!(h.controller.channel().is_open());
    assert!(!h.controller.trace().is_empty());
}

#[tokio::test]
async fn test_stale_fetch_discarded_after_channel_loss() {
    let mut h = harness(ScriptedFetcher::held());
    h.fetcher.push_ok(card_response("Echo Agent", &[]));
    h.controller
        .connect("http://agent.example.com".to_string(), CustomHeaders::new());
    let _outbound = h.connector.open("sid-1");
    step(&mut h.controller).await;
    assert_eq!(h.controller.state().phase, Phase::HandshakeInFlight);

    h.connector.close();
    step(&mut h.controller).await;
    assert_eq!(h.controller.state().phase, Phase::Disconnected);
    assert!(
        h.controller
            .trace()
            .latest("channel", TraceCategory::Error)
            .is_some()
    );

    h.fetcher.release();
    step(&mut h.controller).await;

    let state = h.controller.state();
    assert_eq!(state.phase, Phase::Disconnected);
    assert!(state.descriptor.is_none());
}

#[tokio::test]
async fn test_newer_handshake_supersedes_older_fetch() {
    let mut h = harness(ScriptedFetcher::held());
    h.fetcher.push_ok(card_response("First", &[]));
    h.fetcher.push_ok(card_response("Second", &[]));

    h.controller
        .connect("http://first.example.com".to_string(), CustomHeaders::new());
    let mut outbound = h.connector.open("sid-1");
    step(&mut h.controller).await;

    h.controller
        .connect("http://second.example.com".to_string(), CustomHeaders::new());
    assert_eq!(h.controller.state().phase, Phase::HandshakeInFlight);

    // Release the older fetch alone; its result is stale.
    h.fetcher.release();
    step(&mut h.controller).await;
    assert!(h.controller.state().descriptor.is_none());

    h.fetcher.release();
    step(&mut h.controller).await;
    assert!(h.controller.state().descriptor.is_some());

    let frames = drain(&mut outbound);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].data["url"], "http://second.example.com");
}

#[tokio::test]
async fn test_channel_loss_while_connected_keeps_transcript() {
    let mut h = harness(ScriptedFetcher::new());
    connect_fully(&mut h, "http://agent.example.com").await;

    h.connector.close();
    step(&mut h.controller).await;

    let state = h.controller.state();
    assert_eq!(state.phase, Phase::Disconnected);
    assert!(state.last_error.is_some());
    assert_eq!(h.controller.transcript().len(), 1);
}

#[tokio::test]
async fn test_stale_ack_ignored() {
    let mut h = harness(ScriptedFetcher::new());
    h.controller
        .connect("http://agent.example.com".to_string(), CustomHeaders::new());
    let _outbound = h.connector.open("sid-1");
    step(&mut h.controller).await;
    step(&mut h.controller).await; // default scripted result: HTTP 500
    assert!(matches!(h.controller.state().phase, Phase::Failed(_)));

    h.connector
        .deliver("client_initialized", json!({ "status": "success" }));
    step(&mut h.controller).await;

    assert!(matches!(h.controller.state().phase, Phase::Failed(_)));
    assert!(h.controller.transcript().is_empty());
}

#[tokio::test]
async fn test_debug_log_appended_and_unknown_type_dropped() {
    let mut h = harness(ScriptedFetcher::new());
    connect_fully(&mut h, "http://agent.example.com").await;
    let before = h.controller.trace().len();

    h.connector.deliver(
        "debug_log",
        json!({
            "type": "request",
            "id": "msg-7",
            "data": { "method": "message/send" },
            "timestamp": 1_700_000_000.25,
        }),
    );
    step(&mut h.controller).await;
    h.connector.deliver(
        "debug_log",
        json!({ "type": "warning", "id": "msg-7", "data": {} }),
    );
    step(&mut h.controller).await;

    assert_eq!(h.controller.trace().len(), before + 1);
    let entry = h
        .controller
        .trace()
        .latest("msg-7", TraceCategory::Request)
        .expect("request entry");
    assert_eq!(entry.payload, json!({ "method": "message/send" }));
    assert_eq!(entry.timestamp.timestamp_millis(), 1_700_000_000_250);
}

#[tokio::test]
async fn test_connect_error_traced() {
    let mut h = harness(ScriptedFetcher::new());
    h.controller
        .connect("http://agent.example.com".to_string(), CustomHeaders::new());

    h.connector
        .deliver("connect_error", json!({ "message": "connection refused" }));
    step(&mut h.controller).await;

    let entry = h
        .controller
        .trace()
        .latest("channel", TraceCategory::Error)
        .expect("connect error traced");
    assert_eq!(entry.payload["message"], "connection refused");
    assert!(h.controller.pending().is_some());
}

#[tokio::test]
async fn test_connect_racing_open_transition_keeps_latest_target() {
    let mut h = harness(ScriptedFetcher::new());
    h.fetcher.push_ok(card_response("B", &[]));
    h.fetcher.push_ok(card_response("A", &[]));

    h.controller
        .connect("http://a.example.com".to_string(), CustomHeaders::new());
    let mut outbound = h.connector.open("sid-1");
    // Channel already open, transition not yet applied.
    h.controller
        .connect("http://b.example.com".to_string(), CustomHeaders::new());
    assert!(h.controller.pending().is_none());

    while !is_idle(&mut h.controller).await {}

    let urls: Vec<String> = h.fetcher.requests().into_iter().map(|r| r.url).collect();
    assert_eq!(urls, vec!["http://b.example.com".to_string()]);
    assert_eq!(
        h.controller.state().descriptor.as_ref().and_then(|c| c.name.as_deref()),
        Some("B")
    );

    let frames = drain(&mut outbound);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].data["url"], "http://b.example.com");
}

#[tokio::test]
async fn test_close_then_reopen_while_connected_ends_session() {
    let mut h = harness(ScriptedFetcher::new());
    connect_fully(&mut h, "http://agent.example.com").await;

    h.connector.close();
    let _outbound = h.connector.open("sid-2");
    while !is_idle(&mut h.controller).await {}

    let state = h.controller.state();
    assert_eq!(state.phase, Phase::Disconnected);
    assert_eq!(state.last_error.as_deref(), Some("Channel connection lost"));
    assert_eq!(h.controller.channel().sid().as_deref(), Some("sid-2"));
    assert!(h.controller.send_message("hello").is_none());
}

#[tokio::test]
async fn test_stale_close_does_not_end_newer_handshake() {
    let mut h = harness(ScriptedFetcher::held());
    h.fetcher.push_ok(card_response("Echo Agent", &[]));
    h.controller
        .connect("http://agent.example.com".to_string(), CustomHeaders::new());
    let _first = h.connector.open("sid-1");
    h.connector.close();
    let _second = h.connector.open("sid-2");

    // Opened(sid-1) starts the handshake on the current session, sid-2.
    step(&mut h.controller).await;
    assert_eq!(h.controller.state().phase, Phase::HandshakeInFlight);
    step(&mut h.controller).await; // close of sid-1
    step(&mut h.controller).await; // open of sid-2

    assert_eq!(h.controller.state().phase, Phase::HandshakeInFlight);
    h.fetcher.release();
    step(&mut h.controller).await;
    assert_eq!(h.fetcher.requests()[0].sid, "sid-2");
    assert!(h.controller.state().descriptor.is_some());
}

#[tokio::test]
async fn test_raw_trace_found_by_entry_id() {
    let mut h = harness(ScriptedFetcher::new());
    connect_fully(&mut h, "http://agent.example.com").await;

    h.connector.deliver(
        "agent_response",
        json!({ "kind": "message", "id": "task-77", "parts": [{ "text": "hi" }] }),
    );
    step(&mut h.controller).await;

    let entry = h.controller.transcript().last().expect("entry");
    let raw: Vec<_> = h.controller.trace().by_id(&entry.id).collect();
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0].category, TraceCategory::Response);
    assert_eq!(raw[0].payload["id"], "task-77");
}

#[tokio::test]
async fn test_retry_clears_previous_error() {
    let mut h = harness(ScriptedFetcher::held());
    h.fetcher.push_err(HandshakeError::Status(502));
    h.controller
        .connect("http://agent.example.com".to_string(), CustomHeaders::new());
    let _outbound = h.connector.open("sid-1");
    step(&mut h.controller).await;
    h.fetcher.release();
    step(&mut h.controller).await;
    assert!(h.controller.state().last_error.is_some());

    h.controller
        .connect("http://agent.example.com".to_string(), CustomHeaders::new());

    let state = h.controller.state();
    assert_eq!(state.phase, Phase::HandshakeInFlight);
    assert!(state.last_error.is_none());
}
