//! Identity generation for transcript entries and outbound messages.

use rand::Rng;

/// Trace id of the capability fetch (request, response and errors share it).
pub const CARD_FETCH_ID: &str = "http-agent-card";

/// Trace id of channel-level failures (transport errors, session loss).
pub const CHANNEL_TRACE_ID: &str = "channel";

const SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Id for an outbound user message: `msg-<millis>-<random>`.
pub fn message_id() -> String {
    prefixed_id("msg")
}

/// Id for an entry produced from an inbound agent event.
pub fn agent_entry_id() -> String {
    prefixed_id("agent")
}

/// Id for the system entry seeded on connect.
pub fn system_entry_id() -> String {
    format!("system-{}", now_millis())
}

fn prefixed_id(prefix: &str) -> String {
    format!("{}-{}-{}", prefix, now_millis(), random_suffix())
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect()
}
