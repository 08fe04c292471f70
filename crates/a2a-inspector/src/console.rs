//! Terminal presentation: input parsing and plain-text rendering of session
//! updates.

use a2a_inspector::{
    ChatEntry, ConnectionState, DebugTrace, DebugTraceEntry, Phase, SessionUpdate,
};

/// One line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Send(String),
    Raw(String),
    Trace,
    Card,
    Disconnect,
    Quit,
    Help,
    Empty,
    Unknown(String),
}

pub const HELP: &str = "\
Commands:
  /raw <id>     show trace entries for an entry id (shown in parentheses)
  /trace        show the whole debug trace
  /card         show the agent card and its validation errors
  /disconnect   end the session
  /quit         exit
Anything else is sent to the agent.";

pub fn parse_line(line: &str) -> ConsoleCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ConsoleCommand::Empty;
    }

    let Some(rest) = trimmed.strip_prefix('/') else {
        return ConsoleCommand::Send(line.trim_end_matches(['\r', '\n']).to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match name {
        "raw" if !arg.is_empty() => ConsoleCommand::Raw(arg.to_string()),
        "trace" => ConsoleCommand::Trace,
        "card" => ConsoleCommand::Card,
        "disconnect" => ConsoleCommand::Disconnect,
        "quit" | "exit" => ConsoleCommand::Quit,
        "help" => ConsoleCommand::Help,
        _ => ConsoleCommand::Unknown(trimmed.to_string()),
    }
}

/// Local mirror of controller state, rebuilt from [`SessionUpdate`]s.
#[derive(Debug, Default)]
pub struct SessionView {
    pub state: ConnectionState,
    pub trace: DebugTrace,
}

impl SessionView {
    pub fn apply(&mut self, update: &SessionUpdate) {
        match update {
            SessionUpdate::StateChanged(state) => self.state = state.clone(),
            SessionUpdate::TraceAppended(entry) => self.trace.record(entry.clone()),
            SessionUpdate::TraceCleared => self.trace.clear(),
            SessionUpdate::EntryAppended(_) | SessionUpdate::TranscriptCleared => {}
        }
    }
}

pub fn format_entry(entry: &ChatEntry) -> String {
    let mut out = format!("[{}] {} ({})", entry.sender, entry.content, entry.id);
    for error in entry.validation_errors.iter().flatten() {
        out.push_str("\n    ! ");
        out.push_str(error);
    }
    out
}

pub fn format_trace_entry(entry: &DebugTraceEntry) -> String {
    let payload = serde_json::to_string_pretty(&entry.payload)
        .unwrap_or_else(|_| entry.payload.to_string());
    format!(
        "{} {} [{}]\n{}",
        entry.timestamp.format("%H:%M:%S%.3f"),
        entry.category,
        entry.id,
        payload
    )
}

pub fn format_state(state: &ConnectionState) -> String {
    match &state.phase {
        Phase::Connected => {
            let name = state
                .descriptor
                .as_ref()
                .and_then(|card| card.name.as_deref())
                .unwrap_or("agent");
            format!("-- connected to {name}")
        }
        Phase::Failed(reason) => format!("-- connection failed: {reason}"),
        other => format!("-- {other}"),
    }
}

/// Render an update for the transcript view, if it is something the
/// operator should see.
pub fn render_update(update: &SessionUpdate, json: bool) -> Option<String> {
    match update {
        SessionUpdate::EntryAppended(entry) if json => serde_json::to_string(entry).ok(),
        SessionUpdate::EntryAppended(entry) => Some(format_entry(entry)),
        SessionUpdate::StateChanged(state) if json => serde_json::to_string(state).ok(),
        SessionUpdate::StateChanged(state) => Some(format_state(state)),
        _ => None,
    }
}
