//! Channel adapter: event-named subscriptions, emits and the open signal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use a2a_inspector_protocol::{Frame, event_names};
use dashmap::DashMap;
use log::{debug, trace};
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Callback invoked for each arrival of a subscribed event.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Starts the transport behind a [`ChannelAdapter`].
///
/// The driver reports the session through the [`ChannelLink`]: `mark_open`
/// once the server has assigned a session id, `dispatch` for each inbound
/// event, and `mark_closed` when the transport drops. Open and close
/// transitions are also dispatched as `connect` and `disconnect` events, in
/// order with the inbound events of the same driver.
pub trait Connector: Send + Sync + 'static {
    fn start(&self, link: ChannelLink) -> JoinHandle<()>;
}

#[derive(Default)]
struct LinkState {
    /// Bumped on every connect and disconnect; links from older drivers are
    /// ignored.
    epoch: u64,
    starting: bool,
    driver: Option<JoinHandle<()>>,
    sid: Option<String>,
    outbound: Option<mpsc::UnboundedSender<Frame>>,
}

struct Shared {
    handlers: DashMap<String, Vec<(u64, EventHandler)>>,
    next_handler_id: AtomicU64,
    open_tx: watch::Sender<bool>,
    link: Mutex<LinkState>,
}

impl Shared {
    fn link(&self) -> MutexGuard<'_, LinkState> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flip the open flag. Setting the current value is not a transition.
    ///
    /// Returns whether the flag changed.
    fn set_open(&self, open: bool) -> bool {
        let changed = self.open_tx.send_if_modified(|current| {
            if *current == open {
                false
            } else {
                *current = open;
                true
            }
        });
        if changed {
            debug!("Channel is now {}", if open { "open" } else { "closed" });
        }
        changed
    }

    fn dispatch(&self, event: &str, data: &Value) {
        let handlers: Vec<EventHandler> = self
            .handlers
            .get(event)
            .map(|list| list.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default();

        trace!("Dispatching '{}' to {} handler(s)", event, handlers.len());
        for handler in handlers {
            handler(data);
        }
    }

    fn unsubscribe(&self, event: &str, id: u64) {
        if let Some(mut list) = self.handlers.get_mut(event) {
            list.retain(|(handler_id, _)| *handler_id != id);
        }
        self.handlers.remove_if(event, |_, list| list.is_empty());
    }
}

/// Handle the transport driver uses to report back to its adapter.
#[derive(Clone)]
pub struct ChannelLink {
    shared: Arc<Shared>,
    epoch: u64,
}

impl ChannelLink {
    fn is_current(&self, state: &LinkState) -> bool {
        state.epoch == self.epoch
    }

    /// The server assigned a session id; the channel is open.
    pub fn mark_open(&self, sid: impl Into<String>, outbound: mpsc::UnboundedSender<Frame>) {
        let sid = sid.into();
        {
            let mut state = self.shared.link();
            if !self.is_current(&state) {
                return;
            }
            state.sid = Some(sid.clone());
            state.outbound = Some(outbound);
        }
        if self.shared.set_open(true) {
            self.shared
                .dispatch(event_names::CONNECT, &json!({ "sid": sid }));
        }
    }

    /// The transport dropped. The driver may still reconnect.
    pub fn mark_closed(&self) {
        let sid = {
            let mut state = self.shared.link();
            if !self.is_current(&state) {
                return;
            }
            state.outbound = None;
            state.sid.take()
        };
        if self.shared.set_open(false) {
            self.shared
                .dispatch(event_names::DISCONNECT, &json!({ "sid": sid }));
        }
    }

    /// Deliver an inbound event to its subscribers, in subscription order.
    pub fn dispatch(&self, event: &str, data: &Value) {
        if !self.is_current(&self.shared.link()) {
            return;
        }
        self.shared.dispatch(event, data);
    }
}

/// Disposable subscription. Dropping it unsubscribes the handler.
pub struct Subscription {
    shared: Weak<Shared>,
    event: String,
    id: u64,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.unsubscribe(&self.event, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .finish()
    }
}

/// Event-named, bidirectional channel with an observable open flag.
#[derive(Clone)]
pub struct ChannelAdapter {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
}

impl ChannelAdapter {
    pub fn new(connector: impl Connector) -> Self {
        let (open_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                handlers: DashMap::new(),
                next_handler_id: AtomicU64::new(1),
                open_tx,
                link: Mutex::new(LinkState::default()),
            }),
            connector: Arc::new(connector),
        }
    }

    /// Start the transport. No-op if the channel is open or a driver is
    /// already running.
    pub fn connect(&self) {
        let epoch = {
            let mut state = self.shared.link();
            let running = state
                .driver
                .as_ref()
                .is_some_and(|driver| !driver.is_finished());
            if self.is_open() || state.starting || running {
                debug!("Channel connect ignored: already open or connecting");
                return;
            }
            state.epoch += 1;
            state.starting = true;
            state.epoch
        };

        let driver = self.connector.start(ChannelLink {
            shared: Arc::clone(&self.shared),
            epoch,
        });

        let mut state = self.shared.link();
        if state.epoch == epoch {
            state.starting = false;
            state.driver = Some(driver);
        } else {
            // Disconnected while the driver was starting.
            driver.abort();
        }
    }

    /// Stop the transport and mark the channel closed.
    ///
    /// Local teardown raises no `disconnect` event.
    pub fn disconnect(&self) {
        let driver = {
            let mut state = self.shared.link();
            state.epoch += 1;
            state.starting = false;
            state.sid = None;
            state.outbound = None;
            state.driver.take()
        };
        if let Some(driver) = driver {
            driver.abort();
        }
        self.shared.set_open(false);
    }

    /// Send an event. Silently dropped while the channel is not open.
    pub fn emit(&self, event: &str, payload: Value) {
        let state = self.shared.link();
        match state.outbound.as_ref() {
            Some(outbound) if self.is_open() => {
                if outbound.send(Frame::new(event, payload)).is_err() {
                    debug!("Channel driver gone, dropping '{}'", event);
                }
            }
            _ => debug!("Channel not open, dropping '{}'", event),
        }
    }

    /// Register a handler for an event name.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.shared.next_handler_id.fetch_add(1, Ordering::Relaxed);
        self.shared
            .handlers
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));

        Subscription {
            shared: Arc::downgrade(&self.shared),
            event: event.to_string(),
            id,
        }
    }

    pub fn is_open(&self) -> bool {
        *self.shared.open_tx.borrow()
    }

    /// Receiver observing open/closed transitions.
    pub fn watch_open(&self) -> watch::Receiver<bool> {
        self.shared.open_tx.subscribe()
    }

    /// Session id assigned by the server while the channel is open.
    pub fn sid(&self) -> Option<String> {
        self.shared.link().sid.clone()
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.shared.handlers.get(event).map_or(0, |list| list.len())
    }
}

impl std::fmt::Debug for ChannelAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelAdapter")
            .field("open", &self.is_open())
            .field("sid", &self.sid())
            .finish()
    }
}
