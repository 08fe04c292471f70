//! Session controller and its state model.

mod controller;
mod models;

pub use controller::{READY_MESSAGE, SessionController};
pub use models::{ConnectionState, Intent, PendingConnection, Phase, SessionUpdate};
