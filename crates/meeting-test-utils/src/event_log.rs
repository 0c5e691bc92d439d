//! Ordered record of teardown side effects.
//!
//! Mocks built `with_log` append to a shared log as they release resources.
//! Session timer events reach the same log through a thread-local tracing
//! layer, so a current-thread test sees one interleaved sequence.

use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Entry for a session acknowledging a countdown cancel request.
pub const TIMER_CANCELLED: &str = "timer_cancelled";
/// Entry for a live countdown timer being stopped.
pub const TIMER_STOPPED: &str = "timer_stopped";
/// Entry for a peer connection closing.
pub const PEER_CLOSED: &str = "peer_closed";
/// Entry for a capture track being stopped.
pub const TRACK_STOPPED: &str = "track_stopped";
/// Entry for the relay receiving `leave-room`.
pub const LEAVE_ROOM: &str = "leave-room";
/// Entry for the relay connection going away.
pub const RELAY_CLOSED: &str = "relay_closed";

/// Shared, append-only event log. Clones append to the same log.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: &str) {
        self.entries.lock().unwrap().push(entry.to_string());
    }

    /// Everything recorded so far, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Record session timer events emitted on this thread until the guard
    /// is dropped.
    #[must_use]
    pub fn capture_session_events(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::registry().with(SessionEvents { log: self.clone() });
        tracing::subscriber::set_default(subscriber)
    }
}

struct SessionEvents {
    log: EventLog,
}

impl<S: Subscriber> Layer<S> for SessionEvents {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != "meet.session" {
            return;
        }
        let mut message = Message::default();
        event.record(&mut message);
        let entry = match message.0.as_str() {
            "Countdown cancelled" => TIMER_CANCELLED,
            "Stopping countdown timer" => TIMER_STOPPED,
            _ => return,
        };
        self.log.record(entry);
    }
}

#[derive(Default)]
struct Message(String);

impl Visit for Message {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.0 = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}
