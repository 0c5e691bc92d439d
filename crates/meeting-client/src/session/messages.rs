//! Session actor mailbox messages and the observer snapshot.

use crate::errors::ClientError;
use crate::meeting::Meeting;
use crate::session::state::SessionState;
use common::types::MeetingId;
use tokio::sync::oneshot;

/// Reply channel used by request/response messages.
pub(crate) type Reply<T> = oneshot::Sender<Result<T, ClientError>>;

/// Messages accepted by the `MeetingSessionActor`.
#[derive(Debug)]
pub(crate) enum SessionMessage {
    /// Validate the meeting against the directory.
    Validate { respond_to: Reply<SessionSnapshot> },

    /// Submit a slot (raw `HH:MM` input) to the directory.
    SelectSlot {
        input: String,
        respond_to: Reply<SessionSnapshot>,
    },

    /// Re-validate and move into the call.
    Join { respond_to: Reply<SessionSnapshot> },

    /// The call ended; the window stays open.
    CallEnded,

    /// Stop the countdown timer ahead of teardown.
    CancelTimer { respond_to: oneshot::Sender<()> },

    /// Read the current snapshot.
    GetSnapshot {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
}

/// What observers see of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub meeting_id: MeetingId,
    pub meeting: Meeting,
    pub state: SessionState,
    /// Seconds until the join window opens, clamped at zero.
    pub countdown_secs: u64,
    /// Seconds until the slot itself starts, clamped at zero.
    pub seconds_until_slot: u64,
    pub can_join: bool,
    /// Last user-facing error, cleared by the next successful action.
    pub error: Option<String>,
    /// Whether a countdown timer is live.
    pub timer_active: bool,
    /// Timer ticks acted on since the session started.
    pub ticks_handled: u64,
}
