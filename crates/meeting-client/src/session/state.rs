//! Meeting session states and the pure transition function.
//!
//! `transition` has no side effects. The session actor feeds it events,
//! applies the result and performs timer bookkeeping around it.

use crate::slot_clock::{countdown_secs, ResolvedSlot, SlotTime};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Lifecycle of one meeting as seen by this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Not yet validated against the directory.
    Unscheduled,
    /// Valid meeting, no slot agreed yet.
    AwaitingSlot,
    /// Slot agreed, join window not open yet.
    SlotConfirmed {
        slot: SlotTime,
        starts_at: DateTime<Utc>,
        window_opens_at: DateTime<Utc>,
    },
    /// Join window open; stays open until a call starts or the meeting is
    /// invalidated.
    JoinableNow {
        slot: SlotTime,
        starts_at: DateTime<Utc>,
    },
    /// A call is running.
    InCall {
        slot: SlotTime,
        starts_at: DateTime<Utc>,
    },
    /// Terminal. Carries the message to show.
    Expired { reason: String },
}

impl SessionState {
    /// Stable lowercase name for logs and metric labels.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Unscheduled => "unscheduled",
            SessionState::AwaitingSlot => "awaiting_slot",
            SessionState::SlotConfirmed { .. } => "slot_confirmed",
            SessionState::JoinableNow { .. } => "joinable_now",
            SessionState::InCall { .. } => "in_call",
            SessionState::Expired { .. } => "expired",
        }
    }

    /// Whether the join action is enabled.
    #[must_use]
    pub fn can_join(&self) -> bool {
        matches!(self, SessionState::JoinableNow { .. })
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        matches!(self, SessionState::Expired { .. })
    }

    /// The confirmed slot, if any.
    #[must_use]
    pub fn slot(&self) -> Option<SlotTime> {
        match self {
            SessionState::SlotConfirmed { slot, .. }
            | SessionState::JoinableNow { slot, .. }
            | SessionState::InCall { slot, .. } => Some(*slot),
            _ => None,
        }
    }

    /// Seconds until the join window opens, clamped at zero.
    #[must_use]
    pub fn countdown_secs(&self, now: DateTime<Utc>) -> u64 {
        match self {
            SessionState::SlotConfirmed {
                window_opens_at, ..
            } => countdown_secs(*window_opens_at, now),
            _ => 0,
        }
    }

    /// Seconds until the slot itself starts, clamped at zero.
    #[must_use]
    pub fn seconds_until_slot(&self, now: DateTime<Utc>) -> u64 {
        match self {
            SessionState::SlotConfirmed { starts_at, .. }
            | SessionState::JoinableNow { starts_at, .. }
            | SessionState::InCall { starts_at, .. } => countdown_secs(*starts_at, now),
            _ => 0,
        }
    }

    fn slot_confirmed(resolved: &ResolvedSlot) -> Self {
        SessionState::SlotConfirmed {
            slot: resolved.slot,
            starts_at: resolved.starts_at,
            window_opens_at: resolved.window_opens_at,
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The directory reported the meeting valid.
    Validated { slot: Option<ResolvedSlot> },
    /// The directory reported the meeting invalid or expired.
    Invalidated { message: String },
    /// The directory accepted a slot selection.
    SlotConfirmed(ResolvedSlot),
    /// Countdown timer tick.
    Tick { now: DateTime<Utc> },
    /// The user started a call.
    CallStarted,
    /// The call ended without invalidating the meeting.
    CallEnded,
}

impl SessionEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Validated { .. } => "validated",
            SessionEvent::Invalidated { .. } => "invalidated",
            SessionEvent::SlotConfirmed(_) => "slot_confirmed",
            SessionEvent::Tick { .. } => "tick",
            SessionEvent::CallStarted => "call_started",
            SessionEvent::CallEnded => "call_ended",
        }
    }
}

/// An event that makes no sense in the current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event '{event}' not allowed in state '{state}'")]
pub struct InvalidTransition {
    pub state: &'static str,
    pub event: &'static str,
}

/// Compute the state that follows `state` on `event`.
///
/// `Expired` is absorbing: validation, ticks and call-end notifications
/// leave it unchanged, and nothing leaves it.
///
/// # Errors
///
/// Returns `InvalidTransition` when the event is not accepted in `state`.
pub fn transition(
    state: &SessionState,
    event: &SessionEvent,
) -> Result<SessionState, InvalidTransition> {
    let invalid = || InvalidTransition {
        state: state.name(),
        event: event.name(),
    };

    match (state, event) {
        (SessionState::Expired { .. }, SessionEvent::SlotConfirmed(_) | SessionEvent::CallStarted) => {
            Err(invalid())
        }
        (SessionState::Expired { .. }, _) => Ok(state.clone()),

        (_, SessionEvent::Invalidated { message }) => Ok(SessionState::Expired {
            reason: message.clone(),
        }),

        (
            SessionState::Unscheduled | SessionState::AwaitingSlot,
            SessionEvent::Validated { slot },
        ) => Ok(match slot {
            Some(resolved) => SessionState::slot_confirmed(resolved),
            None => SessionState::AwaitingSlot,
        }),
        // The directory moved the slot; the window is recomputed for it.
        (
            SessionState::SlotConfirmed { slot, .. } | SessionState::JoinableNow { slot, .. },
            SessionEvent::Validated {
                slot: Some(resolved),
            },
        ) if resolved.slot != *slot => Ok(SessionState::slot_confirmed(resolved)),
        (_, SessionEvent::Validated { .. }) => Ok(state.clone()),

        (
            SessionState::AwaitingSlot | SessionState::SlotConfirmed { .. },
            SessionEvent::SlotConfirmed(resolved),
        ) => Ok(SessionState::slot_confirmed(resolved)),

        (
            SessionState::SlotConfirmed {
                slot,
                starts_at,
                window_opens_at,
            },
            SessionEvent::Tick { now },
        ) => {
            if *now >= *window_opens_at {
                Ok(SessionState::JoinableNow {
                    slot: *slot,
                    starts_at: *starts_at,
                })
            } else {
                Ok(state.clone())
            }
        }

        (SessionState::JoinableNow { slot, starts_at }, SessionEvent::CallStarted) => {
            Ok(SessionState::InCall {
                slot: *slot,
                starts_at: *starts_at,
            })
        }

        (SessionState::InCall { slot, starts_at }, SessionEvent::CallEnded) => {
            Ok(SessionState::JoinableNow {
                slot: *slot,
                starts_at: *starts_at,
            })
        }
        (SessionState::JoinableNow { .. }, SessionEvent::CallEnded) => Ok(state.clone()),

        _ => Err(invalid()),
    }
}
