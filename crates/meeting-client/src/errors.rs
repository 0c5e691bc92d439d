//! Meeting client error types.
//!
//! Every failure is classified into one of the user-facing categories below.
//! Internal details are logged but not exposed through `user_message()`.

use crate::directory::DirectoryError;
use crate::media::MediaError;
use crate::signaling::{PeerError, ProtocolError, RelayError};
use crate::slot_clock::SlotParseError;
use thiserror::Error;

/// Shown when the directory reports a meeting invalid without a message.
pub const DEFAULT_INVALID_MEETING_MESSAGE: &str = "Meeting link is invalid or expired.";

/// Shown when the directory could not be reached during validation.
pub const VALIDATION_UNAVAILABLE_MESSAGE: &str =
    "Could not validate meeting link. Please try again.";

/// Shown when local media could not be acquired.
pub const MEDIA_UNAVAILABLE_MESSAGE: &str =
    "Could not access camera/microphone. Please ensure permissions are granted.";

/// Shown for any signaling or peer failure.
pub const CALL_FAILED_MESSAGE: &str = "Call failed. Please re-join the meeting.";

/// Failure category, used to pick the recovery path offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Meeting not found or expired. Terminal for the meeting.
    Validation,
    /// Slot could not be saved. The user may resubmit.
    SlotConfirmation,
    /// Camera/microphone unavailable. Fatal to this call attempt only.
    MediaAcquisition,
    /// Relay or peer negotiation failed. Recovery is a manual re-join.
    Signaling,
    /// Directory unreachable or returned garbage. The user may retry.
    Directory,
    /// Local misuse or broken invariants.
    Internal,
}

/// Meeting client error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The directory reported the meeting invalid or expired.
    #[error("Meeting invalid: {0}")]
    MeetingInvalid(String),

    /// The directory rejected a slot selection.
    #[error("Slot rejected: {0}")]
    SlotRejected(String),

    /// The slot input could not be parsed.
    #[error("Invalid slot: {0}")]
    InvalidSlot(#[from] SlotParseError),

    /// Invalid meeting creation input (e.g. empty recipient).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Directory call failed at the transport or protocol level.
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Local media could not be acquired.
    #[error("Media unavailable: {0}")]
    MediaUnavailable(#[from] MediaError),

    /// Relay channel failure.
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// Peer connection failure.
    #[error("Peer error: {0}")]
    Peer(#[from] PeerError),

    /// Malformed relay message.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Action not allowed in the current session state.
    #[error("Not allowed while {state}: {action}")]
    InvalidState {
        state: &'static str,
        action: &'static str,
    },

    /// Actor channel closed or internal invariant broken.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Failure category for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::MeetingInvalid(_) => ErrorKind::Validation,
            ClientError::SlotRejected(_) | ClientError::InvalidSlot(_) => {
                ErrorKind::SlotConfirmation
            }
            ClientError::MediaUnavailable(_) => ErrorKind::MediaAcquisition,
            ClientError::Relay(_) | ClientError::Peer(_) | ClientError::Protocol(_) => {
                ErrorKind::Signaling
            }
            ClientError::Directory(_) => ErrorKind::Directory,
            ClientError::InvalidInput(_)
            | ClientError::InvalidState { .. }
            | ClientError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the user can retry the action that failed.
    ///
    /// Validation failures are terminal: the only way forward is creating a
    /// new meeting.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Validation)
    }

    /// Returns the user-facing message for this error.
    ///
    /// Directory-provided messages are passed through verbatim.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            ClientError::MeetingInvalid(msg) | ClientError::SlotRejected(msg) => msg.clone(),
            ClientError::InvalidSlot(e) => e.to_string(),
            ClientError::InvalidInput(msg) => msg.clone(),
            ClientError::Directory(e) => e.user_message(),
            ClientError::MediaUnavailable(_) => MEDIA_UNAVAILABLE_MESSAGE.to_string(),
            ClientError::Relay(_) | ClientError::Peer(_) | ClientError::Protocol(_) => {
                CALL_FAILED_MESSAGE.to_string()
            }
            ClientError::InvalidState { action, .. } => {
                format!("Cannot {action} right now.")
            }
            ClientError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}
