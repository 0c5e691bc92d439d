//! Meeting directory boundary.
//!
//! The directory owns meeting records: existence, lifetime and the
//! confirmed slot. The client only ever holds a read-through copy.

mod client;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod types;

pub use client::HttpDirectoryClient;
pub use types::{CreatedMeetingRecord, MeetingValidation};

use crate::slot_clock::SlotTime;
use async_trait::async_trait;
use common::types::MeetingId;
use thiserror::Error;

/// Shown when the directory cannot be reached.
pub const DIRECTORY_UNAVAILABLE_MESSAGE: &str =
    "The meeting service is unavailable. Please try again.";

/// Directory call failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// Transport failure, timeout or 5xx.
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    /// The directory answered and refused the request. Carries the
    /// directory's own message, suitable for display.
    #[error("directory rejected request: {0}")]
    Rejected(String),

    /// The response body could not be understood.
    #[error("invalid directory response: {0}")]
    InvalidResponse(String),
}

impl DirectoryError {
    /// User-facing text. Rejections pass the directory's message through.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            DirectoryError::Rejected(msg) => msg.clone(),
            DirectoryError::Unavailable(_) | DirectoryError::InvalidResponse(_) => {
                DIRECTORY_UNAVAILABLE_MESSAGE.to_string()
            }
        }
    }
}

/// REST operations offered by the meeting directory.
#[async_trait]
pub trait MeetingDirectory: Send + Sync {
    /// Create a meeting for `recipient` (already normalised).
    async fn create_meeting(&self, recipient: &str)
        -> Result<CreatedMeetingRecord, DirectoryError>;

    /// Check a meeting's existence, lifetime and confirmed slot.
    async fn validate_meeting(&self, meeting_id: &MeetingId)
        -> Result<MeetingValidation, DirectoryError>;

    /// Confirm `slot` for the meeting. A refusal is `DirectoryError::Rejected`.
    async fn select_slot(&self, meeting_id: &MeetingId, slot: SlotTime)
        -> Result<(), DirectoryError>;

    /// Dispatch an invitation notification. Outcome never affects session state.
    async fn send_invite(&self, meeting_id: &MeetingId, recipient: &str)
        -> Result<(), DirectoryError>;
}
