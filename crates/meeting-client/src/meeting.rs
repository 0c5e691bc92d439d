//! Meeting records and meeting creation.
//!
//! The directory owns the authoritative record. `Meeting` is the client's
//! read-through copy, refreshed from every validation.

use crate::directory::{MeetingDirectory, MeetingValidation};
use crate::errors::ClientError;
use crate::slot_clock::SlotTime;
use chrono::{DateTime, Duration, Utc};
use common::types::MeetingId;
use reqwest::Url;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Lifetime of a freshly created meeting invitation.
pub const MEETING_LIFETIME_MINUTES: i64 = 30;

/// Shown when meeting creation is attempted without a recipient.
pub const EMPTY_RECIPIENT_MESSAGE: &str = "Please enter a recipient phone number.";

const INVITE_SHARE_BASE: &str = "https://wa.me/";

/// Directory-side lifecycle of a meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeetingStatus {
    Pending,
    SlotConfirmed,
    Expired,
}

/// Cached copy of a directory meeting record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meeting {
    pub id: MeetingId,
    /// Known only for meetings created by this client.
    pub created_at: Option<DateTime<Utc>>,
    /// Lifetime bound, known only for meetings created by this client.
    pub expires_at: Option<DateTime<Utc>>,
    /// At most one confirmed slot at a time.
    pub slot: Option<SlotTime>,
    pub status: MeetingStatus,
}

impl Meeting {
    /// Record for a meeting this client just created.
    #[must_use]
    pub fn created(id: MeetingId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: Some(now),
            expires_at: Some(now + Duration::minutes(MEETING_LIFETIME_MINUTES)),
            slot: None,
            status: MeetingStatus::Pending,
        }
    }

    /// Record for a meeting opened by id (e.g. from a shared link).
    #[must_use]
    pub fn opened(id: MeetingId) -> Self {
        Self {
            id,
            created_at: None,
            expires_at: None,
            slot: None,
            status: MeetingStatus::Pending,
        }
    }

    /// Refresh from a directory validation. An expired record stays expired.
    pub fn apply_validation(&mut self, validation: &MeetingValidation) {
        if self.status == MeetingStatus::Expired {
            return;
        }

        if !validation.valid {
            self.expire();
            return;
        }

        match validation.slot {
            Some(slot) => {
                self.slot = Some(slot);
                self.status = MeetingStatus::SlotConfirmed;
            }
            None => {
                self.slot = None;
                self.status = MeetingStatus::Pending;
            }
        }
    }

    /// Record a confirmed slot, replacing any previous one.
    ///
    /// Returns `false` if the meeting is already expired.
    pub fn confirm_slot(&mut self, slot: SlotTime) -> bool {
        if self.status == MeetingStatus::Expired {
            return false;
        }
        self.slot = Some(slot);
        self.status = MeetingStatus::SlotConfirmed;
        true
    }

    pub fn expire(&mut self) {
        self.slot = None;
        self.status = MeetingStatus::Expired;
    }

    /// Whether the locally known lifetime bound has passed.
    #[must_use]
    pub fn is_past_lifetime(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Outcome of a successful `create_meeting`.
#[derive(Debug, Clone)]
pub struct CreatedMeeting {
    pub meeting: Meeting,
    pub meeting_link: String,
    /// Recipient as stored by the directory.
    pub recipient: String,
    /// Share link that opens a pre-filled chat with the recipient.
    pub invite_link: Url,
}

/// Trim a recipient phone number and ensure it carries a leading `+`.
///
/// # Errors
///
/// Returns `ClientError::InvalidInput` for empty input.
pub fn normalize_recipient(raw: &str) -> Result<String, ClientError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ClientError::InvalidInput(EMPTY_RECIPIENT_MESSAGE.to_string()));
    }
    if trimmed.starts_with('+') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("+{trimmed}"))
    }
}

/// Invitation text sent to the recipient.
#[must_use]
pub fn invite_message(meeting_link: &str, meeting_id: &MeetingId) -> String {
    format!(
        "You've been invited to a meeting!\n\nClick here to join: {meeting_link}\n\n\
         Meeting ID: {meeting_id}\n\n\
         This invitation link will expire in {MEETING_LIFETIME_MINUTES} minutes."
    )
}

/// Build the share link for `recipient` carrying the invitation text.
///
/// # Errors
///
/// Returns `ClientError::InvalidInput` if the recipient yields no usable path.
pub fn invite_link(
    recipient: &str,
    meeting_link: &str,
    meeting_id: &MeetingId,
) -> Result<Url, ClientError> {
    let digits: String = recipient.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(ClientError::InvalidInput(EMPTY_RECIPIENT_MESSAGE.to_string()));
    }

    let mut url = Url::parse(INVITE_SHARE_BASE)
        .and_then(|base| base.join(&digits))
        .map_err(|e| ClientError::InvalidInput(format!("recipient: {e}")))?;
    url.query_pairs_mut()
        .append_pair("text", &invite_message(meeting_link, meeting_id));
    Ok(url)
}

/// Create a meeting for `recipient` and build its invite link.
///
/// When `send_invite` is set, the directory's invite notification is
/// dispatched in the background; its outcome is only logged.
///
/// # Errors
///
/// Returns `ClientError::InvalidInput` for an empty recipient, or the
/// directory failure (rejections carry the directory's message).
#[instrument(skip_all, name = "meet.session.create_meeting")]
pub async fn create_meeting(
    directory: Arc<dyn MeetingDirectory>,
    recipient: &str,
    now: DateTime<Utc>,
    send_invite: bool,
) -> Result<CreatedMeeting, ClientError> {
    let recipient = normalize_recipient(recipient)?;

    let record = directory.create_meeting(&recipient).await.map_err(|e| {
        warn!(target: "meet.session", error = %e, "Meeting creation failed");
        ClientError::from(e)
    })?;

    let invite_link = invite_link(&record.recipient, &record.meeting_link, &record.meeting_id)?;

    info!(
        target: "meet.session",
        meeting_id = %record.meeting_id,
        "Meeting created"
    );

    if send_invite {
        let dir = Arc::clone(&directory);
        let meeting_id = record.meeting_id.clone();
        let recipient = record.recipient.clone();
        tokio::spawn(async move {
            match dir.send_invite(&meeting_id, &recipient).await {
                Ok(()) => {
                    debug!(target: "meet.session", meeting_id = %meeting_id, "Invite dispatched");
                }
                Err(e) => {
                    warn!(target: "meet.session", meeting_id = %meeting_id, error = %e, "Invite dispatch failed");
                }
            }
        });
    }

    Ok(CreatedMeeting {
        meeting: Meeting::created(record.meeting_id, now),
        meeting_link: record.meeting_link,
        recipient: record.recipient,
        invite_link,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::directory::mock::MockDirectory;
    use crate::directory::{CreatedMeetingRecord, DirectoryError};
    use chrono::TimeZone;

    fn id(raw: &str) -> MeetingId {
        MeetingId::parse(raw).unwrap()
    }

    fn record() -> CreatedMeetingRecord {
        CreatedMeetingRecord {
            meeting_id: id("m-42"),
            meeting_link: "https://meet.example/schedule/m-42".to_string(),
            recipient: "+919876543210".to_string(),
        }
    }

    #[test]
    fn test_normalize_recipient() {
        assert_eq!(normalize_recipient(" 919876543210 ").unwrap(), "+919876543210");
        assert_eq!(normalize_recipient("+15550100").unwrap(), "+15550100");
        let err = normalize_recipient("   ").unwrap_err();
        assert_eq!(err.user_message(), EMPTY_RECIPIENT_MESSAGE);
    }

    #[test]
    fn test_invite_link_strips_plus_and_carries_message() {
        let url = invite_link(
            "+919876543210",
            "https://meet.example/schedule/m-42",
            &id("m-42"),
        )
        .unwrap();

        assert_eq!(url.host_str(), Some("wa.me"));
        assert_eq!(url.path(), "/919876543210");

        let text = url
            .query_pairs()
            .find(|(k, _)| k == "text")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert!(text.contains("Click here to join: https://meet.example/schedule/m-42"));
        assert!(text.contains("Meeting ID: m-42"));
        assert!(text.contains("expire in 30 minutes"));
    }

    #[test]
    fn test_created_meeting_lifetime() {
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap();
        let meeting = Meeting::created(id("m-1"), now);
        assert_eq!(
            meeting.expires_at,
            Some(Utc.with_ymd_and_hms(2026, 5, 4, 10, 30, 0).unwrap())
        );
        assert!(!meeting.is_past_lifetime(now + Duration::minutes(29)));
        assert!(meeting.is_past_lifetime(now + Duration::minutes(30)));
        assert!(!Meeting::opened(id("m-2")).is_past_lifetime(now + Duration::days(365)));
    }

    #[test]
    fn test_apply_validation_never_revives_expired() {
        let mut meeting = Meeting::opened(id("m-1"));
        meeting.apply_validation(&MeetingValidation::valid(SlotTime::from_hm(9, 0)));
        assert_eq!(meeting.status, MeetingStatus::SlotConfirmed);

        meeting.apply_validation(&MeetingValidation::invalid("Meeting expired"));
        assert_eq!(meeting.status, MeetingStatus::Expired);
        assert_eq!(meeting.slot, None);

        meeting.apply_validation(&MeetingValidation::valid(SlotTime::from_hm(9, 0)));
        assert_eq!(meeting.status, MeetingStatus::Expired);
        assert!(!meeting.confirm_slot(SlotTime::from_hm(10, 0).unwrap()));
        assert_eq!(meeting.slot, None);
    }

    #[test]
    fn test_confirm_slot_replaces_previous() {
        let mut meeting = Meeting::opened(id("m-1"));
        assert!(meeting.confirm_slot(SlotTime::from_hm(9, 0).unwrap()));
        assert!(meeting.confirm_slot(SlotTime::from_hm(11, 15).unwrap()));
        assert_eq!(meeting.slot, SlotTime::from_hm(11, 15));
    }

    #[tokio::test]
    async fn test_create_meeting_builds_invite() {
        let directory = Arc::new(MockDirectory::accepting().with_create_result(Ok(record())));
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap();

        let created = create_meeting(directory.clone(), "919876543210", now, false)
            .await
            .unwrap();

        assert_eq!(created.meeting.id.as_str(), "m-42");
        assert_eq!(created.meeting.status, MeetingStatus::Pending);
        assert_eq!(created.invite_link.path(), "/919876543210");
        assert_eq!(directory.create_calls(), 1);
        assert_eq!(directory.invite_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_meeting_rejects_empty_recipient_locally() {
        let directory = Arc::new(MockDirectory::accepting().with_create_result(Ok(record())));

        let err = create_meeting(directory.clone(), "  ", Utc::now(), false)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::InvalidInput(_)));
        assert_eq!(directory.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_meeting_surfaces_directory_message() {
        let directory = Arc::new(MockDirectory::accepting().with_create_result(Err(
            DirectoryError::Rejected("Invalid phone number".to_string()),
        )));

        let err = create_meeting(directory, "+1", Utc::now(), false)
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), "Invalid phone number");
    }

    #[tokio::test]
    async fn test_invite_failure_does_not_fail_creation() {
        let directory = Arc::new(
            MockDirectory::accepting()
                .with_create_result(Ok(record()))
                .with_invite_result(Err(DirectoryError::Unavailable("down".to_string()))),
        );

        let created = create_meeting(directory.clone(), "+919876543210", Utc::now(), true).await;
        assert!(created.is_ok());

        // Let the spawned dispatch run.
        for _ in 0..10 {
            if directory.invite_calls() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(directory.invite_calls(), 1);
    }
}
