//! Directory request and response bodies.
//!
//! Wire bodies use camelCase; the `*Body` types are private to the HTTP
//! client and converted into the domain types at the boundary.

use crate::directory::DirectoryError;
use crate::slot_clock::SlotTime;
use common::types::MeetingId;
use serde::{Deserialize, Serialize};

/// A meeting as returned by `create-meeting`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedMeetingRecord {
    pub meeting_id: MeetingId,
    /// Shareable link that opens the meeting.
    pub meeting_link: String,
    /// Recipient as stored by the directory.
    pub recipient: String,
}

/// Result of `validate-meeting`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingValidation {
    pub valid: bool,
    /// Confirmed slot, if one has been agreed.
    pub slot: Option<SlotTime>,
    /// Directory-provided explanation, usually present when `valid` is false.
    pub message: Option<String>,
}

impl MeetingValidation {
    /// A valid meeting, optionally with a confirmed slot.
    #[must_use]
    pub fn valid(slot: Option<SlotTime>) -> Self {
        Self {
            valid: true,
            slot,
            message: None,
        }
    }

    /// An invalid meeting with the directory's message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            slot: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateMeetingBody<'a> {
    pub recipient_phone_number: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateMeetingReply {
    #[serde(default)]
    pub success: bool,
    pub meeting_id: Option<String>,
    pub meeting_link: Option<String>,
    pub recipient_phone_number: Option<String>,
    pub message: Option<String>,
}

/// Fallback when creation fails without a directory message.
pub const CREATE_FAILED_MESSAGE: &str = "Failed to create meeting.";

impl CreateMeetingReply {
    pub(crate) fn into_record(self) -> Result<CreatedMeetingRecord, DirectoryError> {
        if !self.success {
            return Err(DirectoryError::Rejected(
                self.message
                    .unwrap_or_else(|| CREATE_FAILED_MESSAGE.to_string()),
            ));
        }

        let meeting_id = self
            .meeting_id
            .as_deref()
            .map(MeetingId::parse)
            .transpose()
            .map_err(|e| DirectoryError::InvalidResponse(format!("meetingId: {e}")))?
            .ok_or_else(|| DirectoryError::InvalidResponse("missing meetingId".to_string()))?;

        let meeting_link = self
            .meeting_link
            .ok_or_else(|| DirectoryError::InvalidResponse("missing meetingLink".to_string()))?;

        let recipient = self.recipient_phone_number.ok_or_else(|| {
            DirectoryError::InvalidResponse("missing recipientPhoneNumber".to_string())
        })?;

        Ok(CreatedMeetingRecord {
            meeting_id,
            meeting_link,
            recipient,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ValidateMeetingReply {
    #[serde(default)]
    pub valid: bool,
    pub slot_time: Option<String>,
    pub message: Option<String>,
}

impl ValidateMeetingReply {
    pub(crate) fn into_validation(self) -> Result<MeetingValidation, DirectoryError> {
        let slot = match self.slot_time.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<SlotTime>().map_err(|e| {
                DirectoryError::InvalidResponse(format!("slotTime: {e}"))
            })?),
        };

        Ok(MeetingValidation {
            valid: self.valid,
            slot: if self.valid { slot } else { None },
            message: self.message,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SelectSlotBody<'a> {
    pub meeting_id: &'a str,
    pub slot_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SelectSlotReply {
    #[serde(default)]
    pub success: bool,
    pub message: Option<String>,
}

/// Fallback when slot selection fails without a directory message.
pub const SELECT_SLOT_FAILED_MESSAGE: &str = "Failed to confirm time slot.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendInviteBody<'a> {
    pub meeting_id: &'a str,
    pub recipient_phone_number: &'a str,
}

/// Error body shape for non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorReply {
    pub message: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_create_body_is_camel_case() {
        let body = CreateMeetingBody {
            recipient_phone_number: "+15550100",
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"recipientPhoneNumber":"+15550100"}"#);
    }

    #[test]
    fn test_select_slot_body_formats_slot() {
        let body = SelectSlotBody {
            meeting_id: "m-1",
            slot_time: SlotTime::from_hm(9, 5).unwrap().to_string(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"meetingId":"m-1","slotTime":"09:05"}"#);
    }

    #[test]
    fn test_create_reply_success() {
        let reply: CreateMeetingReply = serde_json::from_str(
            r#"{"success":true,"meetingId":"abc","meetingLink":"https://meet.example/schedule/abc","recipientPhoneNumber":"+15550100"}"#,
        )
        .unwrap();
        let record = reply.into_record().unwrap();
        assert_eq!(record.meeting_id.as_str(), "abc");
        assert_eq!(record.recipient, "+15550100");
    }

    #[test]
    fn test_create_reply_failure_uses_message_or_fallback() {
        let reply: CreateMeetingReply =
            serde_json::from_str(r#"{"success":false,"message":"Quota exceeded"}"#).unwrap();
        assert_eq!(
            reply.into_record(),
            Err(DirectoryError::Rejected("Quota exceeded".to_string()))
        );

        let reply: CreateMeetingReply = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert_eq!(
            reply.into_record(),
            Err(DirectoryError::Rejected(CREATE_FAILED_MESSAGE.to_string()))
        );
    }

    #[test]
    fn test_create_reply_missing_fields_is_invalid() {
        let reply: CreateMeetingReply =
            serde_json::from_str(r#"{"success":true,"meetingId":"abc"}"#).unwrap();
        assert!(matches!(
            reply.into_record(),
            Err(DirectoryError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_validate_reply_with_slot() {
        let reply: ValidateMeetingReply =
            serde_json::from_str(r#"{"valid":true,"slotTime":"14:30"}"#).unwrap();
        let v = reply.into_validation().unwrap();
        assert!(v.valid);
        assert_eq!(v.slot, SlotTime::from_hm(14, 30));
    }

    #[test]
    fn test_validate_reply_without_slot() {
        for body in [r#"{"valid":true}"#, r#"{"valid":true,"slotTime":null}"#, r#"{"valid":true,"slotTime":""}"#] {
            let reply: ValidateMeetingReply = serde_json::from_str(body).unwrap();
            assert_eq!(reply.into_validation().unwrap(), MeetingValidation::valid(None));
        }
    }

    #[test]
    fn test_validate_reply_invalid_keeps_message() {
        let reply: ValidateMeetingReply =
            serde_json::from_str(r#"{"valid":false,"message":"Meeting expired"}"#).unwrap();
        assert_eq!(
            reply.into_validation().unwrap(),
            MeetingValidation::invalid("Meeting expired")
        );
    }

    #[test]
    fn test_validate_reply_malformed_slot() {
        let reply: ValidateMeetingReply =
            serde_json::from_str(r#"{"valid":true,"slotTime":"9am"}"#).unwrap();
        assert!(matches!(
            reply.into_validation(),
            Err(DirectoryError::InvalidResponse(_))
        ));
    }
}
