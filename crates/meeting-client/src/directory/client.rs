//! HTTP client for the meeting directory.
//!
//! Failures are logged here with their transport detail and mapped to
//! `DirectoryError`; callers only see text fit for display.

use crate::directory::types::{
    CreateMeetingBody, CreateMeetingReply, ErrorReply, SelectSlotBody, SelectSlotReply,
    SendInviteBody, ValidateMeetingReply, SELECT_SLOT_FAILED_MESSAGE,
};
use crate::directory::{CreatedMeetingRecord, DirectoryError, MeetingDirectory, MeetingValidation};
use crate::observability::metrics;
use crate::slot_clock::SlotTime;
use async_trait::async_trait;
use common::types::MeetingId;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};

/// Connect timeout applied on top of the per-request timeout.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// HTTP client for the meeting directory REST API.
#[derive(Clone)]
pub struct HttpDirectoryClient {
    /// HTTP client with configured timeouts.
    client: Client,

    /// Base URL; endpoint paths are appended to it.
    base_url: Url,
}

impl HttpDirectoryClient {
    /// Create a new directory client.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::Unavailable` if the HTTP client cannot be built.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
            .build()
            .map_err(|e| {
                error!(target: "meet.directory", error = %e, "Failed to build HTTP client");
                DirectoryError::Unavailable("HTTP client unavailable".to_string())
            })?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, DirectoryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                error!(target: "meet.directory", base_url = %self.base_url, "Directory URL cannot be a base");
                DirectoryError::Unavailable("invalid directory URL".to_string())
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, DirectoryError> {
        request.send().await.map_err(|e| {
            warn!(target: "meet.directory", operation, error = %e, "Directory request failed");
            DirectoryError::Unavailable(e.to_string())
        })
    }

    /// Map a response to its JSON body or a `DirectoryError`.
    ///
    /// Non-2xx bodies are searched for a `message` field which becomes the
    /// rejection text; 5xx is always `Unavailable`.
    async fn handle_response<T: DeserializeOwned>(
        operation: &'static str,
        response: reqwest::Response,
        fallback: &str,
    ) -> Result<T, DirectoryError> {
        let status = response.status();

        if status.is_success() {
            return response.json().await.map_err(|e| {
                error!(target: "meet.directory", operation, error = %e, "Failed to parse directory response");
                DirectoryError::InvalidResponse(e.to_string())
            });
        }

        if status.is_server_error() {
            warn!(target: "meet.directory", operation, status = %status, "Directory returned server error");
            return Err(DirectoryError::Unavailable(format!("status {status}")));
        }

        let message = response
            .json::<ErrorReply>()
            .await
            .ok()
            .and_then(|body| body.message)
            .filter(|m| !m.trim().is_empty());

        warn!(target: "meet.directory", operation, status = %status, has_message = message.is_some(), "Directory rejected request");

        match (status, message) {
            (_, Some(message)) => Err(DirectoryError::Rejected(message)),
            (StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT, None) => {
                Err(DirectoryError::Unavailable(format!("status {status}")))
            }
            (_, None) => Err(DirectoryError::Rejected(fallback.to_string())),
        }
    }

    fn observe<T>(
        operation: &'static str,
        started: Instant,
        result: &Result<T, DirectoryError>,
    ) {
        let outcome = match result {
            Ok(_) => "success",
            Err(DirectoryError::Rejected(_)) => "rejected",
            Err(_) => "error",
        };
        metrics::record_directory_request(operation, outcome, started.elapsed());
    }
}

#[async_trait]
impl MeetingDirectory for HttpDirectoryClient {
    #[instrument(skip_all, name = "meet.directory.create_meeting")]
    async fn create_meeting(
        &self,
        recipient: &str,
    ) -> Result<CreatedMeetingRecord, DirectoryError> {
        let started = Instant::now();
        let result: Result<CreatedMeetingRecord, DirectoryError> = async {
            let url = self.endpoint(&["create-meeting"])?;
            let response = self
                .send(
                    "create_meeting",
                    self.client.post(url).json(&CreateMeetingBody {
                        recipient_phone_number: recipient,
                    }),
                )
                .await?;
            let reply: CreateMeetingReply = Self::handle_response(
                "create_meeting",
                response,
                crate::directory::types::CREATE_FAILED_MESSAGE,
            )
            .await?;
            reply.into_record()
        }
        .await;

        Self::observe("create_meeting", started, &result);
        if let Ok(record) = &result {
            debug!(target: "meet.directory", meeting_id = %record.meeting_id, "Meeting created");
        }
        result
    }

    #[instrument(skip_all, name = "meet.directory.validate_meeting", fields(meeting_id = %meeting_id))]
    async fn validate_meeting(
        &self,
        meeting_id: &MeetingId,
    ) -> Result<MeetingValidation, DirectoryError> {
        let started = Instant::now();
        let result: Result<MeetingValidation, DirectoryError> = async {
            let url = self.endpoint(&["validate-meeting", meeting_id.as_str()])?;
            let response = self.send("validate_meeting", self.client.get(url)).await?;

            // Unknown or expired meetings may come back as 404/410 with the
            // regular `{valid:false, message}` body.
            if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::GONE) {
                let status = response.status();
                return match response.json::<ValidateMeetingReply>().await {
                    Ok(reply) => reply.into_validation(),
                    Err(_) => {
                        debug!(target: "meet.directory", status = %status, "Validation miss without body");
                        Ok(MeetingValidation {
                            valid: false,
                            slot: None,
                            message: None,
                        })
                    }
                };
            }

            let reply: ValidateMeetingReply = Self::handle_response(
                "validate_meeting",
                response,
                crate::errors::DEFAULT_INVALID_MEETING_MESSAGE,
            )
            .await?;
            reply.into_validation()
        }
        .await;

        Self::observe("validate_meeting", started, &result);
        result
    }

    #[instrument(skip_all, name = "meet.directory.select_slot", fields(meeting_id = %meeting_id, slot = %slot))]
    async fn select_slot(
        &self,
        meeting_id: &MeetingId,
        slot: SlotTime,
    ) -> Result<(), DirectoryError> {
        let started = Instant::now();
        let result: Result<(), DirectoryError> = async {
            let url = self.endpoint(&["select-slot"])?;
            let response = self
                .send(
                    "select_slot",
                    self.client.post(url).json(&SelectSlotBody {
                        meeting_id: meeting_id.as_str(),
                        slot_time: slot.to_string(),
                    }),
                )
                .await?;
            let reply: SelectSlotReply =
                Self::handle_response("select_slot", response, SELECT_SLOT_FAILED_MESSAGE).await?;
            if reply.success {
                Ok(())
            } else {
                Err(DirectoryError::Rejected(
                    reply
                        .message
                        .unwrap_or_else(|| SELECT_SLOT_FAILED_MESSAGE.to_string()),
                ))
            }
        }
        .await;

        Self::observe("select_slot", started, &result);
        result
    }

    #[instrument(skip_all, name = "meet.directory.send_invite", fields(meeting_id = %meeting_id))]
    async fn send_invite(
        &self,
        meeting_id: &MeetingId,
        recipient: &str,
    ) -> Result<(), DirectoryError> {
        let started = Instant::now();
        let result: Result<(), DirectoryError> = async {
            let url = self.endpoint(&["send-invite"])?;
            let response = self
                .send(
                    "send_invite",
                    self.client.post(url).json(&SendInviteBody {
                        meeting_id: meeting_id.as_str(),
                        recipient_phone_number: recipient,
                    }),
                )
                .await?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else if status.is_server_error() {
                Err(DirectoryError::Unavailable(format!("status {status}")))
            } else {
                Err(DirectoryError::Rejected(format!("status {status}")))
            }
        }
        .await;

        Self::observe("send_invite", started, &result);
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> HttpDirectoryClient {
        HttpDirectoryClient::new(Url::parse(base).unwrap(), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_endpoint_appends_segments() {
        let c = client("http://localhost:3001");
        assert_eq!(
            c.endpoint(&["create-meeting"]).unwrap().as_str(),
            "http://localhost:3001/create-meeting"
        );

        let c = client("http://localhost:3001/api/");
        assert_eq!(
            c.endpoint(&["validate-meeting", "abc"]).unwrap().as_str(),
            "http://localhost:3001/api/validate-meeting/abc"
        );
    }

    #[test]
    fn test_endpoint_escapes_meeting_id() {
        let c = client("http://localhost:3001");
        let url = c.endpoint(&["validate-meeting", "a/b c"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3001/validate-meeting/a%2Fb%20c");
    }

    #[test]
    fn test_cannot_be_base_url_is_rejected() {
        let c = client("mailto:someone@example.com");
        assert!(matches!(
            c.endpoint(&["create-meeting"]),
            Err(DirectoryError::Unavailable(_))
        ));
    }
}
