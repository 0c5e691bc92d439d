//! `MeetingRoom` - the call view for one meeting.
//!
//! Owns the session actor and, while a call runs, its signaling session.
//! Every call attempt gets a fresh signaling session; leaving tears both
//! down in a fixed order.

use crate::errors::ClientError;
use crate::meeting::Meeting;
use crate::session::{MeetingSessionActor, MeetingSessionHandle, SessionDeps};
use crate::signaling::{SignalingDeps, SignalingHandle, SignalingSession};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

struct ActiveCall {
    handle: SignalingHandle,
    task: JoinHandle<()>,
}

/// A meeting's session plus its current call, if any.
pub struct MeetingRoom {
    session: MeetingSessionHandle,
    session_task: Option<JoinHandle<()>>,
    signaling: SignalingDeps,
    call: Option<ActiveCall>,
    cancel_token: CancellationToken,
    left: bool,
}

impl MeetingRoom {
    /// Spawn the session actor for `meeting`.
    #[must_use]
    pub fn open(meeting: Meeting, session_deps: SessionDeps, signaling: SignalingDeps) -> Self {
        let cancel_token = CancellationToken::new();
        let (session, session_task) =
            MeetingSessionActor::spawn(meeting, session_deps, cancel_token.child_token());

        Self {
            session,
            session_task: Some(session_task),
            signaling,
            call: None,
            cancel_token,
            left: false,
        }
    }

    #[must_use]
    pub fn session(&self) -> &MeetingSessionHandle {
        &self.session
    }

    /// The running call, if any.
    #[must_use]
    pub fn call(&self) -> Option<&SignalingHandle> {
        self.call.as_ref().map(|c| &c.handle)
    }

    /// Re-validate the meeting and start a call.
    ///
    /// An existing call is ended first. When signaling cannot start the
    /// session is returned to `JoinableNow`.
    ///
    /// # Errors
    ///
    /// Errors from `MeetingSessionHandle::join` and
    /// `SignalingSession::start`.
    #[instrument(skip_all, name = "meet.room.join", fields(meeting_id = %self.session.meeting_id()))]
    pub async fn join_call(&mut self) -> Result<SignalingHandle, ClientError> {
        if self.left {
            return Err(ClientError::InvalidState {
                state: "left",
                action: "join",
            });
        }

        self.hang_up().await;
        self.session.join().await?;

        match SignalingSession::start(
            self.session.meeting_id().clone(),
            self.signaling.clone(),
            self.cancel_token.child_token(),
        )
        .await
        {
            Ok((handle, task)) => {
                info!(target: "meet.session", "Call started");
                self.call = Some(ActiveCall {
                    handle: handle.clone(),
                    task,
                });
                Ok(handle)
            }
            Err(e) => {
                warn!(target: "meet.session", error = %e, "Call could not start");
                if let Err(ended) = self.session.call_ended().await {
                    debug!(target: "meet.session", error = %ended, "Session gone after failed start");
                }
                Err(e)
            }
        }
    }

    /// End the current call. The join window stays open.
    pub async fn hang_up(&mut self) {
        if self.end_call().await {
            if let Err(e) = self.session.call_ended().await {
                debug!(target: "meet.session", error = %e, "Session gone during hang up");
            }
        }
    }

    /// Leave the call view: cancel the countdown, end the call (peer,
    /// tracks, room, relay) and stop the session. Idempotent.
    pub async fn leave(&mut self) {
        if self.left {
            return;
        }
        self.left = true;

        self.session.cancel_timer().await;
        self.end_call().await;

        self.cancel_token.cancel();
        if let Some(task) = self.session_task.take() {
            if let Err(e) = task.await {
                warn!(target: "meet.session", error = %e, "Session task failed");
            }
        }
        info!(
            target: "meet.session",
            meeting_id = %self.session.meeting_id(),
            "Left meeting room"
        );
    }

    async fn end_call(&mut self) -> bool {
        let Some(call) = self.call.take() else {
            return false;
        };
        call.handle.leave().await;
        if let Err(e) = call.task.await {
            warn!(target: "meet.signaling", error = %e, "Signaling task failed");
        }
        true
    }
}

impl Drop for MeetingRoom {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
