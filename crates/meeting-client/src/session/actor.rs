//! `MeetingSessionActor` - owns one meeting's lifecycle.
//!
//! The actor:
//! - Holds the session state and applies `transition` to it
//! - Owns at most one `CountdownTimer`
//! - Performs directory validation and slot confirmation
//! - Publishes a `SessionSnapshot` to observers after every change
//!
//! # Lifecycle
//!
//! 1. Spawned when a meeting view is entered
//! 2. Runs until cancelled or every handle is dropped
//! 3. The timer is stopped on every exit path

use crate::clock::Clock;
use crate::directory::{DirectoryError, MeetingDirectory, MeetingValidation};
use crate::errors::{ClientError, DEFAULT_INVALID_MEETING_MESSAGE, VALIDATION_UNAVAILABLE_MESSAGE};
use crate::meeting::Meeting;
use crate::observability::metrics;
use crate::session::messages::{SessionMessage, SessionSnapshot};
use crate::session::state::{transition, SessionEvent, SessionState};
use crate::session::timer::CountdownTimer;
use crate::slot_clock::{ResolvedSlot, SlotTime};
use common::types::MeetingId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Channel buffer size for the session mailbox.
const SESSION_CHANNEL_BUFFER: usize = 32;

/// Channel buffer size for timer ticks.
const TICK_CHANNEL_BUFFER: usize = 4;

/// Session collaborators and settings.
#[derive(Clone)]
pub struct SessionDeps {
    pub directory: Arc<dyn MeetingDirectory>,
    pub clock: Arc<dyn Clock>,
    /// Zone in which slot times are interpreted.
    pub timezone: chrono_tz::Tz,
    /// Countdown tick period.
    pub tick: Duration,
}

/// Handle to a `MeetingSessionActor`.
#[derive(Clone, Debug)]
pub struct MeetingSessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    snapshots: watch::Receiver<SessionSnapshot>,
    meeting_id: MeetingId,
}

impl MeetingSessionHandle {
    #[must_use]
    pub fn meeting_id(&self) -> &MeetingId {
        &self.meeting_id
    }

    /// Validate the meeting with the directory.
    ///
    /// # Errors
    ///
    /// `ClientError::MeetingInvalid` if the meeting is (or already was)
    /// expired; `ClientError::Directory` if the directory is unreachable.
    pub async fn validate(&self) -> Result<SessionSnapshot, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionMessage::Validate { respond_to: tx }).await?;
        Self::reply(rx).await?
    }

    /// Submit a slot selection (`HH:MM`).
    ///
    /// # Errors
    ///
    /// `ClientError::InvalidSlot` for empty or malformed input (no directory
    /// call is made), `ClientError::SlotRejected` or `ClientError::Directory`
    /// when the directory refuses or is unreachable. The state is unchanged
    /// on every error.
    pub async fn select_slot(&self, input: &str) -> Result<SessionSnapshot, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionMessage::SelectSlot {
            input: input.to_string(),
            respond_to: tx,
        })
        .await?;
        Self::reply(rx).await?
    }

    /// Re-validate the meeting and enter `InCall`.
    ///
    /// # Errors
    ///
    /// `ClientError::InvalidState` if the window is not open,
    /// `ClientError::MeetingInvalid` if re-validation expired the meeting,
    /// `ClientError::Directory` if the directory is unreachable.
    pub async fn join(&self) -> Result<SessionSnapshot, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionMessage::Join { respond_to: tx }).await?;
        Self::reply(rx).await?
    }

    /// Report that the call ended.
    ///
    /// # Errors
    ///
    /// `ClientError::Internal` if the actor is gone.
    pub async fn call_ended(&self) -> Result<(), ClientError> {
        self.send(SessionMessage::CallEnded).await
    }

    /// Stop the countdown timer. Succeeds when the actor is already gone.
    pub async fn cancel_timer(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(SessionMessage::CancelTimer { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Current snapshot from the actor.
    ///
    /// # Errors
    ///
    /// `ClientError::Internal` if the actor is gone.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionMessage::GetSnapshot { respond_to: tx })
            .await?;
        Self::reply(rx).await
    }

    /// Subscribe to snapshots published after every change and tick.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Cancel the actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn send(&self, message: SessionMessage) -> Result<(), ClientError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| ClientError::Internal(format!("channel send failed: {e}")))
    }

    async fn reply<T>(rx: oneshot::Receiver<T>) -> Result<T, ClientError> {
        rx.await
            .map_err(|e| ClientError::Internal(format!("response receive failed: {e}")))
    }
}

/// The `MeetingSessionActor` implementation.
pub struct MeetingSessionActor {
    meeting: Meeting,
    state: SessionState,
    receiver: mpsc::Receiver<SessionMessage>,
    cancel_token: CancellationToken,
    deps: SessionDeps,
    timer: Option<CountdownTimer>,
    next_generation: u64,
    tick_tx: mpsc::Sender<u64>,
    tick_rx: mpsc::Receiver<u64>,
    ticks_handled: u64,
    last_error: Option<String>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl MeetingSessionActor {
    /// Spawn a session actor for `meeting`.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        meeting: Meeting,
        deps: SessionDeps,
        cancel_token: CancellationToken,
    ) -> (MeetingSessionHandle, JoinHandle<()>) {
        let (actor, handle) = Self::new(meeting, deps, cancel_token);
        let task_handle = tokio::spawn(actor.run());
        (handle, task_handle)
    }

    fn new(
        meeting: Meeting,
        deps: SessionDeps,
        cancel_token: CancellationToken,
    ) -> (Self, MeetingSessionHandle) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let (tick_tx, tick_rx) = mpsc::channel(TICK_CHANNEL_BUFFER);

        let state = SessionState::Unscheduled;
        let initial = SessionSnapshot {
            meeting_id: meeting.id.clone(),
            meeting: meeting.clone(),
            state: state.clone(),
            countdown_secs: 0,
            seconds_until_slot: 0,
            can_join: false,
            error: None,
            timer_active: false,
            ticks_handled: 0,
        };
        let (snapshots, snapshot_rx) = watch::channel(initial);

        let meeting_id = meeting.id.clone();
        let actor = Self {
            meeting,
            state,
            receiver,
            cancel_token: cancel_token.clone(),
            deps,
            timer: None,
            next_generation: 0,
            tick_tx,
            tick_rx,
            ticks_handled: 0,
            last_error: None,
            snapshots,
        };

        let handle = MeetingSessionHandle {
            sender,
            cancel_token,
            snapshots: snapshot_rx,
            meeting_id,
        };

        (actor, handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "meet.session", fields(meeting_id = %self.meeting.id))]
    async fn run(mut self) {
        info!(
            target: "meet.session",
            meeting_id = %self.meeting.id,
            "Session started"
        );

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    debug!(target: "meet.session", "Session received cancellation signal");
                    break;
                }

                Some(generation) = self.tick_rx.recv() => {
                    self.handle_tick(generation);
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            debug!(target: "meet.session", "Session channel closed, exiting");
                            break;
                        }
                    }
                }
            }
        }

        self.stop_timer("session_stopped");
        self.publish();
        info!(
            target: "meet.session",
            meeting_id = %self.meeting.id,
            state = self.state.name(),
            ticks_handled = self.ticks_handled,
            "Session stopped"
        );
    }

    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Validate { respond_to } => {
                let result = self.handle_validate().await;
                let _ = respond_to.send(result);
            }

            SessionMessage::SelectSlot { input, respond_to } => {
                let result = self.handle_select_slot(&input).await;
                let _ = respond_to.send(result);
            }

            SessionMessage::Join { respond_to } => {
                let result = self.handle_join().await;
                let _ = respond_to.send(result);
            }

            SessionMessage::CallEnded => {
                self.apply(&SessionEvent::CallEnded);
            }

            SessionMessage::CancelTimer { respond_to } => {
                debug!(
                    target: "meet.session",
                    timer_active = self.timer.is_some(),
                    "Countdown cancelled"
                );
                self.stop_timer("teardown");
                self.publish();
                let _ = respond_to.send(());
            }

            SessionMessage::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }

        self.publish();
    }

    async fn handle_validate(&mut self) -> Result<SessionSnapshot, ClientError> {
        let validation = self.fetch_validation().await?;
        self.apply_validation(&validation)?;
        self.last_error = None;
        Ok(self.snapshot())
    }

    async fn handle_select_slot(&mut self, input: &str) -> Result<SessionSnapshot, ClientError> {
        if !matches!(
            self.state,
            SessionState::AwaitingSlot | SessionState::SlotConfirmed { .. }
        ) {
            return Err(self.invalid_state("select a slot"));
        }

        let slot: SlotTime = input.trim().parse().map_err(|e| {
            let err = ClientError::InvalidSlot(e);
            self.last_error = Some(err.user_message());
            err
        })?;

        if let Err(e) = self
            .deps
            .directory
            .select_slot(&self.meeting.id, slot)
            .await
        {
            let err = match e {
                DirectoryError::Rejected(message) => ClientError::SlotRejected(message),
                other => ClientError::Directory(other),
            };
            warn!(
                target: "meet.session",
                meeting_id = %self.meeting.id,
                slot = %slot,
                error = %err,
                "Slot confirmation failed"
            );
            self.last_error = Some(err.user_message());
            return Err(err);
        }

        let resolved = self.resolve(slot);
        self.meeting.confirm_slot(slot);
        self.apply(&SessionEvent::SlotConfirmed(resolved));
        self.last_error = None;

        info!(
            target: "meet.session",
            meeting_id = %self.meeting.id,
            slot = %slot,
            starts_at = %resolved.starts_at,
            "Slot confirmed"
        );
        Ok(self.snapshot())
    }

    async fn handle_join(&mut self) -> Result<SessionSnapshot, ClientError> {
        // A queued tick may not have been seen yet.
        if matches!(self.state, SessionState::SlotConfirmed { .. }) {
            self.evaluate_window();
        }
        if !self.state.can_join() {
            return Err(self.invalid_state("join"));
        }

        let validation = self.fetch_validation().await?;
        self.apply_validation(&validation)?;

        self.apply(&SessionEvent::CallStarted);
        if !matches!(self.state, SessionState::InCall { .. }) {
            return Err(self.invalid_state("join"));
        }
        self.last_error = None;
        Ok(self.snapshot())
    }

    /// Query the directory. Transport failures leave the state alone.
    async fn fetch_validation(&mut self) -> Result<MeetingValidation, ClientError> {
        match self.deps.directory.validate_meeting(&self.meeting.id).await {
            Ok(validation) => Ok(validation),
            // A refusal is an authoritative answer about this meeting.
            Err(DirectoryError::Rejected(message)) => Ok(MeetingValidation::invalid(message)),
            Err(e) => {
                warn!(
                    target: "meet.session",
                    meeting_id = %self.meeting.id,
                    error = %e,
                    "Meeting validation failed"
                );
                self.last_error = Some(VALIDATION_UNAVAILABLE_MESSAGE.to_string());
                Err(ClientError::Directory(e))
            }
        }
    }

    fn apply_validation(&mut self, validation: &MeetingValidation) -> Result<(), ClientError> {
        // An invitation nobody scheduled lapses with its lifetime bound.
        let lapsed = validation.valid
            && validation.slot.is_none()
            && self.meeting.is_past_lifetime(self.deps.clock.now());
        self.meeting.apply_validation(validation);

        let event = if lapsed {
            info!(
                target: "meet.session",
                meeting_id = %self.meeting.id,
                "Unscheduled meeting is past its lifetime"
            );
            SessionEvent::Invalidated {
                message: DEFAULT_INVALID_MEETING_MESSAGE.to_string(),
            }
        } else if validation.valid {
            SessionEvent::Validated {
                slot: validation.slot.map(|slot| self.resolve(slot)),
            }
        } else {
            SessionEvent::Invalidated {
                message: validation
                    .message
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_INVALID_MEETING_MESSAGE.to_string()),
            }
        };
        self.apply(&event);

        if let SessionState::Expired { reason } = &self.state {
            let reason = reason.clone();
            self.meeting.expire();
            self.last_error = Some(reason.clone());
            return Err(ClientError::MeetingInvalid(reason));
        }
        Ok(())
    }

    fn handle_tick(&mut self, generation: u64) {
        let live = self.timer.as_ref().map(CountdownTimer::generation);
        if live != Some(generation) {
            debug!(target: "meet.session", generation, "Ignoring stale tick");
            return;
        }

        self.ticks_handled += 1;
        let now = self.deps.clock.now();
        match transition(&self.state, &SessionEvent::Tick { now }) {
            Ok(next) => self.set_state(next),
            Err(e) => {
                warn!(
                    target: "meet.session",
                    meeting_id = %self.meeting.id,
                    error = %e,
                    "Tick in unexpected state, stopping timer"
                );
                self.stop_timer("inconsistent");
            }
        }
        self.publish();
    }

    fn evaluate_window(&mut self) {
        let now = self.deps.clock.now();
        self.apply(&SessionEvent::Tick { now });
    }

    /// Apply an event, logging rejected ones.
    fn apply(&mut self, event: &SessionEvent) {
        match transition(&self.state, event) {
            Ok(next) => self.set_state(next),
            Err(e) => {
                debug!(target: "meet.session", error = %e, "Event ignored");
            }
        }
    }

    /// Install `next` and keep the timer consistent with it.
    fn set_state(&mut self, next: SessionState) {
        let previous = std::mem::replace(&mut self.state, next);

        if previous != self.state {
            metrics::record_state_transition(previous.name(), self.state.name());
            info!(
                target: "meet.session",
                meeting_id = %self.meeting.id,
                from = previous.name(),
                to = self.state.name(),
                "Session state changed"
            );
        }

        if let SessionState::SlotConfirmed {
            window_opens_at, ..
        } = self.state
        {
            let window_changed = !matches!(
                previous,
                SessionState::SlotConfirmed { window_opens_at: prev, .. } if prev == window_opens_at
            );
            // An already-open window is entered without waiting a tick.
            let now = self.deps.clock.now();
            if now >= window_opens_at {
                if let Ok(open) = transition(&self.state, &SessionEvent::Tick { now }) {
                    self.set_state(open);
                    return;
                }
            }
            if window_changed || self.timer.is_none() {
                self.start_timer();
            }
        } else {
            self.stop_timer("left_countdown");
        }
    }

    /// Replace the live timer. The old one is cancelled first.
    fn start_timer(&mut self) {
        self.stop_timer("replaced");
        self.next_generation += 1;
        self.timer = Some(CountdownTimer::spawn(
            self.next_generation,
            self.deps.tick,
            self.tick_tx.clone(),
        ));
    }

    fn stop_timer(&mut self, reason: &'static str) {
        if let Some(timer) = self.timer.take() {
            debug!(
                target: "meet.session",
                generation = timer.generation(),
                reason,
                "Stopping countdown timer"
            );
            timer.cancel();
        }
    }

    fn resolve(&self, slot: SlotTime) -> ResolvedSlot {
        let now = self.deps.clock.now().with_timezone(&self.deps.timezone);
        ResolvedSlot::resolve(slot, &now)
    }

    fn invalid_state(&mut self, action: &'static str) -> ClientError {
        let err = ClientError::InvalidState {
            state: self.state.name(),
            action,
        };
        if let SessionState::Expired { reason } = &self.state {
            let err = ClientError::MeetingInvalid(reason.clone());
            self.last_error = Some(reason.clone());
            return err;
        }
        err
    }

    fn snapshot(&self) -> SessionSnapshot {
        let now = self.deps.clock.now();
        SessionSnapshot {
            meeting_id: self.meeting.id.clone(),
            meeting: self.meeting.clone(),
            state: self.state.clone(),
            countdown_secs: self.state.countdown_secs(now),
            seconds_until_slot: self.state.seconds_until_slot(now),
            can_join: self.state.can_join(),
            error: self.last_error.clone(),
            timer_active: self.timer.is_some(),
            ticks_handled: self.ticks_handled,
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
