//! `SignalingSession` - owns one call attempt's relay, media and peer.
//!
//! The session:
//! - Holds the local media stream, acquired before anything is signaled
//! - Owns the relay channel for the meeting's room
//! - Runs at most one peer attempt at a time and drives the offer/answer
//!   exchange for it
//! - Publishes a `CallSnapshot` after every change
//!
//! # Roles
//!
//! A member told `user-joined` becomes the initiator toward the newcomer.
//! A member told `receive-call` with an offer becomes the responder. In a
//! two-party room this yields exactly one offer and one answer whichever
//! side joined first.
//!
//! # Teardown
//!
//! Close the peer, stop every local track, send `leave-room`, close the
//! relay. Runs once on every exit path.

use crate::errors::{ClientError, CALL_FAILED_MESSAGE};
use crate::media::{LocalMediaStream, MediaConstraints, MediaDevices, RemoteMediaStream, TrackKind};
use crate::observability::metrics;
use crate::signaling::messages::{
    AcceptCall, CallAnswer, InboundEvent, IncomingCall, OutboundEvent, SendCall, Signal,
};
use crate::signaling::peer::{
    PeerAttemptState, PeerConnection, PeerConnector, PeerEvent, PeerEventSender, PeerOptions,
    PeerRole,
};
use crate::signaling::relay::{RelayChannel, RelayConnector};
use common::types::{MeetingId, PeerId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Channel buffer size for the session mailbox.
const SIGNALING_CHANNEL_BUFFER: usize = 8;

/// Collaborators for a signaling session.
#[derive(Clone)]
pub struct SignalingDeps {
    pub media: Arc<dyn MediaDevices>,
    pub relay: Arc<dyn RelayConnector>,
    pub peers: Arc<dyn PeerConnector>,
    pub constraints: MediaConstraints,
    pub trickle: bool,
}

/// Coarse call progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// In the room, nobody to talk to yet.
    Waiting,
    Negotiating,
    Connected,
    /// The attempt failed; only a re-join recovers.
    Failed,
    Ended,
}

/// What observers see of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSnapshot {
    pub room: MeetingId,
    pub local_peer_id: PeerId,
    pub phase: CallPhase,
    pub remote_peer_id: Option<PeerId>,
    pub role: Option<PeerRole>,
    pub attempt_state: Option<PeerAttemptState>,
    pub remote_stream: Option<RemoteMediaStream>,
    pub error: Option<String>,
}

#[derive(Debug)]
enum SignalingMessage {
    Leave { respond_to: oneshot::Sender<()> },
}

/// Handle to a running `SignalingSession`.
#[derive(Clone, Debug)]
pub struct SignalingHandle {
    sender: mpsc::Sender<SignalingMessage>,
    cancel_token: CancellationToken,
    status: watch::Receiver<CallSnapshot>,
    stream: LocalMediaStream,
}

impl SignalingHandle {
    #[must_use]
    pub fn status(&self) -> CallSnapshot {
        self.status.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot> {
        self.status.clone()
    }

    /// Flip the microphone. Local only; nothing is signaled.
    pub fn toggle_audio(&self) -> Option<bool> {
        self.stream.toggle(TrackKind::Audio)
    }

    /// Flip the camera. Local only; nothing is signaled.
    pub fn toggle_video(&self) -> Option<bool> {
        self.stream.toggle(TrackKind::Video)
    }

    #[must_use]
    pub fn is_audio_enabled(&self) -> bool {
        self.stream.is_enabled(TrackKind::Audio)
    }

    #[must_use]
    pub fn is_video_enabled(&self) -> bool {
        self.stream.is_enabled(TrackKind::Video)
    }

    /// Tear the session down and wait for it. Succeeds when the session has
    /// already stopped.
    pub async fn leave(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(SignalingMessage::Leave { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Cancel without waiting. Teardown still runs inside the session.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

struct PeerAttempt {
    id: u64,
    remote: PeerId,
    role: PeerRole,
    state: PeerAttemptState,
    connection: Box<dyn PeerConnection>,
}

/// The `SignalingSession` implementation.
pub struct SignalingSession {
    room: MeetingId,
    local_peer_id: PeerId,
    relay: RelayChannel,
    stream: LocalMediaStream,
    peers: Arc<dyn PeerConnector>,
    trickle: bool,
    attempt: Option<PeerAttempt>,
    next_attempt: u64,
    peer_events_tx: mpsc::UnboundedSender<(u64, PeerEvent)>,
    peer_events_rx: mpsc::UnboundedReceiver<(u64, PeerEvent)>,
    receiver: mpsc::Receiver<SignalingMessage>,
    cancel_token: CancellationToken,
    phase: CallPhase,
    remote_stream: Option<RemoteMediaStream>,
    error: Option<String>,
    torn_down: bool,
    status: watch::Sender<CallSnapshot>,
}

impl SignalingSession {
    /// Acquire media, connect to the relay, announce presence in `room` and
    /// spawn the session.
    ///
    /// # Errors
    ///
    /// `ClientError::MediaUnavailable` when capture fails (the relay is
    /// never contacted), `ClientError::Relay` when the relay cannot be
    /// reached. Nothing is left running on error.
    #[instrument(skip_all, name = "meet.signaling.start", fields(room = %room))]
    pub async fn start(
        room: MeetingId,
        deps: SignalingDeps,
        cancel_token: CancellationToken,
    ) -> Result<(SignalingHandle, JoinHandle<()>), ClientError> {
        let stream = match deps.media.get_user_media(deps.constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(target: "meet.signaling", error = %e, "Media acquisition failed");
                metrics::record_call_outcome("media_unavailable");
                return Err(ClientError::MediaUnavailable(e));
            }
        };

        let mut relay = match deps.relay.connect().await {
            Ok(relay) => relay,
            Err(e) => {
                warn!(target: "meet.signaling", error = %e, "Relay connection failed");
                stream.stop_all();
                metrics::record_call_outcome("failed");
                return Err(ClientError::Relay(e));
            }
        };

        if let Err(e) = relay.send(&OutboundEvent::JoinRoom(room.clone())).await {
            warn!(target: "meet.signaling", error = %e, "Failed to join room");
            relay.close().await;
            stream.stop_all();
            metrics::record_call_outcome("failed");
            return Err(ClientError::Relay(e));
        }

        let local_peer_id = relay.peer_id().clone();
        let (sender, receiver) = mpsc::channel(SIGNALING_CHANNEL_BUFFER);
        let (peer_events_tx, peer_events_rx) = mpsc::unbounded_channel();

        let initial = CallSnapshot {
            room: room.clone(),
            local_peer_id: local_peer_id.clone(),
            phase: CallPhase::Waiting,
            remote_peer_id: None,
            role: None,
            attempt_state: None,
            remote_stream: None,
            error: None,
        };
        let (status, status_rx) = watch::channel(initial);

        let session = Self {
            room,
            local_peer_id,
            relay,
            stream: stream.clone(),
            peers: deps.peers,
            trickle: deps.trickle,
            attempt: None,
            next_attempt: 0,
            peer_events_tx,
            peer_events_rx,
            receiver,
            cancel_token: cancel_token.clone(),
            phase: CallPhase::Waiting,
            remote_stream: None,
            error: None,
            torn_down: false,
            status,
        };

        let task_handle = tokio::spawn(session.run());

        let handle = SignalingHandle {
            sender,
            cancel_token,
            status: status_rx,
            stream,
        };

        Ok((handle, task_handle))
    }

    #[instrument(skip_all, name = "meet.signaling", fields(room = %self.room, peer_id = %self.local_peer_id))]
    async fn run(mut self) {
        info!(target: "meet.signaling", "Joined room, waiting for peer");

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    debug!(target: "meet.signaling", "Signaling received cancellation signal");
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(SignalingMessage::Leave { respond_to }) => {
                            self.teardown("left").await;
                            let _ = respond_to.send(());
                            break;
                        }
                        None => {
                            debug!(target: "meet.signaling", "Signaling channel closed, exiting");
                            break;
                        }
                    }
                }

                Some((attempt, event)) = self.peer_events_rx.recv() => {
                    self.handle_peer_event(attempt, event).await;
                }

                event = self.relay.recv() => {
                    match event {
                        Some(event) => self.handle_relay_event(event).await,
                        None => {
                            warn!(target: "meet.signaling", "Relay disconnected");
                            self.fail("relay disconnected");
                            break;
                        }
                    }
                }
            }
        }

        self.teardown("stopped").await;
    }

    async fn handle_relay_event(&mut self, event: InboundEvent) {
        if self.phase == CallPhase::Failed {
            debug!(target: "meet.signaling", event = event.name(), "Call failed, ignoring event");
            return;
        }

        match event {
            InboundEvent::UserJoined(peer_id) => self.handle_user_joined(peer_id),
            InboundEvent::ReceiveCall(IncomingCall { caller_id, signal }) => {
                self.handle_receive_call(caller_id, signal);
            }
            InboundEvent::CallAccepted(CallAnswer {
                from_peer_id,
                signal,
            }) => self.handle_call_accepted(&from_peer_id, signal),
            InboundEvent::UserLeft(peer_id) => self.handle_user_left(&peer_id),
            InboundEvent::Connected(_) => {}
        }
        self.publish();
    }

    fn handle_user_joined(&mut self, peer_id: PeerId) {
        if peer_id == self.local_peer_id {
            return;
        }
        if let Some(attempt) = self.live_attempt() {
            warn!(
                target: "meet.signaling",
                joined = %peer_id,
                current = %attempt.remote,
                "Already in a call, ignoring newcomer"
            );
            return;
        }

        info!(target: "meet.signaling", remote = %peer_id, "Peer joined, calling");
        self.create_attempt(peer_id, PeerRole::Initiator, None);
    }

    fn handle_receive_call(&mut self, caller_id: PeerId, signal: Signal) {
        if let Some((remote, role)) = self.live_attempt().map(|a| (a.remote.clone(), a.role)) {
            if remote != caller_id {
                warn!(
                    target: "meet.signaling",
                    caller = %caller_id,
                    current = %remote,
                    "Already in a call, ignoring incoming call"
                );
                return;
            }
            if role == PeerRole::Initiator && !matches!(signal, Signal::Candidate { .. }) {
                warn!(
                    target: "meet.signaling",
                    caller = %caller_id,
                    "Ignoring offer from the peer this client is calling"
                );
                return;
            }
            self.feed_remote_signal(signal);
            return;
        }

        match signal {
            Signal::Offer { .. } => {
                info!(target: "meet.signaling", caller = %caller_id, "Incoming call, answering");
                self.create_attempt(caller_id, PeerRole::Responder, Some(signal));
            }
            other => {
                debug!(
                    target: "meet.signaling",
                    caller = %caller_id,
                    signal = other.kind(),
                    "Signal without a call in progress, ignoring"
                );
            }
        }
    }

    fn handle_call_accepted(&mut self, from_peer_id: &PeerId, signal: Signal) {
        let matches = self
            .live_attempt()
            .is_some_and(|a| a.role == PeerRole::Initiator && &a.remote == from_peer_id);
        if !matches {
            debug!(
                target: "meet.signaling",
                from = %from_peer_id,
                "Answer for no outstanding offer, ignoring"
            );
            return;
        }
        self.feed_remote_signal(signal);
    }

    fn handle_user_left(&mut self, peer_id: &PeerId) {
        let matches = self.live_attempt().is_some_and(|a| &a.remote == peer_id);
        if !matches {
            return;
        }
        info!(target: "meet.signaling", remote = %peer_id, "Peer left the room");
        if self.phase == CallPhase::Connected {
            metrics::record_call_outcome("hung_up");
        }
        self.close_attempt();
        self.remote_stream = None;
        self.phase = CallPhase::Waiting;
    }

    async fn handle_peer_event(&mut self, attempt_id: u64, event: PeerEvent) {
        let current = self.live_attempt().map(|a| a.id);
        if current != Some(attempt_id) {
            debug!(target: "meet.signaling", attempt = attempt_id, "Ignoring event from stale attempt");
            return;
        }

        match event {
            PeerEvent::Signal(signal) => self.send_local_signal(signal).await,
            PeerEvent::RemoteStream(stream) => {
                debug!(target: "meet.signaling", stream = %stream.id, "Remote stream attached");
                self.remote_stream = Some(stream);
            }
            PeerEvent::Connected => {
                if let Some(attempt) = self.attempt.as_mut() {
                    attempt.state = attempt.state.after_connected();
                    info!(
                        target: "meet.signaling",
                        remote = %attempt.remote,
                        role = attempt.role.name(),
                        "Peer connected"
                    );
                }
                self.phase = CallPhase::Connected;
                metrics::record_call_outcome("connected");
            }
            PeerEvent::Failed(reason) => self.fail(&reason),
            PeerEvent::Closed => {
                info!(target: "meet.signaling", "Peer closed the connection");
                if self.phase == CallPhase::Connected {
                    metrics::record_call_outcome("hung_up");
                }
                self.close_attempt();
                self.remote_stream = None;
                self.phase = CallPhase::Waiting;
            }
        }
        self.publish();
    }

    fn create_attempt(&mut self, remote: PeerId, role: PeerRole, offer: Option<Signal>) {
        self.next_attempt += 1;
        let id = self.next_attempt;
        let events = PeerEventSender::new(id, self.peer_events_tx.clone());
        let options = PeerOptions {
            role,
            trickle: self.trickle,
        };

        let connection = match self.peers.create_peer(options, &self.stream, events) {
            Ok(connection) => connection,
            Err(e) => {
                self.fail(&e.to_string());
                return;
            }
        };

        self.attempt = Some(PeerAttempt {
            id,
            remote,
            role,
            state: PeerAttemptState::Idle,
            connection,
        });
        self.phase = CallPhase::Negotiating;
        self.error = None;

        if let Some(offer) = offer {
            self.feed_remote_signal(offer);
        }
    }

    fn feed_remote_signal(&mut self, signal: Signal) {
        let Some(attempt) = self.attempt.as_mut() else {
            return;
        };
        let next = attempt.state.after_remote_signal(attempt.role, &signal);
        match attempt.connection.signal(signal) {
            Ok(()) => attempt.state = next,
            Err(e) => self.fail(&e.to_string()),
        }
    }

    async fn send_local_signal(&mut self, signal: Signal) {
        let Some(attempt) = self.attempt.as_mut() else {
            return;
        };

        let event = match attempt.role {
            PeerRole::Initiator => OutboundEvent::SendCall(SendCall {
                to_peer_id: attempt.remote.clone(),
                from_peer_id: self.local_peer_id.clone(),
                signal: signal.clone(),
            }),
            PeerRole::Responder => OutboundEvent::AcceptCall(AcceptCall {
                caller_id: attempt.remote.clone(),
                signal: signal.clone(),
            }),
        };
        attempt.state = attempt.state.after_local_signal(attempt.role, &signal);

        if let Err(e) = self.relay.send(&event).await {
            self.fail(&e.to_string());
        }
    }

    /// Close the attempt and surface a call failure. No retry.
    fn fail(&mut self, reason: &str) {
        if self.phase == CallPhase::Failed || self.torn_down {
            return;
        }
        warn!(target: "meet.signaling", reason, "Call failed");
        self.close_attempt();
        self.phase = CallPhase::Failed;
        self.error = Some(CALL_FAILED_MESSAGE.to_string());
        metrics::record_call_outcome("failed");
        self.publish();
    }

    fn close_attempt(&mut self) {
        if let Some(attempt) = self.attempt.as_mut() {
            if attempt.state != PeerAttemptState::Closed {
                attempt.connection.close();
                attempt.state = PeerAttemptState::Closed;
            }
        }
    }

    fn live_attempt(&self) -> Option<&PeerAttempt> {
        self.attempt
            .as_ref()
            .filter(|a| a.state != PeerAttemptState::Closed)
    }

    async fn teardown(&mut self, reason: &'static str) {
        if self.torn_down {
            return;
        }

        if self.phase == CallPhase::Connected {
            metrics::record_call_outcome("hung_up");
        }
        self.close_attempt();
        self.stream.stop_all();
        if let Err(e) = self.relay.send(&OutboundEvent::LeaveRoom(self.room.clone())).await {
            debug!(target: "meet.signaling", error = %e, "leave-room not sent");
        }
        self.relay.close().await;

        if self.phase != CallPhase::Failed {
            self.phase = CallPhase::Ended;
        }
        self.remote_stream = None;
        self.torn_down = true;
        self.publish();

        info!(
            target: "meet.signaling",
            reason,
            live_tracks = self.stream.live_tracks(),
            "Signaling session torn down"
        );
    }

    fn snapshot(&self) -> CallSnapshot {
        let attempt = self.attempt.as_ref();
        CallSnapshot {
            room: self.room.clone(),
            local_peer_id: self.local_peer_id.clone(),
            phase: self.phase,
            remote_peer_id: attempt.map(|a| a.remote.clone()),
            role: attempt.map(|a| a.role),
            attempt_state: attempt.map(|a| a.state),
            remote_stream: self.remote_stream.clone(),
            error: self.error.clone(),
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.status.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
