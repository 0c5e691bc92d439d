//! Peer connection boundary.
//!
//! The WebRTC engine is platform-specific; the signaling session drives it
//! through `PeerConnector` and `PeerConnection` and hears back through a
//! `PeerEventSender`. Each attempt gets a fresh connection; a closed one is
//! never reused.

use crate::media::{LocalMediaStream, RemoteMediaStream};
use crate::signaling::messages::Signal;
use thiserror::Error;
use tokio::sync::mpsc;

/// Peer connection failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("peer connection is closed")]
    Closed,
}

/// Which side of the offer/answer exchange this client plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// Learned that someone joined; produces the offer.
    Initiator,
    /// Was called; answers the offer.
    Responder,
}

impl PeerRole {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            PeerRole::Initiator => "initiator",
            PeerRole::Responder => "responder",
        }
    }
}

/// Progress of one peer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerAttemptState {
    Idle,
    OfferSent,
    AnswerPending,
    AnswerSent,
    Connected,
    Closed,
}

impl PeerAttemptState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            PeerAttemptState::Idle => "idle",
            PeerAttemptState::OfferSent => "offer_sent",
            PeerAttemptState::AnswerPending => "answer_pending",
            PeerAttemptState::AnswerSent => "answer_sent",
            PeerAttemptState::Connected => "connected",
            PeerAttemptState::Closed => "closed",
        }
    }

    /// State after the local connection produced `signal`.
    #[must_use]
    pub fn after_local_signal(self, role: PeerRole, signal: &Signal) -> Self {
        match (self, role, signal) {
            (PeerAttemptState::Idle, PeerRole::Initiator, Signal::Offer { .. }) => {
                PeerAttemptState::OfferSent
            }
            (PeerAttemptState::AnswerPending, PeerRole::Responder, Signal::Answer { .. }) => {
                PeerAttemptState::AnswerSent
            }
            (state, _, _) => state,
        }
    }

    /// State after the remote side's `signal` was handed to the connection.
    #[must_use]
    pub fn after_remote_signal(self, role: PeerRole, signal: &Signal) -> Self {
        match (self, role, signal) {
            (PeerAttemptState::Idle, PeerRole::Responder, Signal::Offer { .. }) => {
                PeerAttemptState::AnswerPending
            }
            (state, _, _) => state,
        }
    }

    /// State after the connection reported it is up.
    #[must_use]
    pub fn after_connected(self) -> Self {
        match self {
            PeerAttemptState::Closed => PeerAttemptState::Closed,
            _ => PeerAttemptState::Connected,
        }
    }
}

/// Notifications from a peer connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// Negotiation data to relay to the remote side.
    Signal(Signal),
    RemoteStream(RemoteMediaStream),
    Connected,
    Failed(String),
    /// The remote side closed the connection.
    Closed,
}

/// Attempt-tagged sender handed to a new connection.
///
/// Events from a superseded attempt carry its old id and are dropped by the
/// session.
#[derive(Debug, Clone)]
pub struct PeerEventSender {
    attempt: u64,
    tx: mpsc::UnboundedSender<(u64, PeerEvent)>,
}

impl PeerEventSender {
    #[must_use]
    pub fn new(attempt: u64, tx: mpsc::UnboundedSender<(u64, PeerEvent)>) -> Self {
        Self { attempt, tx }
    }

    #[must_use]
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Deliver an event. Returns false once the session is gone.
    pub fn emit(&self, event: PeerEvent) -> bool {
        self.tx.send((self.attempt, event)).is_ok()
    }
}

/// Options for a new peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerOptions {
    pub role: PeerRole,
    /// Emit ICE candidates as separate signals instead of waiting for
    /// gathering to complete.
    pub trickle: bool,
}

/// A single-use peer connection.
pub trait PeerConnection: Send {
    /// Feed a remote signal into the connection.
    ///
    /// # Errors
    ///
    /// Returns `PeerError` if the signal cannot be applied.
    fn signal(&mut self, signal: Signal) -> Result<(), PeerError>;

    /// Close the connection. Idempotent.
    fn close(&mut self);
}

/// Creates peer connections attached to a local stream.
pub trait PeerConnector: Send + Sync {
    /// Create a connection. An initiator emits its offer through `events`
    /// without further prompting.
    ///
    /// # Errors
    ///
    /// Returns `PeerError` if the engine cannot create the connection.
    fn create_peer(
        &self,
        options: PeerOptions,
        stream: &LocalMediaStream,
        events: PeerEventSender,
    ) -> Result<Box<dyn PeerConnection>, PeerError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn offer() -> Signal {
        Signal::Offer {
            sdp: "v=0".to_string(),
        }
    }

    fn answer() -> Signal {
        Signal::Answer {
            sdp: "v=0".to_string(),
        }
    }

    #[test]
    fn test_initiator_progression() {
        let state = PeerAttemptState::Idle.after_local_signal(PeerRole::Initiator, &offer());
        assert_eq!(state, PeerAttemptState::OfferSent);

        // The remote answer does not move the state; connectivity does.
        let state = state.after_remote_signal(PeerRole::Initiator, &answer());
        assert_eq!(state, PeerAttemptState::OfferSent);
        assert_eq!(state.after_connected(), PeerAttemptState::Connected);
    }

    #[test]
    fn test_responder_progression() {
        let state = PeerAttemptState::Idle.after_remote_signal(PeerRole::Responder, &offer());
        assert_eq!(state, PeerAttemptState::AnswerPending);

        let state = state.after_local_signal(PeerRole::Responder, &answer());
        assert_eq!(state, PeerAttemptState::AnswerSent);
        assert_eq!(state.after_connected(), PeerAttemptState::Connected);
    }

    #[test]
    fn test_candidates_do_not_move_state() {
        let candidate = Signal::Candidate {
            candidate: crate::signaling::messages::IceCandidate {
                candidate: "candidate:1".to_string(),
                sdp_mid: None,
                sdp_m_line_index: None,
            },
        };
        for state in [PeerAttemptState::OfferSent, PeerAttemptState::AnswerPending] {
            assert_eq!(
                state.after_local_signal(PeerRole::Initiator, &candidate),
                state
            );
            assert_eq!(
                state.after_remote_signal(PeerRole::Responder, &candidate),
                state
            );
        }
    }

    #[test]
    fn test_closed_is_final() {
        assert_eq!(
            PeerAttemptState::Closed.after_connected(),
            PeerAttemptState::Closed
        );
        assert_eq!(
            PeerAttemptState::Closed.after_local_signal(PeerRole::Initiator, &offer()),
            PeerAttemptState::Closed
        );
    }

    #[test]
    fn test_event_sender_tags_attempt() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = PeerEventSender::new(7, tx);
        assert!(sender.emit(PeerEvent::Connected));
        assert_eq!(rx.try_recv().unwrap(), (7, PeerEvent::Connected));

        drop(rx);
        assert!(!sender.emit(PeerEvent::Closed));
    }
}
