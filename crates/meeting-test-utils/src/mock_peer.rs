//! Scripted peer connections.
//!
//! An initiator emits its offer as soon as it is created. A responder emits
//! its answer when it receives the offer. Either side reports a remote
//! stream and `Connected` once it holds both descriptions.

use crate::event_log::{EventLog, PEER_CLOSED};
use meeting_client::media::{LocalMediaStream, RemoteMediaStream};
use meeting_client::signaling::messages::IceCandidate;
use meeting_client::signaling::{
    PeerConnection, PeerConnector, PeerError, PeerEvent, PeerEventSender, PeerOptions, PeerRole,
    Signal,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    created: AtomicUsize,
    closed: AtomicUsize,
    signals_received: AtomicUsize,
}

/// Fake `PeerConnector`.
#[derive(Debug, Default)]
pub struct MockPeerConnector {
    counters: Arc<Counters>,
    fail_create: bool,
    fail_negotiation: bool,
    silent: bool,
    log: Option<EventLog>,
}

impl MockPeerConnector {
    /// Connections that negotiate successfully.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector that cannot create connections.
    #[must_use]
    pub fn failing_create() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    /// Connections that report failure on the first remote signal.
    #[must_use]
    pub fn failing_negotiation() -> Self {
        Self {
            fail_negotiation: true,
            ..Self::default()
        }
    }

    /// Connections that never emit anything on their own.
    #[must_use]
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    /// Connections record their close to `log`.
    #[must_use]
    pub fn with_log(mut self, log: &EventLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    #[must_use]
    pub fn created(&self) -> usize {
        self.counters.created.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Connections created and not yet closed.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.created().saturating_sub(self.closed())
    }

    #[must_use]
    pub fn signals_received(&self) -> usize {
        self.counters.signals_received.load(Ordering::SeqCst)
    }
}

impl PeerConnector for MockPeerConnector {
    fn create_peer(
        &self,
        options: PeerOptions,
        stream: &LocalMediaStream,
        events: PeerEventSender,
    ) -> Result<Box<dyn PeerConnection>, PeerError> {
        if self.fail_create {
            return Err(PeerError::Negotiation("engine unavailable".to_string()));
        }
        let number = self.counters.created.fetch_add(1, Ordering::SeqCst) + 1;

        let connection = MockPeerConnection {
            number,
            role: options.role,
            trickle: options.trickle,
            local_stream: stream.id().to_string(),
            events,
            counters: Arc::clone(&self.counters),
            closed: AtomicBool::new(false),
            fail_negotiation: self.fail_negotiation,
            silent: self.silent,
            log: self.log.clone(),
        };

        if options.role == PeerRole::Initiator && !self.silent {
            connection.emit_description(Signal::Offer {
                sdp: format!("mock-offer-{number}"),
            });
        }
        Ok(Box::new(connection))
    }
}

struct MockPeerConnection {
    number: usize,
    role: PeerRole,
    trickle: bool,
    local_stream: String,
    events: PeerEventSender,
    counters: Arc<Counters>,
    closed: AtomicBool,
    fail_negotiation: bool,
    silent: bool,
    log: Option<EventLog>,
}

impl MockPeerConnection {
    fn emit_description(&self, description: Signal) {
        self.events.emit(PeerEvent::Signal(description));
        if self.trickle {
            self.events.emit(PeerEvent::Signal(Signal::Candidate {
                candidate: IceCandidate {
                    candidate: format!("candidate:{} 1 udp 2122260223 10.0.0.{} 5000 typ host", self.number, self.number),
                    sdp_mid: Some("0".to_string()),
                    sdp_m_line_index: Some(0),
                },
            }));
        }
    }

    fn emit_connected(&self) {
        self.events.emit(PeerEvent::RemoteStream(RemoteMediaStream {
            id: format!("remote-of-{}", self.local_stream),
        }));
        self.events.emit(PeerEvent::Connected);
    }
}

impl PeerConnection for MockPeerConnection {
    fn signal(&mut self, signal: Signal) -> Result<(), PeerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PeerError::Closed);
        }
        self.counters.signals_received.fetch_add(1, Ordering::SeqCst);

        if self.silent {
            return Ok(());
        }
        if self.fail_negotiation {
            self.events.emit(PeerEvent::Failed("ice connection failed".to_string()));
            return Ok(());
        }

        match (self.role, signal) {
            (PeerRole::Responder, Signal::Offer { .. }) => {
                self.emit_description(Signal::Answer {
                    sdp: format!("mock-answer-{}", self.number),
                });
                self.emit_connected();
            }
            (PeerRole::Initiator, Signal::Answer { .. }) => self.emit_connected(),
            (_, Signal::Candidate { .. }) => {}
            (role, other) => {
                return Err(PeerError::Negotiation(format!(
                    "{} cannot accept {}",
                    role.name(),
                    other.kind()
                )));
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            if let Some(log) = &self.log {
                log.record(PEER_CLOSED);
            }
        }
    }
}
