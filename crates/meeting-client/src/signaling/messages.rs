//! Relay channel message types.
//!
//! Every frame is a JSON text message `{"event": <name>, "data": <payload>}`
//! with kebab-case event names and camelCase payload fields. Inbound frames
//! are size-checked, decoded and validated before any handler sees them.

use common::types::{MeetingId, PeerId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest accepted relay frame.
pub const MAX_FRAME_BYTES: usize = 256 * 1024;

/// Largest accepted SDP body.
pub const MAX_SDP_BYTES: usize = 64 * 1024;

/// Malformed or unacceptable relay traffic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    #[error("invalid peer id in '{0}'")]
    InvalidPeerId(&'static str),

    #[error("empty session description")]
    EmptySdp,

    #[error("session description of {0} bytes exceeds limit")]
    SdpTooLarge(usize),

    #[error("empty ICE candidate")]
    EmptyCandidate,

    #[error("'{event}' cannot carry a {signal} signal")]
    UnexpectedSignal {
        event: &'static str,
        signal: &'static str,
    },
}

/// ICE candidate payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}

/// Opaque negotiation payload produced and consumed by peer connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Signal {
    Offer { sdp: String },
    Answer { sdp: String },
    Candidate { candidate: IceCandidate },
}

impl Signal {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Offer { .. } => "offer",
            Signal::Answer { .. } => "answer",
            Signal::Candidate { .. } => "candidate",
        }
    }

    /// Check size and emptiness limits.
    ///
    /// # Errors
    ///
    /// Returns the first limit the signal violates.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Signal::Offer { sdp } | Signal::Answer { sdp } => {
                if sdp.trim().is_empty() {
                    Err(ProtocolError::EmptySdp)
                } else if sdp.len() > MAX_SDP_BYTES {
                    Err(ProtocolError::SdpTooLarge(sdp.len()))
                } else {
                    Ok(())
                }
            }
            Signal::Candidate { candidate } => {
                if candidate.candidate.trim().is_empty() {
                    Err(ProtocolError::EmptyCandidate)
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// `send-call` payload: the initiator's offer for one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCall {
    pub to_peer_id: PeerId,
    pub from_peer_id: PeerId,
    pub signal: Signal,
}

/// `accept-call` payload: the responder's answer to `caller_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptCall {
    pub caller_id: PeerId,
    pub signal: Signal,
}

/// `receive-call` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCall {
    pub caller_id: PeerId,
    pub signal: Signal,
}

/// `call-accepted` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAnswer {
    pub from_peer_id: PeerId,
    pub signal: Signal,
}

/// Client to relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum OutboundEvent {
    JoinRoom(MeetingId),
    SendCall(SendCall),
    AcceptCall(AcceptCall),
    LeaveRoom(MeetingId),
}

impl OutboundEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::JoinRoom(_) => "join-room",
            OutboundEvent::SendCall(_) => "send-call",
            OutboundEvent::AcceptCall(_) => "accept-call",
            OutboundEvent::LeaveRoom(_) => "leave-room",
        }
    }

    /// Serialize to a text frame.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the payload violates a limit.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        match self {
            OutboundEvent::SendCall(call) => {
                check_peer(&call.to_peer_id, "send-call")?;
                check_peer(&call.from_peer_id, "send-call")?;
                call.signal.validate()?;
            }
            OutboundEvent::AcceptCall(accept) => {
                check_peer(&accept.caller_id, "accept-call")?;
                accept.signal.validate()?;
            }
            OutboundEvent::JoinRoom(_) | OutboundEvent::LeaveRoom(_) => {}
        }

        let text =
            serde_json::to_string(self).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        if text.len() > MAX_FRAME_BYTES {
            return Err(ProtocolError::FrameTooLarge(text.len()));
        }
        Ok(text)
    }
}

/// Relay to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum InboundEvent {
    /// First frame on every connection: the id the relay assigned us.
    Connected(PeerId),
    UserJoined(PeerId),
    ReceiveCall(IncomingCall),
    CallAccepted(CallAnswer),
    UserLeft(PeerId),
}

const INBOUND_EVENTS: [&str; 5] = [
    "connected",
    "user-joined",
    "receive-call",
    "call-accepted",
    "user-left",
];

impl InboundEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::Connected(_) => "connected",
            InboundEvent::UserJoined(_) => "user-joined",
            InboundEvent::ReceiveCall(_) => "receive-call",
            InboundEvent::CallAccepted(_) => "call-accepted",
            InboundEvent::UserLeft(_) => "user-left",
        }
    }

    /// Decode and validate a text frame.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` for oversized, malformed, unknown or invalid
    /// frames.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        if text.len() > MAX_FRAME_BYTES {
            return Err(ProtocolError::FrameTooLarge(text.len()));
        }

        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let name = value
            .get("event")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ProtocolError::Malformed("missing event name".to_string()))?;
        if !INBOUND_EVENTS.contains(&name) {
            return Err(ProtocolError::UnknownEvent(name.to_string()));
        }

        let event: InboundEvent =
            serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }

    /// Check peer ids, signal limits and signal kinds per event.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            InboundEvent::Connected(peer)
            | InboundEvent::UserJoined(peer)
            | InboundEvent::UserLeft(peer) => check_peer(peer, self.name()),
            InboundEvent::ReceiveCall(call) => {
                check_peer(&call.caller_id, "receive-call")?;
                call.signal.validate()?;
                match call.signal {
                    Signal::Offer { .. } | Signal::Candidate { .. } => Ok(()),
                    Signal::Answer { .. } => Err(ProtocolError::UnexpectedSignal {
                        event: "receive-call",
                        signal: "answer",
                    }),
                }
            }
            InboundEvent::CallAccepted(answer) => {
                check_peer(&answer.from_peer_id, "call-accepted")?;
                answer.signal.validate()?;
                match answer.signal {
                    Signal::Answer { .. } | Signal::Candidate { .. } => Ok(()),
                    Signal::Offer { .. } => Err(ProtocolError::UnexpectedSignal {
                        event: "call-accepted",
                        signal: "offer",
                    }),
                }
            }
        }
    }
}

fn check_peer(peer: &PeerId, event: &'static str) -> Result<(), ProtocolError> {
    if peer.is_valid() {
        Ok(())
    } else {
        Err(ProtocolError::InvalidPeerId(event))
    }
}
