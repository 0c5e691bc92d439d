//! Two-party call signaling over the relay channel.

pub mod messages;
pub mod peer;
pub mod relay;
mod session;
mod ws_relay;

pub use messages::{InboundEvent, OutboundEvent, ProtocolError, Signal};
pub use peer::{
    PeerAttemptState, PeerConnection, PeerConnector, PeerError, PeerEvent, PeerEventSender,
    PeerOptions, PeerRole,
};
pub use relay::{RelayChannel, RelayConnector, RelayError};
pub use session::{CallPhase, CallSnapshot, SignalingDeps, SignalingHandle, SignalingSession};
pub use ws_relay::WsRelayConnector;
