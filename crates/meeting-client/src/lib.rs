//! Meeting Client Library
//!
//! Core of a two-party scheduled video meeting client:
//!
//! - Meeting creation, validation and slot confirmation against the meeting
//!   directory
//! - A session state machine gating the call behind a join window that
//!   opens three minutes before the confirmed slot
//! - Peer signaling over a room-scoped relay channel
//!
//! # Architecture
//!
//! ```text
//! MeetingRoom (one per call view)
//! ├── MeetingSessionActor
//! │   ├── owns SessionState and the Meeting record
//! │   └── owns at most one CountdownTimer
//! └── SignalingSession (one per call attempt)
//!     ├── owns the LocalMediaStream
//!     ├── owns the RelayChannel
//!     └── owns at most one live PeerConnection
//! ```
//!
//! # Key Design Decisions
//!
//! - **Pure transitions**: `session::transition` holds every lifecycle rule;
//!   the actor only executes them
//! - **Asymmetric roles**: whoever hears `user-joined` initiates, so a
//!   two-party room produces exactly one offer
//! - **No automatic retry**: a failed call is recovered by re-joining
//!
//! # Modules
//!
//! - [`slot_clock`] - Slot parsing and join-window arithmetic
//! - [`session`] - Lifecycle state machine and its actor
//! - [`signaling`] - Relay protocol and the signaling session
//! - [`directory`] - Meeting directory interface and HTTP client
//! - [`errors`] - Error taxonomy and user-facing messages

pub mod clock;
pub mod config;
pub mod directory;
pub mod errors;
pub mod media;
pub mod meeting;
pub mod observability;
pub mod room;
pub mod session;
pub mod signaling;
pub mod slot_clock;
