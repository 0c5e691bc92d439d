//! # Meeting Client Test Utilities
//!
//! Mock implementations and fixtures for exercising the meeting client
//! without a real directory, relay, camera or WebRTC engine.
//!
//! ## Modules
//!
//! - `mock_relay` - In-memory relay hub routing events between rooms
//! - `mock_media` - Fake capture devices with observable tracks
//! - `mock_peer` - Scripted peer connections that negotiate instantly
//! - `clock` - Wall clock anchored on tokio time
//! - `event_log` - Ordered record of teardown side effects
//! - `fixtures` - Common ids, instants and dependency bundles
//!
//! The scripted directory lives with the trait it implements, behind
//! meeting-client's `test-utils` feature, and is re-exported here.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use meeting_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let relay = InMemoryRelay::new();
//!     let media = MockMediaDevices::new();
//!     let peers = MockPeerConnector::new();
//!     let deps = fixtures::signaling_deps(&media, &relay, &peers);
//!     // Start a signaling session with `deps`...
//! }
//! ```

pub mod clock;
pub mod event_log;
pub mod fixtures;
pub mod mock_media;
pub mod mock_peer;
pub mod mock_relay;

pub use clock::AnchoredClock;
pub use event_log::EventLog;
pub use meeting_client::directory::mock::MockDirectory;
pub use mock_media::{MockMediaDevices, MockTrack};
pub use mock_peer::MockPeerConnector;
pub use mock_relay::InMemoryRelay;
