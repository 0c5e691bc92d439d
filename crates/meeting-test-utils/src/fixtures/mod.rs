//! Common test data.

use chrono::{DateTime, TimeZone, Utc};
use common::types::MeetingId;
use meeting_client::clock::Clock;
use meeting_client::directory::MeetingDirectory;
use meeting_client::media::{MediaConstraints, MediaDevices};
use meeting_client::session::SessionDeps;
use meeting_client::signaling::{PeerConnector, SignalingDeps};
use std::sync::Arc;
use std::time::Duration;

use crate::{InMemoryRelay, MockMediaDevices, MockPeerConnector};

/// Meeting id from a literal.
#[must_use]
pub fn meeting_id(raw: &str) -> MeetingId {
    MeetingId::parse(raw).unwrap()
}

/// UTC instant on the fixture date, 2026-05-04.
#[must_use]
pub fn utc(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, hour, minute, second)
        .unwrap()
}

/// Session dependencies with a one-second tick in UTC.
#[must_use]
pub fn session_deps(directory: Arc<dyn MeetingDirectory>, clock: Arc<dyn Clock>) -> SessionDeps {
    SessionDeps {
        directory,
        clock,
        timezone: chrono_tz::UTC,
        tick: Duration::from_secs(1),
    }
}

/// Signaling dependencies with audio and video requested.
#[must_use]
pub fn signaling_deps(
    media: &Arc<MockMediaDevices>,
    relay: &InMemoryRelay,
    peers: &Arc<MockPeerConnector>,
) -> SignalingDeps {
    let media: Arc<dyn MediaDevices> = media.clone();
    let peers: Arc<dyn PeerConnector> = peers.clone();
    SignalingDeps {
        media,
        relay: Arc::new(relay.clone()),
        peers,
        constraints: MediaConstraints::default(),
        trickle: false,
    }
}
