//! Local media capture boundary.
//!
//! Capture devices are platform-specific; the client talks to them through
//! `MediaDevices`. A stream is owned by exactly one signaling session.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Media acquisition failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("no {0} device available")]
    NoDevice(String),

    #[error("media capture failed: {0}")]
    Capture(String),
}

/// Track kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A live capture track.
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> TrackKind;
    fn is_enabled(&self) -> bool;
    /// Mute or unmute. Purely local; never renegotiates.
    fn set_enabled(&self, enabled: bool);
    /// Release the device. Idempotent.
    fn stop(&self);
    fn is_live(&self) -> bool;
}

/// Capture constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// Source of local media streams.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire a stream. May suspend while the user decides on permission.
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<LocalMediaStream, MediaError>;
}

/// Local camera/microphone stream.
#[derive(Clone)]
pub struct LocalMediaStream {
    id: String,
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl std::fmt::Debug for LocalMediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMediaStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks.len())
            .field("live", &self.live_tracks())
            .finish()
    }
}

impl LocalMediaStream {
    #[must_use]
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    /// Flip every track of `kind`. Returns the new enabled state, or `None`
    /// if the stream has no such track.
    pub fn toggle(&self, kind: TrackKind) -> Option<bool> {
        let mut result = None;
        for track in self.tracks.iter().filter(|t| t.kind() == kind) {
            let enabled = !track.is_enabled();
            track.set_enabled(enabled);
            result = Some(enabled);
        }
        result
    }

    /// Whether any track of `kind` is enabled.
    #[must_use]
    pub fn is_enabled(&self, kind: TrackKind) -> bool {
        self.tracks
            .iter()
            .any(|t| t.kind() == kind && t.is_enabled())
    }

    /// Stop every track.
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    #[must_use]
    pub fn live_tracks(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }
}

/// Remote participant's stream, as announced by the peer connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMediaStream {
    pub id: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeTrack {
        id: String,
        kind: TrackKind,
        enabled: AtomicBool,
        live: AtomicBool,
    }

    impl FakeTrack {
        fn arc(id: &str, kind: TrackKind) -> Arc<dyn MediaTrack> {
            Arc::new(Self {
                id: id.to_string(),
                kind,
                enabled: AtomicBool::new(true),
                live: AtomicBool::new(true),
            })
        }
    }

    impl MediaTrack for FakeTrack {
        fn id(&self) -> &str {
            &self.id
        }
        fn kind(&self) -> TrackKind {
            self.kind
        }
        fn is_enabled(&self) -> bool {
            self.enabled.load(Ordering::SeqCst)
        }
        fn set_enabled(&self, enabled: bool) {
            self.enabled.store(enabled, Ordering::SeqCst);
        }
        fn stop(&self) {
            self.live.store(false, Ordering::SeqCst);
        }
        fn is_live(&self) -> bool {
            self.live.load(Ordering::SeqCst)
        }
    }

    fn stream() -> LocalMediaStream {
        LocalMediaStream::new(
            "local",
            vec![
                FakeTrack::arc("mic", TrackKind::Audio),
                FakeTrack::arc("cam", TrackKind::Video),
            ],
        )
    }

    #[test]
    fn test_toggle_flips_only_matching_kind() {
        let s = stream();
        assert_eq!(s.toggle(TrackKind::Audio), Some(false));
        assert!(!s.is_enabled(TrackKind::Audio));
        assert!(s.is_enabled(TrackKind::Video));
        assert_eq!(s.toggle(TrackKind::Audio), Some(true));
    }

    #[test]
    fn test_toggle_missing_kind() {
        let s = LocalMediaStream::new("audio-only", vec![FakeTrack::arc("mic", TrackKind::Audio)]);
        assert_eq!(s.toggle(TrackKind::Video), None);
    }

    #[test]
    fn test_stop_all_is_idempotent() {
        let s = stream();
        assert_eq!(s.live_tracks(), 2);
        s.stop_all();
        s.stop_all();
        assert_eq!(s.live_tracks(), 0);
    }
}
