//! Mock capture devices.
//!
//! Every track handed out is remembered so tests can check that teardown
//! stopped all of them.

use crate::event_log::{EventLog, TRACK_STOPPED};
use async_trait::async_trait;
use meeting_client::media::{
    LocalMediaStream, MediaConstraints, MediaDevices, MediaError, MediaTrack, TrackKind,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Fake capture track.
#[derive(Debug)]
pub struct MockTrack {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    live: AtomicBool,
    stop_calls: AtomicUsize,
    log: Option<EventLog>,
}

impl MockTrack {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: AtomicBool::new(true),
            live: AtomicBool::new(true),
            stop_calls: AtomicUsize::new(0),
            log: None,
        }
    }

    /// Record the first `stop` to `log`.
    #[must_use]
    pub fn with_log(mut self, log: Option<&EventLog>) -> Self {
        self.log = log.cloned();
        self
    }

    #[must_use]
    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

impl MediaTrack for MockTrack {
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
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.live.swap(false, Ordering::SeqCst) {
            if let Some(log) = &self.log {
                log.record(TRACK_STOPPED);
            }
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Fake `MediaDevices`.
#[derive(Debug, Default)]
pub struct MockMediaDevices {
    failure: Option<MediaError>,
    calls: AtomicUsize,
    tracks: Mutex<Vec<Arc<MockTrack>>>,
    log: Option<EventLog>,
}

impl MockMediaDevices {
    /// Devices that grant every request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Devices whose permission prompt is always refused.
    #[must_use]
    pub fn denied() -> Self {
        Self {
            failure: Some(MediaError::PermissionDenied),
            ..Self::default()
        }
    }

    /// Devices with no camera attached.
    #[must_use]
    pub fn without_camera() -> Self {
        Self {
            failure: Some(MediaError::NoDevice("video".to_string())),
            ..Self::default()
        }
    }

    /// Tracks handed out from now on record their stop to `log`.
    #[must_use]
    pub fn with_log(mut self, log: &EventLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every track ever handed out.
    #[must_use]
    pub fn tracks(&self) -> Vec<Arc<MockTrack>> {
        self.tracks.lock().unwrap().clone()
    }

    /// Tracks not yet stopped.
    #[must_use]
    pub fn live_tracks(&self) -> usize {
        self.tracks().iter().filter(|t| t.is_live()).count()
    }
}

#[async_trait]
impl MediaDevices for MockMediaDevices {
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<LocalMediaStream, MediaError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        let mut created = Vec::new();
        if constraints.audio {
            created.push(Arc::new(
                MockTrack::new(format!("mic-{call}"), TrackKind::Audio).with_log(self.log.as_ref()),
            ));
        }
        if constraints.video {
            created.push(Arc::new(
                MockTrack::new(format!("cam-{call}"), TrackKind::Video).with_log(self.log.as_ref()),
            ));
        }
        self.tracks.lock().unwrap().extend(created.iter().cloned());

        let tracks: Vec<Arc<dyn MediaTrack>> = created
            .into_iter()
            .map(|t| t as Arc<dyn MediaTrack>)
            .collect();
        Ok(LocalMediaStream::new(format!("local-{call}"), tracks))
    }
}
