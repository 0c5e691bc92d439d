//! Relay channel connection.
//!
//! A `RelayChannel` is owned by exactly one signaling session and is
//! explicitly closed by it. Transports exchange raw text frames with the
//! channel; encoding, size checks and validation happen here so every
//! transport gets the same treatment.

use crate::observability::metrics;
use crate::signaling::messages::{InboundEvent, OutboundEvent, ProtocolError};
use async_trait::async_trait;
use common::types::PeerId;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long `close` waits for queued frames to flush.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Relay channel failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("relay connection failed: {0}")]
    Connect(String),

    #[error("relay connection timed out")]
    Timeout,

    #[error("relay handshake failed: {0}")]
    Handshake(String),

    #[error("relay disconnected")]
    Disconnected,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Opens relay channels.
#[async_trait]
pub trait RelayConnector: Send + Sync {
    /// Connect and wait for the relay to assign a peer id.
    async fn connect(&self) -> Result<RelayChannel, RelayError>;
}

/// An open relay connection.
pub struct RelayChannel {
    peer_id: PeerId,
    outbound: Option<mpsc::Sender<String>>,
    inbound: mpsc::Receiver<String>,
    cancel_token: CancellationToken,
    io_task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for RelayChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayChannel")
            .field("peer_id", &self.peer_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl RelayChannel {
    /// Wrap transport channels. `cancel_token` is cancelled when the channel
    /// is closed or dropped.
    #[must_use]
    pub fn new(
        peer_id: PeerId,
        outbound: mpsc::Sender<String>,
        inbound: mpsc::Receiver<String>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            peer_id,
            outbound: Some(outbound),
            inbound,
            cancel_token,
            io_task: None,
        }
    }

    /// Attach the transport task so `close` can wait for it to flush.
    #[must_use]
    pub fn with_io_task(mut self, task: JoinHandle<()>) -> Self {
        self.io_task = Some(task);
        self
    }

    /// Id the relay assigned to this connection.
    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Encode and queue an event.
    ///
    /// # Errors
    ///
    /// `RelayError::Protocol` if the event violates a limit,
    /// `RelayError::Disconnected` if the channel is closed.
    pub async fn send(&self, event: &OutboundEvent) -> Result<(), RelayError> {
        let outbound = match &self.outbound {
            Some(tx) if !self.cancel_token.is_cancelled() => tx,
            _ => return Err(RelayError::Disconnected),
        };

        let frame = event.encode()?;
        outbound
            .send(frame)
            .await
            .map_err(|_| RelayError::Disconnected)?;

        metrics::record_relay_message("outbound", event.name());
        debug!(target: "meet.relay", event = event.name(), "Relay event sent");
        Ok(())
    }

    /// Next valid inbound event. Invalid frames are logged and skipped.
    ///
    /// Returns `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        loop {
            let frame = tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => return None,

                frame = self.inbound.recv() => frame?,
            };

            match InboundEvent::decode(&frame) {
                Ok(InboundEvent::Connected(peer_id)) => {
                    debug!(
                        target: "meet.relay",
                        peer_id = %peer_id,
                        "Ignoring repeated connected frame"
                    );
                }
                Ok(event) => {
                    metrics::record_relay_message("inbound", event.name());
                    return Some(event);
                }
                Err(e) => {
                    metrics::record_relay_message("inbound", "invalid");
                    warn!(target: "meet.relay", error = %e, "Dropping invalid relay frame");
                }
            }
        }
    }

    /// Flush queued frames and disconnect. Idempotent.
    pub async fn close(&mut self) {
        if self.outbound.take().is_none() {
            return;
        }

        // Dropping the sender lets the transport drain and say goodbye.
        if let Some(task) = self.io_task.take() {
            if tokio::time::timeout(CLOSE_GRACE, task).await.is_err() {
                warn!(target: "meet.relay", "Relay transport did not flush in time");
            }
        }
        self.cancel_token.cancel();
        debug!(target: "meet.relay", peer_id = %self.peer_id, "Relay channel closed");
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.outbound.is_none() || self.cancel_token.is_cancelled()
    }
}

impl Drop for RelayChannel {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::types::MeetingId;

    fn channel() -> (
        RelayChannel,
        mpsc::Receiver<String>,
        mpsc::Sender<String>,
        CancellationToken,
    ) {
        let (out_tx, out_rx) = mpsc::channel(8);
        let (in_tx, in_rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        let relay = RelayChannel::new(PeerId::parse("me").unwrap(), out_tx, in_rx, token.clone());
        (relay, out_rx, in_tx, token)
    }

    #[tokio::test]
    async fn test_send_encodes_frames() {
        let (relay, mut out_rx, _in_tx, _token) = channel();
        relay
            .send(&OutboundEvent::JoinRoom(MeetingId::parse("room").unwrap()))
            .await
            .unwrap();
        assert_eq!(
            out_rx.recv().await.unwrap(),
            r#"{"event":"join-room","data":"room"}"#
        );
    }

    #[tokio::test]
    async fn test_recv_skips_invalid_frames() {
        let (mut relay, _out_rx, in_tx, _token) = channel();
        in_tx.send("garbage".to_string()).await.unwrap();
        in_tx
            .send(r#"{"event":"chat-message","data":"hi"}"#.to_string())
            .await
            .unwrap();
        in_tx
            .send(r#"{"event":"connected","data":"me"}"#.to_string())
            .await
            .unwrap();
        in_tx
            .send(r#"{"event":"user-joined","data":"other"}"#.to_string())
            .await
            .unwrap();

        assert_eq!(
            relay.recv().await,
            Some(InboundEvent::UserJoined(PeerId::parse("other").unwrap()))
        );
    }

    #[tokio::test]
    async fn test_recv_none_when_transport_ends() {
        let (mut relay, _out_rx, in_tx, _token) = channel();
        drop(in_tx);
        assert_eq!(relay.recv().await, None);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_sends() {
        let (mut relay, mut out_rx, _in_tx, token) = channel();
        relay.close().await;
        relay.close().await;

        assert!(relay.is_closed());
        assert!(token.is_cancelled());
        assert_eq!(
            relay
                .send(&OutboundEvent::LeaveRoom(MeetingId::parse("room").unwrap()))
                .await,
            Err(RelayError::Disconnected)
        );
        // Sender dropped on close.
        assert_eq!(out_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_drop_cancels_token() {
        let (relay, _out_rx, _in_tx, token) = channel();
        drop(relay);
        assert!(token.is_cancelled());
    }
}
