//! WebSocket relay transport.

use crate::signaling::messages::InboundEvent;
use crate::signaling::relay::{RelayChannel, RelayConnector, RelayError};
use async_trait::async_trait;
use common::types::PeerId;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Frame buffer in each direction.
const RELAY_CHANNEL_BUFFER: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to a relay over WebSocket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsRelayConnector {
    url: Url,
    connect_timeout: Duration,
}

impl WsRelayConnector {
    #[must_use]
    pub fn new(url: Url, connect_timeout: Duration) -> Self {
        Self {
            url,
            connect_timeout,
        }
    }
}

#[async_trait]
impl RelayConnector for WsRelayConnector {
    #[instrument(skip_all, name = "meet.relay.connect", fields(url = %self.url))]
    async fn connect(&self) -> Result<RelayChannel, RelayError> {
        let (stream, _response) = tokio::time::timeout(
            self.connect_timeout,
            connect_async(self.url.as_str()),
        )
        .await
        .map_err(|_| RelayError::Timeout)?
        .map_err(|e| RelayError::Connect(e.to_string()))?;

        let (write, mut read) = stream.split();

        let peer_id = tokio::time::timeout(self.connect_timeout, await_assigned_id(&mut read))
            .await
            .map_err(|_| RelayError::Timeout)??;

        info!(target: "meet.relay", peer_id = %peer_id, "Connected to relay");

        let (out_tx, out_rx) = mpsc::channel(RELAY_CHANNEL_BUFFER);
        let (in_tx, in_rx) = mpsc::channel(RELAY_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let task = tokio::spawn(pump(write, read, out_rx, in_tx, cancel_token.clone()));

        Ok(RelayChannel::new(peer_id, out_tx, in_rx, cancel_token).with_io_task(task))
    }
}

/// Read until the relay's `connected` frame.
async fn await_assigned_id(read: &mut SplitStream<WsStream>) -> Result<PeerId, RelayError> {
    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => {
                return match InboundEvent::decode(text.as_str())? {
                    InboundEvent::Connected(peer_id) => Ok(peer_id),
                    other => Err(RelayError::Handshake(format!(
                        "expected connected, got {}",
                        other.name()
                    ))),
                };
            }
            Ok(Message::Close(_)) => return Err(RelayError::Disconnected),
            Ok(_) => {}
            Err(e) => return Err(RelayError::Connect(e.to_string())),
        }
    }
    Err(RelayError::Disconnected)
}

/// Move frames between the socket and the channel until either side stops.
///
/// Queued outbound frames are written before the close frame.
async fn pump(
    mut write: SplitSink<WsStream, Message>,
    mut read: SplitStream<WsStream>,
    mut outbound: mpsc::Receiver<String>,
    inbound: mpsc::Sender<String>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            () = cancel_token.cancelled() => {
                debug!(target: "meet.relay", "Relay transport cancelled");
                break;
            }

            frame = outbound.recv() => {
                match frame {
                    Some(text) => {
                        if let Err(e) = write.send(Message::text(text)).await {
                            warn!(target: "meet.relay", error = %e, "Relay write failed");
                            break;
                        }
                    }
                    None => {
                        debug!(target: "meet.relay", "Outbound closed, disconnecting");
                        break;
                    }
                }
            }

            message = read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        if inbound.send(text.as_str().to_owned()).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!(target: "meet.relay", "Ignoring binary relay frame");
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(target: "meet.relay", "Relay closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(target: "meet.relay", error = %e, "Relay read failed");
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = write.send(Message::Close(None)).await {
        debug!(target: "meet.relay", error = %e, "Close frame not sent");
    }
}
