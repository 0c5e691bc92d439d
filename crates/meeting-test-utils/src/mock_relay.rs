//! In-memory relay hub.
//!
//! Behaves like the room relay: assigns peer ids on connect, tells existing
//! room members about newcomers, routes calls and answers to their target,
//! and announces `user-left` when a member leaves or disconnects. Every
//! outbound event is recorded for assertions.

use crate::event_log::{EventLog, LEAVE_ROOM, RELAY_CLOSED};
use async_trait::async_trait;
use common::types::{MeetingId, PeerId};
use meeting_client::signaling::messages::{CallAnswer, IncomingCall};
use meeting_client::signaling::{
    InboundEvent, OutboundEvent, RelayChannel, RelayConnector, RelayError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const MEMBER_CHANNEL_BUFFER: usize = 64;

struct Member {
    room: Option<MeetingId>,
    inbound: mpsc::Sender<String>,
    log: Option<EventLog>,
}

#[derive(Default)]
struct Hub {
    members: HashMap<PeerId, Member>,
    sent: Vec<(PeerId, OutboundEvent)>,
    next_id: usize,
}

type Delivery = (mpsc::Sender<String>, String);

impl Hub {
    fn frame(event: &InboundEvent) -> String {
        serde_json::to_string(event).expect("inbound event serializes")
    }

    fn room_members(&self, room: &MeetingId, except: &PeerId) -> Vec<mpsc::Sender<String>> {
        self.members
            .iter()
            .filter(|(id, m)| *id != except && m.room.as_ref() == Some(room))
            .map(|(_, m)| m.inbound.clone())
            .collect()
    }

    fn deliver_to(&self, target: &PeerId, event: &InboundEvent) -> Vec<Delivery> {
        self.members
            .get(target)
            .map(|m| vec![(m.inbound.clone(), Self::frame(event))])
            .unwrap_or_default()
    }

    fn broadcast(&self, room: &MeetingId, except: &PeerId, event: &InboundEvent) -> Vec<Delivery> {
        let frame = Self::frame(event);
        self.room_members(room, except)
            .into_iter()
            .map(|tx| (tx, frame.clone()))
            .collect()
    }

    fn route(&mut self, from: &PeerId, event: OutboundEvent) -> Vec<Delivery> {
        self.sent.push((from.clone(), event.clone()));

        match event {
            OutboundEvent::JoinRoom(room) => {
                if let Some(member) = self.members.get_mut(from) {
                    member.room = Some(room.clone());
                }
                self.broadcast(&room, from, &InboundEvent::UserJoined(from.clone()))
            }
            OutboundEvent::SendCall(call) => self.deliver_to(
                &call.to_peer_id,
                &InboundEvent::ReceiveCall(IncomingCall {
                    caller_id: from.clone(),
                    signal: call.signal,
                }),
            ),
            OutboundEvent::AcceptCall(accept) => self.deliver_to(
                &accept.caller_id,
                &InboundEvent::CallAccepted(CallAnswer {
                    from_peer_id: from.clone(),
                    signal: accept.signal,
                }),
            ),
            OutboundEvent::LeaveRoom(room) => {
                if let Some(member) = self.members.get_mut(from) {
                    member.room = None;
                    if let Some(log) = &member.log {
                        log.record(LEAVE_ROOM);
                    }
                }
                self.broadcast(&room, from, &InboundEvent::UserLeft(from.clone()))
            }
        }
    }

    fn disconnect(&mut self, peer: &PeerId) -> Vec<Delivery> {
        let Some(member) = self.members.remove(peer) else {
            return Vec::new();
        };
        if let Some(log) = &member.log {
            log.record(RELAY_CLOSED);
        }
        match member.room {
            Some(room) => self.broadcast(&room, peer, &InboundEvent::UserLeft(peer.clone())),
            None => Vec::new(),
        }
    }
}

async fn send_all(deliveries: Vec<Delivery>) {
    for (tx, frame) in deliveries {
        let _ = tx.send(frame).await;
    }
}

/// Shared in-memory relay. Clones talk to the same hub.
#[derive(Clone, Default)]
pub struct InMemoryRelay {
    hub: Arc<Mutex<Hub>>,
    connects: Arc<AtomicUsize>,
    refuse: bool,
    log: Option<EventLog>,
}

impl InMemoryRelay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A relay that refuses every connection.
    #[must_use]
    pub fn unreachable() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    /// A handle onto the same hub whose connections record `leave-room`
    /// and their disconnect to `log`.
    #[must_use]
    pub fn with_log(&self, log: &EventLog) -> Self {
        Self {
            log: Some(log.clone()),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn connect_calls(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Every outbound event received so far, with its sender.
    #[must_use]
    pub fn sent(&self) -> Vec<(PeerId, OutboundEvent)> {
        self.hub.lock().unwrap().sent.clone()
    }

    /// How many outbound events named `name` were received.
    #[must_use]
    pub fn sent_count(&self, name: &str) -> usize {
        self.hub
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(_, e)| e.name() == name)
            .count()
    }

    /// Connected clients currently in `room`.
    #[must_use]
    pub fn room_size(&self, room: &MeetingId) -> usize {
        self.hub
            .lock()
            .unwrap()
            .members
            .values()
            .filter(|m| m.room.as_ref() == Some(room))
            .count()
    }

    /// Connected clients.
    #[must_use]
    pub fn connected(&self) -> usize {
        self.hub.lock().unwrap().members.len()
    }

    /// Wait until `room` holds `size` members.
    pub async fn wait_for_room_size(&self, room: &MeetingId, size: usize) {
        for _ in 0..1000 {
            if self.room_size(room) == size {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("room {room} never reached {size} members");
    }

    /// Wait until no client is connected.
    pub async fn wait_until_empty(&self) {
        for _ in 0..1000 {
            if self.connected() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("relay still has {} clients", self.connected());
    }

    /// Push a raw frame to `peer` as if the relay sent it.
    pub async fn inject(&self, peer: &PeerId, frame: &str) {
        let tx = self
            .hub
            .lock()
            .unwrap()
            .members
            .get(peer)
            .map(|m| m.inbound.clone())
            .expect("peer is connected");
        tx.send(frame.to_string()).await.unwrap();
    }

    /// Drop `peer`'s connection from the relay side.
    pub async fn kick(&self, peer: &PeerId) {
        let deliveries = self.hub.lock().unwrap().disconnect(peer);
        send_all(deliveries).await;
    }
}

#[async_trait]
impl RelayConnector for InMemoryRelay {
    async fn connect(&self) -> Result<RelayChannel, RelayError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(RelayError::Connect("connection refused".to_string()));
        }

        let (out_tx, mut out_rx) = mpsc::channel::<String>(MEMBER_CHANNEL_BUFFER);
        let (in_tx, in_rx) = mpsc::channel::<String>(MEMBER_CHANNEL_BUFFER);
        let token = CancellationToken::new();

        let peer_id = {
            let mut hub = self.hub.lock().unwrap();
            hub.next_id += 1;
            let peer_id = PeerId::parse(&format!("peer-{}", hub.next_id)).unwrap();
            hub.members.insert(
                peer_id.clone(),
                Member {
                    room: None,
                    inbound: in_tx,
                    log: self.log.clone(),
                },
            );
            peer_id
        };

        let hub = Arc::clone(&self.hub);
        let me = peer_id.clone();
        let cancelled = token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    frame = out_rx.recv() => {
                        let Some(frame) = frame else { break };
                        let event: OutboundEvent =
                            serde_json::from_str(&frame).expect("client sent a valid frame");
                        let deliveries = hub.lock().unwrap().route(&me, event);
                        send_all(deliveries).await;
                    }

                    () = cancelled.cancelled() => break,
                }
            }
            let deliveries = hub.lock().unwrap().disconnect(&me);
            send_all(deliveries).await;
        });

        Ok(RelayChannel::new(peer_id, out_tx, in_rx, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> MeetingId {
        MeetingId::parse("room-1").unwrap()
    }

    #[tokio::test]
    async fn test_join_notifies_existing_members_only() {
        let relay = InMemoryRelay::new();
        let mut a = relay.connect().await.unwrap();
        let mut b = relay.connect().await.unwrap();

        a.send(&OutboundEvent::JoinRoom(room())).await.unwrap();
        relay.wait_for_room_size(&room(), 1).await;
        b.send(&OutboundEvent::JoinRoom(room())).await.unwrap();

        assert_eq!(
            a.recv().await,
            Some(InboundEvent::UserJoined(b.peer_id().clone()))
        );

        // Disconnecting b tells a.
        b.close().await;
        assert_eq!(
            a.recv().await,
            Some(InboundEvent::UserLeft(b.peer_id().clone()))
        );
        a.close().await;
        relay.wait_until_empty().await;
    }
}
