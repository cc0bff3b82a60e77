//! In-process fan-out of room events

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use super::ServerEvent;

/// A room is keyed by the user id of its single member
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "userId", rename_all = "snake_case")]
pub enum Room {
    Customer(Uuid),
    Provider(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomMessage {
    pub room: Room,
    pub event: ServerEvent,
}

/// Broadcast hub shared by every socket connection.
///
/// Each connection receives all messages and keeps the ones addressed to the
/// rooms it joined.
#[derive(Clone)]
pub struct RoomHub {
    sender: broadcast::Sender<RoomMessage>,
    relay: Option<mpsc::UnboundedSender<RoomMessage>>,
}

impl RoomHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            relay: None,
        }
    }

    /// Also forward locally published messages to another instance relay
    pub fn with_relay(mut self, relay: mpsc::UnboundedSender<RoomMessage>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomMessage> {
        self.sender.subscribe()
    }

    /// Publish to local subscribers and the relay, if any
    pub fn publish(&self, room: Room, event: ServerEvent) {
        let message = RoomMessage { room, event };
        if let Some(relay) = &self.relay {
            if relay.send(message.clone()).is_err() {
                tracing::warn!("Event relay is closed, delivering locally only");
            }
        }
        self.publish_local(message);
    }

    /// Publish to local subscribers only
    pub fn publish_local(&self, message: RoomMessage) {
        let event = message.event.name();
        match self.sender.send(message) {
            Ok(receivers) => tracing::debug!(event, receivers, "Event published"),
            // No sockets connected
            Err(_) => tracing::debug!(event, "Event dropped, no subscribers"),
        }
    }
}
