use tokio::sync::broadcast;
use uuid::Uuid;

/// Addressing for a real-time event: a chat room, a personal room, or a
/// single connection (direct replies such as acks and errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipients {
    Chat(i64),
    User(i64),
    Connection(Uuid),
}

#[derive(Debug, Clone)]
pub struct ServerEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub recipients: Recipients,
    /// Connection to skip when fanning out (usually the originator).
    pub exclude: Option<Uuid>,
}

/// Broadcast-based event bus for real-time dispatch. Every socket session
/// subscribes and filters events against its own room membership.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: ServerEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    pub fn dispatch(&self, event_type: &str, payload: serde_json::Value, recipients: Recipients) {
        self.publish(ServerEvent {
            event_type: event_type.to_string(),
            payload,
            recipients,
            exclude: None,
        });
    }

    /// Publish to a room while skipping the originating connection.
    pub fn dispatch_excluding(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        recipients: Recipients,
        exclude: Uuid,
    ) {
        self.publish(ServerEvent {
            event_type: event_type.to_string(),
            payload,
            recipients,
            exclude: Some(exclude),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}
