use crate::error::CoreError;
use crate::events::{Recipients, ServerEvent};
use crate::registry::ConnectionId;
use aura_db::DbPool;
use dashmap::DashMap;
use std::collections::HashSet;

/// A fan-out group a connection can belong to. Every connection sits in its
/// owner's personal room; chat rooms are joined explicitly or rebuilt from
/// the participant table on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomId {
    Chat(i64),
    User(i64),
}

#[derive(Default)]
pub struct RoomMembership {
    rooms: DashMap<RoomId, HashSet<ConnectionId>>,
    memberships: DashMap<ConnectionId, HashSet<RoomId>>,
}

impl RoomMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room without an access check. Used for the
    /// personal room and for rebuilding chat rooms on connect, where the
    /// participant set was already read from the database.
    pub fn join_room(&self, connection_id: ConnectionId, room: RoomId) {
        self.rooms.entry(room).or_default().insert(connection_id);
        self.memberships
            .entry(connection_id)
            .or_default()
            .insert(room);
    }

    /// Join a chat room, verifying the user is a participant first.
    pub async fn join_chat_room(
        &self,
        pool: &DbPool,
        connection_id: ConnectionId,
        user_id: i64,
        chat_id: i64,
    ) -> Result<(), CoreError> {
        if !aura_db::chats::is_participant(pool, chat_id, user_id).await? {
            return Err(CoreError::AccessDenied);
        }
        self.join_room(connection_id, RoomId::Chat(chat_id));
        Ok(())
    }

    pub fn leave_room(&self, connection_id: ConnectionId, room: RoomId) {
        if let Some(mut members) = self.rooms.get_mut(&room) {
            members.remove(&connection_id);
        }
        self.rooms.remove_if(&room, |_, members| members.is_empty());
        if let Some(mut rooms) = self.memberships.get_mut(&connection_id) {
            rooms.remove(&room);
        }
    }

    /// Remove a connection from every room it joined. Returns the chat IDs
    /// it was in, for disconnect-time cleanup.
    pub fn leave_all(&self, connection_id: ConnectionId) -> Vec<i64> {
        let Some((_, rooms)) = self.memberships.remove(&connection_id) else {
            return Vec::new();
        };
        let mut chat_ids = Vec::new();
        for room in rooms {
            if let Some(mut members) = self.rooms.get_mut(&room) {
                members.remove(&connection_id);
            }
            self.rooms.remove_if(&room, |_, members| members.is_empty());
            if let RoomId::Chat(chat_id) = room {
                chat_ids.push(chat_id);
            }
        }
        chat_ids
    }

    pub fn is_member(&self, connection_id: ConnectionId, room: RoomId) -> bool {
        self.memberships
            .get(&connection_id)
            .map(|rooms| rooms.contains(&room))
            .unwrap_or(false)
    }

    pub fn members(&self, room: RoomId) -> Vec<ConnectionId> {
        self.rooms
            .get(&room)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Session-side filter: should this connection receive the event?
    pub fn should_deliver(&self, connection_id: ConnectionId, event: &ServerEvent) -> bool {
        if event.exclude == Some(connection_id) {
            return false;
        }
        match event.recipients {
            Recipients::Chat(chat_id) => self.is_member(connection_id, RoomId::Chat(chat_id)),
            Recipients::User(user_id) => self.is_member(connection_id, RoomId::User(user_id)),
            Recipients::Connection(target) => target == connection_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn chat_event(chat_id: i64, exclude: Option<ConnectionId>) -> ServerEvent {
        ServerEvent {
            event_type: "new_message".to_string(),
            payload: serde_json::json!({}),
            recipients: Recipients::Chat(chat_id),
            exclude,
        }
    }

    #[test]
    fn events_only_reach_room_members() {
        let rooms = RoomMembership::new();
        let in_room = Uuid::new_v4();
        let outside = Uuid::new_v4();
        rooms.join_room(in_room, RoomId::Chat(10));
        rooms.join_room(outside, RoomId::Chat(11));

        let event = chat_event(10, None);
        assert!(rooms.should_deliver(in_room, &event));
        assert!(!rooms.should_deliver(outside, &event));
    }

    #[test]
    fn excluded_connection_is_skipped() {
        let rooms = RoomMembership::new();
        let origin = Uuid::new_v4();
        let other = Uuid::new_v4();
        rooms.join_room(origin, RoomId::Chat(10));
        rooms.join_room(other, RoomId::Chat(10));

        let event = chat_event(10, Some(origin));
        assert!(!rooms.should_deliver(origin, &event));
        assert!(rooms.should_deliver(other, &event));
    }

    #[test]
    fn direct_events_target_one_connection() {
        let rooms = RoomMembership::new();
        let conn = Uuid::new_v4();
        let event = ServerEvent {
            event_type: "error".to_string(),
            payload: serde_json::json!({"message": "nope"}),
            recipients: Recipients::Connection(conn),
            exclude: None,
        };
        assert!(rooms.should_deliver(conn, &event));
        assert!(!rooms.should_deliver(Uuid::new_v4(), &event));
    }

    #[test]
    fn leave_all_reports_chat_rooms_only() {
        let rooms = RoomMembership::new();
        let conn = Uuid::new_v4();
        rooms.join_room(conn, RoomId::User(5));
        rooms.join_room(conn, RoomId::Chat(10));
        rooms.join_room(conn, RoomId::Chat(11));

        let mut chats = rooms.leave_all(conn);
        chats.sort();
        assert_eq!(chats, vec![10, 11]);
        assert!(!rooms.is_member(conn, RoomId::Chat(10)));
        assert!(rooms.members(RoomId::Chat(10)).is_empty());
    }
}
