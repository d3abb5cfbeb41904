use crate::events::{EventBus, Recipients};
use crate::profiles::ProfileCache;
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::rooms::{RoomId, RoomMembership};
use crate::typing::TypingTracker;
use aura_db::DbPool;
use aura_models::socket::{EVENT_USER_OFFLINE, EVENT_USER_ONLINE, EVENT_USER_TYPING};
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

/// Drives the online/offline lifecycle of a connection: registry bookkeeping,
/// room setup, the persisted presence flag, and friend-facing presence
/// events. Database failures here degrade to warnings; a flaky presence
/// write must never take down a live socket.
pub struct PresenceCoordinator {
    db: DbPool,
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomMembership>,
    typing: Arc<TypingTracker>,
    bus: EventBus,
    profiles: ProfileCache,
}

impl PresenceCoordinator {
    pub fn new(
        db: DbPool,
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomMembership>,
        typing: Arc<TypingTracker>,
        bus: EventBus,
        profiles: ProfileCache,
    ) -> Self {
        Self {
            db,
            registry,
            rooms,
            typing,
            bus,
            profiles,
        }
    }

    /// Bring a freshly authenticated connection online: register it, mark
    /// the user online, join the personal room plus every chat the user
    /// participates in, and tell online friends.
    ///
    /// user_online goes out on every connect, not just the offline-to-online
    /// transition, so friends' clients can refresh a possibly stale entry.
    pub async fn connect(&self, connection_id: ConnectionId, user_id: i64) {
        let now = Utc::now();
        self.registry.register(user_id, connection_id);

        if let Err(err) = aura_db::users::set_presence(&self.db, user_id, true, now).await {
            warn!(user_id, error = %err, "failed to persist online presence");
        }
        self.profiles.invalidate(user_id).await;

        self.rooms.join_room(connection_id, RoomId::User(user_id));
        match aura_db::chats::chat_ids_for_user(&self.db, user_id).await {
            Ok(chat_ids) => {
                for chat_id in chat_ids {
                    self.rooms.join_room(connection_id, RoomId::Chat(chat_id));
                }
            }
            Err(err) => {
                warn!(user_id, error = %err, "failed to rebuild chat rooms on connect");
            }
        }

        let payload = match self.profiles.get(&self.db, user_id).await {
            Ok(profile) => serde_json::json!({
                "userId": profile.id,
                "name": profile.name,
                "avatar": profile.avatar,
            }),
            Err(err) => {
                warn!(user_id, error = %err, "failed to load profile for presence event");
                serde_json::json!({ "userId": user_id })
            }
        };
        self.notify_friends(user_id, EVENT_USER_ONLINE, payload).await;
    }

    /// Tear down a closed connection. Offline effects (presence flag,
    /// typing force-stop, user_offline) fire only when this was the user's
    /// last connection.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        self.rooms.leave_all(connection_id);
        let Some(closed) = self.registry.unregister(connection_id) else {
            return;
        };
        if !closed.last_connection {
            return;
        }

        let user_id = closed.user_id;
        let now = Utc::now();
        if let Err(err) = aura_db::users::set_presence(&self.db, user_id, false, now).await {
            warn!(user_id, error = %err, "failed to persist offline presence");
        }
        self.profiles.invalidate(user_id).await;

        // The user can no longer send typing_stop themselves.
        for chat_id in self.typing.clear_user(user_id) {
            self.bus.dispatch(
                EVENT_USER_TYPING,
                serde_json::json!({
                    "chatId": chat_id,
                    "userId": user_id,
                    "isTyping": false,
                }),
                Recipients::Chat(chat_id),
            );
        }

        self.notify_friends(
            user_id,
            EVENT_USER_OFFLINE,
            serde_json::json!({
                "userId": user_id,
                "lastSeen": now,
            }),
        )
        .await;
    }

    async fn notify_friends(&self, user_id: i64, event: &str, payload: serde_json::Value) {
        let friends = match aura_db::friendships::friend_ids(&self.db, user_id).await {
            Ok(friends) => friends,
            Err(err) => {
                warn!(user_id, error = %err, "failed to load friends for presence event");
                return;
            }
        };
        for friend_id in friends {
            if self.registry.is_online(friend_id) {
                self.bus
                    .dispatch(event, payload.clone(), Recipients::User(friend_id));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct Fixture {
        presence: PresenceCoordinator,
        pool: DbPool,
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomMembership>,
        typing: Arc<TypingTracker>,
        bus: EventBus,
    }

    async fn fixture() -> Fixture {
        let pool = aura_db::create_pool("sqlite::memory:", 1).await.unwrap();
        aura_db::run_migrations(&pool).await.unwrap();
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomMembership::new());
        let typing = Arc::new(TypingTracker::new());
        let bus = EventBus::default();
        let presence = PresenceCoordinator::new(
            pool.clone(),
            registry.clone(),
            rooms.clone(),
            typing.clone(),
            bus.clone(),
            ProfileCache::new(),
        );
        Fixture {
            presence,
            pool,
            registry,
            rooms,
            typing,
            bus,
        }
    }

    async fn seed_friends(pool: &DbPool) {
        let now = Utc::now();
        aura_db::users::create_user(pool, 1, "Ada", "ada@example.com", "hash", now)
            .await
            .unwrap();
        aura_db::users::create_user(pool, 2, "Brian", "brian@example.com", "hash", now)
            .await
            .unwrap();
        aura_db::friendships::add_friendship(pool, 1, 2, now).await.unwrap();
    }

    #[tokio::test]
    async fn connect_joins_personal_and_chat_rooms() {
        let fx = fixture().await;
        seed_friends(&fx.pool).await;
        let (chat, _) = aura_db::chats::find_or_create_private_chat(&fx.pool, 10, 1, 2, Utc::now())
            .await
            .unwrap();

        let conn = Uuid::new_v4();
        fx.presence.connect(conn, 1).await;

        assert!(fx.registry.is_online(1));
        assert!(fx.rooms.is_member(conn, RoomId::User(1)));
        assert!(fx.rooms.is_member(conn, RoomId::Chat(chat.id)));
        let row = aura_db::users::get_user_by_id(&fx.pool, 1).await.unwrap().unwrap();
        assert!(row.is_online);
    }

    #[tokio::test]
    async fn online_event_reaches_online_friends_on_every_connect() {
        let fx = fixture().await;
        seed_friends(&fx.pool).await;

        // Friend 2 is online and listening.
        fx.presence.connect(Uuid::new_v4(), 2).await;
        let mut rx = fx.bus.subscribe();

        fx.presence.connect(Uuid::new_v4(), 1).await;
        fx.presence.connect(Uuid::new_v4(), 1).await;

        let mut online_events = 0;
        while let Ok(event) = rx.try_recv() {
            if event.event_type == EVENT_USER_ONLINE
                && event.recipients == Recipients::User(2)
                && event.payload["userId"] == serde_json::json!(1)
            {
                online_events += 1;
            }
        }
        assert_eq!(online_events, 2);
    }

    #[tokio::test]
    async fn offline_fires_only_on_last_connection() {
        let fx = fixture().await;
        seed_friends(&fx.pool).await;
        fx.presence.connect(Uuid::new_v4(), 2).await;

        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        fx.presence.connect(first, 1).await;
        fx.presence.connect(second, 1).await;

        let mut rx = fx.bus.subscribe();
        fx.presence.disconnect(first).await;
        fx.presence.disconnect(second).await;

        let mut offline_events = 0;
        while let Ok(event) = rx.try_recv() {
            if event.event_type == EVENT_USER_OFFLINE && event.recipients == Recipients::User(2) {
                offline_events += 1;
            }
        }
        assert_eq!(offline_events, 1);
        let row = aura_db::users::get_user_by_id(&fx.pool, 1).await.unwrap().unwrap();
        assert!(!row.is_online);
    }

    #[tokio::test]
    async fn last_disconnect_force_stops_typing() {
        let fx = fixture().await;
        seed_friends(&fx.pool).await;
        let (chat, _) = aura_db::chats::find_or_create_private_chat(&fx.pool, 10, 1, 2, Utc::now())
            .await
            .unwrap();

        let conn = Uuid::new_v4();
        fx.presence.connect(conn, 1).await;
        fx.typing.set_typing(chat.id, 1, Utc::now());

        let mut rx = fx.bus.subscribe();
        fx.presence.disconnect(conn).await;

        let mut saw_stop = false;
        while let Ok(event) = rx.try_recv() {
            if event.event_type == EVENT_USER_TYPING
                && event.payload["isTyping"] == serde_json::json!(false)
            {
                saw_stop = true;
            }
        }
        assert!(saw_stop);
        assert!(fx.typing.typing_users(chat.id, Utc::now()).is_empty());
    }
}
