use crate::events::{EventBus, Recipients};
use crate::registry::ConnectionId;
use aura_db::DbPool;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::HashMap;

/// Typing indicators older than this are considered abandoned and pruned
/// the next time the chat's typing set is read.
const STALE_AFTER_SECS: i64 = 300;

/// Per-chat map of who is typing and when they last signalled it. Purely
/// in-memory; indicators never touch the database.
#[derive(Default)]
pub struct TypingTracker {
    chats: DashMap<i64, HashMap<i64, DateTime<Utc>>>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_typing(&self, chat_id: i64, user_id: i64, at: DateTime<Utc>) {
        self.chats.entry(chat_id).or_default().insert(user_id, at);
    }

    /// Returns true if the user actually had an active indicator.
    pub fn clear_typing(&self, chat_id: i64, user_id: i64) -> bool {
        let mut cleared = false;
        if let Some(mut users) = self.chats.get_mut(&chat_id) {
            cleared = users.remove(&user_id).is_some();
        }
        self.chats.remove_if(&chat_id, |_, users| users.is_empty());
        cleared
    }

    /// Active typers in a chat, pruning stale entries as a side effect.
    pub fn typing_users(&self, chat_id: i64, now: DateTime<Utc>) -> Vec<i64> {
        let cutoff = now - Duration::seconds(STALE_AFTER_SECS);
        let mut active = Vec::new();
        if let Some(mut users) = self.chats.get_mut(&chat_id) {
            users.retain(|_, at| *at > cutoff);
            active = users.keys().copied().collect();
        }
        self.chats.remove_if(&chat_id, |_, users| users.is_empty());
        active
    }

    /// Drop every indicator a user holds. Returns the chats they were
    /// typing in, so a disconnect can broadcast the stop on their behalf.
    pub fn clear_user(&self, user_id: i64) -> Vec<i64> {
        let mut chat_ids = Vec::new();
        for mut entry in self.chats.iter_mut() {
            if entry.value_mut().remove(&user_id).is_some() {
                chat_ids.push(*entry.key());
            }
        }
        self.chats.retain(|_, users| !users.is_empty());
        chat_ids
    }

    /// Handle a typing_start/typing_stop signal from a connection. Signals
    /// for chats the user is not in are dropped without an error.
    pub async fn signal(
        &self,
        pool: &DbPool,
        bus: &EventBus,
        connection_id: ConnectionId,
        user_id: i64,
        chat_id: i64,
        is_typing: bool,
        now: DateTime<Utc>,
    ) -> Result<(), crate::error::CoreError> {
        if !aura_db::chats::is_participant(pool, chat_id, user_id).await? {
            return Ok(());
        }
        if is_typing {
            self.set_typing(chat_id, user_id, now);
        } else if !self.clear_typing(chat_id, user_id) {
            // Nothing to stop; don't echo a stop nobody saw a start for.
            return Ok(());
        }
        bus.dispatch_excluding(
            aura_models::socket::EVENT_USER_TYPING,
            serde_json::json!({
                "chatId": chat_id,
                "userId": user_id,
                "isTyping": is_typing,
            }),
            Recipients::Chat(chat_id),
            connection_id,
        );
        Ok(())
    }
}
