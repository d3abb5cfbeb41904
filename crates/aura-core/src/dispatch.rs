use crate::error::CoreError;
use crate::events::{EventBus, Recipients};
use crate::notify::Notifier;
use crate::profiles::ProfileCache;
use crate::registry::{ConnectionId, ConnectionRegistry};
use aura_db::messages::MessageRow;
use aura_db::DbPool;
use aura_models::message::{MessageContent, MessageType, MessageView};
use aura_models::socket::{
    EVENT_MESSAGES_READ, EVENT_MESSAGE_DELETED, EVENT_MESSAGE_EDITED, EVENT_MESSAGE_REACTION,
    EVENT_NEW_MESSAGE,
};
use aura_util::{snowflake, validation};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Messages stay editable for this long after creation.
const EDIT_WINDOW_SECS: i64 = 900;

/// A message can be edited only by its sender, only while it still exists,
/// and only within the edit window.
pub fn can_edit(row: &MessageRow, user_id: i64, now: DateTime<Utc>) -> bool {
    row.sender_id == user_id
        && !row.is_deleted
        && now - row.created_at < Duration::seconds(EDIT_WINDOW_SECS)
}

/// Deletion is sender-only and not repeatable; there is no time limit.
pub fn can_delete(row: &MessageRow, user_id: i64) -> bool {
    row.sender_id == user_id && !row.is_deleted
}

/// Validates, persists and fans out everything that happens to messages:
/// sending, reactions, read receipts, edits and deletes. Each operation
/// broadcasts to the chat room and leaves durable notifications to the
/// [`Notifier`] queue.
pub struct MessageDispatcher {
    db: DbPool,
    registry: Arc<ConnectionRegistry>,
    bus: EventBus,
    notifier: Notifier,
    profiles: ProfileCache,
    worker_id: u16,
}

impl MessageDispatcher {
    pub fn new(
        db: DbPool,
        registry: Arc<ConnectionRegistry>,
        bus: EventBus,
        notifier: Notifier,
        profiles: ProfileCache,
        worker_id: u16,
    ) -> Self {
        Self {
            db,
            registry,
            bus,
            notifier,
            profiles,
            worker_id,
        }
    }

    pub async fn send_message(
        &self,
        sender_id: i64,
        chat_id: i64,
        content: &MessageContent,
        message_type: MessageType,
        reply_to: Option<i64>,
    ) -> Result<MessageView, CoreError> {
        aura_db::chats::get_chat(&self.db, chat_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        if !aura_db::chats::is_participant(&self.db, chat_id, sender_id).await? {
            return Err(CoreError::AccessDenied);
        }
        self.validate_content(content, message_type).await?;
        if let Some(reply_id) = reply_to {
            let parent = aura_db::messages::get_message(&self.db, reply_id)
                .await?
                .ok_or_else(|| CoreError::InvalidContent("reply target not found".into()))?;
            if parent.chat_id != chat_id {
                return Err(CoreError::InvalidContent(
                    "reply target belongs to another chat".into(),
                ));
            }
        }

        let attachment_json = content
            .attachment
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        let now = Utc::now();
        let id = snowflake::generate(self.worker_id);
        let row = aura_db::messages::create_message(
            &self.db,
            id,
            chat_id,
            sender_id,
            message_type.as_str(),
            content.text.as_deref(),
            content.emotion,
            attachment_json.as_deref(),
            reply_to,
            now,
        )
        .await?;
        aura_db::chats::touch_last_message(&self.db, chat_id, id, now).await?;

        let view = aura_db::messages::resolve_message(&self.db, row).await?;
        self.bus.dispatch(
            EVENT_NEW_MESSAGE,
            serde_json::json!({
                "chatId": chat_id,
                "message": view,
            }),
            Recipients::Chat(chat_id),
        );

        self.queue_offline_notifications(&view, now).await;
        Ok(view)
    }

    pub async fn add_reaction(
        &self,
        user_id: i64,
        message_id: i64,
        emoji: &str,
    ) -> Result<(), CoreError> {
        validation::validate_emoji(emoji)?;
        let row = self.accessible_message(user_id, message_id).await?;
        let now = Utc::now();
        aura_db::reactions::upsert_reaction(&self.db, message_id, user_id, emoji, now).await?;
        self.broadcast_reactions(row.chat_id, message_id).await
    }

    pub async fn remove_reaction(&self, user_id: i64, message_id: i64) -> Result<(), CoreError> {
        let row = self.accessible_message(user_id, message_id).await?;
        aura_db::reactions::remove_reaction(&self.db, message_id, user_id).await?;
        self.broadcast_reactions(row.chat_id, message_id).await
    }

    /// Mark every message in a chat as read by this user. Idempotent; the
    /// originating connection is excluded from the fan-out because the
    /// caller already knows.
    pub async fn mark_read(
        &self,
        user_id: i64,
        origin: Option<ConnectionId>,
        chat_id: i64,
    ) -> Result<(), CoreError> {
        aura_db::chats::get_chat(&self.db, chat_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        if !aura_db::chats::is_participant(&self.db, chat_id, user_id).await? {
            return Err(CoreError::AccessDenied);
        }
        let now = Utc::now();
        aura_db::messages::mark_chat_read(&self.db, chat_id, user_id, now).await?;
        let payload = serde_json::json!({
            "chatId": chat_id,
            "userId": user_id,
            "readAt": now,
        });
        match origin {
            Some(conn) => self.bus.dispatch_excluding(
                EVENT_MESSAGES_READ,
                payload,
                Recipients::Chat(chat_id),
                conn,
            ),
            None => self
                .bus
                .dispatch(EVENT_MESSAGES_READ, payload, Recipients::Chat(chat_id)),
        }
        Ok(())
    }

    pub async fn edit_message(
        &self,
        user_id: i64,
        message_id: i64,
        new_text: &str,
    ) -> Result<MessageView, CoreError> {
        validation::validate_message_text(new_text)?;
        let row = aura_db::messages::get_message(&self.db, message_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        let now = Utc::now();
        if !can_edit(&row, user_id, now) {
            return Err(CoreError::Forbidden);
        }
        let chat_id = row.chat_id;
        let updated = aura_db::messages::edit_message_text(&self.db, message_id, new_text, now).await?;
        let view = aura_db::messages::resolve_message(&self.db, updated).await?;
        self.bus.dispatch(
            EVENT_MESSAGE_EDITED,
            serde_json::json!({
                "chatId": chat_id,
                "message": view,
            }),
            Recipients::Chat(chat_id),
        );
        Ok(view)
    }

    pub async fn delete_message(&self, user_id: i64, message_id: i64) -> Result<(), CoreError> {
        let row = aura_db::messages::get_message(&self.db, message_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        if !can_delete(&row, user_id) {
            return Err(CoreError::Forbidden);
        }
        let now = Utc::now();
        aura_db::messages::soft_delete_message(&self.db, message_id, user_id, now).await?;
        self.bus.dispatch(
            EVENT_MESSAGE_DELETED,
            serde_json::json!({
                "chatId": row.chat_id,
                "messageId": message_id,
                "deletedBy": user_id,
                "deletedAt": now,
            }),
            Recipients::Chat(row.chat_id),
        );
        Ok(())
    }

    async fn validate_content(
        &self,
        content: &MessageContent,
        message_type: MessageType,
    ) -> Result<(), CoreError> {
        match message_type {
            MessageType::Text => {
                let text = content
                    .text
                    .as_deref()
                    .ok_or_else(|| CoreError::InvalidContent("text is required".into()))?;
                validation::validate_message_text(text)?;
            }
            MessageType::Emotion => {
                let emotion_id = content
                    .emotion
                    .ok_or_else(|| CoreError::InvalidContent("emotion reference is required".into()))?;
                aura_db::emotions::get_emotion(&self.db, emotion_id)
                    .await?
                    .ok_or_else(|| CoreError::InvalidContent("unknown emotion".into()))?;
            }
            MessageType::Image | MessageType::Video | MessageType::Audio | MessageType::File => {
                if content.attachment.is_none() {
                    return Err(CoreError::InvalidContent("attachment is required".into()));
                }
            }
        }
        Ok(())
    }

    /// Message lookup gated on chat membership. Deleted messages are gone
    /// as far as reactions are concerned.
    async fn accessible_message(
        &self,
        user_id: i64,
        message_id: i64,
    ) -> Result<MessageRow, CoreError> {
        let row = aura_db::messages::get_message(&self.db, message_id)
            .await?
            .filter(|r| !r.is_deleted)
            .ok_or(CoreError::NotFound)?;
        if !aura_db::chats::is_participant(&self.db, row.chat_id, user_id).await? {
            return Err(CoreError::AccessDenied);
        }
        Ok(row)
    }

    async fn broadcast_reactions(&self, chat_id: i64, message_id: i64) -> Result<(), CoreError> {
        let reactions: Vec<_> = aura_db::reactions::reactions_for_message(&self.db, message_id)
            .await?
            .into_iter()
            .map(|r| r.into_view())
            .collect();
        let mut counts: HashMap<&str, u32> = HashMap::new();
        for reaction in &reactions {
            *counts.entry(reaction.emoji.as_str()).or_default() += 1;
        }
        self.bus.dispatch(
            EVENT_MESSAGE_REACTION,
            serde_json::json!({
                "chatId": chat_id,
                "messageId": message_id,
                "reactions": reactions,
                "reactionCounts": counts,
            }),
            Recipients::Chat(chat_id),
        );
        Ok(())
    }

    /// Queue durable notifications for every participant without a live
    /// connection. Failures never bubble into the send path.
    async fn queue_offline_notifications(&self, view: &MessageView, now: DateTime<Utc>) {
        let participants = match aura_db::chats::participant_ids(&self.db, view.chat_id).await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(chat_id = view.chat_id, error = %err, "failed to load participants for notifications");
                return;
            }
        };
        let sender = match self.profiles.brief(&self.db, view.sender.id).await {
            Ok(brief) => brief,
            Err(err) => {
                warn!(sender_id = view.sender.id, error = %err, "failed to load sender for notifications");
                return;
            }
        };
        for participant in participants {
            if participant == view.sender.id || self.registry.is_online(participant) {
                continue;
            }
            self.notifier.enqueue(self.notifier.message_notification(
                participant,
                &sender,
                view.chat_id,
                view.id,
                view.message_type,
                view.content.text.as_deref(),
                now,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionRegistry;
    use aura_db::messages::MessageRow;

    fn message_row(sender_id: i64, created_at: DateTime<Utc>, is_deleted: bool) -> MessageRow {
        MessageRow {
            id: 1,
            chat_id: 10,
            sender_id,
            message_type: "text".to_string(),
            text: Some("hello".to_string()),
            emotion_id: None,
            attachment: None,
            status: "sent".to_string(),
            reply_to_id: None,
            is_edited: false,
            edited_at: None,
            is_deleted,
            deleted_at: None,
            deleted_by: None,
            created_at,
        }
    }

    #[test]
    fn edit_window_boundaries() {
        let now = Utc::now();
        let fresh = message_row(1, now - Duration::seconds(899), false);
        let expired = message_row(1, now - Duration::seconds(901), false);
        assert!(can_edit(&fresh, 1, now));
        assert!(!can_edit(&expired, 1, now));
    }

    #[test]
    fn only_sender_may_edit_or_delete() {
        let now = Utc::now();
        let row = message_row(1, now, false);
        assert!(!can_edit(&row, 2, now));
        assert!(!can_delete(&row, 2));
        assert!(can_delete(&row, 1));
    }

    #[test]
    fn deleted_messages_are_immutable() {
        let now = Utc::now();
        let row = message_row(1, now, true);
        assert!(!can_edit(&row, 1, now));
        assert!(!can_delete(&row, 1));
    }

    async fn dispatcher_fixture() -> (MessageDispatcher, DbPool, EventBus) {
        let pool = aura_db::create_pool("sqlite::memory:", 1).await.unwrap();
        aura_db::run_migrations(&pool).await.unwrap();
        let bus = EventBus::default();
        let dispatcher = MessageDispatcher::new(
            pool.clone(),
            Arc::new(ConnectionRegistry::new()),
            bus.clone(),
            Notifier::spawn(pool.clone(), 0),
            ProfileCache::new(),
            0,
        );
        (dispatcher, pool, bus)
    }

    async fn seed_chat(pool: &DbPool) -> i64 {
        let now = Utc::now();
        aura_db::users::create_user(pool, 1, "Ada", "ada@example.com", "hash", now)
            .await
            .unwrap();
        aura_db::users::create_user(pool, 2, "Brian", "brian@example.com", "hash", now)
            .await
            .unwrap();
        aura_db::users::create_user(pool, 3, "Carol", "carol@example.com", "hash", now)
            .await
            .unwrap();
        let (chat, _) = aura_db::chats::find_or_create_private_chat(pool, 10, 1, 2, now)
            .await
            .unwrap();
        chat.id
    }

    fn text_content(text: &str) -> MessageContent {
        MessageContent {
            text: Some(text.to_string()),
            emotion: None,
            attachment: None,
        }
    }

    #[tokio::test]
    async fn send_message_broadcasts_and_touches_chat() {
        let (dispatcher, pool, bus) = dispatcher_fixture().await;
        let chat_id = seed_chat(&pool).await;
        let mut rx = bus.subscribe();

        let view = dispatcher
            .send_message(1, chat_id, &text_content("hello"), MessageType::Text, None)
            .await
            .unwrap();
        assert_eq!(view.content.text.as_deref(), Some("hello"));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type, EVENT_NEW_MESSAGE);
        assert_eq!(event.recipients, Recipients::Chat(chat_id));

        let chat = aura_db::chats::get_chat(&pool, chat_id).await.unwrap().unwrap();
        assert_eq!(chat.last_message_id, Some(view.id));
    }

    #[tokio::test]
    async fn non_participant_cannot_send() {
        let (dispatcher, pool, _) = dispatcher_fixture().await;
        let chat_id = seed_chat(&pool).await;
        let err = dispatcher
            .send_message(3, chat_id, &text_content("hi"), MessageType::Text, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AccessDenied));
    }

    #[tokio::test]
    async fn whitespace_only_text_is_rejected() {
        let (dispatcher, pool, bus) = dispatcher_fixture().await;
        let chat_id = seed_chat(&pool).await;
        let mut rx = bus.subscribe();
        let err = dispatcher
            .send_message(1, chat_id, &text_content("   "), MessageType::Text, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidContent(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_missing_chat_is_not_found() {
        let (dispatcher, pool, _) = dispatcher_fixture().await;
        seed_chat(&pool).await;
        let err = dispatcher
            .send_message(1, 999, &text_content("hi"), MessageType::Text, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound));
    }

    #[tokio::test]
    async fn second_reaction_replaces_first() {
        let (dispatcher, pool, _) = dispatcher_fixture().await;
        let chat_id = seed_chat(&pool).await;
        let view = dispatcher
            .send_message(1, chat_id, &text_content("hello"), MessageType::Text, None)
            .await
            .unwrap();

        dispatcher.add_reaction(2, view.id, "👍").await.unwrap();
        dispatcher.add_reaction(2, view.id, "❤️").await.unwrap();

        let reactions = aura_db::reactions::reactions_for_message(&pool, view.id)
            .await
            .unwrap();
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].emoji, "❤️");
    }

    #[tokio::test]
    async fn edit_by_non_sender_is_forbidden() {
        let (dispatcher, pool, _) = dispatcher_fixture().await;
        let chat_id = seed_chat(&pool).await;
        let view = dispatcher
            .send_message(1, chat_id, &text_content("hello"), MessageType::Text, None)
            .await
            .unwrap();
        let err = dispatcher.edit_message(2, view.id, "hacked").await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden));
    }

    #[tokio::test]
    async fn delete_is_not_repeatable() {
        let (dispatcher, pool, _) = dispatcher_fixture().await;
        let chat_id = seed_chat(&pool).await;
        let view = dispatcher
            .send_message(1, chat_id, &text_content("hello"), MessageType::Text, None)
            .await
            .unwrap();

        dispatcher.delete_message(1, view.id).await.unwrap();
        let err = dispatcher.delete_message(1, view.id).await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden));

        let row = aura_db::messages::get_message(&pool, view.id).await.unwrap().unwrap();
        assert!(row.is_deleted);
    }

    #[tokio::test]
    async fn mark_read_excludes_origin_connection() {
        let (dispatcher, pool, bus) = dispatcher_fixture().await;
        let chat_id = seed_chat(&pool).await;
        dispatcher
            .send_message(1, chat_id, &text_content("hello"), MessageType::Text, None)
            .await
            .unwrap();

        let origin = uuid::Uuid::new_v4();
        let mut rx = bus.subscribe();
        dispatcher.mark_read(2, Some(origin), chat_id).await.unwrap();

        let event = loop {
            let event = rx.try_recv().unwrap();
            if event.event_type == EVENT_MESSAGES_READ {
                break event;
            }
        };
        assert_eq!(event.exclude, Some(origin));
        assert_eq!(event.payload["userId"], serde_json::json!(2));
    }
}
