use aura_db::notifications::NewNotification;
use aura_db::DbPool;
use aura_models::message::MessageType;
use aura_models::notification::{NotificationCategory, NotificationPriority, NotificationType};
use aura_models::user::UserBrief;
use aura_util::snowflake;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use tracing::warn;

const PREVIEW_CHARS: usize = 50;
const TITLE_CHARS: usize = 100;
const BODY_CHARS: usize = 500;
const EXPIRY_DAYS: i64 = 30;

/// Fire-and-forget persistence of notifications. Producers enqueue and move
/// on; a single worker task writes rows and logs failures without ever
/// propagating them back to the producing operation.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<NewNotification>,
    worker_id: u16,
}

impl Notifier {
    pub fn spawn(pool: DbPool, worker_id: u16) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<NewNotification>();
        tokio::spawn(async move {
            while let Some(new) = rx.recv().await {
                if let Err(err) = aura_db::notifications::create_notification(&pool, &new).await {
                    warn!(recipient_id = new.recipient_id, error = %err, "failed to persist notification");
                }
            }
        });
        Self { tx, worker_id }
    }

    pub fn enqueue(&self, new: NewNotification) {
        // Receiver only drops at shutdown; losing queued rows then is fine.
        let _ = self.tx.send(new);
    }

    pub fn message_notification(
        &self,
        recipient_id: i64,
        sender: &UserBrief,
        chat_id: i64,
        message_id: i64,
        message_type: MessageType,
        text: Option<&str>,
        now: DateTime<Utc>,
    ) -> NewNotification {
        NewNotification {
            id: snowflake::generate(self.worker_id),
            recipient_id,
            sender_id: Some(sender.id),
            notification_type: NotificationType::Message.as_str().to_string(),
            title: truncate(&format!("New message from {}", sender.name), TITLE_CHARS),
            body: truncate(&message_preview(message_type, text), BODY_CHARS),
            chat_id: Some(chat_id),
            message_id: Some(message_id),
            emotion_id: None,
            action_url: Some(format!("/chat/{chat_id}")),
            priority: NotificationPriority::High.as_str().to_string(),
            category: NotificationCategory::Social.as_str().to_string(),
            created_at: now,
            expires_at: now + Duration::days(EXPIRY_DAYS),
        }
    }

    pub fn friend_request_notification(
        &self,
        recipient_id: i64,
        sender: &UserBrief,
        now: DateTime<Utc>,
    ) -> NewNotification {
        NewNotification {
            id: snowflake::generate(self.worker_id),
            recipient_id,
            sender_id: Some(sender.id),
            notification_type: NotificationType::FriendRequest.as_str().to_string(),
            title: "New friend request".to_string(),
            body: truncate(&format!("{} sent you a friend request", sender.name), BODY_CHARS),
            chat_id: None,
            message_id: None,
            emotion_id: None,
            action_url: Some("/friends/requests".to_string()),
            priority: NotificationPriority::Medium.as_str().to_string(),
            category: NotificationCategory::Social.as_str().to_string(),
            created_at: now,
            expires_at: now + Duration::days(EXPIRY_DAYS),
        }
    }

    pub fn friend_request_accepted_notification(
        &self,
        recipient_id: i64,
        accepter: &UserBrief,
        now: DateTime<Utc>,
    ) -> NewNotification {
        NewNotification {
            id: snowflake::generate(self.worker_id),
            recipient_id,
            sender_id: Some(accepter.id),
            notification_type: NotificationType::FriendRequestAccepted.as_str().to_string(),
            title: "Friend request accepted".to_string(),
            body: truncate(&format!("{} accepted your friend request", accepter.name), BODY_CHARS),
            chat_id: None,
            message_id: None,
            emotion_id: None,
            action_url: Some("/friends".to_string()),
            priority: NotificationPriority::Medium.as_str().to_string(),
            category: NotificationCategory::Social.as_str().to_string(),
            created_at: now,
            expires_at: now + Duration::days(EXPIRY_DAYS),
        }
    }

    pub fn emotion_notification(
        &self,
        recipient_id: i64,
        sender: &UserBrief,
        emotion_id: i64,
        now: DateTime<Utc>,
    ) -> NewNotification {
        NewNotification {
            id: snowflake::generate(self.worker_id),
            recipient_id,
            sender_id: Some(sender.id),
            notification_type: NotificationType::EmotionShared.as_str().to_string(),
            title: "Emotion shared".to_string(),
            body: truncate(&format!("{} shared an emotion with you", sender.name), BODY_CHARS),
            chat_id: None,
            message_id: None,
            emotion_id: Some(emotion_id),
            action_url: None,
            priority: NotificationPriority::Medium.as_str().to_string(),
            category: NotificationCategory::Social.as_str().to_string(),
            created_at: now,
            expires_at: now + Duration::days(EXPIRY_DAYS),
        }
    }
}

/// Short body text for a message notification: a 50-character excerpt for
/// text messages, a type phrase otherwise.
pub fn message_preview(message_type: MessageType, text: Option<&str>) -> String {
    match message_type {
        MessageType::Text => {
            let text = text.unwrap_or_default();
            if text.chars().count() > PREVIEW_CHARS {
                let cut: String = text.chars().take(PREVIEW_CHARS).collect();
                format!("{cut}...")
            } else {
                text.to_string()
            }
        }
        MessageType::Emotion => "sent an emotion".to_string(),
        other => format!("sent {}", other.as_str()),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
