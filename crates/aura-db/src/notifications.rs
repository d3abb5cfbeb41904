use crate::{bool_from_any_row, datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use aura_models::notification::{
    NotificationCategory, NotificationPriority, NotificationType, NotificationView,
};
use aura_models::user::UserBrief;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: i64,
    pub recipient_id: i64,
    pub sender_id: Option<i64>,
    pub notification_type: String,
    pub title: String,
    pub body: String,
    pub chat_id: Option<i64>,
    pub message_id: Option<i64>,
    pub emotion_id: Option<i64>,
    pub action_url: Option<String>,
    pub priority: String,
    pub category: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for NotificationRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let read_at_raw: Option<String> = row.try_get("read_at")?;
        let created_at_raw: String = row.try_get("created_at")?;
        let expires_at_raw: String = row.try_get("expires_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            recipient_id: row.try_get("recipient_id")?,
            sender_id: row.try_get("sender_id")?,
            notification_type: row.try_get("notification_type")?,
            title: row.try_get("title")?,
            body: row.try_get("body")?,
            chat_id: row.try_get("chat_id")?,
            message_id: row.try_get("message_id")?,
            emotion_id: row.try_get("emotion_id")?,
            action_url: row.try_get("action_url")?,
            priority: row.try_get("priority")?,
            category: row.try_get("category")?,
            is_read: bool_from_any_row(row, "is_read")?,
            read_at: read_at_raw
                .as_deref()
                .map(datetime_from_db_text)
                .transpose()?,
            is_deleted: bool_from_any_row(row, "is_deleted")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
            expires_at: datetime_from_db_text(&expires_at_raw)?,
        })
    }
}

impl NotificationRow {
    /// Row text that fails to parse as a known enum value falls back to a
    /// neutral default instead of dropping the notification.
    pub fn into_view(self, sender: Option<UserBrief>) -> NotificationView {
        NotificationView {
            id: self.id,
            notification_type: NotificationType::from_str(&self.notification_type)
                .unwrap_or(NotificationType::System),
            sender,
            title: self.title,
            body: self.body,
            chat_id: self.chat_id,
            message_id: self.message_id,
            emotion_id: self.emotion_id,
            action_url: self.action_url,
            priority: NotificationPriority::from_str(&self.priority)
                .unwrap_or(NotificationPriority::Medium),
            category: NotificationCategory::from_str(&self.category)
                .unwrap_or(NotificationCategory::System),
            is_read: self.is_read,
            read_at: self.read_at,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// Insert parameters. Built by the notification factories in aura-core.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub id: i64,
    pub recipient_id: i64,
    pub sender_id: Option<i64>,
    pub notification_type: String,
    pub title: String,
    pub body: String,
    pub chat_id: Option<i64>,
    pub message_id: Option<i64>,
    pub emotion_id: Option<i64>,
    pub action_url: Option<String>,
    pub priority: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, sender_id, notification_type, title, body, chat_id, message_id, \
     emotion_id, action_url, priority, category, is_read, read_at, is_deleted, created_at, \
     expires_at";

pub async fn create_notification(
    pool: &DbPool,
    new: &NewNotification,
) -> Result<NotificationRow, DbError> {
    let row = sqlx::query_as::<_, NotificationRow>(&format!(
        "INSERT INTO notifications (id, recipient_id, sender_id, notification_type, title, body,
                                    chat_id, message_id, emotion_id, action_url, priority,
                                    category, created_at, expires_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
         RETURNING {NOTIFICATION_COLUMNS}"
    ))
    .bind(new.id)
    .bind(new.recipient_id)
    .bind(new.sender_id)
    .bind(new.notification_type.as_str())
    .bind(new.title.as_str())
    .bind(new.body.as_str())
    .bind(new.chat_id)
    .bind(new.message_id)
    .bind(new.emotion_id)
    .bind(new.action_url.as_deref())
    .bind(new.priority.as_str())
    .bind(new.category.as_str())
    .bind(datetime_to_db_text(new.created_at))
    .bind(datetime_to_db_text(new.expires_at))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_notification(
    pool: &DbPool,
    id: i64,
) -> Result<Option<NotificationRow>, DbError> {
    let row = sqlx::query_as::<_, NotificationRow>(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1 AND is_deleted = 0"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Newest first. Expired and soft-deleted rows never show up.
pub async fn list_notifications(
    pool: &DbPool,
    recipient_id: i64,
    unread_only: bool,
    limit: i64,
    offset: i64,
    now: DateTime<Utc>,
) -> Result<Vec<NotificationRow>, DbError> {
    let read_filter = if unread_only { " AND is_read = 0" } else { "" };
    let query = format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications
         WHERE recipient_id = $1 AND is_deleted = 0 AND expires_at > $2{read_filter}
         ORDER BY created_at DESC, id DESC
         LIMIT $3 OFFSET $4"
    );
    let rows = sqlx::query_as::<_, NotificationRow>(&query)
        .bind(recipient_id)
        .bind(datetime_to_db_text(now))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn count_notifications(
    pool: &DbPool,
    recipient_id: i64,
    unread_only: bool,
    now: DateTime<Utc>,
) -> Result<i64, DbError> {
    let read_filter = if unread_only { " AND is_read = 0" } else { "" };
    let query = format!(
        "SELECT COUNT(*) FROM notifications
         WHERE recipient_id = $1 AND is_deleted = 0 AND expires_at > $2{read_filter}"
    );
    let count: i64 = sqlx::query_scalar(&query)
        .bind(recipient_id)
        .bind(datetime_to_db_text(now))
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn unread_notification_count(
    pool: &DbPool,
    recipient_id: i64,
    now: DateTime<Utc>,
) -> Result<i64, DbError> {
    count_notifications(pool, recipient_id, true, now).await
}

pub async fn set_notification_read(
    pool: &DbPool,
    id: i64,
    is_read: bool,
    now: DateTime<Utc>,
) -> Result<NotificationRow, DbError> {
    let read_at = is_read.then(|| datetime_to_db_text(now));
    let row = sqlx::query_as::<_, NotificationRow>(&format!(
        "UPDATE notifications SET is_read = $2, read_at = $3
         WHERE id = $1 AND is_deleted = 0
         RETURNING {NOTIFICATION_COLUMNS}"
    ))
    .bind(id)
    .bind(if is_read { 1_i32 } else { 0_i32 })
    .bind(read_at)
    .fetch_optional(pool)
    .await?;
    row.ok_or(DbError::NotFound)
}

pub async fn mark_all_notifications_read(
    pool: &DbPool,
    recipient_id: i64,
    now: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE notifications SET is_read = 1, read_at = $2
         WHERE recipient_id = $1 AND is_read = 0 AND is_deleted = 0",
    )
    .bind(recipient_id)
    .bind(datetime_to_db_text(now))
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn soft_delete_notification(pool: &DbPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE notifications SET is_deleted = 1 WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> DbPool {
        let pool = crate::create_pool("sqlite::memory:", 1).await.unwrap();
        crate::run_migrations(&pool).await.unwrap();
        pool
    }

    fn sample(id: i64, recipient_id: i64, now: DateTime<Utc>) -> NewNotification {
        NewNotification {
            id,
            recipient_id,
            sender_id: Some(1),
            notification_type: "message".to_string(),
            title: "New Message".to_string(),
            body: "Ada: hello".to_string(),
            chat_id: Some(100),
            message_id: Some(1000),
            emotion_id: None,
            action_url: Some("/chat/100".to_string()),
            priority: "high".to_string(),
            category: "social".to_string(),
            created_at: now,
            expires_at: now + chrono::Duration::days(30),
        }
    }

    async fn seed_users(pool: &DbPool) {
        let now = Utc::now();
        crate::users::create_user(pool, 1, "Ada", "ada@example.com", "h", now)
            .await
            .unwrap();
        crate::users::create_user(pool, 2, "Grace", "grace@example.com", "h", now)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_list_and_count() {
        let pool = test_pool().await;
        seed_users(&pool).await;
        let now = Utc::now();

        create_notification(&pool, &sample(10, 2, now)).await.unwrap();
        create_notification(&pool, &sample(11, 2, now + chrono::Duration::seconds(1)))
            .await
            .unwrap();
        // Someone else's notification stays out of user 2's list.
        create_notification(&pool, &sample(12, 1, now)).await.unwrap();

        let listed = list_notifications(&pool, 2, false, 20, 0, now).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, 11);

        assert_eq!(count_notifications(&pool, 2, false, now).await.unwrap(), 2);
        assert_eq!(unread_notification_count(&pool, 2, now).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_expired_notifications_hidden() {
        let pool = test_pool().await;
        seed_users(&pool).await;
        let now = Utc::now();

        let mut stale = sample(10, 2, now - chrono::Duration::days(40));
        stale.expires_at = now - chrono::Duration::days(10);
        create_notification(&pool, &stale).await.unwrap();

        assert!(list_notifications(&pool, 2, false, 20, 0, now)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(unread_notification_count(&pool, 2, now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_read_round_trip() {
        let pool = test_pool().await;
        seed_users(&pool).await;
        let now = Utc::now();
        create_notification(&pool, &sample(10, 2, now)).await.unwrap();

        let read = set_notification_read(&pool, 10, true, now).await.unwrap();
        assert!(read.is_read);
        assert!(read.read_at.is_some());

        let unread = set_notification_read(&pool, 10, false, now).await.unwrap();
        assert!(!unread.is_read);
        assert!(unread.read_at.is_none());

        let listed = list_notifications(&pool, 2, true, 20, 0, now).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_mark_all_read() {
        let pool = test_pool().await;
        seed_users(&pool).await;
        let now = Utc::now();
        for id in 10..13 {
            create_notification(&pool, &sample(id, 2, now)).await.unwrap();
        }

        assert_eq!(mark_all_notifications_read(&pool, 2, now).await.unwrap(), 3);
        assert_eq!(unread_notification_count(&pool, 2, now).await.unwrap(), 0);
        // Nothing left to mark.
        assert_eq!(mark_all_notifications_read(&pool, 2, now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_from_queries() {
        let pool = test_pool().await;
        seed_users(&pool).await;
        let now = Utc::now();
        create_notification(&pool, &sample(10, 2, now)).await.unwrap();

        soft_delete_notification(&pool, 10).await.unwrap();
        assert!(get_notification(&pool, 10).await.unwrap().is_none());
        assert!(list_notifications(&pool, 2, false, 20, 0, now)
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            soft_delete_notification(&pool, 99).await,
            Err(DbError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_pagination_offset() {
        let pool = test_pool().await;
        seed_users(&pool).await;
        let now = Utc::now();
        for id in 0..5 {
            create_notification(&pool, &sample(10 + id, 2, now + chrono::Duration::seconds(id)))
                .await
                .unwrap();
        }

        let first = list_notifications(&pool, 2, false, 2, 0, now).await.unwrap();
        let second = list_notifications(&pool, 2, false, 2, 2, now).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert!(first[1].id != second[0].id);
        assert_eq!(first[0].id, 14);
        assert_eq!(second[0].id, 12);
    }
}
