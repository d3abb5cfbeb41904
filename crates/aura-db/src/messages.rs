use std::collections::HashMap;

use crate::{bool_from_any_row, datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use aura_models::message::{
    MessageStatus, MessageType, MessageView, ReadReceipt, ReplyPreview, ResolvedContent,
};
use aura_models::user::UserBrief;
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub message_type: String,
    pub text: Option<String>,
    pub emotion_id: Option<i64>,
    pub attachment: Option<String>,
    pub status: String,
    pub reply_to_id: Option<i64>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for MessageRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let edited_at_raw: Option<String> = row.try_get("edited_at")?;
        let deleted_at_raw: Option<String> = row.try_get("deleted_at")?;
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            chat_id: row.try_get("chat_id")?,
            sender_id: row.try_get("sender_id")?,
            message_type: row.try_get("message_type")?,
            text: row.try_get("text")?,
            emotion_id: row.try_get("emotion_id")?,
            attachment: row.try_get("attachment")?,
            status: row.try_get("status")?,
            reply_to_id: row.try_get("reply_to_id")?,
            is_edited: bool_from_any_row(row, "is_edited")?,
            edited_at: edited_at_raw
                .as_deref()
                .map(datetime_from_db_text)
                .transpose()?,
            is_deleted: bool_from_any_row(row, "is_deleted")?,
            deleted_at: deleted_at_raw
                .as_deref()
                .map(datetime_from_db_text)
                .transpose()?,
            deleted_by: row.try_get("deleted_by")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReadRow {
    pub message_id: i64,
    pub user_id: i64,
    pub read_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for ReadRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let read_at_raw: String = row.try_get("read_at")?;
        Ok(Self {
            message_id: row.try_get("message_id")?,
            user_id: row.try_get("user_id")?,
            read_at: datetime_from_db_text(&read_at_raw)?,
        })
    }
}

const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, message_type, text, emotion_id, attachment, \
     status, reply_to_id, is_edited, edited_at, is_deleted, deleted_at, deleted_by, created_at";

#[allow(clippy::too_many_arguments)]
pub async fn create_message(
    pool: &DbPool,
    id: i64,
    chat_id: i64,
    sender_id: i64,
    message_type: &str,
    text: Option<&str>,
    emotion_id: Option<i64>,
    attachment_json: Option<&str>,
    reply_to_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<MessageRow, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "INSERT INTO messages (id, chat_id, sender_id, message_type, text, emotion_id, attachment, reply_to_id, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING {MESSAGE_COLUMNS}"
    ))
    .bind(id)
    .bind(chat_id)
    .bind(sender_id)
    .bind(message_type)
    .bind(text)
    .bind(emotion_id)
    .bind(attachment_json)
    .bind(reply_to_id)
    .bind(datetime_to_db_text(now))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_message(pool: &DbPool, id: i64) -> Result<Option<MessageRow>, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn messages_by_ids(pool: &DbPool, ids: &[i64]) -> Result<Vec<MessageRow>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("${i}")).collect();
    let query = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id IN ({})",
        placeholders.join(", ")
    );
    let mut q = sqlx::query_as::<_, MessageRow>(&query);
    for id in ids {
        q = q.bind(*id);
    }
    Ok(q.fetch_all(pool).await?)
}

/// Window of messages for a chat, newest first. `before` excludes the
/// anchor message itself. Soft-deleted rows are included so history can
/// render tombstones.
pub async fn chat_messages(
    pool: &DbPool,
    chat_id: i64,
    before: Option<i64>,
    limit: i64,
) -> Result<Vec<MessageRow>, DbError> {
    let rows = match before {
        Some(anchor) => {
            sqlx::query_as::<_, MessageRow>(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE chat_id = $1 AND id < $2
                 ORDER BY id DESC LIMIT $3"
            ))
            .bind(chat_id)
            .bind(anchor)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, MessageRow>(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE chat_id = $1
                 ORDER BY id DESC LIMIT $2"
            ))
            .bind(chat_id)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}

pub async fn edit_message_text(
    pool: &DbPool,
    id: i64,
    text: &str,
    now: DateTime<Utc>,
) -> Result<MessageRow, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "UPDATE messages SET text = $2, is_edited = 1, edited_at = $3
         WHERE id = $1
         RETURNING {MESSAGE_COLUMNS}"
    ))
    .bind(id)
    .bind(text)
    .bind(datetime_to_db_text(now))
    .fetch_optional(pool)
    .await?;
    row.ok_or(DbError::NotFound)
}

/// Soft delete. The row survives so history and replies keep their anchor;
/// content suppression happens at resolve time.
pub async fn soft_delete_message(
    pool: &DbPool,
    id: i64,
    deleted_by: i64,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE messages SET is_deleted = 1, deleted_at = $3, deleted_by = $2 WHERE id = $1",
    )
    .bind(id)
    .bind(deleted_by)
    .bind(datetime_to_db_text(now))
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Receipts every unread message in the chat for `reader_id` and promotes
/// their status to read. Idempotent: a second call finds nothing to insert
/// and returns 0. The reader's own messages are never receipted.
pub async fn mark_chat_read(
    pool: &DbPool,
    chat_id: i64,
    reader_id: i64,
    now: DateTime<Utc>,
) -> Result<u64, DbError> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        "INSERT INTO message_reads (message_id, user_id, read_at)
         SELECT m.id, $2, $3 FROM messages m
         WHERE m.chat_id = $1 AND m.sender_id <> $2 AND m.is_deleted = 0
           AND NOT EXISTS (
               SELECT 1 FROM message_reads r
               WHERE r.message_id = m.id AND r.user_id = $2
           )",
    )
    .bind(chat_id)
    .bind(reader_id)
    .bind(datetime_to_db_text(now))
    .execute(&mut *tx)
    .await?
    .rows_affected();

    sqlx::query(
        "UPDATE messages SET status = 'read'
         WHERE chat_id = $1 AND sender_id <> $2 AND is_deleted = 0 AND status <> 'read'",
    )
    .bind(chat_id)
    .bind(reader_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(inserted)
}

pub async fn reads_for_messages(
    pool: &DbPool,
    message_ids: &[i64],
) -> Result<Vec<ReadRow>, DbError> {
    if message_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("${i}")).collect();
    let query = format!(
        "SELECT message_id, user_id, read_at FROM message_reads
         WHERE message_id IN ({})
         ORDER BY read_at, user_id",
        placeholders.join(", ")
    );
    let mut q = sqlx::query_as::<_, ReadRow>(&query);
    for id in message_ids {
        q = q.bind(*id);
    }
    Ok(q.fetch_all(pool).await?)
}

pub async fn unread_count(pool: &DbPool, chat_id: i64, user_id: i64) -> Result<i64, DbError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM messages m
         WHERE m.chat_id = $1 AND m.sender_id <> $2 AND m.is_deleted = 0
           AND NOT EXISTS (
               SELECT 1 FROM message_reads r
               WHERE r.message_id = m.id AND r.user_id = $2
           )",
    )
    .bind(chat_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Expands rows into wire-ready views: sender briefs, emotion references,
/// reply previews, reactions and read receipts, all fetched in batches.
/// Preserves input order. Soft-deleted rows come back with empty content.
pub async fn resolve_messages(
    pool: &DbPool,
    rows: Vec<MessageRow>,
) -> Result<Vec<MessageView>, DbError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let message_ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let reply_ids: Vec<i64> = rows.iter().filter_map(|r| r.reply_to_id).collect();
    let emotion_ids: Vec<i64> = rows
        .iter()
        .filter(|r| !r.is_deleted)
        .filter_map(|r| r.emotion_id)
        .collect();

    let reply_rows = messages_by_ids(pool, &reply_ids).await?;

    let mut user_ids: Vec<i64> = rows.iter().map(|r| r.sender_id).collect();
    user_ids.extend(reply_rows.iter().map(|r| r.sender_id));
    user_ids.sort_unstable();
    user_ids.dedup();

    let users: HashMap<i64, UserBrief> = crate::users::get_users_by_ids(pool, &user_ids)
        .await?
        .iter()
        .map(|u| (u.id, u.brief()))
        .collect();

    let mut reactions: HashMap<i64, Vec<_>> = HashMap::new();
    for reaction in crate::reactions::reactions_for_messages(pool, &message_ids).await? {
        reactions
            .entry(reaction.message_id)
            .or_default()
            .push(reaction.into_view());
    }

    let mut reads: HashMap<i64, Vec<ReadReceipt>> = HashMap::new();
    for read in reads_for_messages(pool, &message_ids).await? {
        reads.entry(read.message_id).or_default().push(ReadReceipt {
            user_id: read.user_id,
            read_at: read.read_at,
        });
    }

    let emotions: HashMap<i64, _> = crate::emotions::emotions_by_ids(pool, &emotion_ids)
        .await?
        .into_iter()
        .map(|e| (e.id, e.into_view()))
        .collect();

    let replies: HashMap<i64, MessageRow> =
        reply_rows.into_iter().map(|r| (r.id, r)).collect();

    let brief_for = |user_id: i64| {
        users.get(&user_id).cloned().unwrap_or(UserBrief {
            id: user_id,
            name: "unknown".to_string(),
            avatar: None,
        })
    };

    let views = rows
        .into_iter()
        .map(|row| {
            let content = if row.is_deleted {
                ResolvedContent::default()
            } else {
                ResolvedContent {
                    text: row.text.clone(),
                    emotion: row.emotion_id.and_then(|id| emotions.get(&id).cloned()),
                    attachment: row
                        .attachment
                        .as_deref()
                        .and_then(|raw| serde_json::from_str(raw).ok()),
                }
            };

            let reply_to = row.reply_to_id.and_then(|id| replies.get(&id)).map(|target| {
                Box::new(ReplyPreview {
                    id: target.id,
                    sender: brief_for(target.sender_id),
                    text: if target.is_deleted {
                        None
                    } else {
                        target.text.clone()
                    },
                    message_type: target.message_type.parse().unwrap_or(MessageType::Text),
                })
            });

            MessageView {
                id: row.id,
                chat_id: row.chat_id,
                sender: brief_for(row.sender_id),
                message_type: row.message_type.parse().unwrap_or(MessageType::Text),
                status: row.status.parse().unwrap_or(MessageStatus::Sent),
                reactions: reactions.get(&row.id).cloned().unwrap_or_default(),
                read_by: reads.get(&row.id).cloned().unwrap_or_default(),
                reply_to,
                is_edited: row.is_edited,
                edited_at: row.edited_at,
                is_deleted: row.is_deleted,
                created_at: row.created_at,
                content,
            }
        })
        .collect();

    Ok(views)
}

pub async fn resolve_message(pool: &DbPool, row: MessageRow) -> Result<MessageView, DbError> {
    let mut views = resolve_messages(pool, vec![row]).await?;
    views.pop().ok_or(DbError::NotFound)
}
