use crate::{datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use aura_models::message::ReactionView;
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct ReactionRow {
    pub message_id: i64,
    pub user_id: i64,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for ReactionRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            message_id: row.try_get("message_id")?,
            user_id: row.try_get("user_id")?,
            emoji: row.try_get("emoji")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

impl ReactionRow {
    pub fn into_view(self) -> ReactionView {
        ReactionView {
            user_id: self.user_id,
            emoji: self.emoji,
            created_at: self.created_at,
        }
    }
}

/// Last write wins: a user reacting again replaces their previous emoji
/// rather than stacking a second reaction.
pub async fn upsert_reaction(
    pool: &DbPool,
    message_id: i64,
    user_id: i64,
    emoji: &str,
    now: DateTime<Utc>,
) -> Result<ReactionRow, DbError> {
    let row = sqlx::query_as::<_, ReactionRow>(
        "INSERT INTO message_reactions (message_id, user_id, emoji, created_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (message_id, user_id)
         DO UPDATE SET emoji = excluded.emoji, created_at = excluded.created_at
         RETURNING message_id, user_id, emoji, created_at",
    )
    .bind(message_id)
    .bind(user_id)
    .bind(emoji)
    .bind(datetime_to_db_text(now))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn remove_reaction(
    pool: &DbPool,
    message_id: i64,
    user_id: i64,
) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM message_reactions WHERE message_id = $1 AND user_id = $2")
        .bind(message_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn reactions_for_message(
    pool: &DbPool,
    message_id: i64,
) -> Result<Vec<ReactionRow>, DbError> {
    let rows = sqlx::query_as::<_, ReactionRow>(
        "SELECT message_id, user_id, emoji, created_at
         FROM message_reactions WHERE message_id = $1
         ORDER BY created_at, user_id",
    )
    .bind(message_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn reactions_for_messages(
    pool: &DbPool,
    message_ids: &[i64],
) -> Result<Vec<ReactionRow>, DbError> {
    if message_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("${i}")).collect();
    let query = format!(
        "SELECT message_id, user_id, emoji, created_at
         FROM message_reactions WHERE message_id IN ({})
         ORDER BY created_at, user_id",
        placeholders.join(", ")
    );
    let mut q = sqlx::query_as::<_, ReactionRow>(&query);
    for id in message_ids {
        q = q.bind(*id);
    }
    Ok(q.fetch_all(pool).await?)
}
