use crate::{datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct ChatRow {
    pub id: i64,
    pub kind: String,
    pub name: Option<String>,
    pub admin_id: Option<i64>,
    pub last_message_id: Option<i64>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for ChatRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let last_activity_raw: String = row.try_get("last_activity")?;
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            name: row.try_get("name")?,
            admin_id: row.try_get("admin_id")?,
            last_message_id: row.try_get("last_message_id")?,
            last_activity: datetime_from_db_text(&last_activity_raw)?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

pub async fn get_chat(pool: &DbPool, chat_id: i64) -> Result<Option<ChatRow>, DbError> {
    let row = sqlx::query_as::<_, ChatRow>(
        "SELECT id, kind, name, admin_id, last_message_id, last_activity, created_at
         FROM chats WHERE id = $1",
    )
    .bind(chat_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Looks up the private chat between the two users, creating it (with both
/// participant rows) when none exists. Returns the chat and whether it was
/// created by this call. At most one private chat exists per pair.
pub async fn find_or_create_private_chat(
    pool: &DbPool,
    new_id: i64,
    user_id: i64,
    other_id: i64,
    now: DateTime<Utc>,
) -> Result<(ChatRow, bool), DbError> {
    let mut tx = pool.begin().await?;

    let existing = sqlx::query_as::<_, ChatRow>(
        "SELECT c.id, c.kind, c.name, c.admin_id, c.last_message_id, c.last_activity, c.created_at
         FROM chats c
         JOIN chat_participants p1 ON p1.chat_id = c.id AND p1.user_id = $1
         JOIN chat_participants p2 ON p2.chat_id = c.id AND p2.user_id = $2
         WHERE c.kind = 'private'
         LIMIT 1",
    )
    .bind(user_id)
    .bind(other_id)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(chat) = existing {
        tx.commit().await?;
        return Ok((chat, false));
    }

    let stamp = datetime_to_db_text(now);
    let chat = sqlx::query_as::<_, ChatRow>(
        "INSERT INTO chats (id, kind, last_activity, created_at)
         VALUES ($1, 'private', $2, $2)
         RETURNING id, kind, name, admin_id, last_message_id, last_activity, created_at",
    )
    .bind(new_id)
    .bind(&stamp)
    .fetch_one(&mut *tx)
    .await?;

    for participant in [user_id, other_id] {
        sqlx::query(
            "INSERT INTO chat_participants (chat_id, user_id, joined_at) VALUES ($1, $2, $3)",
        )
        .bind(new_id)
        .bind(participant)
        .bind(&stamp)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok((chat, true))
}

pub async fn create_group_chat(
    pool: &DbPool,
    new_id: i64,
    name: &str,
    admin_id: i64,
    participant_ids: &[i64],
    now: DateTime<Utc>,
) -> Result<ChatRow, DbError> {
    let stamp = datetime_to_db_text(now);
    let mut tx = pool.begin().await?;

    let chat = sqlx::query_as::<_, ChatRow>(
        "INSERT INTO chats (id, kind, name, admin_id, last_activity, created_at)
         VALUES ($1, 'group', $2, $3, $4, $4)
         RETURNING id, kind, name, admin_id, last_message_id, last_activity, created_at",
    )
    .bind(new_id)
    .bind(name)
    .bind(admin_id)
    .bind(&stamp)
    .fetch_one(&mut *tx)
    .await?;

    // The admin is always a participant, whether or not the caller listed them.
    for participant in participant_ids.iter().copied().chain([admin_id]) {
        sqlx::query(
            "INSERT INTO chat_participants (chat_id, user_id, joined_at) VALUES ($1, $2, $3)
             ON CONFLICT (chat_id, user_id) DO NOTHING",
        )
        .bind(new_id)
        .bind(participant)
        .bind(&stamp)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(chat)
}

pub async fn is_participant(pool: &DbPool, chat_id: i64, user_id: i64) -> Result<bool, DbError> {
    let row = sqlx::query("SELECT 1 FROM chat_participants WHERE chat_id = $1 AND user_id = $2")
        .bind(chat_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

pub async fn participant_ids(pool: &DbPool, chat_id: i64) -> Result<Vec<i64>, DbError> {
    let rows = sqlx::query("SELECT user_id FROM chat_participants WHERE chat_id = $1")
        .bind(chat_id)
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|row| row.try_get::<i64, _>("user_id").map_err(DbError::Sqlx))
        .collect()
}

pub async fn chat_ids_for_user(pool: &DbPool, user_id: i64) -> Result<Vec<i64>, DbError> {
    let rows = sqlx::query("SELECT chat_id FROM chat_participants WHERE user_id = $1")
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|row| row.try_get::<i64, _>("chat_id").map_err(DbError::Sqlx))
        .collect()
}

pub async fn chats_for_user(pool: &DbPool, user_id: i64) -> Result<Vec<ChatRow>, DbError> {
    let rows = sqlx::query_as::<_, ChatRow>(
        "SELECT c.id, c.kind, c.name, c.admin_id, c.last_message_id, c.last_activity, c.created_at
         FROM chats c
         JOIN chat_participants p ON p.chat_id = c.id
         WHERE p.user_id = $1
         ORDER BY c.last_activity DESC, c.id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Called after every persisted message so chat lists sort by recency.
pub async fn touch_last_message(
    pool: &DbPool,
    chat_id: i64,
    message_id: i64,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query("UPDATE chats SET last_message_id = $2, last_activity = $3 WHERE id = $1")
        .bind(chat_id)
        .bind(message_id)
        .bind(datetime_to_db_text(at))
        .execute(pool)
        .await?;
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

    async fn seed_users(pool: &DbPool) {
        let now = Utc::now();
        for (id, name) in [(1, "Ada"), (2, "Grace"), (3, "Edsger")] {
            crate::users::create_user(pool, id, name, &format!("{name}@example.com"), "h", now)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_private_chat_created_once_per_pair() {
        let pool = test_pool().await;
        seed_users(&pool).await;

        let (chat, created) = find_or_create_private_chat(&pool, 100, 1, 2, Utc::now())
            .await
            .unwrap();
        assert!(created);
        assert_eq!(chat.kind, "private");

        // Same pair in either order resolves to the same chat.
        let (again, created) = find_or_create_private_chat(&pool, 101, 2, 1, Utc::now())
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.id, chat.id);

        // A different pair gets its own chat.
        let (other, created) = find_or_create_private_chat(&pool, 102, 1, 3, Utc::now())
            .await
            .unwrap();
        assert!(created);
        assert_ne!(other.id, chat.id);
    }

    #[tokio::test]
    async fn test_group_chat_includes_admin() {
        let pool = test_pool().await;
        seed_users(&pool).await;

        let chat = create_group_chat(&pool, 100, "plan", 1, &[2, 3], Utc::now())
            .await
            .unwrap();
        assert_eq!(chat.kind, "group");
        assert_eq!(chat.name.as_deref(), Some("plan"));
        assert_eq!(chat.admin_id, Some(1));

        let mut members = participant_ids(&pool, 100).await.unwrap();
        members.sort_unstable();
        assert_eq!(members, vec![1, 2, 3]);

        // Listing the admin explicitly must not duplicate the row.
        let chat = create_group_chat(&pool, 101, "dup", 1, &[1, 2], Utc::now())
            .await
            .unwrap();
        assert_eq!(participant_ids(&pool, chat.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_is_participant() {
        let pool = test_pool().await;
        seed_users(&pool).await;
        find_or_create_private_chat(&pool, 100, 1, 2, Utc::now())
            .await
            .unwrap();

        assert!(is_participant(&pool, 100, 1).await.unwrap());
        assert!(is_participant(&pool, 100, 2).await.unwrap());
        assert!(!is_participant(&pool, 100, 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_chats_for_user_sorted_by_activity() {
        let pool = test_pool().await;
        seed_users(&pool).await;
        let base = Utc::now();

        find_or_create_private_chat(&pool, 100, 1, 2, base).await.unwrap();
        find_or_create_private_chat(&pool, 101, 1, 3, base).await.unwrap();

        touch_last_message(&pool, 100, 555, base + chrono::Duration::seconds(60))
            .await
            .unwrap();

        let chats = chats_for_user(&pool, 1).await.unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].id, 100);
        assert_eq!(chats[0].last_message_id, Some(555));

        assert_eq!(chats_for_user(&pool, 3).await.unwrap().len(), 1);
    }
}
