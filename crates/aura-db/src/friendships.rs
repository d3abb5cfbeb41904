use crate::users::UserRow;
use crate::{datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct FriendRequestRow {
    pub id: i64,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for FriendRequestRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            sender_id: row.try_get("sender_id")?,
            recipient_id: row.try_get("recipient_id")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

pub async fn are_friends(pool: &DbPool, user_id: i64, other_id: i64) -> Result<bool, DbError> {
    let row = sqlx::query("SELECT 1 FROM friendships WHERE user_id = $1 AND friend_id = $2")
        .bind(user_id)
        .bind(other_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

pub async fn friend_ids(pool: &DbPool, user_id: i64) -> Result<Vec<i64>, DbError> {
    let rows = sqlx::query("SELECT friend_id FROM friendships WHERE user_id = $1")
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|row| row.try_get::<i64, _>("friend_id").map_err(DbError::Sqlx))
        .collect()
}

/// A friend's profile row plus when the friendship was formed.
#[derive(Debug, Clone)]
pub struct FriendRow {
    pub user: UserRow,
    pub since: DateTime<Utc>,
}

pub async fn friends_with_since(pool: &DbPool, user_id: i64) -> Result<Vec<FriendRow>, DbError> {
    use sqlx::FromRow;
    let rows = sqlx::query(
        "SELECT u.id, u.name, u.email, u.password_hash, u.avatar, u.bio,
                u.is_online, u.last_seen, u.created_at, f.created_at AS friends_since
         FROM friendships f
         JOIN users u ON u.id = f.friend_id
         WHERE f.user_id = $1
         ORDER BY u.name",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|row| {
            let user = UserRow::from_row(row)?;
            let since_raw: String = row.try_get("friends_since")?;
            Ok(FriendRow {
                user,
                since: datetime_from_db_text(&since_raw)?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(DbError::Sqlx)
}

/// Inserts the symmetric pair of rows. Idempotent: accepting an already
/// accepted request leaves the existing rows untouched.
pub async fn add_friendship(
    pool: &DbPool,
    user_id: i64,
    other_id: i64,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    let created_at = datetime_to_db_text(now);
    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO friendships (user_id, friend_id, created_at) VALUES ($1, $2, $3)
         ON CONFLICT (user_id, friend_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(other_id)
    .bind(&created_at)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "INSERT INTO friendships (user_id, friend_id, created_at) VALUES ($1, $2, $3)
         ON CONFLICT (user_id, friend_id) DO NOTHING",
    )
    .bind(other_id)
    .bind(user_id)
    .bind(&created_at)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn remove_friendship(pool: &DbPool, user_id: i64, other_id: i64) -> Result<u64, DbError> {
    let result = sqlx::query(
        "DELETE FROM friendships
         WHERE (user_id = $1 AND friend_id = $2) OR (user_id = $2 AND friend_id = $1)",
    )
    .bind(user_id)
    .bind(other_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn create_friend_request(
    pool: &DbPool,
    id: i64,
    sender_id: i64,
    recipient_id: i64,
    now: DateTime<Utc>,
) -> Result<FriendRequestRow, DbError> {
    let row = sqlx::query_as::<_, FriendRequestRow>(
        "INSERT INTO friend_requests (id, sender_id, recipient_id, created_at)
         VALUES ($1, $2, $3, $4)
         RETURNING id, sender_id, recipient_id, created_at",
    )
    .bind(id)
    .bind(sender_id)
    .bind(recipient_id)
    .bind(datetime_to_db_text(now))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_friend_request(
    pool: &DbPool,
    sender_id: i64,
    recipient_id: i64,
) -> Result<Option<FriendRequestRow>, DbError> {
    let row = sqlx::query_as::<_, FriendRequestRow>(
        "SELECT id, sender_id, recipient_id, created_at
         FROM friend_requests WHERE sender_id = $1 AND recipient_id = $2",
    )
    .bind(sender_id)
    .bind(recipient_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_friend_request_by_id(
    pool: &DbPool,
    id: i64,
) -> Result<Option<FriendRequestRow>, DbError> {
    let row = sqlx::query_as::<_, FriendRequestRow>(
        "SELECT id, sender_id, recipient_id, created_at FROM friend_requests WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn pending_requests_for(
    pool: &DbPool,
    recipient_id: i64,
) -> Result<Vec<FriendRequestRow>, DbError> {
    let rows = sqlx::query_as::<_, FriendRequestRow>(
        "SELECT id, sender_id, recipient_id, created_at
         FROM friend_requests WHERE recipient_id = $1
         ORDER BY created_at DESC, id DESC",
    )
    .bind(recipient_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn pending_requests_from(
    pool: &DbPool,
    sender_id: i64,
) -> Result<Vec<FriendRequestRow>, DbError> {
    let rows = sqlx::query_as::<_, FriendRequestRow>(
        "SELECT id, sender_id, recipient_id, created_at
         FROM friend_requests WHERE sender_id = $1
         ORDER BY created_at DESC, id DESC",
    )
    .bind(sender_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn delete_friend_request(pool: &DbPool, id: i64) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM friend_requests WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
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
    async fn test_friendship_is_symmetric() {
        let pool = test_pool().await;
        seed_users(&pool).await;

        add_friendship(&pool, 1, 2, Utc::now()).await.unwrap();
        assert!(are_friends(&pool, 1, 2).await.unwrap());
        assert!(are_friends(&pool, 2, 1).await.unwrap());
        assert!(!are_friends(&pool, 1, 3).await.unwrap());

        assert_eq!(friend_ids(&pool, 1).await.unwrap(), vec![2]);
        assert_eq!(friend_ids(&pool, 2).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_add_friendship_is_idempotent() {
        let pool = test_pool().await;
        seed_users(&pool).await;

        add_friendship(&pool, 1, 2, Utc::now()).await.unwrap();
        add_friendship(&pool, 1, 2, Utc::now()).await.unwrap();
        add_friendship(&pool, 2, 1, Utc::now()).await.unwrap();
        assert_eq!(friend_ids(&pool, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_friendship_deletes_both_rows() {
        let pool = test_pool().await;
        seed_users(&pool).await;

        add_friendship(&pool, 1, 2, Utc::now()).await.unwrap();
        let removed = remove_friendship(&pool, 2, 1).await.unwrap();
        assert_eq!(removed, 2);
        assert!(!are_friends(&pool, 1, 2).await.unwrap());
        assert!(!are_friends(&pool, 2, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_friend_request_lifecycle() {
        let pool = test_pool().await;
        seed_users(&pool).await;

        let request = create_friend_request(&pool, 10, 1, 2, Utc::now())
            .await
            .unwrap();
        assert_eq!(request.sender_id, 1);

        let found = get_friend_request(&pool, 1, 2).await.unwrap();
        assert!(found.is_some());
        assert!(get_friend_request(&pool, 2, 1).await.unwrap().is_none());

        let pending = pending_requests_for(&pool, 2).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, 10);

        let sent = pending_requests_from(&pool, 1).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert!(pending_requests_from(&pool, 2).await.unwrap().is_empty());

        assert_eq!(delete_friend_request(&pool, 10).await.unwrap(), 1);
        assert!(pending_requests_for(&pool, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_friend_request_rejected() {
        let pool = test_pool().await;
        seed_users(&pool).await;

        create_friend_request(&pool, 10, 1, 2, Utc::now())
            .await
            .unwrap();
        let err = create_friend_request(&pool, 11, 1, 2, Utc::now()).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_friends_with_since_returns_profiles() {
        let pool = test_pool().await;
        seed_users(&pool).await;

        add_friendship(&pool, 1, 2, Utc::now()).await.unwrap();
        add_friendship(&pool, 1, 3, Utc::now()).await.unwrap();

        let friends = friends_with_since(&pool, 1).await.unwrap();
        assert_eq!(friends.len(), 2);
        // ORDER BY name
        assert_eq!(friends[0].user.name, "Edsger");
        assert_eq!(friends[1].user.name, "Grace");
    }
}
