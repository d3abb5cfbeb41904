use crate::{bool_from_any_row, datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use aura_models::user::{PublicUser, UserBrief};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for UserRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let last_seen_raw: Option<String> = row.try_get("last_seen")?;
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            avatar: row.try_get("avatar")?,
            bio: row.try_get("bio")?,
            is_online: bool_from_any_row(row, "is_online")?,
            last_seen: last_seen_raw
                .as_deref()
                .map(datetime_from_db_text)
                .transpose()?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

impl UserRow {
    pub fn into_public(self) -> PublicUser {
        PublicUser {
            id: self.id,
            name: self.name,
            email: self.email,
            avatar: self.avatar,
            bio: self.bio,
            is_online: self.is_online,
            last_seen: self.last_seen,
            created_at: self.created_at,
        }
    }

    pub fn brief(&self) -> UserBrief {
        UserBrief {
            id: self.id,
            name: self.name.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

pub async fn create_user(
    pool: &DbPool,
    id: i64,
    name: &str,
    email: &str,
    password_hash: &str,
    now: DateTime<Utc>,
) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "INSERT INTO users (id, name, email, password_hash, created_at)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, name, email, password_hash, avatar, bio, is_online, last_seen, created_at",
    )
    .bind(id)
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(datetime_to_db_text(now))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_user_by_id(pool: &DbPool, id: i64) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, name, email, password_hash, avatar, bio, is_online, last_seen, created_at
         FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_user_by_email(pool: &DbPool, email: &str) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, name, email, password_hash, avatar, bio, is_online, last_seen, created_at
         FROM users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_users_by_ids(pool: &DbPool, ids: &[i64]) -> Result<Vec<UserRow>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("${i}")).collect();
    let query = format!(
        "SELECT id, name, email, password_hash, avatar, bio, is_online, last_seen, created_at
         FROM users WHERE id IN ({})",
        placeholders.join(", ")
    );
    let mut q = sqlx::query_as::<_, UserRow>(&query);
    for id in ids {
        q = q.bind(*id);
    }
    Ok(q.fetch_all(pool).await?)
}

/// Flip the stored presence flag. Both transitions also refresh `last_seen`
/// so "last seen" reads as "last time we heard from any device".
pub async fn set_presence(
    pool: &DbPool,
    user_id: i64,
    online: bool,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query("UPDATE users SET is_online = $2, last_seen = $3 WHERE id = $1")
        .bind(user_id)
        .bind(if online { 1_i32 } else { 0_i32 })
        .bind(datetime_to_db_text(at))
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_profile(
    pool: &DbPool,
    user_id: i64,
    name: Option<&str>,
    bio: Option<&str>,
    avatar: Option<&str>,
) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "UPDATE users
         SET name = COALESCE($2, name),
             bio = COALESCE($3, bio),
             avatar = COALESCE($4, avatar)
         WHERE id = $1
         RETURNING id, name, email, password_hash, avatar, bio, is_online, last_seen, created_at",
    )
    .bind(user_id)
    .bind(name)
    .bind(bio)
    .bind(avatar)
    .fetch_optional(pool)
    .await?;
    row.ok_or(DbError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> DbPool {
        let pool = crate::create_pool("sqlite::memory:", 1).await.unwrap();
        crate::run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_create_and_fetch_user() {
        let pool = test_pool().await;
        let now = Utc::now();
        let created = create_user(&pool, 1, "Ada", "ada@example.com", "hash", now)
            .await
            .unwrap();
        assert_eq!(created.id, 1);
        assert!(!created.is_online);
        assert!(created.last_seen.is_none());

        let by_id = get_user_by_id(&pool, 1).await.unwrap().unwrap();
        assert_eq!(by_id.email, "ada@example.com");

        let by_email = get_user_by_email(&pool, "ada@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, 1);

        assert!(get_user_by_id(&pool, 99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_presence_updates_flag_and_last_seen() {
        let pool = test_pool().await;
        let now = Utc::now();
        create_user(&pool, 1, "Ada", "ada@example.com", "hash", now)
            .await
            .unwrap();

        set_presence(&pool, 1, true, now).await.unwrap();
        let user = get_user_by_id(&pool, 1).await.unwrap().unwrap();
        assert!(user.is_online);
        assert!(user.last_seen.is_some());

        set_presence(&pool, 1, false, now).await.unwrap();
        let user = get_user_by_id(&pool, 1).await.unwrap().unwrap();
        assert!(!user.is_online);
    }

    #[tokio::test]
    async fn test_update_profile_keeps_missing_fields() {
        let pool = test_pool().await;
        create_user(&pool, 1, "Ada", "ada@example.com", "hash", Utc::now())
            .await
            .unwrap();

        let updated = update_profile(&pool, 1, Some("Ada L."), Some("maths"), None)
            .await
            .unwrap();
        assert_eq!(updated.name, "Ada L.");
        assert_eq!(updated.bio.as_deref(), Some("maths"));

        let updated = update_profile(&pool, 1, None, None, Some("a.png")).await.unwrap();
        assert_eq!(updated.name, "Ada L.");
        assert_eq!(updated.avatar.as_deref(), Some("a.png"));
    }

    #[tokio::test]
    async fn test_update_profile_missing_user() {
        let pool = test_pool().await;
        let err = update_profile(&pool, 42, Some("x"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }

    #[tokio::test]
    async fn test_get_users_by_ids() {
        let pool = test_pool().await;
        let now = Utc::now();
        create_user(&pool, 1, "Ada", "ada@example.com", "h", now)
            .await
            .unwrap();
        create_user(&pool, 2, "Grace", "grace@example.com", "h", now)
            .await
            .unwrap();

        let rows = get_users_by_ids(&pool, &[1, 2, 99]).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(get_users_by_ids(&pool, &[]).await.unwrap().is_empty());
    }
}
