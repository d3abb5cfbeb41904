use crate::{datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use aura_models::emotion::EmotionView;
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct EmotionRow {
    pub id: i64,
    pub user_id: i64,
    pub label: String,
    pub confidence: f64,
    pub art_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for EmotionRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            label: row.try_get("label")?,
            confidence: row.try_get("confidence")?,
            art_url: row.try_get("art_url")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

impl EmotionRow {
    pub fn into_view(self) -> EmotionView {
        EmotionView {
            id: self.id,
            user_id: self.user_id,
            label: self.label,
            confidence: self.confidence,
            art_url: self.art_url,
            created_at: self.created_at,
        }
    }
}

pub async fn create_emotion(
    pool: &DbPool,
    id: i64,
    user_id: i64,
    label: &str,
    confidence: f64,
    art_url: Option<&str>,
    now: DateTime<Utc>,
) -> Result<EmotionRow, DbError> {
    let row = sqlx::query_as::<_, EmotionRow>(
        "INSERT INTO emotions (id, user_id, label, confidence, art_url, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id, user_id, label, confidence, art_url, created_at",
    )
    .bind(id)
    .bind(user_id)
    .bind(label)
    .bind(confidence)
    .bind(art_url)
    .bind(datetime_to_db_text(now))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_emotion(pool: &DbPool, id: i64) -> Result<Option<EmotionRow>, DbError> {
    let row = sqlx::query_as::<_, EmotionRow>(
        "SELECT id, user_id, label, confidence, art_url, created_at
         FROM emotions WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn emotions_by_ids(pool: &DbPool, ids: &[i64]) -> Result<Vec<EmotionRow>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("${i}")).collect();
    let query = format!(
        "SELECT id, user_id, label, confidence, art_url, created_at
         FROM emotions WHERE id IN ({})",
        placeholders.join(", ")
    );
    let mut q = sqlx::query_as::<_, EmotionRow>(&query);
    for id in ids {
        q = q.bind(*id);
    }
    Ok(q.fetch_all(pool).await?)
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
    async fn test_create_and_fetch_emotion() {
        let pool = test_pool().await;
        let now = Utc::now();
        crate::users::create_user(&pool, 1, "Ada", "ada@example.com", "h", now)
            .await
            .unwrap();

        let emotion = create_emotion(&pool, 500, 1, "joy", 0.92, Some("art/joy.png"), now)
            .await
            .unwrap();
        assert_eq!(emotion.label, "joy");
        assert!((emotion.confidence - 0.92).abs() < f64::EPSILON);

        let fetched = get_emotion(&pool, 500).await.unwrap().unwrap();
        assert_eq!(fetched.art_url.as_deref(), Some("art/joy.png"));
        assert!(get_emotion(&pool, 501).await.unwrap().is_none());

        let batch = emotions_by_ids(&pool, &[500, 999]).await.unwrap();
        assert_eq!(batch.len(), 1);
    }
}
