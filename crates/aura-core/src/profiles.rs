use crate::error::CoreError;
use aura_db::DbPool;
use aura_models::user::{PublicUser, UserBrief};
use std::time::Duration;

/// Read-through cache for public profiles. Presence flags inside cached
/// entries can lag by up to the TTL; writes that change a profile must
/// call [`ProfileCache::invalidate`].
#[derive(Clone)]
pub struct ProfileCache {
    cache: moka::future::Cache<i64, PublicUser>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self {
            cache: moka::future::Cache::builder()
                .max_capacity(10_000)
                .time_to_live(Duration::from_secs(300))
                .build(),
        }
    }

    pub async fn get(&self, pool: &DbPool, user_id: i64) -> Result<PublicUser, CoreError> {
        if let Some(profile) = self.cache.get(&user_id).await {
            return Ok(profile);
        }
        let row = aura_db::users::get_user_by_id(pool, user_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        let profile = row.into_public();
        self.cache.insert(user_id, profile.clone()).await;
        Ok(profile)
    }

    pub async fn brief(&self, pool: &DbPool, user_id: i64) -> Result<UserBrief, CoreError> {
        let profile = self.get(pool, user_id).await?;
        Ok(UserBrief::from(&profile))
    }

    pub async fn invalidate(&self, user_id: i64) {
        self.cache.invalidate(&user_id).await;
    }
}

impl Default for ProfileCache {
    fn default() -> Self {
        Self::new()
    }
}
