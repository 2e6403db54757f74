use redis::AsyncCommands;
use tracing::instrument;

use crate::db::prelude::{RedisResult, SlideshowConfig};
use crate::db::redis::redis_pool::{RedisKey, RedisPool};

#[derive(Debug, Clone, Copy)]
pub struct SettingsRepository {
    pool: &'static RedisPool,
}

impl SettingsRepository {
    pub fn new(pool: &'static RedisPool) -> Self {
        Self { pool }
    }

    /// Stored settings, with defaults for anything never written.
    #[instrument(skip(self))]
    pub async fn get(&self) -> RedisResult<SlideshowConfig> {
        let mut conn = self.pool.conn();
        let raw: Option<String> = conn.get(RedisKey::SlideshowSettings.to_string()).await?;

        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => {
                tracing::debug!("no stored slideshow settings, using defaults");
                Ok(SlideshowConfig::default())
            }
        }
    }

    #[instrument(skip(self, config), fields(threshold = %config.milestone_threshold))]
    pub async fn update(&self, config: &SlideshowConfig) -> RedisResult<()> {
        let mut conn = self.pool.conn();
        let json = serde_json::to_string(config)?;

        let _: () = conn.set(RedisKey::SlideshowSettings.to_string(), json).await?;
        Ok(())
    }
}
