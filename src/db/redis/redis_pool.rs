use core::fmt;
use std::sync::LazyLock;

use redis::aio::ConnectionManager;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::instrument;

use crate::util::env::{EnvErr, Var};
use crate::var;

static REDIS_POOL: LazyLock<OnceCell<RedisPool>> = LazyLock::new(OnceCell::new);
pub async fn redis_pool() -> RedisResult<&'static RedisPool> {
    REDIS_POOL
        .get_or_try_init(|| async { RedisPool::new().await })
        .await
}

/// Every key the store reads or writes.
///
/// Records are JSON strings; membership indexes are sets; a campaign's tier schedule is a hash of
/// `dealsRequired -> bonusPerDeal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisKey {
    Agents,
    Agent(u64),
    AgentCampaigns(u64),
    Campaigns,
    CampaignTiers(String),
    Leaderboards,
    Leaderboard(u64),
    SlideshowSettings,
}

impl fmt::Display for RedisKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedisKey::Agents => write!(f, "agents"),
            RedisKey::Agent(id) => write!(f, "agent:{id}"),
            RedisKey::AgentCampaigns(id) => write!(f, "agent:{id}:campaigns"),
            RedisKey::Campaigns => write!(f, "campaigns"),
            RedisKey::CampaignTiers(name) => write!(f, "campaign:{name}:tiers"),
            RedisKey::Leaderboards => write!(f, "leaderboards"),
            RedisKey::Leaderboard(id) => write!(f, "leaderboard:{id}"),
            RedisKey::SlideshowSettings => write!(f, "slideshow:settings"),
        }
    }
}

#[derive(Clone)]
pub struct RedisPool {
    pub manager: ConnectionManager,
}

impl RedisPool {
    #[instrument]
    pub async fn new() -> RedisResult<Self> {
        let redis_url = var!(Var::RedisUrl).await?;
        tracing::debug!(redis_url, "connecting to redis server");

        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;

        Ok(Self { manager })
    }

    /// A handle onto the shared multiplexed connection.
    pub fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

impl fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisPool").finish_non_exhaustive()
    }
}

pub type RedisResult<T> = core::result::Result<T, RedisErr>;

#[derive(Debug, Error)]
pub enum RedisErr {
    #[error(transparent)]
    EnvErr(#[from] EnvErr),

    #[error(transparent)]
    RedisClientError(#[from] redis::RedisError),

    #[error("unable to (de)serialize stored record: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("unable to parse '{0}' from redis")]
    BadValue(String),

    #[error("no record at key '{0}'")]
    NotFound(String),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(RedisKey::Agents.to_string(), "agents");
        assert_eq!(RedisKey::Agent(42).to_string(), "agent:42");
        assert_eq!(RedisKey::AgentCampaigns(42).to_string(), "agent:42:campaigns");
        assert_eq!(
            RedisKey::CampaignTiers(String::from("fiber")).to_string(),
            "campaign:fiber:tiers"
        );
        assert_eq!(RedisKey::Campaigns.to_string(), "campaigns");
        assert_eq!(RedisKey::Leaderboards.to_string(), "leaderboards");
        assert_eq!(RedisKey::Leaderboard(3).to_string(), "leaderboard:3");
        assert_eq!(RedisKey::SlideshowSettings.to_string(), "slideshow:settings");
    }
}
