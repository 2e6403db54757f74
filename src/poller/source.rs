use async_trait::async_trait;
use thiserror::Error;

use crate::db::prelude::{Agent, DateRange, Lead, Leaderboard, RedisErr, SlideshowConfig};
use crate::util::adversus::AdversusErr;

/// Where closed deals come from.
#[async_trait]
pub trait LeadSource: Send + Sync {
    async fn fetch_leads(&self, range: DateRange) -> SourceResult<Vec<Lead>>;
}

/// Where agents, their bonus schedules and the display settings come from.
#[async_trait]
pub trait RosterSource: Send + Sync {
    /// Agents joined with their campaign assignments, optionally limited to one group.
    async fn agents(&self, group_id: Option<u64>) -> SourceResult<Vec<Agent>>;

    async fn slideshow_config(&self) -> SourceResult<SlideshowConfig>;

    async fn active_leaderboards(&self) -> SourceResult<Vec<Leaderboard>>;
}

pub type SourceResult<T> = core::result::Result<T, SourceErr>;

#[derive(Debug, Error)]
pub enum SourceErr {
    #[error(transparent)]
    AdversusError(#[from] AdversusErr),

    #[error(transparent)]
    RedisError(#[from] RedisErr),

    #[error("source unavailable: {0}")]
    Unavailable(String),
}
