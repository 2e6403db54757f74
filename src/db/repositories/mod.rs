use core::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::db::prelude::{Agent, AgentId, AgentRecord, Leaderboard, RedisResult, SlideshowConfig};
use crate::db::redis::redis_pool::{RedisKey, RedisPool};
use crate::poller::source::{RosterSource, SourceResult};

pub mod agent;
pub mod bonus;
pub mod leaderboard;
pub mod settings;

use agent::AgentRepository;
use bonus::BonusTierRepository;
use leaderboard::LeaderboardRepository;
use settings::SettingsRepository;

/// Base methods for a keyspace of JSON records indexed by a set of ids.
#[async_trait]
pub trait Repository: Send + Sync {
    type Ident: fmt::Display + fmt::Debug + FromStr + Send + Sync;
    type Output: Serialize + DeserializeOwned + Send + Sync + fmt::Debug;

    /// Set holding the id of every stored record
    const INDEX: RedisKey;

    fn new(pool: &'static RedisPool) -> Self
    where
        Self: Sized;

    fn conn(&self) -> ConnectionManager;

    fn record_key(id: &Self::Ident) -> String;

    fn ident_of(item: &Self::Output) -> Self::Ident;

    #[instrument(skip(self))]
    async fn exists(&self, id: &Self::Ident) -> RedisResult<bool> {
        let mut conn = self.conn();
        Ok(conn.sismember(Self::INDEX.to_string(), id.to_string()).await?)
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, id: &Self::Ident) -> RedisResult<Option<Self::Output>> {
        let mut conn = self.conn();
        let raw: Option<String> = conn.get(Self::record_key(id)).await?;

        Ok(raw.map(|json| serde_json::from_str(&json)).transpose()?)
    }

    /// Every record in the index. Ids whose record has gone missing are skipped.
    #[instrument(skip(self), fields(index = %Self::INDEX))]
    async fn get_all(&self) -> RedisResult<Vec<Self::Output>> {
        let mut conn = self.conn();
        let ids: Vec<String> = conn.smembers(Self::INDEX.to_string()).await?;

        let keys: Vec<String> = ids
            .iter()
            .filter_map(|id| match id.parse::<Self::Ident>() {
                Ok(ident) => Some(Self::record_key(&ident)),
                Err(_) => {
                    tracing::warn!(id = %id, "unparseable id in index");
                    None
                }
            })
            .collect();

        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in &keys {
            pipe.get(key);
        }

        let raw: Vec<Option<String>> = pipe.query_async(&mut conn).await?;
        let mut output = Vec::with_capacity(raw.len());
        for (key, json) in keys.iter().zip(raw) {
            match json {
                Some(json) => output.push(serde_json::from_str(&json)?),
                None => tracing::warn!(key = %key, "indexed record is missing"),
            }
        }

        Ok(output)
    }

    #[instrument(skip(self, item))]
    async fn insert(&self, item: &Self::Output) -> RedisResult<()> {
        let mut conn = self.conn();
        let id = Self::ident_of(item);
        let json = serde_json::to_string(item)?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.set(Self::record_key(&id), json).ignore();
        pipe.sadd(Self::INDEX.to_string(), id.to_string()).ignore();

        let _: () = pipe.query_async(&mut conn).await?;
        tracing::debug!(%id, index = %Self::INDEX, "stored record");

        Ok(())
    }

    /// Removes a record and its index entry, returning whether it existed.
    #[instrument(skip(self))]
    async fn delete(&self, id: &Self::Ident) -> RedisResult<bool> {
        let mut conn = self.conn();

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.del(Self::record_key(id)).ignore();
        pipe.srem(Self::INDEX.to_string(), id.to_string());

        let (removed,): (u64,) = pipe.query_async(&mut conn).await?;
        Ok(removed > 0)
    }
}

/// The Redis-backed roster, settings and leaderboard source the poller reads each tick.
#[derive(Debug, Clone, Copy)]
pub struct RedisStore {
    pool: &'static RedisPool,
}

impl RedisStore {
    pub fn new(pool: &'static RedisPool) -> Self {
        Self { pool }
    }

    pub fn agent_repo(&self) -> AgentRepository {
        AgentRepository::new(self.pool)
    }

    pub fn tier_repo(&self) -> BonusTierRepository {
        BonusTierRepository::new(self.pool)
    }

    pub fn leaderboard_repo(&self) -> LeaderboardRepository {
        LeaderboardRepository::new(self.pool)
    }

    pub fn settings_repo(&self) -> SettingsRepository {
        SettingsRepository::new(self.pool)
    }

    /// Upserts every CRM user into the agent store, keeping stored media urls.
    #[instrument(skip(self, users), fields(user_count = users.len()))]
    pub async fn sync_agents(&self, users: Vec<AgentRecord>) -> RedisResult<usize> {
        let agent_repo = self.agent_repo();

        let mut synced = 0;
        for user in users {
            agent_repo.upsert(user).await?;
            synced += 1;
        }

        tracing::info!(synced, "synced agents from crm");
        Ok(synced)
    }

    /// One agent joined with the tier schedules of its campaigns.
    #[instrument(skip(self))]
    pub async fn agent(&self, id: AgentId) -> RedisResult<Option<Agent>> {
        let agent_repo = self.agent_repo();
        let Some(record) = agent_repo.get_by_id(&id).await? else {
            return Ok(None);
        };

        let campaigns = agent_repo.campaigns(id).await?;
        let assignments = self.tier_repo().assignments(campaigns).await?;

        Ok(Some(record.into_agent(assignments)))
    }

    /// Agents (optionally one group) joined with the tier schedules of their campaigns, ordered
    /// by name.
    #[instrument(skip(self))]
    pub async fn roster(&self, group_id: Option<u64>) -> RedisResult<Vec<Agent>> {
        let agent_repo = self.agent_repo();
        let tier_repo = self.tier_repo();

        let records = agent_repo.list(group_id).await?;
        let mut roster = Vec::with_capacity(records.len());

        for record in records {
            let campaigns = agent_repo.campaigns(record.user_id).await?;
            let assignments = tier_repo.assignments(campaigns).await?;
            roster.push(record.into_agent(assignments));
        }

        tracing::debug!(agent_count = roster.len(), "built roster");
        Ok(roster)
    }
}

#[async_trait]
impl RosterSource for RedisStore {
    async fn agents(&self, group_id: Option<u64>) -> SourceResult<Vec<Agent>> {
        Ok(self.roster(group_id).await?)
    }

    async fn slideshow_config(&self) -> SourceResult<SlideshowConfig> {
        Ok(self.settings_repo().get().await?)
    }

    async fn active_leaderboards(&self) -> SourceResult<Vec<Leaderboard>> {
        Ok(self.leaderboard_repo().list_active().await?)
    }
}
